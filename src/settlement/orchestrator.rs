use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use alloy::primitives::B256;
use async_trait::async_trait;
use metrics::counter;
use parking_lot::Mutex;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::chain::{ChainClientRegistry, ChainError, ChainId, WalletIdentity, chain_for};
use crate::game::GameEntity;
use crate::monitoring::prometheus_enabled;
use crate::protocols::{AdapterDispatch, AdapterError, LegContext, ProtocolId};
use crate::session::{Allocation, SessionError, SessionState};

use super::scale::usd_to_minor;
use super::types::{SettlementResult, TransactionRecord};

/// 编排器对会话管理器的依赖面：取快照、关会话。
/// [`crate::session::SessionManager`] 是生产实现。
#[async_trait]
pub trait SessionSettler: Send + Sync {
    fn snapshot(&self) -> SessionState;

    async fn close_session(
        &self,
        owner: alloy::primitives::Address,
        final_allocations: Vec<Allocation>,
    ) -> Result<(), SessionError>;
}

/// 关闭链下会话失败时结算整体中止，错误向上传播；
/// 不产生任何 [`SettlementResult`]。
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("关闭链下会话失败: {0}")]
    SessionClose(#[from] SessionError),
}

/// 单腿失败只记录、不向外传播。
#[derive(Debug, Error)]
pub enum LegError {
    #[error("链 {0} 未配置客户端")]
    MissingChainClient(ChainId),
    #[error("协议 {0} 没有可用适配器")]
    MissingAdapter(ProtocolId),
    #[error("切换活跃链失败: {0}")]
    Switch(#[from] ChainError),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

/// 把一批链下累积转换为链上事实，逐腿隔离失败。
///
/// 实例持有的可变共享状态只有 `settling` 标志与最近一次
/// [`SettlementResult`]，且都只在自身调用栈上更新。
pub struct SettlementOrchestrator {
    session: Arc<dyn SessionSettler>,
    adapters: Arc<dyn AdapterDispatch>,
    clients: ChainClientRegistry,
    wallet: Option<WalletIdentity>,
    settling: AtomicBool,
    last_result: Mutex<Option<SettlementResult>>,
}

impl SettlementOrchestrator {
    pub fn new(
        session: Arc<dyn SessionSettler>,
        adapters: Arc<dyn AdapterDispatch>,
        clients: ChainClientRegistry,
        wallet: Option<WalletIdentity>,
    ) -> Self {
        Self {
            session,
            adapters,
            clients,
            wallet,
            settling: AtomicBool::new(false),
            last_result: Mutex::new(None),
        }
    }

    /// 结算是否正在进行。严格覆盖 `settle_session` 的调用区间，
    /// 任何退出路径（成功或失败）都会清除。
    pub fn is_settling(&self) -> bool {
        self.settling.load(Ordering::SeqCst)
    }

    /// 最近一次完成的结算记录。调用方通过它检视逐腿结果，
    /// 而不是通过 `settle_session` 的返回值。
    pub fn last_result(&self) -> Option<SettlementResult> {
        self.last_result.lock().clone()
    }

    /// 结算入口。见模块文档的前置条件与逐腿语义：
    ///
    /// 1. 缺签名者或无任何链客户端时静默返回（空闲 UI 可随手
    ///    调用，这不是错误，也不触碰已存结果）；
    /// 2. 先关链下会话，失败则整体中止、不存结果；
    /// 3. 对每个合格实体独立执行一腿，失败记录在案但绝不
    ///    中断后续腿；
    /// 4. 全部腿跑完后用关闭时刻的会话快照组装并存储结果。
    pub async fn settle_session(&self, entities: &[GameEntity]) -> Result<(), SettlementError> {
        let Some(wallet) = &self.wallet else {
            debug!(target: "settlement", "无签名者，跳过结算");
            return Ok(());
        };
        if self.clients.is_empty() {
            debug!(target: "settlement", "无链客户端，跳过结算");
            return Ok(());
        }

        let _guard = SettlingGuard::engage(&self.settling);

        // 关闭前捕获快照：关闭成功后管理器会清掉会话标识。
        let snapshot = self.session.snapshot();
        self.session
            .close_session(wallet.address, Vec::new())
            .await?;

        let eligible: Vec<&GameEntity> = entities
            .iter()
            .filter(|entity| {
                entity.deposited > rust_decimal::Decimal::ZERO
                    && chain_for(entity.protocol).is_some()
            })
            .collect();
        info!(
            target: "settlement",
            session_id = snapshot.session_id.as_deref().unwrap_or("<none>"),
            total = entities.len(),
            eligible = eligible.len(),
            "链下会话已关闭，开始逐腿结算"
        );

        let mut records = Vec::with_capacity(eligible.len());
        let mut active_chain: Option<ChainId> = None;
        for entity in eligible {
            // 过滤条件已保证映射存在。
            let Some(chain) = chain_for(entity.protocol) else {
                continue;
            };
            match self.run_leg(wallet, entity, chain, &mut active_chain).await {
                Ok(tx) => {
                    self.record_leg_metrics(entity.protocol, "confirmed");
                    records.push(TransactionRecord::confirmed(entity.protocol, tx));
                }
                Err(err) => {
                    self.record_leg_metrics(entity.protocol, "failed");
                    warn!(
                        target: "settlement",
                        protocol = %entity.protocol,
                        entity = %entity.id,
                        error = %err,
                        "结算腿失败，继续后续腿"
                    );
                    records.push(TransactionRecord::failed(entity.protocol, err.to_string()));
                }
            }
        }

        let result = SettlementResult {
            session_id: snapshot.session_id.unwrap_or_default(),
            action_count: snapshot.action_count,
            savings_usd: snapshot.estimated_savings_usd,
            completed_at: OffsetDateTime::now_utc(),
            records,
        };
        info!(
            target: "settlement",
            confirmed = result.confirmed_count(),
            failed = result.failed_count(),
            "结算完成"
        );
        *self.last_result.lock() = Some(result);
        Ok(())
    }

    async fn run_leg(
        &self,
        wallet: &WalletIdentity,
        entity: &GameEntity,
        chain: ChainId,
        active_chain: &mut Option<ChainId>,
    ) -> Result<B256, LegError> {
        let client = self
            .clients
            .client_for(chain)
            .ok_or(LegError::MissingChainClient(chain))?;

        // 逐腿顺序执行：签名请求前先保证签名者活跃链正确。
        if *active_chain != Some(chain) {
            wallet.signer.switch_chain(chain).await?;
            *active_chain = Some(chain);
        }

        let adapter = self
            .adapters
            .adapter_for(entity.protocol)
            .ok_or(LegError::MissingAdapter(entity.protocol))?;
        let amount_minor = usd_to_minor(entity.deposited);
        debug!(
            target: "settlement",
            protocol = %entity.protocol,
            venue = adapter.venue(),
            chain = %chain,
            amount_minor,
            "执行结算腿"
        );

        let ctx = LegContext {
            wallet: Some(wallet),
            client: client.as_ref(),
        };
        let tx = adapter.supply(&ctx, amount_minor).await?;
        Ok(tx)
    }

    fn record_leg_metrics(&self, protocol: ProtocolId, result: &'static str) {
        if !prometheus_enabled() {
            return;
        }
        counter!(
            "demeter_settlement_legs_total",
            "protocol" => protocol.to_string(),
            "result" => result
        )
        .increment(1);
    }
}

/// 作用域释放的 settling 标志，覆盖包括 `?` 在内的所有退出路径。
struct SettlingGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> SettlingGuard<'a> {
    fn engage(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self { flag }
    }
}

impl Drop for SettlingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
