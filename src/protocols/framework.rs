use alloy::primitives::B256;
use async_trait::async_trait;
use thiserror::Error;

use crate::chain::{ChainClient, ChainError, WalletIdentity};

/// 单腿执行时适配器可见的上下文。钱包可能缺席（空闲 UI 触发），
/// 适配器必须对此给出描述性错误而不是 panic。
pub struct LegContext<'a> {
    pub wallet: Option<&'a WalletIdentity>,
    pub client: &'a dyn ChainClient,
}

impl<'a> LegContext<'a> {
    /// 取出钱包，缺席时返回带场馆名的错误。
    pub fn require_wallet(&self, venue: &'static str) -> Result<&'a WalletIdentity, AdapterError> {
        self.wallet.ok_or(AdapterError::MissingSigner { venue })
    }
}

/// 每个收益/兑换场馆一个适配器，统一暴露
/// `supply(签名者, 链客户端, 最小单位金额) -> 交易哈希`。
///
/// 合约地址与目标链在构造时静态固定；内部的授权子步骤必须
/// 等到授权交易被打包后才能提交存入交易。
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    fn venue(&self) -> &'static str;

    async fn supply(&self, ctx: &LegContext<'_>, amount_minor: u64) -> Result<B256, AdapterError>;
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("缺少签名者，无法执行 {venue} 存入")]
    MissingSigner { venue: &'static str },
    #[error("{venue} 授权交易 {tx} 在链上回滚")]
    ApprovalReverted { venue: &'static str, tx: B256 },
    #[error("{venue} 存入交易 {tx} 在链上回滚")]
    SupplyReverted { venue: &'static str, tx: B256 },
    #[error("中继端点返回非成功状态 {status}: {message}")]
    Relay { status: String, message: String },
    #[error("中继请求失败: {0}")]
    RelayTransport(#[from] reqwest::Error),
    #[error("中继响应格式不符合预期: {0}")]
    RelaySchema(String),
    #[error(transparent)]
    Chain(#[from] ChainError),
}
