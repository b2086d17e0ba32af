use alloy::primitives::B256;
use rust_decimal::Decimal;
use time::OffsetDateTime;

use crate::protocols::ProtocolId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Confirmed,
    Failed,
}

/// 单条结算腿的结果。成功携带交易哈希，失败携带可读错误。
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub protocol: ProtocolId,
    pub status: TransactionStatus,
    pub tx_hash: Option<B256>,
    pub error: Option<String>,
}

impl TransactionRecord {
    pub fn confirmed(protocol: ProtocolId, tx_hash: B256) -> Self {
        Self {
            protocol,
            status: TransactionStatus::Confirmed,
            tx_hash: Some(tx_hash),
            error: None,
        }
    }

    pub fn failed(protocol: ProtocolId, error: String) -> Self {
        Self {
            protocol,
            status: TransactionStatus::Failed,
            tx_hash: None,
            error: Some(error),
        }
    }
}

/// 一次结算尝试的不可变记录。创建后不再修改，UI 层保留到
/// 下一次结算为止。全腿失败也是合法的可检视结果，与
/// “会话关闭失败、未存任何记录”是两种不同的情况。
#[derive(Debug, Clone)]
pub struct SettlementResult {
    /// 被关闭的链下会话标识。
    pub session_id: String,
    /// 关闭时刻捕获的累计动作数。
    pub action_count: u64,
    /// 关闭时刻捕获的累计节省估算（美元）。
    pub savings_usd: Decimal,
    pub completed_at: OffsetDateTime,
    /// 与合格实体一一对应、保持输入顺序的腿结果。
    pub records: Vec<TransactionRecord>,
}

impl SettlementResult {
    pub fn confirmed_count(&self) -> usize {
        self.records
            .iter()
            .filter(|record| record.status == TransactionStatus::Confirmed)
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.records.len() - self.confirmed_count()
    }
}
