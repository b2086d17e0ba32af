pub mod aave;
pub mod compound;
pub mod erc20;
pub mod framework;
pub mod treasury;

pub use aave::AaveAdapter;
pub use compound::CompoundAdapter;
pub use framework::{AdapterError, LegContext, ProtocolAdapter};
pub use treasury::TreasuryAdapter;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::RelayConfig;

/// 收益协议的封闭枚举。
///
/// 新增协议时必须同步更新 [`crate::chain::chain_for`] 与
/// [`AdapterDispatch::adapter_for`]，两处都是穷尽匹配，漏改无法编译。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolId {
    Aave,
    Spark,
    Compound,
    Treasury,
    /// 只参与收益估算的模拟协议，不可上链结算。
    Simulated,
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProtocolId::Aave => "aave",
            ProtocolId::Spark => "spark",
            ProtocolId::Compound => "compound",
            ProtocolId::Treasury => "treasury",
            ProtocolId::Simulated => "simulated",
        };
        f.write_str(name)
    }
}

/// 协议到适配器的分发面。生产实现是 [`AdapterSet`]。
pub trait AdapterDispatch: Send + Sync {
    fn adapter_for(&self, protocol: ProtocolId) -> Option<&dyn ProtocolAdapter>;
}

/// 协议到适配器的固定分发表。
pub struct AdapterSet {
    aave: AaveAdapter,
    compound: CompoundAdapter,
    treasury: TreasuryAdapter,
}

impl AdapterSet {
    pub fn new(http_client: reqwest::Client, relay: &RelayConfig) -> Self {
        Self {
            aave: AaveAdapter::new(),
            compound: CompoundAdapter::new(),
            treasury: TreasuryAdapter::new(http_client, relay),
        }
    }
}

impl AdapterDispatch for AdapterSet {
    /// `Simulated` 没有适配器；Spark 与 Aave 共享同一个底层市场，
    /// 显式别名到同一个适配器实例。
    fn adapter_for(&self, protocol: ProtocolId) -> Option<&dyn ProtocolAdapter> {
        match protocol {
            ProtocolId::Aave => Some(&self.aave),
            ProtocolId::Spark => Some(&self.aave),
            ProtocolId::Compound => Some(&self.compound),
            ProtocolId::Treasury => Some(&self.treasury),
            ProtocolId::Simulated => None,
        }
    }
}
