use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::protocols::ProtocolId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemeterConfig {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    /// 每条结算链一个 RPC 入口。
    #[serde(default)]
    pub chains: Vec<ChainRpcConfig>,
    #[serde(default)]
    pub game: GameConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// 玩家地址（0x…）。签名能力由外部钱包提供，这里只作身份展示。
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "super::default_logging_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default = "super::default_prometheus_listen")]
    pub listen: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// 链下会话服务的 WebSocket 端点。
    #[serde(default = "super::default_session_ws_url")]
    pub ws_url: String,
    /// 会话作用域标识，随 session.create 一起上报。
    #[serde(default = "super::default_session_application")]
    pub application: String,
    #[serde(default = "super::default_session_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// 服务端 ack 未携带节省估算时使用的每动作兜底值（美元）。
    #[serde(default = "super::default_fallback_savings_per_action_usd")]
    pub fallback_savings_per_action_usd: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// 托管中继的结算端点。
    #[serde(default = "super::default_relay_endpoint")]
    pub endpoint: String,
    #[serde(default = "super::default_relay_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainRpcConfig {
    pub chain_id: u64,
    pub rpc_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// 每次升级抬高的年化收益（基点）。
    #[serde(default = "super::default_upgrade_apy_step_bps")]
    pub upgrade_apy_step_bps: u32,
    #[serde(default)]
    pub entities: Vec<EntityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityConfig {
    pub id: String,
    pub name: String,
    pub protocol: ProtocolId,
    #[serde(default = "super::default_entity_level")]
    pub level: u32,
    #[serde(default = "super::default_entity_apy_bps")]
    pub apy_bps: u32,
    #[serde(default)]
    pub deposited: Decimal,
    #[serde(default)]
    pub position: [i32; 2],
}
