use rust_decimal::Decimal;

pub mod loader;
pub mod types;

pub use loader::*;
pub use types::*;

use self::types as cfg;

pub(crate) fn default_logging_level() -> String {
    "info".to_string()
}

pub(crate) fn default_prometheus_listen() -> String {
    "0.0.0.0:9898".to_string()
}

pub(crate) fn default_session_ws_url() -> String {
    "wss://clearnet.demeter.farm/ws".to_string()
}

pub(crate) fn default_session_application() -> String {
    "demeter-farm-v1".to_string()
}

pub(crate) fn default_session_request_timeout_ms() -> u64 {
    5_000
}

pub(crate) fn default_fallback_savings_per_action_usd() -> Decimal {
    // 每个链下动作约等于省掉一笔 L2 交易的 gas。
    Decimal::new(25, 2)
}

pub(crate) fn default_relay_endpoint() -> String {
    "https://settle.demeter.farm/api/settle".to_string()
}

pub(crate) fn default_relay_timeout_ms() -> u64 {
    8_000
}

pub(crate) fn default_upgrade_apy_step_bps() -> u32 {
    50
}

pub(crate) fn default_entity_level() -> u32 {
    1
}

pub(crate) fn default_entity_apy_bps() -> u32 {
    300
}

impl Default for cfg::DemeterConfig {
    fn default() -> Self {
        Self {
            global: cfg::GlobalConfig::default(),
            session: cfg::SessionConfig::default(),
            relay: cfg::RelayConfig::default(),
            chains: Vec::new(),
            game: cfg::GameConfig::default(),
        }
    }
}

impl Default for cfg::GlobalConfig {
    fn default() -> Self {
        Self {
            wallet: cfg::WalletConfig::default(),
            logging: cfg::LoggingConfig::default(),
            prometheus: cfg::PrometheusConfig::default(),
        }
    }
}

impl Default for cfg::WalletConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
        }
    }
}

impl Default for cfg::LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_logging_level(),
            json: false,
        }
    }
}

impl Default for cfg::PrometheusConfig {
    fn default() -> Self {
        Self {
            enable: false,
            listen: default_prometheus_listen(),
        }
    }
}

impl Default for cfg::SessionConfig {
    fn default() -> Self {
        Self {
            ws_url: default_session_ws_url(),
            application: default_session_application(),
            request_timeout_ms: default_session_request_timeout_ms(),
            fallback_savings_per_action_usd: default_fallback_savings_per_action_usd(),
        }
    }
}

impl Default for cfg::RelayConfig {
    fn default() -> Self {
        Self {
            endpoint: default_relay_endpoint(),
            timeout_ms: default_relay_timeout_ms(),
        }
    }
}

impl Default for cfg::GameConfig {
    fn default() -> Self {
        Self {
            upgrade_apy_step_bps: default_upgrade_apy_step_bps(),
            entities: Vec::new(),
        }
    }
}
