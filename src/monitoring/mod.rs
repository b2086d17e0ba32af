use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use tracing::info;

use crate::config::PrometheusConfig;

static EXPORTER: OnceCell<()> = OnceCell::new();
static PROMETHEUS_ENABLED: AtomicBool = AtomicBool::new(false);

/// 按配置安装 Prometheus 导出器；未启用时保持禁用状态，
/// 所有打点在 [`prometheus_enabled`] 处短路。重复调用无害。
pub fn init_metrics(config: &PrometheusConfig) -> Result<()> {
    if !config.enable {
        return Ok(());
    }
    EXPORTER
        .get_or_try_init(|| {
            let addr: SocketAddr = config
                .listen
                .parse()
                .with_context(|| format!("invalid prometheus listen address: {}", config.listen))?;
            PrometheusBuilder::new()
                .with_http_listener(addr)
                .install()
                .context("failed to install prometheus exporter")?;
            PROMETHEUS_ENABLED.store(true, Ordering::Relaxed);
            info!(target: "monitoring", listen = %addr, "prometheus 导出器已启动");
            Ok(())
        })
        .map(|_| ())
}

pub fn prometheus_enabled() -> bool {
    PROMETHEUS_ENABLED.load(Ordering::Relaxed)
}
