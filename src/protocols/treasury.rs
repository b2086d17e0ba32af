//! 国库券（T-Bill）场馆的托管中继适配器。
//!
//! 该场馆的记账资产普通用户拿不到，链上存入由中继服务用独立
//! 持有的签名权执行；适配器只负责发起 `{player, amount}` 请求，
//! 等待并把端点的成功/失败翻译成统一的交易哈希/错误契约。

use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::B256;
use async_trait::async_trait;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::framework::{AdapterError, LegContext, ProtocolAdapter};
use crate::config::RelayConfig;
use crate::monitoring::prometheus_enabled;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequest {
    pub player: String,
    pub amount: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub status: String,
    #[serde(default)]
    pub settle_hash: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

pub struct TreasuryAdapter {
    endpoint: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl TreasuryAdapter {
    pub fn new(client: reqwest::Client, config: &RelayConfig) -> Self {
        let trimmed = config.endpoint.trim();
        let normalized = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        };
        Self {
            endpoint: normalized,
            client,
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    fn record_metrics(&self, result: &str, elapsed_ms: Option<f64>) {
        if !prometheus_enabled() {
            return;
        }
        let result = result.to_string();
        counter!("demeter_relay_settle_requests_total", "result" => result.clone()).increment(1);
        if let Some(ms) = elapsed_ms {
            histogram!("demeter_relay_settle_latency_ms", "result" => result).record(ms);
        }
    }
}

#[async_trait]
impl ProtocolAdapter for TreasuryAdapter {
    fn venue(&self) -> &'static str {
        "treasury-relay"
    }

    async fn supply(&self, ctx: &LegContext<'_>, amount_minor: u64) -> Result<B256, AdapterError> {
        let wallet = ctx.require_wallet(self.venue())?;
        let request = SettleRequest {
            player: wallet.address.to_string(),
            amount: amount_minor,
        };

        debug!(
            target: "protocols::treasury",
            endpoint = %self.endpoint,
            player = %request.player,
            amount = request.amount,
            "开始请求中继结算"
        );
        let started = std::time::Instant::now();

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|err| {
                self.record_metrics("transport_error", None);
                AdapterError::RelayTransport(err)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|err| format!("<body decode failed: {err}>"));
            let body_summary = summarize_error_body(body_text);
            warn!(
                target: "protocols::treasury",
                status = status.as_u16(),
                endpoint = %self.endpoint,
                body = %body_summary,
                "中继端点返回非 2xx 状态"
            );
            self.record_metrics("http_error", None);
            return Err(AdapterError::Relay {
                status: status.to_string(),
                message: body_summary,
            });
        }

        let settle: SettleResponse = response.json().await.map_err(|err| {
            self.record_metrics("decode_error", None);
            AdapterError::RelaySchema(format!("解析中继响应失败: {err}"))
        })?;

        if settle.status != "confirmed" {
            self.record_metrics("rejected", None);
            return Err(AdapterError::Relay {
                status: settle.status,
                message: settle
                    .message
                    .unwrap_or_else(|| "(no message)".to_string()),
            });
        }

        let hash_text = settle
            .settle_hash
            .ok_or_else(|| AdapterError::RelaySchema("确认响应缺少 settleHash".to_string()))?;
        let tx = B256::from_str(hash_text.trim()).map_err(|err| {
            AdapterError::RelaySchema(format!("settleHash 不是合法的交易哈希: {err}"))
        })?;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;
        self.record_metrics("success", Some(elapsed_ms));
        info!(
            target: "protocols::treasury",
            tx = %tx,
            amount = amount_minor,
            elapsed_ms = format_args!("{elapsed_ms:.3}"),
            "中继结算已确认"
        );
        Ok(tx)
    }
}

fn summarize_error_body(body: String) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "(empty response body)".to_string()
    } else {
        let mut single_line = trimmed.replace(['\n', '\r'], " ");
        const MAX_LEN: usize = 512;
        if single_line.len() > MAX_LEN {
            single_line.truncate(MAX_LEN);
            single_line.push('…');
        }
        single_line
    }
}
