//! 跨链转账进度跟踪器。
//!
//! 消费外部转账流程（approve → burn → 取证明 → mint）的事件流，
//! 映射到一个小型状态机并维护一份带时间戳的可读日志，供 UI
//! 直接渲染。纯状态机，不做任何 I/O。

use std::fmt;

use serde::Deserialize;
use time::OffsetDateTime;
use tracing::debug;

/// 当前所处的转账步骤。`Completed` 与 `Error` 是终态，
/// 只有 [`BridgeProgress::reset`] 能离开。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeStep {
    Idle,
    Approving,
    Burning,
    WaitingAttestation,
    Minting,
    Completed,
    Error,
}

impl fmt::Display for BridgeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BridgeStep::Idle => "idle",
            BridgeStep::Approving => "approving",
            BridgeStep::Burning => "burning",
            BridgeStep::WaitingAttestation => "waiting-attestation",
            BridgeStep::Minting => "minting",
            BridgeStep::Completed => "completed",
            BridgeStep::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransferMethod {
    Approve,
    Burn,
    FetchAttestation,
    Mint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventPhase {
    Success,
    Error,
    Pending,
}

/// 转账库推送的一条事件。缺少 `method` 的事件整条忽略。
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferEvent {
    #[serde(default)]
    pub method: Option<TransferMethod>,
    pub phase: EventPhase,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LogLine {
    pub at: OffsetDateTime,
    pub text: String,
}

/// 进度状态：当前步骤 + 只追加的日志。
/// 只有事件处理器修改它，`reset` 是唯一的清空手段。
#[derive(Debug)]
pub struct BridgeProgress {
    step: BridgeStep,
    log: Vec<LogLine>,
}

impl Default for BridgeProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeProgress {
    pub fn new() -> Self {
        Self {
            step: BridgeStep::Idle,
            log: Vec::new(),
        }
    }

    pub fn step(&self) -> BridgeStep {
        self.step
    }

    pub fn log(&self) -> &[LogLine] {
        &self.log
    }

    /// UI 发起转账时调用：`idle → approving` 并写入起始日志行。
    pub fn begin(&mut self) {
        if self.step != BridgeStep::Idle {
            return;
        }
        self.step = BridgeStep::Approving;
        self.append("转账开始，等待授权", None);
    }

    /// 回到 `idle` 并清空日志，是离开终态的唯一方式。
    pub fn reset(&mut self) {
        self.step = BridgeStep::Idle;
        self.log.clear();
    }

    /// 按转换表推进状态机。终态吸收一切事件；`fetchAttestation`
    /// 的 pending / error 不转移（证明服务会自行重试）。
    pub fn handle_event(&mut self, event: &TransferEvent) {
        let Some(method) = event.method else {
            debug!(target: "bridge::tracker", "忽略缺少 method 的事件");
            return;
        };
        if matches!(self.step, BridgeStep::Completed | BridgeStep::Error) {
            return;
        }

        match (method, event.phase) {
            (TransferMethod::Approve, EventPhase::Success) => {
                self.step = BridgeStep::Burning;
                self.append("授权完成，开始销毁", event.tx_hash.as_deref());
            }
            (TransferMethod::Burn, EventPhase::Success) => {
                self.step = BridgeStep::WaitingAttestation;
                self.append("销毁完成，等待跨链证明", event.tx_hash.as_deref());
            }
            (TransferMethod::FetchAttestation, EventPhase::Success) => {
                self.step = BridgeStep::Minting;
                self.append("证明已取得，开始铸造", event.tx_hash.as_deref());
            }
            (TransferMethod::Mint, EventPhase::Success) => {
                self.step = BridgeStep::Completed;
                self.append("铸造完成，转账结束", event.tx_hash.as_deref());
            }
            (TransferMethod::FetchAttestation, EventPhase::Pending | EventPhase::Error) => {
                // 停在 waiting-attestation，等下一轮轮询。
            }
            (_, EventPhase::Error) => {
                self.step = BridgeStep::Error;
                let reason = event.message.as_deref().unwrap_or("未知错误");
                self.append(&format!("转账失败: {reason}"), event.tx_hash.as_deref());
            }
            (_, EventPhase::Pending) => {}
        }
    }

    fn append(&mut self, text: &str, tx_hash: Option<&str>) {
        let text = match tx_hash {
            Some(hash) => format!("{text} (tx: {hash})"),
            None => text.to_string(),
        };
        self.log.push(LogLine {
            at: OffsetDateTime::now_utc(),
            text,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(method: Option<TransferMethod>, phase: EventPhase) -> TransferEvent {
        TransferEvent {
            method,
            phase,
            tx_hash: None,
            message: None,
        }
    }

    #[test]
    fn happy_path_reaches_completed() {
        let mut progress = BridgeProgress::new();
        assert_eq!(progress.step(), BridgeStep::Idle);

        progress.handle_event(&event(Some(TransferMethod::Approve), EventPhase::Success));
        assert_eq!(progress.step(), BridgeStep::Burning);
        progress.handle_event(&event(Some(TransferMethod::Burn), EventPhase::Success));
        assert_eq!(progress.step(), BridgeStep::WaitingAttestation);
        progress.handle_event(&event(
            Some(TransferMethod::FetchAttestation),
            EventPhase::Success,
        ));
        assert_eq!(progress.step(), BridgeStep::Minting);
        progress.handle_event(&event(Some(TransferMethod::Mint), EventPhase::Success));
        assert_eq!(progress.step(), BridgeStep::Completed);

        assert_eq!(progress.log().len(), 4);
    }

    #[test]
    fn pending_attestation_stays_waiting() {
        let mut progress = BridgeProgress::new();
        progress.handle_event(&event(Some(TransferMethod::Burn), EventPhase::Success));
        assert_eq!(progress.step(), BridgeStep::WaitingAttestation);

        progress.handle_event(&event(
            Some(TransferMethod::FetchAttestation),
            EventPhase::Pending,
        ));
        assert_eq!(progress.step(), BridgeStep::WaitingAttestation);
    }

    #[test]
    fn error_is_terminal_until_reset() {
        let mut progress = BridgeProgress::new();
        progress.handle_event(&event(Some(TransferMethod::Approve), EventPhase::Error));
        assert_eq!(progress.step(), BridgeStep::Error);

        // 终态吸收后续事件。
        progress.handle_event(&event(Some(TransferMethod::Burn), EventPhase::Success));
        assert_eq!(progress.step(), BridgeStep::Error);

        progress.reset();
        assert_eq!(progress.step(), BridgeStep::Idle);
        assert!(progress.log().is_empty());
    }

    #[test]
    fn completed_is_terminal_until_reset() {
        let mut progress = BridgeProgress::new();
        progress.handle_event(&event(Some(TransferMethod::Mint), EventPhase::Success));
        assert_eq!(progress.step(), BridgeStep::Completed);

        progress.handle_event(&event(Some(TransferMethod::Approve), EventPhase::Error));
        assert_eq!(progress.step(), BridgeStep::Completed);
    }

    #[test]
    fn events_without_method_are_noops() {
        let mut progress = BridgeProgress::new();
        progress.handle_event(&event(None, EventPhase::Success));
        assert_eq!(progress.step(), BridgeStep::Idle);
        assert!(progress.log().is_empty());
    }

    #[test]
    fn mid_flight_error_carries_the_message() {
        let mut progress = BridgeProgress::new();
        progress.handle_event(&event(Some(TransferMethod::Approve), EventPhase::Success));
        progress.handle_event(&TransferEvent {
            method: Some(TransferMethod::Burn),
            phase: EventPhase::Error,
            tx_hash: None,
            message: Some("burn reverted".into()),
        });
        assert_eq!(progress.step(), BridgeStep::Error);
        assert!(progress.log().last().unwrap().text.contains("burn reverted"));
    }

    #[test]
    fn begin_moves_idle_to_approving_only() {
        let mut progress = BridgeProgress::new();
        progress.begin();
        assert_eq!(progress.step(), BridgeStep::Approving);
        let lines = progress.log().len();

        // 非 idle 状态下 begin 不做任何事。
        progress.begin();
        assert_eq!(progress.step(), BridgeStep::Approving);
        assert_eq!(progress.log().len(), lines);
    }

    #[test]
    fn tx_hash_is_included_in_log_lines() {
        let mut progress = BridgeProgress::new();
        progress.handle_event(&TransferEvent {
            method: Some(TransferMethod::Approve),
            phase: EventPhase::Success,
            tx_hash: Some("0xabc".into()),
            message: None,
        });
        assert!(progress.log()[0].text.contains("0xabc"));
    }
}
