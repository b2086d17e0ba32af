//! Wire types for the off-chain session protocol.
//!
//! Frames are JSON objects correlated by a numeric `requestId`. Server
//! frames without one are unsolicited pushes and are dropped by the
//! transport after a debug log line.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::game::{ActionKind, GameEntity};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientFrame<'a> {
    pub request_id: u64,
    pub method: &'a str,
    pub params: Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerFrame {
    #[serde(default)]
    pub request_id: Option<u64>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<WireError>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireError {
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequestParams {
    pub address: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthChallenge {
    pub challenge: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthVerifyParams {
    pub address: String,
    pub challenge: String,
    /// Hex-encoded signature over the challenge bytes.
    pub signature: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreateParams {
    pub owner: String,
    pub application: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionParams<'a> {
    pub session_id: &'a str,
    pub owner: String,
    pub kind: ActionKind,
    pub entity_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    /// Defensive snapshot of the board state accompanying the update.
    pub entities: &'a [GameEntity],
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionAck {
    pub accepted: bool,
    #[serde(default)]
    pub estimated_savings_usd: Option<Decimal>,
}

/// Final allocation entry handed to the service on close.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    pub asset: String,
    pub destination: String,
    pub amount: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCloseParams<'a> {
    pub session_id: &'a str,
    pub owner: String,
    pub allocations: &'a [Allocation],
}
