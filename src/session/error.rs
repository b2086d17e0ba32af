use thiserror::Error;

use super::transport::TransportError;

/// Failure taxonomy of the off-chain session layer.
///
/// `Auth` covers signer rejection and transport setup during `connect`;
/// `Session` covers open/submit rejections; `Settlement` is a failed or
/// timed-out session close and aborts the whole settlement attempt.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session endpoint: {0}")]
    Endpoint(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("not connected to the session endpoint")]
    NotConnected,
    #[error("no open session")]
    NoSession,
    #[error("session rejected: {0}")]
    Session(String),
    #[error("session close failed: {0}")]
    Settlement(String),
    #[error("off-chain transport error: {0}")]
    Transport(#[from] TransportError),
}
