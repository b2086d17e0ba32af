pub mod error;
pub mod manager;
pub mod transport;
pub mod types;

pub use error::SessionError;
pub use manager::{SessionManager, SessionState, TransportConnector, WsConnector};
pub use transport::{SessionTransport, TransportError, WsTransport};
pub use types::Allocation;
