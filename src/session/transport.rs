use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Message, client::IntoClientRequest, http::HeaderValue},
};
use tracing::{debug, error, trace, warn};
use url::Url;

use super::types::{ClientFrame, ServerFrame};

type PendingSender = oneshot::Sender<Result<Value, TransportError>>;
type PendingMap = HashMap<u64, PendingSender>;
type ConnectorStream = MaybeTlsStream<tokio::net::TcpStream>;
type WsSink = futures::stream::SplitSink<WebSocketStream<ConnectorStream>, Message>;
type WsStream = futures::stream::SplitStream<WebSocketStream<ConnectorStream>>;

const USER_AGENT: &str = "demeter/0.1";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket handshake failed: {0}")]
    Handshake(String),
    #[error("websocket transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("connection closed before the response arrived")]
    ConnectionClosed,
    #[error("timed out waiting for response")]
    Timeout,
    #[error("message serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("server error: code={code} message={message}")]
    Response { code: i32, message: String },
}

/// Request/response seam over the off-chain service. The concrete
/// implementation is a WebSocket client; tests swap in a scripted stub.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError>;

    /// Tear the connection down. Safe to call more than once.
    async fn shutdown(&self);
}

/// Async WebSocket client for the session endpoint.
///
/// One reader task owns the receive half and routes response frames to
/// the pending oneshot matching their `requestId`; frames without one
/// are unsolicited pushes and are dropped after a debug line.
pub struct WsTransport {
    inner: Arc<WsInner>,
    reader_handle: Mutex<Option<JoinHandle<()>>>,
    request_timeout: Duration,
}

struct WsInner {
    sink: Mutex<WsSink>,
    pending: Mutex<PendingMap>,
    next_request_id: AtomicU64,
}

impl WsTransport {
    pub async fn connect(
        endpoint: &Url,
        request_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let mut request = endpoint
            .as_str()
            .into_client_request()
            .map_err(|err| TransportError::Handshake(format!("failed to build request: {err}")))?;
        request
            .headers_mut()
            .insert("User-Agent", HeaderValue::from_static(USER_AGENT));

        let (stream, _response) = connect_async(request).await?;
        let (sink, reader) = stream.split();

        let inner = Arc::new(WsInner {
            sink: Mutex::new(sink),
            pending: Mutex::new(HashMap::new()),
            next_request_id: AtomicU64::new(1),
        });

        let reader_handle = {
            let inner_clone = inner.clone();
            tokio::spawn(async move {
                if let Err(err) = reader_loop(reader, &inner_clone).await {
                    warn!(target: "session::transport", "reader loop terminated: {err:?}");
                }
                // Fail whatever is still in flight so callers never hang.
                let mut pending = inner_clone.pending.lock().await;
                for (_, sender) in pending.drain() {
                    let _ = sender.send(Err(TransportError::ConnectionClosed));
                }
            })
        };

        Ok(Self {
            inner,
            reader_handle: Mutex::new(Some(reader_handle)),
            request_timeout,
        })
    }
}

#[async_trait]
impl SessionTransport for WsTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let id = self.inner.next_request_id.fetch_add(1, Ordering::Relaxed);
        let frame = ClientFrame {
            request_id: id,
            method,
            params,
        };
        let payload = serde_json::to_string(&frame)?;

        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().await.insert(id, tx);

        trace!(target: "session::transport", request_id = id, method, "sending frame");
        {
            let mut sink = self.inner.sink.lock().await;
            if let Err(err) = sink.send(Message::Text(payload.into())).await {
                self.inner.pending.lock().await.remove(&id);
                return Err(TransportError::Transport(err));
            }
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::ConnectionClosed),
            Err(_) => {
                self.inner.pending.lock().await.remove(&id);
                Err(TransportError::Timeout)
            }
        }
    }

    async fn shutdown(&self) {
        if let Some(handle) = self.reader_handle.lock().await.take() {
            handle.abort();
        }
        let mut sink = self.inner.sink.lock().await;
        let _ = sink.send(Message::Close(None)).await;
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.reader_handle.try_lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}

async fn reader_loop(mut reader: WsStream, inner: &Arc<WsInner>) -> Result<(), TransportError> {
    while let Some(message) = reader.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if let Err(err) = handle_text_frame(inner, text.as_str()).await {
                    error!(target: "session::transport", "failed to handle frame: {err:?}");
                }
            }
            Ok(Message::Close(frame)) => {
                warn!(target: "session::transport", "server closed the connection: {frame:?}");
                break;
            }
            Ok(Message::Ping(payload)) => {
                let mut sink = inner.sink.lock().await;
                if let Err(err) = sink.send(Message::Pong(payload)).await {
                    error!(target: "session::transport", "failed to send pong: {err}");
                }
            }
            Ok(Message::Pong(_)) => {
                trace!(target: "session::transport", "received pong");
            }
            Ok(other) => {
                debug!(target: "session::transport", "ignoring non-text message: {other:?}");
            }
            Err(err) => return Err(TransportError::Transport(err)),
        }
    }
    Ok(())
}

async fn handle_text_frame(inner: &Arc<WsInner>, text: &str) -> Result<(), TransportError> {
    let frame: ServerFrame = serde_json::from_str(text)?;

    let Some(request_id) = frame.request_id else {
        debug!(
            target: "session::transport",
            method = frame.method.as_deref().unwrap_or("<none>"),
            "dropping unsolicited frame"
        );
        return Ok(());
    };

    let sender = inner.pending.lock().await.remove(&request_id);
    let Some(sender) = sender else {
        warn!(
            target: "session::transport",
            request_id,
            "received response for unknown request id"
        );
        return Ok(());
    };

    let outcome = if let Some(error) = frame.error {
        Err(TransportError::Response {
            code: error.code,
            message: error.message,
        })
    } else {
        Ok(frame.result.unwrap_or(Value::Null))
    };
    let _ = sender.send(outcome);
    Ok(())
}
