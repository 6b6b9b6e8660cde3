//! CDP client - the core communication layer.
//!
//! Design decisions:
//! 1. Single WebSocket per browser connection (no per-session WS overhead)
//! 2. Async message passing - no locks on send/receive path
//! 3. Request/response matching via ID, events broadcast to subscribers
//! 4. Every request carries a caller timeout - nothing waits forever
//! 5. A dropped connection fails pending requests with `Closed`, which the
//!    caller can tell apart from an ordinary timeout

use dashmap::DashMap;
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::protocol::*;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

#[derive(Error, Debug)]
pub enum CdpError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CDP protocol error: {code} - {message}")]
    Protocol { code: i32, message: String },

    #[error("script evaluation failed: {0}")]
    Script(String),

    #[error("timed out after {0:?} waiting for {1}")]
    Timeout(Duration, String),

    #[error("connection closed")]
    Closed,
}

impl CdpError {
    /// Whether the browser-side connection is gone, as opposed to a single
    /// operation failing on a live connection.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, CdpError::WebSocket(_) | CdpError::Closed)
    }
}

pub type Result<T> = std::result::Result<T, CdpError>;

/// Event subscriber callback
pub type EventCallback = Arc<dyn Fn(CdpEvent) + Send + Sync>;

/// CDP client - manages a single WebSocket connection to the browser
pub struct CdpClient {
    /// Monotonic request ID counter
    next_id: AtomicU64,

    /// Pending requests waiting for responses, keyed by request id
    pending: Arc<DashMap<RequestId, oneshot::Sender<CdpResponse>>>,

    /// Event subscribers, keyed by method name (e.g. "Page.loadEventFired")
    subscribers: Arc<DashMap<String, Vec<EventCallback>>>,

    /// WebSocket write half (wrapped for concurrent sending)
    ws_sink: Arc<RwLock<WsSink>>,

    /// Set once the reader task observes the socket closing
    closed: Arc<AtomicBool>,
}

impl CdpClient {
    /// Connect to a browser's remote debugging endpoint.
    pub async fn connect(ws_url: &str) -> Result<Arc<Self>> {
        let (ws_stream, _) = connect_async(ws_url).await?;
        let (sink, mut stream) = ws_stream.split();

        let client = Arc::new(Self {
            next_id: AtomicU64::new(1),
            pending: Arc::new(DashMap::new()),
            subscribers: Arc::new(DashMap::new()),
            ws_sink: Arc::new(RwLock::new(sink)),
            closed: Arc::new(AtomicBool::new(false)),
        });

        // Reader task. Owns the read half for the life of the connection.
        let reader = client.clone();
        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if let Err(e) = reader.handle_message(&text) {
                            tracing::error!("failed to handle CDP message: {}", e);
                        }
                    }
                    Ok(Message::Close(_)) => {
                        tracing::info!("CDP WebSocket closed by browser");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("CDP WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }

            // Fail everything still in flight so callers see Closed, not a
            // timeout they cannot tell apart from a slow page.
            reader.closed.store(true, Ordering::SeqCst);
            reader.pending.clear();
        });

        Ok(client)
    }

    /// True once the underlying socket has gone away.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send a CDP request and wait for its response, bounded by `timeout`.
    pub async fn send_request(
        &self,
        method: impl Into<String>,
        params: Option<Value>,
        session_id: Option<SessionId>,
        timeout: Duration,
    ) -> Result<Value> {
        if self.is_closed() {
            return Err(CdpError::Closed);
        }

        let method = method.into();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = CdpRequest {
            id,
            method: method.clone(),
            params,
            session_id,
        };

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let json = serde_json::to_string(&request)?;
        {
            let mut sink = self.ws_sink.write().await;
            sink.send(Message::Text(json)).await?;
        }

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            // Sender dropped: the reader task cleared pending on close.
            Ok(Err(_)) => return Err(CdpError::Closed),
            Err(_) => {
                self.pending.remove(&id);
                if self.is_closed() {
                    return Err(CdpError::Closed);
                }
                return Err(CdpError::Timeout(timeout, method));
            }
        };

        if let Some(error) = response.error {
            return Err(CdpError::Protocol {
                code: error.code,
                message: error.message,
            });
        }

        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Subscribe to CDP events by method name.
    pub fn subscribe(&self, method: impl Into<String>, callback: EventCallback) {
        self.subscribers
            .entry(method.into())
            .or_default()
            .push(callback);
    }

    fn handle_message(&self, text: &str) -> Result<()> {
        let msg: CdpMessage = serde_json::from_str(text)?;

        match msg {
            CdpMessage::Response(response) => {
                if let Some((_, tx)) = self.pending.remove(&response.id) {
                    let _ = tx.send(response); // Receiver may have timed out
                } else {
                    tracing::warn!("response for unknown request: {}", response.id);
                }
            }
            CdpMessage::Event(event) => {
                if let Some(subscribers) = self.subscribers.get(&event.method) {
                    for callback in subscribers.value() {
                        callback(event.clone());
                    }
                }
            }
        }

        Ok(())
    }

    /// Close the connection gracefully.
    pub async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        let mut sink = self.ws_sink.write().await;
        sink.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_lost_is_distinct_from_timeout() {
        assert!(CdpError::Closed.is_connection_lost());
        assert!(!CdpError::Timeout(Duration::from_secs(1), "Page.navigate".into())
            .is_connection_lost());
        assert!(!CdpError::Script("boom".into()).is_connection_lost());
    }

    // Real round-trip tests need a running Chrome instance.
    #[tokio::test]
    #[ignore]
    async fn connect_and_get_version() {
        let client = CdpClient::connect("ws://localhost:9222/devtools/browser")
            .await
            .unwrap();

        let result = client
            .send_request("Browser.getVersion", None, None, Duration::from_secs(5))
            .await
            .unwrap();

        println!("Browser version: {:?}", result);
    }
}
