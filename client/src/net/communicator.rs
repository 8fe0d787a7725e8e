//! WebSocket communicator — the client's transport adapter.
//!
//! DESIGN
//! ======
//! One writer task drains the bounded outbound queue into the socket sink;
//! one reader task decodes inbound text frames and routes them to every
//! registered listener. `send` never blocks: a full queue is surfaced to the
//! caller as a transport error. The communicator is an owned handle created
//! once at process init and threaded into its consumers.

#[cfg(test)]
#[path = "communicator_test.rs"]
mod tests;

use std::sync::{Arc, PoisonError, RwLock};

use board::UserLevel;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use wire::Envelope;

use crate::state::manager::{SinkError, UpdateSink};

/// Outbound queue depth; `send` fails once this many envelopes are pending.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Receives every envelope decoded off the wire.
pub trait ServerUpdateListener: Send + Sync {
    fn on_server_update(&self, envelope: Envelope);
}

#[derive(Debug, thiserror::Error)]
pub enum CommError {
    #[error("websocket connect failed: {0}")]
    Connect(Box<tokio_tungstenite::tungstenite::Error>),
}

type Listeners = Arc<RwLock<Vec<Arc<dyn ServerUpdateListener>>>>;

/// Live connection to the whiteboard server.
pub struct Communicator {
    out_tx: mpsc::Sender<Envelope>,
    listeners: Listeners,
}

impl Communicator {
    /// Connect to a server and spawn the reader and writer tasks.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::Connect`] if the WebSocket handshake fails.
    pub async fn connect(url: &str) -> Result<Self, CommError> {
        let (socket, _) = connect_async(url)
            .await
            .map_err(|e| CommError::Connect(Box::new(e)))?;
        let (mut sink, mut stream) = socket.split();

        let (out_tx, mut out_rx) = mpsc::channel::<Envelope>(OUTBOUND_QUEUE_CAPACITY);
        let listeners: Listeners = Arc::new(RwLock::new(Vec::new()));

        tokio::spawn(async move {
            while let Some(envelope) = out_rx.recv().await {
                match wire::encode_envelope(&envelope) {
                    Ok(text) => {
                        if sink.send(Message::Text(text.into())).await.is_err() {
                            warn!("ws: send failed, writer stopping");
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "ws: envelope encode failed"),
                }
            }
        });

        let reader_listeners = Arc::clone(&listeners);
        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let Ok(msg) = msg else { break };
                let Message::Text(text) = msg else { continue };
                match wire::decode_envelope(&text) {
                    Ok(envelope) => {
                        let listeners =
                            reader_listeners.read().unwrap_or_else(PoisonError::into_inner);
                        for listener in listeners.iter() {
                            listener.on_server_update(envelope.clone());
                        }
                    }
                    Err(e) => warn!(error = %e, "ws: undecodable frame skipped"),
                }
            }
            debug!("ws: reader stopped");
        });

        Ok(Self { out_tx, listeners })
    }

    /// Register a listener for inbound envelopes.
    pub fn subscribe(&self, listener: Arc<dyn ServerUpdateListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// The whiteboard endpoint URL for a server base, user id, and claimed
    /// permission level.
    #[must_use]
    pub fn endpoint(base: &str, user: &str, level: UserLevel) -> String {
        let level = match level {
            UserLevel::Low => "low",
            UserLevel::High => "high",
        };
        format!("{base}/ws/whiteboard?user={user}&level={level}")
    }
}

impl UpdateSink for Communicator {
    fn send(&self, envelope: &Envelope) -> Result<(), SinkError> {
        self.out_tx
            .try_send(envelope.clone())
            .map_err(|e| SinkError(e.to_string()))
    }
}
