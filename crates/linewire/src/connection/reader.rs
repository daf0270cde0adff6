//! The read loop and the state it shares with callers.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio_util::codec::{FramedRead, FramedWrite};
use uuid::Uuid;

use crate::codec::LineCodec;
use crate::error::{error_codes, WireError, WireResult};
use crate::message::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId,
};

use super::pending::{lock_table, PendingTable};
use super::state::ConnectionState;
use super::SHUTDOWN_METHOD;

pub(crate) type BoxedReader = Pin<Box<dyn AsyncRead + Send>>;
pub(crate) type BoxedWriter = Pin<Box<dyn AsyncWrite + Send>>;
pub(crate) type LineWriter = FramedWrite<BoxedWriter, LineCodec>;

/// Method the peer may use to check liveness; always answered with `{}`.
const PING_METHOD: &str = "ping";

/// Everything the read loop and the callers both touch.
pub(crate) struct Shared {
    pub id: Uuid,
    pub pending: Arc<Mutex<PendingTable>>,
    pub state: watch::Sender<ConnectionState>,
    pub writer: tokio::sync::Mutex<Option<LineWriter>>,
    /// Upper bound on one write, lock wait included.
    pub write_timeout: Duration,
    pub notifications: Option<mpsc::Sender<JsonRpcNotification>>,
    pub errors: Option<mpsc::Sender<WireError>>,
}

impl Shared {
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Move the state forward; backwards transitions are ignored.
    pub fn advance(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if next > *current {
                *current = next;
                true
            } else {
                false
            }
        });
        if changed {
            tracing::info!(connection = %self.id, "Connection {next}");
        }
    }

    /// Write one message as a line and flush it. A peer that stops reading
    /// turns into a `Write` error after `write_timeout`.
    pub async fn write(&self, message: JsonRpcMessage) -> WireResult<()> {
        let send = async {
            let mut guard = self.writer.lock().await;
            let Some(framed) = guard.as_mut() else {
                return Err(WireError::ConnectionClosed);
            };
            framed.send(message).await.map_err(|e| match e {
                WireError::Io(io) => WireError::Write(io.to_string()),
                other => other,
            })
        };
        match tokio::time::timeout(self.write_timeout, send).await {
            Ok(result) => result,
            Err(_) => Err(WireError::Write(format!(
                "write did not complete within {:?}",
                self.write_timeout
            ))),
        }
    }

    /// Fail every pending request and end in `Closed`.
    pub fn teardown(&self, reason: &str) {
        self.advance(ConnectionState::Closing);
        let failed = lock_table(&self.pending).fail_all();
        if failed > 0 {
            tracing::warn!(
                connection = %self.id,
                "Failing {failed} pending request(s): {reason}"
            );
        }
        self.advance(ConnectionState::Closed);
    }

    /// Surface a non-fatal problem to the log and the error observer.
    pub fn report(&self, error: WireError) {
        tracing::warn!(connection = %self.id, "{error}");
        if let Some(tx) = &self.errors {
            match tx.try_send(error) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(dropped)) => {
                    tracing::warn!(connection = %self.id, "Error observer full, dropping: {dropped}");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!(connection = %self.id, "Error observer gone");
                }
            }
        }
    }

    fn dispatch(self: &Arc<Self>, message: JsonRpcMessage) {
        match message {
            JsonRpcMessage::Response(_) | JsonRpcMessage::Error(_) => {
                let id = message.id().cloned().unwrap_or(RequestId::Null);
                let completed = lock_table(&self.pending).complete(&id, message);
                match completed {
                    Some(method) => {
                        tracing::debug!(connection = %self.id, %id, %method, "Response delivered");
                    }
                    None => self.report(WireError::UnexpectedResponse(id)),
                }
            }
            JsonRpcMessage::Notification(notification) => self.notify(notification),
            JsonRpcMessage::Request(request) => self.answer(request),
        }
    }

    fn notify(&self, notification: JsonRpcNotification) {
        let Some(tx) = &self.notifications else {
            tracing::debug!(connection = %self.id, method = %notification.method, "Notification discarded");
            return;
        };
        match tx.try_send(notification) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                tracing::warn!(
                    connection = %self.id,
                    method = %dropped.method,
                    "Notification observer full, dropping"
                );
            }
            Err(mpsc::error::TrySendError::Closed(dropped)) => {
                tracing::debug!(connection = %self.id, method = %dropped.method, "Notification observer gone");
            }
        }
    }

    /// Reply to a request the peer sent us. The write happens on its own task
    /// so the read loop never waits on the writer lock.
    ///
    /// A peer `shutdown` is acknowledged and moves us to `Closing`.
    fn answer(self: &Arc<Self>, request: JsonRpcRequest) {
        let empty = || Value::Object(serde_json::Map::new());
        let reply: JsonRpcMessage = match request.method.as_str() {
            PING_METHOD => JsonRpcResponse::new(request.id, empty()).into(),
            SHUTDOWN_METHOD => {
                tracing::info!(connection = %self.id, "Peer requested shutdown");
                self.advance(ConnectionState::Closing);
                JsonRpcResponse::new(request.id, empty()).into()
            }
            method => {
                tracing::debug!(connection = %self.id, method, "Rejecting peer request");
                JsonRpcError::new(
                    request.id,
                    error_codes::METHOD_NOT_FOUND,
                    format!("Method not found: {method}"),
                )
                .into()
            }
        };

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = shared.write(reply).await {
                tracing::warn!(connection = %shared.id, "Failed to answer peer request: {e}");
            }
        });
    }
}

/// Drain the input stream until EOF or a read error, then tear down.
pub(crate) async fn read_loop(mut frames: FramedRead<BoxedReader, LineCodec>, shared: Arc<Shared>) {
    tracing::debug!(connection = %shared.id, "Read loop started");

    let reason = loop {
        match frames.next().await {
            Some(Ok(Ok(message))) => {
                tracing::trace!(connection = %shared.id, "Received {message:?}");
                shared.dispatch(message);
            }
            Some(Ok(Err(e))) => shared.report(e),
            Some(Err(e)) => {
                tracing::error!(connection = %shared.id, "Read failed: {e}");
                break "read error";
            }
            None => {
                tracing::info!(connection = %shared.id, "EOF on input stream");
                break "end of stream";
            }
        }
    };

    shared.teardown(reason);
}
