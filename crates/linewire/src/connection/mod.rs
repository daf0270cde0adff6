//! Request/response correlation over one line-delimited connection.
//!
//! A [`Connection`] owns one read loop task and the table of pending
//! requests. Callers may send requests concurrently from any number of
//! tasks; replies are matched strictly by id, never by send order.

mod pending;
mod reader;
mod state;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::SinkExt;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use uuid::Uuid;

use crate::codec::{encode_value, LineCodec};
use crate::config::WireConfig;
use crate::error::{WireError, WireResult};
use crate::message::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, RequestId};

use pending::{lock_table, PendingTable};
use reader::{read_loop, BoxedReader, BoxedWriter, Shared};

pub use pending::PendingHandle;
pub use state::ConnectionState;

/// Method whose request moves the connection to `Closing`.
pub const SHUTDOWN_METHOD: &str = "shutdown";

/// Notification sent when the caller gives up on a request.
pub const CANCELLED_NOTIFICATION: &str = "notifications/cancelled";

/// Configures observers and tunables, then opens a [`Connection`].
#[derive(Default)]
pub struct ConnectionBuilder {
    config: WireConfig,
    notifications: Option<mpsc::Sender<JsonRpcNotification>>,
    errors: Option<mpsc::Sender<WireError>>,
}

impl ConnectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: WireConfig) -> Self {
        self.config = config;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn max_line_bytes(mut self, max: usize) -> Self {
        self.config.max_line_bytes = max;
        self
    }

    /// Deliver server-initiated notifications to `tx`. Delivery never blocks
    /// the read loop: when the channel is full the notification is dropped
    /// and logged.
    pub fn on_notification(mut self, tx: mpsc::Sender<JsonRpcNotification>) -> Self {
        self.notifications = Some(tx);
        self
    }

    /// Deliver non-fatal protocol errors (bad lines, unmatched responses) to
    /// `tx`, with the same drop-when-full policy.
    pub fn on_error(mut self, tx: mpsc::Sender<WireError>) -> Self {
        self.errors = Some(tx);
        self
    }

    /// Open the connection over a byte stream pair and start the read loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open<R, W>(self, reader: R, writer: W) -> Connection
    where
        R: AsyncRead + Send + 'static,
        W: AsyncWrite + Send + 'static,
    {
        let id = Uuid::new_v4();
        let (state, _) = watch::channel(ConnectionState::Unopened);

        let reader: BoxedReader = Box::pin(reader);
        let writer: BoxedWriter = Box::pin(writer);
        let codec = LineCodec::with_max_line_bytes(self.config.max_line_bytes);

        let shared = Arc::new(Shared {
            id,
            pending: Arc::new(Mutex::new(PendingTable::new())),
            state,
            writer: tokio::sync::Mutex::new(Some(FramedWrite::new(writer, codec.clone()))),
            write_timeout: self.config.request_timeout,
            notifications: self.notifications,
            errors: self.errors,
        });

        shared.advance(ConnectionState::Open);
        let task = tokio::spawn(read_loop(FramedRead::new(reader, codec), shared.clone()));

        Connection {
            inner: Arc::new(Inner {
                shared,
                config: self.config,
                next_id: AtomicI64::new(1),
                reader: Mutex::new(Some(task)),
            }),
        }
    }
}

struct Inner {
    shared: Arc<Shared>,
    config: WireConfig,
    next_id: AtomicI64,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let task = self
            .reader
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
        if self.shared.state() != ConnectionState::Closed {
            self.shared.teardown("connection dropped");
        }
    }
}

/// One JSON-RPC connection. Cheap to clone; all clones share the same
/// pending table and read loop.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Open with default configuration and no observers.
    pub fn open<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + 'static,
        W: AsyncWrite + Send + 'static,
    {
        ConnectionBuilder::new().open(reader, writer)
    }

    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::new()
    }

    /// Identifier used in log lines for this connection.
    pub fn id(&self) -> Uuid {
        self.inner.shared.id
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.shared.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.shared.state.subscribe()
    }

    pub fn config(&self) -> &WireConfig {
        &self.inner.config
    }

    /// Number of requests still waiting for a response.
    pub fn pending_count(&self) -> usize {
        lock_table(&self.inner.shared.pending).len()
    }

    fn ensure_open(&self) -> WireResult<()> {
        if self.state().accepts_requests() {
            Ok(())
        } else {
            Err(WireError::ConnectionClosed)
        }
    }

    /// Send a request and return a handle for its response.
    ///
    /// The pending entry is registered before the line is written, so a
    /// reply can never arrive ahead of its registration.
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> WireResult<PendingHandle> {
        self.ensure_open()?;
        let shared = &self.inner.shared;

        let id = RequestId::Number(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let rx = lock_table(&shared.pending).register(id.clone(), method)?;
        let handle = PendingHandle::new(id.clone(), method, rx, shared.pending.clone());

        tracing::debug!(connection = %shared.id, %id, method, "Sending request");
        let request = JsonRpcRequest::new(id, method, params);
        match shared.write(request.into()).await {
            Ok(()) => {}
            Err(e @ WireError::Encoding(_)) => return Err(e),
            Err(e) => {
                tracing::error!(connection = %shared.id, method, "Write failed: {e}");
                shared.teardown("write failed");
                return Err(e);
            }
        }

        if method == SHUTDOWN_METHOD {
            shared.advance(ConnectionState::Closing);
        }

        Ok(handle)
    }

    /// Typed variant of [`Connection::send_request`].
    pub async fn send_request_with<P: Serialize + ?Sized>(
        &self,
        method: &str,
        params: &P,
    ) -> WireResult<PendingHandle> {
        let params = encode_value(params)?;
        self.send_request(method, Some(params)).await
    }

    /// Send a notification. Nothing is registered and no reply is expected.
    pub async fn send_notification(&self, method: &str, params: Option<Value>) -> WireResult<()> {
        self.ensure_open()?;
        let shared = &self.inner.shared;

        tracing::debug!(connection = %shared.id, method, "Sending notification");
        match shared.write(JsonRpcNotification::new(method, params).into()).await {
            Ok(()) => Ok(()),
            Err(e @ WireError::Encoding(_)) => Err(e),
            Err(e) => {
                tracing::error!(connection = %shared.id, method, "Write failed: {e}");
                shared.teardown("write failed");
                Err(e)
            }
        }
    }

    /// Wait for the response to `handle`.
    ///
    /// On timeout the pending entry is removed; other requests are unaffected.
    pub async fn await_response(
        &self,
        handle: PendingHandle,
        timeout: Duration,
    ) -> WireResult<JsonRpcMessage> {
        handle.wait(timeout).await
    }

    /// Send a request and wait for its result with the configured timeout.
    ///
    /// An error reply becomes [`WireError::Remote`]. A timeout also tells the
    /// peer the request was cancelled.
    pub async fn request(&self, method: &str, params: Option<Value>) -> WireResult<Value> {
        let handle = self.send_request(method, params).await?;
        let id = handle.id().clone();

        match handle.wait(self.inner.config.request_timeout).await {
            Ok(JsonRpcMessage::Response(response)) => Ok(response.result),
            Ok(JsonRpcMessage::Error(error)) => Err(error.error.into()),
            Ok(other) => Err(WireError::MalformedMessage(format!(
                "reply to request {id} is not a response: {other:?}"
            ))),
            Err(e @ WireError::Timeout { .. }) => {
                if let Err(notify_err) = self.notify_cancelled(&id, "timeout").await {
                    tracing::debug!(%id, "Could not send cancellation: {notify_err}");
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Give up on a request: drop its pending entry and tell the peer.
    pub async fn cancel(&self, handle: PendingHandle, reason: &str) -> WireResult<()> {
        let id = handle.id().clone();
        drop(handle);
        self.notify_cancelled(&id, reason).await
    }

    async fn notify_cancelled(&self, id: &RequestId, reason: &str) -> WireResult<()> {
        self.send_notification(
            CANCELLED_NOTIFICATION,
            Some(json!({ "requestId": id, "reason": reason })),
        )
        .await
    }

    /// Resolve once the connection reaches `Closed`.
    pub async fn closed(&self) {
        let mut rx = self.subscribe_state();
        let _ = rx.wait_for(|state| *state == ConnectionState::Closed).await;
    }

    /// Close from our side: stop the read loop, fail anything still pending,
    /// then shut the writer down so the peer sees EOF. Idempotent.
    ///
    /// Waiting on the writer is bounded by the request timeout, so a peer
    /// that stopped reading cannot hold `close` forever.
    pub async fn close(&self) {
        let shared = &self.inner.shared;
        shared.advance(ConnectionState::Closing);

        let task = self
            .inner
            .reader
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }

        shared.teardown("closed locally");

        let limit = self.inner.config.request_timeout;
        let writer = match tokio::time::timeout(limit, shared.writer.lock()).await {
            Ok(mut guard) => guard.take(),
            Err(_) => {
                tracing::warn!(connection = %shared.id, "Writer still busy after {limit:?}, not waiting for it");
                None
            }
        };
        if let Some(mut framed) = writer {
            match tokio::time::timeout(limit, framed.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!(connection = %shared.id, "Writer shutdown: {e}"),
                Err(_) => tracing::warn!(connection = %shared.id, "Writer shutdown timed out after {limit:?}"),
            }
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id())
            .field("state", &self.state())
            .field("pending", &self.pending_count())
            .finish()
    }
}
