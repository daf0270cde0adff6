//! Pending request table and the handle callers await on.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::{WireError, WireResult};
use crate::message::{JsonRpcMessage, RequestId};

pub(crate) type Reply = WireResult<JsonRpcMessage>;

/// A poisoned lock only means another task panicked mid-update; every
/// operation on the table leaves it consistent, so keep using it.
pub(crate) fn lock_table(table: &Mutex<PendingTable>) -> MutexGuard<'_, PendingTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

struct PendingEntry {
    method: String,
    tx: oneshot::Sender<Reply>,
}

/// Maps outstanding request ids to the channel their caller waits on.
#[derive(Default)]
pub(crate) struct PendingTable {
    entries: HashMap<RequestId, PendingEntry>,
    closed: bool,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request. Fails once the table has been flushed by a close.
    pub fn register(
        &mut self,
        id: RequestId,
        method: &str,
    ) -> WireResult<oneshot::Receiver<Reply>> {
        if self.closed {
            return Err(WireError::ConnectionClosed);
        }
        if self.entries.contains_key(&id) {
            return Err(WireError::DuplicateRequestId(id));
        }
        let (tx, rx) = oneshot::channel();
        self.entries.insert(
            id,
            PendingEntry {
                method: method.to_string(),
                tx,
            },
        );
        Ok(rx)
    }

    /// Deliver a reply. Returns the method of the request it answered, or
    /// `None` when no request with that id is pending.
    pub fn complete(&mut self, id: &RequestId, reply: JsonRpcMessage) -> Option<String> {
        let entry = self.entries.remove(id)?;
        // The receiver may already be gone if the caller gave up.
        let _ = entry.tx.send(Ok(reply));
        Some(entry.method)
    }

    pub fn remove(&mut self, id: &RequestId) -> bool {
        self.entries.remove(id).is_some()
    }

    /// Fail every outstanding request with `ConnectionClosed` and refuse new
    /// ones. Returns how many were failed.
    pub fn fail_all(&mut self) -> usize {
        self.closed = true;
        let failed = self.entries.len();
        for (_, entry) in self.entries.drain() {
            let _ = entry.tx.send(Err(WireError::ConnectionClosed));
        }
        failed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Awaitable handle for one outstanding request.
///
/// Dropping the handle removes the pending entry, so abandoned or cancelled
/// requests never hold a table slot.
pub struct PendingHandle {
    id: RequestId,
    method: String,
    rx: oneshot::Receiver<Reply>,
    table: Arc<Mutex<PendingTable>>,
}

impl PendingHandle {
    pub(crate) fn new(
        id: RequestId,
        method: &str,
        rx: oneshot::Receiver<Reply>,
        table: Arc<Mutex<PendingTable>>,
    ) -> Self {
        Self {
            id,
            method: method.to_string(),
            rx,
            table,
        }
    }

    pub fn id(&self) -> &RequestId {
        &self.id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Wait for the matching response, the timeout, or the connection closing.
    pub async fn wait(mut self, timeout: Duration) -> WireResult<JsonRpcMessage> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(WireError::ConnectionClosed),
            Err(_) => {
                lock_table(&self.table).remove(&self.id);
                tracing::warn!(id = %self.id, method = %self.method, "Request timed out after {timeout:?}");
                Err(WireError::Timeout {
                    id: self.id.clone(),
                    after: timeout,
                })
            }
        }
    }
}

impl Drop for PendingHandle {
    fn drop(&mut self) {
        lock_table(&self.table).remove(&self.id);
    }
}

impl std::fmt::Debug for PendingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingHandle")
            .field("id", &self.id)
            .field("method", &self.method)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::JsonRpcResponse;
    use serde_json::json;

    fn reply(id: i64) -> JsonRpcMessage {
        JsonRpcMessage::Response(JsonRpcResponse::new(RequestId::Number(id), json!({"ok": id})))
    }

    #[test]
    fn test_register_and_complete() {
        let mut table = PendingTable::new();
        let rx = table.register(RequestId::Number(1), "tools/list").unwrap();
        assert_eq!(table.len(), 1);

        let method = table.complete(&RequestId::Number(1), reply(1));
        assert_eq!(method.as_deref(), Some("tools/list"));
        assert!(table.is_empty());

        let received = rx.blocking_recv().unwrap().unwrap();
        assert_eq!(received, reply(1));
    }

    #[test]
    fn test_complete_unknown_id() {
        let mut table = PendingTable::new();
        let _rx = table.register(RequestId::Number(1), "ping").unwrap();
        assert!(table.complete(&RequestId::Number(2), reply(2)).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut table = PendingTable::new();
        let _rx = table.register(RequestId::Number(5), "ping").unwrap();
        assert!(matches!(
            table.register(RequestId::Number(5), "ping"),
            Err(WireError::DuplicateRequestId(RequestId::Number(5)))
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_fail_all_closes_table() {
        let mut table = PendingTable::new();
        let receivers: Vec<_> = (1..=3)
            .map(|i| table.register(RequestId::Number(i), "tools/list").unwrap())
            .collect();

        assert_eq!(table.fail_all(), 3);
        assert!(table.is_empty());
        for rx in receivers {
            assert!(matches!(
                rx.blocking_recv().unwrap(),
                Err(WireError::ConnectionClosed)
            ));
        }
        assert!(matches!(
            table.register(RequestId::Number(4), "ping"),
            Err(WireError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_handle_drop_removes_entry() {
        let table = Arc::new(Mutex::new(PendingTable::new()));
        let rx = lock_table(&table)
            .register(RequestId::Number(1), "ping")
            .unwrap();
        let handle = PendingHandle::new(RequestId::Number(1), "ping", rx, table.clone());
        assert_eq!(lock_table(&table).len(), 1);
        drop(handle);
        assert!(lock_table(&table).is_empty());
    }

    #[tokio::test]
    async fn test_handle_timeout_removes_entry() {
        let table = Arc::new(Mutex::new(PendingTable::new()));
        let rx = lock_table(&table)
            .register(RequestId::Number(9), "tools/call")
            .unwrap();
        let handle = PendingHandle::new(RequestId::Number(9), "tools/call", rx, table.clone());

        let err = handle.wait(Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, WireError::Timeout { id: RequestId::Number(9), .. }));
        assert!(lock_table(&table).is_empty());
    }
}
