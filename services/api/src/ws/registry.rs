//! Registry of live connections.
//!
//! One instance exists per connection side (client-facing and upstream).
//! Session setup adds a connection once, teardown removes it once, and the
//! liveness sweeper works on point-in-time snapshots so the lock is never
//! held across a probe.

use super::relay::MessageSink;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

pub struct ConnectionRegistry {
    connections: Mutex<HashMap<u64, Arc<dyn MessageSink>>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a connection and returns its process-local id.
    pub async fn add(&self, sink: Arc<dyn MessageSink>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connections.lock().await.insert(id, sink);
        id
    }

    /// Deregisters a connection. Removal is idempotent: a second call for
    /// the same id returns `None`.
    pub async fn remove(&self, id: u64) -> Option<Arc<dyn MessageSink>> {
        self.connections.lock().await.remove(&id)
    }

    /// A point-in-time copy of the registered connections.
    pub async fn snapshot(&self) -> Vec<(u64, Arc<dyn MessageSink>)> {
        self.connections
            .lock()
            .await
            .iter()
            .map(|(id, sink)| (*id, sink.clone()))
            .collect()
    }

    /// Removes and returns every registered connection.
    pub async fn drain(&self) -> Vec<(u64, Arc<dyn MessageSink>)> {
        self.connections.lock().await.drain().collect()
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::testing::RecordingSink;

    #[tokio::test]
    async fn add_remove_round_trip() {
        let registry = ConnectionRegistry::new();
        assert!(registry.is_empty().await);

        let id = registry.add(RecordingSink::new()).await;
        assert_eq!(registry.len().await, 1);

        assert!(registry.remove(id).await.is_some());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn removal_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let id = registry.add(RecordingSink::new()).await;

        assert!(registry.remove(id).await.is_some());
        assert!(registry.remove(id).await.is_none());
    }

    #[tokio::test]
    async fn ids_are_unique() {
        let registry = ConnectionRegistry::new();
        let a = registry.add(RecordingSink::new()).await;
        let b = registry.add(RecordingSink::new()).await;
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn snapshot_does_not_drain() {
        let registry = ConnectionRegistry::new();
        registry.add(RecordingSink::new()).await;
        registry.add(RecordingSink::new()).await;

        assert_eq!(registry.snapshot().await.len(), 2);
        assert_eq!(registry.len().await, 2);

        assert_eq!(registry.drain().await.len(), 2);
        assert!(registry.is_empty().await);
    }
}
