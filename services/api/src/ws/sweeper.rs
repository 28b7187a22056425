//! Liveness Sweeper
//!
//! A long-lived background task that probes every registered connection on a
//! fixed interval and evicts the ones that no longer respond. Registrations
//! and removals happen concurrently with session setup and teardown; the
//! registries serialize that internally.

use crate::state::AppState;
use crate::ws::relay::CLOSE_NORMAL;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Spawns the sweeper. The returned handle is aborted on server shutdown.
pub fn spawn(state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(state.config.sweep_interval);
        // The first tick fires immediately; skip it.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let clients = state.clients.len().await;
            let upstream = state.upstream.active_connections().await;
            debug!(clients, upstream, "running liveness sweep");

            let mut stale_clients = 0;
            for (id, sink) in state.clients.snapshot().await {
                if sink.probe().await.is_err() {
                    warn!(connection_id = id, "stale client connection, removing");
                    state.clients.remove(id).await;
                    let _ = sink.close(CLOSE_NORMAL, "stale connection").await;
                    stale_clients += 1;
                }
            }

            let stale_upstream = state.upstream.sweep().await;
            if stale_clients > 0 || stale_upstream > 0 {
                info!(stale_clients, stale_upstream, "evicted stale connections");
            }
        }
    })
}
