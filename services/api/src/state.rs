//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources: the database, configuration, and the two
//! live-connection registries the relay and the sweeper work against.

use crate::{
    config::Config,
    db::{Db, InterviewStore},
    ws::{registry::ConnectionRegistry, upstream::UpstreamConnector},
};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all
/// handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Db>,
    /// The storage seam the relay consumes; backed by `db` in production.
    pub store: Arc<dyn InterviewStore>,
    pub config: Arc<Config>,
    /// Live client-side connections, probed by the liveness sweeper.
    pub clients: Arc<ConnectionRegistry>,
    /// Upstream connection establishment plus its own registry.
    pub upstream: Arc<UpstreamConnector>,
}
