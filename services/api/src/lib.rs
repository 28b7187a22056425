//! Prescreen API Library Crate
//!
//! This library contains all the core logic for the voice pre-screening
//! interview service: the application state, database access, REST handlers,
//! the WebSocket relay, and routing. The `api` binary is a thin wrapper
//! around this library.

pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod router;
pub mod state;
pub mod ws;
