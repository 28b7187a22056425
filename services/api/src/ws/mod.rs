//! WebSocket Relay
//!
//! This module contains the core of the service: the duplex relay that pairs
//! each client connection with one upstream Gemini Live connection and
//! rewrites the conversation into a scripted interview. It is structured
//! into submodules:
//!
//! - `envelope`: the JSON wire envelopes on both legs, decoded into a closed
//!   set of message shapes.
//! - `relay`: the two directional forwarding loops and the transport seam
//!   they run over.
//! - `handshake`: interception of the client's `setup`, replaced by the
//!   synthesized interview configuration.
//! - `tools`: interception of function calls from the model (persist answer,
//!   end interview).
//! - `session`: the per-connection lifecycle tying the above together.
//! - `upstream`: connection establishment and registry for the Gemini side.
//! - `registry`: the shared live-connection registry type.
//! - `sweeper`: the periodic liveness sweep over both registries.

pub mod envelope;
pub mod handshake;
pub mod registry;
pub mod relay;
pub mod session;
pub mod sweeper;
pub mod tools;
pub mod upstream;

#[cfg(test)]
pub(crate) mod testing;

pub use session::ws_handler;
