//! Duplex Relay Engine
//!
//! Each session runs two of these loops, one per direction, over a
//! transport-agnostic source/sink seam. A loop receives the next inbound
//! message, decodes it, routes handshake and tool-call envelopes through the
//! interceptors, and forwards everything else verbatim to the paired
//! connection.
//!
//! Error containment follows the taxonomy in the module docs of [`super`]:
//! undecodable or malformed messages are logged and skipped, a cleanly closed
//! peer ends the loop without error, and only a failed outbound send (or a
//! handshake that cannot produce a configuration) tears the loop down.

use super::{
    envelope::Envelope,
    handshake,
    session::SessionState,
    tools::{self, ToolOutcome},
};
use crate::{config::Config, db::InterviewStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Close code for a session that ran to completion.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code when upstream authentication did not finish in time.
pub const CLOSE_AUTH_TIMEOUT: u16 = 1008;
/// Close code for internal failures.
pub const CLOSE_INTERNAL: u16 = 1011;

/// A transport-agnostic message frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    /// Decodes the frame body as JSON. Both sides speak JSON; the upstream
    /// service delivers some of it in binary frames.
    pub fn decode(&self) -> serde_json::Result<Value> {
        match self {
            Frame::Text(text) => serde_json::from_str(text),
            Frame::Binary(bytes) => serde_json::from_slice(bytes),
        }
    }
}

/// The outcome of awaiting the next inbound message.
pub enum Received {
    Frame(Frame),
    /// The peer closed the connection. Ends the loop without error.
    Closed,
    /// The transport failed. Ends the loop.
    Failed(anyhow::Error),
}

/// The receiving half of a relay connection.
#[async_trait]
pub trait MessageSource: Send {
    async fn recv(&mut self) -> Received;
}

/// The sending half of a relay connection. Shared between the relay loop,
/// the interceptors and the liveness sweeper, so all operations take `&self`.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, frame: Frame) -> Result<()>;
    /// Sends a liveness probe. Any failure means the connection is dead.
    async fn probe(&self) -> Result<()>;
    async fn close(&self, code: u16, reason: &str) -> Result<()>;
}

/// Which way a relay loop forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToUpstream,
    UpstreamToClient,
}

impl Direction {
    pub fn label(&self) -> &'static str {
        match self {
            Direction::ClientToUpstream => "client->upstream",
            Direction::UpstreamToClient => "upstream->client",
        }
    }
}

/// Everything a directional loop needs besides its own endpoints.
///
/// `session` is shared with the paired loop; the client->upstream loop fills
/// the identifiers and question list during the handshake, the
/// upstream->client loop flips `completed`.
#[derive(Clone)]
pub struct RelayContext {
    pub session: Arc<Mutex<SessionState>>,
    pub store: Arc<dyn InterviewStore>,
    pub config: Arc<Config>,
    /// Where the synthesized configuration and tool acknowledgments go,
    /// regardless of the loop's own target.
    pub upstream: Arc<dyn MessageSink>,
}

enum LoopControl {
    Continue,
    Terminate,
}

/// Runs one directional forwarding loop to completion.
///
/// Returns `Ok` when the source closed cleanly or the session was terminated
/// by the terminal tool; returns `Err` on transport failure or a failed
/// handshake. The caller is responsible for releasing the target connection
/// afterwards.
pub async fn relay_loop(
    direction: Direction,
    mut source: Box<dyn MessageSource>,
    target: Arc<dyn MessageSink>,
    ctx: RelayContext,
) -> Result<()> {
    loop {
        match source.recv().await {
            Received::Closed => {
                info!(direction = direction.label(), "peer closed connection");
                return Ok(());
            }
            Received::Failed(e) => {
                return Err(e.context(format!("{} receive failed", direction.label())));
            }
            Received::Frame(frame) => {
                match process_frame(direction, frame, &target, &ctx).await? {
                    LoopControl::Continue => {}
                    LoopControl::Terminate => {
                        info!(direction = direction.label(), "session terminated");
                        return Ok(());
                    }
                }
            }
        }
    }
}

async fn process_frame(
    direction: Direction,
    frame: Frame,
    target: &Arc<dyn MessageSink>,
    ctx: &RelayContext,
) -> Result<LoopControl> {
    let value = match frame.decode() {
        Ok(value) => value,
        Err(e) => {
            warn!(direction = direction.label(), error = %e, "skipping undecodable message");
            return Ok(LoopControl::Continue);
        }
    };

    let envelope = match Envelope::classify(&value) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(direction = direction.label(), error = %e, "skipping malformed message");
            return Ok(LoopControl::Continue);
        }
    };

    match (direction, envelope) {
        (Direction::ClientToUpstream, Envelope::Setup(payload)) => {
            info!("intercepting setup message, applying backend configuration");
            handshake::intercept(&payload, ctx)
                .await
                .context("handshake failed")?;
            // The original setup is fully replaced, never forwarded.
            Ok(LoopControl::Continue)
        }
        (Direction::UpstreamToClient, Envelope::ToolCall(calls)) => {
            match tools::intercept(&calls, ctx).await? {
                ToolOutcome::Consumed => Ok(LoopControl::Continue),
                ToolOutcome::Terminate => {
                    if let Err(e) = target.close(CLOSE_NORMAL, "Interview completed").await {
                        debug!(error = %e, "close after terminal tool failed");
                    }
                    Ok(LoopControl::Terminate)
                }
                ToolOutcome::Forward => forward(direction, frame, target).await,
            }
        }
        (_, envelope) => {
            match envelope {
                Envelope::Setup(_) => debug!(direction = direction.label(), "forwarding setup message"),
                Envelope::ToolCall(_) => {
                    debug!(direction = direction.label(), "forwarding tool call")
                }
                Envelope::RealtimeInput => {
                    debug!(direction = direction.label(), "forwarding audio/video input")
                }
                Envelope::ClientContent => {
                    debug!(direction = direction.label(), "forwarding conversational turn")
                }
                Envelope::ServerContent { has_audio } => {
                    debug!(direction = direction.label(), has_audio, "forwarding server content")
                }
                Envelope::Opaque(keys) => {
                    debug!(direction = direction.label(), ?keys, "forwarding message")
                }
            }
            forward(direction, frame, target).await
        }
    }
}

/// Forwards the original frame verbatim. A send failure is fatal to the
/// loop: the relay cannot proceed without a working outbound channel.
async fn forward(
    direction: Direction,
    frame: Frame,
    target: &Arc<dyn MessageSink>,
) -> Result<LoopControl> {
    target
        .send(frame)
        .await
        .with_context(|| format!("{} forward failed", direction.label()))?;
    Ok(LoopControl::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::testing::{MemoryStore, RecordingSink, ScriptedSource, test_context};
    use serde_json::json;

    fn text(value: serde_json::Value) -> Received {
        Received::Frame(Frame::Text(value.to_string()))
    }

    #[tokio::test]
    async fn passthrough_messages_are_forwarded_verbatim() {
        let (tx, source) = ScriptedSource::new();
        let target = RecordingSink::new();
        let (ctx, _) = test_context(MemoryStore::with_questions(&[("Q", "q")]));

        let audio = json!({"realtime_input": {"audio": {"data": "AAAA"}}});
        tx.send(text(audio.clone())).unwrap();
        tx.send(Received::Closed).unwrap();

        relay_loop(
            Direction::ClientToUpstream,
            Box::new(source),
            target.clone(),
            ctx,
        )
        .await
        .unwrap();

        let frames = target.frames().await;
        assert_eq!(frames, vec![Frame::Text(audio.to_string())]);
    }

    #[tokio::test]
    async fn malformed_messages_do_not_terminate_the_loop() {
        let (tx, source) = ScriptedSource::new();
        let target = RecordingSink::new();
        let (ctx, _) = test_context(MemoryStore::with_questions(&[("Q", "q")]));

        tx.send(Received::Frame(Frame::Text("{not json".to_string())))
            .unwrap();
        // Recognized key with a broken payload is skipped too.
        tx.send(text(json!({"setup": 42}))).unwrap();
        let valid = json!({"client_content": {"turns": []}});
        tx.send(text(valid.clone())).unwrap();
        tx.send(Received::Closed).unwrap();

        relay_loop(
            Direction::ClientToUpstream,
            Box::new(source),
            target.clone(),
            ctx,
        )
        .await
        .unwrap();

        assert_eq!(target.frames().await, vec![Frame::Text(valid.to_string())]);
    }

    #[tokio::test]
    async fn setup_is_replaced_not_forwarded() {
        let (tx, source) = ScriptedSource::new();
        let upstream = RecordingSink::new();
        let store = MemoryStore::with_questions(&[("What is your name?", "name")]);
        let (mut ctx, _) = test_context(store);
        // client->upstream: the loop target is the upstream connection.
        ctx.upstream = upstream.clone();

        tx.send(text(json!({"setup": {"job_vacancy_id": "abc"}})))
            .unwrap();
        tx.send(Received::Closed).unwrap();

        relay_loop(
            Direction::ClientToUpstream,
            Box::new(source),
            upstream.clone(),
            ctx,
        )
        .await
        .unwrap();

        let frames = upstream.frames().await;
        assert_eq!(frames.len(), 1, "exactly one synthesized setup expected");
        let sent: serde_json::Value = match &frames[0] {
            Frame::Text(text) => serde_json::from_str(text).unwrap(),
            other => panic!("expected text frame, got {:?}", other),
        };
        assert!(sent["setup"]["system_instruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("(tag: name)"));
    }

    #[tokio::test]
    async fn handshake_without_questions_fails_the_session() {
        let (tx, source) = ScriptedSource::new();
        let target = RecordingSink::new();
        let (ctx, _) = test_context(MemoryStore::with_questions(&[]));

        tx.send(text(json!({"setup": {"job_vacancy_id": "abc"}})))
            .unwrap();

        let result = relay_loop(
            Direction::ClientToUpstream,
            Box::new(source),
            target.clone(),
            ctx,
        )
        .await;

        assert!(result.is_err());
        assert!(target.frames().await.is_empty());
    }

    #[tokio::test]
    async fn tool_calls_are_consumed_and_acknowledged_in_order() {
        let (tx, source) = ScriptedSource::new();
        let journal = RecordingSink::journal();
        let client = RecordingSink::with_journal("client", journal.clone());
        let upstream = RecordingSink::with_journal("upstream", journal.clone());
        let store = MemoryStore::with_questions(&[("What is your name?", "name")]);
        let (mut ctx, _) = test_context(store.clone());
        ctx.upstream = upstream.clone();

        tx.send(text(json!({
            "toolCall": {"functionCalls": [
                {"id": "1", "name": "save_response", "args": {"tag": "name", "response": "Jane Doe"}}
            ]}
        })))
        .unwrap();
        let content = json!({"serverContent": {"modelTurn": {"parts": [{"text": "next"}]}}});
        tx.send(text(content.clone())).unwrap();
        tx.send(Received::Closed).unwrap();

        relay_loop(
            Direction::UpstreamToClient,
            Box::new(source),
            client.clone(),
            ctx,
        )
        .await
        .unwrap();

        // The tool call itself never reaches the client.
        assert_eq!(client.frames().await, vec![Frame::Text(content.to_string())]);

        // The acknowledgment went upstream before the next message was
        // processed.
        let entries = journal.lock().await.clone();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].starts_with("upstream:"));
        assert!(entries[0].contains("tool_response"));
        assert!(entries[1].starts_with("client:"));

        let saved = store.responses.lock().await.clone();
        assert_eq!(saved.len(), 1);
        assert_eq!(
            saved.get(&(
                String::new(),
                String::new(),
                String::new(),
                "name".to_string()
            )),
            Some(&"Jane Doe".to_string())
        );
    }

    #[tokio::test]
    async fn terminal_tool_closes_the_client_and_stops_relaying() {
        let (tx, source) = ScriptedSource::new();
        let client = RecordingSink::new();
        let store = MemoryStore::with_questions(&[("What is your name?", "name")]);
        let (ctx, session) = test_context(store);

        tx.send(text(json!({
            "toolCall": {"functionCalls": [{"id": "9", "name": "end_interview", "args": {}}]}
        })))
        .unwrap();
        // Never relayed: the loop stops at the terminal call.
        tx.send(text(json!({"serverContent": {"modelTurn": {"parts": []}}})))
            .unwrap();

        relay_loop(
            Direction::UpstreamToClient,
            Box::new(source),
            client.clone(),
            ctx,
        )
        .await
        .unwrap();

        assert!(session.lock().await.completed);
        assert_eq!(
            client.closed_with().await,
            Some((CLOSE_NORMAL, "Interview completed".to_string()))
        );
        assert!(client.frames().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_tools_are_forwarded() {
        let (tx, source) = ScriptedSource::new();
        let client = RecordingSink::new();
        let (ctx, _) = test_context(MemoryStore::with_questions(&[("Q", "q")]));

        let call = json!({
            "toolCall": {"functionCalls": [{"id": "2", "name": "search_web", "args": {}}]}
        });
        tx.send(text(call.clone())).unwrap();
        tx.send(Received::Closed).unwrap();

        relay_loop(
            Direction::UpstreamToClient,
            Box::new(source),
            client.clone(),
            ctx,
        )
        .await
        .unwrap();

        assert_eq!(client.frames().await, vec![Frame::Text(call.to_string())]);
    }

    #[tokio::test]
    async fn send_failure_ends_the_loop() {
        let (tx, source) = ScriptedSource::new();
        let target = RecordingSink::failing();
        let (ctx, _) = test_context(MemoryStore::with_questions(&[("Q", "q")]));

        tx.send(text(json!({"client_content": {"turns": []}})))
            .unwrap();

        let result = relay_loop(
            Direction::ClientToUpstream,
            Box::new(source),
            target,
            ctx,
        )
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn receive_failure_ends_the_loop() {
        let (tx, source) = ScriptedSource::new();
        let target = RecordingSink::new();
        let (ctx, _) = test_context(MemoryStore::with_questions(&[("Q", "q")]));

        tx.send(Received::Failed(anyhow::anyhow!("socket torn down")))
            .unwrap();

        let result = relay_loop(
            Direction::UpstreamToClient,
            Box::new(source),
            target,
            ctx,
        )
        .await;

        assert!(result.is_err());
    }
}
