//! Per-connection session lifecycle.
//!
//! A session pairs one client WebSocket with one upstream connection for its
//! whole lifetime. This module accepts the client, greets it, establishes
//! the upstream leg, and runs the two directional relay loops to completion.

use super::{
    envelope::AuthComplete,
    relay::{
        self, CLOSE_AUTH_TIMEOUT, CLOSE_INTERNAL, CLOSE_NORMAL, Direction, Frame, MessageSink,
        MessageSource, Received, RelayContext,
    },
};
use crate::{db::ScriptedQuestion, state::AppState};
use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use bytes::Bytes;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::{sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::{Instrument, error, info, instrument, warn};

/// How long establishing the authenticated upstream leg may take before the
/// client is turned away.
const UPSTREAM_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// The mutable per-session record shared by both directional loops.
///
/// Writer discipline: the client->upstream loop fills the identifiers and
/// the question list once during the handshake; the upstream->client loop
/// sets `completed`.
#[derive(Debug, Default)]
pub struct SessionState {
    pub interview_id: Option<String>,
    pub candidate_id: Option<String>,
    pub job_vacancy_id: Option<String>,
    pub questions: Vec<ScriptedQuestion>,
    pub completed: bool,
}

/// Axum handler to upgrade an HTTP connection to a WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Runs one relay session from accept to teardown.
#[instrument(name = "relay_session", skip_all, fields(session_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session_id: u32 = rand::random();
    tracing::Span::current().record("session_id", session_id.to_string());
    info!("New client connection");

    let (client_tx, client_rx) = socket.split();
    let client_sink = Arc::new(ClientSink::new(client_tx));
    let client_source = ClientSource::new(client_rx);

    // The client waits for this before starting its handshake.
    if client_sink
        .send(Frame::Text(AuthComplete::message()))
        .await
        .is_err()
    {
        warn!("client disconnected before auth acknowledgment");
        return;
    }

    let client_id = state.clients.add(client_sink.clone()).await;

    let upstream =
        match tokio::time::timeout(UPSTREAM_CONNECT_TIMEOUT, state.upstream.connect()).await {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => {
                error!(error = ?e, "failed to establish upstream connection");
                let _ = client_sink.close(CLOSE_INTERNAL, "internal error").await;
                state.clients.remove(client_id).await;
                return;
            }
            Err(_) => {
                warn!("upstream connection timed out");
                let _ = client_sink.close(CLOSE_AUTH_TIMEOUT, "Auth timeout").await;
                state.clients.remove(client_id).await;
                return;
            }
        };

    let session = Arc::new(Mutex::new(SessionState::default()));
    let ctx = RelayContext {
        session: session.clone(),
        store: state.store.clone(),
        config: state.config.clone(),
        upstream: upstream.sink.clone(),
    };

    // client -> upstream. On exit the loop releases its target, the upstream
    // connection; the paired loop then observes the closed peer and winds
    // down through the same path on its own side.
    let client_to_upstream = {
        let ctx = ctx.clone();
        let state = state.clone();
        let client_sink = client_sink.clone();
        let upstream_sink = upstream.sink.clone();
        let upstream_id = upstream.id;
        tokio::spawn(
            async move {
                let result = relay::relay_loop(
                    Direction::ClientToUpstream,
                    Box::new(client_source),
                    upstream_sink,
                    ctx,
                )
                .await;
                if let Err(e) = &result {
                    error!(direction = "client->upstream", error = ?e, "relay loop failed");
                    let _ = client_sink.close(CLOSE_INTERNAL, "internal error").await;
                }
                state.upstream.release(upstream_id).await;
            }
            .in_current_span(),
        )
    };

    // upstream -> client. On exit the loop releases its target, the client
    // connection.
    let upstream_to_client = {
        let state = state.clone();
        let client_sink = client_sink.clone();
        tokio::spawn(
            async move {
                let result = relay::relay_loop(
                    Direction::UpstreamToClient,
                    Box::new(upstream.source),
                    client_sink.clone(),
                    ctx,
                )
                .await;
                match &result {
                    Ok(()) => {
                        let _ = client_sink.close(CLOSE_NORMAL, "session ended").await;
                    }
                    Err(e) => {
                        error!(direction = "upstream->client", error = ?e, "relay loop failed");
                        let _ = client_sink.close(CLOSE_INTERNAL, "internal error").await;
                    }
                }
                state.clients.remove(client_id).await;
            }
            .in_current_span(),
        )
    };

    // The session is torn down only once both loops have fully exited.
    let _ = tokio::join!(client_to_upstream, upstream_to_client);

    let completed = session.lock().await.completed;
    info!(completed, "session ended");
}

/// The sending half of the client WebSocket.
pub(crate) struct ClientSink {
    sink: Mutex<SplitSink<WebSocket, Message>>,
}

impl ClientSink {
    pub(crate) fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }
}

#[async_trait]
impl MessageSink for ClientSink {
    async fn send(&self, frame: Frame) -> Result<()> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(bytes) => Message::Binary(bytes.into()),
        };
        self.sink
            .lock()
            .await
            .send(message)
            .await
            .context("client send failed")
    }

    async fn probe(&self) -> Result<()> {
        self.sink
            .lock()
            .await
            .send(Message::Ping(Bytes::new()))
            .await
            .context("client ping failed")
    }

    async fn close(&self, code: u16, reason: &str) -> Result<()> {
        let frame = CloseFrame {
            code,
            reason: reason.to_string().into(),
        };
        self.sink
            .lock()
            .await
            .send(Message::Close(Some(frame)))
            .await
            .context("client close failed")
    }
}

/// The receiving half of the client WebSocket.
pub(crate) struct ClientSource {
    stream: SplitStream<WebSocket>,
}

impl ClientSource {
    pub(crate) fn new(stream: SplitStream<WebSocket>) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl MessageSource for ClientSource {
    async fn recv(&mut self) -> Received {
        loop {
            match self.stream.next().await {
                None => return Received::Closed,
                Some(Ok(Message::Text(text))) => {
                    return Received::Frame(Frame::Text(text.to_string()));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    return Received::Frame(Frame::Binary(bytes.to_vec()));
                }
                Some(Ok(Message::Close(_))) => return Received::Closed,
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Err(e)) => return Received::Failed(e.into()),
            }
        }
    }
}
