//! Upstream Connector
//!
//! Owns authentication and connection establishment to the Gemini Live API,
//! and tracks every connection it has opened so the liveness sweeper can
//! probe and evict the dead ones.

use super::{
    registry::ConnectionRegistry,
    relay::{CLOSE_NORMAL, Frame, MessageSink, MessageSource, Received},
};
use crate::config::Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::sync::Arc;
use tokio::{net::TcpStream, sync::Mutex};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        Error as WsError,
        protocol::{
            CloseFrame, Message as WsMessage,
            frame::coding::CloseCode,
        },
    },
};
use tracing::{debug, info, warn};

const GEMINI_HOST: &str = "generativelanguage.googleapis.com";
const GEMINI_SERVICE_PATH: &str =
    "ws/google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateContent";

type UpstreamStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One live, registered connection to the upstream service.
pub struct UpstreamConnection {
    pub id: u64,
    pub source: UpstreamSource,
    pub sink: Arc<UpstreamSink>,
}

pub struct UpstreamSink {
    sink: Mutex<SplitSink<UpstreamStream, WsMessage>>,
}

#[async_trait]
impl MessageSink for UpstreamSink {
    async fn send(&self, frame: Frame) -> Result<()> {
        let message = match frame {
            Frame::Text(text) => WsMessage::Text(text.into()),
            Frame::Binary(bytes) => WsMessage::Binary(bytes.into()),
        };
        self.sink
            .lock()
            .await
            .send(message)
            .await
            .context("upstream send failed")
    }

    async fn probe(&self) -> Result<()> {
        self.sink
            .lock()
            .await
            .send(WsMessage::Ping(Bytes::new()))
            .await
            .context("upstream ping failed")
    }

    async fn close(&self, code: u16, reason: &str) -> Result<()> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        self.sink
            .lock()
            .await
            .send(WsMessage::Close(Some(frame)))
            .await
            .context("upstream close failed")
    }
}

pub struct UpstreamSource {
    stream: SplitStream<UpstreamStream>,
}

#[async_trait]
impl MessageSource for UpstreamSource {
    async fn recv(&mut self) -> Received {
        loop {
            match self.stream.next().await {
                None => return Received::Closed,
                Some(Ok(WsMessage::Text(text))) => {
                    return Received::Frame(Frame::Text(text.to_string()));
                }
                Some(Ok(WsMessage::Binary(bytes))) => {
                    return Received::Frame(Frame::Binary(bytes.to_vec()));
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    debug!(?frame, "upstream sent close frame");
                    return Received::Closed;
                }
                // Control frames are not relayed.
                Some(Ok(_)) => continue,
                Some(Err(WsError::ConnectionClosed)) | Some(Err(WsError::AlreadyClosed)) => {
                    return Received::Closed;
                }
                Some(Err(e)) => return Received::Failed(e.into()),
            }
        }
    }
}

/// Handles connection and authentication with the Gemini Live service.
pub struct UpstreamConnector {
    config: Arc<Config>,
    registry: ConnectionRegistry,
}

impl UpstreamConnector {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            registry: ConnectionRegistry::new(),
        }
    }

    /// Opens an authenticated connection and registers it.
    pub async fn connect(&self) -> Result<UpstreamConnection> {
        let url = format!(
            "wss://{}/{}?key={}",
            GEMINI_HOST, GEMINI_SERVICE_PATH, self.config.gemini_api_key
        );

        info!(host = GEMINI_HOST, "connecting upstream");
        let (stream, _) = connect_async(url)
            .await
            .context("failed to connect to the Gemini Live API")?;

        let (sink, stream) = stream.split();
        let sink = Arc::new(UpstreamSink {
            sink: Mutex::new(sink),
        });
        let id = self.registry.add(sink.clone()).await;
        info!(connection_id = id, "upstream connection established");

        Ok(UpstreamConnection {
            id,
            source: UpstreamSource { stream },
            sink,
        })
    }

    /// Closes and deregisters one connection, swallowing close errors.
    pub async fn release(&self, id: u64) {
        if let Some(sink) = self.registry.remove(id).await {
            if let Err(e) = sink.close(CLOSE_NORMAL, "session ended").await {
                debug!(connection_id = id, error = %e, "upstream close failed");
            }
        }
    }

    /// Probes every registered connection and evicts the ones that fail.
    /// Returns how many were evicted.
    pub async fn sweep(&self) -> usize {
        let mut stale = 0;
        for (id, sink) in self.registry.snapshot().await {
            if sink.probe().await.is_err() {
                warn!(connection_id = id, "stale upstream connection, removing");
                self.registry.remove(id).await;
                let _ = sink.close(CLOSE_NORMAL, "stale connection").await;
                stale += 1;
            }
        }
        stale
    }

    pub async fn active_connections(&self) -> usize {
        self.registry.len().await
    }

    /// Closes every registered connection, swallowing individual errors.
    pub async fn close_all(&self) {
        for (_, sink) in self.registry.drain().await {
            let _ = sink.close(CLOSE_NORMAL, "server shutting down").await;
        }
        info!("all upstream connections closed");
    }
}
