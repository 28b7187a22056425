//! In-memory transports and store fakes for exercising the relay without
//! sockets or a database.

use super::relay::{Frame, MessageSink, MessageSource, Received, RelayContext};
use super::session::SessionState;
use crate::config::Config;
use crate::db::{AnswerRecord, InterviewStore, ScriptedQuestion};
use anyhow::{Result, bail};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};

/// A message source fed by a channel; yields `Closed` once the script runs
/// out.
pub struct ScriptedSource {
    rx: mpsc::UnboundedReceiver<Received>,
}

impl ScriptedSource {
    pub fn new() -> (mpsc::UnboundedSender<Received>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }
}

#[async_trait]
impl MessageSource for ScriptedSource {
    async fn recv(&mut self) -> Received {
        self.rx.recv().await.unwrap_or(Received::Closed)
    }
}

/// Records everything sent through it; optionally appends to a shared
/// journal so tests can assert cross-sink ordering.
pub struct RecordingSink {
    label: &'static str,
    fail_sends: bool,
    frames: Mutex<Vec<Frame>>,
    closed: Mutex<Option<(u16, String)>>,
    journal: Option<Arc<Mutex<Vec<String>>>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            label: "sink",
            fail_sends: false,
            frames: Mutex::new(Vec::new()),
            closed: Mutex::new(None),
            journal: None,
        })
    }

    /// A sink whose sends and probes always fail.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            label: "sink",
            fail_sends: true,
            frames: Mutex::new(Vec::new()),
            closed: Mutex::new(None),
            journal: None,
        })
    }

    pub fn journal() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    pub fn with_journal(label: &'static str, journal: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            label,
            fail_sends: false,
            frames: Mutex::new(Vec::new()),
            closed: Mutex::new(None),
            journal: Some(journal),
        })
    }

    pub async fn frames(&self) -> Vec<Frame> {
        self.frames.lock().await.clone()
    }

    /// The text frames sent so far.
    pub async fn texts(&self) -> Vec<String> {
        self.frames
            .lock()
            .await
            .iter()
            .filter_map(|frame| match frame {
                Frame::Text(text) => Some(text.clone()),
                Frame::Binary(_) => None,
            })
            .collect()
    }

    pub async fn closed_with(&self) -> Option<(u16, String)> {
        self.closed.lock().await.clone()
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn send(&self, frame: Frame) -> Result<()> {
        if self.fail_sends {
            bail!("sink is closed");
        }
        if let Some(journal) = &self.journal {
            let entry = match &frame {
                Frame::Text(text) => format!("{}:{}", self.label, text),
                Frame::Binary(_) => format!("{}:<binary>", self.label),
            };
            journal.lock().await.push(entry);
        }
        self.frames.lock().await.push(frame);
        Ok(())
    }

    async fn probe(&self) -> Result<()> {
        if self.fail_sends {
            bail!("sink is closed");
        }
        Ok(())
    }

    async fn close(&self, code: u16, reason: &str) -> Result<()> {
        *self.closed.lock().await = Some((code, reason.to_string()));
        Ok(())
    }
}

/// An in-memory store with the same upsert-key semantics as the database.
pub struct MemoryStore {
    questions: Vec<ScriptedQuestion>,
    fail_upserts: bool,
    pub responses: Mutex<HashMap<(String, String, String, String), String>>,
    pub completed: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn with_questions(pairs: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            questions: pairs
                .iter()
                .map(|(text, tag)| ScriptedQuestion {
                    text: text.to_string(),
                    tag: tag.to_string(),
                })
                .collect(),
            fail_upserts: false,
            responses: Mutex::new(HashMap::new()),
            completed: Mutex::new(Vec::new()),
        })
    }

    pub fn failing_upserts() -> Arc<Self> {
        Arc::new(Self {
            questions: vec![ScriptedQuestion {
                text: "What is your name?".to_string(),
                tag: "name".to_string(),
            }],
            fail_upserts: true,
            responses: Mutex::new(HashMap::new()),
            completed: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl InterviewStore for MemoryStore {
    async fn active_questions(&self, _job_vacancy_id: &str) -> Result<Vec<ScriptedQuestion>> {
        Ok(self.questions.clone())
    }

    async fn upsert_response(&self, record: &AnswerRecord) -> Result<()> {
        if self.fail_upserts {
            bail!("store unavailable");
        }
        let key = (
            record.interview_id.clone(),
            record.candidate_id.clone(),
            record.job_vacancy_id.clone(),
            record.tag.clone(),
        );
        self.responses.lock().await.insert(key, record.response.clone());
        Ok(())
    }

    async fn complete_interview(&self, interview_id: &str) -> Result<()> {
        self.completed.lock().await.push(interview_id.to_string());
        Ok(())
    }
}

pub fn test_config() -> Arc<Config> {
    Arc::new(Config {
        bind_address: "127.0.0.1:0".parse().expect("static address parses"),
        database_url: String::new(),
        gemini_api_key: "test-key".to_string(),
        gemini_model: "models/gemini-test".to_string(),
        gemini_voice: "Aoede".to_string(),
        interview_language: "English".to_string(),
        sweep_interval: Duration::from_secs(30),
        log_level: tracing::Level::INFO,
    })
}

/// A relay context over fresh session state, with a discardable upstream
/// sink; tests that inspect upstream traffic swap in their own.
pub fn test_context(store: Arc<MemoryStore>) -> (RelayContext, Arc<Mutex<SessionState>>) {
    let session = Arc::new(Mutex::new(SessionState::default()));
    let ctx = RelayContext {
        session: session.clone(),
        store,
        config: test_config(),
        upstream: RecordingSink::new(),
    };
    (ctx, session)
}
