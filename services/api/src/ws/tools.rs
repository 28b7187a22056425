//! Function-call interception.
//!
//! Tool invocations arriving from upstream are side effects the model asks
//! the proxy to perform. They are executed locally and acknowledged back
//! upstream; the invocation message itself is never shown to the client.

use super::{
    envelope::{FunctionCall, ToolResponse},
    relay::{Frame, RelayContext},
};
use crate::db::AnswerRecord;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

pub const SAVE_RESPONSE_TOOL: &str = "save_response";
pub const END_INTERVIEW_TOOL: &str = "end_interview";
/// Older question scripts declare the terminal tool under this name.
pub const SUBMIT_INTERVIEW_TOOL: &str = "submit_interview";

/// What the relay loop should do with the message after interception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolOutcome {
    /// Every invocation was handled; suppress the message.
    Consumed,
    /// A terminal invocation was handled; end the session cleanly.
    Terminate,
    /// At least one invocation is not ours; forward the message unmodified.
    Forward,
}

#[derive(Deserialize)]
struct SaveResponseArgs {
    tag: String,
    response: String,
}

/// Executes the invocations of one `toolCall` message.
///
/// `save_response` persists the answer and acknowledges upstream before the
/// loop looks at the next message — the model will not continue its turn
/// without the tool result. A failed write is logged and the conversation
/// continues; a failed acknowledgment send is fatal.
pub async fn intercept(calls: &[FunctionCall], ctx: &RelayContext) -> Result<ToolOutcome> {
    if calls.is_empty() {
        return Ok(ToolOutcome::Forward);
    }

    let mut terminate = false;
    let mut unknown = false;

    for call in calls {
        match call.name.as_str() {
            SAVE_RESPONSE_TOOL => save_response(call, ctx).await?,
            END_INTERVIEW_TOOL | SUBMIT_INTERVIEW_TOOL => {
                end_interview(ctx).await;
                terminate = true;
            }
            other => {
                info!(tool = other, "unhandled tool call, forwarding");
                unknown = true;
            }
        }
    }

    if terminate {
        Ok(ToolOutcome::Terminate)
    } else if unknown {
        Ok(ToolOutcome::Forward)
    } else {
        Ok(ToolOutcome::Consumed)
    }
}

async fn save_response(call: &FunctionCall, ctx: &RelayContext) -> Result<()> {
    let args: SaveResponseArgs = match serde_json::from_value(call.args.clone()) {
        Ok(args) => args,
        Err(e) => {
            warn!(error = %e, "malformed save_response arguments, skipping");
            return Ok(());
        }
    };

    let record = {
        let session = ctx.session.lock().await;
        AnswerRecord {
            interview_id: session.interview_id.clone().unwrap_or_default(),
            candidate_id: session.candidate_id.clone().unwrap_or_default(),
            job_vacancy_id: session.job_vacancy_id.clone().unwrap_or_default(),
            tag: args.tag.clone(),
            response: args.response,
            answered_at: Utc::now(),
        }
    };

    // A failed write must not interrupt the conversation.
    match ctx.store.upsert_response(&record).await {
        Ok(()) => info!(tag = %args.tag, "answer persisted"),
        Err(e) => warn!(tag = %args.tag, error = ?e, "failed to persist answer, continuing"),
    }

    let ack = ToolResponse::success(call, "Answer saved successfully");
    let body = serde_json::to_string(&ack)?;
    ctx.upstream
        .send(Frame::Text(body))
        .await
        .context("failed to send tool acknowledgment upstream")?;
    Ok(())
}

async fn end_interview(ctx: &RelayContext) {
    let interview_id = {
        let mut session = ctx.session.lock().await;
        session.completed = true;
        session.interview_id.clone()
    };

    if let Some(id) = interview_id {
        if let Err(e) = ctx.store.complete_interview(&id).await {
            warn!(interview_id = %id, error = ?e, "failed to mark interview completed");
        }
    }
    info!("terminal tool received, ending session");
}
