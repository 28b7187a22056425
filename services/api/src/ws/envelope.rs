//! Wire envelopes for the client ↔ proxy ↔ Gemini Live protocol.
//!
//! Messages on both legs are JSON objects distinguished by their top-level
//! key. Decoding goes through [`Envelope::classify`], which maps a message
//! onto a closed set of known shapes and falls back to an opaque passthrough
//! variant, so the relay dispatches on one exhaustive enum instead of probing
//! for keys at every call site. Field names mirror the wire protocol, which
//! mixes snake_case and camelCase.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sub-fields of the client's `setup` envelope the proxy understands.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetupPayload {
    pub job_vacancy_id: Option<String>,
    #[serde(alias = "candidate_id")]
    pub job_candidate_id: Option<String>,
    pub interview_id: Option<String>,
}

/// A single function invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// Accepts either a JSON array or a bare object where the protocol is
/// inconsistent about singular vs. plural.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> From<OneOrMany<T>> for Vec<T> {
    fn from(value: OneOrMany<T>) -> Self {
        match value {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[derive(Debug, Deserialize)]
struct ToolCallBody {
    #[serde(rename = "functionCalls")]
    function_calls: Option<OneOrMany<FunctionCall>>,
}

/// The closed set of message shapes the relay dispatches on.
#[derive(Debug)]
pub enum Envelope {
    /// Client handshake carrying interview identifiers.
    Setup(SetupPayload),
    /// Function invocations from the model, normalized to a list.
    ToolCall(Vec<FunctionCall>),
    /// Audio/video chunk from the client; forwarded untouched.
    RealtimeInput,
    /// Conversational turn from the client; forwarded untouched.
    ClientContent,
    /// Model output, possibly with inline audio; forwarded untouched.
    ServerContent { has_audio: bool },
    /// Anything else; forwarded untouched. Carries the top-level keys for
    /// logging.
    Opaque(Vec<String>),
}

impl Envelope {
    /// Classifies a decoded message body.
    ///
    /// A recognized key whose payload does not deserialize is a protocol
    /// error for that one message; the caller logs it and skips the message.
    pub fn classify(value: &Value) -> anyhow::Result<Envelope> {
        let map = value
            .as_object()
            .context("message body is not a JSON object")?;

        if let Some(setup) = map.get("setup") {
            let payload: SetupPayload =
                serde_json::from_value(setup.clone()).context("malformed setup payload")?;
            return Ok(Envelope::Setup(payload));
        }

        if let Some(tool_call) = map.get("toolCall") {
            let body: ToolCallBody =
                serde_json::from_value(tool_call.clone()).context("malformed toolCall payload")?;
            let calls = body.function_calls.map(Vec::from).unwrap_or_default();
            return Ok(Envelope::ToolCall(calls));
        }

        if map.contains_key("realtime_input") {
            return Ok(Envelope::RealtimeInput);
        }

        if map.contains_key("client_content") {
            return Ok(Envelope::ClientContent);
        }

        if let Some(content) = map.get("serverContent") {
            let has_audio = content.to_string().contains("inlineData");
            return Ok(Envelope::ServerContent { has_audio });
        }

        Ok(Envelope::Opaque(map.keys().cloned().collect()))
    }
}

/// Sent to the client once its connection has been accepted, before any
/// handshake takes place.
#[derive(Debug, Serialize)]
pub struct AuthComplete {
    #[serde(rename = "authComplete")]
    pub auth_complete: bool,
}

impl AuthComplete {
    pub fn message() -> String {
        serde_json::to_string(&AuthComplete {
            auth_complete: true,
        })
        .expect("static message serializes")
    }
}

/// The configuration message sent upstream in place of the client's `setup`.
#[derive(Debug, Serialize)]
pub struct BackendSetup {
    pub setup: GenerationSetup,
}

#[derive(Debug, Serialize)]
pub struct GenerationSetup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: SystemInstruction,
    pub tools: Vec<ToolDeclarations>,
}

#[derive(Debug, Serialize)]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Serialize)]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Serialize)]
pub struct SystemInstruction {
    pub parts: Vec<InstructionPart>,
}

#[derive(Debug, Serialize)]
pub struct InstructionPart {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ToolDeclarations {
    pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// Acknowledgment for an intercepted function call, sent back upstream. The
/// model will not continue its turn until it receives this.
#[derive(Debug, Serialize)]
pub struct ToolResponse {
    pub tool_response: ToolResponseBody,
}

#[derive(Debug, Serialize)]
pub struct ToolResponseBody {
    pub function_responses: FunctionResponse,
}

#[derive(Debug, Serialize)]
pub struct FunctionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub response: FunctionResult,
}

#[derive(Debug, Serialize)]
pub struct FunctionResult {
    pub result: String,
}

impl ToolResponse {
    pub fn success(call: &FunctionCall, result: impl Into<String>) -> Self {
        Self {
            tool_response: ToolResponseBody {
                function_responses: FunctionResponse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    response: FunctionResult {
                        result: result.into(),
                    },
                },
            },
        }
    }
}
