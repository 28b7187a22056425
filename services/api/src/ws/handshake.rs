//! Handshake interception.
//!
//! The first `setup` message a client sends is never forwarded. Instead the
//! active question set for the referenced job vacancy is loaded, the session
//! state is filled in, and a full backend configuration — model, audio
//! modality, voice, the interview script as system instruction, and the tool
//! catalogue — is synthesized and sent upstream in its place.

use super::{
    envelope::{
        BackendSetup, FunctionDeclaration, GenerationConfig, GenerationSetup, InstructionPart,
        PrebuiltVoiceConfig, SetupPayload, SpeechConfig, SystemInstruction, ToolDeclarations,
        VoiceConfig,
    },
    relay::{Frame, RelayContext},
    tools::{END_INTERVIEW_TOOL, SAVE_RESPONSE_TOOL},
};
use crate::db::ScriptedQuestion;
use serde_json::json;
use tracing::{info, warn};

/// Handshake failures abort the session: without a usable configuration the
/// upstream conversation must not be started.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("no interview content configured for this session")]
    NoInterviewContent,
    #[error("failed to load interview questions: {0}")]
    QuestionLookup(anyhow::Error),
    #[error("failed to send backend configuration upstream: {0}")]
    Send(anyhow::Error),
}

/// Replaces the client's `setup` with the synthesized backend configuration.
pub async fn intercept(payload: &SetupPayload, ctx: &RelayContext) -> Result<(), HandshakeError> {
    let questions = match &payload.job_vacancy_id {
        Some(vacancy_id) => ctx
            .store
            .active_questions(vacancy_id)
            .await
            .map_err(HandshakeError::QuestionLookup)?,
        None => {
            warn!("setup message carried no job_vacancy_id");
            Vec::new()
        }
    };

    if questions.is_empty() {
        return Err(HandshakeError::NoInterviewContent);
    }

    {
        let mut session = ctx.session.lock().await;
        session.job_vacancy_id = payload.job_vacancy_id.clone();
        session.candidate_id = payload.job_candidate_id.clone();
        session.interview_id = payload.interview_id.clone();
        session.questions = questions.clone();
    }

    let instructions = build_instructions(&questions, &ctx.config.interview_language);
    let setup = build_setup(
        &ctx.config.gemini_model,
        &ctx.config.gemini_voice,
        instructions,
    );
    let body = serde_json::to_string(&setup).map_err(|e| HandshakeError::Send(e.into()))?;

    info!(
        questions = questions.len(),
        model = %ctx.config.gemini_model,
        "sending backend setup upstream"
    );
    ctx.upstream
        .send(Frame::Text(body))
        .await
        .map_err(HandshakeError::Send)?;
    Ok(())
}

/// Builds the system instruction embedding the interview script: persona,
/// the numbered mandatory questions with their tags, and the turn protocol
/// the model must follow.
pub fn build_instructions(questions: &[ScriptedQuestion], language: &str) -> String {
    let mut text = format!(
        "You are a voice assistant specialized in conducting pre-screening job interviews. \
         You are kind, polite, and speak clearly and objectively. You speak only {language}.\n\n"
    );
    text.push_str(
        "MISSION: You are an HR interviewer. Your task is to run a pre-screening \
         interview with the candidate.\n\n",
    );

    text.push_str("MANDATORY QUESTIONS (ask one at a time):\n");
    for (i, question) in questions.iter().enumerate() {
        text.push_str(&format!("{}. {} (tag: {})\n", i + 1, question.text, question.tag));
    }

    text.push_str("\nINTERVIEW PROTOCOL:\n");
    text.push_str("1. Greet the candidate once, then ask the first question on the list\n");
    text.push_str("2. Ask exactly ONE question per turn\n");
    text.push_str(
        "3. Wait for the candidate's complete answer; if it is unclear, ask for clarification\n",
    );
    text.push_str(&format!(
        "4. After each answer, call the {SAVE_RESPONSE_TOOL} tool with the question's tag and \
         the answer BEFORE asking the next question\n",
    ));
    text.push_str(&format!(
        "5. Never skip the {SAVE_RESPONSE_TOOL} call and never ask questions that are not on \
         the list\n",
    ));
    text.push_str(&format!(
        "6. After the final answer has been saved, thank the candidate and call the \
         {END_INTERVIEW_TOOL} tool to finish the session\n",
    ));
    text
}

fn build_setup(model: &str, voice: &str, instructions: String) -> BackendSetup {
    BackendSetup {
        setup: GenerationSetup {
            model: model.to_string(),
            generation_config: GenerationConfig {
                response_modalities: vec!["audio".to_string()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: voice.to_string(),
                        },
                    },
                },
            },
            system_instruction: SystemInstruction {
                parts: vec![InstructionPart { text: instructions }],
            },
            tools: vec![ToolDeclarations {
                function_declarations: vec![
                    FunctionDeclaration {
                        name: SAVE_RESPONSE_TOOL.to_string(),
                        description: "Persists the candidate's answer to one scripted question."
                            .to_string(),
                        parameters: Some(json!({
                            "type": "object",
                            "properties": {
                                "tag": {
                                    "type": "string",
                                    "description": "The tag of the question that was answered"
                                },
                                "response": {
                                    "type": "string",
                                    "description": "The candidate's answer, verbatim"
                                }
                            },
                            "required": ["tag", "response"]
                        })),
                    },
                    FunctionDeclaration {
                        name: END_INTERVIEW_TOOL.to_string(),
                        description: "Ends the interview once every answer has been saved."
                            .to_string(),
                        parameters: None,
                    },
                ],
            }],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::testing::{MemoryStore, RecordingSink, test_context};
    use serde_json::Value;

    fn scripted(pairs: &[(&str, &str)]) -> Vec<ScriptedQuestion> {
        pairs
            .iter()
            .map(|(text, tag)| ScriptedQuestion {
                text: text.to_string(),
                tag: tag.to_string(),
            })
            .collect()
    }

    #[test]
    fn instructions_list_every_tag_once_in_order() {
        let questions = scripted(&[
            ("What is your name?", "name"),
            ("How many years of experience do you have?", "years_experience"),
        ]);

        let text = build_instructions(&questions, "English");

        let first = text.find("(tag: name)").expect("first tag present");
        let second = text
            .find("(tag: years_experience)")
            .expect("second tag present");
        assert!(first < second, "tags must appear in catalogue order");
        assert_eq!(text.matches("(tag: name)").count(), 1);
        assert_eq!(text.matches("(tag: years_experience)").count(), 1);
        assert!(text.contains("1. What is your name?"));
        assert!(text.contains("2. How many years of experience do you have?"));
    }

    #[test]
    fn instructions_commit_to_one_language() {
        let questions = scripted(&[("What is your name?", "name")]);
        let text = build_instructions(&questions, "Brazilian Portuguese");
        assert!(text.contains("You speak only Brazilian Portuguese."));
    }

    #[tokio::test]
    async fn intercept_sends_full_configuration_upstream() {
        let store = MemoryStore::with_questions(&[
            ("What is your name?", "name"),
            ("How many years of experience do you have?", "years_experience"),
        ]);
        let upstream = RecordingSink::new();
        let (mut ctx, session) = test_context(store);
        ctx.upstream = upstream.clone();

        let payload = SetupPayload {
            job_vacancy_id: Some("abc".to_string()),
            job_candidate_id: Some("cd-1".to_string()),
            interview_id: Some("iv-1".to_string()),
        };

        intercept(&payload, &ctx).await.unwrap();

        let frames = upstream.texts().await;
        assert_eq!(frames.len(), 1);
        let sent: Value = serde_json::from_str(&frames[0]).unwrap();

        assert_eq!(sent["setup"]["model"], "models/gemini-test");
        assert_eq!(
            sent["setup"]["generation_config"]["response_modalities"][0],
            "audio"
        );
        assert_eq!(
            sent["setup"]["generation_config"]["speech_config"]["voice_config"]
                ["prebuilt_voice_config"]["voice_name"],
            "Aoede"
        );

        let instruction = sent["setup"]["system_instruction"]["parts"][0]["text"]
            .as_str()
            .unwrap();
        assert!(instruction.contains("(tag: name)"));
        assert!(instruction.contains("(tag: years_experience)"));

        let declarations = sent["setup"]["tools"][0]["function_declarations"]
            .as_array()
            .unwrap();
        let save = declarations
            .iter()
            .find(|d| d["name"] == "save_response")
            .expect("save_response declared");
        let required: Vec<&str> = save["parameters"]["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(required, vec!["tag", "response"]);
        assert!(declarations.iter().any(|d| d["name"] == "end_interview"));

        let state = session.lock().await;
        assert_eq!(state.job_vacancy_id.as_deref(), Some("abc"));
        assert_eq!(state.candidate_id.as_deref(), Some("cd-1"));
        assert_eq!(state.interview_id.as_deref(), Some("iv-1"));
        assert_eq!(state.questions.len(), 2);
    }

    #[tokio::test]
    async fn intercept_fails_without_questions() {
        let upstream = RecordingSink::new();
        let (mut ctx, _) = test_context(MemoryStore::with_questions(&[]));
        ctx.upstream = upstream.clone();

        let payload = SetupPayload {
            job_vacancy_id: Some("abc".to_string()),
            ..Default::default()
        };

        let err = intercept(&payload, &ctx).await.unwrap_err();
        assert!(matches!(err, HandshakeError::NoInterviewContent));
        assert!(upstream.texts().await.is_empty(), "nothing goes upstream");
    }

    #[tokio::test]
    async fn intercept_fails_without_vacancy_id() {
        let (ctx, _) = test_context(MemoryStore::with_questions(&[("Q", "q")]));

        let err = intercept(&SetupPayload::default(), &ctx).await.unwrap_err();
        assert!(matches!(err, HandshakeError::NoInterviewContent));
    }
}
