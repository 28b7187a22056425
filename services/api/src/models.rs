//! API and Database Models
//!
//! This module defines the core data structures used for both database mapping
//! with `sqlx` and for generating OpenAPI documentation with `utoipa`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(sqlx::Type, Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq)]
#[sqlx(type_name = "interview_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InterviewStatus {
    Pending,
    Completed,
}

impl fmt::Display for InterviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterviewStatus::Pending => write!(f, "pending"),
            InterviewStatus::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone)]
pub struct JobVacancy {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone)]
pub struct Candidate {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    #[schema(value_type = String, format = Uuid)]
    pub job_vacancy_id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone)]
pub struct Interview {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    #[schema(value_type = String, format = Uuid)]
    pub candidate_id: Uuid,
    #[schema(value_type = String, format = Uuid)]
    pub job_vacancy_id: Uuid,
    #[schema(value_type = String, example = "pending")]
    pub status: InterviewStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An interview question attached to a job vacancy. The vacancy reference is
/// plain text because question sets are looked up by identifiers arriving
/// over the wire, which are not guaranteed to be canonical UUID strings.
#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone)]
pub struct InterviewQuestion {
    #[schema(value_type = String, format = Uuid)]
    pub id: Uuid,
    pub job_vacancy_id: String,
    pub question: String,
    pub category: String,
    pub tag: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// A candidate's persisted answer, unique per
/// `(interview_id, candidate_id, job_vacancy_id, tag)`.
#[derive(Serialize, Deserialize, ToSchema, FromRow, Debug, Clone)]
pub struct InterviewResponse {
    pub id: i64,
    pub interview_id: String,
    pub candidate_id: String,
    pub job_vacancy_id: String,
    pub tag: String,
    pub response: String,
    pub answered_at: DateTime<Utc>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateJobVacancyPayload {
    #[schema(example = "Backend Engineer")]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateCandidatePayload {
    #[schema(example = "Jane Doe")]
    pub name: String,
    #[schema(example = "jane@example.com")]
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateInterviewPayload {
    #[schema(value_type = String, format = Uuid)]
    pub candidate_id: Uuid,
    #[schema(value_type = String, format = Uuid)]
    pub job_vacancy_id: Uuid,
}

fn default_category() -> String {
    "personal".to_string()
}

fn default_active() -> bool {
    true
}

#[derive(Deserialize, ToSchema)]
pub struct CreateQuestionPayload {
    pub job_vacancy_id: String,
    #[schema(example = "How many years of experience do you have?")]
    pub question: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[schema(example = "years_experience")]
    pub tag: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateQuestionPayload {
    pub question: String,
    pub category: String,
    pub tag: String,
    pub active: bool,
}

/// Everything the call screen needs to start a session for a candidate.
#[derive(Serialize, ToSchema)]
pub struct MeetData {
    pub candidate: Candidate,
    pub job_vacancy: JobVacancy,
    pub interview: Interview,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interview_status_serialization() {
        assert_eq!(
            serde_json::to_string(&InterviewStatus::Pending).unwrap(),
            "\"pending\""
        );
        assert_eq!(
            serde_json::to_string(&InterviewStatus::Completed).unwrap(),
            "\"completed\""
        );

        let pending: InterviewStatus = serde_json::from_str("\"pending\"").unwrap();
        assert_eq!(pending, InterviewStatus::Pending);
    }

    #[test]
    fn test_interview_status_display() {
        assert_eq!(format!("{}", InterviewStatus::Pending), "pending");
        assert_eq!(format!("{}", InterviewStatus::Completed), "completed");
    }

    #[test]
    fn test_create_question_payload_defaults() {
        let json = r#"{"job_vacancy_id": "abc", "question": "What is your name?", "tag": "name"}"#;
        let payload: CreateQuestionPayload = serde_json::from_str(json).unwrap();

        assert_eq!(payload.job_vacancy_id, "abc");
        assert_eq!(payload.category, "personal");
        assert!(payload.active);
    }

    #[test]
    fn test_create_question_payload_missing_tag() {
        let json = r#"{"job_vacancy_id": "abc", "question": "What is your name?"}"#;
        let result: Result<CreateQuestionPayload, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_interview_response_round_trip() {
        let response = InterviewResponse {
            id: 7,
            interview_id: "iv-1".to_string(),
            candidate_id: "cd-1".to_string(),
            job_vacancy_id: "jv-1".to_string(),
            tag: "name".to_string(),
            response: "Jane Doe".to_string(),
            answered_at: Utc::now(),
        };

        let json = serde_json::to_string(&response).unwrap();
        let deserialized: InterviewResponse = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.id, response.id);
        assert_eq!(deserialized.tag, "name");
        assert_eq!(deserialized.response, "Jane Doe");
        assert_eq!(deserialized.answered_at, response.answered_at);
    }

    #[test]
    fn test_candidate_optional_phone() {
        let json = r#"{
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "job_vacancy_id": "550e8400-e29b-41d4-a716-446655440001",
            "name": "Jane Doe",
            "email": "jane@example.com",
            "phone": null,
            "created_at": "2025-01-15T10:30:00Z"
        }"#;
        let candidate: Candidate = serde_json::from_str(json).unwrap();
        assert!(candidate.phone.is_none());
    }

    #[test]
    fn test_error_response_serialization() {
        let error = ErrorResponse {
            message: "Candidate not found".to_string(),
        };

        let json = serde_json::to_string(&error).unwrap();
        assert_eq!(json, r#"{"message":"Candidate not found"}"#);
    }
}
