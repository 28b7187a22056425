//! Axum Handlers for the REST API
//!
//! This module contains the HTTP surface for managing job vacancies,
//! candidates, interview questions, interviews, and persisted responses.
//! It uses `utoipa` doc comments to generate OpenAPI documentation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::{
    models::{
        Candidate, CreateCandidatePayload, CreateInterviewPayload, CreateJobVacancyPayload,
        CreateQuestionPayload, ErrorResponse, Interview, InterviewQuestion, InterviewResponse,
        JobVacancy, MeetData, UpdateQuestionPayload,
    },
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// Health check.
#[utoipa::path(
    get,
    path = "/health_check",
    responses(
        (status = 200, description = "Service is up")
    )
)]
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Create a new job vacancy.
#[utoipa::path(
    post,
    path = "/job_vacancies",
    request_body = CreateJobVacancyPayload,
    responses(
        (status = 201, description = "Job vacancy created", body = JobVacancy),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn create_job_vacancy(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateJobVacancyPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let vacancy = state.db.create_job_vacancy(&payload).await?;
    Ok((StatusCode::CREATED, Json(vacancy)))
}

/// List all job vacancies.
#[utoipa::path(
    get,
    path = "/job_vacancies",
    responses(
        (status = 200, description = "List of job vacancies", body = [JobVacancy]),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn list_job_vacancies(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<JobVacancy>>, ApiError> {
    let vacancies = state.db.list_job_vacancies().await?;
    Ok(Json(vacancies))
}

/// Get a job vacancy by its ID.
#[utoipa::path(
    get,
    path = "/job_vacancies/{id}",
    responses(
        (status = 200, description = "Job vacancy details", body = JobVacancy),
        (status = 404, description = "Job vacancy not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Job vacancy ID")
    )
)]
pub async fn get_job_vacancy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobVacancy>, ApiError> {
    let vacancy = state
        .db
        .get_job_vacancy(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Job vacancy with id '{}' not found", id)))?;
    Ok(Json(vacancy))
}

/// Add a candidate to a job vacancy.
#[utoipa::path(
    post,
    path = "/job_vacancies/{id}/candidates",
    request_body = CreateCandidatePayload,
    responses(
        (status = 201, description = "Candidate created", body = Candidate),
        (status = 404, description = "Job vacancy not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Job vacancy ID")
    )
)]
pub async fn create_candidate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateCandidatePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let _ = state
        .db
        .get_job_vacancy(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Job vacancy with id '{}' not found", id)))?;

    let candidate = state.db.create_candidate(id, &payload).await?;
    Ok((StatusCode::CREATED, Json(candidate)))
}

/// List the candidates of a job vacancy.
#[utoipa::path(
    get,
    path = "/job_vacancies/{id}/candidates",
    responses(
        (status = 200, description = "List of candidates", body = [Candidate]),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Job vacancy ID")
    )
)]
pub async fn list_candidates(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Candidate>>, ApiError> {
    let candidates = state.db.list_candidates(id).await?;
    Ok(Json(candidates))
}

/// Create an interview question.
#[utoipa::path(
    post,
    path = "/interview_questions",
    request_body = CreateQuestionPayload,
    responses(
        (status = 201, description = "Question created", body = InterviewQuestion),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn create_question(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateQuestionPayload>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.tag.trim().is_empty() {
        return Err(ApiError::BadRequest("tag must not be empty".to_string()));
    }
    let question = state.db.create_question(&payload).await?;
    Ok((StatusCode::CREATED, Json(question)))
}

/// List all interview questions.
#[utoipa::path(
    get,
    path = "/interview_questions",
    responses(
        (status = 200, description = "List of questions", body = [InterviewQuestion]),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn list_questions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<InterviewQuestion>>, ApiError> {
    let questions = state.db.list_questions().await?;
    Ok(Json(questions))
}

/// List the questions attached to a job vacancy, active or not.
#[utoipa::path(
    get,
    path = "/interview_questions/job_vacancy/{job_vacancy_id}",
    responses(
        (status = 200, description = "List of questions", body = [InterviewQuestion]),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("job_vacancy_id" = String, Path, description = "Job vacancy ID")
    )
)]
pub async fn questions_by_vacancy(
    State(state): State<Arc<AppState>>,
    Path(job_vacancy_id): Path<String>,
) -> Result<Json<Vec<InterviewQuestion>>, ApiError> {
    let questions = state.db.questions_by_vacancy(&job_vacancy_id).await?;
    Ok(Json(questions))
}

/// Update an interview question.
#[utoipa::path(
    put,
    path = "/interview_questions/{id}",
    request_body = UpdateQuestionPayload,
    responses(
        (status = 200, description = "Question updated", body = InterviewQuestion),
        (status = 404, description = "Question not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Question ID")
    )
)]
pub async fn update_question(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateQuestionPayload>,
) -> Result<Json<InterviewQuestion>, ApiError> {
    let question = state
        .db
        .update_question(id, &payload)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Question with id '{}' not found", id)))?;
    Ok(Json(question))
}

/// Delete an interview question.
#[utoipa::path(
    delete,
    path = "/interview_questions/{id}",
    responses(
        (status = 204, description = "Question deleted"),
        (status = 404, description = "Question not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Question ID")
    )
)]
pub async fn delete_question(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.db.delete_question(id).await?;
    if !deleted {
        return Err(ApiError::NotFound(format!(
            "Question with id '{}' not found",
            id
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Create an interview for a candidate.
#[utoipa::path(
    post,
    path = "/interviews",
    request_body = CreateInterviewPayload,
    responses(
        (status = 201, description = "Interview created", body = Interview),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn create_interview(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateInterviewPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let interview = state
        .db
        .create_interview(payload.candidate_id, payload.job_vacancy_id)
        .await?;
    Ok((StatusCode::CREATED, Json(interview)))
}

/// Get an interview by its ID.
#[utoipa::path(
    get,
    path = "/interviews/{id}",
    responses(
        (status = 200, description = "Interview details", body = Interview),
        (status = 404, description = "Interview not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Interview ID")
    )
)]
pub async fn get_interview(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Interview>, ApiError> {
    let interview = state
        .db
        .get_interview(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Interview with id '{}' not found", id)))?;
    Ok(Json(interview))
}

/// List a candidate's interviews.
#[utoipa::path(
    get,
    path = "/interviews/candidate/{candidate_id}",
    responses(
        (status = 200, description = "List of interviews", body = [Interview]),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("candidate_id" = Uuid, Path, description = "Candidate ID")
    )
)]
pub async fn interviews_by_candidate(
    State(state): State<Arc<AppState>>,
    Path(candidate_id): Path<Uuid>,
) -> Result<Json<Vec<Interview>>, ApiError> {
    let interviews = state.db.interviews_by_candidate(candidate_id).await?;
    Ok(Json(interviews))
}

/// List the persisted answers of an interview.
#[utoipa::path(
    get,
    path = "/interview_responses/interview/{interview_id}",
    responses(
        (status = 200, description = "List of responses", body = [InterviewResponse]),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("interview_id" = String, Path, description = "Interview ID")
    )
)]
pub async fn responses_by_interview(
    State(state): State<Arc<AppState>>,
    Path(interview_id): Path<String>,
) -> Result<Json<Vec<InterviewResponse>>, ApiError> {
    let responses = state.db.responses_by_interview(&interview_id).await?;
    Ok(Json(responses))
}

/// List the persisted answers of a candidate.
#[utoipa::path(
    get,
    path = "/interview_responses/candidate/{candidate_id}",
    responses(
        (status = 200, description = "List of responses", body = [InterviewResponse]),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("candidate_id" = String, Path, description = "Candidate ID")
    )
)]
pub async fn responses_by_candidate(
    State(state): State<Arc<AppState>>,
    Path(candidate_id): Path<String>,
) -> Result<Json<Vec<InterviewResponse>>, ApiError> {
    let responses = state.db.responses_by_candidate(&candidate_id).await?;
    Ok(Json(responses))
}

/// Assemble the data the call screen needs to start a session.
#[utoipa::path(
    get,
    path = "/meet/{candidate_id}",
    responses(
        (status = 200, description = "Meet data", body = MeetData),
        (status = 404, description = "Candidate not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("candidate_id" = Uuid, Path, description = "Candidate ID")
    )
)]
pub async fn get_meet_data(
    State(state): State<Arc<AppState>>,
    Path(candidate_id): Path<Uuid>,
) -> Result<Json<MeetData>, ApiError> {
    let candidate = state.db.get_candidate(candidate_id).await?.ok_or_else(|| {
        ApiError::NotFound(format!("Candidate with id '{}' not found", candidate_id))
    })?;

    let job_vacancy = state
        .db
        .get_job_vacancy(candidate.job_vacancy_id)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "Job vacancy with id '{}' not found",
                candidate.job_vacancy_id
            ))
        })?;

    let interview = state
        .db
        .find_or_create_pending_interview(candidate.id, candidate.job_vacancy_id)
        .await?;

    Ok(Json(MeetData {
        candidate,
        job_vacancy,
        interview,
    }))
}
