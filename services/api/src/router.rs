//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, the WebSocket relay endpoint, and OpenAPI
//! documentation.

use crate::{
    handlers,
    models::{
        Candidate, CreateCandidatePayload, CreateInterviewPayload, CreateJobVacancyPayload,
        CreateQuestionPayload, ErrorResponse, Interview, InterviewQuestion, InterviewResponse,
        InterviewStatus, JobVacancy, MeetData, UpdateQuestionPayload,
    },
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router,
    routing::{get, post, put},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health_check,
        handlers::create_job_vacancy,
        handlers::list_job_vacancies,
        handlers::get_job_vacancy,
        handlers::create_candidate,
        handlers::list_candidates,
        handlers::create_question,
        handlers::list_questions,
        handlers::questions_by_vacancy,
        handlers::update_question,
        handlers::delete_question,
        handlers::create_interview,
        handlers::get_interview,
        handlers::interviews_by_candidate,
        handlers::responses_by_interview,
        handlers::responses_by_candidate,
        handlers::get_meet_data,
    ),
    components(
        schemas(
            JobVacancy,
            Candidate,
            Interview,
            InterviewStatus,
            InterviewQuestion,
            InterviewResponse,
            CreateJobVacancyPayload,
            CreateCandidatePayload,
            CreateInterviewPayload,
            CreateQuestionPayload,
            UpdateQuestionPayload,
            MeetData,
            ErrorResponse,
        )
    ),
    tags(
        (name = "Prescreen API", description = "Management surface for the voice pre-screening interview relay")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route("/health_check", get(handlers::health_check))
        .route(
            "/job_vacancies",
            get(handlers::list_job_vacancies).post(handlers::create_job_vacancy),
        )
        .route("/job_vacancies/{id}", get(handlers::get_job_vacancy))
        .route(
            "/job_vacancies/{id}/candidates",
            get(handlers::list_candidates).post(handlers::create_candidate),
        )
        .route(
            "/interview_questions",
            get(handlers::list_questions).post(handlers::create_question),
        )
        .route(
            "/interview_questions/{id}",
            put(handlers::update_question).delete(handlers::delete_question),
        )
        .route(
            "/interview_questions/job_vacancy/{job_vacancy_id}",
            get(handlers::questions_by_vacancy),
        )
        .route("/interviews", post(handlers::create_interview))
        .route("/interviews/{id}", get(handlers::get_interview))
        .route(
            "/interviews/candidate/{candidate_id}",
            get(handlers::interviews_by_candidate),
        )
        .route(
            "/interview_responses/interview/{interview_id}",
            get(handlers::responses_by_interview),
        )
        .route(
            "/interview_responses/candidate/{candidate_id}",
            get(handlers::responses_by_candidate),
        )
        .route("/meet/{candidate_id}", get(handlers::get_meet_data))
        .route("/ws", get(ws_handler))
        // Apply the state ONLY to this group of routes.
        .with_state(app_state);

    // Create the final router that merges the stateful routes
    // with the stateless routes (like Swagger UI).
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
