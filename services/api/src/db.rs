//! Data Access Layer
//!
//! This module contains all the functions for interacting with the PostgreSQL
//! database, plus the `InterviewStore` trait through which the WebSocket relay
//! consumes storage without depending on a concrete backend.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{
    Candidate, CreateCandidatePayload, CreateJobVacancyPayload, CreateQuestionPayload, Interview,
    InterviewQuestion, InterviewResponse, JobVacancy, UpdateQuestionPayload,
};

/// One `(question, tag)` pair of the scripted interview, in catalogue order.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedQuestion {
    pub text: String,
    pub tag: String,
}

/// A candidate answer addressed by its four-part uniqueness key.
///
/// Identifiers a session never learned are carried as empty strings so the
/// key stays total.
#[derive(Debug, Clone)]
pub struct AnswerRecord {
    pub interview_id: String,
    pub candidate_id: String,
    pub job_vacancy_id: String,
    pub tag: String,
    pub response: String,
    pub answered_at: DateTime<Utc>,
}

/// The storage operations the relay performs during a live session.
#[async_trait]
pub trait InterviewStore: Send + Sync {
    /// Fetches the active question set for a job vacancy, in catalogue order.
    async fn active_questions(&self, job_vacancy_id: &str) -> Result<Vec<ScriptedQuestion>>;

    /// Inserts or overwrites the answer for the record's uniqueness key.
    async fn upsert_response(&self, record: &AnswerRecord) -> Result<()>;

    /// Marks an interview as completed. Unknown identifiers are ignored.
    async fn complete_interview(&self, interview_id: &str) -> Result<()>;
}

/// A wrapper around the `PgPool` to provide a clear data access interface.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Creates a new `Db` instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs all pending `sqlx` migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn create_job_vacancy(&self, payload: &CreateJobVacancyPayload) -> Result<JobVacancy> {
        let vacancy = sqlx::query_as::<_, JobVacancy>(
            r#"
            INSERT INTO job_vacancies (title, description)
            VALUES ($1, $2)
            RETURNING id, title, description, created_at
            "#,
        )
        .bind(&payload.title)
        .bind(&payload.description)
        .fetch_one(&self.pool)
        .await?;
        Ok(vacancy)
    }

    /// Lists all job vacancies, most recent first.
    pub async fn list_job_vacancies(&self) -> Result<Vec<JobVacancy>> {
        let vacancies = sqlx::query_as::<_, JobVacancy>(
            r#"
            SELECT id, title, description, created_at
            FROM job_vacancies
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(vacancies)
    }

    pub async fn get_job_vacancy(&self, id: Uuid) -> Result<Option<JobVacancy>> {
        let vacancy = sqlx::query_as::<_, JobVacancy>(
            r#"
            SELECT id, title, description, created_at
            FROM job_vacancies
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(vacancy)
    }

    pub async fn create_candidate(
        &self,
        job_vacancy_id: Uuid,
        payload: &CreateCandidatePayload,
    ) -> Result<Candidate> {
        let candidate = sqlx::query_as::<_, Candidate>(
            r#"
            INSERT INTO candidates (job_vacancy_id, name, email, phone)
            VALUES ($1, $2, $3, $4)
            RETURNING id, job_vacancy_id, name, email, phone, created_at
            "#,
        )
        .bind(job_vacancy_id)
        .bind(&payload.name)
        .bind(&payload.email)
        .bind(&payload.phone)
        .fetch_one(&self.pool)
        .await?;
        Ok(candidate)
    }

    pub async fn list_candidates(&self, job_vacancy_id: Uuid) -> Result<Vec<Candidate>> {
        let candidates = sqlx::query_as::<_, Candidate>(
            r#"
            SELECT id, job_vacancy_id, name, email, phone, created_at
            FROM candidates
            WHERE job_vacancy_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(job_vacancy_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(candidates)
    }

    pub async fn get_candidate(&self, id: Uuid) -> Result<Option<Candidate>> {
        let candidate = sqlx::query_as::<_, Candidate>(
            r#"
            SELECT id, job_vacancy_id, name, email, phone, created_at
            FROM candidates
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(candidate)
    }

    pub async fn create_interview(
        &self,
        candidate_id: Uuid,
        job_vacancy_id: Uuid,
    ) -> Result<Interview> {
        let interview = sqlx::query_as::<_, Interview>(
            r#"
            INSERT INTO interviews (candidate_id, job_vacancy_id)
            VALUES ($1, $2)
            RETURNING id, candidate_id, job_vacancy_id, status, created_at, updated_at
            "#,
        )
        .bind(candidate_id)
        .bind(job_vacancy_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(interview)
    }

    pub async fn get_interview(&self, id: Uuid) -> Result<Option<Interview>> {
        let interview = sqlx::query_as::<_, Interview>(
            r#"
            SELECT id, candidate_id, job_vacancy_id, status, created_at, updated_at
            FROM interviews
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(interview)
    }

    pub async fn interviews_by_candidate(&self, candidate_id: Uuid) -> Result<Vec<Interview>> {
        let interviews = sqlx::query_as::<_, Interview>(
            r#"
            SELECT id, candidate_id, job_vacancy_id, status, created_at, updated_at
            FROM interviews
            WHERE candidate_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(candidate_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(interviews)
    }

    /// Returns the candidate's most recent pending interview, creating one
    /// when none exists. Used by the call screen to obtain a session target.
    pub async fn find_or_create_pending_interview(
        &self,
        candidate_id: Uuid,
        job_vacancy_id: Uuid,
    ) -> Result<Interview> {
        let existing = sqlx::query_as::<_, Interview>(
            r#"
            SELECT id, candidate_id, job_vacancy_id, status, created_at, updated_at
            FROM interviews
            WHERE candidate_id = $1 AND status = 'pending'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(candidate_id)
        .fetch_optional(&self.pool)
        .await?;

        match existing {
            Some(interview) => Ok(interview),
            None => self.create_interview(candidate_id, job_vacancy_id).await,
        }
    }

    pub async fn create_question(&self, payload: &CreateQuestionPayload) -> Result<InterviewQuestion> {
        let question = sqlx::query_as::<_, InterviewQuestion>(
            r#"
            INSERT INTO interview_questions (job_vacancy_id, question, category, tag, active)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, job_vacancy_id, question, category, tag, active, created_at
            "#,
        )
        .bind(&payload.job_vacancy_id)
        .bind(&payload.question)
        .bind(&payload.category)
        .bind(&payload.tag)
        .bind(payload.active)
        .fetch_one(&self.pool)
        .await?;
        Ok(question)
    }

    pub async fn list_questions(&self) -> Result<Vec<InterviewQuestion>> {
        let questions = sqlx::query_as::<_, InterviewQuestion>(
            r#"
            SELECT id, job_vacancy_id, question, category, tag, active, created_at
            FROM interview_questions
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(questions)
    }

    /// Lists every question for a vacancy, active or not (management view).
    pub async fn questions_by_vacancy(&self, job_vacancy_id: &str) -> Result<Vec<InterviewQuestion>> {
        let questions = sqlx::query_as::<_, InterviewQuestion>(
            r#"
            SELECT id, job_vacancy_id, question, category, tag, active, created_at
            FROM interview_questions
            WHERE job_vacancy_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(job_vacancy_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(questions)
    }

    pub async fn update_question(
        &self,
        id: Uuid,
        payload: &UpdateQuestionPayload,
    ) -> Result<Option<InterviewQuestion>> {
        let question = sqlx::query_as::<_, InterviewQuestion>(
            r#"
            UPDATE interview_questions
            SET question = $1, category = $2, tag = $3, active = $4
            WHERE id = $5
            RETURNING id, job_vacancy_id, question, category, tag, active, created_at
            "#,
        )
        .bind(&payload.question)
        .bind(&payload.category)
        .bind(&payload.tag)
        .bind(payload.active)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(question)
    }

    pub async fn delete_question(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM interview_questions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn responses_by_interview(&self, interview_id: &str) -> Result<Vec<InterviewResponse>> {
        let responses = sqlx::query_as::<_, InterviewResponse>(
            r#"
            SELECT id, interview_id, candidate_id, job_vacancy_id, tag, response, answered_at
            FROM interview_responses
            WHERE interview_id = $1
            ORDER BY answered_at ASC
            "#,
        )
        .bind(interview_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(responses)
    }

    pub async fn responses_by_candidate(&self, candidate_id: &str) -> Result<Vec<InterviewResponse>> {
        let responses = sqlx::query_as::<_, InterviewResponse>(
            r#"
            SELECT id, interview_id, candidate_id, job_vacancy_id, tag, response, answered_at
            FROM interview_responses
            WHERE candidate_id = $1
            ORDER BY answered_at ASC
            "#,
        )
        .bind(candidate_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(responses)
    }
}

#[async_trait]
impl InterviewStore for Db {
    async fn active_questions(&self, job_vacancy_id: &str) -> Result<Vec<ScriptedQuestion>> {
        // Stored vacancy keys are not guaranteed canonical: legacy imports
        // carry the raw wire string, newer rows the UUID text form. Try both.
        let canonical = Uuid::parse_str(job_vacancy_id)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| job_vacancy_id.to_string());

        let rows = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT question, tag
            FROM interview_questions
            WHERE (job_vacancy_id = $1 OR job_vacancy_id = $2) AND active
            ORDER BY created_at ASC
            "#,
        )
        .bind(job_vacancy_id)
        .bind(&canonical)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(text, tag)| ScriptedQuestion { text, tag })
            .collect())
    }

    async fn upsert_response(&self, record: &AnswerRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO interview_responses
                (interview_id, candidate_id, job_vacancy_id, tag, response, answered_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (interview_id, candidate_id, job_vacancy_id, tag)
            DO UPDATE SET response = EXCLUDED.response, answered_at = EXCLUDED.answered_at
            "#,
        )
        .bind(&record.interview_id)
        .bind(&record.candidate_id)
        .bind(&record.job_vacancy_id)
        .bind(&record.tag)
        .bind(&record.response)
        .bind(record.answered_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn complete_interview(&self, interview_id: &str) -> Result<()> {
        // Sessions may carry an interview id that never existed in this
        // database; there is nothing to update in that case.
        let Ok(id) = Uuid::parse_str(interview_id) else {
            return Ok(());
        };

        sqlx::query(
            r#"
            UPDATE interviews
            SET status = 'completed', updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
