//! The exam data service trait.
//!
//! Implemented by `quizdesk-client` over HTTP and by its in-memory mock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::model::{Answer, ExamResult, Participation, Question, Session, SessionId};

/// Stateless access to the exam backend.
#[async_trait]
pub trait ExamApi: Send + Sync {
    /// Join a session by its join code.
    async fn join(&self, code: &str) -> Result<Session, ApiError>;

    /// Fetch session metadata.
    async fn session(&self, id: SessionId) -> Result<Session, ApiError>;

    /// Fetch the questions of a session, without correct answers.
    async fn questions(&self, id: SessionId) -> Result<Vec<Question>, ApiError>;

    /// Ask whether the current student already joined or completed the session.
    async fn participation(&self, id: SessionId) -> Result<Participation, ApiError>;

    /// Persist in-progress answers.
    async fn save_progress(
        &self,
        id: SessionId,
        request: &SaveProgressRequest,
    ) -> Result<(), ApiError>;

    /// Submit final answers and receive the graded result.
    async fn submit(&self, id: SessionId, request: &SubmitRequest)
        -> Result<ExamResult, ApiError>;

    /// Fetch the result of a previously submitted attempt.
    async fn result(&self, id: SessionId) -> Result<ExamResult, ApiError>;
}

/// Body of `POST /student/sessions/{id}/save-progress`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveProgressRequest {
    pub answers: Vec<Answer>,
    pub remaining_seconds: u64,
}

/// Body of `POST /student/sessions/{id}/submit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub answers: Vec<Answer>,
    pub time_spent_seconds: u64,
    /// Set when the countdown ran out rather than the student submitting.
    #[serde(default)]
    pub auto_submitted: bool,
}

/// Body of `POST /student/sessions/join`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub code: String,
}
