//! Error types for the exam API and the attempt lifecycle.
//!
//! [`ApiError`] lives in `quizdesk-core` so the engine can classify failures
//! for retry decisions without string matching.

use thiserror::Error;

use crate::model::{QuestionId, SessionStatus};

/// Errors that can occur when talking to the exam backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP 401.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// HTTP 403.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// HTTP 404.
    #[error("not found: {0}")]
    NotFound(String),

    /// HTTP 409, typically a duplicate submission.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Any other error status.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    Network(String),

    /// The response body did not match the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Classify an error status returned by the backend.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 => ApiError::Unauthorized(message),
            403 => ApiError::Forbidden(message),
            404 => ApiError::NotFound(message),
            409 => ApiError::Conflict(message),
            _ => ApiError::Api { status, message },
        }
    }

    /// Returns `true` if this error is permanent and should not be retried.
    pub fn is_permanent(&self) -> bool {
        match self {
            ApiError::Unauthorized(_)
            | ApiError::Forbidden(_)
            | ApiError::NotFound(_)
            | ApiError::Conflict(_)
            | ApiError::Decode(_) => true,
            ApiError::Api { status, .. } => *status < 500,
            ApiError::Timeout(_) | ApiError::Network(_) => false,
        }
    }

    /// Text suitable for showing to a student.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Unauthorized(_) => "Your login has expired. Please sign in again.".into(),
            ApiError::Forbidden(_) => "You do not have access to this session.".into(),
            ApiError::NotFound(_) => "The session could not be found.".into(),
            ApiError::Conflict(_) => "This exam has already been submitted.".into(),
            ApiError::Timeout(_) | ApiError::Network(_) => {
                "Could not reach the server. Check your connection and try again.".into()
            }
            ApiError::Api { .. } | ApiError::Decode(_) => {
                "The server returned an unexpected error. Please try again.".into()
            }
        }
    }
}

/// Errors raised by the attempt state and the exam engine.
#[derive(Debug, Error)]
pub enum ExamError {
    #[error("exam has already been submitted")]
    AlreadySubmitted,

    #[error("a submission is already in progress")]
    SubmissionInProgress,

    #[error("you have already completed this session")]
    AlreadyParticipated,

    #[error("time is up; answers can no longer be changed")]
    TimeExpired,

    #[error("no submission is in progress")]
    NotSubmitting,

    #[error("question {0} is not part of this exam")]
    UnknownQuestion(QuestionId),

    #[error("invalid answer for question {question_id}: {reason}")]
    InvalidAnswer {
        question_id: QuestionId,
        reason: String,
    },

    #[error("session is {0}, not active")]
    SessionNotActive(SessionStatus),

    #[error("exam engine has stopped")]
    EngineStopped,

    #[error(transparent)]
    Api(#[from] ApiError),
}
