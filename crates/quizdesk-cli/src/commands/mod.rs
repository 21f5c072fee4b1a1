pub mod init;
pub mod join;
pub mod questions;
pub mod result;
pub mod take;

use quizdesk_core::error::ApiError;

/// Turn an API error into a CLI error that leads with the student-facing text.
pub(crate) fn api_error(e: ApiError) -> anyhow::Error {
    anyhow::anyhow!("{} ({e})", e.user_message())
}
