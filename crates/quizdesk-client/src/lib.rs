//! quizdesk-client: exam backend access.
//!
//! Implements the `ExamApi` trait over HTTP, provides an in-memory mock
//! backend, and loads the client configuration.

pub mod config;
pub mod http;
pub mod mock;

pub use config::{create_api, load_config, load_config_from, QuizdeskConfig};
pub use http::HttpExamApi;
pub use mock::MockExamApi;
pub use quizdesk_core::error::ApiError;
