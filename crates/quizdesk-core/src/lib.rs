//! quizdesk-core: exam data model, attempt state and the timed exam engine.
//!
//! This crate defines the data model, the `ExamApi` trait and the engine
//! that runs one timed attempt against it.

pub mod engine;
pub mod error;
pub mod exam;
pub mod model;
pub mod report;
pub mod traits;

pub use engine::{EngineConfig, ExamEngine, ExamHandle, ExamObserver, Navigation, NoopObserver};
pub use error::{ApiError, ExamError};
pub use exam::{ExamPhase, ExamState, TickOutcome};
pub use traits::ExamApi;
