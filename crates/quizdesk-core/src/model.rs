//! Core data model types for quizdesk.
//!
//! These mirror the JSON the exam backend sends and receives. The client
//! never computes scores; everything in [`ExamResult`] is taken from the
//! server as-is.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a session on the backend.
pub type SessionId = i64;
/// Identifier of a question on the backend.
pub type QuestionId = i64;
/// Identifier of a choice option on the backend.
pub type OptionId = i64;

/// Lifecycle status of a scheduled session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Scheduled,
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl SessionStatus {
    /// Whether students may currently work on the session.
    pub fn accepts_answers(self) -> bool {
        matches!(self, SessionStatus::Active)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Scheduled => write!(f, "scheduled"),
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Paused => write!(f, "paused"),
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A scheduled instance of a quiz that students join via a code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub title: String,
    pub quiz_id: i64,
    #[serde(default)]
    pub quiz_title: Option<String>,
    #[serde(default)]
    pub join_code: Option<String>,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Time allotted to one attempt.
    pub duration_minutes: u32,
    pub status: SessionStatus,
}

impl Session {
    /// Length of one attempt in seconds.
    pub fn duration_secs(&self) -> u64 {
        u64::from(self.duration_minutes) * 60
    }
}

/// Kind of question, which decides what a valid answer looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    TrueFalse,
    OpenEnded,
    FillBlank,
}

impl QuestionType {
    /// Choice questions are answered by picking one of their options.
    pub fn is_choice(self) -> bool {
        matches!(self, QuestionType::MultipleChoice | QuestionType::TrueFalse)
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionType::MultipleChoice => write!(f, "multiple_choice"),
            QuestionType::TrueFalse => write!(f, "true_false"),
            QuestionType::OpenEnded => write!(f, "open_ended"),
            QuestionType::FillBlank => write!(f, "fill_blank"),
        }
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "multiple_choice" | "mcq" => Ok(QuestionType::MultipleChoice),
            "true_false" | "boolean" => Ok(QuestionType::TrueFalse),
            "open_ended" | "essay" => Ok(QuestionType::OpenEnded),
            "fill_blank" | "fill_in_the_blank" => Ok(QuestionType::FillBlank),
            other => Err(format!("unknown question type: {other}")),
        }
    }
}

/// One selectable option of a choice question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: OptionId,
    #[serde(alias = "option_text")]
    pub text: String,
}

/// A question as served to students (no correct answer included).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(alias = "question_text")]
    pub text: String,
    #[serde(default = "default_points")]
    pub points: f64,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    #[serde(default)]
    pub order: Option<u32>,
}

fn default_points() -> f64 {
    1.0
}

impl Question {
    /// Look up an option by id.
    pub fn option(&self, id: OptionId) -> Option<&QuestionOption> {
        self.options.iter().find(|o| o.id == id)
    }
}

/// The locally held value of one answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerValue {
    /// A selected option of a choice question.
    Choice(OptionId),
    /// Free text for open-ended and fill-in-the-blank questions.
    Text(String),
}

/// An answer in the shape the backend expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: QuestionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_option_id: Option<OptionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_text: Option<String>,
}

impl Answer {
    pub fn new(question_id: QuestionId, value: &AnswerValue) -> Self {
        match value {
            AnswerValue::Choice(option) => Self {
                question_id,
                selected_option_id: Some(*option),
                answer_text: None,
            },
            AnswerValue::Text(text) => Self {
                question_id,
                selected_option_id: None,
                answer_text: Some(text.clone()),
            },
        }
    }

    /// Recover the local value, if the answer carries one.
    pub fn value(&self) -> Option<AnswerValue> {
        match (&self.selected_option_id, &self.answer_text) {
            (Some(option), _) => Some(AnswerValue::Choice(*option)),
            (None, Some(text)) => Some(AnswerValue::Text(text.clone())),
            (None, None) => None,
        }
    }
}

/// The backend's view of whether this student already took the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participation {
    #[serde(default)]
    pub joined: bool,
    #[serde(default)]
    pub completed: bool,
}

/// Per-question grading returned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question_id: QuestionId,
    pub points_awarded: f64,
    pub max_points: f64,
    #[serde(default)]
    pub is_correct: Option<bool>,
}

/// Server-computed outcome of a submitted attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamResult {
    pub score: f64,
    pub max_score: f64,
    pub percentage: f64,
    #[serde(default)]
    pub time_spent_seconds: u64,
    #[serde(default)]
    pub passed: Option<bool>,
    #[serde(default)]
    pub breakdown: Vec<QuestionResult>,
}
