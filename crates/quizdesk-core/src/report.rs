//! Submitted-exam summaries with JSON persistence.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ExamResult, QuestionResult, Session, SessionId};

/// A server result together with the session it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultSummary {
    pub session_id: SessionId,
    pub session_title: String,
    /// When the client received the result.
    pub submitted_at: DateTime<Utc>,
    /// Whether the countdown ran out rather than the student submitting.
    #[serde(default)]
    pub auto_submitted: bool,
    pub result: ExamResult,
}

impl ResultSummary {
    pub fn new(session: &Session, result: ExamResult, auto_submitted: bool) -> Self {
        Self {
            session_id: session.id,
            session_title: session.title.clone(),
            submitted_at: Utc::now(),
            auto_submitted,
            result,
        }
    }

    /// Save the summary as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize result")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write result to {}", path.display()))?;
        Ok(())
    }

    /// Load a summary from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read result from {}", path.display()))?;
        let summary: ResultSummary =
            serde_json::from_str(&content).context("failed to parse result JSON")?;
        Ok(summary)
    }

    /// Letter grade for the server-provided percentage.
    pub fn grade_label(&self) -> &'static str {
        grade_label(self.result.percentage)
    }

    /// Breakdown rows that did not earn full points.
    pub fn missed_questions(&self) -> Vec<&QuestionResult> {
        self.result
            .breakdown
            .iter()
            .filter(|q| q.points_awarded < q.max_points)
            .collect()
    }
}

pub fn grade_label(percentage: f64) -> &'static str {
    match percentage {
        p if p >= 90.0 => "A",
        p if p >= 80.0 => "B",
        p if p >= 70.0 => "C",
        p if p >= 60.0 => "D",
        _ => "F",
    }
}
