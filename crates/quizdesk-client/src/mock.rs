//! In-memory exam backend for tests and demo runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use quizdesk_core::error::ApiError;
use quizdesk_core::model::{
    ExamResult, OptionId, Participation, Question, QuestionId, QuestionOption, QuestionResult,
    QuestionType, Session, SessionId, SessionStatus,
};
use quizdesk_core::traits::{ExamApi, SaveProgressRequest, SubmitRequest};

/// A mock exam backend that serves one session from memory.
///
/// Choice questions are graded against an optional answer key; text
/// answers are recorded but earn no points.
pub struct MockExamApi {
    session: Session,
    questions: Vec<Question>,
    answer_key: HashMap<QuestionId, OptionId>,
    participation: Mutex<Participation>,
    fail_saves: bool,
    fail_submits: bool,
    save_delay: Option<Duration>,
    save_calls: AtomicU32,
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,
    submit_calls: AtomicU32,
    last_save: Mutex<Option<SaveProgressRequest>>,
    last_result: Mutex<Option<ExamResult>>,
}

impl MockExamApi {
    pub fn new(session: Session, questions: Vec<Question>) -> Self {
        Self {
            session,
            questions,
            answer_key: HashMap::new(),
            participation: Mutex::new(Participation::default()),
            fail_saves: false,
            fail_submits: false,
            save_delay: None,
            save_calls: AtomicU32::new(0),
            in_flight: AtomicU32::new(0),
            max_in_flight: AtomicU32::new(0),
            submit_calls: AtomicU32::new(0),
            last_save: Mutex::new(None),
            last_result: Mutex::new(None),
        }
    }

    /// A small active session used by `quizdesk take --demo`.
    pub fn demo() -> Self {
        let session = Session {
            id: 1,
            title: "Rust fundamentals (demo)".into(),
            quiz_id: 1,
            quiz_title: Some("Rust fundamentals".into()),
            join_code: Some("DEMO01".into()),
            start_time: Utc::now(),
            end_time: None,
            duration_minutes: 5,
            status: SessionStatus::Active,
        };
        let questions = vec![
            Question {
                id: 1,
                question_type: QuestionType::MultipleChoice,
                text: "Which keyword makes a binding mutable?".into(),
                points: 2.0,
                options: options(&[(1, "let"), (2, "mut"), (3, "static"), (4, "ref")]),
                order: Some(1),
            },
            Question {
                id: 2,
                question_type: QuestionType::TrueFalse,
                text: "A value can have two mutable borrows at once.".into(),
                points: 1.0,
                options: options(&[(5, "True"), (6, "False")]),
                order: Some(2),
            },
            Question {
                id: 3,
                question_type: QuestionType::FillBlank,
                text: "The trait used for printing with {} is ____.".into(),
                points: 1.0,
                options: vec![],
                order: Some(3),
            },
            Question {
                id: 4,
                question_type: QuestionType::OpenEnded,
                text: "Describe what the borrow checker enforces.".into(),
                points: 3.0,
                options: vec![],
                order: Some(4),
            },
        ];
        Self::new(session, questions).with_answer_key([(1, 2), (2, 6)].into_iter().collect())
    }

    pub fn with_answer_key(mut self, key: HashMap<QuestionId, OptionId>) -> Self {
        self.answer_key = key;
        self
    }

    pub fn with_participation(self, participation: Participation) -> Self {
        *self.participation.lock().unwrap() = participation;
        self
    }

    pub fn failing_saves(mut self) -> Self {
        self.fail_saves = true;
        self
    }

    pub fn failing_submits(mut self) -> Self {
        self.fail_submits = true;
        self
    }

    /// Hold every save for `delay` before answering.
    pub fn with_save_delay(mut self, delay: Duration) -> Self {
        self.save_delay = Some(delay);
        self
    }

    pub fn save_calls(&self) -> u32 {
        self.save_calls.load(Ordering::Relaxed)
    }

    pub fn submit_calls(&self) -> u32 {
        self.submit_calls.load(Ordering::Relaxed)
    }

    /// Highest number of saves and submits that were running at once.
    pub fn max_in_flight(&self) -> u32 {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn last_save(&self) -> Option<SaveProgressRequest> {
        self.last_save.lock().unwrap().clone()
    }

    fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(&self.in_flight)
    }

    fn check_session(&self, id: SessionId) -> Result<(), ApiError> {
        if id == self.session.id {
            Ok(())
        } else {
            Err(ApiError::NotFound(format!("session {id}")))
        }
    }

    fn grade(&self, request: &SubmitRequest) -> ExamResult {
        let breakdown: Vec<QuestionResult> = self
            .questions
            .iter()
            .map(|q| {
                let selected = request
                    .answers
                    .iter()
                    .find(|a| a.question_id == q.id)
                    .and_then(|a| a.selected_option_id);
                let is_correct = self
                    .answer_key
                    .get(&q.id)
                    .map(|key| selected == Some(*key));
                QuestionResult {
                    question_id: q.id,
                    points_awarded: if is_correct == Some(true) { q.points } else { 0.0 },
                    max_points: q.points,
                    is_correct,
                }
            })
            .collect();

        let score: f64 = breakdown.iter().map(|r| r.points_awarded).sum();
        let max_score: f64 = breakdown.iter().map(|r| r.max_points).sum();
        let percentage = if max_score > 0.0 {
            score / max_score * 100.0
        } else {
            0.0
        };

        ExamResult {
            score,
            max_score,
            percentage,
            time_spent_seconds: request.time_spent_seconds,
            passed: Some(percentage >= 50.0),
            breakdown,
        }
    }
}

struct InFlight<'a>(&'a AtomicU32);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn options(items: &[(OptionId, &str)]) -> Vec<QuestionOption> {
    items
        .iter()
        .map(|(id, text)| QuestionOption {
            id: *id,
            text: (*text).to_string(),
        })
        .collect()
}

#[async_trait]
impl ExamApi for MockExamApi {
    async fn join(&self, code: &str) -> Result<Session, ApiError> {
        if self.session.join_code.as_deref() == Some(code) {
            self.participation.lock().unwrap().joined = true;
            Ok(self.session.clone())
        } else {
            Err(ApiError::NotFound(format!("no session with code {code}")))
        }
    }

    async fn session(&self, id: SessionId) -> Result<Session, ApiError> {
        self.check_session(id)?;
        Ok(self.session.clone())
    }

    async fn questions(&self, id: SessionId) -> Result<Vec<Question>, ApiError> {
        self.check_session(id)?;
        Ok(self.questions.clone())
    }

    async fn participation(&self, id: SessionId) -> Result<Participation, ApiError> {
        self.check_session(id)?;
        Ok(*self.participation.lock().unwrap())
    }

    async fn save_progress(
        &self,
        id: SessionId,
        request: &SaveProgressRequest,
    ) -> Result<(), ApiError> {
        self.check_session(id)?;
        self.save_calls.fetch_add(1, Ordering::Relaxed);
        let _in_flight = self.enter();
        if let Some(delay) = self.save_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_saves {
            return Err(ApiError::from_status(503, "save unavailable".into()));
        }
        *self.last_save.lock().unwrap() = Some(request.clone());
        Ok(())
    }

    async fn submit(
        &self,
        id: SessionId,
        request: &SubmitRequest,
    ) -> Result<ExamResult, ApiError> {
        self.check_session(id)?;
        self.submit_calls.fetch_add(1, Ordering::Relaxed);
        let _in_flight = self.enter();
        if self.fail_submits {
            return Err(ApiError::from_status(500, "grading unavailable".into()));
        }
        {
            let mut participation = self.participation.lock().unwrap();
            if participation.completed {
                return Err(ApiError::Conflict("already submitted".into()));
            }
            participation.joined = true;
            participation.completed = true;
        }
        let result = self.grade(request);
        *self.last_result.lock().unwrap() = Some(result.clone());
        Ok(result)
    }

    async fn result(&self, id: SessionId) -> Result<ExamResult, ApiError> {
        self.check_session(id)?;
        self.last_result
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ApiError::NotFound("no result yet".into()))
    }
}
