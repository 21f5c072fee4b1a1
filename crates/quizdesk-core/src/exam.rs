//! State of one timed exam attempt.
//!
//! [`ExamState`] is a plain synchronous state holder. The engine owns it
//! behind its task loop, and tests can drive it directly.

use std::collections::{BTreeSet, HashMap};

use crate::error::ExamError;
use crate::model::{Answer, AnswerValue, ExamResult, Question, QuestionId, Session};
use crate::traits::{SaveProgressRequest, SubmitRequest};

/// Where the attempt is in its lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum ExamPhase {
    /// Answers may be changed.
    InProgress,
    /// A submission request is in flight.
    Submitting { auto: bool },
    /// The server accepted the submission.
    Submitted(ExamResult),
    /// The backend reported this student already completed the session.
    Blocked,
}

/// Result of one countdown step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Time left after this tick.
    Running(u64),
    /// The countdown just reached zero. Returned once per attempt.
    Expired,
    /// The countdown is stopped or already expired.
    Idle,
}

/// Counters for a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExamProgress {
    pub answered: usize,
    pub flagged: usize,
    pub total: usize,
    pub remaining_secs: u64,
}

/// Local state of one exam attempt.
#[derive(Debug, Clone)]
pub struct ExamState {
    session: Session,
    questions: Vec<Question>,
    answers: HashMap<QuestionId, AnswerValue>,
    flagged: BTreeSet<QuestionId>,
    total_secs: u64,
    remaining_secs: u64,
    expired: bool,
    auto_submitted: bool,
    timer_visible: bool,
    current: usize,
    phase: ExamPhase,
}

impl ExamState {
    /// Create the state for a session. Questions with an explicit `order`
    /// are sorted by it; the rest keep server order.
    pub fn new(session: Session, mut questions: Vec<Question>) -> Self {
        questions.sort_by_key(|q| q.order.unwrap_or(u32::MAX));
        let total_secs = session.duration_secs();
        Self {
            session,
            questions,
            answers: HashMap::new(),
            flagged: BTreeSet::new(),
            total_secs,
            remaining_secs: total_secs,
            expired: false,
            auto_submitted: false,
            timer_visible: true,
            current: 0,
            phase: ExamPhase::InProgress,
        }
    }

    /// Like [`ExamState::new`], but refuses sessions that are not active.
    pub fn open(session: Session, questions: Vec<Question>) -> Result<Self, ExamError> {
        if !session.status.accepts_answers() {
            return Err(ExamError::SessionNotActive(session.status));
        }
        Ok(Self::new(session, questions))
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn phase(&self) -> &ExamPhase {
        &self.phase
    }

    pub fn remaining_secs(&self) -> u64 {
        self.remaining_secs
    }

    pub fn is_expired(&self) -> bool {
        self.expired
    }

    /// Whether the last submission was triggered by the countdown.
    pub fn auto_submitted(&self) -> bool {
        self.auto_submitted
    }

    pub fn timer_visible(&self) -> bool {
        self.timer_visible
    }

    /// Seconds used so far.
    pub fn time_spent_secs(&self) -> u64 {
        self.total_secs - self.remaining_secs
    }

    pub fn answer(&self, id: QuestionId) -> Option<&AnswerValue> {
        self.answers.get(&id)
    }

    pub fn is_flagged(&self, id: QuestionId) -> bool {
        self.flagged.contains(&id)
    }

    /// The server result, once submitted.
    pub fn result(&self) -> Option<&ExamResult> {
        match &self.phase {
            ExamPhase::Submitted(result) => Some(result),
            _ => None,
        }
    }

    pub fn progress(&self) -> ExamProgress {
        ExamProgress {
            answered: self.answers.len(),
            flagged: self.flagged.len(),
            total: self.questions.len(),
            remaining_secs: self.remaining_secs,
        }
    }

    fn question(&self, id: QuestionId) -> Result<&Question, ExamError> {
        self.questions
            .iter()
            .find(|q| q.id == id)
            .ok_or(ExamError::UnknownQuestion(id))
    }

    fn ensure_editable(&self) -> Result<(), ExamError> {
        match self.phase {
            ExamPhase::InProgress if self.expired => Err(ExamError::TimeExpired),
            ExamPhase::InProgress => Ok(()),
            ExamPhase::Submitting { .. } => Err(ExamError::SubmissionInProgress),
            ExamPhase::Submitted(_) => Err(ExamError::AlreadySubmitted),
            ExamPhase::Blocked => Err(ExamError::AlreadyParticipated),
        }
    }

    /// Record an answer, replacing any earlier value for the question.
    ///
    /// Blank text clears the answer.
    pub fn set_answer(&mut self, id: QuestionId, value: AnswerValue) -> Result<(), ExamError> {
        self.ensure_editable()?;
        let question = self.question(id)?;
        let question_type = question.question_type;
        let known_option = match &value {
            AnswerValue::Choice(option) => question.option(*option).is_some(),
            AnswerValue::Text(_) => false,
        };

        match (&value, question_type.is_choice()) {
            (AnswerValue::Choice(option), true) => {
                if !known_option {
                    return Err(ExamError::InvalidAnswer {
                        question_id: id,
                        reason: format!("option {option} does not exist"),
                    });
                }
            }
            (AnswerValue::Text(text), false) => {
                if text.trim().is_empty() {
                    self.answers.remove(&id);
                    return Ok(());
                }
            }
            (AnswerValue::Choice(_), false) => {
                return Err(ExamError::InvalidAnswer {
                    question_id: id,
                    reason: format!("{question_type} question expects text"),
                });
            }
            (AnswerValue::Text(_), true) => {
                return Err(ExamError::InvalidAnswer {
                    question_id: id,
                    reason: format!("{question_type} question expects an option"),
                });
            }
        }

        self.answers.insert(id, value);
        Ok(())
    }

    pub fn clear_answer(&mut self, id: QuestionId) -> Result<(), ExamError> {
        self.ensure_editable()?;
        self.question(id)?;
        self.answers.remove(&id);
        Ok(())
    }

    /// Toggle the review flag of a question. Returns the new flag state.
    pub fn toggle_flag(&mut self, id: QuestionId) -> Result<bool, ExamError> {
        self.question(id)?;
        if self.flagged.remove(&id) {
            Ok(false)
        } else {
            self.flagged.insert(id);
            Ok(true)
        }
    }

    /// Show or hide the timer. The countdown keeps running either way.
    pub fn toggle_timer_visibility(&mut self) -> bool {
        self.timer_visible = !self.timer_visible;
        self.timer_visible
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current)
    }

    pub fn next(&mut self) -> Option<&Question> {
        if self.current + 1 < self.questions.len() {
            self.current += 1;
        }
        self.current_question()
    }

    pub fn previous(&mut self) -> Option<&Question> {
        self.current = self.current.saturating_sub(1);
        self.current_question()
    }

    pub fn go_to(&mut self, index: usize) -> Option<&Question> {
        if index < self.questions.len() {
            self.current = index;
            self.current_question()
        } else {
            None
        }
    }

    /// Move to the next flagged question after the current one, wrapping.
    pub fn next_flagged(&mut self) -> Option<&Question> {
        let len = self.questions.len();
        let found = (1..=len)
            .map(|step| (self.current + step) % len)
            .find(|&i| self.flagged.contains(&self.questions[i].id))?;
        self.current = found;
        self.current_question()
    }

    /// Advance the countdown by one second.
    pub fn tick(&mut self) -> TickOutcome {
        if self.expired {
            return TickOutcome::Idle;
        }
        match self.phase {
            ExamPhase::InProgress | ExamPhase::Submitting { .. } => {}
            ExamPhase::Submitted(_) | ExamPhase::Blocked => return TickOutcome::Idle,
        }

        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        if self.remaining_secs == 0 {
            self.expired = true;
            TickOutcome::Expired
        } else {
            TickOutcome::Running(self.remaining_secs)
        }
    }

    /// Answers in question order, in the backend's wire shape.
    pub fn answers(&self) -> Vec<Answer> {
        self.questions
            .iter()
            .filter_map(|q| self.answers.get(&q.id).map(|v| Answer::new(q.id, v)))
            .collect()
    }

    pub fn save_request(&self) -> SaveProgressRequest {
        SaveProgressRequest {
            answers: self.answers(),
            remaining_seconds: self.remaining_secs,
        }
    }

    /// Enter the submitting phase and build the request body.
    pub fn begin_submit(&mut self, auto: bool) -> Result<SubmitRequest, ExamError> {
        match self.phase {
            ExamPhase::InProgress => {}
            ExamPhase::Submitting { .. } => return Err(ExamError::SubmissionInProgress),
            ExamPhase::Submitted(_) => return Err(ExamError::AlreadySubmitted),
            ExamPhase::Blocked => return Err(ExamError::AlreadyParticipated),
        }
        self.phase = ExamPhase::Submitting { auto };
        self.auto_submitted = auto;
        Ok(SubmitRequest {
            answers: self.answers(),
            time_spent_seconds: self.time_spent_secs(),
            auto_submitted: auto,
        })
    }

    pub fn complete_submit(&mut self, result: ExamResult) -> Result<(), ExamError> {
        if !matches!(self.phase, ExamPhase::Submitting { .. }) {
            return Err(ExamError::NotSubmitting);
        }
        self.phase = ExamPhase::Submitted(result);
        Ok(())
    }

    /// Return to `InProgress` after a failed submission so it can be retried.
    pub fn fail_submit(&mut self) -> Result<(), ExamError> {
        if !matches!(self.phase, ExamPhase::Submitting { .. }) {
            return Err(ExamError::NotSubmitting);
        }
        self.phase = ExamPhase::InProgress;
        Ok(())
    }

    pub fn block(&mut self) {
        self.phase = ExamPhase::Blocked;
    }
}

/// Format seconds as `MM:SS`, or `H:MM:SS` from one hour up.
pub fn format_clock(secs: u64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::{QuestionOption, QuestionType, SessionStatus};

    pub(crate) fn session(duration_minutes: u32) -> Session {
        Session {
            id: 1,
            title: "Unit test".into(),
            quiz_id: 10,
            quiz_title: None,
            join_code: Some("JOIN42".into()),
            start_time: chrono::Utc::now(),
            end_time: None,
            duration_minutes,
            status: SessionStatus::Active,
        }
    }

    pub(crate) fn questions() -> Vec<Question> {
        vec![
            Question {
                id: 100,
                question_type: QuestionType::MultipleChoice,
                text: "Capital of France?".into(),
                points: 2.0,
                options: vec![
                    QuestionOption { id: 1, text: "Paris".into() },
                    QuestionOption { id: 2, text: "Rome".into() },
                ],
                order: Some(1),
            },
            Question {
                id: 200,
                question_type: QuestionType::OpenEnded,
                text: "Explain ownership.".into(),
                points: 5.0,
                options: vec![],
                order: Some(2),
            },
            Question {
                id: 300,
                question_type: QuestionType::TrueFalse,
                text: "Rust has a GC.".into(),
                points: 1.0,
                options: vec![
                    QuestionOption { id: 7, text: "True".into() },
                    QuestionOption { id: 8, text: "False".into() },
                ],
                order: Some(3),
            },
        ]
    }

    fn state() -> ExamState {
        ExamState::new(session(1), questions())
    }

    fn result() -> ExamResult {
        ExamResult {
            score: 3.0,
            max_score: 8.0,
            percentage: 37.5,
            time_spent_seconds: 60,
            passed: Some(false),
            breakdown: vec![],
        }
    }

    #[test]
    fn countdown_starts_at_duration() {
        let s = state();
        assert_eq!(s.remaining_secs(), 60);
        assert_eq!(s.time_spent_secs(), 0);
    }

    #[test]
    fn open_rejects_inactive_session() {
        let mut sess = session(5);
        sess.status = SessionStatus::Scheduled;
        let err = ExamState::open(sess, questions()).unwrap_err();
        assert!(matches!(err, ExamError::SessionNotActive(SessionStatus::Scheduled)));

        for status in [SessionStatus::Paused, SessionStatus::Completed, SessionStatus::Cancelled] {
            let mut sess = session(5);
            sess.status = status;
            assert!(ExamState::open(sess, questions()).is_err());
        }
        assert!(ExamState::open(session(5), questions()).is_ok());
    }

    #[test]
    fn last_write_wins() {
        let mut s = state();
        s.set_answer(100, AnswerValue::Choice(2)).unwrap();
        s.set_answer(100, AnswerValue::Choice(1)).unwrap();
        s.set_answer(200, AnswerValue::Text("first".into())).unwrap();
        s.set_answer(200, AnswerValue::Text("second".into())).unwrap();

        assert_eq!(s.answer(100), Some(&AnswerValue::Choice(1)));
        assert_eq!(s.answer(200), Some(&AnswerValue::Text("second".into())));
        assert_eq!(s.answers().len(), 2);
    }

    #[test]
    fn answers_follow_question_order() {
        let mut s = state();
        s.set_answer(300, AnswerValue::Choice(8)).unwrap();
        s.set_answer(100, AnswerValue::Choice(1)).unwrap();
        let ids: Vec<_> = s.answers().iter().map(|a| a.question_id).collect();
        assert_eq!(ids, vec![100, 300]);
    }

    #[test]
    fn rejects_invalid_answers() {
        let mut s = state();
        assert!(matches!(
            s.set_answer(999, AnswerValue::Choice(1)),
            Err(ExamError::UnknownQuestion(999))
        ));
        assert!(matches!(
            s.set_answer(100, AnswerValue::Choice(42)),
            Err(ExamError::InvalidAnswer { question_id: 100, .. })
        ));
        assert!(matches!(
            s.set_answer(100, AnswerValue::Text("Paris".into())),
            Err(ExamError::InvalidAnswer { .. })
        ));
        assert!(matches!(
            s.set_answer(200, AnswerValue::Choice(1)),
            Err(ExamError::InvalidAnswer { .. })
        ));
    }

    #[test]
    fn blank_text_clears() {
        let mut s = state();
        s.set_answer(200, AnswerValue::Text("draft".into())).unwrap();
        s.set_answer(200, AnswerValue::Text("   ".into())).unwrap();
        assert!(s.answer(200).is_none());
    }

    #[test]
    fn flags_are_local_toggles() {
        let mut s = state();
        assert!(s.toggle_flag(200).unwrap());
        assert!(s.is_flagged(200));
        assert!(!s.toggle_flag(200).unwrap());
        assert!(s.toggle_flag(404).is_err());
        assert_eq!(s.progress().flagged, 0);
    }

    #[test]
    fn navigation_and_flag_jumps() {
        let mut s = state();
        assert_eq!(s.current_question().unwrap().id, 100);
        assert_eq!(s.previous().unwrap().id, 100);
        assert_eq!(s.next().unwrap().id, 200);
        assert_eq!(s.next().unwrap().id, 300);
        assert_eq!(s.next().unwrap().id, 300);
        assert!(s.go_to(7).is_none());
        assert_eq!(s.current_index(), 2);

        s.toggle_flag(200).unwrap();
        assert_eq!(s.next_flagged().unwrap().id, 200);
        assert_eq!(s.next_flagged().unwrap().id, 200);
    }

    #[test]
    fn timer_visibility_does_not_stop_countdown() {
        let mut s = state();
        assert!(!s.toggle_timer_visibility());
        assert_eq!(s.tick(), TickOutcome::Running(59));
    }

    #[test]
    fn countdown_expires_exactly_once() {
        let mut s = state();
        let mut expirations = 0;
        for _ in 0..120 {
            if s.tick() == TickOutcome::Expired {
                expirations += 1;
            }
        }
        assert_eq!(expirations, 1);
        assert_eq!(s.remaining_secs(), 0);
        assert!(s.is_expired());
        assert!(matches!(
            s.set_answer(100, AnswerValue::Choice(1)),
            Err(ExamError::TimeExpired)
        ));
    }

    #[test]
    fn zero_duration_expires_on_first_tick() {
        let mut s = ExamState::new(session(0), questions());
        assert_eq!(s.tick(), TickOutcome::Expired);
        assert_eq!(s.tick(), TickOutcome::Idle);
    }

    #[test]
    fn duplicate_submission_is_refused() {
        let mut s = state();
        s.set_answer(100, AnswerValue::Choice(1)).unwrap();
        s.tick();
        let req = s.begin_submit(false).unwrap();
        assert_eq!(req.answers.len(), 1);
        assert_eq!(req.time_spent_seconds, 1);
        assert!(!req.auto_submitted);

        assert!(matches!(s.begin_submit(false), Err(ExamError::SubmissionInProgress)));
        assert!(matches!(
            s.set_answer(100, AnswerValue::Choice(2)),
            Err(ExamError::SubmissionInProgress)
        ));

        s.complete_submit(result()).unwrap();
        assert!(matches!(s.begin_submit(true), Err(ExamError::AlreadySubmitted)));
        assert_eq!(s.result().unwrap().percentage, 37.5);
        assert_eq!(s.tick(), TickOutcome::Idle);
    }

    #[test]
    fn failed_submission_can_be_retried() {
        let mut s = state();
        s.begin_submit(false).unwrap();
        s.fail_submit().unwrap();
        assert_eq!(s.phase(), &ExamPhase::InProgress);
        assert!(s.begin_submit(true).is_ok());
        assert!(s.auto_submitted());
        assert!(matches!(
            ExamState::new(session(1), questions()).fail_submit(),
            Err(ExamError::NotSubmitting)
        ));
    }

    #[test]
    fn blocked_attempt_refuses_everything() {
        let mut s = state();
        s.block();
        assert!(matches!(s.begin_submit(false), Err(ExamError::AlreadyParticipated)));
        assert!(matches!(
            s.set_answer(100, AnswerValue::Choice(1)),
            Err(ExamError::AlreadyParticipated)
        ));
        assert_eq!(s.tick(), TickOutcome::Idle);
    }

    #[test]
    fn clock_formatting() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(75), "01:15");
        assert_eq!(format_clock(3661), "1:01:01");
    }
}
