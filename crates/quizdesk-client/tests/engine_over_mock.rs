//! Exam engine runs against the in-memory backend.

use std::sync::Arc;
use std::time::Duration;

use quizdesk_client::MockExamApi;
use quizdesk_core::engine::{EngineConfig, ExamEngine, ExamHandle, NoopObserver};
use quizdesk_core::error::{ApiError, ExamError};
use quizdesk_core::exam::{ExamPhase, ExamState};
use quizdesk_core::model::{AnswerValue, Participation};
use quizdesk_core::traits::ExamApi;

async fn start(api: &Arc<MockExamApi>) -> ExamHandle {
    let session = api.session(1).await.unwrap();
    let questions = api.questions(1).await.unwrap();
    let state = ExamState::open(session, questions).unwrap();
    let dyn_api: Arc<dyn ExamApi> = api.clone();
    ExamEngine::start(dyn_api, state, EngineConfig::default(), Arc::new(NoopObserver))
}

#[tokio::test(start_paused = true)]
async fn completed_participation_blocks_attempt() {
    let api = Arc::new(MockExamApi::demo().with_participation(Participation {
        joined: true,
        completed: true,
    }));
    let handle = start(&api).await;

    let err = handle.submit().await.unwrap_err();
    assert!(matches!(err, ExamError::AlreadyParticipated));
    assert_eq!(api.submit_calls(), 0);

    let state = handle.join().await.unwrap();
    assert_eq!(state.phase(), &ExamPhase::Blocked);
}

#[tokio::test(start_paused = true)]
async fn failing_submit_keeps_attempt_open() {
    let api = Arc::new(MockExamApi::demo().failing_submits());
    let handle = start(&api).await;
    handle.answer(1, AnswerValue::Choice(2)).await.unwrap();

    let err = handle.submit().await.unwrap_err();
    assert!(matches!(
        err,
        ExamError::Api(ApiError::Api { status: 500, .. })
    ));
    // One attempt plus the two default retries.
    assert_eq!(api.submit_calls(), 3);

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.phase(), &ExamPhase::InProgress);
    assert_eq!(snapshot.answer(1), Some(&AnswerValue::Choice(2)));

    let state = handle.stop().await.unwrap();
    assert_eq!(state.phase(), &ExamPhase::InProgress);
}

#[tokio::test(start_paused = true)]
async fn slow_save_finishes_before_submit() {
    let api = Arc::new(MockExamApi::demo().with_save_delay(Duration::from_secs(10)));
    let handle = start(&api).await;
    handle.answer(1, AnswerValue::Choice(2)).await.unwrap();

    // The first auto-save starts at 30s and is still running at 31s.
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(api.save_calls(), 1);

    let result = handle.submit().await.unwrap();
    assert_eq!(result.score, 2.0);
    assert_eq!(api.submit_calls(), 1);
    assert_eq!(api.max_in_flight(), 1);
    assert_eq!(api.last_save().unwrap().answers.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn second_attempt_after_submit_is_blocked() {
    let api = Arc::new(MockExamApi::demo());

    let first = start(&api).await;
    first.submit().await.unwrap();
    assert!(matches!(
        first.join().await.unwrap().phase(),
        ExamPhase::Submitted(_)
    ));

    let second = start(&api).await;
    let err = second.submit().await.unwrap_err();
    assert!(matches!(err, ExamError::AlreadyParticipated));
    assert_eq!(api.submit_calls(), 1);
}
