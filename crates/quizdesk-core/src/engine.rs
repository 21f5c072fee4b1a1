//! Timed exam engine.
//!
//! Runs one attempt in a single tokio task: a one-second countdown that
//! auto-submits at zero, a periodic best-effort auto-save, and commands
//! coming from the UI through an [`ExamHandle`].
//!
//! All network writes go through a single-permit semaphore. Auto-save skips
//! its turn when a request is in flight; submission waits for the permit,
//! so a pending save always finishes before the final submit starts.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{ApiError, ExamError};
use crate::exam::{ExamPhase, ExamState, TickOutcome};
use crate::model::{AnswerValue, ExamResult, QuestionId};
use crate::traits::{ExamApi, SubmitRequest};

/// Configuration for the exam engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Countdown step. One second of exam time passes per tick.
    pub tick_interval: Duration,
    /// Period between auto-saves.
    pub autosave_interval: Duration,
    /// Retries on transient submit errors.
    pub max_submit_retries: u32,
    /// First delay between submit retries; doubles on each retry.
    pub retry_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            autosave_interval: Duration::from_secs(30),
            max_submit_retries: 2,
            retry_delay: Duration::from_secs(1),
        }
    }
}

const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Progress reporting trait.
pub trait ExamObserver: Send + Sync {
    fn on_tick(&self, remaining_secs: u64);
    fn on_expired(&self);
    fn on_autosave(&self, answers: usize);
    fn on_autosave_failed(&self, error: &ApiError);
    fn on_submitted(&self, result: &ExamResult, auto: bool);
    fn on_submit_failed(&self, error: &ExamError);
}

/// No-op observer.
pub struct NoopObserver;

impl ExamObserver for NoopObserver {
    fn on_tick(&self, _: u64) {}
    fn on_expired(&self) {}
    fn on_autosave(&self, _: usize) {}
    fn on_autosave_failed(&self, _: &ApiError) {}
    fn on_submitted(&self, _: &ExamResult, _: bool) {}
    fn on_submit_failed(&self, _: &ExamError) {}
}

/// Review navigation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Next,
    Previous,
    Index(usize),
    NextFlagged,
}

type Reply<T> = oneshot::Sender<T>;

enum Command {
    Answer {
        id: QuestionId,
        value: AnswerValue,
        reply: Reply<Result<(), ExamError>>,
    },
    Clear {
        id: QuestionId,
        reply: Reply<Result<(), ExamError>>,
    },
    ToggleFlag {
        id: QuestionId,
        reply: Reply<Result<bool, ExamError>>,
    },
    ToggleTimer {
        reply: Reply<bool>,
    },
    Navigate {
        to: Navigation,
        reply: Reply<Option<usize>>,
    },
    Snapshot {
        reply: Reply<ExamState>,
    },
    Submit {
        reply: Reply<Result<ExamResult, ExamError>>,
    },
    Stop,
}

/// Entry point for running an attempt.
pub struct ExamEngine;

impl ExamEngine {
    /// Spawn the engine task for `state` and return a handle to it.
    pub fn start(
        api: Arc<dyn ExamApi>,
        state: ExamState,
        config: EngineConfig,
        observer: Arc<dyn ExamObserver>,
    ) -> ExamHandle {
        let (tx, rx) = mpsc::channel(32);
        let span = tracing::info_span!(
            "exam",
            attempt = %Uuid::new_v4(),
            session = state.session().id
        );
        let worker = Worker {
            api,
            state,
            config,
            observer,
            gate: Arc::new(Semaphore::new(1)),
            rx,
        };
        let task = tokio::spawn(worker.run().instrument(span));
        ExamHandle { tx, task }
    }
}

/// Handle used by the UI to drive a running attempt.
pub struct ExamHandle {
    tx: mpsc::Sender<Command>,
    task: JoinHandle<ExamState>,
}

impl ExamHandle {
    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, ExamError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| ExamError::EngineStopped)?;
        rx.await.map_err(|_| ExamError::EngineStopped)
    }

    pub async fn answer(&self, id: QuestionId, value: AnswerValue) -> Result<(), ExamError> {
        self.request(|reply| Command::Answer { id, value, reply })
            .await?
    }

    pub async fn clear(&self, id: QuestionId) -> Result<(), ExamError> {
        self.request(|reply| Command::Clear { id, reply }).await?
    }

    /// Toggle a review flag. Returns the new flag state.
    pub async fn toggle_flag(&self, id: QuestionId) -> Result<bool, ExamError> {
        self.request(|reply| Command::ToggleFlag { id, reply })
            .await?
    }

    /// Show or hide the timer. Returns whether it is now visible.
    pub async fn toggle_timer(&self) -> Result<bool, ExamError> {
        self.request(|reply| Command::ToggleTimer { reply }).await
    }

    /// Move the review cursor. Returns the new index, if the move was valid.
    pub async fn navigate(&self, to: Navigation) -> Result<Option<usize>, ExamError> {
        self.request(|reply| Command::Navigate { to, reply }).await
    }

    /// A copy of the current attempt state.
    pub async fn snapshot(&self) -> Result<ExamState, ExamError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Submit the attempt as the student. On error the attempt stays open.
    pub async fn submit(&self) -> Result<ExamResult, ExamError> {
        self.request(|reply| Command::Submit { reply }).await?
    }

    /// Resolves once the engine task has ended.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the engine without submitting and return the final state.
    pub async fn stop(self) -> Result<ExamState, ExamError> {
        // The task may already be gone; that is fine.
        let _ = self.tx.send(Command::Stop).await;
        self.join().await
    }

    /// Wait for the engine to end on its own (submission or block).
    pub async fn join(self) -> Result<ExamState, ExamError> {
        self.task.await.map_err(|e| {
            tracing::error!("exam task failed: {e}");
            ExamError::EngineStopped
        })
    }
}

struct Worker {
    api: Arc<dyn ExamApi>,
    state: ExamState,
    config: EngineConfig,
    observer: Arc<dyn ExamObserver>,
    gate: Arc<Semaphore>,
    rx: mpsc::Receiver<Command>,
}

impl Worker {
    async fn run(mut self) -> ExamState {
        let start = Instant::now();
        let mut countdown = interval_at(start + self.config.tick_interval, self.config.tick_interval);
        let mut autosave = interval_at(
            start + self.config.autosave_interval,
            self.config.autosave_interval,
        );
        autosave.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            remaining_secs = self.state.remaining_secs(),
            questions = self.state.questions().len(),
            "exam started"
        );

        loop {
            tokio::select! {
                _ = countdown.tick() => {
                    match self.state.tick() {
                        TickOutcome::Running(remaining) => self.observer.on_tick(remaining),
                        TickOutcome::Expired => {
                            self.observer.on_tick(0);
                            self.observer.on_expired();
                            if matches!(self.state.phase(), ExamPhase::InProgress) {
                                tracing::info!("time is up, submitting automatically");
                                // Failures are reported through the observer; the
                                // student can retry manually.
                                let _ = self.submit(true).await;
                            }
                        }
                        TickOutcome::Idle => {}
                    }
                }
                _ = autosave.tick() => self.autosave(),
                command = self.rx.recv() => {
                    let Some(command) = command else { break };
                    if !self.handle(command).await {
                        break;
                    }
                }
            }

            if matches!(
                self.state.phase(),
                ExamPhase::Submitted(_) | ExamPhase::Blocked
            ) {
                break;
            }
        }

        tracing::debug!("exam engine stopped");
        self.state
    }

    /// Apply one command. Returns `false` when the loop should end.
    async fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Answer { id, value, reply } => {
                let _ = reply.send(self.state.set_answer(id, value));
            }
            Command::Clear { id, reply } => {
                let _ = reply.send(self.state.clear_answer(id));
            }
            Command::ToggleFlag { id, reply } => {
                let _ = reply.send(self.state.toggle_flag(id));
            }
            Command::ToggleTimer { reply } => {
                let _ = reply.send(self.state.toggle_timer_visibility());
            }
            Command::Navigate { to, reply } => {
                let moved = match to {
                    Navigation::Next => self.state.next().is_some(),
                    Navigation::Previous => self.state.previous().is_some(),
                    Navigation::Index(i) => self.state.go_to(i).is_some(),
                    Navigation::NextFlagged => self.state.next_flagged().is_some(),
                };
                let _ = reply.send(moved.then(|| self.state.current_index()));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.state.clone());
            }
            Command::Submit { reply } => {
                let _ = reply.send(self.submit(false).await);
            }
            Command::Stop => return false,
        }
        true
    }

    fn autosave(&self) {
        if !matches!(self.state.phase(), ExamPhase::InProgress) || self.state.is_expired() {
            return;
        }
        let permit = match Arc::clone(&self.gate).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!("request in flight, skipping auto-save");
                return;
            }
        };

        let api = Arc::clone(&self.api);
        let observer = Arc::clone(&self.observer);
        let id = self.state.session().id;
        let request = self.state.save_request();

        tokio::spawn(
            async move {
                let _permit: OwnedSemaphorePermit = permit;
                let count = request.answers.len();
                match api.save_progress(id, &request).await {
                    Ok(()) => {
                        tracing::debug!(answers = count, "progress saved");
                        observer.on_autosave(count);
                    }
                    Err(e) => {
                        tracing::warn!("auto-save failed: {e}");
                        observer.on_autosave_failed(&e);
                    }
                }
            }
            .in_current_span(),
        );
    }

    async fn submit(&mut self, auto: bool) -> Result<ExamResult, ExamError> {
        let request = match self.state.begin_submit(auto) {
            Ok(request) => request,
            Err(e) => {
                self.observer.on_submit_failed(&e);
                return Err(e);
            }
        };

        match self.send_submission(&request).await {
            Ok(result) => {
                tracing::info!(
                    score = result.score,
                    max_score = result.max_score,
                    auto,
                    "exam submitted"
                );
                self.state.complete_submit(result.clone())?;
                self.observer.on_submitted(&result, auto);
                Ok(result)
            }
            Err(e) => {
                if matches!(
                    e,
                    ExamError::AlreadyParticipated | ExamError::Api(ApiError::Conflict(_))
                ) {
                    self.state.block();
                } else {
                    self.state.fail_submit()?;
                }
                tracing::error!("submission failed: {e}");
                self.observer.on_submit_failed(&e);
                Err(e)
            }
        }
    }

    async fn send_submission(&self, request: &SubmitRequest) -> Result<ExamResult, ExamError> {
        let id = self.state.session().id;

        // A failed check does not stop the submit; the backend rejects duplicates with 409.
        match self.api.participation(id).await {
            Ok(p) if p.completed => return Err(ExamError::AlreadyParticipated),
            Ok(_) => {}
            Err(e) => tracing::warn!("participation check failed, submitting anyway: {e}"),
        }

        let _permit = Arc::clone(&self.gate)
            .acquire_owned()
            .await
            .map_err(|_| ExamError::EngineStopped)?;

        let mut retry_delay = self.config.retry_delay;
        let mut attempt = 0;
        loop {
            match self.api.submit(id, request).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_permanent() || attempt >= self.config.max_submit_retries => {
                    return Err(e.into());
                }
                Err(e) => {
                    attempt += 1;
                    tracing::warn!(attempt, "submit failed, retrying in {retry_delay:?}: {e}");
                    tokio::time::sleep(retry_delay).await;
                    retry_delay = (retry_delay * 2).min(MAX_RETRY_DELAY);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::exam::tests::{questions, session};
    use crate::model::{Participation, Question, Session, SessionId};
    use crate::traits::SaveProgressRequest;

    #[derive(Default)]
    struct RecordingApi {
        saves: AtomicU32,
        submits: AtomicU32,
        fail_saves: bool,
        completed: bool,
        /// Submits that fail with this status before one succeeds.
        submit_failures: Mutex<Vec<u16>>,
        save_delay: Option<Duration>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        last_submit: Mutex<Option<SubmitRequest>>,
    }

    impl RecordingApi {
        fn enter(&self) {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        }

        fn leave(&self) {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ExamApi for RecordingApi {
        async fn join(&self, _: &str) -> Result<Session, ApiError> {
            Ok(session(1))
        }

        async fn session(&self, _: SessionId) -> Result<Session, ApiError> {
            Ok(session(1))
        }

        async fn questions(&self, _: SessionId) -> Result<Vec<Question>, ApiError> {
            Ok(questions())
        }

        async fn participation(&self, _: SessionId) -> Result<Participation, ApiError> {
            Ok(Participation {
                joined: true,
                completed: self.completed,
            })
        }

        async fn save_progress(
            &self,
            _: SessionId,
            _: &SaveProgressRequest,
        ) -> Result<(), ApiError> {
            self.enter();
            if let Some(delay) = self.save_delay {
                tokio::time::sleep(delay).await;
            }
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.leave();
            if self.fail_saves {
                Err(ApiError::Network("connection reset".into()))
            } else {
                Ok(())
            }
        }

        async fn submit(
            &self,
            _: SessionId,
            request: &SubmitRequest,
        ) -> Result<ExamResult, ApiError> {
            self.enter();
            self.submits.fetch_add(1, Ordering::SeqCst);
            *self.last_submit.lock().unwrap() = Some(request.clone());
            let failure = {
                let mut failures = self.submit_failures.lock().unwrap();
                (!failures.is_empty()).then(|| failures.remove(0))
            };
            self.leave();
            if let Some(status) = failure {
                return Err(ApiError::from_status(status, "nope".into()));
            }
            Ok(ExamResult {
                score: request.answers.len() as f64,
                max_score: 8.0,
                percentage: request.answers.len() as f64 / 8.0 * 100.0,
                time_spent_seconds: request.time_spent_seconds,
                passed: None,
                breakdown: vec![],
            })
        }

        async fn result(&self, _: SessionId) -> Result<ExamResult, ApiError> {
            Err(ApiError::NotFound("no result".into()))
        }
    }

    fn start(api: &Arc<RecordingApi>, minutes: u32) -> ExamHandle {
        let api: Arc<dyn ExamApi> = api.clone();
        ExamEngine::start(
            api,
            ExamState::new(session(minutes), questions()),
            EngineConfig::default(),
            Arc::new(NoopObserver),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_auto_submits_exactly_once() {
        let api = Arc::new(RecordingApi::default());
        let handle = start(&api, 1);
        handle
            .answer(100, AnswerValue::Choice(1))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(120)).await;
        let state = handle.join().await.unwrap();

        assert_eq!(api.submits.load(Ordering::SeqCst), 1);
        let sent = api.last_submit.lock().unwrap().clone().unwrap();
        assert!(sent.auto_submitted);
        assert_eq!(sent.time_spent_seconds, 60);
        assert_eq!(state.result().unwrap().score, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn autosave_runs_on_interval_and_stops_after_submit() {
        let api = Arc::new(RecordingApi::default());
        let handle = start(&api, 10);

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(api.saves.load(Ordering::SeqCst), 3);

        handle.submit().await.unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(api.saves.load(Ordering::SeqCst), 3);
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn autosave_failures_are_ignored() {
        let api = Arc::new(RecordingApi {
            fail_saves: true,
            ..Default::default()
        });
        let handle = start(&api, 10);

        tokio::time::sleep(Duration::from_secs(65)).await;
        assert_eq!(api.saves.load(Ordering::SeqCst), 2);
        assert!(handle.submit().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn completed_participation_blocks_submission() {
        let api = Arc::new(RecordingApi {
            completed: true,
            ..Default::default()
        });
        let handle = start(&api, 10);

        let err = handle.submit().await.unwrap_err();
        assert!(matches!(err, ExamError::AlreadyParticipated));
        assert_eq!(api.submits.load(Ordering::SeqCst), 0);

        let state = handle.join().await.unwrap();
        assert_eq!(state.phase(), &ExamPhase::Blocked);
    }

    #[tokio::test(start_paused = true)]
    async fn save_and_submit_never_overlap() {
        let api = Arc::new(RecordingApi {
            save_delay: Some(Duration::from_secs(10)),
            ..Default::default()
        });
        let handle = start(&api, 10);

        // The first auto-save starts at 30s and holds the gate until 40s.
        tokio::time::sleep(Duration::from_secs(31)).await;
        handle.submit().await.unwrap();

        assert_eq!(api.saves.load(Ordering::SeqCst), 1);
        assert_eq!(api.submits.load(Ordering::SeqCst), 1);
        assert_eq!(api.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_submit_errors_are_retried() {
        let api = Arc::new(RecordingApi {
            submit_failures: Mutex::new(vec![503, 502]),
            ..Default::default()
        });
        let handle = start(&api, 10);

        assert!(handle.submit().await.is_ok());
        assert_eq!(api.submits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_submit_error_leaves_attempt_open() {
        let api = Arc::new(RecordingApi {
            submit_failures: Mutex::new(vec![403]),
            ..Default::default()
        });
        let handle = start(&api, 10);
        handle
            .answer(200, AnswerValue::Text("borrowck".into()))
            .await
            .unwrap();

        let err = handle.submit().await.unwrap_err();
        assert!(matches!(err, ExamError::Api(ApiError::Forbidden(_))));
        assert_eq!(api.submits.load(Ordering::SeqCst), 1);

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.phase(), &ExamPhase::InProgress);

        let result = handle.submit().await.unwrap();
        assert_eq!(result.score, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn conflict_on_submit_blocks_attempt() {
        let api = Arc::new(RecordingApi {
            submit_failures: Mutex::new(vec![409]),
            ..Default::default()
        });
        let handle = start(&api, 10);

        let err = handle.submit().await.unwrap_err();
        assert!(matches!(err, ExamError::Api(ApiError::Conflict(_))));

        let state = handle.join().await.unwrap();
        assert_eq!(state.phase(), &ExamPhase::Blocked);
        assert_eq!(api.submits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn commands_update_state() {
        let api = Arc::new(RecordingApi::default());
        let handle = start(&api, 10);

        handle.answer(100, AnswerValue::Choice(2)).await.unwrap();
        handle.answer(100, AnswerValue::Choice(1)).await.unwrap();
        assert!(handle.toggle_flag(300).await.unwrap());
        assert!(!handle.toggle_timer().await.unwrap());
        assert_eq!(handle.navigate(Navigation::NextFlagged).await.unwrap(), Some(2));
        assert_eq!(handle.navigate(Navigation::Index(9)).await.unwrap(), None);
        assert!(matches!(
            handle.answer(42, AnswerValue::Choice(1)).await,
            Err(ExamError::UnknownQuestion(42))
        ));

        tokio::time::sleep(Duration::from_millis(5_500)).await;
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.answer(100), Some(&AnswerValue::Choice(1)));
        assert_eq!(snapshot.remaining_secs(), 595);
        assert!(!snapshot.timer_visible());

        let state = handle.stop().await.unwrap();
        assert_eq!(state.phase(), &ExamPhase::InProgress);
        assert_eq!(api.submits.load(Ordering::SeqCst), 0);
    }
}
