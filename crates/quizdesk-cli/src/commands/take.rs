//! The `quizdesk take` command.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use quizdesk_client::{create_api, load_config_from, MockExamApi};
use quizdesk_core::engine::{ExamEngine, ExamHandle, ExamObserver, Navigation};
use quizdesk_core::error::{ApiError, ExamError};
use quizdesk_core::exam::{format_clock, ExamPhase, ExamState};
use quizdesk_core::model::{AnswerValue, ExamResult, Question};
use quizdesk_core::report::ResultSummary;
use quizdesk_core::traits::ExamApi;

use super::api_error;
use super::questions::option_letter;
use super::result::print_summary;

/// Remaining times, in seconds, at which the student is warned.
const WARN_AT: [u64; 5] = [600, 300, 60, 30, 10];

/// Whether going from `before` to `now` seconds left passes a warning mark.
fn crosses_warning(before: u64, now: u64) -> bool {
    WARN_AT.iter().any(|&mark| before > mark && now <= mark)
}

/// Console progress reporter.
struct ConsoleObserver {
    timer_visible: AtomicBool,
    last_remaining: AtomicU64,
}

impl ConsoleObserver {
    fn new() -> Self {
        Self {
            timer_visible: AtomicBool::new(true),
            last_remaining: AtomicU64::new(u64::MAX),
        }
    }
}

impl ExamObserver for ConsoleObserver {
    fn on_tick(&self, remaining_secs: u64) {
        let before = self.last_remaining.swap(remaining_secs, Ordering::Relaxed);
        if self.timer_visible.load(Ordering::Relaxed) && crosses_warning(before, remaining_secs) {
            eprintln!("  [{} left]", format_clock(remaining_secs));
        }
    }

    fn on_expired(&self) {
        eprintln!("\nTime is up. Submitting your answers...");
    }

    fn on_autosave(&self, _answers: usize) {}

    fn on_autosave_failed(&self, _error: &ApiError) {
        // Best effort; the engine already logged it.
    }

    fn on_submitted(&self, _result: &ExamResult, auto: bool) {
        if auto {
            eprintln!("Submitted automatically.");
        }
    }

    fn on_submit_failed(&self, error: &ExamError) {
        match error {
            ExamError::Api(e) => eprintln!("Submission failed: {}", e.user_message()),
            other => eprintln!("Submission failed: {other}"),
        }
    }
}

/// One line of student input.
#[derive(Debug, PartialEq)]
enum Input {
    Answer(usize, String),
    Clear(usize),
    Flag(usize),
    Next,
    Previous,
    Goto(usize),
    NextFlagged,
    List,
    Timer,
    Status,
    Submit,
    Help,
    Quit,
}

const HELP: &str = "\
Commands:
  a <n> <answer>  answer question n (option letter/number, true/false, or text)
  c <n>           clear the answer of question n
  f <n>           flag/unflag question n for review
  n | p | g <n>   next, previous, go to question n
  nf              jump to the next flagged question
  l               list questions with their state
  t               show/hide the timer
  st              show progress
  s               submit
  q               quit without submitting
  h               show this help";

fn parse_input(line: &str) -> Result<Input, String> {
    let line = line.trim();
    let (cmd, rest) = line
        .split_once(char::is_whitespace)
        .map(|(c, r)| (c, r.trim()))
        .unwrap_or((line, ""));

    let number = |s: &str| -> Result<usize, String> {
        let n = s
            .split_whitespace()
            .next()
            .ok_or_else(|| "missing question number".to_string())?;
        match n.parse::<usize>() {
            Ok(n) if n >= 1 => Ok(n),
            _ => Err(format!("invalid question number: {n}")),
        }
    };

    match cmd.to_lowercase().as_str() {
        "a" | "answer" => {
            let (n, value) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| "usage: a <n> <answer>".to_string())?;
            Ok(Input::Answer(number(n)?, value.trim().to_string()))
        }
        "c" | "clear" => Ok(Input::Clear(number(rest)?)),
        "f" | "flag" => Ok(Input::Flag(number(rest)?)),
        "n" | "next" => Ok(Input::Next),
        "p" | "prev" => Ok(Input::Previous),
        "g" | "goto" => Ok(Input::Goto(number(rest)?)),
        "nf" => Ok(Input::NextFlagged),
        "l" | "list" => Ok(Input::List),
        "t" | "timer" => Ok(Input::Timer),
        "st" | "status" => Ok(Input::Status),
        "s" | "submit" => Ok(Input::Submit),
        "h" | "help" | "?" => Ok(Input::Help),
        "q" | "quit" => Ok(Input::Quit),
        "" => Err(String::new()),
        other => Err(format!("unknown command '{other}', type h for help")),
    }
}

/// Interpret raw input as an answer to `question`.
fn resolve_answer(question: &Question, raw: &str) -> Result<AnswerValue, String> {
    if !question.question_type.is_choice() {
        return Ok(AnswerValue::Text(raw.to_string()));
    }

    let raw = raw.trim();
    let by_letter = (raw.len() == 1)
        .then(|| raw.chars().next())
        .flatten()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| (c.to_ascii_uppercase() as u8 - b'A') as usize);
    let by_number = raw.parse::<usize>().ok().and_then(|n| n.checked_sub(1));
    let by_text = question
        .options
        .iter()
        .position(|o| o.text.eq_ignore_ascii_case(raw));

    by_text
        .or(by_letter)
        .or(by_number)
        .and_then(|i| question.options.get(i))
        .map(|o| AnswerValue::Choice(o.id))
        .ok_or_else(|| format!("'{raw}' is not one of the options"))
}

fn print_question(state: &ExamState) {
    let Some(q) = state.current_question() else {
        return;
    };
    let index = state.current_index();
    let flag = if state.is_flagged(q.id) { " [flagged]" } else { "" };
    println!(
        "\nQuestion {}/{} ({}, {} pts){flag}",
        index + 1,
        state.questions().len(),
        q.question_type,
        q.points
    );
    println!("  {}", q.text);
    for (i, o) in q.options.iter().enumerate() {
        let marker = match state.answer(q.id) {
            Some(AnswerValue::Choice(id)) if *id == o.id => "*",
            _ => " ",
        };
        println!("   {marker}{}) {}", option_letter(i), o.text);
    }
    if let Some(AnswerValue::Text(text)) = state.answer(q.id) {
        println!("  Your answer: {text}");
    }
}

fn print_list(state: &ExamState) {
    for (i, q) in state.questions().iter().enumerate() {
        let answered = if state.answer(q.id).is_some() { "x" } else { " " };
        let flag = if state.is_flagged(q.id) { "F" } else { " " };
        let cursor = if i == state.current_index() { ">" } else { " " };
        println!("{cursor}[{answered}]{flag} {:>2}. {}", i + 1, q.text);
    }
}

fn print_status(state: &ExamState) {
    let p = state.progress();
    let clock = if state.timer_visible() {
        format_clock(p.remaining_secs)
    } else {
        "hidden".to_string()
    };
    println!(
        "Answered {}/{}, flagged {}, time left {clock}",
        p.answered, p.total, p.flagged
    );
}

/// Read stdin on a plain thread. A read still pending when the attempt ends
/// does not keep the process alive.
fn spawn_input_reader() -> mpsc::Receiver<std::io::Result<String>> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

pub async fn execute(
    session_id: Option<i64>,
    save_result: Option<PathBuf>,
    demo: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let (api, session_id): (Arc<dyn ExamApi>, i64) = if demo {
        (Arc::new(MockExamApi::demo()), 1)
    } else {
        let id = session_id.context("--session is required")?;
        (create_api(&config.api)?, id)
    };

    let session = api.session(session_id).await.map_err(api_error)?;
    let participation = api.participation(session_id).await.map_err(api_error)?;
    if participation.completed {
        anyhow::bail!("you have already completed session {session_id}");
    }
    let questions = api.questions(session_id).await.map_err(api_error)?;
    let state = ExamState::open(session.clone(), questions)?;
    tracing::info!(session_id, demo, "starting exam attempt");

    println!(
        "{}: {} questions, {} to finish.",
        session.title,
        state.questions().len(),
        format_clock(state.remaining_secs())
    );
    println!("Answers are saved automatically. Type h for help.");
    print_question(&state);

    let observer = Arc::new(ConsoleObserver::new());
    let handle = ExamEngine::start(api, state, config.engine_config(), observer.clone());

    let mut lines = spawn_input_reader();
    let mut confirming = false;

    loop {
        let line = tokio::select! {
            _ = handle.closed() => break,
            line = lines.recv() => line,
        };
        let Some(line) = line else { break };
        let line = line.context("failed to read input")?;

        if confirming {
            confirming = false;
            if line.trim().eq_ignore_ascii_case("y") {
                match handle.submit().await {
                    Ok(_) => break,
                    // Reported by the observer; the attempt stays open.
                    Err(ExamError::Api(_)) => continue,
                    Err(e) => {
                        println!("{e}");
                        if handle.is_finished() {
                            break;
                        }
                        continue;
                    }
                }
            }
            println!("Not submitted.");
            continue;
        }

        let input = match parse_input(&line) {
            Ok(input) => input,
            Err(msg) => {
                if !msg.is_empty() {
                    println!("{msg}");
                }
                continue;
            }
        };

        if let Err(msg) = apply(&handle, &observer, input, &mut confirming).await {
            match msg {
                Step::Quit => break,
                Step::Message(m) => println!("{m}"),
            }
        }
    }

    let state = handle.stop().await?;
    tracing::debug!(phase = ?state.phase(), "exam engine stopped");
    match state.phase() {
        ExamPhase::Submitted(result) => {
            let summary = ResultSummary::new(&session, result.clone(), state.auto_submitted());
            println!();
            print_summary(&summary);
            if let Some(path) = save_result {
                summary.save_json(&path)?;
                println!("Result saved to: {}", path.display());
            }
        }
        ExamPhase::Blocked => {
            anyhow::bail!("you have already completed session {session_id}");
        }
        ExamPhase::InProgress | ExamPhase::Submitting { .. } => {
            let p = state.progress();
            println!(
                "Exited without submitting ({}/{} answered).",
                p.answered, p.total
            );
        }
    }

    Ok(())
}

enum Step {
    Quit,
    Message(String),
}

impl From<ExamError> for Step {
    fn from(e: ExamError) -> Self {
        Step::Message(e.to_string())
    }
}

/// Question id for a 1-based question number.
async fn question_at(handle: &ExamHandle, n: usize) -> Result<(ExamState, Question), Step> {
    let state = handle.snapshot().await?;
    let question = state
        .questions()
        .get(n - 1)
        .cloned()
        .ok_or_else(|| Step::Message(format!("there is no question {n}")))?;
    Ok((state, question))
}

async fn navigate(handle: &ExamHandle, to: Navigation) -> Result<(), Step> {
    if handle.navigate(to).await?.is_none() {
        let msg = match to {
            Navigation::NextFlagged => "no flagged questions",
            _ => "cannot move there",
        };
        return Err(Step::Message(msg.into()));
    }
    print_question(&handle.snapshot().await?);
    Ok(())
}

async fn apply(
    handle: &ExamHandle,
    observer: &ConsoleObserver,
    input: Input,
    confirming: &mut bool,
) -> Result<(), Step> {
    match input {
        Input::Answer(n, raw) => {
            let (_, question) = question_at(handle, n).await?;
            let value = resolve_answer(&question, &raw).map_err(Step::Message)?;
            handle.answer(question.id, value).await?;
            println!("Saved answer for question {n}.");
        }
        Input::Clear(n) => {
            let (_, question) = question_at(handle, n).await?;
            handle.clear(question.id).await?;
            println!("Cleared question {n}.");
        }
        Input::Flag(n) => {
            let (_, question) = question_at(handle, n).await?;
            let flagged = handle.toggle_flag(question.id).await?;
            println!(
                "Question {n} {}.",
                if flagged { "flagged" } else { "unflagged" }
            );
        }
        Input::Next => navigate(handle, Navigation::Next).await?,
        Input::Previous => navigate(handle, Navigation::Previous).await?,
        Input::Goto(n) => navigate(handle, Navigation::Index(n - 1)).await?,
        Input::NextFlagged => navigate(handle, Navigation::NextFlagged).await?,
        Input::List => print_list(&handle.snapshot().await?),
        Input::Timer => {
            let visible = handle.toggle_timer().await?;
            observer.timer_visible.store(visible, Ordering::Relaxed);
            println!("Timer {}.", if visible { "shown" } else { "hidden" });
        }
        Input::Status => print_status(&handle.snapshot().await?),
        Input::Submit => {
            let state = handle.snapshot().await?;
            let p = state.progress();
            if p.answered < p.total {
                println!("{} question(s) unanswered.", p.total - p.answered);
            }
            println!("Submit now? [y/N]");
            *confirming = true;
        }
        Input::Help => println!("{HELP}"),
        Input::Quit => return Err(Step::Quit),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quizdesk_core::model::{QuestionOption, QuestionType};

    fn choice_question() -> Question {
        Question {
            id: 1,
            question_type: QuestionType::TrueFalse,
            text: "Rust has null.".into(),
            points: 1.0,
            options: vec![
                QuestionOption {
                    id: 10,
                    text: "True".into(),
                },
                QuestionOption {
                    id: 11,
                    text: "False".into(),
                },
            ],
            order: None,
        }
    }

    #[test]
    fn parses_commands() {
        assert_eq!(
            parse_input("a 2 the borrow checker"),
            Ok(Input::Answer(2, "the borrow checker".into()))
        );
        assert_eq!(parse_input("  f 3 "), Ok(Input::Flag(3)));
        assert_eq!(parse_input("G 1"), Ok(Input::Goto(1)));
        assert_eq!(parse_input("s"), Ok(Input::Submit));
        assert_eq!(parse_input("nf"), Ok(Input::NextFlagged));
        assert!(parse_input("a 2").is_err());
        assert!(parse_input("f 0").is_err());
        assert!(parse_input("x").is_err());
        assert_eq!(parse_input(""), Err(String::new()));
    }

    #[test]
    fn resolves_choice_answers() {
        let q = choice_question();
        assert_eq!(resolve_answer(&q, "b"), Ok(AnswerValue::Choice(11)));
        assert_eq!(resolve_answer(&q, "1"), Ok(AnswerValue::Choice(10)));
        assert_eq!(resolve_answer(&q, "false"), Ok(AnswerValue::Choice(11)));
        assert!(resolve_answer(&q, "c").is_err());
        assert!(resolve_answer(&q, "maybe").is_err());
    }

    #[test]
    fn warnings_fire_on_crossing_a_mark() {
        // A five minute attempt ticks 300 -> 299 first.
        assert!(crosses_warning(u64::MAX, 299));
        assert!(crosses_warning(61, 59));
        assert!(crosses_warning(11, 10));
        assert!(!crosses_warning(10, 9));
        assert!(!crosses_warning(u64::MAX, 3599));
        assert!(!crosses_warning(45, 44));
    }

    #[test]
    fn text_answers_pass_through() {
        let mut q = choice_question();
        q.question_type = QuestionType::FillBlank;
        q.options.clear();
        assert_eq!(
            resolve_answer(&q, "Display"),
            Ok(AnswerValue::Text("Display".into()))
        );
    }
}
