//! The `quizdesk join` command.

use std::path::PathBuf;

use anyhow::Result;

use quizdesk_client::{create_api, load_config_from};

use super::api_error;

pub async fn execute(code: String, config_path: Option<PathBuf>) -> Result<()> {
    let code = code.trim().to_uppercase();
    anyhow::ensure!(!code.is_empty(), "join code must not be empty");

    let config = load_config_from(config_path.as_deref())?;
    let api = create_api(&config.api)?;

    let session = api.join(&code).await.map_err(api_error)?;

    println!("Joined session {}: {}", session.id, session.title);
    if let Some(quiz) = &session.quiz_title {
        println!("  Quiz:     {quiz}");
    }
    println!("  Starts:   {}", session.start_time.format("%Y-%m-%d %H:%M UTC"));
    println!("  Duration: {} min", session.duration_minutes);
    println!("  Status:   {}", session.status);
    if session.status.accepts_answers() {
        println!("\nStart with: quizdesk take --session {}", session.id);
    }

    Ok(())
}
