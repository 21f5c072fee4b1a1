//! The `quizdesk questions` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use quizdesk_client::{create_api, load_config_from};
use quizdesk_core::model::Question;

use super::api_error;

pub async fn execute(session_id: i64, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let api = create_api(&config.api)?;

    let session = api.session(session_id).await.map_err(api_error)?;
    let questions = api.questions(session_id).await.map_err(api_error)?;

    println!(
        "{} ({} questions, {} min, {})",
        session.title,
        questions.len(),
        session.duration_minutes,
        session.status
    );
    println!("{}", question_table(&questions));

    Ok(())
}

pub(crate) fn question_table(questions: &[Question]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["#", "Type", "Points", "Question", "Options"]);

    for (i, q) in questions.iter().enumerate() {
        let options = q
            .options
            .iter()
            .enumerate()
            .map(|(j, o)| format!("{}) {}", option_letter(j), o.text))
            .collect::<Vec<_>>()
            .join("\n");
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(q.question_type),
            Cell::new(q.points),
            Cell::new(&q.text),
            Cell::new(options),
        ]);
    }

    table
}

/// `0 -> 'A'`, `1 -> 'B'`, ...
pub(crate) fn option_letter(index: usize) -> char {
    (b'A' + (index % 26) as u8) as char
}
