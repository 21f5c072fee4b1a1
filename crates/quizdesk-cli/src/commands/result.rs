//! The `quizdesk result` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use quizdesk_client::{create_api, load_config_from};
use quizdesk_core::exam::format_clock;
use quizdesk_core::report::ResultSummary;

use super::api_error;

pub async fn execute(
    session_id: Option<i64>,
    file: Option<PathBuf>,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    anyhow::ensure!(
        matches!(format.as_str(), "table" | "json"),
        "unknown format '{format}', expected table or json"
    );

    let summary = match (file, session_id) {
        (Some(path), _) => ResultSummary::load_json(&path)?,
        (None, Some(id)) => {
            let config = load_config_from(config_path.as_deref())?;
            let api = create_api(&config.api)?;
            let session = api.session(id).await.map_err(api_error)?;
            let result = api.result(id).await.map_err(api_error)?;
            ResultSummary::new(&session, result, false)
        }
        (None, None) => anyhow::bail!("either --session or --file is required"),
    };

    if format == "json" {
        let json = serde_json::to_string_pretty(&summary).context("failed to serialize result")?;
        println!("{json}");
    } else {
        print_summary(&summary);
    }

    Ok(())
}

pub(crate) fn print_summary(summary: &ResultSummary) {
    let result = &summary.result;

    let mut table = Table::new();
    table.set_header(vec!["Session", "Score", "Percentage", "Grade", "Time", "Passed"]);
    table.add_row(vec![
        Cell::new(&summary.session_title),
        Cell::new(format!("{} / {}", result.score, result.max_score)),
        Cell::new(format!("{:.1}%", result.percentage)),
        Cell::new(summary.grade_label()),
        Cell::new(format_clock(result.time_spent_seconds)),
        Cell::new(match result.passed {
            Some(true) => "yes",
            Some(false) => "no",
            None => "-",
        }),
    ]);
    println!("{table}");

    if summary.auto_submitted {
        println!("Submitted automatically when time ran out.");
    }

    if !result.breakdown.is_empty() {
        let mut breakdown = Table::new();
        breakdown.set_header(vec!["Question", "Points", "Correct"]);
        for row in &result.breakdown {
            breakdown.add_row(vec![
                Cell::new(row.question_id),
                Cell::new(format!("{} / {}", row.points_awarded, row.max_points)),
                Cell::new(match row.is_correct {
                    Some(true) => "yes",
                    Some(false) => "no",
                    None => "pending review",
                }),
            ]);
        }
        println!("{breakdown}");

        let missed = summary.missed_questions().len();
        if missed > 0 {
            println!("{missed} question(s) without full marks.");
        }
    }
}
