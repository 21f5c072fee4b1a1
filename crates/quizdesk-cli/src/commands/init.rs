//! The `quizdesk init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    if std::path::Path::new("quizdesk.toml").exists() {
        println!("quizdesk.toml already exists, skipping.");
    } else {
        std::fs::write("quizdesk.toml", SAMPLE_CONFIG)?;
        println!("Created quizdesk.toml");
    }

    println!("\nNext steps:");
    println!("  1. Set base_url in quizdesk.toml and export QUIZDESK_TOKEN");
    println!("  2. Run: quizdesk join --code <CODE>");
    println!("  3. Run: quizdesk take --session <ID>");
    println!("\nTry it offline with: quizdesk take --demo");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# quizdesk configuration

[api]
base_url = "http://localhost:8000/api"
token = "${QUIZDESK_TOKEN}"
timeout_secs = 30

[exam]
autosave_interval_secs = 30
tick_interval_ms = 1000
max_submit_retries = 2
retry_delay_ms = 1000
"#;
