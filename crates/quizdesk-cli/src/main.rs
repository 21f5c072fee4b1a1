//! quizdesk CLI: take timed exams from the terminal.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "quizdesk", version, about = "Timed exam client for the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Take a timed exam
    Take {
        /// Session id
        #[arg(long, required_unless_present = "demo")]
        session: Option<i64>,

        /// Write the result summary as JSON to this path
        #[arg(long)]
        save_result: Option<PathBuf>,

        /// Use a built-in demo session instead of the server
        #[arg(long)]
        demo: bool,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Join a session with its join code
    Join {
        /// Join code shown by the session host
        #[arg(long)]
        code: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List the questions of a session
    Questions {
        /// Session id
        #[arg(long)]
        session: i64,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show the result of a submitted exam
    Result {
        /// Fetch the result of this session from the server
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        session: Option<i64>,

        /// Read a result saved with `take --save-result`
        #[arg(long)]
        file: Option<PathBuf>,

        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create a starter config file
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("quizdesk=info,warn")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Take {
            session,
            save_result,
            demo,
            config,
        } => commands::take::execute(session, save_result, demo, config).await,
        Commands::Join { code, config } => commands::join::execute(code, config).await,
        Commands::Questions { session, config } => {
            commands::questions::execute(session, config).await
        }
        Commands::Result {
            session,
            file,
            format,
            config,
        } => commands::result::execute(session, file, format, config).await,
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
