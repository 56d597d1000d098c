mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cascade-cli")]
#[command(about = "Cascade CLI - Run code through the backend chain and inspect failures", long_about = None)]
struct Cli {
    /// Backend config file (defaults to CASCADE_CONFIG or config/backends.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print raw JSON instead of a summary
    #[arg(long, global = true, default_value = "false")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a source file once
    Run {
        /// Language id (e.g., python, c, java)
        #[arg(short, long)]
        language: String,

        /// Source file
        #[arg(short, long)]
        file: PathBuf,

        /// Text passed on stdin
        #[arg(short, long)]
        stdin: Option<String>,
    },

    /// Run a source file against a JSON list of test cases
    Test {
        /// Language id
        #[arg(short, long)]
        language: String,

        /// Source file
        #[arg(short, long)]
        file: PathBuf,

        /// JSON file: [{"stdin": "...", "expected_output": "...", "is_hidden": false}]
        #[arg(short, long)]
        tests: PathBuf,
    },

    /// List configured backends and their languages
    Languages,

    /// Show recent failure reports from Redis
    Failures {
        /// Language id
        #[arg(short, long)]
        language: String,

        /// Maximum number of reports
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            language,
            file,
            stdin,
        } => {
            commands::run(&config, &language, &file, stdin, cli.json).await?;
        }
        Commands::Test {
            language,
            file,
            tests,
        } => {
            commands::test(&config, &language, &file, &tests, cli.json).await?;
        }
        Commands::Languages => {
            commands::languages(&config, cli.json)?;
        }
        Commands::Failures { language, limit } => {
            commands::failures(&language, limit, cli.json).await?;
        }
    }

    Ok(())
}
