//! Thin CLI wrapper sufficient to invoke `run_loop` from a shell for manual
//! testing. Not a polished CLI — CLI entry points are out of scope per the
//! spec; this exists only so the orchestration engine is reachable without
//! writing a harness.

use std::path::PathBuf;

use clap::Parser;
use geminiloop_engine::config::EngineConfig;
use geminiloop_engine::orchestrator::run_loop;

#[derive(Parser, Debug)]
#[command(name = "geminiloop", about = "Closed-loop autonomous web-UI generation")]
struct Cli {
    /// Natural-language task describing the web UI to build.
    task: String,

    /// Directory the run's workspace, artifacts, and site are created under.
    #[arg(long, default_value = ".")]
    base_dir: PathBuf,

    /// Upper bound on generate/evaluate iterations, clamped to the engine ceiling.
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Skip the planner and use these notes verbatim as the implementation brief.
    #[arg(long)]
    notes: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env();

    let result = run_loop(
        &config,
        &cli.task,
        cli.max_iterations,
        cli.base_dir,
        cli.notes.as_deref(),
    )
    .await;

    println!("{}", serde_json::to_string_pretty(&result).unwrap_or_default());

    if !result.final_passed && result.error_message.is_some() {
        std::process::exit(1);
    }
}
