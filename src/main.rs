// src/main.rs — lessongate entry point

use clap::Parser;

use lessongate::cli::check::{run_check, CheckArgs};
use lessongate::cli::{Cli, Commands};
use lessongate::core::types::HaltReason;
use lessongate::infra::config::Config;
use lessongate::infra::logger;

/// Conventional exit status for a run stopped by SIGINT.
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() {
    // Initialize logging (respects RUST_LOG)
    logger::init_logging("warn");

    match run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    }
}

async fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();

    // Load config (falls back to defaults if no config.toml)
    let config = if let Some(ref path) = cli.config {
        Config::load_from(std::path::Path::new(path))?
    } else {
        Config::load()?
    };

    match cli.command {
        Commands::Check {
            budget,
            sample_rate,
            start_from,
            dry_run,
            max_rounds,
            breaker_threshold,
            lessons_dir,
            reports_dir,
            quiet,
        } => {
            let args = CheckArgs {
                budget,
                sample_rate: sample_rate.map(|n| n as usize),
                start_from,
                dry_run,
                max_rounds,
                breaker_threshold,
                lessons_dir,
                reports_dir,
                quiet,
            };
            let summary = run_check(config, args).await?;
            Ok(match summary.halt_reason {
                reason if reason.is_interrupt() => EXIT_INTERRUPTED,
                HaltReason::Storage => 1,
                _ => 0,
            })
        }
        Commands::Status {
            detailed,
            lessons_dir,
            reports_dir,
        } => {
            lessongate::cli::status::show_status(
                &config,
                detailed,
                lessons_dir.as_deref(),
                reports_dir.as_deref(),
            )
            .await?;
            Ok(0)
        }
    }
}
