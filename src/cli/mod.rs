// src/cli/mod.rs — CLI definition (clap derive)

pub mod check;
pub mod progress;
pub mod status;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "lessongate",
    about = "Batch quality gate for generated lesson scripts",
    version
)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Quality-check every lesson, auto-fixing what can be fixed
    Check {
        /// Spending cap for this run in USD (0.01-100)
        #[arg(long, value_parser = parse_budget)]
        budget: Option<f64>,
        /// Force manual review of every Nth lesson
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        sample_rate: Option<u64>,
        /// Resume from this lesson id
        #[arg(long)]
        start_from: Option<String>,
        /// Simulate costs and sampling without calling the evaluator
        #[arg(long)]
        dry_run: bool,
        /// Evaluate/fix rounds per lesson
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=10))]
        max_rounds: Option<u8>,
        /// Consecutive evaluator failures before halting
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        breaker_threshold: Option<u32>,
        #[arg(long)]
        lessons_dir: Option<String>,
        #[arg(long)]
        reports_dir: Option<String>,
        /// Suppress progress output (only print the summary)
        #[arg(long)]
        quiet: bool,
    },
    /// Show review progress across the lessons and reports directories
    Status {
        /// List every lesson with its verdict
        #[arg(long)]
        detailed: bool,
        #[arg(long)]
        lessons_dir: Option<String>,
        #[arg(long)]
        reports_dir: Option<String>,
    },
}

fn parse_budget(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a number"))?;
    if !(0.01..=100.0).contains(&value) {
        return Err(format!("budget must be between 0.01 and 100, got {value}"));
    }
    Ok(value)
}
