use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{debug, info};

mod bunk;
mod config;
mod error;
mod input;
mod logging;
mod models;
mod report;

use config::{Fraction, Policy};

#[derive(Parser)]
#[command(name = "bunk-advisor")]
#[command(about = "Attendance analyzer that tells you how many classes you can skip", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    analyze: AnalyzeArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the attendance analysis (the default when no subcommand is given)
    Analyze(AnalyzeArgs),
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        policy: PolicyArgs,
        /// Remaining classes per subject to project over
        #[arg(long)]
        remaining: Option<u64>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Convert a CSV of subject,held,attended rows into an attendance data file
    Import {
        #[arg(long)]
        csv: PathBuf,
        /// Defaults to a timestamped attendance_YYYYMMDD_HHMMSS.json
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Write a sample attendance data file
    Seed {
        #[arg(long, default_value = config::DEFAULT_INPUT)]
        out: PathBuf,
    },
}

#[derive(Args, Clone)]
struct SourceArgs {
    /// Attendance data file; defaults to attendance.json or the newest snapshot
    #[arg(long, env = "BUNK_INPUT")]
    input: Option<PathBuf>,
    /// Skip malformed or invalid subjects with a warning instead of aborting
    #[arg(long)]
    skip_invalid: bool,
}

#[derive(Args, Clone)]
struct PolicyArgs {
    /// Minimum attendance, as a fraction (0.75) or percentage (75%)
    #[arg(long, env = "BUNK_THRESHOLD", default_value = config::DEFAULT_THRESHOLD)]
    threshold: Fraction,
    /// Display-only safe-zone boundary; defaults to threshold + 1%
    #[arg(long, env = "BUNK_SAFE_ZONE")]
    safe_zone: Option<Fraction>,
}

impl PolicyArgs {
    fn policy(&self) -> anyhow::Result<Policy> {
        Ok(Policy::new(self.threshold, self.safe_zone)?)
    }
}

#[derive(Args, Clone)]
struct AnalyzeArgs {
    #[command(flatten)]
    source: SourceArgs,
    #[command(flatten)]
    policy: PolicyArgs,
    /// Remaining classes per subject to project over
    #[arg(long)]
    remaining: Option<u64>,
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> anyhow::Result<()> {
    logging::init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Analyze(cli.analyze)) {
        Commands::Analyze(args) => {
            let policy = args.policy.policy()?;
            let (analyses, data) = run_analysis(&args.source, &policy, args.remaining)?;
            let rendered = match args.format {
                Format::Text => report::render_text(&analyses, &policy, &data.info, args.remaining),
                Format::Json => report::render_json(&analyses, &policy, &data.info)?,
            };
            print!("{rendered}");
        }
        Commands::Report {
            source,
            policy,
            remaining,
            out,
        } => {
            let policy = policy.policy()?;
            let (analyses, data) = run_analysis(&source, &policy, remaining)?;
            let markdown = report::render_markdown(&analyses, &policy, &data.info, remaining);
            std::fs::write(&out, markdown)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Import { csv, out } => {
            let now = chrono::Local::now();
            let out = out.unwrap_or_else(|| PathBuf::from(input::snapshot_name(&now)));
            let imported = input::import_csv(&csv, &out, &now)?;
            println!(
                "Imported {imported} subjects from {} into {}.",
                csv.display(),
                out.display()
            );
        }
        Commands::Seed { out } => {
            let written = input::seed(&out, &chrono::Local::now())?;
            println!("Sample data with {written} subjects written to {}.", out.display());
        }
    }

    Ok(())
}

fn run_analysis(
    source: &SourceArgs,
    policy: &Policy,
    remaining: Option<u64>,
) -> anyhow::Result<(Vec<models::Analysis>, models::AttendanceData)> {
    debug!(
        threshold = %policy.threshold(),
        safe_zone = %policy.safe_zone(),
        "policy configured"
    );
    let path = input::resolve_input(source.input.as_deref(), Path::new("."))?;
    let data = input::load(&path, source.skip_invalid)
        .with_context(|| format!("could not use {}", path.display()))?;
    let analyses = bunk::analyze_all(&data.records, policy, remaining)?;
    info!(subjects = analyses.len(), "analysis complete");
    Ok((analyses, data))
}
