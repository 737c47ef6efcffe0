//! entail - automated deductive inference engine
//!
//! Command-line interface: prove a goal against a premise file.

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context as AnyhowContext, Result};
use clap::Parser;

use entail::{
    parse_term, Context, EngineConfig, ModalSystem, Outcome, ResolutionPolicy,
};

#[derive(Parser)]
#[command(name = "entail")]
#[command(version = "0.1.0")]
#[command(about = "Multi-strategy deductive inference engine", long_about = None)]
struct Cli {
    /// Goal formula, e.g. "CanGoTo(john,home)"
    #[arg(value_name = "GOAL")]
    goal: String,

    /// Premise file, one formula per line ('#' starts a comment)
    #[arg(short, long, value_name = "FILE")]
    context: Vec<PathBuf>,

    /// Read additional premises from stdin
    #[arg(long)]
    stdin: bool,

    /// Configuration file (defaults to the standard search path)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Modal system for the tableau prover
    #[arg(long, value_name = "SYSTEM")]
    modal_system: Option<String>,

    /// Resolution policy: unit-preference or set-of-support
    #[arg(long, value_name = "POLICY")]
    policy: Option<String>,

    /// Wall-clock deadline in milliseconds (0 disables)
    #[arg(long, value_name = "MS")]
    deadline_ms: Option<u64>,

    /// Race applicable strategies on worker threads
    #[arg(long)]
    concurrent: bool,

    /// Print the proof object as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Progress output on stderr
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::load().context("failed to load configuration")?,
    };

    if let Some(system) = &cli.modal_system {
        config.tableau.modal_system = ModalSystem::parse(system)?;
    }
    if let Some(policy) = &cli.policy {
        config.resolution.policy = match policy.as_str() {
            "unit-preference" => ResolutionPolicy::UnitPreference,
            "set-of-support" => ResolutionPolicy::SetOfSupport,
            other => anyhow::bail!("unknown resolution policy '{}'", other),
        };
    }
    if let Some(ms) = cli.deadline_ms {
        config.budget.deadline_ms = ms;
    }
    if cli.concurrent {
        config.coordinator.concurrent = true;
    }
    if cli.verbose {
        config.coordinator.verbose = true;
    }

    let mut premises = String::new();
    for path in &cli.context {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read premise file {}", path.display()))?;
        premises.push_str(&content);
        premises.push('\n');
    }
    if cli.stdin {
        io::stdin()
            .read_to_string(&mut premises)
            .context("failed to read premises from stdin")?;
    }

    let context = Context::parse(&premises).context("failed to parse premises")?;
    let goal = parse_term(&cli.goal).context("failed to parse goal")?;

    let mut coordinator = config.build_coordinator();
    let proof = coordinator.submit_goal(&goal, &context)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&proof)?);
    } else {
        print!("{}", proof.render());
    }

    Ok(match proof.outcome {
        Outcome::Proved => ExitCode::SUCCESS,
        Outcome::Disproved => ExitCode::from(1),
        _ => ExitCode::from(2),
    })
}
