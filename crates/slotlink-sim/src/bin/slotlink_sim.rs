//! # slotlink-sim
//!
//! Runs the slot scheduler against a simulated downlink and prints a JSON
//! report on stdout. Logs go to stderr.
//!
//! ## Usage
//!
//! ```bash
//! # Built-in demo: 3 users, proportional fair
//! slotlink-sim
//!
//! # Scenario file, overriding the rule and horizon
//! slotlink-sim --config scenarios/outages.toml --rule max_weight --duration 30
//!
//! # More detail
//! RUST_LOG=slotlink_core=debug slotlink-sim --users 2 --duration 0.1 --pretty
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use slotlink_core::config::SelectionRule;
use slotlink_sim::{ScenarioConfig, Simulation};

/// Discrete-event simulation of a time-slotted link scheduler.
#[derive(Parser, Debug)]
#[command(name = "slotlink-sim", about = "Simulate a PF / max-weight slot scheduler")]
struct Cli {
    /// Scenario TOML. Without it a built-in demo scenario is used.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of users in the built-in demo scenario.
    #[arg(long, default_value_t = 3)]
    users: usize,

    /// Simulated seconds to run, overriding the scenario.
    #[arg(long)]
    duration: Option<f64>,

    /// RNG seed, overriding the scenario.
    #[arg(long)]
    seed: Option<u64>,

    /// Selection rule (`proportional_fair` or `max_weight`), overriding the
    /// scenario.
    #[arg(long)]
    rule: Option<SelectionRule>,

    /// Pretty-print the JSON report.
    #[arg(long, default_value_t = false)]
    pretty: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact()
        .init();

    slotlink_core::init();
    let cli = Cli::parse();

    let mut scenario = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            ScenarioConfig::from_toml_str(&text)
                .with_context(|| format!("loading {}", path.display()))?
        }
        None => ScenarioConfig::demo(cli.users, SelectionRule::ProportionalFair),
    };
    if let Some(duration) = cli.duration {
        scenario.duration = duration;
    }
    if let Some(seed) = cli.seed {
        scenario.seed = seed;
    }
    if let Some(rule) = cli.rule {
        scenario.scheduler.selection_rule = Some(rule.as_str().to_string());
    }

    tracing::info!(
        config = ?cli.config,
        users = scenario.users.len(),
        duration = scenario.duration,
        seed = scenario.seed,
        "slotlink-sim starting"
    );

    let mut sim = Simulation::new(&scenario)?;
    let report = sim.run(scenario.duration);
    sim.shutdown();

    if report.reassembly_errors() > 0 {
        tracing::error!(errors = report.reassembly_errors(), "receivers saw out-of-order or corrupt data");
    }
    println!("{}", report.to_json(cli.pretty)?);
    Ok(())
}
