//! gol Scenario CLI
//!
//! Run deterministic lobby scenarios from the command line.

use anyhow::{bail, Context};
use clap::Parser;
use gol_core::LobbyConfig;
use gol_sim::scenarios::ScenarioId;
use gol_sim::{ScenarioResult, ScenarioRunner};
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// gol deterministic scenario CLI
#[derive(Parser, Debug)]
#[command(name = "gol-sim")]
#[command(about = "Run deterministic lobby scenarios for gol", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (glider, blinker, contested_birth, capacity_rush, churn, live_driver, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Generations per board scenario
    #[arg(short, long, default_value = "40")]
    generations: u64,

    /// Lobby config as JSON; missing fields take defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Print the final board of each run
    #[arg(long)]
    view: bool,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<LobbyConfig> {
    let Some(path) = path else {
        return Ok(LobbyConfig::default());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    LobbyConfig::from_json(&json).with_context(|| format!("parsing config {}", path.display()))
}

fn parse_scenarios(name: &str) -> anyhow::Result<Vec<ScenarioId>> {
    if name == "all" {
        return Ok(ScenarioId::all());
    }
    match name.parse::<ScenarioId>() {
        Ok(scenario) => Ok(vec![scenario]),
        Err(e) => {
            let known: Vec<_> = ScenarioId::all().iter().map(|s| s.name()).collect();
            bail!("{e} (available: {}, all)", known.join(", "))
        }
    }
}

fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let builder = FmtSubscriber::builder().with_max_level(level);

    // RUST_LOG wins over --verbose when set
    let installed = match EnvFilter::try_from_default_env() {
        Ok(filter) => tracing::subscriber::set_global_default(builder.with_env_filter(filter).finish()),
        Err(_) => tracing::subscriber::set_global_default(builder.finish()),
    };
    installed.context("installing tracing subscriber")
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    let config = load_config(args.config.as_ref())?;
    let scenarios = parse_scenarios(&args.scenario)?;

    if !args.json {
        info!("gol Scenario Runner v0.1.0");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        for scenario in &scenarios {
            info!("  {:<16} {}", scenario.name(), scenario.description());
        }
    }

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        args.seed
    };

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = ScenarioRunner::new(seed)
            .with_generations(args.generations)
            .with_config(config.clone())
            .with_view(args.view);

        for scenario in &scenarios {
            let result = runner.run(*scenario);

            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
                if let Some(view) = &result.final_view {
                    println!("{view}\n");
                }
            }
            all_results.push(result);
        }
    }

    let total = all_results.len();
    let failed = all_results.iter().filter(|r| !r.passed).count();

    if args.json {
        // JSON output for CI parsing
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed,
            "failed": failed,
            "results": all_results,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed, total);
            for result in all_results.iter().filter(|r| !r.passed) {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    // Exit with proper code for CI
    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
