//! Ember Run - compile a script (or load a scenario asset) and drive it.
//!
//! Runs `run_init(seed)` followed by a fixed number of ticks, printing
//! diagnostic events as they happen.

use clap::Parser;
use ember_ast::Severity;
use ember_runtime::{Runtime, RuntimeConfig, ScenarioAsset};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "ember-run")]
#[command(about = "Run an Ember script or scenario asset")]
struct Cli {
    /// Path to an .ember source file or a .json scenario asset
    scenario: PathBuf,

    /// Seed passed to runInit
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Number of ticks to run after init
    #[arg(long, default_value = "60")]
    ticks: u64,

    /// Simulated seconds per tick
    #[arg(long, default_value = "0.016")]
    dt: f64,

    /// Capability to grant, on top of the baseline (repeatable)
    #[arg(long = "grant")]
    grants: Vec<String>,

    /// Instruction budget per entry call
    #[arg(long)]
    budget: Option<u64>,

    /// Compile the script and write it out as a scenario asset instead of running
    #[arg(long)]
    emit_asset: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ember_run=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    if let Err(message) = run(cli) {
        error!("{message}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let (config, name) = load(&cli)?;
    if cli.emit_asset.is_some() {
        // Asset already written by load().
        return Ok(());
    }

    let config = config.grant_all(cli.grants.iter().cloned()).sink(Box::new(|event| {
        println!(
            "[{:?}] tick {} {}{}",
            event.kind,
            event.tick,
            event
                .native
                .as_deref()
                .map(|n| format!("({n}) "))
                .unwrap_or_default(),
            event.message
        );
    }));
    let config = match cli.budget {
        Some(budget) => config.budget(budget),
        None => config,
    };

    let mut runtime = Runtime::new(config).map_err(|e| e.to_string())?;
    info!("running '{name}' with seed {}", cli.seed);

    if let Err(err) = runtime.run_init(cli.seed) {
        return Err(format!("runInit failed: {err}"));
    }
    for frame in 0..cli.ticks {
        if let Err(err) = runtime.tick(frame, cli.dt) {
            return Err(format!("tick {frame} failed: {err}"));
        }
        for task in runtime.take_due_tasks(frame) {
            info!("due task at tick {frame}: {}", task.task);
        }
    }

    let status = runtime.status();
    if status.healthy {
        info!("finished: healthy after {} tick(s)", cli.ticks);
    } else if let Some(err) = &status.last_error {
        info!("finished: unhealthy, last error: {err}");
    }
    Ok(())
}

fn load(cli: &Cli) -> Result<(RuntimeConfig, String), String> {
    let is_asset = cli
        .scenario
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_asset {
        let json = std::fs::read_to_string(&cli.scenario)
            .map_err(|e| format!("cannot read {}: {e}", cli.scenario.display()))?;
        let asset = ScenarioAsset::from_json(&json).map_err(|e| e.to_string())?;
        let name = asset.name.clone();
        let config = RuntimeConfig::for_asset(&asset).map_err(|e| e.to_string())?;
        return Ok((config, name));
    }

    let source = std::fs::read_to_string(&cli.scenario)
        .map_err(|e| format!("cannot read {}: {e}", cli.scenario.display()))?;
    let (program, diagnostics) = ember_compiler::compile_source(&source);
    for diagnostic in &diagnostics {
        match diagnostic.severity {
            Severity::Error => error!("{diagnostic}"),
            Severity::Warning => tracing::warn!("{diagnostic}"),
        }
    }
    if ember_ast::has_errors(&diagnostics) {
        return Err("compilation failed".to_string());
    }

    let name = cli
        .scenario
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "scenario".to_string());

    if let Some(path) = &cli.emit_asset {
        let asset = ScenarioAsset::new(name.clone(), &program);
        let json = asset.to_json().map_err(|e| e.to_string())?;
        std::fs::write(path, json).map_err(|e| format!("cannot write {}: {e}", path.display()))?;
        info!("wrote scenario asset to {}", path.display());
    }

    Ok((RuntimeConfig::new(program), name))
}
