use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use serde::Serialize;
use std::path::PathBuf;

use trackflow_lib::pipeline::{Plan, RunReport, StatusReport};
use trackflow_lib::runner::TrackOutcome;
use trackflow_lib::shutdown::register_signal_handlers;
use trackflow_lib::{manifest, ConfigLoader, EngineError, EventSink, Pipeline, ShutdownState};

/// Trackflow - dependency-ordered multi-track execution and merge coordination
#[derive(Parser, Debug)]
#[command(name = "trackflow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Manifest file (.json, .yaml, .yml or .toml)
    #[arg(
        short,
        long,
        global = true,
        env = "TRACKFLOW_MANIFEST",
        default_value = "trackflow.yaml"
    )]
    manifest: PathBuf,

    /// Config file applied on top of the global and project layers
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Ignore ~/.trackflow/config.yaml
    #[arg(long, global = true)]
    no_global_config: bool,

    /// Print reports as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Stream engine events as JSON lines on stderr
    #[arg(long, global = true)]
    events: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the execution and merge rounds
    Plan,
    /// Run or resume a single track, waiting for its dependencies
    Execute {
        /// Track id from the manifest
        track_id: String,
    },
    /// Execute every track, merge round by round and run the final gates
    Run {
        /// Remove track workspaces after a complete run
        #[arg(long)]
        cleanup: bool,
    },
    /// Merge the completed tracks and run the final gates
    Merge,
    /// Show markers, checkpoints and the latest merge run
    Status,
    /// Run the manifest's quality gates against the workspace root
    Gates,
}

fn main() {
    let cli = Cli::parse();

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            match e.downcast_ref::<EngineError>() {
                Some(engine_error) => {
                    if engine_error.is_recoverable() {
                        eprintln!("Nothing was recorded as failed; the same command can be run again");
                    }
                    engine_error.exit_code()
                }
                None => 1,
            }
        }
    };

    std::process::exit(code);
}

/// Starts at `info` unless RUST_LOG is set. Returns whether RUST_LOG was set.
fn init_logging() -> bool {
    let from_env = std::env::var_os("RUST_LOG").is_some();
    // Without RUST_LOG the logger passes everything and the max level filters
    let env = env_logger::Env::default().default_filter_or("trace");
    env_logger::Builder::from_env(env).init();
    if !from_env {
        log::set_max_level(LevelFilter::Info);
    }
    from_env
}

/// Apply the configured level; RUST_LOG wins over it
fn apply_config_level(level: Option<&str>, rust_log_set: bool) {
    let Some(level) = level else { return };
    if rust_log_set {
        return;
    }
    match level.parse::<LevelFilter>() {
        Ok(filter) => log::set_max_level(filter),
        Err(_) => log::warn!("Ignoring unknown log_level '{}'", level),
    }
}

fn run(cli: Cli) -> Result<i32> {
    let rust_log_set = init_logging();
    let manifest = manifest::load(&cli.manifest)?;

    let mut loader = ConfigLoader::new().with_workspace(&manifest.workspace_root);
    if cli.no_global_config {
        loader = loader.without_global();
    }
    let overrides = match &cli.config {
        Some(path) => Some(
            ConfigLoader::load_file(path)?
                .ok_or_else(|| anyhow!("Config file {:?} does not exist", path))?,
        ),
        None => None,
    };
    let config = loader.load(overrides)?;

    apply_config_level(config.log_level.as_deref(), rust_log_set);

    let shutdown = ShutdownState::new();
    if let Err(e) = register_signal_handlers(shutdown.clone()) {
        log::warn!("Failed to register signal handlers: {}", e);
    }

    let (events, receiver) = if cli.events {
        let (sink, rx) = EventSink::channel();
        (sink, Some(rx))
    } else {
        (EventSink::disabled(), None)
    };

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    if let Some(mut rx) = receiver {
        runtime.spawn(async move {
            while let Some(event) = rx.recv().await {
                match serde_json::to_string(&event) {
                    Ok(line) => eprintln!("{}", line),
                    Err(e) => log::warn!("Failed to serialize {} event: {}", event.name(), e),
                }
            }
        });
    }

    let pipeline = Pipeline::builder(manifest, config)
        .shutdown(shutdown)
        .events(events)
        .build()?;

    runtime.block_on(dispatch(cli.command, cli.json, &pipeline))
}

async fn dispatch(command: Command, json: bool, pipeline: &Pipeline) -> Result<i32> {
    match command {
        Command::Plan => {
            let plan = pipeline.plan()?;
            output(json, &plan, print_plan)?;
            Ok(0)
        }
        Command::Execute { track_id } => {
            let outcome = pipeline.execute_track(&track_id).await?;
            output(json, &outcome.marker, |_| print_outcome(&outcome))?;
            Ok(outcome.error.as_ref().map_or(0, |e| e.exit_code()))
        }
        Command::Run { cleanup } => {
            let report = pipeline.run().await?;
            output(json, &report, print_report)?;
            if cleanup && report.is_success() {
                pipeline.release_workspaces()?;
            }
            Ok(report.exit_code)
        }
        Command::Merge => {
            let report = pipeline.merge().await?;
            output(json, &report, print_report)?;
            Ok(report.exit_code)
        }
        Command::Status => {
            let status = pipeline.status()?;
            output(json, &status, print_status)?;
            Ok(0)
        }
        Command::Gates => {
            let report = pipeline.gates().await;
            output(json, &report, |report| {
                for result in &report.results {
                    println!(
                        "  {} {} ({}ms)",
                        if result.passed { "pass" } else { "FAIL" },
                        result.name,
                        result.duration_ms
                    );
                }
            })?;
            Ok(report.into_result().err().map_or(0, |e| e.exit_code()))
        }
    }
}

fn output<T: Serialize>(json: bool, value: &T, human: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human(value);
    }
    Ok(())
}

fn print_plan(plan: &Plan) {
    println!("Feature {} -> {}", plan.feature_id, plan.target_branch);
    for (i, round) in plan.rounds.iter().enumerate() {
        println!("  round {}: {}", i + 1, round.join(", "));
    }
}

fn print_outcome(outcome: &TrackOutcome) {
    if outcome.already_terminal {
        println!(
            "Track {} already {:?}",
            outcome.track_id, outcome.marker.status
        );
        return;
    }
    println!(
        "Track {}: {:?} (resumed after unit {}, ran {} unit(s))",
        outcome.track_id,
        outcome.marker.status,
        outcome.resumed_from,
        outcome.executed_units.len()
    );
    if let Some(error) = &outcome.error {
        println!("  {}", error);
    }
}

fn print_report(report: &RunReport) {
    println!(
        "Run {} for {}: {:?}",
        report.run_id, report.feature_id, report.status
    );
    for track in &report.tracks {
        println!(
            "  [round {}] {}: {} ({}/{} units)",
            track.round,
            track.track_id,
            track
                .status
                .map_or("unfinished".to_string(), |s| format!("{:?}", s).to_lowercase()),
            track.units_completed,
            track.unit_count
        );
    }
    for round in &report.rounds {
        println!(
            "  round {}: merged {}, skipped {}, tests {:?}",
            round.round_number,
            round.merged.len(),
            round.skipped.len(),
            round.test_result
        );
        for conflict in round.unresolved_conflicts() {
            println!(
                "    unresolved {:?} conflict in {} (track {})",
                conflict.classification, conflict.file_path, conflict.track_id
            );
        }
        if round.is_blocked() {
            println!(
                "    blocked: {}",
                round.blocked_reason.as_deref().unwrap_or_default()
            );
        }
    }
    if let Some(error) = &report.error {
        println!("Error: {}", error);
    }
}

fn print_status(status: &StatusReport) {
    println!("Feature {}", status.feature_id);
    for track in &status.tracks {
        println!(
            "  [round {}] {}: {} ({}/{} units)",
            track.round,
            track.track_id,
            track
                .status
                .map_or("pending".to_string(), |s| format!("{:?}", s).to_lowercase()),
            track.units_completed,
            track.unit_count
        );
    }
    match (&status.latest_run_id, &status.latest_report) {
        (Some(run_id), Some(report)) => println!(
            "Latest merge run {}: {:?} after {} round(s) (exit code {})",
            run_id,
            report.status,
            status.latest_rounds.len(),
            report.exit_code
        ),
        (Some(run_id), None) => println!(
            "Latest merge run {}: {} round(s) recorded, no report",
            run_id,
            status.latest_rounds.len()
        ),
        (None, _) => println!("No merge run yet"),
    }
}
