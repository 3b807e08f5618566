//! Command-line interface for kinesys.
//!
//! Provides commands for running the full pipeline, planning and
//! validating trajectories, inspecting scenes, and replaying recorded
//! guide-mode trajectories.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::adapters::{parse_action_plan, StaticDecomposer};
use crate::config::{self, ResolvedConfig};
use crate::core::{
    analyze_scene, list_available_primitives, plan_trajectory, validate_trajectory, CommandRunner,
    PipelineNode,
};
use crate::domain::{ActionRequest, SceneState, Waypoint};
use crate::recorder::{ReplayOutcome, SessionStore};

/// Session id used for CLI replays
const CLI_SESSION: &str = "cli";

/// kinesys - natural-language robot command pipeline
#[derive(Parser, Debug)]
#[command(name = "kinesys")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a command through the full pipeline
    Run {
        /// What the operator said
        #[arg(short, long)]
        transcript: String,

        /// Scene snapshot (JSON or YAML)
        #[arg(short, long)]
        scene: PathBuf,

        /// Pre-computed action plan (uses the configured decomposer if omitted)
        #[arg(short, long)]
        actions: Option<PathBuf>,

        /// Grant human confirmation for flagged trajectories
        #[arg(long)]
        confirm: bool,

        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Plan a trajectory and print the plan report
    Plan {
        /// Scene snapshot (JSON or YAML)
        #[arg(short, long)]
        scene: PathBuf,

        /// Action plan (JSON or YAML)
        #[arg(short, long)]
        actions: PathBuf,
    },

    /// Run the safety checks over a list of waypoints
    Validate {
        /// Waypoints (JSON or YAML)
        #[arg(short, long)]
        waypoints: PathBuf,

        /// Scene snapshot, enables obstacle clearance checks
        #[arg(short, long)]
        scene: Option<PathBuf>,
    },

    /// Describe a scene as seen by the decomposer
    Scene {
        /// Scene snapshot (JSON or YAML)
        #[arg(short, long)]
        scene: PathBuf,
    },

    /// List the action primitives
    Primitives,

    /// Record a trajectory and replay it to stdout
    Replay {
        /// Recorded trajectory (JSON or YAML)
        #[arg(short, long)]
        trajectory: PathBuf,

        /// Playback speed multiplier
        #[arg(long, default_value = "1.0")]
        speed: f64,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run {
                transcript,
                scene,
                actions,
                confirm,
                json,
            } => run_command(&transcript, &scene, actions.as_deref(), confirm, json).await,
            Commands::Plan { scene, actions } => plan(&scene, &actions).await,
            Commands::Validate { waypoints, scene } => validate(&waypoints, scene.as_deref()).await,
            Commands::Scene { scene } => describe_scene(&scene).await,
            Commands::Primitives => list_primitives().await,
            Commands::Replay { trajectory, speed } => replay_trajectory(&trajectory, speed).await,
            Commands::Config => show_config().await,
        }
    }
}

/// Read a JSON or YAML document, chosen by file extension
pub fn load_document(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;

    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);

    if is_yaml {
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML: {}", path.display()))
    } else {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON: {}", path.display()))
    }
}

fn load_scene(path: &Path) -> Result<SceneState> {
    let value = load_document(path)?;
    SceneState::from_value(&value).with_context(|| format!("Invalid scene: {}", path.display()))
}

fn load_actions(path: &Path) -> Result<Vec<ActionRequest>> {
    let raw = load_document(path)?.to_string();
    let entries = parse_action_plan(&raw)
        .with_context(|| format!("Invalid action plan: {}", path.display()))?;
    serde_json::from_value(Value::Array(entries))
        .with_context(|| format!("Invalid action plan: {}", path.display()))
}

/// Run the full pipeline
async fn run_command(
    transcript: &str,
    scene_path: &Path,
    actions_path: Option<&Path>,
    confirm: bool,
    json: bool,
) -> Result<()> {
    let cfg = config::config()?;
    let scene_data = load_document(scene_path)?;

    let state = match actions_path {
        Some(path) => {
            let raw = load_document(path)?.to_string();
            let runner = CommandRunner::new(StaticDecomposer::new(raw), cfg.pipeline.clone())
                .with_retries(0);
            runner.run(transcript, scene_data, confirm).await
        }
        None => {
            let Some(decomposer) = cfg.decomposer.as_ref() else {
                anyhow::bail!(
                    "No action plan given. Use --actions <file> or configure a decomposer"
                );
            };
            let runner = CommandRunner::new(decomposer.build(), cfg.pipeline.clone())
                .with_retries(decomposer.retries);
            runner.run(transcript, scene_data, confirm).await
        }
    };

    let outcome = state.outcome();
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", outcome.message);
        let path: Vec<_> = outcome.history.iter().map(PipelineNode::as_str).collect();
        eprintln!("\n[Run {}: {}]", outcome.run_id, path.join(" → "));
        if !confirm && outcome.message.contains("Human confirmation required") {
            eprintln!("[Re-run with --confirm to approve]");
        }
    }

    if outcome.final_state == PipelineNode::Error {
        std::process::exit(1);
    }
    Ok(())
}

/// Plan a trajectory without running the pipeline
async fn plan(scene_path: &Path, actions_path: &Path) -> Result<()> {
    let cfg = config::config()?;
    let scene = load_scene(scene_path)?;
    let actions = load_actions(actions_path)?;

    let plan = plan_trajectory(&actions, &scene, &cfg.pipeline.safety);
    println!("{}", serde_json::to_string_pretty(&plan.report())?);

    if !plan.is_valid {
        eprintln!(
            "\n[Plan rejected: {}]",
            plan.error.map(|e| e.to_string()).unwrap_or_default()
        );
        std::process::exit(1);
    }
    Ok(())
}

/// Validate a waypoint list
async fn validate(waypoints_path: &Path, scene_path: Option<&Path>) -> Result<()> {
    let cfg = config::config()?;
    let waypoints: Vec<Waypoint> = serde_json::from_value(load_document(waypoints_path)?)
        .with_context(|| format!("Invalid waypoints: {}", waypoints_path.display()))?;
    let scene = scene_path.map(load_scene).transpose()?;

    let result = validate_trajectory(&waypoints, scene.as_ref(), &cfg.pipeline.safety);
    println!("{}", serde_json::to_string_pretty(&result.report())?);

    if !result.is_safe {
        eprintln!("\n[{}]", result.summary);
        std::process::exit(1);
    }
    Ok(())
}

async fn describe_scene(scene_path: &Path) -> Result<()> {
    let scene = load_scene(scene_path)?;
    println!("{}", analyze_scene(&scene).to_description());
    Ok(())
}

async fn list_primitives() -> Result<()> {
    for info in list_available_primitives() {
        println!("{:<10} {}", info.id, info.description);
    }
    Ok(())
}

/// Trajectory file: `{id, points, metadata}` or a bare list of points
fn split_trajectory(doc: Value, fallback_id: &str) -> Result<(String, Vec<Value>, Option<Map<String, Value>>)> {
    match doc {
        Value::Array(points) => Ok((fallback_id.to_string(), points, None)),
        Value::Object(mut map) => {
            let id = map
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or(fallback_id)
                .to_string();
            let points = match map.remove("points") {
                Some(Value::Array(points)) => points,
                _ => anyhow::bail!("Trajectory must contain a 'points' list"),
            };
            let metadata = match map.remove("metadata") {
                Some(Value::Object(metadata)) => Some(metadata),
                _ => None,
            };
            Ok((id, points, metadata))
        }
        _ => anyhow::bail!("Trajectory must be a list of points or an object"),
    }
}

/// Replay a trajectory file, one JSON event per line; Ctrl-C cancels
async fn replay_trajectory(path: &Path, speed: f64) -> Result<()> {
    let fallback_id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("trajectory");
    let (id, points, metadata) = split_trajectory(load_document(path)?, fallback_id)?;

    let store = SessionStore::new();
    store.open(CLI_SESSION).await;
    let summary = store.record(CLI_SESSION, &id, &points, metadata).await?;
    eprintln!(
        "Recorded '{}': {} points, {:.1}s",
        summary.id,
        summary.point_count,
        summary.duration_ms as f64 / 1000.0
    );

    let (tx, mut rx) = mpsc::channel(64);
    let handle = store.start_replay(CLI_SESSION, Some(&id), speed, tx).await?;

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => println!("{}", serde_json::to_string(&event)?),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nStopping replay...");
                store.cancel_replay(CLI_SESSION).await?;
            }
        }
    }

    let outcome = handle.join().await?;
    store.close(CLI_SESSION).await;

    match outcome {
        ReplayOutcome::Failed(e) => Err(e.into()),
        _ => Ok(()),
    }
}

/// Show the resolved configuration (for debugging)
async fn show_config() -> Result<()> {
    let cfg: &ResolvedConfig = config::config()?;

    println!("Config file: {}", cfg.config_file.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "(none - using defaults)".to_string()));
    println!();
    println!("{}", serde_yaml::to_string(&cfg.pipeline)?);

    match &cfg.decomposer {
        Some(d) => {
            println!("Decomposer:");
            println!("  Command:  {} {}", d.command, d.args.join(" "));
            println!("  Timeout:  {}s", d.timeout_seconds);
            println!("  Retries:  {}", d.retries);
        }
        None => println!("Decomposer: (none - pass --actions to `run`)"),
    }

    Ok(())
}
