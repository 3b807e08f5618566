//! Pipeline state machine.
//!
//! ```text
//! IDLE → LISTENING → DECOMPOSING → SCENE_ANALYZING → PLANNING
//!      → VALIDATING → EXECUTING → CONFIRMING → (end)
//!                   ↘ ERROR → IDLE → (end)
//! ```
//!
//! Every node is a function `PipelineState → PipelineState`. VALIDATING
//! is the only way into EXECUTING, and it routes any unsafe trajectory,
//! or any trajectory awaiting human confirmation, to ERROR.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{ActionRequest, SceneState, Waypoint};

use super::planner::{plan_trajectory, PlanReport};
use super::safety::{validate_trajectory, SafetyConfig, SafetyReport};
use super::scene_graph::{analyze_scene, SceneGraph};

/// Upper bound on node transitions for a single run
pub const MAX_TRANSITIONS: usize = 32;

/// Nodes of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineNode {
    Idle,
    Listening,
    Decomposing,
    SceneAnalyzing,
    Planning,
    Validating,
    Executing,
    Confirming,
    Error,
}

impl PipelineNode {
    /// Canonical node order
    pub const ALL: [PipelineNode; 9] = [
        PipelineNode::Idle,
        PipelineNode::Listening,
        PipelineNode::Decomposing,
        PipelineNode::SceneAnalyzing,
        PipelineNode::Planning,
        PipelineNode::Validating,
        PipelineNode::Executing,
        PipelineNode::Confirming,
        PipelineNode::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineNode::Idle => "IDLE",
            PipelineNode::Listening => "LISTENING",
            PipelineNode::Decomposing => "DECOMPOSING",
            PipelineNode::SceneAnalyzing => "SCENE_ANALYZING",
            PipelineNode::Planning => "PLANNING",
            PipelineNode::Validating => "VALIDATING",
            PipelineNode::Executing => "EXECUTING",
            PipelineNode::Confirming => "CONFIRMING",
            PipelineNode::Error => "ERROR",
        }
    }
}

impl fmt::Display for PipelineNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// All node names, in canonical order
pub fn pipeline_node_names() -> Vec<&'static str> {
    PipelineNode::ALL.iter().map(PipelineNode::as_str).collect()
}

/// When an otherwise-safe trajectory needs explicit human confirmation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitlPolicy {
    /// Trajectories with more waypoints than this need confirmation (default: 5)
    #[serde(default = "default_waypoint_threshold")]
    pub waypoint_threshold: usize,

    /// Fraction of the linear velocity limit above which a hop needs
    /// confirmation (default: 0.8)
    #[serde(default = "default_velocity_fraction")]
    pub velocity_fraction: f64,
}

fn default_waypoint_threshold() -> usize {
    5
}
fn default_velocity_fraction() -> f64 {
    0.8
}

impl Default for HitlPolicy {
    fn default() -> Self {
        Self {
            waypoint_threshold: default_waypoint_threshold(),
            velocity_fraction: default_velocity_fraction(),
        }
    }
}

impl HitlPolicy {
    /// Reason confirmation is required, or `None`
    ///
    /// The velocity rule is reported in preference to the waypoint count.
    pub fn evaluate(&self, waypoints: &[Waypoint], safety: &SafetyConfig) -> Option<String> {
        let max_velocity = safety.max_linear_velocity_mps;
        let fast_hop = waypoints.windows(2).enumerate().find_map(|(i, pair)| {
            let velocity = pair[0].distance_to(&pair[1]) / safety.assumed_dt;
            (velocity > max_velocity * self.velocity_fraction).then(|| {
                format!(
                    "Waypoint {} velocity {:.2} m/s exceeds {:.0}% of max ({} m/s)",
                    i + 1,
                    velocity,
                    self.velocity_fraction * 100.0,
                    max_velocity
                )
            })
        });

        fast_hop.or_else(|| {
            (waypoints.len() > self.waypoint_threshold).then(|| {
                format!(
                    "Trajectory has {} waypoints (threshold: {})",
                    waypoints.len(),
                    self.waypoint_threshold
                )
            })
        })
    }
}

/// Thresholds the pipeline runs with
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub safety: SafetyConfig,

    #[serde(default)]
    pub hitl: HitlPolicy,
}

/// Record carried through the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub current_node: PipelineNode,

    /// Every node entered, in order
    pub history: Vec<PipelineNode>,

    pub error_message: Option<String>,

    // Input
    pub transcript: String,
    pub scene_data: Value,

    // Decomposition
    pub action_plan: Vec<Value>,
    pub decomposition_raw: String,
    pub confidence_scores: BTreeMap<String, f64>,

    // Scene analysis
    pub scene: Option<SceneState>,
    pub scene_graph: Option<SceneGraph>,

    // Planning
    pub trajectory_plan: Option<PlanReport>,
    pub waypoints: Vec<Waypoint>,
    pub narration: Vec<String>,

    // Validation
    pub validation_result: Option<SafetyReport>,
    pub is_safe: bool,
    pub requires_confirmation: bool,
    pub confirmation_reason: String,
    pub human_confirmation_granted: bool,

    /// Whether IDLE starts a new pass (true on each external invocation)
    pub resume_from_idle: bool,

    // Output
    pub confirmation_message: String,
    pub final_state: PipelineNode,
}

impl PipelineState {
    /// Fresh state for one command invocation
    pub fn new(transcript: impl Into<String>, scene_data: Value, action_plan: Vec<Value>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            current_node: PipelineNode::Idle,
            history: Vec::new(),
            error_message: None,
            transcript: transcript.into(),
            scene_data,
            action_plan,
            decomposition_raw: String::new(),
            confidence_scores: BTreeMap::new(),
            scene: None,
            scene_graph: None,
            trajectory_plan: None,
            waypoints: Vec::new(),
            narration: Vec::new(),
            validation_result: None,
            is_safe: false,
            requires_confirmation: false,
            confirmation_reason: String::new(),
            human_confirmation_granted: false,
            resume_from_idle: true,
            confirmation_message: String::new(),
            final_state: PipelineNode::Idle,
        }
    }

    pub fn with_decomposition_raw(self, raw: impl Into<String>) -> Self {
        Self {
            decomposition_raw: raw.into(),
            ..self
        }
    }

    pub fn with_confidence_scores(self, scores: BTreeMap<String, f64>) -> Self {
        Self {
            confidence_scores: scores,
            ..self
        }
    }

    pub fn with_confirmation(self, granted: bool) -> Self {
        Self {
            human_confirmation_granted: granted,
            ..self
        }
    }

    /// Mark `node` as entered
    fn enter(mut self, node: PipelineNode) -> Self {
        self.current_node = node;
        self.history.push(node);
        self
    }

    /// Route the current pass to ERROR with `message`
    fn fail(self, message: impl Into<String>) -> Self {
        Self {
            current_node: PipelineNode::Error,
            error_message: Some(message.into()),
            final_state: PipelineNode::Error,
            ..self
        }
    }

    /// Parsed scene from SCENE_ANALYZING, or a fresh parse of `scene_data`
    fn resolve_scene(&self) -> Result<SceneState, String> {
        match self.scene {
            Some(ref scene) => Ok(scene.clone()),
            None => SceneState::from_value(&self.scene_data).map_err(|e| e.to_string()),
        }
    }

    /// Summary of the run for callers
    pub fn outcome(&self) -> PipelineOutcome {
        PipelineOutcome {
            run_id: self.run_id,
            final_state: self.final_state,
            message: self.confirmation_message.clone(),
            is_safe: self.is_safe,
            requires_confirmation: self.requires_confirmation,
            waypoint_count: self.waypoints.len(),
            narration: self.narration.clone(),
            history: self.history.clone(),
        }
    }
}

/// Serializable result of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub run_id: Uuid,
    pub final_state: PipelineNode,
    pub message: String,
    pub is_safe: bool,
    pub requires_confirmation: bool,
    pub waypoint_count: usize,
    pub narration: Vec<String>,
    pub history: Vec<PipelineNode>,
}

/// Outcome of the VALIDATING gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    Executing,
    /// A pending error message from an earlier stage or from validation
    Error,
    ErrorUnsafe,
    HitlRequired,
}

impl GateDecision {
    pub fn next(&self) -> PipelineNode {
        match self {
            GateDecision::Executing => PipelineNode::Executing,
            _ => PipelineNode::Error,
        }
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// Entry and recovery node; clears per-pass artifacts
pub fn idle_node(state: PipelineState) -> PipelineState {
    PipelineState {
        error_message: None,
        waypoints: Vec::new(),
        narration: Vec::new(),
        is_safe: false,
        requires_confirmation: false,
        confirmation_reason: String::new(),
        ..state.enter(PipelineNode::Idle)
    }
}

pub fn listening_node(state: PipelineState) -> PipelineState {
    let state = state.enter(PipelineNode::Listening);
    let transcript = state.transcript.trim().to_string();

    if transcript.is_empty() {
        return state.fail("No speech transcript received");
    }
    PipelineState { transcript, ..state }
}

/// Checks the pre-computed action plan has the expected shape
pub fn decomposing_node(state: PipelineState) -> PipelineState {
    let state = state.enter(PipelineNode::Decomposing);

    if state.action_plan.is_empty() {
        let raw: String = state.decomposition_raw.chars().take(200).collect();
        return state.fail(format!("Decomposition returned no actions. Raw: {}", raw));
    }

    let malformed = state
        .action_plan
        .iter()
        .enumerate()
        .find(|(_, entry)| entry.get("action").is_none() || !entry.is_object())
        .map(|(i, entry)| format!("Action {} has invalid structure: {}", i, entry));
    if let Some(message) = malformed {
        return state.fail(message);
    }

    info!(actions = state.action_plan.len(), "Decomposed transcript into actions");
    state
}

pub fn scene_analyzing_node(state: PipelineState) -> PipelineState {
    let state = state.enter(PipelineNode::SceneAnalyzing);

    match SceneState::from_value(&state.scene_data) {
        Ok(scene) => {
            let graph = analyze_scene(&scene);
            PipelineState {
                scene: Some(scene),
                scene_graph: Some(graph),
                ..state
            }
        }
        Err(e) => {
            error!(error = %e, "Scene analysis failed");
            state.fail(format!("Scene analysis failed: {}", e))
        }
    }
}

pub fn planning_node(state: PipelineState, safety: &SafetyConfig) -> PipelineState {
    let state = state.enter(PipelineNode::Planning);

    let scene = match state.resolve_scene() {
        Ok(scene) => scene,
        Err(e) => return state.fail(format!("Planning failed: {}", e)),
    };

    let actions = state
        .action_plan
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            serde_json::from_value::<ActionRequest>(entry.clone())
                .map_err(|e| format!("Action {} is malformed: {}", i, e))
        })
        .collect::<Result<Vec<_>, _>>();
    let actions = match actions {
        Ok(actions) => actions,
        Err(e) => return state.fail(format!("Planning failed: {}", e)),
    };

    let plan = plan_trajectory(&actions, &scene, safety);
    let report = plan.report();

    if let Some(ref err) = plan.error {
        if plan.is_aborted() {
            error!(error = %err, "Trajectory planning failed");
            let message = format!("Planning failed: {}", err);
            return PipelineState {
                trajectory_plan: Some(report),
                ..state
            }
            .fail(message);
        }
    }
    if plan.all_waypoints.is_empty() {
        return state.fail("Planning failed: trajectory has no waypoints");
    }

    PipelineState {
        trajectory_plan: Some(report),
        waypoints: plan.all_waypoints,
        narration: plan.narration_sequence,
        ..state
    }
}

/// Safety gate plus HITL evaluation
pub fn validating_node(state: PipelineState, config: &PipelineConfig) -> PipelineState {
    let state = state.enter(PipelineNode::Validating);

    let scene = match state.resolve_scene() {
        Ok(scene) => scene,
        Err(e) => {
            error!(error = %e, "Validation failed");
            return PipelineState {
                is_safe: false,
                ..state.fail(format!("Validation error: {}", e))
            };
        }
    };

    let safety = validate_trajectory(&state.waypoints, Some(&scene), &config.safety);
    let reason = config.hitl.evaluate(&state.waypoints, &config.safety);
    let requires_confirmation = reason.is_some();

    let mut error_message = state.error_message.clone();
    if requires_confirmation && !state.human_confirmation_granted {
        error_message = Some(format!(
            "Human confirmation required before execution: {}",
            reason.as_deref().unwrap_or("trajectory flagged for review")
        ));
    }

    if !safety.is_safe {
        warn!(summary = %safety.summary, "Trajectory rejected by safety gate");
    }

    PipelineState {
        validation_result: Some(safety.report()),
        is_safe: safety.is_safe,
        requires_confirmation,
        confirmation_reason: reason.unwrap_or_default(),
        error_message,
        ..state
    }
}

/// Marks the plan ready; actuation happens outside the pipeline
pub fn executing_node(state: PipelineState) -> PipelineState {
    let state = state.enter(PipelineNode::Executing);
    info!(waypoints = state.waypoints.len(), "Trajectory ready for execution");
    state
}

pub fn confirming_node(state: PipelineState) -> PipelineState {
    let state = state.enter(PipelineNode::Confirming);
    let confirmation_message = if state.narration.is_empty() {
        "Done.".to_string()
    } else {
        format!("Done. {}.", state.narration.join(". "))
    };

    PipelineState {
        confirmation_message,
        final_state: PipelineNode::Confirming,
        resume_from_idle: false,
        ..state
    }
}

pub fn error_node(state: PipelineState) -> PipelineState {
    let state = state.enter(PipelineNode::Error);
    let reason = state.error_message.as_deref().unwrap_or("Unknown error");
    warn!(error = %reason, "Pipeline error");

    PipelineState {
        confirmation_message: format!("Sorry, I couldn't do that. {}", reason),
        final_state: PipelineNode::Error,
        resume_from_idle: false,
        ..state
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// The safety gate's routing decision
pub fn route_after_validating(state: &PipelineState) -> GateDecision {
    if state.error_message.is_some() {
        GateDecision::Error
    } else if !state.is_safe {
        GateDecision::ErrorUnsafe
    } else if state.requires_confirmation && !state.human_confirmation_granted {
        GateDecision::HitlRequired
    } else {
        GateDecision::Executing
    }
}

/// Next node after `node`, or `None` to terminate
pub fn route(node: PipelineNode, state: &PipelineState) -> Option<PipelineNode> {
    let on_error = |next: PipelineNode| {
        if state.error_message.is_some() {
            PipelineNode::Error
        } else {
            next
        }
    };

    match node {
        PipelineNode::Idle => state.resume_from_idle.then_some(PipelineNode::Listening),
        PipelineNode::Listening => Some(on_error(PipelineNode::Decomposing)),
        PipelineNode::Decomposing if state.action_plan.is_empty() => Some(PipelineNode::Error),
        PipelineNode::Decomposing => Some(on_error(PipelineNode::SceneAnalyzing)),
        PipelineNode::SceneAnalyzing => Some(on_error(PipelineNode::Planning)),
        PipelineNode::Planning if state.waypoints.is_empty() => Some(PipelineNode::Error),
        PipelineNode::Planning => Some(on_error(PipelineNode::Validating)),
        PipelineNode::Validating => Some(route_after_validating(state).next()),
        PipelineNode::Executing => Some(PipelineNode::Confirming),
        PipelineNode::Confirming => None,
        PipelineNode::Error => Some(PipelineNode::Idle),
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Runs pipeline nodes with a fixed configuration
#[derive(Debug, Clone, Default)]
pub struct PipelineMachine {
    config: PipelineConfig,
}

impl PipelineMachine {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Execute a single node
    pub fn step(&self, node: PipelineNode, state: PipelineState) -> PipelineState {
        match node {
            PipelineNode::Idle => idle_node(state),
            PipelineNode::Listening => listening_node(state),
            PipelineNode::Decomposing => decomposing_node(state),
            PipelineNode::SceneAnalyzing => scene_analyzing_node(state),
            PipelineNode::Planning => planning_node(state, &self.config.safety),
            PipelineNode::Validating => validating_node(state, &self.config),
            PipelineNode::Executing => executing_node(state),
            PipelineNode::Confirming => confirming_node(state),
            PipelineNode::Error => error_node(state),
        }
    }

    /// Drive `state` from IDLE until the pipeline terminates
    pub fn run(&self, mut state: PipelineState) -> PipelineState {
        let mut node = PipelineNode::Idle;

        for _ in 0..MAX_TRANSITIONS {
            state = self.step(node, state);
            match route(node, &state) {
                Some(next) => node = next,
                None => {
                    info!(
                        run_id = %state.run_id,
                        final_state = %state.final_state,
                        "Pipeline finished"
                    );
                    return state;
                }
            }
        }

        error!(run_id = %state.run_id, "Pipeline exceeded transition limit");
        PipelineState {
            confirmation_message: format!(
                "Sorry, I couldn't do that. Pipeline exceeded {} transitions",
                MAX_TRANSITIONS
            ),
            ..state.fail(format!("Pipeline exceeded {} transitions", MAX_TRANSITIONS))
        }
    }
}

/// Run the full pipeline with a pre-computed action plan
pub fn run_pipeline(
    transcript: &str,
    scene_data: Value,
    action_plan: Vec<Value>,
    human_confirmation_granted: bool,
    config: &PipelineConfig,
) -> PipelineState {
    let state = PipelineState::new(transcript, scene_data, action_plan)
        .with_confirmation(human_confirmation_granted);
    PipelineMachine::new(config.clone()).run(state)
}
