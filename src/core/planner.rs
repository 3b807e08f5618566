//! Trajectory planner.
//!
//! Sequences primitives over an evolving working copy of the scene,
//! concatenates their waypoints, and runs whole-trajectory safety
//! validation. Planning stops at the first step that cannot be resolved,
//! generated, or locally validated.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::domain::{ActionRequest, Params, SceneState, ValidationResult, ValidationStatus, Waypoint};
use crate::primitives::{get_primitive, registry, PrimitiveError, PrimitiveId};

use super::safety::{validate_trajectory, SafetyConfig, SafetyReport, SafetyValidationResult};

/// Why a plan is not valid
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    /// Primitive resolution or waypoint generation failed
    #[error("Step {index} ({action}): {source}")]
    Step {
        index: usize,
        action: String,
        source: PrimitiveError,
    },

    /// A primitive's local check returned FAIL
    #[error("Step {index} ({action}): {reason}")]
    LocalValidation {
        index: usize,
        action: PrimitiveId,
        reason: String,
    },

    /// Every step generated, but the whole trajectory is unsafe
    #[error("{summary}")]
    Unsafe { summary: String },
}

impl PlanError {
    /// Index of the step planning stopped at (`None` for unsafe plans)
    pub fn step_index(&self) -> Option<usize> {
        match self {
            PlanError::Step { index, .. } | PlanError::LocalValidation { index, .. } => {
                Some(*index)
            }
            PlanError::Unsafe { .. } => None,
        }
    }
}

/// One resolved step of a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStep {
    pub action_id: PrimitiveId,
    pub params: Params,
    pub waypoints: Vec<Waypoint>,
    pub validation: ValidationResult,
    pub narration: String,
    pub index: usize,
}

/// Result of a single [`plan_trajectory`] call
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectoryPlan {
    /// Steps planned so far (all of them when planning completed)
    pub steps: Vec<ActionStep>,

    /// Concatenated waypoints, in execution order
    pub all_waypoints: Vec<Waypoint>,

    pub safety: SafetyValidationResult,
    pub narration_sequence: Vec<String>,
    pub is_valid: bool,
    pub error: Option<PlanError>,
}

impl TrajectoryPlan {
    /// Partial plan returned when a step aborts planning
    fn aborted(
        steps: Vec<ActionStep>,
        all_waypoints: Vec<Waypoint>,
        narration_sequence: Vec<String>,
        error: PlanError,
    ) -> Self {
        Self {
            steps,
            all_waypoints,
            safety: SafetyValidationResult {
                is_safe: false,
                violations: Vec::new(),
                warnings: Vec::new(),
                summary: error.to_string(),
            },
            narration_sequence,
            is_valid: false,
            error: Some(error),
        }
    }

    /// Whether planning stopped before the last action
    pub fn is_aborted(&self) -> bool {
        self.error.as_ref().and_then(PlanError::step_index).is_some()
    }

    /// Serializable report for the execution layer
    pub fn report(&self) -> PlanReport {
        PlanReport {
            is_valid: self.is_valid,
            error: self.error.as_ref().map(ToString::to_string),
            step_count: self.steps.len(),
            total_waypoints: self.all_waypoints.len(),
            narration: self.narration_sequence.clone(),
            safety: self.safety.report(),
            steps: self
                .steps
                .iter()
                .map(|s| StepReport {
                    index: s.index,
                    action: s.action_id,
                    params: s.params.clone(),
                    waypoint_count: s.waypoints.len(),
                    validation: StepValidation {
                        status: s.validation.status,
                        reason: s.validation.reason.clone(),
                    },
                    narration: s.narration.clone(),
                })
                .collect(),
            waypoints: self.all_waypoints.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanReport {
    pub is_valid: bool,
    pub error: Option<String>,
    pub step_count: usize,
    pub total_waypoints: usize,
    pub narration: Vec<String>,
    pub safety: SafetyReport,
    pub steps: Vec<StepReport>,
    pub waypoints: Vec<Waypoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub index: usize,
    pub action: PrimitiveId,
    pub params: Params,
    pub waypoint_count: usize,
    pub validation: StepValidation,
    pub narration: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepValidation {
    pub status: ValidationStatus,
    pub reason: String,
}

/// Plan a sequence of abstract actions against a scene snapshot
///
/// `scene` is never mutated; each call works on its own copy. Obstacle
/// clearance is checked against the original snapshot.
#[instrument(skip_all, fields(actions = actions.len()))]
pub fn plan_trajectory(
    actions: &[ActionRequest],
    scene: &SceneState,
    config: &SafetyConfig,
) -> TrajectoryPlan {
    let mut steps: Vec<ActionStep> = Vec::with_capacity(actions.len());
    let mut all_waypoints: Vec<Waypoint> = Vec::new();
    let mut narrations: Vec<String> = Vec::with_capacity(actions.len());
    let mut working = scene.clone();

    for (index, request) in actions.iter().enumerate() {
        let action = request.action.trim().to_ascii_uppercase();

        let primitive = match get_primitive(&action) {
            Ok(p) => p,
            Err(source) => {
                error!(step = index, %action, "Unknown action");
                let err = PlanError::Step { index, action, source };
                return TrajectoryPlan::aborted(steps, all_waypoints, narrations, err);
            }
        };
        let id = primitive.id();

        let waypoints = match primitive.generate_waypoints(&request.params, &working) {
            Ok(w) => w,
            Err(source) => {
                error!(step = index, action = %id, %source, "Waypoint generation failed");
                let err = PlanError::Step { index, action, source };
                return TrajectoryPlan::aborted(steps, all_waypoints, narrations, err);
            }
        };

        let validation = primitive.validate(&waypoints, &working);
        if validation.failed() {
            warn!(step = index, action = %id, reason = %validation.reason, "Primitive validation failed");
            let err = PlanError::LocalValidation {
                index,
                action: id,
                reason: validation.reason,
            };
            return TrajectoryPlan::aborted(steps, all_waypoints, narrations, err);
        }

        let narration = primitive.describe(&request.params);
        narrations.push(narration.clone());
        all_waypoints.extend_from_slice(&waypoints);

        advance_scene(&mut working, id, &request.params, &waypoints);

        steps.push(ActionStep {
            action_id: id,
            params: request.params.clone(),
            waypoints,
            validation,
            narration,
            index,
        });
    }

    let safety = validate_trajectory(&all_waypoints, Some(scene), config);
    let is_valid = safety.is_safe;
    let error = if is_valid {
        info!(steps = steps.len(), waypoints = all_waypoints.len(), "Trajectory plan valid");
        None
    } else {
        warn!(summary = %safety.summary, "Trajectory plan failed safety");
        Some(PlanError::Unsafe {
            summary: safety.summary.clone(),
        })
    };

    TrajectoryPlan {
        steps,
        all_waypoints,
        safety,
        narration_sequence: narrations,
        is_valid,
        error,
    }
}

/// Apply the effects of one planned action to the working scene
fn advance_scene(scene: &mut SceneState, id: PrimitiveId, params: &Params, waypoints: &[Waypoint]) {
    if let Some(last) = waypoints.last() {
        scene.end_effector = last.position();
        scene.gripper_open = last.gripper_open;
    }

    match id {
        PrimitiveId::Grasp => {
            let target = params.get("target").and_then(|v| v.as_str());
            if let Some(obj) = target.and_then(|t| scene.objects.get_mut(t)) {
                obj.is_held = true;
                scene.held_object_id = Some(obj.id.clone());
                scene.gripper_open = false;
            }
        }
        PrimitiveId::Release => {
            let end_effector = scene.end_effector;
            if let Some(obj) = held_mut(scene) {
                obj.is_held = false;
                obj.position = end_effector;
            }
            scene.held_object_id = None;
            scene.gripper_open = true;
        }
        PrimitiveId::Place | PrimitiveId::Stack => {
            // The object comes to rest where the gripper first reopens.
            let rest = waypoints
                .iter()
                .find(|w| w.gripper_open)
                .or_else(|| waypoints.last())
                .map(Waypoint::position);
            if let Some(obj) = held_mut(scene) {
                obj.is_held = false;
                if let Some(rest) = rest {
                    obj.position = rest;
                }
            }
            scene.held_object_id = None;
            scene.gripper_open = true;
        }
        PrimitiveId::Translate => {
            let end_effector = scene.end_effector;
            if let Some(obj) = held_mut(scene) {
                obj.position = end_effector;
            }
        }
        _ => {}
    }
}

fn held_mut(scene: &mut SceneState) -> Option<&mut crate::domain::SceneObject> {
    let id = scene.held_object_id.as_deref()?;
    scene.objects.get_mut(id)
}

/// Registry metadata for one primitive
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrimitiveInfo {
    pub id: PrimitiveId,
    pub description: &'static str,
}

/// Metadata for every registered primitive
pub fn list_available_primitives() -> Vec<PrimitiveInfo> {
    registry()
        .iter()
        .map(|p| PrimitiveInfo {
            id: p.id(),
            description: p.summary(),
        })
        .collect()
}
