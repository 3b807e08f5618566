//! kinesys - Natural-language robot command pipeline
//!
//! Turns a spoken command into a safety-checked end-effector trajectory
//! for a simulated robot arm.
//!
//! # Architecture
//!
//! A command flows through a state machine:
//! - A decomposer turns the transcript into primitive actions
//! - The planner expands each action into waypoints against a scene copy
//! - The safety engine validates the full trajectory
//! - A gate routes unsafe or unconfirmed trajectories to ERROR
//!
//! # Modules
//!
//! - `domain`: Value types (Waypoint, SceneState, ActionRequest)
//! - `primitives`: The 12 action primitives and their registry
//! - `core`: Safety engine, planner, scene graph, state machine
//! - `adapters`: Decomposition collaborators
//! - `recorder`: Guide-mode trajectory recording and replay
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Plan a trajectory
//! kinesys plan --scene scene.json --actions plan.json
//!
//! # Run the full pipeline, approving flagged trajectories
//! kinesys run -t "put the red cube in the bowl" -s scene.json -a plan.json --confirm
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod primitives;
pub mod recorder;

// Re-export main types at crate root for convenience
pub use adapters::{Decomposer, Decomposition, StaticDecomposer};
pub use core::{
    plan_trajectory, run_pipeline, validate_trajectory, CommandRunner, HitlPolicy, PipelineConfig,
    PipelineMachine, PipelineNode, PipelineState, SafetyConfig, TrajectoryPlan,
};
pub use domain::{ActionRequest, SceneObject, SceneState, Waypoint};
pub use primitives::{get_primitive, PrimitiveId};
pub use recorder::{Recorder, SessionStore};
