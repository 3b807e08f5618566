//! Core planning and control logic.
//!
//! This module contains:
//! - Safety: trajectory constraint engine
//! - Planner: action sequence to waypoint trajectory
//! - SceneGraph: spatial relations between scene objects
//! - StateMachine: the pipeline and its safety/HITL gate
//! - Orchestrator: async command runner around the state machine

pub mod orchestrator;
pub mod planner;
pub mod safety;
pub mod scene_graph;
pub mod state_machine;

// Re-export commonly used types
pub use orchestrator::CommandRunner;
pub use planner::{
    list_available_primitives, plan_trajectory, ActionStep, PlanError, PlanReport, PrimitiveInfo,
    TrajectoryPlan,
};
pub use safety::{
    validate_trajectory, ConstraintViolation, SafetyConfig, SafetyReport, SafetyValidationResult,
    Severity, WorkspaceBounds,
};
pub use scene_graph::{analyze_scene, Relation, SceneGraph, SpatialRelation};
pub use state_machine::{
    pipeline_node_names, run_pipeline, HitlPolicy, PipelineConfig, PipelineMachine, PipelineNode,
    PipelineOutcome, PipelineState,
};
