//! Domain types for the kinesys pipeline.
//!
//! This module contains the core data structures:
//! - Waypoint: 6-DOF end-effector pose plus gripper flag
//! - Scene: Tracked objects and robot state
//! - Validation: Primitive-local check outcomes
//! - Action: Abstract `{action, params}` requests

pub mod action;
pub mod scene;
pub mod validation;
pub mod waypoint;

// Re-export commonly used types
pub use action::{ActionRequest, Params};
pub use scene::{RawObject, RawScene, SceneError, SceneObject, SceneState, DEFAULT_OBJECT_EXTENT};
pub use validation::{ValidationResult, ValidationStatus};
pub use waypoint::{distance, Vec3, Waypoint};
