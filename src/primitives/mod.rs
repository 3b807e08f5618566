//! Action primitive library.
//!
//! Twelve parameterized motion generators. Each maps an abstract action
//! plus the current scene to a concrete waypoint sequence, checks its own
//! local invariants, and produces a narration line.
//!
//! The set is closed: [`PrimitiveId`] enumerates it and [`registry`]
//! resolves an id to its static implementation.

pub mod gripper;
pub mod manipulation;
pub mod motion;
pub mod params;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Params, SceneObject, SceneState, ValidationResult, Waypoint};

pub use gripper::{Grasp, Place, Release, Stack};
pub use manipulation::{Pour, Push, Sort};
pub use motion::{Approach, Inspect, Rotate, Translate, Wait};

/// Minimum clearance height above the table used for transit moves
pub const SAFE_LIFT: f64 = 0.4;

/// Largest rotation or tilt magnitude a single action may request, in degrees
pub const MAX_ANGLE_DEG: f64 = 3600.0;

/// Identifier of a primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrimitiveId {
    Approach,
    Grasp,
    Release,
    Translate,
    Rotate,
    Place,
    Push,
    Pour,
    Stack,
    Sort,
    Inspect,
    Wait,
}

impl PrimitiveId {
    /// All primitives, in registry order
    pub const ALL: [PrimitiveId; 12] = [
        PrimitiveId::Approach,
        PrimitiveId::Grasp,
        PrimitiveId::Release,
        PrimitiveId::Translate,
        PrimitiveId::Rotate,
        PrimitiveId::Place,
        PrimitiveId::Push,
        PrimitiveId::Pour,
        PrimitiveId::Stack,
        PrimitiveId::Sort,
        PrimitiveId::Inspect,
        PrimitiveId::Wait,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveId::Approach => "APPROACH",
            PrimitiveId::Grasp => "GRASP",
            PrimitiveId::Release => "RELEASE",
            PrimitiveId::Translate => "TRANSLATE",
            PrimitiveId::Rotate => "ROTATE",
            PrimitiveId::Place => "PLACE",
            PrimitiveId::Push => "PUSH",
            PrimitiveId::Pour => "POUR",
            PrimitiveId::Stack => "STACK",
            PrimitiveId::Sort => "SORT",
            PrimitiveId::Inspect => "INSPECT",
            PrimitiveId::Wait => "WAIT",
        }
    }

    /// Comma-separated list of every valid id
    pub fn valid_ids() -> String {
        Self::ALL
            .iter()
            .map(|id| id.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for PrimitiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrimitiveId {
    type Err = PrimitiveError;

    /// Case-insensitive lookup
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Self::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == wanted)
            .ok_or_else(|| PrimitiveError::UnknownPrimitive {
                id: s.to_string(),
                available: Self::valid_ids(),
            })
    }
}

/// Errors raised while resolving a primitive or generating its waypoints
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PrimitiveError {
    #[error("Unknown action primitive '{id}'. Available: [{available}]")]
    UnknownPrimitive { id: String, available: String },

    #[error("{primitive} requires parameter '{param}'")]
    MissingParam {
        primitive: PrimitiveId,
        param: String,
    },

    #[error("{primitive} parameter '{param}' is invalid: {reason}")]
    InvalidParam {
        primitive: PrimitiveId,
        param: String,
        reason: String,
    },

    #[error("Object '{id}' not found in scene")]
    ObjectNotFound { id: String },

    #[error("Push direction vector has zero magnitude")]
    ZeroDirection,
}

/// Capability shared by every primitive
pub trait ActionPrimitive: Send + Sync {
    /// Registry key
    fn id(&self) -> PrimitiveId;

    /// One-line summary of what the primitive does
    fn summary(&self) -> &'static str;

    /// Map the action onto concrete waypoints against `scene`
    fn generate_waypoints(
        &self,
        params: &Params,
        scene: &SceneState,
    ) -> Result<Vec<Waypoint>, PrimitiveError>;

    /// Fast local pre-check of the generated waypoints
    fn validate(&self, waypoints: &[Waypoint], scene: &SceneState) -> ValidationResult;

    /// Narration line for the action
    fn describe(&self, params: &Params) -> String;
}

static REGISTRY: [&dyn ActionPrimitive; 12] = [
    &Approach, &Grasp, &Release, &Translate, &Rotate, &Place, &Push, &Pour, &Stack, &Sort,
    &Inspect, &Wait,
];

/// Every registered primitive, in registry order
pub fn registry() -> &'static [&'static dyn ActionPrimitive] {
    &REGISTRY
}

/// Static implementation for an id
pub fn primitive(id: PrimitiveId) -> &'static dyn ActionPrimitive {
    match id {
        PrimitiveId::Approach => &Approach,
        PrimitiveId::Grasp => &Grasp,
        PrimitiveId::Release => &Release,
        PrimitiveId::Translate => &Translate,
        PrimitiveId::Rotate => &Rotate,
        PrimitiveId::Place => &Place,
        PrimitiveId::Push => &Push,
        PrimitiveId::Pour => &Pour,
        PrimitiveId::Stack => &Stack,
        PrimitiveId::Sort => &Sort,
        PrimitiveId::Inspect => &Inspect,
        PrimitiveId::Wait => &Wait,
    }
}

/// Resolve a primitive from a (case-insensitive) action id
pub fn get_primitive(action_id: &str) -> Result<&'static dyn ActionPrimitive, PrimitiveError> {
    action_id.parse::<PrimitiveId>().map(primitive)
}

/// Look up a scene object or fail with [`PrimitiveError::ObjectNotFound`]
pub(crate) fn scene_object<'a>(
    scene: &'a SceneState,
    id: &str,
) -> Result<&'a SceneObject, PrimitiveError> {
    scene
        .object(id)
        .ok_or_else(|| PrimitiveError::ObjectNotFound { id: id.to_string() })
}

/// First waypoint whose height is below `floor`, as a table-collision failure
pub(crate) fn check_above(
    waypoints: &[Waypoint],
    floor: f64,
    label: &str,
) -> Option<ValidationResult> {
    waypoints.iter().enumerate().find_map(|(i, wp)| {
        (wp.y < floor).then(|| {
            ValidationResult::fail(
                format!("{} waypoint {} below table (y={:.3})", label, i, wp.y),
                "table_collision",
            )
            .at_waypoint(i)
        })
    })
}

/// Failure when the gripper holds nothing
pub(crate) fn require_held(scene: &SceneState, verb: &str) -> Option<ValidationResult> {
    if scene.is_holding() {
        None
    } else {
        Some(ValidationResult::fail(
            format!("Cannot {} - no object held", verb),
            "no_object_held",
        ))
    }
}
