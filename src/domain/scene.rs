//! Scene snapshot types and raw scene parsing.
//!
//! The scene collaborator sends a loosely-typed JSON document. Every field
//! is optional except `objects[].id`; missing fields take the defaults
//! documented on [`RawScene`] and [`RawObject`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::waypoint::Vec3;

/// Fallback extent used when an object carries no size
pub const DEFAULT_OBJECT_EXTENT: f64 = 0.1;

/// An object tracked in the scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    /// Unique key within the scene
    pub id: String,

    /// Shape name (e.g. "box", "cylinder", "sphere")
    pub shape: String,

    /// Color name or hex string
    pub color: String,

    /// Center position in world frame
    pub position: Vec3,

    /// 1-3 extents; `size[1]` is used as the height when present
    pub size: Vec<f64>,

    /// Mass in kg (informational)
    #[serde(default)]
    pub mass: f64,

    /// Whether the gripper currently holds this object
    #[serde(default)]
    pub is_held: bool,
}

impl SceneObject {
    /// Create an unheld object with zero mass
    pub fn new(
        id: impl Into<String>,
        shape: impl Into<String>,
        color: impl Into<String>,
        position: Vec3,
        size: Vec<f64>,
    ) -> Self {
        Self {
            id: id.into(),
            shape: shape.into(),
            color: color.into(),
            position,
            size,
            mass: 0.0,
            is_held: false,
        }
    }

    /// Height used for stacking math: `size[1]`, else `size[0]`
    pub fn height(&self) -> f64 {
        match self.size.as_slice() {
            [_, h, ..] => *h,
            [s] => *s,
            [] => DEFAULT_OBJECT_EXTENT,
        }
    }

    /// Radius of the conservative bounding sphere, `max(size) / 2`
    pub fn bounding_radius(&self) -> f64 {
        self.size
            .iter()
            .copied()
            .reduce(f64::max)
            .map(|m| m / 2.0)
            .unwrap_or(DEFAULT_OBJECT_EXTENT)
    }

    /// First extent, used as the size sort key (0 when empty)
    pub fn primary_extent(&self) -> f64 {
        self.size.first().copied().unwrap_or(0.0)
    }
}

/// Snapshot of the tracked objects and the robot end-effector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneState {
    pub objects: BTreeMap<String, SceneObject>,
    pub end_effector: Vec3,
    pub gripper_open: bool,
    pub held_object_id: Option<String>,
    pub table_height: f64,
}

impl Default for SceneState {
    fn default() -> Self {
        Self {
            objects: BTreeMap::new(),
            end_effector: default_end_effector(),
            gripper_open: true,
            held_object_id: None,
            table_height: default_table_height(),
        }
    }
}

impl SceneState {
    /// Empty scene with the given table height
    pub fn with_table_height(table_height: f64) -> Self {
        Self {
            table_height,
            ..Default::default()
        }
    }

    /// Add (or replace) an object, keyed by its id
    pub fn with_object(mut self, object: SceneObject) -> Self {
        self.objects.insert(object.id.clone(), object);
        self
    }

    pub fn object(&self, id: &str) -> Option<&SceneObject> {
        self.objects.get(id)
    }

    pub fn is_holding(&self) -> bool {
        self.held_object_id.is_some()
    }

    /// Parse a raw scene document from the scene collaborator
    pub fn from_value(value: &Value) -> Result<Self, SceneError> {
        let raw: RawScene = serde_json::from_value(value.clone())
            .map_err(|e| SceneError::Malformed(e.to_string()))?;
        raw.into_scene()
    }

    /// Parse a raw scene document from a JSON string
    pub fn from_json(json: &str) -> Result<Self, SceneError> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| SceneError::Malformed(e.to_string()))?;
        Self::from_value(&value)
    }
}

/// Errors raised while turning a raw scene into a [`SceneState`]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SceneError {
    #[error("Scene data is malformed: {0}")]
    Malformed(String),

    #[error("Duplicate object id '{0}' in scene")]
    DuplicateObject(String),

    #[error("Held object '{0}' is not present in the scene")]
    UnknownHeldObject(String),
}

/// Raw scene document, as sent by the frontend
///
/// Defaults: `end_effector=[0, 1.5, 0]`, `gripper_open=true`,
/// `held_object_id=null`, `table_height=0.5`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawScene {
    #[serde(default)]
    pub objects: Vec<RawObject>,

    #[serde(default = "default_end_effector")]
    pub end_effector: Vec3,

    #[serde(default = "default_true")]
    pub gripper_open: bool,

    #[serde(default)]
    pub held_object_id: Option<String>,

    #[serde(default = "default_table_height")]
    pub table_height: f64,
}

/// Raw object entry
///
/// Defaults: `shape="box"`, `color="unknown"`, `position=[0,0,0]`,
/// `size=[0.1]`, `mass=0`, `is_held=false`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawObject {
    pub id: String,

    #[serde(default = "default_shape")]
    pub shape: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub position: Vec3,

    #[serde(default = "default_size")]
    pub size: Vec<f64>,

    #[serde(default)]
    pub mass: f64,

    #[serde(default)]
    pub is_held: bool,
}

fn default_end_effector() -> Vec3 {
    [0.0, 1.5, 0.0]
}
fn default_table_height() -> f64 {
    0.5
}
fn default_true() -> bool {
    true
}
fn default_shape() -> String {
    "box".to_string()
}
fn default_color() -> String {
    "unknown".to_string()
}
fn default_size() -> Vec<f64> {
    vec![DEFAULT_OBJECT_EXTENT]
}

impl RawScene {
    /// Convert into a [`SceneState`], enforcing id uniqueness and the
    /// held-object invariant
    pub fn into_scene(self) -> Result<SceneState, SceneError> {
        let mut objects = BTreeMap::new();

        for raw in self.objects {
            if objects.contains_key(&raw.id) {
                return Err(SceneError::DuplicateObject(raw.id));
            }
            let object = SceneObject {
                id: raw.id.clone(),
                shape: raw.shape,
                color: raw.color,
                position: raw.position,
                size: raw.size,
                mass: raw.mass,
                is_held: raw.is_held,
            };
            objects.insert(raw.id, object);
        }

        if let Some(ref held) = self.held_object_id {
            match objects.get_mut(held) {
                Some(obj) => obj.is_held = true,
                None => return Err(SceneError::UnknownHeldObject(held.clone())),
            }
        }

        Ok(SceneState {
            objects,
            end_effector: self.end_effector,
            gripper_open: self.gripper_open,
            held_object_id: self.held_object_id,
            table_height: self.table_height,
        })
    }
}
