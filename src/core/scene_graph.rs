//! Scene analysis: pairwise spatial relations and a prompt-ready
//! description of the scene.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{SceneObject, SceneState, Vec3};

/// Max 3D distance for `near`, and min axis offset for left/right and
/// front/behind
const NEAR_THRESHOLD: f64 = 0.3;

/// Min height difference for `on_top_of`
const ON_TOP_MIN_DY: f64 = 0.075;

/// Max horizontal offset for `on_top_of`
const ON_TOP_MAX_HORIZONTAL: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    OnTopOf,
    Near,
    LeftOf,
    RightOf,
    InFrontOf,
    Behind,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::OnTopOf => "on_top_of",
            Relation::Near => "near",
            Relation::LeftOf => "left_of",
            Relation::RightOf => "right_of",
            Relation::InFrontOf => "in_front_of",
            Relation::Behind => "behind",
        }
    }
}

/// `subject relation object`, e.g. "cup on_top_of box"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpatialRelation {
    pub subject: String,
    pub relation: Relation,
    pub object: String,
}

impl SpatialRelation {
    fn new(subject: &SceneObject, relation: Relation, object: &SceneObject) -> Self {
        Self {
            subject: subject.id.clone(),
            relation,
            object: object.id.clone(),
        }
    }
}

impl fmt::Display for SpatialRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} is {} {}",
            self.subject,
            self.relation.as_str().replace('_', " "),
            self.object
        )
    }
}

/// Objects, their relations, and the robot state at analysis time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneGraph {
    pub objects: Vec<SceneObject>,
    pub relations: Vec<SpatialRelation>,
    pub table_height: f64,
    pub end_effector: Vec3,
    pub gripper_open: bool,
    pub held_object_id: Option<String>,
}

impl SceneGraph {
    /// Natural-language inventory used as language-model context
    pub fn to_description(&self) -> String {
        let mut lines = vec!["## Objects on the table:".to_string()];

        for obj in &self.objects {
            let [x, y, z] = obj.position;
            let size = obj
                .size
                .iter()
                .map(|s| format!("{:.2}", s))
                .collect::<Vec<_>>()
                .join(" x ");
            let held = if obj.is_held {
                " [CURRENTLY HELD BY ROBOT]"
            } else {
                ""
            };
            lines.push(format!(
                "- {}: {} {}, position=({:.2}, {:.2}, {:.2}), size=({}){}",
                obj.id, obj.color, obj.shape, x, y, z, size, held
            ));
        }

        if !self.relations.is_empty() {
            lines.push("\n## Spatial relationships:".to_string());
            lines.extend(self.relations.iter().map(|r| format!("- {}", r)));
        }

        let [ex, ey, ez] = self.end_effector;
        lines.push("\n## Robot state:".to_string());
        lines.push(format!("- End-effector at ({:.2}, {:.2}, {:.2})", ex, ey, ez));
        lines.push(format!(
            "- Gripper: {}",
            if self.gripper_open { "open" } else { "closed" }
        ));
        if let Some(ref held) = self.held_object_id {
            lines.push(format!("- Holding: {}", held));
        }

        lines.push(format!("\n## Table surface at y={:.2}", self.table_height));
        lines.join("\n")
    }
}

/// Pairwise relations between distinct objects
///
/// `on_top_of` takes precedence over `near`; `near` is emitted once per
/// unordered pair. Left/right and front/behind are independent of both.
pub fn compute_spatial_relations(objects: &[SceneObject]) -> Vec<SpatialRelation> {
    let mut relations = Vec::new();

    for (i, a) in objects.iter().enumerate() {
        for (j, b) in objects.iter().enumerate() {
            if i == j {
                continue;
            }

            let dx = a.position[0] - b.position[0];
            let dy = a.position[1] - b.position[1];
            let dz = a.position[2] - b.position[2];
            let horizontal = (dx * dx + dz * dz).sqrt();
            let dist = (dx * dx + dy * dy + dz * dz).sqrt();

            if dy > ON_TOP_MIN_DY && horizontal < ON_TOP_MAX_HORIZONTAL {
                relations.push(SpatialRelation::new(a, Relation::OnTopOf, b));
            } else if dist < NEAR_THRESHOLD && a.id < b.id {
                relations.push(SpatialRelation::new(a, Relation::Near, b));
            }

            if dx < -NEAR_THRESHOLD {
                relations.push(SpatialRelation::new(a, Relation::LeftOf, b));
            } else if dx > NEAR_THRESHOLD {
                relations.push(SpatialRelation::new(a, Relation::RightOf, b));
            }

            if dz < -NEAR_THRESHOLD {
                relations.push(SpatialRelation::new(a, Relation::InFrontOf, b));
            } else if dz > NEAR_THRESHOLD {
                relations.push(SpatialRelation::new(a, Relation::Behind, b));
            }
        }
    }

    relations
}

/// Build the scene graph for a snapshot
pub fn analyze_scene(scene: &SceneState) -> SceneGraph {
    let objects: Vec<SceneObject> = scene.objects.values().cloned().collect();
    let relations = compute_spatial_relations(&objects);

    SceneGraph {
        objects,
        relations,
        table_height: scene.table_height,
        end_effector: scene.end_effector,
        gripper_open: scene.gripper_open,
        held_object_id: scene.held_object_id.clone(),
    }
}
