//! Safety constraint engine.
//!
//! Stateless checks over a waypoint sequence:
//! - Workspace bounds (axis-aligned box)
//! - Table surface collision
//! - Linear and angular velocity between consecutive waypoints
//! - Single-hop distance ceiling
//! - Obstacle clearance (warning only)
//!
//! [`validate_trajectory`] is the single gate: a trajectory carrying any
//! error-severity violation is never reported safe.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{distance, SceneState, Waypoint};

/// Axis-aligned bounding box for the robot workspace (inclusive)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceBounds {
    #[serde(default = "default_x_min")]
    pub x_min: f64,
    #[serde(default = "default_x_max")]
    pub x_max: f64,
    #[serde(default = "default_y_min")]
    pub y_min: f64,
    #[serde(default = "default_y_max")]
    pub y_max: f64,
    #[serde(default = "default_z_min")]
    pub z_min: f64,
    #[serde(default = "default_z_max")]
    pub z_max: f64,
}

fn default_x_min() -> f64 {
    -1.5
}
fn default_x_max() -> f64 {
    1.5
}
fn default_y_min() -> f64 {
    0.0
}
fn default_y_max() -> f64 {
    3.0
}
fn default_z_min() -> f64 {
    -1.5
}
fn default_z_max() -> f64 {
    1.5
}

impl Default for WorkspaceBounds {
    fn default() -> Self {
        Self {
            x_min: default_x_min(),
            x_max: default_x_max(),
            y_min: default_y_min(),
            y_max: default_y_max(),
            z_min: default_z_min(),
            z_max: default_z_max(),
        }
    }
}

impl WorkspaceBounds {
    /// `(axis, value, min, max)` for each axis of a waypoint
    fn axes(&self, wp: &Waypoint) -> [(&'static str, f64, f64, f64); 3] {
        [
            ("x", wp.x, self.x_min, self.x_max),
            ("y", wp.y, self.y_min, self.y_max),
            ("z", wp.z, self.z_min, self.z_max),
        ]
    }
}

/// Safety thresholds for trajectory validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyConfig {
    #[serde(default)]
    pub workspace: WorkspaceBounds,

    /// Table surface height in meters (default: 0.5)
    #[serde(default = "default_table_height")]
    pub table_height: f64,

    /// Tolerance below the table surface (default: 0.01)
    #[serde(default = "default_table_collision_margin")]
    pub table_collision_margin: f64,

    /// Max end-effector speed in m/s (default: 1.0)
    #[serde(default = "default_max_linear_velocity")]
    pub max_linear_velocity_mps: f64,

    /// Max per-axis rotation rate in degrees/s (default: 90)
    #[serde(default = "default_max_angular_velocity")]
    pub max_angular_velocity_dps: f64,

    /// Max gripper force in newtons (default: 20). Not used by geometry checks.
    #[serde(default = "default_max_gripper_force")]
    pub max_gripper_force_n: f64,

    /// Min clearance from scene objects in meters (default: 0.02)
    #[serde(default = "default_min_obstacle_clearance")]
    pub min_obstacle_clearance_m: f64,

    /// Max distance of a single hop in meters (default: 2.0)
    #[serde(default = "default_max_waypoint_distance")]
    pub max_waypoint_distance_m: f64,

    /// Assumed seconds between consecutive waypoints (default: 1.0)
    #[serde(default = "default_assumed_dt")]
    pub assumed_dt: f64,
}

fn default_table_height() -> f64 {
    0.5
}
fn default_table_collision_margin() -> f64 {
    0.01
}
fn default_max_linear_velocity() -> f64 {
    1.0
}
fn default_max_angular_velocity() -> f64 {
    90.0
}
fn default_max_gripper_force() -> f64 {
    20.0
}
fn default_min_obstacle_clearance() -> f64 {
    0.02
}
fn default_max_waypoint_distance() -> f64 {
    2.0
}
fn default_assumed_dt() -> f64 {
    1.0
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            workspace: WorkspaceBounds::default(),
            table_height: default_table_height(),
            table_collision_margin: default_table_collision_margin(),
            max_linear_velocity_mps: default_max_linear_velocity(),
            max_angular_velocity_dps: default_max_angular_velocity(),
            max_gripper_force_n: default_max_gripper_force(),
            min_obstacle_clearance_m: default_min_obstacle_clearance(),
            max_waypoint_distance_m: default_max_waypoint_distance(),
            assumed_dt: default_assumed_dt(),
        }
    }
}

/// Whether a violation makes the trajectory unsafe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A single constraint violation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintViolation {
    /// Constraint tag (e.g. "table_collision", "workspace_bounds_x")
    pub constraint_name: String,

    /// Human-readable explanation
    pub message: String,

    /// Offending waypoint; `None` for trajectory-wide failures
    pub waypoint_index: Option<usize>,

    pub severity: Severity,
}

impl ConstraintViolation {
    fn error(name: impl Into<String>, message: String, index: usize) -> Self {
        Self {
            constraint_name: name.into(),
            message,
            waypoint_index: Some(index),
            severity: Severity::Error,
        }
    }

    fn warning(name: impl Into<String>, message: String, index: usize) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(name, message, index)
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Waypoints with a NaN or infinite coordinate or angle
///
/// NaN never trips a `<`/`>` limit, so the range checks cannot see it.
pub fn check_finite_pose(waypoints: &[Waypoint]) -> Vec<ConstraintViolation> {
    waypoints
        .iter()
        .enumerate()
        .filter_map(|(i, wp)| {
            let coords = [("x", wp.x), ("y", wp.y), ("z", wp.z)];
            let bad: Vec<&str> = coords
                .into_iter()
                .chain(wp.orientation())
                .filter(|(_, v)| !v.is_finite())
                .map(|(name, _)| name)
                .collect();
            (!bad.is_empty()).then(|| {
                ConstraintViolation::error(
                    "non_finite_pose",
                    format!("Waypoint {}: non-finite {}", i, bad.join(", ")),
                    i,
                )
            })
        })
        .collect()
}

/// One out-of-range violation per breached axis
pub fn check_workspace_bounds(
    waypoints: &[Waypoint],
    config: &SafetyConfig,
) -> Vec<ConstraintViolation> {
    let mut violations = Vec::new();

    for (i, wp) in waypoints.iter().enumerate() {
        for (axis, value, min, max) in config.workspace.axes(wp) {
            if value < min || value > max {
                violations.push(ConstraintViolation::error(
                    format!("workspace_bounds_{}", axis),
                    format!(
                        "Waypoint {}: {}={:.3} outside [{}, {}]",
                        i, axis, value, min, max
                    ),
                    i,
                ));
            }
        }
    }

    violations
}

/// Waypoints below `table_height - table_collision_margin`
pub fn check_table_collision(
    waypoints: &[Waypoint],
    config: &SafetyConfig,
) -> Vec<ConstraintViolation> {
    let threshold = config.table_height - config.table_collision_margin;

    waypoints
        .iter()
        .enumerate()
        .filter(|(_, wp)| wp.y < threshold)
        .map(|(i, wp)| {
            ConstraintViolation::error(
                "table_collision",
                format!(
                    "Waypoint {}: y={:.3} below table surface at {:.3}",
                    i, wp.y, config.table_height
                ),
                i,
            )
        })
        .collect()
}

/// Hop distance over `assumed_dt` against the linear limit
pub fn check_linear_velocity(
    waypoints: &[Waypoint],
    config: &SafetyConfig,
) -> Vec<ConstraintViolation> {
    let dt = config.assumed_dt;

    hops(waypoints)
        .filter_map(|(i, prev, curr)| {
            let dist = prev.distance_to(curr);
            let velocity = dist / dt;
            (velocity > config.max_linear_velocity_mps).then(|| {
                ConstraintViolation::error(
                    "max_linear_velocity",
                    format!(
                        "Waypoint {}: linear velocity {:.3} m/s exceeds limit {:.3} m/s (distance {:.3}m in {}s)",
                        i, velocity, config.max_linear_velocity_mps, dist, dt
                    ),
                    i,
                )
            })
        })
        .collect()
}

/// Per-axis (roll, pitch, yaw) rotation rate against the angular limit
pub fn check_angular_velocity(
    waypoints: &[Waypoint],
    config: &SafetyConfig,
) -> Vec<ConstraintViolation> {
    let dt = config.assumed_dt;
    let max_rad = config.max_angular_velocity_dps.to_radians();
    let mut violations = Vec::new();

    for (i, prev, curr) in hops(waypoints) {
        for ((axis, before), (_, after)) in prev.orientation().into_iter().zip(curr.orientation()) {
            let rate = (after - before).abs() / dt;
            if rate > max_rad {
                violations.push(ConstraintViolation::error(
                    format!("max_angular_velocity_{}", axis),
                    format!(
                        "Waypoint {}: {} angular velocity {:.1} °/s exceeds limit {:.1} °/s",
                        i,
                        axis,
                        rate.to_degrees(),
                        config.max_angular_velocity_dps
                    ),
                    i,
                ));
            }
        }
    }

    violations
}

/// Hops longer than `max_waypoint_distance_m`, regardless of timing
pub fn check_waypoint_distance(
    waypoints: &[Waypoint],
    config: &SafetyConfig,
) -> Vec<ConstraintViolation> {
    hops(waypoints)
        .filter_map(|(i, prev, curr)| {
            let dist = prev.distance_to(curr);
            (dist > config.max_waypoint_distance_m).then(|| {
                ConstraintViolation::error(
                    "max_waypoint_distance",
                    format!(
                        "Waypoint {}: distance {:.3}m from previous exceeds max {:.3}m",
                        i, dist, config.max_waypoint_distance_m
                    ),
                    i,
                )
            })
        })
        .collect()
}

/// Bounding-sphere clearance from every non-held object (warnings only)
pub fn check_obstacle_clearance(
    waypoints: &[Waypoint],
    scene: &SceneState,
    config: &SafetyConfig,
) -> Vec<ConstraintViolation> {
    let min_clearance = config.min_obstacle_clearance_m;
    let mut violations = Vec::new();

    for (i, wp) in waypoints.iter().enumerate() {
        for (id, obj) in &scene.objects {
            if scene.held_object_id.as_deref() == Some(id.as_str()) {
                continue;
            }

            let clearance = distance(wp.position(), obj.position) - obj.bounding_radius();
            if clearance < min_clearance {
                violations.push(ConstraintViolation::warning(
                    "obstacle_clearance",
                    format!(
                        "Waypoint {}: clearance {:.3}m from '{}' below minimum {:.3}m",
                        i, clearance, id, min_clearance
                    ),
                    i,
                ));
            }
        }
    }

    violations
}

/// Consecutive pairs, tagged with the index of the later waypoint
fn hops(waypoints: &[Waypoint]) -> impl Iterator<Item = (usize, &Waypoint, &Waypoint)> {
    waypoints
        .windows(2)
        .enumerate()
        .map(|(i, pair)| (i + 1, &pair[0], &pair[1]))
}

/// Aggregate outcome of [`validate_trajectory`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyValidationResult {
    pub is_safe: bool,

    /// Error-severity violations
    pub violations: Vec<ConstraintViolation>,

    /// Warning-severity violations
    pub warnings: Vec<ConstraintViolation>,

    pub summary: String,
}

impl SafetyValidationResult {
    /// First error-severity violation, if any
    pub fn first_violation(&self) -> Option<&ConstraintViolation> {
        self.violations.first()
    }

    /// Serializable report with counts
    pub fn report(&self) -> SafetyReport {
        SafetyReport {
            is_safe: self.is_safe,
            error_count: self.violations.len(),
            warning_count: self.warnings.len(),
            summary: self.summary.clone(),
            violations: self.violations.iter().map(ViolationEntry::from).collect(),
            warnings: self.warnings.iter().map(ViolationEntry::from).collect(),
        }
    }
}

/// Flattened safety report for the transport layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyReport {
    pub is_safe: bool,
    pub error_count: usize,
    pub warning_count: usize,
    pub summary: String,
    pub violations: Vec<ViolationEntry>,
    pub warnings: Vec<ViolationEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationEntry {
    pub constraint: String,
    pub message: String,
    pub waypoint_index: Option<usize>,
}

impl From<&ConstraintViolation> for ViolationEntry {
    fn from(v: &ConstraintViolation) -> Self {
        Self {
            constraint: v.constraint_name.clone(),
            message: v.message.clone(),
            waypoint_index: v.waypoint_index,
        }
    }
}

impl SafetyConfig {
    /// Copy of this config whose table is at least as high as `scene`'s
    pub fn for_scene(&self, scene: &SceneState) -> SafetyConfig {
        SafetyConfig {
            table_height: self.table_height.max(scene.table_height),
            ..self.clone()
        }
    }
}

/// Run every check over a waypoint sequence
///
/// With a scene, the table check uses the higher of the configured and
/// observed table heights, and obstacle clearance runs (warnings only).
pub fn validate_trajectory(
    waypoints: &[Waypoint],
    scene: Option<&SceneState>,
    config: &SafetyConfig,
) -> SafetyValidationResult {
    let scoped;
    let config = match scene {
        Some(scene) => {
            scoped = config.for_scene(scene);
            &scoped
        }
        None => config,
    };

    if waypoints.is_empty() {
        return SafetyValidationResult {
            is_safe: false,
            violations: vec![ConstraintViolation {
                constraint_name: "empty_trajectory".to_string(),
                message: "No waypoints provided".to_string(),
                waypoint_index: None,
                severity: Severity::Error,
            }],
            warnings: Vec::new(),
            summary: "Trajectory is empty".to_string(),
        };
    }

    let mut issues = check_finite_pose(waypoints);
    issues.extend(check_workspace_bounds(waypoints, config));
    issues.extend(check_table_collision(waypoints, config));
    issues.extend(check_linear_velocity(waypoints, config));
    issues.extend(check_angular_velocity(waypoints, config));
    issues.extend(check_waypoint_distance(waypoints, config));
    if let Some(scene) = scene {
        issues.extend(check_obstacle_clearance(waypoints, scene, config));
    }

    let (violations, warnings): (Vec<_>, Vec<_>) =
        issues.into_iter().partition(ConstraintViolation::is_error);
    let is_safe = violations.is_empty();
    debug!(
        waypoints = waypoints.len(),
        errors = violations.len(),
        warnings = warnings.len(),
        "Trajectory validated"
    );
    if violations.iter().any(|v| v.constraint_name == "non_finite_pose") {
        warn!("Trajectory contains non-finite poses");
    }

    let summary = match (violations.first(), warnings.is_empty()) {
        (None, true) => format!(
            "Trajectory valid: {} waypoints passed all safety checks",
            waypoints.len()
        ),
        (None, false) => format!(
            "Trajectory valid with {} warning(s): {}",
            warnings.len(),
            warnings
                .iter()
                .take(3)
                .map(|w| w.message.as_str())
                .collect::<Vec<_>>()
                .join("; ")
        ),
        (Some(first), _) => format!(
            "Trajectory UNSAFE: {} violation(s). First: {}",
            violations.len(),
            first.message
        ),
    };

    SafetyValidationResult {
        is_safe,
        violations,
        warnings,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wp(x: f64, y: f64, z: f64) -> Waypoint {
        Waypoint::at([x, y, z], true)
    }

    #[test]
    fn test_default_config() {
        let config = SafetyConfig::default();
        assert_eq!(config.table_height, 0.5);
        assert_eq!(config.max_linear_velocity_mps, 1.0);
        assert_eq!(config.workspace.y_max, 3.0);
    }

    #[test]
    fn test_partial_yaml_override() {
        let config: SafetyConfig =
            serde_yaml::from_str("max_linear_velocity_mps: 0.5\nworkspace:\n  x_max: 1.0\n").unwrap();
        assert_eq!(config.max_linear_velocity_mps, 0.5);
        assert_eq!(config.workspace.x_max, 1.0);
        assert_eq!(config.workspace.x_min, -1.5);
        assert_eq!(config.assumed_dt, 1.0);
    }

    #[test]
    fn test_hop_index_is_later_waypoint() {
        let config = SafetyConfig::default();
        let path = [wp(0.0, 1.0, 0.0), wp(0.0, 1.0, 0.0), wp(1.2, 1.0, 0.0)];
        let violations = check_linear_velocity(&path, &config);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].waypoint_index, Some(2));
    }

    #[test]
    fn test_angular_limit_is_per_axis() {
        let config = SafetyConfig::default();
        let path = [
            wp(0.0, 1.0, 0.0),
            wp(0.0, 1.0, 0.0).with_roll(100f64.to_radians()).with_yaw(100f64.to_radians()),
        ];
        let names: Vec<_> = check_angular_velocity(&path, &config)
            .into_iter()
            .map(|v| v.constraint_name)
            .collect();
        assert_eq!(names, vec!["max_angular_velocity_roll", "max_angular_velocity_yaw"]);
    }

    #[test]
    fn test_warnings_do_not_fail() {
        use crate::domain::SceneObject;

        let scene = SceneState::default()
            .with_object(SceneObject::new("box", "box", "red", [0.0, 1.0, 0.0], vec![0.2]));
        let result = validate_trajectory(&[wp(0.0, 1.0, 0.0)], Some(&scene), &SafetyConfig::default());
        assert!(result.is_safe);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.summary.starts_with("Trajectory valid with 1 warning(s)"));
    }
}
