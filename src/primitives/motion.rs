//! Free-space motion primitives: APPROACH, TRANSLATE, ROTATE, INSPECT, WAIT.

use super::params;
use super::{
    check_above, scene_object, ActionPrimitive, PrimitiveError, PrimitiveId, MAX_ANGLE_DEG,
    SAFE_LIFT,
};
use crate::domain::{Params, SceneState, ValidationResult, Vec3, Waypoint};

/// Default APPROACH offset from the target center
const APPROACH_OFFSET: Vec3 = [0.0, 0.05, 0.0];

/// Largest ROTATE increment, in degrees
const ROTATE_STEP_DEG: f64 = 15.0;

/// Fixed camera pitch for INSPECT, in degrees
const INSPECT_PITCH_DEG: f64 = -30.0;

/// Per-step angular ceiling enforced by ROTATE's local check, in degrees
const ROTATE_MAX_STEP_DEG: f64 = 90.0;

/// Move near a target object
pub struct Approach;

impl ActionPrimitive for Approach {
    fn id(&self) -> PrimitiveId {
        PrimitiveId::Approach
    }

    fn summary(&self) -> &'static str {
        "Move end-effector near a target object"
    }

    fn generate_waypoints(
        &self,
        params: &Params,
        scene: &SceneState,
    ) -> Result<Vec<Waypoint>, PrimitiveError> {
        let target = params::required_str(params, self.id(), "target")?;
        let offset = params::optional_vec3(params, self.id(), "offset")?.unwrap_or(APPROACH_OFFSET);
        let obj = scene_object(scene, target)?;

        let [ex, ey, ez] = scene.end_effector;
        let safe_y = (scene.table_height + SAFE_LIFT).max(ey);
        let goal = [
            obj.position[0] + offset[0],
            obj.position[1] + offset[1],
            obj.position[2] + offset[2],
        ];

        Ok(vec![
            Waypoint::at([ex, safe_y, ez], scene.gripper_open),
            Waypoint::at([goal[0], safe_y, goal[2]], true),
            Waypoint::at(goal, true),
        ])
    }

    fn validate(&self, waypoints: &[Waypoint], scene: &SceneState) -> ValidationResult {
        check_above(waypoints, scene.table_height, "Approach")
            .unwrap_or_else(|| ValidationResult::pass("Approach trajectory valid"))
    }

    fn describe(&self, params: &Params) -> String {
        format!("Approaching {}", params::display(params, "target", "object"))
    }
}

/// Move to an absolute position or by a relative delta
pub struct Translate;

impl Translate {
    fn target(params: &Params, scene: &SceneState) -> Result<Vec3, PrimitiveError> {
        let id = PrimitiveId::Translate;
        let position = params::optional_vec3(params, id, "position")?;
        let delta = params::optional_vec3(params, id, "delta")?;

        match (position, delta) {
            (Some(p), None) => Ok(p),
            (None, Some(d)) => {
                let e = scene.end_effector;
                Ok([e[0] + d[0], e[1] + d[1], e[2] + d[2]])
            }
            (None, None) => Err(PrimitiveError::MissingParam {
                primitive: id,
                param: "position or delta".to_string(),
            }),
            (Some(_), Some(_)) => Err(PrimitiveError::InvalidParam {
                primitive: id,
                param: "position/delta".to_string(),
                reason: "exactly one of 'position' or 'delta' must be given".to_string(),
            }),
        }
    }
}

impl ActionPrimitive for Translate {
    fn id(&self) -> PrimitiveId {
        PrimitiveId::Translate
    }

    fn summary(&self) -> &'static str {
        "Move end-effector to an absolute or relative position"
    }

    fn generate_waypoints(
        &self,
        params: &Params,
        scene: &SceneState,
    ) -> Result<Vec<Waypoint>, PrimitiveError> {
        let target = Self::target(params, scene)?;
        // A held object keeps the gripper closed for the whole carry.
        let gripper = if scene.is_holding() {
            false
        } else {
            scene.gripper_open
        };

        let [ex, ey, ez] = scene.end_effector;
        let safe_y = (scene.table_height + SAFE_LIFT).max(ey).max(target[1]);

        Ok(vec![
            Waypoint::at([ex, safe_y, ez], gripper),
            Waypoint::at([target[0], safe_y, target[2]], gripper),
            Waypoint::at(target, gripper),
        ])
    }

    fn validate(&self, waypoints: &[Waypoint], scene: &SceneState) -> ValidationResult {
        check_above(waypoints, scene.table_height, "Translate")
            .unwrap_or_else(|| ValidationResult::pass("Translation valid"))
    }

    fn describe(&self, params: &Params) -> String {
        let id = self.id();
        if let Ok(Some(p)) = params::optional_vec3(params, id, "position") {
            return format!("Moving to position ({:.2}, {:.2}, {:.2})", p[0], p[1], p[2]);
        }
        if let Ok(Some(d)) = params::optional_vec3(params, id, "delta") {
            return format!("Moving by ({:.2}, {:.2}, {:.2})", d[0], d[1], d[2]);
        }
        "Translating end-effector".to_string()
    }
}

/// Rotate the end-effector about one axis
///
/// Axis mapping is x→roll, y→yaw, z→pitch.
pub struct Rotate;

impl ActionPrimitive for Rotate {
    fn id(&self) -> PrimitiveId {
        PrimitiveId::Rotate
    }

    fn summary(&self) -> &'static str {
        "Rotate end-effector around a specified axis"
    }

    fn generate_waypoints(
        &self,
        params: &Params,
        scene: &SceneState,
    ) -> Result<Vec<Waypoint>, PrimitiveError> {
        let axis = params::required_str(params, self.id(), "axis")?;
        let degrees = params::required_f64(params, self.id(), "degrees")?;
        let degrees = params::bounded_angle(self.id(), "degrees", degrees, MAX_ANGLE_DEG)?;
        let rads = degrees.to_radians();

        let (roll, pitch, yaw) = match axis.to_ascii_lowercase().as_str() {
            "x" => (rads, 0.0, 0.0),
            "y" => (0.0, 0.0, rads),
            "z" => (0.0, rads, 0.0),
            other => {
                return Err(PrimitiveError::InvalidParam {
                    primitive: self.id(),
                    param: "axis".to_string(),
                    reason: format!("expected one of x, y, z, got '{}'", other),
                })
            }
        };

        let steps = ((degrees.abs() / ROTATE_STEP_DEG).ceil() as usize).max(2);
        let position = scene.end_effector;

        Ok((1..=steps)
            .map(|i| {
                let t = i as f64 / steps as f64;
                Waypoint::at(position, scene.gripper_open)
                    .with_roll(roll * t)
                    .with_pitch(pitch * t)
                    .with_yaw(yaw * t)
            })
            .collect())
    }

    fn validate(&self, waypoints: &[Waypoint], _scene: &SceneState) -> ValidationResult {
        let limit = ROTATE_MAX_STEP_DEG.to_radians();
        for (i, pair) in waypoints.windows(2).enumerate() {
            let (prev, curr) = (pair[0].orientation(), pair[1].orientation());
            for ((axis, before), (_, after)) in prev.iter().zip(curr.iter()) {
                if (after - before).abs() > limit {
                    return ValidationResult::fail(
                        format!("Angular velocity exceeded on {} at waypoint {}", axis, i + 1),
                        "max_angular_velocity",
                    )
                    .at_waypoint(i + 1);
                }
            }
        }
        ValidationResult::pass("Rotation valid")
    }

    fn describe(&self, params: &Params) -> String {
        format!(
            "Rotating {}° around {}-axis",
            params::display(params, "degrees", "?"),
            params::display(params, "axis", "?")
        )
    }
}

/// Position the camera above and behind a target
pub struct Inspect;

impl ActionPrimitive for Inspect {
    fn id(&self) -> PrimitiveId {
        PrimitiveId::Inspect
    }

    fn summary(&self) -> &'static str {
        "Move to observe a target for scene capture"
    }

    fn generate_waypoints(
        &self,
        params: &Params,
        scene: &SceneState,
    ) -> Result<Vec<Waypoint>, PrimitiveError> {
        let target = params::required_str(params, self.id(), "target")?;
        let distance = params::optional_f64(params, self.id(), "distance", 0.15)?;
        let obj = scene_object(scene, target)?;

        let viewpoint = [
            obj.position[0],
            obj.position[1] + distance + 0.1,
            obj.position[2] - distance,
        ];
        let look = Waypoint::at(viewpoint, true).with_pitch(INSPECT_PITCH_DEG.to_radians());

        // Second waypoint holds the pose for capture.
        Ok(vec![look, look])
    }

    fn validate(&self, waypoints: &[Waypoint], scene: &SceneState) -> ValidationResult {
        check_above(waypoints, scene.table_height, "Inspect")
            .unwrap_or_else(|| ValidationResult::pass("Inspect position valid"))
    }

    fn describe(&self, params: &Params) -> String {
        format!("Inspecting {}", params::display(params, "target", "target"))
    }
}

/// Hold the current pose
///
/// `duration_ms` and `condition` are narration metadata only.
pub struct Wait;

impl ActionPrimitive for Wait {
    fn id(&self) -> PrimitiveId {
        PrimitiveId::Wait
    }

    fn summary(&self) -> &'static str {
        "Pause execution for a duration or condition"
    }

    fn generate_waypoints(
        &self,
        params: &Params,
        scene: &SceneState,
    ) -> Result<Vec<Waypoint>, PrimitiveError> {
        let duration = params::optional_f64(params, self.id(), "duration_ms", 1000.0)?;
        if duration < 0.0 {
            return Err(PrimitiveError::InvalidParam {
                primitive: self.id(),
                param: "duration_ms".to_string(),
                reason: "must not be negative".to_string(),
            });
        }
        Ok(vec![Waypoint::at(scene.end_effector, scene.gripper_open)])
    }

    fn validate(&self, _waypoints: &[Waypoint], _scene: &SceneState) -> ValidationResult {
        ValidationResult::pass("Wait is always valid")
    }

    fn describe(&self, params: &Params) -> String {
        if params::has(params, "condition") {
            return format!("Waiting for {}", params::display(params, "condition", ""));
        }
        format!("Waiting {}ms", params::display(params, "duration_ms", "1000"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SceneObject;
    use serde_json::json;

    fn params(value: serde_json::Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    fn scene() -> SceneState {
        SceneState::with_table_height(0.5).with_object(SceneObject::new(
            "red_cube",
            "box",
            "red",
            [0.5, 0.65, 0.3],
            vec![0.1, 0.1, 0.1],
        ))
    }

    #[test]
    fn test_approach_lifts_then_descends() {
        let wps = Approach
            .generate_waypoints(&params(json!({"target": "red_cube"})), &scene())
            .unwrap();
        assert_eq!(wps.len(), 3);
        assert_eq!(wps[0].y, 1.5);
        assert_eq!(wps[1].y, 1.5);
        assert!((wps[2].y - 0.7).abs() < 1e-9);
        assert_eq!((wps[2].x, wps[2].z), (0.5, 0.3));
    }

    #[test]
    fn test_rotate_axis_mapping() {
        let s = scene();
        let y = Rotate
            .generate_waypoints(&params(json!({"axis": "y", "degrees": 90})), &s)
            .unwrap();
        let last = y.last().unwrap();
        assert!((last.yaw - 90f64.to_radians()).abs() < 1e-9);
        assert_eq!(last.pitch, 0.0);

        let z = Rotate
            .generate_waypoints(&params(json!({"axis": "z", "degrees": 90})), &s)
            .unwrap();
        assert!((z.last().unwrap().pitch - 90f64.to_radians()).abs() < 1e-9);
    }

    #[test]
    fn test_rotate_increments_bounded() {
        let wps = Rotate
            .generate_waypoints(&params(json!({"axis": "x", "degrees": 100})), &scene())
            .unwrap();
        assert_eq!(wps.len(), 7);
        let step = wps[1].roll - wps[0].roll;
        assert!(step <= 15f64.to_radians() + 1e-12);
    }

    #[test]
    fn test_rotate_small_angle_has_two_steps() {
        let wps = Rotate
            .generate_waypoints(&params(json!({"axis": "x", "degrees": 5})), &scene())
            .unwrap();
        assert_eq!(wps.len(), 2);
    }

    #[test]
    fn test_translate_requires_exactly_one_target() {
        let s = scene();
        assert!(matches!(
            Translate.generate_waypoints(&params(json!({})), &s),
            Err(PrimitiveError::MissingParam { .. })
        ));
        assert!(matches!(
            Translate.generate_waypoints(
                &params(json!({"position": [0, 1, 0], "delta": [0, 0.1, 0]})),
                &s
            ),
            Err(PrimitiveError::InvalidParam { .. })
        ));
    }

    #[test]
    fn test_wait_narration() {
        assert_eq!(Wait.describe(&params(json!({"duration_ms": 500}))), "Waiting 500ms");
        assert_eq!(
            Wait.describe(&params(json!({"condition": "the light"}))),
            "Waiting for the light"
        );
        assert_eq!(Wait.describe(&Params::new()), "Waiting 1000ms");
    }
}
