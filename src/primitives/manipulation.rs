//! Contact manipulation primitives: PUSH, POUR, SORT.

use super::params;
use super::{
    check_above, require_held, scene_object, ActionPrimitive, PrimitiveError, PrimitiveId,
    MAX_ANGLE_DEG, SAFE_LIFT,
};
use crate::domain::{Params, SceneObject, SceneState, ValidationResult, Waypoint};

/// Stand-off from the object before a push
const PUSH_APPROACH_OFFSET: f64 = 0.08;

/// Lift applied when retracting from a push
const PUSH_RETRACT_LIFT: f64 = 0.15;

/// Largest POUR tilt increment, in degrees
const POUR_STEP_DEG: f64 = 20.0;

/// Height above the container the pour happens at
const POUR_HEIGHT: f64 = 0.3;

/// Slot spacing along the sort line
const SORT_SPACING: f64 = 0.3;

/// Slack below the table tolerated by contact checks
const CONTACT_TOLERANCE: f64 = 0.01;

/// Color priority used by `criterion = "color"`; unlisted colors sort last
const COLOR_ORDER: [&str; 6] = ["red", "green", "blue", "yellow", "purple", "orange"];

/// Push an object along a direction
pub struct Push;

impl ActionPrimitive for Push {
    fn id(&self) -> PrimitiveId {
        PrimitiveId::Push
    }

    fn summary(&self) -> &'static str {
        "Push an object along a direction"
    }

    fn generate_waypoints(
        &self,
        params: &Params,
        scene: &SceneState,
    ) -> Result<Vec<Waypoint>, PrimitiveError> {
        let target = params::required_str(params, self.id(), "target")?;
        let direction = params::required_vec3(params, self.id(), "direction")?;
        let distance = params::required_f64(params, self.id(), "distance")?;
        let obj = scene_object(scene, target)?;

        let magnitude = direction.iter().map(|d| d * d).sum::<f64>().sqrt();
        if magnitude < 1e-6 {
            return Err(PrimitiveError::ZeroDirection);
        }
        let n = direction.map(|d| d / magnitude);
        let [ox, oy, oz] = obj.position;

        let approach = [
            ox - n[0] * PUSH_APPROACH_OFFSET,
            oy,
            oz - n[2] * PUSH_APPROACH_OFFSET,
        ];
        let pushed = [ox + n[0] * distance, oy + n[1] * distance, oz + n[2] * distance];
        let retract = [pushed[0], oy + PUSH_RETRACT_LIFT, pushed[2]];

        Ok(vec![
            Waypoint::at(approach, false),
            Waypoint::at(obj.position, false),
            Waypoint::at(pushed, false),
            Waypoint::at(retract, true),
        ])
    }

    fn validate(&self, waypoints: &[Waypoint], scene: &SceneState) -> ValidationResult {
        check_above(waypoints, scene.table_height - CONTACT_TOLERANCE, "Push")
            .unwrap_or_else(|| ValidationResult::pass("Push trajectory valid"))
    }

    fn describe(&self, params: &Params) -> String {
        format!(
            "Pushing {} {}m",
            params::display(params, "target", "object"),
            params::display(params, "distance", "?")
        )
    }
}

/// Tilt a held container over a target container
pub struct Pour;

impl ActionPrimitive for Pour {
    fn id(&self) -> PrimitiveId {
        PrimitiveId::Pour
    }

    fn summary(&self) -> &'static str {
        "Tilt a grasped container to pour contents"
    }

    fn generate_waypoints(
        &self,
        params: &Params,
        scene: &SceneState,
    ) -> Result<Vec<Waypoint>, PrimitiveError> {
        let container = params::required_str(params, self.id(), "target_container")?;
        let angle = params::optional_f64(params, self.id(), "angle", 90.0)?;
        let angle = params::bounded_angle(self.id(), "angle", angle, MAX_ANGLE_DEG)?;
        let obj = scene_object(scene, container)?;

        let spout = [obj.position[0], obj.position[1] + POUR_HEIGHT, obj.position[2]];
        let steps = ((angle.abs() / POUR_STEP_DEG).ceil() as usize).max(3);
        let full_tilt = angle.to_radians();

        let mut waypoints = Vec::with_capacity(steps + 3);
        waypoints.push(Waypoint::at(spout, false));
        waypoints.extend((1..=steps).map(|i| {
            let t = i as f64 / steps as f64;
            Waypoint::at(spout, false).with_roll(full_tilt * t)
        }));
        waypoints.push(Waypoint::at(spout, false).with_roll(full_tilt));
        waypoints.push(Waypoint::at(spout, false));

        Ok(waypoints)
    }

    fn validate(&self, _waypoints: &[Waypoint], scene: &SceneState) -> ValidationResult {
        require_held(scene, "pour").unwrap_or_else(|| ValidationResult::pass("Pour trajectory valid"))
    }

    fn describe(&self, params: &Params) -> String {
        format!(
            "Pouring into {} at {}°",
            params::display(params, "target_container", "container"),
            params::display(params, "angle", "90")
        )
    }
}

/// Arrange several objects in a line by a criterion
pub struct Sort;

/// Position in the color priority table (unknown colors last)
fn color_rank(color: &str) -> usize {
    let color = color.to_ascii_lowercase();
    COLOR_ORDER
        .iter()
        .position(|c| *c == color)
        .unwrap_or(COLOR_ORDER.len())
}

impl Sort {
    fn ordered<'a>(
        mut objects: Vec<&'a SceneObject>,
        criterion: &str,
        direction: &str,
    ) -> Vec<&'a SceneObject> {
        match criterion {
            "color" => objects.sort_by_key(|o| color_rank(&o.color)),
            "size" => objects.sort_by(|a, b| a.primary_extent().total_cmp(&b.primary_extent())),
            _ => objects.sort_by(|a, b| a.position[0].total_cmp(&b.position[0])),
        }
        if matches!(direction, "right_to_left" | "back_to_front") {
            objects.reverse();
        }
        objects
    }
}

impl ActionPrimitive for Sort {
    fn id(&self) -> PrimitiveId {
        PrimitiveId::Sort
    }

    fn summary(&self) -> &'static str {
        "Arrange multiple objects by a criterion"
    }

    fn generate_waypoints(
        &self,
        params: &Params,
        scene: &SceneState,
    ) -> Result<Vec<Waypoint>, PrimitiveError> {
        let ids = params::required_str_list(params, self.id(), "objects")?;
        let criterion = params::optional_str(params, self.id(), "criterion")?.unwrap_or("position");
        let direction =
            params::optional_str(params, self.id(), "direction")?.unwrap_or("left_to_right");

        let objects = ids
            .iter()
            .map(|id| scene_object(scene, id))
            .collect::<Result<Vec<_>, _>>()?;
        let objects = Self::ordered(objects, criterion, direction);

        let along_x = matches!(direction, "left_to_right" | "right_to_left");
        let start = -SORT_SPACING * (objects.len().saturating_sub(1)) as f64 / 2.0;
        let safe_y = scene.table_height + SAFE_LIFT;
        let place_y = scene.table_height + 0.1;

        let mut waypoints = Vec::with_capacity(objects.len() * 8);
        for (i, obj) in objects.iter().enumerate() {
            let slot = start + i as f64 * SORT_SPACING;
            let (px, pz) = if along_x { (slot, 0.0) } else { (0.0, slot) };
            let [ox, oy, oz] = obj.position;

            waypoints.extend([
                Waypoint::at([ox, safe_y, oz], true),
                Waypoint::at([ox, oy, oz], true),
                Waypoint::at([ox, oy, oz], false),
                Waypoint::at([ox, safe_y, oz], false),
                Waypoint::at([px, safe_y, pz], false),
                Waypoint::at([px, place_y, pz], false),
                Waypoint::at([px, place_y, pz], true),
                Waypoint::at([px, safe_y, pz], true),
            ]);
        }

        Ok(waypoints)
    }

    fn validate(&self, waypoints: &[Waypoint], scene: &SceneState) -> ValidationResult {
        check_above(waypoints, scene.table_height - CONTACT_TOLERANCE, "Sort")
            .unwrap_or_else(|| ValidationResult::pass("Sort trajectory valid"))
    }

    fn describe(&self, params: &Params) -> String {
        let criterion = params::display(params, "criterion", "position");
        let direction = params::display(params, "direction", "left_to_right");
        format!("Sorting objects by {}, {}", criterion, direction.replace('_', " "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: serde_json::Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    fn scene() -> SceneState {
        SceneState::with_table_height(0.5)
            .with_object(SceneObject::new("a", "box", "blue", [0.6, 0.6, 0.2], vec![0.1]))
            .with_object(SceneObject::new("b", "box", "red", [-0.4, 0.6, 0.2], vec![0.3]))
            .with_object(SceneObject::new("c", "box", "teal", [0.1, 0.6, 0.2], vec![0.2]))
    }

    #[test]
    fn test_push_zero_direction_rejected() {
        let err = Push
            .generate_waypoints(
                &params(json!({"target": "a", "direction": [0, 0, 0], "distance": 0.1})),
                &scene(),
            )
            .unwrap_err();
        assert_eq!(err, PrimitiveError::ZeroDirection);
    }

    #[test]
    fn test_push_normalizes_direction() {
        let wps = Push
            .generate_waypoints(
                &params(json!({"target": "a", "direction": [2, 0, 0], "distance": 0.1})),
                &scene(),
            )
            .unwrap();
        assert_eq!(wps.len(), 4);
        assert!((wps[0].x - 0.52).abs() < 1e-9);
        assert!((wps[2].x - 0.7).abs() < 1e-9);
        assert!((wps[3].y - 0.75).abs() < 1e-9);
        assert!(wps[3].gripper_open);
    }

    #[test]
    fn test_pour_tilt_increments() {
        let wps = Pour
            .generate_waypoints(&params(json!({"target_container": "a"})), &scene())
            .unwrap();
        // position + 5 tilt steps + hold + upright
        assert_eq!(wps.len(), 8);
        assert_eq!(wps[0].roll, 0.0);
        assert!((wps[5].roll - 90f64.to_radians()).abs() < 1e-9);
        assert_eq!(wps[7].roll, 0.0);
        assert!(wps.iter().all(|w| !w.gripper_open));
    }

    #[test]
    fn test_sort_by_color_unknown_last() {
        let wps = Sort
            .generate_waypoints(
                &params(json!({"objects": ["a", "b", "c"], "criterion": "color"})),
                &scene(),
            )
            .unwrap();
        assert_eq!(wps.len(), 24);
        // red first, then blue, then teal
        assert_eq!(wps[1].x, -0.4);
        assert_eq!(wps[9].x, 0.6);
        assert_eq!(wps[17].x, 0.1);
        // slots centered around zero along X
        assert!((wps[5].x + 0.3).abs() < 1e-9);
        assert!((wps[13].x).abs() < 1e-9);
        assert!((wps[21].x - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_sort_front_to_back_uses_z() {
        let wps = Sort
            .generate_waypoints(
                &params(json!({"objects": ["a", "b"], "direction": "back_to_front"})),
                &scene(),
            )
            .unwrap();
        // position order is b, a; reversed gives a, b
        assert_eq!(wps[1].x, 0.6);
        assert_eq!(wps[5].x, 0.0);
        assert!((wps[5].z + 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_sort_narration() {
        let text = Sort.describe(&params(json!({"criterion": "size", "direction": "right_to_left"})));
        assert_eq!(text, "Sorting objects by size, right to left");
    }
}
