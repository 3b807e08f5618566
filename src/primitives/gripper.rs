//! Gripper primitives: GRASP, RELEASE, PLACE, STACK.

use super::params;
use super::{
    check_above, require_held, scene_object, ActionPrimitive, PrimitiveError, PrimitiveId,
    SAFE_LIFT,
};
use crate::domain::{Params, SceneState, ValidationResult, Vec3, Waypoint};

/// Clearance above a support surface when setting an object down
const SET_DOWN_CLEARANCE: f64 = 0.05;

/// Slack below the table tolerated by placement checks
const PLACE_TOLERANCE: f64 = 0.01;

/// Close the gripper on a target object
pub struct Grasp;

impl ActionPrimitive for Grasp {
    fn id(&self) -> PrimitiveId {
        PrimitiveId::Grasp
    }

    fn summary(&self) -> &'static str {
        "Close gripper to grasp a target object"
    }

    fn generate_waypoints(
        &self,
        params: &Params,
        scene: &SceneState,
    ) -> Result<Vec<Waypoint>, PrimitiveError> {
        let target = params::required_str(params, self.id(), "target")?;
        let obj = scene_object(scene, target)?;

        Ok(vec![
            Waypoint::at(obj.position, true),
            Waypoint::at(obj.position, false),
        ])
    }

    fn validate(&self, _waypoints: &[Waypoint], scene: &SceneState) -> ValidationResult {
        match scene.held_object_id {
            Some(ref held) => ValidationResult::fail(
                format!("Already holding object '{}'", held),
                "gripper_occupied",
            ),
            None => ValidationResult::pass("Grasp valid"),
        }
    }

    fn describe(&self, params: &Params) -> String {
        format!("Grasping {}", params::display(params, "target", "object"))
    }
}

/// Open the gripper where it is
pub struct Release;

impl ActionPrimitive for Release {
    fn id(&self) -> PrimitiveId {
        PrimitiveId::Release
    }

    fn summary(&self) -> &'static str {
        "Open gripper to release held object"
    }

    fn generate_waypoints(
        &self,
        _params: &Params,
        scene: &SceneState,
    ) -> Result<Vec<Waypoint>, PrimitiveError> {
        Ok(vec![Waypoint::at(scene.end_effector, true)])
    }

    fn validate(&self, _waypoints: &[Waypoint], scene: &SceneState) -> ValidationResult {
        if scene.is_holding() {
            ValidationResult::pass("Release valid")
        } else {
            ValidationResult::warning("No object currently held - release is a no-op", "no_object_held")
        }
    }

    fn describe(&self, _params: &Params) -> String {
        "Releasing object".to_string()
    }
}

/// Set the held object down at a position or on top of another object
pub struct Place;

impl Place {
    fn target(params: &Params, scene: &SceneState) -> Result<Vec3, PrimitiveError> {
        let id = PrimitiveId::Place;
        if let Some(position) = params::optional_vec3(params, id, "position")? {
            return Ok(position);
        }
        if let Some(support) = params::optional_str(params, id, "target")? {
            let obj = scene_object(scene, support)?;
            return Ok([
                obj.position[0],
                obj.position[1] + obj.height() / 2.0 + SET_DOWN_CLEARANCE,
                obj.position[2],
            ]);
        }
        let e = scene.end_effector;
        Ok([e[0], scene.table_height + SET_DOWN_CLEARANCE, e[2]])
    }
}

impl ActionPrimitive for Place {
    fn id(&self) -> PrimitiveId {
        PrimitiveId::Place
    }

    fn summary(&self) -> &'static str {
        "Place held object at a target location"
    }

    fn generate_waypoints(
        &self,
        params: &Params,
        scene: &SceneState,
    ) -> Result<Vec<Waypoint>, PrimitiveError> {
        let target = Self::target(params, scene)?;
        let gentle = params::optional_bool(params, self.id(), "gentle", true)?;

        let safe_y = (scene.table_height + SAFE_LIFT).max(target[1] + 0.2);
        let descent_y = target[1] + if gentle { 0.02 } else { 0.05 };
        let above = [target[0], safe_y, target[2]];
        let contact = [target[0], descent_y, target[2]];

        Ok(vec![
            Waypoint::at(above, false),
            Waypoint::at(contact, false),
            Waypoint::at(contact, true),
            Waypoint::at(above, true),
        ])
    }

    fn validate(&self, waypoints: &[Waypoint], scene: &SceneState) -> ValidationResult {
        require_held(scene, "place")
            .or_else(|| check_above(waypoints, scene.table_height - PLACE_TOLERANCE, "Placement"))
            .unwrap_or_else(|| ValidationResult::pass("Placement valid"))
    }

    fn describe(&self, params: &Params) -> String {
        if let Ok(Some(support)) = params::optional_str(params, self.id(), "target") {
            return format!("Placing object on {}", support);
        }
        if let Ok(Some(p)) = params::optional_vec3(params, self.id(), "position") {
            return format!("Placing object at ({:.2}, {:.2}, {:.2})", p[0], p[1], p[2]);
        }
        "Placing object".to_string()
    }
}

/// Put the held object on top of a target object
pub struct Stack;

impl ActionPrimitive for Stack {
    fn id(&self) -> PrimitiveId {
        PrimitiveId::Stack
    }

    fn summary(&self) -> &'static str {
        "Place held object on top of a target object"
    }

    fn generate_waypoints(
        &self,
        params: &Params,
        scene: &SceneState,
    ) -> Result<Vec<Waypoint>, PrimitiveError> {
        let target = params::required_str(params, self.id(), "target")?;
        let obj = scene_object(scene, target)?;

        let stack_y = obj.position[1] + obj.height() / 2.0 + SET_DOWN_CLEARANCE;
        let safe_y = stack_y + 0.25;
        let above = [obj.position[0], safe_y, obj.position[2]];
        let contact = [obj.position[0], stack_y, obj.position[2]];

        Ok(vec![
            Waypoint::at(above, false),
            Waypoint::at(contact, false),
            Waypoint::at(contact, true),
            Waypoint::at(above, true),
        ])
    }

    fn validate(&self, _waypoints: &[Waypoint], scene: &SceneState) -> ValidationResult {
        require_held(scene, "stack").unwrap_or_else(|| ValidationResult::pass("Stack trajectory valid"))
    }

    fn describe(&self, params: &Params) -> String {
        format!("Stacking object on {}", params::display(params, "target", "target"))
    }
}
