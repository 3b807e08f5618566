//! Action Primitive Integration Tests
//!
//! Waypoint generation, local validation and narration for each of the
//! twelve primitives.

use kinesys::domain::{Params, SceneObject, SceneState, ValidationStatus, Waypoint};
use kinesys::primitives::{get_primitive, registry, ActionPrimitive, PrimitiveError, PrimitiveId};
use serde_json::{json, Value};

fn params(value: Value) -> Params {
    value.as_object().cloned().unwrap_or_default()
}

fn prim(id: &str) -> &'static dyn ActionPrimitive {
    get_primitive(id).unwrap()
}

fn generate(id: &str, p: Value, scene: &SceneState) -> Vec<Waypoint> {
    prim(id).generate_waypoints(&params(p), scene).unwrap()
}

fn generate_err(id: &str, p: Value, scene: &SceneState) -> PrimitiveError {
    prim(id).generate_waypoints(&params(p), scene).unwrap_err()
}

fn describe(id: &str, p: Value) -> String {
    prim(id).describe(&params(p))
}

fn scene() -> SceneState {
    SceneState::default()
        .with_object(SceneObject::new("red_cube", "box", "red", [0.5, 0.65, 0.3], vec![0.2, 0.2, 0.2]))
        .with_object(SceneObject::new("blue_cylinder", "cylinder", "blue", [-0.5, 0.7, 0.6], vec![0.1, 0.3]))
        .with_object(SceneObject::new("green_sphere", "sphere", "green", [0.3, 0.67, -0.5], vec![0.12]))
}

fn scene_holding() -> SceneState {
    let mut scene = scene();
    scene.held_object_id = Some("red_cube".to_string());
    scene.gripper_open = false;
    if let Some(cube) = scene.objects.get_mut("red_cube") {
        cube.is_held = true;
    }
    scene
}

// Registry

#[test]
fn test_all_twelve_registered() {
    assert_eq!(registry().len(), 12);
    for (p, id) in registry().iter().zip(PrimitiveId::ALL) {
        assert_eq!(p.id(), id);
    }
}

#[test]
fn test_lookup_case_insensitive() {
    assert_eq!(prim("approach").id(), PrimitiveId::Approach);
    let err = get_primitive("NONEXISTENT").err().unwrap();
    assert!(err.to_string().starts_with("Unknown action primitive 'NONEXISTENT'"));
}

// APPROACH

#[test]
fn test_approach() {
    let scene = scene();
    let wps = generate("APPROACH", json!({"target": "red_cube"}), &scene);

    assert_eq!(wps.len(), 3);
    assert!(wps.iter().all(|w| w.gripper_open));
    let last = wps[2];
    assert!((last.x - 0.5).abs() < 0.2 && (last.z - 0.3).abs() < 0.2);
    assert!(prim("APPROACH").validate(&wps, &scene).passed());
}

#[test]
fn test_approach_below_table_fails() {
    let result = prim("APPROACH").validate(&[Waypoint::at([0.0, 0.1, 0.0], true)], &scene());
    assert!(result.failed());
    assert_eq!(result.waypoint_index, Some(0));
}

#[test]
fn test_approach_unknown_target() {
    let err = generate_err("APPROACH", json!({"target": "nonexistent"}), &scene());
    assert_eq!(err.to_string(), "Object 'nonexistent' not found in scene");
    assert!(describe("APPROACH", json!({"target": "red_cube"})).contains("red_cube"));
}

// GRASP / RELEASE

#[test]
fn test_grasp_closes_gripper() {
    let wps = generate("GRASP", json!({"target": "red_cube"}), &scene());
    assert_eq!(wps.len(), 2);
    assert!(wps[0].gripper_open);
    assert!(!wps[1].gripper_open);
    assert!(describe("GRASP", json!({"target": "cube"})).contains("Grasping"));
}

#[test]
fn test_grasp_fails_when_holding() {
    let scene = scene_holding();
    let wps = generate("GRASP", json!({"target": "blue_cylinder"}), &scene);
    let result = prim("GRASP").validate(&wps, &scene);
    assert!(result.failed());
    assert!(result.reason.contains("Already holding"));
}

#[test]
fn test_release() {
    let wps = generate("RELEASE", json!({}), &scene());
    assert_eq!(wps.len(), 1);
    assert!(wps[0].gripper_open);

    assert_eq!(
        prim("RELEASE").validate(&wps, &scene()).status,
        ValidationStatus::Warning
    );
    assert!(prim("RELEASE").validate(&wps, &scene_holding()).passed());
}

// TRANSLATE / ROTATE

#[test]
fn test_translate_absolute_and_delta() {
    let scene = scene();
    let wps = generate("TRANSLATE", json!({"position": [0.5, 1.0, 0.5]}), &scene);
    assert_eq!(wps.len(), 3);
    assert!((wps[2].x - 0.5).abs() < 1e-9 && (wps[2].z - 0.5).abs() < 1e-9);

    let wps = generate("TRANSLATE", json!({"delta": [0.1, 0.0, -0.2]}), &scene);
    assert_eq!(wps.len(), 3);
    assert!((wps[2].x - (scene.end_effector[0] + 0.1)).abs() < 1e-9);
}

#[test]
fn test_translate_param_errors() {
    let err = generate_err("TRANSLATE", json!({}), &scene());
    assert!(err.to_string().contains("requires"));

    let err = generate_err(
        "TRANSLATE",
        json!({"position": [0.0, 1.0, 0.0], "delta": [0.1, 0.0, 0.0]}),
        &scene(),
    );
    assert!(matches!(err, PrimitiveError::InvalidParam { .. }));

    assert!(describe("TRANSLATE", json!({"position": [1.0, 1.0, 1.0]})).contains("1.00"));
    assert!(describe("TRANSLATE", json!({"delta": [0.1, 0.0, 0.0]})).contains("0.10"));
}

#[test]
fn test_rotate_final_angle() {
    let wps = generate("ROTATE", json!({"axis": "y", "degrees": 90}), &scene());
    assert!(wps.len() >= 2);
    assert!((wps.last().unwrap().yaw - 90f64.to_radians()).abs() < 0.01);

    let wps = generate("ROTATE", json!({"axis": "x", "degrees": 45}), &scene());
    assert!((wps.last().unwrap().roll - 45f64.to_radians()).abs() < 0.01);

    let desc = describe("ROTATE", json!({"axis": "z", "degrees": 180}));
    assert!(desc.contains("180") && desc.contains('z'));
}

#[test]
fn test_rotate_rejects_unknown_axis() {
    let err = generate_err("ROTATE", json!({"axis": "w", "degrees": 10}), &scene());
    assert!(matches!(err, PrimitiveError::InvalidParam { ref param, .. } if param == "axis"));
}

#[test]
fn test_angles_are_capped() {
    for degrees in [json!(1e30), json!("-1e12"), json!("NaN")] {
        let err = generate_err("ROTATE", json!({"axis": "z", "degrees": degrees}), &scene());
        assert!(matches!(err, PrimitiveError::InvalidParam { ref param, .. } if param == "degrees"));
    }

    let err = generate_err(
        "POUR",
        json!({"target_container": "blue_cylinder", "angle": 1e30}),
        &scene_holding(),
    );
    assert!(matches!(err, PrimitiveError::InvalidParam { ref param, .. } if param == "angle"));

    // Ten full turns is still allowed
    let wps = generate("ROTATE", json!({"axis": "y", "degrees": 3600}), &scene());
    assert!((wps.last().unwrap().yaw - 3600f64.to_radians()).abs() < 0.01);
}

#[test]
fn test_non_finite_position_rejected() {
    let err = generate_err("TRANSLATE", json!({"position": ["NaN", "NaN", 0]}), &scene());
    assert!(matches!(err, PrimitiveError::InvalidParam { ref param, .. } if param == "position"));

    let err = generate_err("TRANSLATE", json!({"delta": [0, "inf", 0]}), &scene());
    assert!(matches!(err, PrimitiveError::InvalidParam { ref param, .. } if param == "delta"));
}

// PLACE / STACK

#[test]
fn test_place() {
    let scene = scene_holding();
    let wps = generate("PLACE", json!({"position": [0.5, 0.55, 0.5]}), &scene);
    assert_eq!(wps.len(), 4);
    assert!(wps.iter().any(|w| w.gripper_open));
    assert!(prim("PLACE").validate(&wps, &scene).passed());

    assert_eq!(generate("PLACE", json!({"target": "blue_cylinder"}), &scene).len(), 4);
}

#[test]
fn test_place_without_object_fails() {
    let scene = scene();
    let wps = generate("PLACE", json!({"position": [0.5, 0.55, 0.5]}), &scene);
    assert!(prim("PLACE").validate(&wps, &scene).failed());
}

#[test]
fn test_stack() {
    let scene = scene_holding();
    let wps = generate("STACK", json!({"target": "blue_cylinder"}), &scene);
    assert_eq!(wps.len(), 4);
    // Descend point sits above the support object
    assert!(wps[1].y > 0.7);

    let empty = [Waypoint::at([0.0, 1.0, 0.0], true)];
    assert!(prim("STACK").validate(&empty, &self::scene()).failed());
}

// PUSH / POUR / SORT

#[test]
fn test_push() {
    let wps = generate(
        "PUSH",
        json!({"target": "red_cube", "direction": [1, 0, 0], "distance": 0.3}),
        &scene(),
    );
    assert_eq!(wps.len(), 4);
    assert!(wps[2].x > 0.5);

    let err = generate_err(
        "PUSH",
        json!({"target": "red_cube", "direction": [0, 0, 0], "distance": 0.1}),
        &scene(),
    );
    assert_eq!(err, PrimitiveError::ZeroDirection);
    assert!(err.to_string().contains("zero magnitude"));
}

#[test]
fn test_pour() {
    let scene = scene_holding();
    let wps = generate("POUR", json!({"target_container": "blue_cylinder", "angle": 90}), &scene);
    assert!(wps.len() >= 4);
    assert!(wps.iter().any(|w| w.roll != 0.0));
    assert!(prim("POUR").validate(&wps, &scene).passed());

    let empty = [Waypoint::at([0.0, 1.0, 0.0], true)];
    assert!(prim("POUR").validate(&empty, &self::scene()).failed());
}

#[test]
fn test_sort_eight_waypoints_per_object() {
    let wps = generate(
        "SORT",
        json!({
            "objects": ["red_cube", "blue_cylinder", "green_sphere"],
            "criterion": "color",
            "direction": "left_to_right"
        }),
        &scene(),
    );
    assert_eq!(wps.len(), 24);
    // red first: its pick starts above red_cube
    assert_eq!((wps[0].x, wps[0].z), (0.5, 0.3));
    assert!(describe("SORT", json!({"criterion": "size", "direction": "left_to_right"})).contains("size"));
}

// INSPECT / WAIT

#[test]
fn test_inspect_looks_down() {
    let wps = generate("INSPECT", json!({"target": "red_cube"}), &scene());
    assert_eq!(wps.len(), 2);
    assert!(wps[0].pitch < 0.0);
}

#[test]
fn test_wait() {
    let scene = scene();
    let wps = generate("WAIT", json!({"duration_ms": 2000}), &scene);
    assert_eq!(wps.len(), 1);
    assert_eq!(wps[0].position(), scene.end_effector);
    assert!(prim("WAIT").validate(&wps, &scene).passed());

    assert!(describe("WAIT", json!({"condition": "object_settled"})).contains("object_settled"));
    assert!(describe("WAIT", json!({"duration_ms": 500})).contains("500"));
}
