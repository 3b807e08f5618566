//! Decomposition Integration Tests
//!
//! Parsing and validation of model output, the prompt, and full runs
//! through the command runner.

use std::time::Duration;

use kinesys::adapters::{
    decomposition_prompt, parse_action_plan, validate_actions, Decomposer, DecompositionError,
    StaticDecomposer,
};
use kinesys::core::{analyze_scene, CommandRunner, PipelineConfig, PipelineNode};
use kinesys::domain::SceneState;
use kinesys::primitives::PrimitiveId;
use serde_json::{json, Value};

fn scene_data() -> Value {
    json!({
        "objects": [
            {"id": "red_cube", "shape": "box", "color": "red",
             "position": [0.5, 0.65, 0.3], "size": [0.2, 0.2, 0.2]},
            {"id": "blue_cylinder", "shape": "cylinder", "color": "blue",
             "position": [-0.5, 0.7, 0.6], "size": [0.1, 0.3]},
            {"id": "green_sphere", "shape": "sphere", "color": "green",
             "position": [0.3, 0.67, -0.5], "size": [0.12]}
        ],
        "end_effector": [0.0, 1.5, 0.0],
        "gripper_open": true,
        "table_height": 0.5
    })
}

fn scene() -> SceneState {
    SceneState::from_value(&scene_data()).unwrap()
}

fn runner(raw: &str) -> CommandRunner<StaticDecomposer> {
    CommandRunner::new(StaticDecomposer::new(raw), PipelineConfig::default())
        .with_retries(0)
        .with_retry_delay(Duration::ZERO)
}

// Validation

#[test]
fn test_valid_actions() {
    let entries = vec![
        json!({"action": "APPROACH", "params": {"target": "red_cube"}}),
        json!({"action": "GRASP", "params": {"target": "red_cube"}}),
    ];
    let actions = validate_actions(&entries, &scene()).unwrap();
    assert_eq!(actions.len(), 2);
    assert_eq!(actions[0].action, "APPROACH");
}

#[test]
fn test_validation_failures() {
    let scene = scene();

    let err = validate_actions(&[json!({"action": "FLY"})], &scene).unwrap_err();
    assert!(matches!(err, DecompositionError::UnknownAction { ref action, .. } if action == "FLY"));

    let err = validate_actions(
        &[json!({"action": "GRASP", "params": {"target": "phantom"}})],
        &scene,
    )
    .unwrap_err();
    assert!(err.to_string().contains("'phantom' not in scene"));

    assert_eq!(validate_actions(&[], &scene).unwrap_err(), DecompositionError::Empty);

    let err = validate_actions(&[json!("APPROACH")], &scene).unwrap_err();
    assert!(matches!(err, DecompositionError::NotAnObject { index: 0, .. }));
}

#[test]
fn test_case_insensitive_action() {
    let entries = vec![json!({"action": "approach", "params": {"target": "red_cube"}})];
    let actions = validate_actions(&entries, &scene()).unwrap();
    assert_eq!(actions[0].action, "APPROACH");
}

#[test]
fn test_sort_validates_object_ids() {
    let bad = vec![json!({
        "action": "SORT",
        "params": {"objects": ["red_cube", "phantom"], "criterion": "color"}
    })];
    let err = validate_actions(&bad, &scene()).unwrap_err();
    assert!(matches!(
        err,
        DecompositionError::UnknownObject { action: PrimitiveId::Sort, .. }
    ));

    let good = vec![json!({
        "action": "SORT",
        "params": {"objects": ["red_cube", "blue_cylinder", "green_sphere"], "criterion": "color"}
    })];
    assert_eq!(validate_actions(&good, &scene()).unwrap().len(), 1);
}

// Parsing

#[test]
fn test_parse_forms() {
    let clean = r#"[{"action": "WAIT", "params": {}}]"#;
    assert_eq!(parse_action_plan(clean).unwrap().len(), 1);

    let fenced = "```json\n[{\"action\": \"WAIT\"}]\n```";
    assert_eq!(parse_action_plan(fenced).unwrap().len(), 1);

    let envelope = r#"{"actions": [{"action": "WAIT"}, {"action": "RELEASE"}]}"#;
    assert_eq!(parse_action_plan(envelope).unwrap().len(), 2);

    assert!(matches!(
        parse_action_plan("not json at all"),
        Err(DecompositionError::NotJson(_))
    ));
    assert_eq!(parse_action_plan(r#"{"a": 1}"#), Err(DecompositionError::NotAList));
}

#[test]
fn test_prompt_contains_all_primitives() {
    let prompt = decomposition_prompt("pick up the red cube", &analyze_scene(&scene()));

    for id in PrimitiveId::ALL {
        assert!(prompt.contains(id.as_str()), "missing {}", id.as_str());
    }
    assert!(prompt.contains("pick up the red cube"));
    assert!(prompt.contains("red_cube"));
}

// Command runner

#[tokio::test]
async fn test_static_decomposer_reports_source() {
    let decomposition = StaticDecomposer::new(r#"[{"action": "wait"}]"#)
        .decompose("wait", &scene())
        .await
        .unwrap();
    assert_eq!(decomposition.source, "static");
    assert_eq!(decomposition.actions[0].action, "WAIT");
}

#[tokio::test]
async fn test_pick_and_place_command() {
    let raw = r#"[
        {"action": "APPROACH", "params": {"target": "red_cube"}},
        {"action": "GRASP", "params": {"target": "red_cube"}},
        {"action": "TRANSLATE", "params": {"position": [0.0, 1.0, 0.0]}},
        {"action": "PLACE", "params": {"position": [0.0, 0.55, 0.5]}}
    ]"#;

    let result = runner(raw).run("Move the red cube", scene_data(), true).await;
    assert_eq!(result.final_state, PipelineNode::Confirming);
    assert_eq!(result.narration.len(), 4);
    assert_eq!(result.decomposition_raw, raw);

    // Same plan without approval stops at the HITL gate
    let blocked = runner(raw).run("Move the red cube", scene_data(), false).await;
    assert_eq!(blocked.final_state, PipelineNode::Error);
    assert!(blocked.requires_confirmation || blocked.confirmation_message.contains("confirmation"));
}

#[tokio::test]
async fn test_fenced_response_runs() {
    let raw = "```json\n{\"actions\": [{\"action\": \"INSPECT\", \"params\": {\"target\": \"green_sphere\"}}]}\n```";
    let result = runner(raw).run("Look at the sphere", scene_data(), false).await;

    assert_eq!(result.final_state, PipelineNode::Confirming);
    assert_eq!(result.action_plan.len(), 1);
}

#[tokio::test]
async fn test_invalid_response_ends_in_error() {
    let result = runner("I'm not sure what you mean").run("Do the thing", scene_data(), false).await;
    assert_eq!(result.final_state, PipelineNode::Error);
    assert!(result.action_plan.is_empty());
    assert!(result
        .confirmation_message
        .contains("Decomposition returned no actions"));
    assert!(result.decomposition_raw.contains("Failed to parse model output"));
}

#[tokio::test]
async fn test_invalid_target_ends_in_error() {
    let raw = r#"[{"action": "GRASP", "params": {"target": "purple_pyramid"}}]"#;
    let result = runner(raw).run("Grab the pyramid", scene_data(), false).await;

    assert_eq!(result.final_state, PipelineNode::Error);
    assert!(result.decomposition_raw.contains("purple_pyramid"));
}
