//! Configuration Loading Integration Tests

use std::fs;

use kinesys::config::{find_config_file, load_config_from};
use kinesys::core::{validate_trajectory, PipelineConfig};
use kinesys::domain::Waypoint;
use tempfile::TempDir;

fn write_config(root: &std::path::Path, body: &str) -> std::path::PathBuf {
    let dir = root.join(".kinesys");
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("config.yaml");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_find_config_walks_parents() {
    let temp = TempDir::new().unwrap();
    let expected = write_config(temp.path(), "version: \"1\"\n");

    let nested = temp.path().join("a").join("b").join("c");
    fs::create_dir_all(&nested).unwrap();

    assert_eq!(find_config_file(&nested), Some(expected.clone()));
    assert_eq!(find_config_file(temp.path()), Some(expected));
}

#[test]
fn test_nearest_config_wins() {
    let temp = TempDir::new().unwrap();
    write_config(temp.path(), "version: \"1\"\n");
    let inner = temp.path().join("project");
    let expected = write_config(&inner, "version: \"1\"\n");

    assert_eq!(find_config_file(&inner.join("src")), Some(expected));
}

#[test]
fn test_partial_workspace_override() {
    let temp = TempDir::new().unwrap();
    let path = write_config(
        temp.path(),
        r#"
safety:
  workspace:
    x_max: 0.5
  table_height: 0.6
"#,
    );

    let config = load_config_from(Some(&path)).unwrap();
    let bounds = &config.pipeline.safety.workspace;
    assert_eq!(bounds.x_max, 0.5);
    assert_eq!(bounds.x_min, -1.5);
    assert_eq!(bounds.y_max, 3.0);
    assert_eq!(config.pipeline.safety.table_height, 0.6);
    assert_eq!(config.pipeline.hitl, PipelineConfig::default().hitl);

    // The override takes effect in validation
    let waypoints = [Waypoint::at([1.0, 1.0, 0.0], true)];
    let result = validate_trajectory(&waypoints, None, &config.pipeline.safety);
    assert!(!result.is_safe);
    assert_eq!(result.violations[0].constraint_name, "workspace_bounds_x");
}

#[test]
fn test_missing_file_is_an_error() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("nope.yaml");

    let err = load_config_from(Some(&missing)).unwrap_err();
    assert!(err.to_string().starts_with("Failed to read config file"));
}
