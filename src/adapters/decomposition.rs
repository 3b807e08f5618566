//! Parsing and validation of raw decomposition output.
//!
//! Language models tend to wrap JSON in markdown fences or in an
//! `{"actions": [...]}` envelope; both are accepted here.

use std::collections::BTreeSet;

use serde_json::Value;
use thiserror::Error;

use crate::core::list_available_primitives;
use crate::core::scene_graph::SceneGraph;
use crate::domain::{ActionRequest, Params, SceneState};
use crate::primitives::PrimitiveId;

/// Errors raised while turning model output into actions
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecompositionError {
    #[error("Failed to parse model output as JSON: {0}")]
    NotJson(String),

    #[error("Model output is not a JSON array")]
    NotAList,

    #[error("Model returned an empty action list")]
    Empty,

    #[error("Action {index} is not an object: {entry}")]
    NotAnObject { index: usize, entry: String },

    #[error("Action {index}: unknown primitive '{action}'. Allowed: [{allowed}]")]
    UnknownAction {
        index: usize,
        action: String,
        allowed: String,
    },

    #[error("Action {index}: 'params' must be an object")]
    InvalidParams { index: usize },

    #[error("Action {index} ({action}): {field} '{id}' not in scene. Available: [{available}]")]
    UnknownObject {
        index: usize,
        action: PrimitiveId,
        field: &'static str,
        id: String,
        available: String,
    },
}

/// Remove a surrounding markdown code fence, if any
fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line.
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parse raw model output into a list of action entries
pub fn parse_action_plan(raw: &str) -> Result<Vec<Value>, DecompositionError> {
    let parsed: Value = serde_json::from_str(strip_fences(raw))
        .map_err(|e| DecompositionError::NotJson(e.to_string()))?;

    let parsed = match parsed {
        Value::Object(mut map) if map.contains_key("actions") => {
            map.remove("actions").unwrap_or(Value::Null)
        }
        other => other,
    };

    match parsed {
        Value::Array(entries) => Ok(entries),
        _ => Err(DecompositionError::NotAList),
    }
}

/// Check entries against the primitive set and the scene
///
/// Action ids are normalized to upper case; `params` defaults to `{}`.
pub fn validate_actions(
    entries: &[Value],
    scene: &SceneState,
) -> Result<Vec<ActionRequest>, DecompositionError> {
    if entries.is_empty() {
        return Err(DecompositionError::Empty);
    }

    let object_ids: BTreeSet<&str> = scene.objects.keys().map(String::as_str).collect();
    let available = || object_ids.iter().copied().collect::<Vec<_>>().join(", ");

    let mut cleaned = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let Some(map) = entry.as_object() else {
            return Err(DecompositionError::NotAnObject {
                index,
                entry: entry.to_string(),
            });
        };

        let raw_action = map.get("action").and_then(Value::as_str).unwrap_or("");
        let action: PrimitiveId =
            raw_action
                .parse()
                .map_err(|_| DecompositionError::UnknownAction {
                    index,
                    action: raw_action.to_ascii_uppercase(),
                    allowed: PrimitiveId::valid_ids(),
                })?;

        let params: Params = match map.get("params") {
            None | Some(Value::Null) => Params::new(),
            Some(Value::Object(p)) => p.clone(),
            Some(_) => return Err(DecompositionError::InvalidParams { index }),
        };

        let mut references: Vec<(&'static str, &str)> = Vec::new();
        for field in ["target", "target_container"] {
            if let Some(id) = params.get(field).and_then(Value::as_str) {
                references.push((field, id));
            }
        }
        if let Some(Value::Array(ids)) = params.get("objects") {
            references.extend(ids.iter().filter_map(Value::as_str).map(|id| ("object", id)));
        }

        if let Some((field, id)) = references
            .into_iter()
            .find(|(_, id)| !id.is_empty() && !object_ids.contains(id))
        {
            return Err(DecompositionError::UnknownObject {
                index,
                action,
                field,
                id: id.to_string(),
                available: available(),
            });
        }

        cleaned.push(ActionRequest {
            action: action.as_str().to_string(),
            params,
        });
    }

    Ok(cleaned)
}

const PROMPT_TEMPLATE: &str = "\
You control a robot arm above a table. Decompose the user's command into a \
sequence of primitive actions.

# Primitives
{primitives}

# Scene
{scene_description}

# Command
{user_command}

Answer with a JSON array only, for example:
[{\"action\": \"APPROACH\", \"params\": {\"target\": \"red_cube\"}}, \
{\"action\": \"GRASP\", \"params\": {\"target\": \"red_cube\"}}]
Only reference object ids listed in the scene.";

/// System prompt for a language-model decomposer
pub fn decomposition_prompt(command: &str, graph: &SceneGraph) -> String {
    let primitives = list_available_primitives()
        .iter()
        .map(|p| format!("- {}: {}", p.id, p.description))
        .collect::<Vec<_>>()
        .join("\n");

    PROMPT_TEMPLATE
        .replace("{primitives}", &primitives)
        .replace("{scene_description}", &graph.to_description())
        .replace("{user_command}", command)
}
