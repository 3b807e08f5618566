//! Abstract actions handed to the planner.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Primitive parameters, as produced by the decomposition collaborator
pub type Params = Map<String, Value>;

/// One `{action, params}` entry of a decomposed command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Primitive id (case-insensitive)
    pub action: String,

    #[serde(default)]
    pub params: Params,
}

impl ActionRequest {
    pub fn new(action: impl Into<String>, params: Value) -> Self {
        let params = match params {
            Value::Object(map) => map,
            _ => Params::new(),
        };
        Self {
            action: action.into(),
            params,
        }
    }

    /// Action with no parameters
    pub fn bare(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            params: Params::new(),
        }
    }

    /// Raw `{action, params}` form carried in the pipeline state
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "action": self.action,
            "params": self.params,
        })
    }
}
