//! Decomposition collaborators.
//!
//! A decomposer turns a natural-language command plus the scene into an
//! ordered list of primitive actions. The pipeline only ever sees the
//! validated result.

pub mod command;
pub mod decomposition;

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{ActionRequest, SceneState};

pub use command::CommandDecomposer;
pub use decomposition::{
    decomposition_prompt, parse_action_plan, validate_actions, DecompositionError,
};

/// Validated output of a decomposer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decomposition {
    pub actions: Vec<ActionRequest>,

    /// Unprocessed model output
    pub raw_response: String,

    /// Which decomposer produced this
    pub source: String,

    #[serde(default)]
    pub confidence_scores: BTreeMap<String, f64>,
}

/// Trait for decomposition backends
#[async_trait]
pub trait Decomposer: Send + Sync {
    /// Human-readable decomposer name
    fn name(&self) -> &str;

    /// Decompose `command` against `scene`
    async fn decompose(&self, command: &str, scene: &SceneState) -> Result<Decomposition>;
}

/// Decomposer that always answers with the same raw plan
///
/// The plan is still parsed and validated against the scene on every call.
#[derive(Debug, Clone)]
pub struct StaticDecomposer {
    raw: String,
}

impl StaticDecomposer {
    /// From raw model-style output (JSON, optionally fenced)
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn from_actions(actions: &[ActionRequest]) -> Self {
        let values: Vec<_> = actions.iter().map(ActionRequest::to_value).collect();
        Self::new(serde_json::Value::Array(values).to_string())
    }
}

#[async_trait]
impl Decomposer for StaticDecomposer {
    fn name(&self) -> &str {
        "static"
    }

    async fn decompose(&self, _command: &str, scene: &SceneState) -> Result<Decomposition> {
        let entries = parse_action_plan(&self.raw)?;
        let actions = validate_actions(&entries, scene)?;
        Ok(Decomposition {
            actions,
            raw_response: self.raw.clone(),
            source: self.name().to_string(),
            confidence_scores: BTreeMap::new(),
        })
    }
}
