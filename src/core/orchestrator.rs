//! Command runner around the pipeline state machine.
//!
//! Couples a [`Decomposer`] with a [`PipelineMachine`]: the command is
//! decomposed (with retries), the resulting plan is injected into a fresh
//! [`PipelineState`], and the state machine runs to completion.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::{Decomposer, Decomposition};
use crate::domain::{ActionRequest, SceneState};

use super::state_machine::{PipelineConfig, PipelineMachine, PipelineState};

/// Default number of extra decomposition attempts
const DEFAULT_MAX_RETRIES: u32 = 2;

/// Base delay between attempts; grows linearly with the attempt number
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Plan handed to the state machine
struct DecomposedPlan {
    actions: Vec<Value>,
    raw: String,
    confidence_scores: BTreeMap<String, f64>,
}

impl DecomposedPlan {
    fn empty(raw: impl Into<String>) -> Self {
        Self {
            actions: Vec::new(),
            raw: raw.into(),
            confidence_scores: BTreeMap::new(),
        }
    }
}

impl From<Decomposition> for DecomposedPlan {
    fn from(decomposition: Decomposition) -> Self {
        Self {
            actions: decomposition
                .actions
                .iter()
                .map(ActionRequest::to_value)
                .collect(),
            raw: decomposition.raw_response,
            confidence_scores: decomposition.confidence_scores,
        }
    }
}

/// Runs natural-language commands end to end
pub struct CommandRunner<D> {
    decomposer: D,
    machine: PipelineMachine,
    max_retries: u32,
    retry_delay: Duration,
}

impl<D: Decomposer> CommandRunner<D> {
    pub fn new(decomposer: D, config: PipelineConfig) -> Self {
        Self {
            decomposer,
            machine: PipelineMachine::new(config),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn decomposer(&self) -> &D {
        &self.decomposer
    }

    pub fn machine(&self) -> &PipelineMachine {
        &self.machine
    }

    /// Decompose `transcript` and drive the pipeline to a terminal state
    ///
    /// Never fails: decomposition problems end the run in ERROR with the
    /// decomposer's error text as the raw decomposition.
    #[instrument(skip(self, scene_data), fields(decomposer = %self.decomposer.name()))]
    pub async fn run(&self, transcript: &str, scene_data: Value, confirmed: bool) -> PipelineState {
        let plan = self.decompose(transcript, &scene_data).await;

        let state = PipelineState::new(transcript, scene_data, plan.actions)
            .with_decomposition_raw(plan.raw)
            .with_confidence_scores(plan.confidence_scores)
            .with_confirmation(confirmed);

        self.machine.run(state)
    }

    async fn decompose(&self, transcript: &str, scene_data: &Value) -> DecomposedPlan {
        if transcript.trim().is_empty() {
            // LISTENING rejects the run before the plan is looked at
            return DecomposedPlan::empty("");
        }

        let scene = match SceneState::from_value(scene_data) {
            Ok(scene) => scene,
            Err(e) => {
                warn!(error = %e, "Scene could not be parsed, skipping decomposition");
                return DecomposedPlan::empty(format!("Scene could not be parsed: {}", e));
            }
        };

        match self.decompose_with_retry(transcript, &scene).await {
            Ok(decomposition) => {
                info!(
                    actions = decomposition.actions.len(),
                    source = %decomposition.source,
                    "Command decomposed"
                );
                decomposition.into()
            }
            Err(e) => DecomposedPlan::empty(format!("{:#}", e)),
        }
    }

    async fn decompose_with_retry(&self, transcript: &str, scene: &SceneState) -> Result<Decomposition> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            debug!(attempt, "Decomposing command");

            match self.decomposer.decompose(transcript, scene).await {
                Ok(decomposition) => return Ok(decomposition),
                Err(e) if attempt <= self.max_retries => {
                    let delay = self.retry_delay * attempt;
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Decomposition failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(attempt, error = %e, "Decomposition failed permanently");
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::StaticDecomposer;
    use crate::core::state_machine::PipelineNode;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails a fixed number of times before answering with WAIT
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Decomposer for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn decompose(&self, command: &str, scene: &SceneState) -> Result<Decomposition> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                anyhow::bail!("model unavailable");
            }
            StaticDecomposer::new(r#"[{"action": "WAIT"}]"#)
                .decompose(command, scene)
                .await
        }
    }

    fn flaky(failures: u32) -> Flaky {
        Flaky {
            failures,
            calls: AtomicU32::new(0),
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let runner = CommandRunner::new(flaky(2), PipelineConfig::default())
            .with_retry_delay(Duration::ZERO);
        let state = runner.run("wait a moment", json!({}), false).await;

        assert_eq!(state.final_state, PipelineNode::Confirming);
        assert_eq!(runner.decomposer().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_end_in_error() {
        let runner = CommandRunner::new(flaky(5), PipelineConfig::default())
            .with_retries(1)
            .with_retry_delay(Duration::ZERO);
        let state = runner.run("wait a moment", json!({}), false).await;

        assert_eq!(state.final_state, PipelineNode::Error);
        assert_eq!(state.decomposition_raw, "model unavailable");
        assert!(state.confirmation_message.contains("Decomposition returned no actions"));
        assert_eq!(runner.decomposer().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_blank_transcript_skips_decomposer() {
        let runner = CommandRunner::new(flaky(0), PipelineConfig::default());
        let state = runner.run("   ", json!({}), false).await;

        assert_eq!(state.final_state, PipelineNode::Error);
        assert!(state.confirmation_message.contains("No speech transcript received"));
        assert_eq!(runner.decomposer().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bad_scene_skips_decomposer() {
        let runner = CommandRunner::new(flaky(0), PipelineConfig::default());
        let state = runner
            .run("wait", json!({"objects": [{"type": "box"}]}), false)
            .await;

        assert_eq!(state.final_state, PipelineNode::Error);
        assert!(state.decomposition_raw.starts_with("Scene could not be parsed"));
        assert_eq!(runner.decomposer().calls.load(Ordering::SeqCst), 0);
    }
}
