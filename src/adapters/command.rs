//! Decomposer backed by an external command.
//!
//! The command receives the decomposition prompt on stdin and must print
//! the action plan (JSON, optionally fenced) on stdout. Any LLM CLI that
//! reads a prompt from stdin works.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

use super::{decomposition_prompt, parse_action_plan, validate_actions, Decomposer, Decomposition};
use crate::core::scene_graph::analyze_scene;
use crate::domain::SceneState;

/// Default time allowed for one decomposition call
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Decomposer using a subprocess
#[derive(Debug, Clone)]
pub struct CommandDecomposer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandDecomposer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the command with `prompt` on stdin and collect stdout
    async fn execute(&self, prompt: &str) -> Result<String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn decomposer '{}'", self.program))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .context("Failed to write prompt to decomposer stdin")?;
        }

        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .with_context(|| {
                format!(
                    "Decomposer '{}' timed out after {:?}",
                    self.program, self.timeout
                )
            })?
            .with_context(|| format!("Failed to wait for decomposer '{}'", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            anyhow::bail!(
                "Decomposer '{}' failed with exit code {}: {}",
                self.program,
                exit_code,
                stderr.trim()
            );
        }

        String::from_utf8(output.stdout).context("Decomposer output is not valid UTF-8")
    }
}

#[async_trait]
impl Decomposer for CommandDecomposer {
    fn name(&self) -> &str {
        &self.program
    }

    async fn decompose(&self, command: &str, scene: &SceneState) -> Result<Decomposition> {
        let prompt = decomposition_prompt(command, &analyze_scene(scene));
        debug!(bytes = prompt.len(), "Sending decomposition prompt");

        let raw = self.execute(&prompt).await?;
        let entries = parse_action_plan(&raw)?;
        let actions = validate_actions(&entries, scene)?;

        info!(actions = actions.len(), decomposer = %self.program, "Decomposed command");

        Ok(Decomposition {
            actions,
            raw_response: raw,
            source: self.program.clone(),
            confidence_scores: BTreeMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let decomposer = CommandDecomposer::new("llm")
            .with_args(["-m", "small"])
            .with_timeout(Duration::from_secs(5));
        assert_eq!(decomposer.name(), "llm");
        assert_eq!(decomposer.args, vec!["-m", "small"]);
        assert_eq!(decomposer.timeout, Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_decompose_via_subprocess() {
        // `sh -c` ignores the prompt and prints a fixed plan
        let decomposer = CommandDecomposer::new("sh")
            .with_args(["-c", "cat > /dev/null; echo '[{\"action\": \"wait\"}]'"]);
        let result = decomposer
            .decompose("wait", &SceneState::default())
            .await
            .unwrap();
        assert_eq!(result.actions.len(), 1);
        assert_eq!(result.actions[0].action, "WAIT");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command_reports_exit_code() {
        let decomposer = CommandDecomposer::new("sh").with_args(["-c", "cat > /dev/null; exit 3"]);
        let err = decomposer
            .decompose("wait", &SceneState::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exit code 3"));
    }
}
