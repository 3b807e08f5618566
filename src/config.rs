//! Configuration for kinesys.
//!
//! Configuration sources (highest priority first):
//! 1. `KINESYS_CONFIG` environment variable naming a config file
//! 2. `.kinesys/config.yaml` in the current directory or any parent
//! 3. `~/.kinesys/config.yaml`
//! 4. Built-in defaults
//!
//! Every threshold has a default, so a config file only needs the values
//! it overrides. The library API never reads this module; callers pass a
//! [`PipelineConfig`] explicitly.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::CommandDecomposer;
use crate::core::{HitlPolicy, PipelineConfig, SafetyConfig};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "KINESYS_CONFIG";

/// Config directory name, searched for in the working tree and home
const CONFIG_DIR: &str = ".kinesys";
const CONFIG_FILE: &str = "config.yaml";

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub safety: Option<SafetyConfig>,
    #[serde(default)]
    pub hitl: Option<HitlPolicy>,
    #[serde(default)]
    pub decomposer: Option<DecomposerConfig>,
}

fn default_version() -> String {
    "1".to_string()
}

/// External command used to decompose commands into actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecomposerConfig {
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Seconds allowed per call (default: 60)
    #[serde(default = "default_decomposer_timeout")]
    pub timeout_seconds: u64,

    /// Extra attempts after a failed decomposition (default: 2)
    #[serde(default = "default_decomposer_retries")]
    pub retries: u32,
}

fn default_decomposer_timeout() -> u64 {
    60
}
fn default_decomposer_retries() -> u32 {
    2
}

impl DecomposerConfig {
    pub fn build(&self) -> CommandDecomposer {
        CommandDecomposer::new(self.command.clone())
            .with_args(self.args.clone())
            .with_timeout(Duration::from_secs(self.timeout_seconds))
    }
}

/// Resolved configuration
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolvedConfig {
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,

    /// Thresholds for the pipeline
    pub pipeline: PipelineConfig,

    pub decomposer: Option<DecomposerConfig>,
}

impl ResolvedConfig {
    fn from_file(path: PathBuf, file: ConfigFile) -> Self {
        Self {
            config_file: Some(path),
            pipeline: PipelineConfig {
                safety: file.safety.unwrap_or_default(),
                hitl: file.hitl.unwrap_or_default(),
            },
            decomposer: file.decomposer,
        }
    }
}

/// Search `start` and its parents for `.kinesys/config.yaml`
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Config file that applies to this process, if any
fn locate_config_file() -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(explicit));
    }

    std::env::current_dir()
        .ok()
        .and_then(|cwd| find_config_file(&cwd))
        .or_else(|| {
            dirs::home_dir()
                .map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
                .filter(|p| p.exists())
        })
}

/// Load and parse config file
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve configuration from an explicit file, or defaults when `None`
pub fn load_config_from(path: Option<&Path>) -> Result<ResolvedConfig> {
    match path {
        Some(path) => {
            let file = load_config_file(path)?;
            Ok(ResolvedConfig::from_file(path.to_path_buf(), file))
        }
        None => Ok(ResolvedConfig::default()),
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    load_config_from(locate_config_file().as_deref())
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (bypasses the cache)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}
