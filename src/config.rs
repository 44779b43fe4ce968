//! Configuration loaded from `inkloop.toml`.
//!
//! Keys missing from the file fall back to defaults. `ANTHROPIC_API_KEY` in
//! the environment takes precedence over `api_key` in the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::anthropic::ModelTier;
use crate::orchestrator::WorkflowSettings;
use crate::state_machine::{MAX_SCORE, Thresholds};

pub const DEFAULT_CONFIG_FILE: &str = "inkloop.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct InkloopConfig {
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_model_tier")]
    pub default_model_tier: ModelTier,

    /// Iteration budget used when a request does not give one.
    #[serde(default = "default_max_iterations")]
    pub default_max_iterations: u32,

    #[serde(default = "default_approval_threshold")]
    pub approval_threshold: u8,

    #[serde(default = "default_human_feedback_threshold")]
    pub human_feedback_threshold: u8,

    /// Upper bound on a single generate or evaluate call.
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,

    #[serde(default = "default_articles_dir")]
    pub articles_dir: PathBuf,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

fn default_model_tier() -> ModelTier {
    ModelTier::Sonnet
}

fn default_max_iterations() -> u32 {
    5
}

fn default_approval_threshold() -> u8 {
    9
}

fn default_human_feedback_threshold() -> u8 {
    7
}

fn default_step_timeout_secs() -> u64 {
    180
}

fn default_articles_dir() -> PathBuf {
    PathBuf::from("articles")
}

fn default_listen_addr() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:3000".to_string(),
    ]
}

impl Default for InkloopConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            default_model_tier: default_model_tier(),
            default_max_iterations: default_max_iterations(),
            approval_threshold: default_approval_threshold(),
            human_feedback_threshold: default_human_feedback_threshold(),
            step_timeout_secs: default_step_timeout_secs(),
            articles_dir: default_articles_dir(),
            listen_addr: default_listen_addr(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl InkloopConfig {
    /// Load from `path`, or from `inkloop.toml` in the working directory.
    /// A missing default file means defaults; a missing explicit path is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(path)?
                } else {
                    Self::default()
                }
            }
        };

        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            if !key.is_empty() {
                config.api_key = key;
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.approval_threshold > MAX_SCORE {
            bail!("approval_threshold must be at most {MAX_SCORE}");
        }
        if self.human_feedback_threshold > self.approval_threshold {
            bail!("human_feedback_threshold must not exceed approval_threshold");
        }
        if self.default_max_iterations < 1 {
            bail!("default_max_iterations must be at least 1");
        }
        if self.step_timeout_secs == 0 {
            bail!("step_timeout_secs must be positive");
        }
        Ok(())
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            approval: self.approval_threshold,
            human_feedback: self.human_feedback_threshold,
        }
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn workflow_settings(&self) -> WorkflowSettings {
        WorkflowSettings {
            thresholds: self.thresholds(),
            step_timeout: self.step_timeout(),
        }
    }
}
