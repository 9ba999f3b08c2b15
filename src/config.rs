//! Study configuration parsing, validation, and credential loading.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Environment variable holding the conversational-agent API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

fn default_api_base() -> String {
    "https://api.openai.com/v1".into()
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

fn default_temperature() -> f32 {
    0.7
}

/// Conversational-agent connectivity settings.
///
/// The API key is loaded at runtime from the environment, never from the
/// TOML config file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Base URL of an `OpenAI`-compatible chat-completions API.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Model identifier passed on every request.
    #[serde(default = "default_model")]
    pub model: String,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Optional system prompt prepended to every transcript.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// API key (populated at runtime from the environment).
    #[serde(skip)]
    pub api_key: String,
}

/// Case-rating sub-study settings; absent when the deployment runs without
/// a case-assessment stage.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CasesConfig {
    /// Path to the CSV file holding one case per row.
    pub file: PathBuf,
    /// Number of cases a participant rates before the stage is exhausted.
    pub n: usize,
    /// Column names, for files without a header row.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
}

/// Study configuration parsed from `study.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct StudyConfig {
    /// Agent connectivity settings.
    pub agent: AgentConfig,
    /// Case-rating settings; `None` disables the case-assessment stage.
    #[serde(default)]
    pub cases: Option<CasesConfig>,
    /// Rendered body text for non-interactive stages, keyed by stage name.
    #[serde(default)]
    pub content: HashMap<String, String>,
}

impl StudyConfig {
    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` on parse or validation failure.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Whether this deployment includes the case-rating stage.
    #[must_use]
    pub fn case_rating_enabled(&self) -> bool {
        self.cases.is_some()
    }

    /// Load the agent API key from the environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the variable is unset or empty.
    pub fn load_credentials(&mut self) -> Result<()> {
        let key = env::var(API_KEY_ENV)
            .map_err(|_| AppError::Config(format!("{API_KEY_ENV} environment variable not set")))?;
        if key.trim().is_empty() {
            return Err(AppError::Config(format!("{API_KEY_ENV} is empty")));
        }
        self.agent.api_key = key;
        Ok(())
    }

    /// Clamp the configured case limit to the dataset size.
    ///
    /// The exhaustion check treats the configured `n` as authoritative; a
    /// limit larger than the dataset would let the cursor run past the case
    /// order, so it is clamped here once at startup.
    pub fn clamp_case_limit(&mut self, dataset_len: usize) {
        if let Some(cases) = &mut self.cases {
            if cases.n > dataset_len {
                warn!(
                    configured = cases.n,
                    dataset = dataset_len,
                    "case limit exceeds dataset size, clamping"
                );
                cases.n = dataset_len;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.agent.api_base.trim().is_empty() {
            return Err(AppError::Config("agent.api_base must not be empty".into()));
        }
        if self.agent.model.trim().is_empty() {
            return Err(AppError::Config("agent.model must not be empty".into()));
        }
        if let Some(cases) = &self.cases {
            if cases.n == 0 {
                return Err(AppError::Config(
                    "cases.n must be at least 1 when case rating is enabled".into(),
                ));
            }
            if let Some(columns) = &cases.columns {
                if columns.is_empty() {
                    return Err(AppError::Config(
                        "cases.columns must not be an empty list".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}
