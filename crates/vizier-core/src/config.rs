//! Pipeline configuration
//!
//! Thresholds and retry limits are tunable policy, not contract. Values
//! come from defaults, an optional TOML file and `VIZIER_*` environment
//! overrides, in that order.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use vizier_llm::{InferenceConstraints, OllamaConfig};

/// Configuration loading or validation failure
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config could not be rendered as TOML
    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    /// Environment override has an unparseable value
    #[error("environment variable {name}={value} is not valid")]
    Env {
        /// Variable name
        name: &'static str,
        /// Offending value
        value: String,
    },

    /// Value out of range
    #[error("invalid config value: {0}")]
    Invalid(String),
}

/// Advisory QA thresholds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QaConfig {
    /// Categories above which a pie chart draws a warning
    pub pie_max_categories: usize,
    /// Categories above which a bar chart draws a warning
    pub bar_max_categories: usize,
    /// Rows above which an unseriesed scatter plot draws a suggestion
    pub scatter_color_hint_rows: usize,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            pie_max_categories: 7,
            bar_max_categories: 15,
            scatter_color_hint_rows: 50,
        }
    }
}

/// Language-model endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Ollama server root
    pub base_url: String,
    /// Model tag
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Generation cap in tokens
    pub max_tokens: u32,
}

impl ModelConfig {
    /// Connection settings for [`vizier_llm::OllamaModel`]
    #[must_use]
    pub fn ollama(&self) -> OllamaConfig {
        OllamaConfig {
            base_url: self.base_url.clone(),
            model: self.model.clone(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        let ollama = OllamaConfig::default();
        Self {
            base_url: ollama.base_url,
            model: ollama.model,
            temperature: 0.1,
            max_tokens: 1024,
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Confidence needed to reuse a stored mapping or push one to the knowledge base
    pub acceptance_threshold: f64,
    /// Orchestrator-level re-interpretations after a QA or plan failure
    pub max_retries: u32,
    /// Corrective re-prompts the interpreter makes on an invalid plan
    pub interpreter_correction_attempts: u32,
    /// Per-call language-model timeout
    pub model_timeout_ms: u64,
    /// Example values per column in prompts, and rows in upload samples
    pub sample_size: usize,
    /// Knowledge base file
    pub knowledge_base_path: PathBuf,
    /// Completed visualizations kept in memory
    pub artifact_capacity: u64,
    /// Lifetime of a completed visualization
    pub artifact_ttl_secs: u64,
    /// QA thresholds
    pub qa: QaConfig,
    /// Model endpoint
    pub model: ModelConfig,
}

impl PipelineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With acceptance threshold
    #[inline]
    #[must_use]
    pub fn with_acceptance_threshold(mut self, threshold: f64) -> Self {
        self.acceptance_threshold = threshold;
        self
    }

    /// With orchestrator retry bound
    #[inline]
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// With interpreter correction attempts
    #[inline]
    #[must_use]
    pub fn with_interpreter_correction_attempts(mut self, attempts: u32) -> Self {
        self.interpreter_correction_attempts = attempts;
        self
    }

    /// With per-call model timeout
    #[inline]
    #[must_use]
    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With knowledge base file
    #[inline]
    #[must_use]
    pub fn with_knowledge_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.knowledge_base_path = path.into();
        self
    }

    /// Parse TOML; missing keys keep their defaults
    ///
    /// # Errors
    /// `ConfigError::Parse` on malformed TOML or wrong value types
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a TOML file
    ///
    /// # Errors
    /// `ConfigError::Read` or `ConfigError::Parse`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply `VIZIER_*` environment overrides
    ///
    /// # Errors
    /// `ConfigError::Env` for a numeric variable that does not parse
    pub fn apply_env_overrides(self) -> Result<Self, ConfigError> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable source
    ///
    /// # Errors
    /// `ConfigError::Env` for a numeric variable that does not parse
    pub fn apply_overrides_from(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(url) = var("VIZIER_MODEL_URL") {
            self.model.base_url = url;
        }
        if let Some(model) = var("VIZIER_MODEL") {
            self.model.model = model;
        }
        if let Some(path) = var("VIZIER_KB_PATH") {
            self.knowledge_base_path = PathBuf::from(path);
        }
        if let Some(value) = var("VIZIER_MAX_RETRIES") {
            self.max_retries = value.trim().parse().map_err(|_| ConfigError::Env {
                name: "VIZIER_MAX_RETRIES",
                value,
            })?;
        }
        if let Some(value) = var("VIZIER_MODEL_TIMEOUT_MS") {
            self.model_timeout_ms = value.trim().parse().map_err(|_| ConfigError::Env {
                name: "VIZIER_MODEL_TIMEOUT_MS",
                value,
            })?;
        }
        Ok(self)
    }

    /// Check ranges
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the first bad value
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.acceptance_threshold) {
            return Err(ConfigError::Invalid(format!(
                "acceptance_threshold must be within [0, 1], got {}",
                self.acceptance_threshold
            )));
        }
        if self.model_timeout_ms == 0 {
            return Err(ConfigError::Invalid("model_timeout_ms must be positive".into()));
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::Invalid(format!(
                "model.temperature must be within [0, 2], got {}",
                self.model.temperature
            )));
        }
        if self.artifact_capacity == 0 {
            return Err(ConfigError::Invalid("artifact_capacity must be positive".into()));
        }
        Ok(())
    }

    /// Render as TOML
    ///
    /// # Errors
    /// `ConfigError::Render`
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Per-call model timeout
    #[inline]
    #[must_use]
    pub fn model_timeout(&self) -> Duration {
        Duration::from_millis(self.model_timeout_ms)
    }

    /// Inference constraints for JSON-producing model calls
    #[must_use]
    pub fn inference_constraints(&self) -> InferenceConstraints {
        InferenceConstraints::json(self.model_timeout())
            .with_max_tokens(self.model.max_tokens)
            .with_temperature(self.model.temperature)
    }

    /// Lifetime of a completed visualization
    #[inline]
    #[must_use]
    pub fn artifact_ttl(&self) -> Duration {
        Duration::from_secs(self.artifact_ttl_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: 0.6,
            max_retries: 2,
            interpreter_correction_attempts: 1,
            model_timeout_ms: 30_000,
            sample_size: 5,
            knowledge_base_path: PathBuf::from("data/knowledge_base.json"),
            artifact_capacity: 256,
            artifact_ttl_secs: 3600,
            qa: QaConfig::default(),
            model: ModelConfig::default(),
        }
    }
}
