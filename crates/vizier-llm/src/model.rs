//! Language-model trait and time-bounded invocation

use crate::error::ModelError;
use async_trait::async_trait;
use std::time::Duration;

/// A prompt: system instructions plus the user turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Role instructions for the model
    pub system: String,
    /// Request content
    pub user: String,
}

impl Prompt {
    /// Create a prompt
    #[must_use]
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Output format requested from the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    /// Free text
    Text,
    /// A JSON document (still validated by the caller)
    #[default]
    Json,
}

/// Per-call generation constraints
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceConstraints {
    /// Requested output format
    pub format: ResponseFormat,
    /// Generation cap in tokens
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Hard bound on the call's wall-clock time
    pub timeout: Duration,
}

impl InferenceConstraints {
    /// JSON output bounded by `timeout`
    #[must_use]
    pub fn json(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// With token cap
    #[inline]
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// With temperature
    #[inline]
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

impl Default for InferenceConstraints {
    fn default() -> Self {
        Self {
            format: ResponseFormat::Json,
            max_tokens: 1024,
            temperature: 0.1,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Untrusted text generator
///
/// Implementations return the raw generated text. Nothing about its
/// structure is guaranteed.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a completion for `prompt`
    async fn infer(&self, prompt: &Prompt, constraints: &InferenceConstraints) -> Result<String, ModelError>;

    /// Model identifier, for logs
    fn name(&self) -> &str;
}

/// Run one inference call under the constraints' timeout
///
/// On expiry the in-flight future is dropped, which cancels the request.
///
/// # Errors
/// - `ModelError::Timeout` when the bound expires
/// - `ModelError::EmptyResponse` when the model returns only whitespace
/// - any error reported by the model itself
pub async fn infer_bounded(
    model: &dyn LanguageModel,
    prompt: &Prompt,
    constraints: &InferenceConstraints,
) -> Result<String, ModelError> {
    let started = std::time::Instant::now();
    let after_ms = u64::try_from(constraints.timeout.as_millis()).unwrap_or(u64::MAX);

    let response = match tokio::time::timeout(constraints.timeout, model.infer(prompt, constraints)).await {
        Ok(Ok(text)) => text,
        Ok(Err(ModelError::Timeout { .. })) | Err(_) => {
            tracing::warn!(model = model.name(), after_ms, "model call timed out");
            return Err(ModelError::Timeout { after_ms });
        }
        Ok(Err(e)) => {
            tracing::warn!(model = model.name(), error = %e, "model call failed");
            return Err(e);
        }
    };

    tracing::debug!(
        model = model.name(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        bytes = response.len(),
        "model call completed"
    );

    if response.trim().is_empty() {
        return Err(ModelError::EmptyResponse);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Slow(Duration);

    #[async_trait]
    impl LanguageModel for Slow {
        async fn infer(&self, _prompt: &Prompt, _c: &InferenceConstraints) -> Result<String, ModelError> {
            tokio::time::sleep(self.0).await;
            Ok("{}".to_string())
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    #[derive(Debug)]
    struct Blank;

    #[async_trait]
    impl LanguageModel for Blank {
        async fn infer(&self, _prompt: &Prompt, _c: &InferenceConstraints) -> Result<String, ModelError> {
            Ok("  \n".to_string())
        }

        fn name(&self) -> &str {
            "blank"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn expired_call_times_out() {
        let model = Slow(Duration::from_secs(60));
        let constraints = InferenceConstraints::json(Duration::from_millis(250));

        let err = infer_bounded(&model, &Prompt::new("s", "u"), &constraints)
            .await
            .unwrap_err();

        assert_eq!(err, ModelError::Timeout { after_ms: 250 });
    }

    #[tokio::test(start_paused = true)]
    async fn fast_call_completes() {
        let model = Slow(Duration::from_millis(10));
        let constraints = InferenceConstraints::json(Duration::from_secs(1));

        let text = infer_bounded(&model, &Prompt::new("s", "u"), &constraints)
            .await
            .unwrap();

        assert_eq!(text, "{}");
    }

    #[tokio::test]
    async fn blank_output_is_empty_response() {
        let err = infer_bounded(&Blank, &Prompt::new("s", "u"), &InferenceConstraints::default())
            .await
            .unwrap_err();
        assert_eq!(err, ModelError::EmptyResponse);
    }
}
