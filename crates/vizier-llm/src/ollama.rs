//! Ollama HTTP backend

use crate::error::ModelError;
use crate::model::{InferenceConstraints, LanguageModel, Prompt, ResponseFormat};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Connection settings for an Ollama server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Server root, e.g. `http://localhost:11434`
    pub base_url: String,
    /// Model tag, e.g. `llama3`
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    num_predict: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Language model served by Ollama's `/api/generate`
#[derive(Debug, Clone)]
pub struct OllamaModel {
    config: OllamaConfig,
    client: reqwest::Client,
}

impl OllamaModel {
    /// Create a client for `config`
    #[must_use]
    pub fn new(config: OllamaConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Connection settings
    #[inline]
    #[must_use]
    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    async fn infer(&self, prompt: &Prompt, constraints: &InferenceConstraints) -> Result<String, ModelError> {
        let request = GenerateRequest {
            model: &self.config.model,
            prompt: &prompt.user,
            system: &prompt.system,
            stream: false,
            format: match constraints.format {
                ResponseFormat::Json => Some("json"),
                ResponseFormat::Text => None,
            },
            options: GenerateOptions {
                num_predict: constraints.max_tokens,
                temperature: constraints.temperature,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .timeout(constraints.timeout)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(body.char_indices().nth(200).map_or(body.len(), |(i, _)| i));
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let generated: GenerateResponse = response.json().await?;
        Ok(generated.response)
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}
