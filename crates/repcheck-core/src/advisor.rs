//! Optional failure explanations from a local Ollama server.
//!
//! Everything here is advisory: an unreachable server, a non-200 status or
//! an unexpected payload all collapse to "no explanation".

use std::path::Path;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AdvisorConfig;
use crate::types::Language;

#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("advisor request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("advisor returned status {status} from {url}")]
    Status { url: String, status: StatusCode },
    #[error("advisor returned an empty response")]
    Empty,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Client for Ollama's `/api/generate` endpoint.
pub struct OllamaAdvisor {
    client: Client,
    base_url: String,
    model: String,
    temperature: f64,
    probe_timeout: Duration,
    request_timeout: Duration,
}

impl OllamaAdvisor {
    pub fn new(config: &AdvisorConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            probe_timeout: Duration::from_secs(config.probe_timeout_secs),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    /// `true` if the server answers `GET /api/tags` with 200.
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self
            .client
            .get(&url)
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(resp) => resp.status() == StatusCode::OK,
            Err(e) => {
                tracing::debug!("advisor not reachable at {url}: {e}");
                false
            }
        }
    }

    /// Ask for an explanation of a failing script. Never fails.
    pub async fn explain(&self, script: &Path, error: &str, language: Language) -> Option<String> {
        match self.generate(build_prompt(script, error, language)).await {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::debug!(script = %script.display(), "no explanation: {e}");
                None
            }
        }
    }

    async fn generate(&self, prompt: String) -> Result<String, AdvisorError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
            },
        };

        let resp = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|source| AdvisorError::Http {
                url: url.clone(),
                source,
            })?;

        if resp.status() != StatusCode::OK {
            return Err(AdvisorError::Status {
                url,
                status: resp.status(),
            });
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|source| AdvisorError::Http { url, source })?;
        let text = parsed.response.trim();
        if text.is_empty() {
            return Err(AdvisorError::Empty);
        }
        Ok(text.to_string())
    }
}

fn build_prompt(script: &Path, error: &str, language: Language) -> String {
    format!(
        "You are a {lang} programming expert. Analyze this error and explain the likely cause and how to fix it.\n\n\
         Script: {script}\n\
         Error: {error}\n\n\
         Keep response under 100 words.",
        lang = language.display_name(),
        script = script.display(),
    )
}
