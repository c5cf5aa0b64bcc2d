use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::{Duration, timeout};

use crate::analyze::collab::{ActionExtractor, LocalInference};
use crate::analyze::schema::{ANALYSIS_FORMAT_PROMPT, ModelAnalysis};
use crate::analyze::types::{AnalysisResult, Provenance};
use crate::extract::types::ExtractionResult;
use crate::message::EmailMessage;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "qwen2.5:7b";
const REQUEST_TIMEOUT_MS: u64 = 15000;

#[derive(Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    format: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Error)]
pub enum OllamaError {
    #[error("ollama request timed out")]
    Timeout,
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("malformed model output: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Local inference over the Ollama HTTP API.
pub struct OllamaAnalyzer {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaAnalyzer {
    pub fn new(base_url: Option<String>, model: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    async fn generate(&self, prompt: String) -> Result<ModelAnalysis, OllamaError> {
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt,
            stream: false,
            format: "json".to_string(),
        };

        // Bounded wait so a cold model cannot hang the tier.
        let response = timeout(
            Duration::from_millis(REQUEST_TIMEOUT_MS),
            self.client
                .post(format!("{}/api/generate", self.base_url))
                .json(&request)
                .send(),
        )
        .await
        .map_err(|_| OllamaError::Timeout)??;

        let body: GenerateResponse = response.json().await?;
        Ok(serde_json::from_str(&body.response)?)
    }

    fn analysis_prompt(&self, message: &EmailMessage) -> String {
        format!(
            "Analyze this email and produce a summary, sentiment, priority, categories, \
             reply suggestions and action items.\n{ANALYSIS_FORMAT_PROMPT}\n\n\
             Subject: {}\nFrom: {}\n\n{}",
            message.subject, message.sender, message.body
        )
    }

    fn extraction_prompt(&self, message: &EmailMessage) -> String {
        format!(
            "List the action items and dates in this email. Leave the other fields empty.\n\
             {ANALYSIS_FORMAT_PROMPT}\n\nSubject: {}\n\n{}",
            message.subject, message.body
        )
    }

    pub async fn health_check(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .is_ok()
    }
}

#[async_trait]
impl LocalInference for OllamaAnalyzer {
    async fn analyze(&self, message: &EmailMessage) -> Result<AnalysisResult> {
        let parsed = self.generate(self.analysis_prompt(message)).await?;
        Ok(parsed.into_result(&message.id, Provenance::Local))
    }
}

#[async_trait]
impl ActionExtractor for OllamaAnalyzer {
    async fn extract_actions(&self, message: &EmailMessage) -> Result<ExtractionResult> {
        let parsed = self.generate(self.extraction_prompt(message)).await?;
        Ok(parsed.into_extraction())
    }
}
