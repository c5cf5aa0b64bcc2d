use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;

use crate::analyze::collab::CloudInference;
use crate::analyze::schema::{ANALYSIS_FORMAT_PROMPT, ModelAnalysis};
use crate::analyze::types::{AnalysisKind, AnalysisResult, Provenance, Settings};
use crate::message::EmailMessage;

/// Cloud inference against an OpenAI-compatible chat-completions endpoint.
pub struct OpenAiCompatProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn system_prompt(kind: AnalysisKind) -> String {
        let focus = match kind {
            AnalysisKind::Full => "the full analysis",
            AnalysisKind::Summary => "the summary; keep the other fields minimal",
            AnalysisKind::ActionItems => "action items and dates; keep the other fields minimal",
            AnalysisKind::Reply => "reply suggestions; keep the other fields minimal",
        };
        format!("You analyze emails. Produce {focus}.\n{ANALYSIS_FORMAT_PROMPT}")
    }
}

#[async_trait]
impl CloudInference for OpenAiCompatProvider {
    async fn analyze(
        &self,
        message: &EmailMessage,
        kind: AnalysisKind,
        _settings: &Settings,
    ) -> Result<AnalysisResult> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": Self::system_prompt(kind)},
                {"role": "user", "content": format!(
                    "Subject: {}\nFrom: {}\n\n{}",
                    message.subject, message.sender, message.body
                )},
            ],
            "temperature": 0.2,
            "response_format": {"type": "json_object"},
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("cloud request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("cloud provider returned {}", response.status()));
        }

        let payload: serde_json::Value = response.json().await?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("cloud completion missing content"))?;

        let parsed: ModelAnalysis =
            serde_json::from_str(content).context("malformed cloud completion")?;
        Ok(parsed.into_result(&message.id, Provenance::Cloud))
    }
}
