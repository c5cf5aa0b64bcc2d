use anyhow::Result;
use async_trait::async_trait;

use crate::analyze::types::{AnalysisKind, AnalysisResult, Settings};
use crate::extract::types::ExtractionResult;
use crate::message::EmailMessage;

/// On-device model inference.
#[async_trait]
pub trait LocalInference: Send + Sync {
    async fn analyze(&self, message: &EmailMessage) -> Result<AnalysisResult>;
}

/// A configured cloud provider. Must only ever receive an already-redacted
/// message when PII redaction is enabled; the orchestrator enforces that.
#[async_trait]
pub trait CloudInference: Send + Sync {
    async fn analyze(
        &self,
        message: &EmailMessage,
        kind: AnalysisKind,
        settings: &Settings,
    ) -> Result<AnalysisResult>;
}

/// Strips PII before a message leaves the device. Returns the redacted copy
/// and a human-readable summary of what was removed.
#[async_trait]
pub trait PiiRedactor: Send + Sync {
    async fn redact(&self, message: &EmailMessage) -> Result<(EmailMessage, String)>;
}

/// Model-backed action extraction, merged into heuristic results when
/// available (hybrid mode).
#[async_trait]
pub trait ActionExtractor: Send + Sync {
    async fn extract_actions(&self, message: &EmailMessage) -> Result<ExtractionResult>;
}

/// Result cache keyed by message id; expiry is owned by the implementation.
#[async_trait]
pub trait AnalysisCache: Send + Sync {
    async fn get(&self, message_id: &str) -> Option<AnalysisResult>;
    async fn set(&self, message_id: &str, result: &AnalysisResult);
}

/// Reports whether the system is in a declared offline/degraded mode.
pub trait NetworkState: Send + Sync {
    fn is_offline(&self) -> bool;
}

/// Default network state: never declared offline.
pub struct AlwaysOnline;

impl NetworkState for AlwaysOnline {
    fn is_offline(&self) -> bool {
        false
    }
}
