use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::extract::types::{ActionItem, ExtractedDate, Priority};

/// Which tier ultimately produced a result. Heuristic and minimal fallback
/// results run on-device and carry `Local`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Local,
    Cloud,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

/// The closed set of analysis operations a caller can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    Full,
    Summary,
    ActionItems,
    Reply,
}

/// The unit cached and returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub message_id: String,
    pub summary: String,
    pub action_items: Vec<ActionItem>,
    pub suggested_replies: Vec<String>,
    pub grammar_issues: Vec<String>,
    pub sentiment: Sentiment,
    pub priority: Priority,
    pub categories: Vec<String>,
    pub dates: Vec<ExtractedDate>,
    pub created_at: DateTime<Utc>,
    pub provenance: Provenance,
}

/// Orchestrator options, as surfaced in the extension's settings page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub enable_local_processing: bool,
    pub enable_cloud_fallback: bool,
    pub enable_pii_redaction: bool,
    pub enable_caching: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enable_local_processing: true,
            enable_cloud_fallback: true,
            enable_pii_redaction: true,
            enable_caching: true,
        }
    }
}

/// The single analysis failure a caller must surface to the user. Every other
/// tier failure is recovered internally by escalating to the next tier.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("local processing is disabled and no cached result is available")]
    LocalProcessingDisabled,
}
