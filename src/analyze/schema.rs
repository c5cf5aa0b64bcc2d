use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::analyze::types::{AnalysisResult, Provenance, Sentiment};
use crate::extract::types::{
    ActionItem, Category, DateKind, ExtractedDate, ExtractionMethod, ExtractionResult, Priority,
};

/// The JSON shape both model backends are asked to produce. Every field is
/// optional so a partially well-formed completion still maps to a result.
#[derive(Debug, Deserialize)]
pub struct ModelAnalysis {
    #[serde(default)]
    pub summary: String,
    pub sentiment: Option<String>,
    pub priority: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub suggested_replies: Vec<String>,
    #[serde(default)]
    pub grammar_issues: Vec<String>,
    #[serde(default)]
    pub action_items: Vec<ModelActionItem>,
    #[serde(default)]
    pub dates: Vec<ModelDate>,
    pub confidence: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub struct ModelActionItem {
    pub text: String,
    pub due: Option<String>,
    pub priority: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ModelDate {
    pub text: String,
    pub resolved: Option<String>,
}

impl ModelAnalysis {
    pub fn into_result(self, message_id: &str, provenance: Provenance) -> AnalysisResult {
        AnalysisResult {
            message_id: message_id.to_string(),
            summary: self.summary,
            action_items: self.action_items.into_iter().map(ModelActionItem::into_item).collect(),
            suggested_replies: self.suggested_replies,
            grammar_issues: self.grammar_issues,
            sentiment: parse_sentiment(self.sentiment.as_deref()),
            priority: parse_priority(self.priority.as_deref()),
            categories: self.categories,
            dates: self
                .dates
                .into_iter()
                .filter_map(ModelDate::into_date)
                .collect(),
            created_at: Utc::now(),
            provenance,
        }
    }

    /// Map a model completion into an extraction result for hybrid merging.
    pub fn into_extraction(self) -> ExtractionResult {
        let confidence = self.confidence.unwrap_or(0.85).clamp(0.0, 1.0);
        ExtractionResult {
            items: self.action_items.into_iter().map(ModelActionItem::into_item).collect(),
            dates: self
                .dates
                .into_iter()
                .filter_map(ModelDate::into_date)
                .collect(),
            confidence,
            method: ExtractionMethod::Llm,
        }
    }
}

impl ModelActionItem {
    fn into_item(self) -> ActionItem {
        ActionItem {
            text: self.text,
            due: self
                .due
                .as_deref()
                .and_then(parse_instant),
            priority: parse_priority(self.priority.as_deref()),
            category: parse_category(self.category.as_deref()),
            completed: false,
        }
    }
}

impl ModelDate {
    fn into_date(self) -> Option<ExtractedDate> {
        let resolved = self.resolved.as_deref().and_then(parse_instant)?;
        Some(ExtractedDate {
            text: self.text,
            resolved,
            kind: DateKind::General,
            confidence: 0.85,
        })
    }
}

fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_priority(s: Option<&str>) -> Priority {
    match s.map(str::to_lowercase).as_deref() {
        Some("high") | Some("urgent") => Priority::High,
        Some("low") => Priority::Low,
        _ => Priority::Medium,
    }
}

fn parse_sentiment(s: Option<&str>) -> Sentiment {
    match s.map(str::to_lowercase).as_deref() {
        Some("positive") => Sentiment::Positive,
        Some("negative") => Sentiment::Negative,
        _ => Sentiment::Neutral,
    }
}

fn parse_category(s: Option<&str>) -> Category {
    match s.map(str::to_lowercase).as_deref() {
        Some("urgent") => Category::Urgent,
        Some("scheduling") => Category::Scheduling,
        Some("review") => Category::Review,
        Some("communication") => Category::Communication,
        Some("request") => Category::Request,
        Some("reminder") => Category::Reminder,
        _ => Category::General,
    }
}

/// Instructions shared by both model backends.
pub const ANALYSIS_FORMAT_PROMPT: &str = r#"Respond with a single JSON object:
{"summary": string, "sentiment": "positive"|"neutral"|"negative", "priority": "high"|"medium"|"low", "categories": [string], "suggested_replies": [string], "grammar_issues": [string], "action_items": [{"text": string, "due": ISO-8601 string or null, "priority": "high"|"medium"|"low", "category": "urgent"|"scheduling"|"review"|"communication"|"request"|"reminder"|"general"}], "dates": [{"text": string, "resolved": ISO-8601 string or null}]}"#;
