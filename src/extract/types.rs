use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Urgent,
    Scheduling,
    Review,
    Communication,
    Request,
    Reminder,
    General,
}

/// What a detected date seems to be for, judged from surrounding words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateKind {
    Deadline,
    Meeting,
    Event,
    General,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedDate {
    /// The span of message text the date was read from.
    pub text: String,
    pub resolved: DateTime<Utc>,
    pub kind: DateKind,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionItem {
    pub text: String,
    pub due: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub category: Category,
    /// Always false at creation; flipped only by layers outside this core.
    pub completed: bool,
}

impl ActionItem {
    pub fn new(text: impl Into<String>, priority: Priority, category: Category) -> Self {
        Self {
            text: text.into(),
            due: None,
            priority,
            category,
            completed: false,
        }
    }

    /// Deduplication identity: two items sharing this key are the same item.
    pub fn key(&self) -> (String, Category) {
        (self.text.to_lowercase(), self.category)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    Heuristic,
    Llm,
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub items: Vec<ActionItem>,
    pub dates: Vec<ExtractedDate>,
    pub confidence: f32,
    pub method: ExtractionMethod,
}

impl ExtractionResult {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            dates: Vec::new(),
            confidence: 0.0,
            method: ExtractionMethod::Heuristic,
        }
    }

    /// Merge an externally (LLM-) sourced extraction into this one.
    ///
    /// Items union under the (lower-cased text, category) identity with the
    /// existing side winning; dates union by exact text; confidence takes the
    /// max of the two sides and the method becomes `hybrid`.
    pub fn merge(mut self, external: ExtractionResult) -> ExtractionResult {
        for item in external.items {
            if !self.items.iter().any(|i| i.key() == item.key()) {
                self.items.push(item);
            }
        }
        for date in external.dates {
            if !self.dates.iter().any(|d| d.text == date.text) {
                self.dates.push(date);
            }
        }
        self.confidence = self.confidence.max(external.confidence);
        self.method = ExtractionMethod::Hybrid;
        self
    }
}
