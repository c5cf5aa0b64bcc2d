use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An email as handed to the analysis core. Immutable once received; the
/// scraping/transport layers that produce it are outside this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub thread_id: Option<String>,
}

impl EmailMessage {
    pub fn new(id: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subject: subject.into(),
            sender: String::new(),
            body: body.into(),
            timestamp: Utc::now(),
            thread_id: None,
        }
    }

    /// Subject and body joined into one scanning buffer.
    pub fn scan_buffer(&self) -> String {
        if self.subject.trim().is_empty() {
            self.body.clone()
        } else {
            format!("{}\n{}", self.subject, self.body)
        }
    }
}
