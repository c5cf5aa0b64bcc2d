use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::analyze::types::{AnalysisResult, Provenance, Sentiment};
use crate::extract::types::{ActionItem, Category, ExtractionResult, Priority};
use crate::message::EmailMessage;

static SENTENCE_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+\s*").unwrap());

const SUMMARY_KEYWORDS: [&str; 10] = [
    "deadline", "urgent", "important", "please", "meeting", "action", "confirm", "due",
    "schedule", "decision",
];

const POSITIVE_WORDS: [&str; 8] = [
    "thanks", "thank", "great", "appreciate", "happy", "excellent", "congrats", "welcome",
];
const NEGATIVE_WORDS: [&str; 9] = [
    "issue", "problem", "unfortunately", "delay", "concern", "fail", "error", "complaint",
    "sorry",
];

const HIGH_PRIORITY_MARKERS: [&str; 6] =
    ["urgent", "asap", "immediately", "critical", "emergency", "right away"];
const LOW_PRIORITY_MARKERS: [&str; 4] = ["no rush", "whenever", "fyi", "low priority"];

const CATEGORY_KEYWORDS: [(&str, &[&str]); 5] = [
    ("scheduling", &["meeting", "schedule", "calendar", "invite", "appointment"]),
    ("finance", &["invoice", "payment", "budget", "expense", "receipt"]),
    ("work", &["project", "report", "deadline", "review", "task"]),
    ("travel", &["flight", "hotel", "itinerary", "booking", "trip"]),
    ("social", &["party", "dinner", "lunch", "celebration"]),
];

/// Deterministic fallback analysis: extractive summary plus keyword scoring,
/// assembled around an already-computed extraction.
pub fn heuristic_analysis(message: &EmailMessage, extraction: ExtractionResult) -> AnalysisResult {
    let lower = message.scan_buffer().to_lowercase();
    AnalysisResult {
        message_id: message.id.clone(),
        summary: extractive_summary(&message.subject, &message.body),
        action_items: extraction.items,
        suggested_replies: Vec::new(),
        grammar_issues: Vec::new(),
        sentiment: keyword_sentiment(&lower),
        priority: keyword_priority(&lower),
        categories: keyword_categories(&lower),
        dates: extraction.dates,
        created_at: Utc::now(),
        provenance: Provenance::Local,
    }
}

/// Terminal tier: cannot fail on any input. Trivial word-count-bucket summary
/// and a crude urgency check only.
pub fn minimal_analysis(message: &EmailMessage) -> AnalysisResult {
    let buffer = message.scan_buffer();
    let words = buffer.split_whitespace().count();
    let topic = if message.subject.trim().is_empty() {
        "general matters".to_string()
    } else {
        format!("\"{}\"", message.subject.trim())
    };

    let summary = match words {
        0 => "Empty message.".to_string(),
        1..=24 => format!("A short note about {topic}."),
        25..=149 => format!("A brief email about {topic}."),
        _ => format!("A longer email about {topic}."),
    };

    let lower = buffer.to_lowercase();
    let urgent = lower.contains("urgent") || lower.contains("asap");
    let action_items = if urgent {
        vec![ActionItem::new(
            "Follow up on this message",
            Priority::High,
            Category::Urgent,
        )]
    } else {
        Vec::new()
    };

    AnalysisResult {
        message_id: message.id.clone(),
        summary,
        action_items,
        suggested_replies: Vec::new(),
        grammar_issues: Vec::new(),
        sentiment: Sentiment::Neutral,
        priority: if urgent { Priority::High } else { Priority::Medium },
        categories: Vec::new(),
        dates: Vec::new(),
        created_at: Utc::now(),
        provenance: Provenance::Local,
    }
}

/// Pick the two highest-scoring sentences, kept in original order.
fn extractive_summary(subject: &str, body: &str) -> String {
    let sentences: Vec<&str> = SENTENCE_SPLIT
        .split(body)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if sentences.is_empty() {
        return if subject.trim().is_empty() {
            "(no content)".to_string()
        } else {
            subject.trim().to_string()
        };
    }

    let mut scored: Vec<(usize, i32)> = sentences
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let lower = s.to_lowercase();
            let keywords = SUMMARY_KEYWORDS
                .iter()
                .filter(|k| lower.contains(*k))
                .count() as i32;
            let position = match i {
                0 => 2,
                1 => 1,
                _ => 0,
            };
            let length_penalty = if s.len() > 200 { -1 } else { 0 };
            (i, keywords * 2 + position + length_penalty)
        })
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    let mut picked: Vec<usize> = scored.iter().take(2).map(|(i, _)| *i).collect();
    picked.sort_unstable();

    picked
        .into_iter()
        .map(|i| format!("{}.", sentences[i].trim_end_matches('.')))
        .collect::<Vec<_>>()
        .join(" ")
}

fn keyword_sentiment(lower: &str) -> Sentiment {
    let positive = POSITIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();
    let negative = NEGATIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();
    if positive > negative {
        Sentiment::Positive
    } else if negative > positive {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    }
}

// Message-level priority from keywords alone. Per-item priorities stay fixed
// by their matching pattern; the two signals are allowed to disagree.
fn keyword_priority(lower: &str) -> Priority {
    if HIGH_PRIORITY_MARKERS.iter().any(|m| lower.contains(m)) {
        Priority::High
    } else if LOW_PRIORITY_MARKERS.iter().any(|m| lower.contains(m)) {
        Priority::Low
    } else {
        Priority::Medium
    }
}

fn keyword_categories(lower: &str) -> Vec<String> {
    CATEGORY_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(name, _)| name.to_string())
        .collect()
}
