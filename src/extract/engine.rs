use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::extract::dates;
use crate::extract::patterns::PatternCatalog;
use crate::extract::types::{
    ActionItem, Category, DateKind, ExtractedDate, ExtractionMethod, ExtractionResult, Priority,
};
use crate::message::EmailMessage;

/// Mines free-form email text for action items and dates. Pure synchronous
/// computation; never fails, only produces smaller result sets.
pub struct ExtractionEngine {
    catalog: PatternCatalog,
}

impl ExtractionEngine {
    pub fn new() -> Self {
        Self {
            catalog: PatternCatalog::with_builtins(),
        }
    }

    pub fn with_catalog(catalog: PatternCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &PatternCatalog {
        &self.catalog
    }

    /// Extract from a message, anchoring relative dates to the message's own
    /// timestamp ("tomorrow" means the day after the mail was sent).
    pub fn extract(&self, message: &EmailMessage) -> ExtractionResult {
        self.extract_at(&message.subject, &message.body, message.timestamp)
    }

    pub fn extract_at(
        &self,
        subject: &str,
        body: &str,
        anchor: DateTime<Utc>,
    ) -> ExtractionResult {
        let buffer = if subject.trim().is_empty() {
            body.to_string()
        } else {
            format!("{subject}\n{body}")
        };
        if buffer.trim().is_empty() {
            return ExtractionResult::empty();
        }

        // Standalone date pass, independent of action matching.
        let mut dates: Vec<ExtractedDate> = Vec::new();
        for m in dates::detect(&buffer, anchor) {
            if dates.iter().any(|d| d.text == m.text) {
                continue;
            }
            let kind = classify_kind(&buffer, m.start);
            dates.push(ExtractedDate {
                text: m.text,
                resolved: m.resolved,
                kind,
                confidence: m.confidence,
            });
        }

        let sentences = sentence_spans(&buffer);
        let mut items: Vec<ActionItem> = Vec::new();
        let mut seen: HashSet<(String, Category)> = HashSet::new();

        for pattern in self.catalog.snapshot() {
            for caps in pattern.regex.captures_iter(&buffer) {
                let Some(whole) = caps.get(0) else { continue };
                let phrase = caps
                    .get(1)
                    .map(|m| m.as_str())
                    .unwrap_or(whole.as_str())
                    .trim();
                if phrase.is_empty() {
                    continue;
                }

                let mut due = caps
                    .get(2)
                    .and_then(|clause| dates::resolve(clause.as_str(), anchor));
                if due.is_none() && pattern.requires_date {
                    due = nearby_date(&buffer, &sentences, whole.start(), anchor);
                }
                if pattern.requires_date && due.is_none() {
                    debug!(pattern = %pattern.name, %phrase, "no date found for date-bound action, dropping");
                    continue;
                }

                let item = ActionItem {
                    text: phrase.to_string(),
                    due,
                    priority: pattern.priority,
                    category: pattern.category,
                    completed: false,
                };
                // First occurrence wins; later duplicates are absorbed.
                if seen.insert(item.key()) {
                    items.push(item);
                }
            }
        }

        let any_date = !dates.is_empty() || items.iter().any(|i| i.due.is_some());
        let high = items.iter().filter(|i| i.priority == Priority::High).count();
        let confidence = (0.5
            + (0.1 * items.len() as f32).min(0.3)
            + if any_date { 0.2 } else { 0.0 }
            + 0.1 * high as f32)
            .min(1.0);

        ExtractionResult {
            items,
            dates,
            confidence,
            method: ExtractionMethod::Heuristic,
        }
    }
}

impl Default for ExtractionEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Sentence windows over the buffer, delimited by `.`, `!`, `?`.
fn sentence_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if matches!(c, '.' | '!' | '?') {
            let end = i + c.len_utf8();
            spans.push((start, end));
            start = end;
        }
    }
    if start < text.len() {
        spans.push((start, text.len()));
    }
    spans
}

/// Resolve a date for an action with no inline date clause: search the
/// sentence containing the action, then the one before it, then the one
/// after, in that order.
fn nearby_date(
    buffer: &str,
    sentences: &[(usize, usize)],
    offset: usize,
    anchor: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let idx = sentences
        .iter()
        .position(|&(s, e)| offset >= s && offset < e)?;

    let mut order: Vec<usize> = vec![idx];
    if idx > 0 {
        order.push(idx - 1);
    }
    if idx + 1 < sentences.len() {
        order.push(idx + 1);
    }

    for i in order {
        let (s, e) = sentences[i];
        if let Some(found) = dates::find_first(&buffer[s..e], anchor) {
            return Some(found.resolved);
        }
    }
    None
}

fn classify_kind(buffer: &str, span_start: usize) -> DateKind {
    let window = context_before(buffer, span_start, 32).to_lowercase();
    const DEADLINE: [&str; 6] = ["by ", "due", "before", "deadline", "until", "no later"];
    const MEETING: [&str; 6] = ["meet", "call", "sync", "appointment", "schedule", "standup"];
    const EVENT: [&str; 5] = ["event", "conference", "webinar", "launch", "party"];

    if DEADLINE.iter().any(|k| window.contains(k)) {
        DateKind::Deadline
    } else if MEETING.iter().any(|k| window.contains(k)) {
        DateKind::Meeting
    } else if EVENT.iter().any(|k| window.contains(k)) {
        DateKind::Event
    } else {
        DateKind::General
    }
}

fn context_before(text: &str, end: usize, max: usize) -> &str {
    let mut begin = end.saturating_sub(max);
    while begin > 0 && !text.is_char_boundary(begin) {
        begin -= 1;
    }
    &text[begin..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::patterns::ActionPattern;
    use chrono::{Datelike, TimeZone};

    fn anchor() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 12, 1, 8, 0, 0).unwrap()
    }

    fn extract(body: &str) -> ExtractionResult {
        ExtractionEngine::new().extract_at("", body, anchor())
    }

    #[test]
    fn review_sentence_yields_one_dated_item() {
        let result = extract("Please review the document by Friday, December 15th.");

        assert_eq!(result.items.len(), 1);
        let item = &result.items[0];
        assert!(item.text.contains("review the document"));
        assert_eq!(item.category, Category::Review);
        assert_eq!(item.due.unwrap().day(), 15);
    }

    #[test]
    fn urgent_sentence_yields_one_high_priority_item() {
        let result = extract("URGENT: Fix the critical bug immediately.");

        assert_eq!(result.items.len(), 1);
        let item = &result.items[0];
        assert_eq!(item.priority, Priority::High);
        assert_eq!(item.category, Category::Urgent);
        assert!(!item.completed);
    }

    #[test]
    fn empty_input_yields_empty_result() {
        let result = extract("");
        assert!(result.items.is_empty());
        assert!(result.dates.is_empty());
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.method, ExtractionMethod::Heuristic);
    }

    #[test]
    fn pathological_input_does_not_panic() {
        for body in ["....", "!!!", "/// 99/99/9999", "§±≠ by ", "\n\n\n"] {
            let result = extract(body);
            assert!((0.0..=1.0).contains(&result.confidence));
        }
    }

    #[test]
    fn duplicate_matches_are_absorbed() {
        let result = extract("Please review the budget. Please review the budget.");
        assert_eq!(result.items.len(), 1);
    }

    #[test]
    fn extraction_is_idempotent_at_a_fixed_anchor() {
        let body = "URGENT: patch the server. Schedule a retro for next week. \
                    Don't forget to send the minutes by tomorrow.";
        let a = extract(body);
        let b = extract(body);

        let keys = |r: &ExtractionResult| {
            let mut k: Vec<_> = r.items.iter().map(ActionItem::key).collect();
            k.sort();
            k
        };
        let date_texts = |r: &ExtractionResult| {
            let mut t: Vec<_> = r.dates.iter().map(|d| d.text.clone()).collect();
            t.sort();
            t
        };
        assert_eq!(keys(&a), keys(&b));
        assert_eq!(date_texts(&a), date_texts(&b));
        assert_eq!(a.confidence, b.confidence);
    }

    #[test]
    fn date_bound_pattern_resolves_from_neighboring_sentence() {
        let result = extract("We should meet with the vendor. Ideally tomorrow.");

        let item = result
            .items
            .iter()
            .find(|i| i.category == Category::Scheduling)
            .unwrap();
        assert_eq!(item.due.unwrap().day(), 2);
    }

    #[test]
    fn date_bound_pattern_prefers_preceding_over_following_sentence() {
        let result = extract(
            "Numbers land on March 5. Please schedule a budget session. We ship in 2 weeks.",
        );

        let item = result
            .items
            .iter()
            .find(|i| i.category == Category::Scheduling)
            .unwrap();
        let due = item.due.unwrap();
        assert_eq!((due.month(), due.day()), (3, 5));
    }

    #[test]
    fn date_bound_pattern_without_any_date_is_discarded() {
        let result = extract("Let's schedule a kickoff.");
        assert!(result.items.is_empty());
    }

    #[test]
    fn confidence_is_clamped_to_one() {
        let result = extract(
            "URGENT: fix the gateway. URGENT: rotate the keys. URGENT: page the on-call. \
             URGENT: patch the edge nodes. Submit the incident report by tomorrow.",
        );
        assert!(result.items.len() >= 5);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn confidence_formula_components() {
        // One medium item, one resolved date: 0.5 + 0.1 + 0.2.
        let result = extract("Please send the slides by tomorrow.");
        assert_eq!(result.items.len(), 1);
        assert!((result.confidence - 0.8).abs() < 1e-5);
    }

    #[test]
    fn hybrid_merge_is_a_superset_of_the_heuristic_items() {
        let heuristic = extract("Please review the budget. URGENT: restart the cluster.");
        let heuristic_keys: Vec<_> = heuristic.items.iter().map(ActionItem::key).collect();

        let external = ExtractionResult {
            items: vec![ActionItem::new(
                "circulate the agenda",
                Priority::Medium,
                Category::Communication,
            )],
            dates: Vec::new(),
            confidence: 0.6,
            method: ExtractionMethod::Llm,
        };

        let hybrid = heuristic.merge(external);
        assert_eq!(hybrid.method, ExtractionMethod::Hybrid);
        for key in heuristic_keys {
            assert!(hybrid.items.iter().any(|i| i.key() == key));
        }
        assert!(
            hybrid
                .items
                .iter()
                .any(|i| i.text == "circulate the agenda")
        );
    }

    #[test]
    fn no_two_items_share_an_identity_pair() {
        let result = extract(
            "Please review the roadmap. URGENT: review the roadmap. \
             You need to review the roadmap. Don't forget to call Dana.",
        );
        let mut keys: Vec<_> = result.items.iter().map(ActionItem::key).collect();
        let total = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), total);
    }

    #[test]
    fn custom_patterns_participate_in_extraction() {
        let engine = ExtractionEngine::new();
        engine
            .catalog()
            .add(
                ActionPattern::new(
                    "expense",
                    r"(?i)\b(file\s+your\s+expense\s+report)\b",
                    Priority::Low,
                    Category::General,
                    false,
                )
                .unwrap(),
            );

        let result = engine.extract_at("", "File your expense report.", anchor());
        assert!(result.items.iter().any(|i| i.category == Category::General));

        engine.catalog().remove("expense");
        let result = engine.extract_at("", "File your expense report.", anchor());
        assert!(result.items.is_empty());
    }

    #[test]
    fn standalone_dates_are_classified_by_context() {
        let result = extract("The all-hands meeting is on Tuesday. Invoices are due December 20.");
        let tuesday = result
            .dates
            .iter()
            .find(|d| d.text.to_lowercase().contains("tuesday"))
            .unwrap();
        assert_eq!(tuesday.kind, DateKind::Meeting);

        let due = result
            .dates
            .iter()
            .find(|d| d.text.contains("December 20"))
            .unwrap();
        assert_eq!(due.kind, DateKind::Deadline);
    }

    #[test]
    fn subject_participates_in_the_scan_buffer() {
        let engine = ExtractionEngine::new();
        let result = engine.extract_at("URGENT: server down", "Customers are affected.", anchor());
        assert!(result.items.iter().any(|i| i.category == Category::Urgent));
    }
}
