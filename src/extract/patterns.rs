use std::sync::{PoisonError, RwLock};

use regex::Regex;

use crate::extract::types::{Category, Priority};

/// A linguistic extraction rule. Capture group 1 of the expression is the
/// action phrase; an optional capture group 2 is an inline date clause.
#[derive(Debug, Clone)]
pub struct ActionPattern {
    pub name: String,
    pub regex: Regex,
    pub priority: Priority,
    pub category: Category,
    pub requires_date: bool,
}

impl ActionPattern {
    pub fn new(
        name: impl Into<String>,
        expression: &str,
        priority: Priority,
        category: Category,
        requires_date: bool,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            regex: Regex::new(expression)?,
            priority,
            category,
            requires_date,
        })
    }
}

/// The ordered rule table. Order only affects scan order, not output
/// semantics. Mutations are atomic: `snapshot` hands readers an immutable
/// copy, so a reader never observes a catalog mid-mutation.
pub struct PatternCatalog {
    patterns: RwLock<Vec<ActionPattern>>,
}

impl PatternCatalog {
    pub fn with_builtins() -> Self {
        Self {
            patterns: RwLock::new(builtin_patterns()),
        }
    }

    pub fn empty() -> Self {
        Self {
            patterns: RwLock::new(Vec::new()),
        }
    }

    /// Append a custom rule after the built-ins.
    pub fn add(&self, pattern: ActionPattern) {
        self.patterns
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(pattern);
    }

    /// Remove every rule with the given name. Returns how many were dropped.
    pub fn remove(&self, name: &str) -> usize {
        let mut patterns = self
            .patterns
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = patterns.len();
        patterns.retain(|p| p.name != name);
        before - patterns.len()
    }

    /// An immutable copy of the current rule list, in scan order.
    pub fn snapshot(&self) -> Vec<ActionPattern> {
        self.patterns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.patterns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PatternCatalog {
    fn default() -> Self {
        Self::with_builtins()
    }
}

macro_rules! builtin {
    ($name:literal, $expr:literal, $priority:ident, $category:ident, $requires_date:literal) => {
        ActionPattern {
            name: $name.to_string(),
            regex: Regex::new($expr).unwrap(),
            priority: Priority::$priority,
            category: Category::$category,
            requires_date: $requires_date,
        }
    };
}

fn builtin_patterns() -> Vec<ActionPattern> {
    vec![
        builtin!(
            "urgent-prefix",
            r"(?i)\b(?:urgent|asap|emergency|action\s+required)\b[:\s,-]*([^.!?\n]+)",
            High,
            Urgent,
            false
        ),
        builtin!(
            "deadline",
            r"(?i)\b((?:submit|send\s+in|deliver|complete|finish|turn\s+in)\s+[^.!?,\n]+?)\s+(?:by|before|no\s+later\s+than)\s+([^.!?\n]+)",
            High,
            General,
            true
        ),
        builtin!(
            "review",
            r"(?i)\b((?:review|approve|proofread|go\s+over|look\s+over|sign\s+off\s+on)\s+[^.!?,\n]+?)(?:\s+(?:by|before)\s+([^.!?\n]+?))?\s*(?:[.!?\n]|$)",
            Medium,
            Review,
            false
        ),
        builtin!(
            "scheduling",
            r"(?i)\b((?:schedule|set\s+up|arrange|book|plan)\s+(?:a\s+|an\s+|the\s+)?[^.!?,\n]+?)(?:\s+(?:for|on|at)\s+([^.!?\n]+?))?\s*(?:[.!?\n]|$)",
            Medium,
            Scheduling,
            true
        ),
        builtin!(
            "meeting",
            r"(?i)\b((?:meeting|meet)\s+with\s+[^.!?,\n]+?)(?:\s+(?:on|at)\s+([^.!?\n]+?))?\s*(?:[.!?\n]|$)",
            Medium,
            Scheduling,
            true
        ),
        builtin!(
            "communication",
            r"(?i)\b((?:call|email|contact|reply\s+to|respond\s+to|get\s+back\s+to|follow\s+up\s+with)\s+[^.!?,\n]+?)(?:\s+(?:by|before)\s+([^.!?\n]+?))?\s*(?:[.!?\n]|$)",
            Medium,
            Communication,
            false
        ),
        builtin!(
            "request",
            r"(?i)\b(?:please|kindly|could\s+you|can\s+you|would\s+you)\s+((?:send|share|provide|prepare|update|confirm|forward|upload)\s+[^.!?,\n]+?)(?:\s+(?:by|before)\s+([^.!?\n]+?))?\s*(?:[.!?\n]|$)",
            Medium,
            Request,
            false
        ),
        builtin!(
            "reminder",
            r"(?i)\b(?:remember|don'?t\s+forget|be\s+sure)\s+to\s+([^.!?,\n]+?)(?:\s+(?:by|before)\s+([^.!?\n]+?))?\s*(?:[.!?\n]|$)",
            Low,
            Reminder,
            false
        ),
        builtin!(
            "need-to",
            r"(?i)\b(?:we|you|i)\s+(?:need|have)\s+to\s+([^.!?,\n]+?)(?:\s+(?:by|before)\s+([^.!?\n]+?))?\s*(?:[.!?\n]|$)",
            Medium,
            General,
            false
        ),
    ]
}
