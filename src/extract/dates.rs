use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use chrono_english::{Dialect, parse_date_string};
use once_cell::sync::Lazy;
use regex::Regex;

// Form confidences, ranked: explicit numeric dates > named months > relative
// keywords > bare weekday names > the chrono-english catch-all.
const CONF_NUMERIC: f32 = 0.95;
const CONF_MONTH: f32 = 0.9;
const CONF_RELATIVE: f32 = 0.75;
const CONF_WEEKDAY: f32 = 0.6;
const CONF_FALLBACK: f32 = 0.5;

/// Hour of day a bare date resolves to.
const DEFAULT_HOUR: u32 = 9;

static MONTH_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec)\.?\s+(\d{1,2})(?:st|nd|rd|th)?(?:,?\s*(\d{4}))?\b",
    )
    .unwrap()
});

// Day-first numeric dates; the year may be omitted.
static NUMERIC_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})(?:/(\d{2,4}))?\b").unwrap());

static RELATIVE_DAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(today|tomorrow|yesterday)\b").unwrap());

static NEXT_LAST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(next|last)\s+(week|month|year)\b").unwrap());

static WEEKDAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:next\s+|this\s+)?(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b")
        .unwrap()
});

static IN_N_UNITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bin\s+(\d+)\s+(days?|weeks?|months?)\b").unwrap());

/// A date-bearing span found while scanning a buffer.
#[derive(Debug, Clone)]
pub struct DateMatch {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub resolved: DateTime<Utc>,
    pub confidence: f32,
}

/// Resolve a date-bearing phrase into an absolute instant relative to
/// `anchor`. Forms are tried in priority order; the first that matches wins.
/// Unsupported phrasing yields `None`, never an error.
pub fn resolve(text: &str, anchor: DateTime<Utc>) -> Option<DateTime<Utc>> {
    resolve_with_confidence(text, anchor).map(|(instant, _)| instant)
}

pub fn resolve_with_confidence(text: &str, anchor: DateTime<Utc>) -> Option<(DateTime<Utc>, f32)> {
    if let Some(caps) = MONTH_DATE.captures(text) {
        if let Some(dt) = resolve_month_date(&caps, anchor) {
            return Some((dt, CONF_MONTH));
        }
    }
    if let Some(caps) = NUMERIC_DATE.captures(text) {
        if let Some(dt) = resolve_numeric_date(&caps, anchor) {
            return Some((dt, CONF_NUMERIC));
        }
    }
    if let Some(caps) = RELATIVE_DAY.captures(text) {
        if let Some(dt) = resolve_relative_day(&caps, anchor) {
            return Some((dt, CONF_RELATIVE));
        }
    }
    if let Some(caps) = NEXT_LAST.captures(text) {
        if let Some(dt) = resolve_next_last(&caps, anchor) {
            return Some((dt, CONF_RELATIVE));
        }
    }
    if let Some(caps) = IN_N_UNITS.captures(text) {
        if let Some(dt) = resolve_in_n_units(&caps, anchor) {
            return Some((dt, CONF_RELATIVE));
        }
    }
    if let Some(caps) = WEEKDAY.captures(text) {
        if let Some(dt) = resolve_weekday(&caps, anchor) {
            return Some((dt, CONF_WEEKDAY));
        }
    }
    // Last resort: hand the phrase to chrono-english before giving up. Its
    // skip arithmetic can overflow chrono's range internally on absurd
    // counts, so the call runs guarded.
    std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        parse_date_string(text.trim(), anchor, Dialect::Us).ok()
    }))
    .ok()
    .flatten()
    .map(|dt| (dt, CONF_FALLBACK))
}

/// Scan a whole buffer and return every non-overlapping resolvable date span,
/// ordered by position. Independent of action-pattern matching.
pub fn detect(text: &str, anchor: DateTime<Utc>) -> Vec<DateMatch> {
    let mut matches: Vec<DateMatch> = Vec::new();
    let forms: [(&Regex, f32); 6] = [
        (&MONTH_DATE, CONF_MONTH),
        (&NUMERIC_DATE, CONF_NUMERIC),
        (&RELATIVE_DAY, CONF_RELATIVE),
        (&NEXT_LAST, CONF_RELATIVE),
        (&IN_N_UNITS, CONF_RELATIVE),
        (&WEEKDAY, CONF_WEEKDAY),
    ];

    for (regex, confidence) in forms {
        for caps in regex.captures_iter(text) {
            let whole = caps.get(0).map(|m| (m.start(), m.end(), m.as_str()));
            let Some((start, end, span)) = whole else { continue };
            if matches.iter().any(|m| start < m.end && m.start < end) {
                continue;
            }
            let resolved = if std::ptr::eq(regex, &*MONTH_DATE) {
                resolve_month_date(&caps, anchor)
            } else if std::ptr::eq(regex, &*NUMERIC_DATE) {
                resolve_numeric_date(&caps, anchor)
            } else if std::ptr::eq(regex, &*RELATIVE_DAY) {
                resolve_relative_day(&caps, anchor)
            } else if std::ptr::eq(regex, &*NEXT_LAST) {
                resolve_next_last(&caps, anchor)
            } else if std::ptr::eq(regex, &*IN_N_UNITS) {
                resolve_in_n_units(&caps, anchor)
            } else {
                resolve_weekday(&caps, anchor)
            };
            if let Some(resolved) = resolved {
                matches.push(DateMatch {
                    text: span.to_string(),
                    start,
                    end,
                    resolved,
                    confidence,
                });
            }
        }
    }

    matches.sort_by_key(|m| m.start);
    matches
}

/// First resolvable date span in `text`, if any.
pub fn find_first(text: &str, anchor: DateTime<Utc>) -> Option<DateMatch> {
    detect(text, anchor).into_iter().next()
}

fn resolve_month_date(caps: &regex::Captures<'_>, anchor: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let month = month_number(caps.get(1)?.as_str())?;
    let day: u32 = caps.get(2)?.as_str().parse().ok()?;
    let year: i32 = match caps.get(3) {
        Some(y) => y.as_str().parse().ok()?,
        None => anchor.year(),
    };
    at_default_hour(NaiveDate::from_ymd_opt(year, month, day)?)
}

fn resolve_numeric_date(caps: &regex::Captures<'_>, anchor: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let day: u32 = caps.get(1)?.as_str().parse().ok()?;
    let month: u32 = caps.get(2)?.as_str().parse().ok()?;
    let year: i32 = match caps.get(3) {
        Some(y) => {
            let y: i32 = y.as_str().parse().ok()?;
            if y < 100 { 2000 + y } else { y }
        }
        None => anchor.year(),
    };
    at_default_hour(NaiveDate::from_ymd_opt(year, month, day)?)
}

fn resolve_relative_day(caps: &regex::Captures<'_>, anchor: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let offset = match caps.get(1)?.as_str().to_lowercase().as_str() {
        "today" => 0,
        "tomorrow" => 1,
        "yesterday" => -1,
        _ => return None,
    };
    Some(anchor + Duration::days(offset))
}

fn resolve_next_last(caps: &regex::Captures<'_>, anchor: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let forward = caps.get(1)?.as_str().eq_ignore_ascii_case("next");
    match caps.get(2)?.as_str().to_lowercase().as_str() {
        "week" => Some(anchor + Duration::days(if forward { 7 } else { -7 })),
        "month" => {
            if forward {
                anchor.checked_add_months(Months::new(1))
            } else {
                anchor.checked_sub_months(Months::new(1))
            }
        }
        "year" => {
            if forward {
                anchor.checked_add_months(Months::new(12))
            } else {
                anchor.checked_sub_months(Months::new(12))
            }
        }
        _ => None,
    }
}

// Counts large enough to overflow chrono resolve to `None`, never a panic.
fn resolve_in_n_units(caps: &regex::Captures<'_>, anchor: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let n: i64 = caps.get(1)?.as_str().parse().ok()?;
    match caps.get(2)?.as_str().to_lowercase().as_str() {
        u if u.starts_with("day") => anchor.checked_add_signed(Duration::try_days(n)?),
        u if u.starts_with("week") => {
            anchor.checked_add_signed(Duration::try_days(n.checked_mul(7)?)?)
        }
        u if u.starts_with("month") => {
            anchor.checked_add_months(Months::new(u32::try_from(n).ok()?))
        }
        _ => None,
    }
}

fn resolve_weekday(caps: &regex::Captures<'_>, anchor: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let target = match caps.get(1)?.as_str().to_lowercase().as_str() {
        "monday" => 0,
        "tuesday" => 1,
        "wednesday" => 2,
        "thursday" => 3,
        "friday" => 4,
        "saturday" => 5,
        "sunday" => 6,
        _ => return None,
    };
    // Next occurrence strictly after the anchor: same weekday means a full
    // week ahead.
    let current = anchor.weekday().num_days_from_monday() as i64;
    let days = (target - current + 7) % 7;
    let days = if days == 0 { 7 } else { days };
    at_default_hour((anchor + Duration::days(days)).date_naive())
}

fn month_number(name: &str) -> Option<u32> {
    let lower = name.to_lowercase();
    let key: String = lower.chars().take(3).collect();
    Some(match key.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    })
}

fn at_default_hour(date: NaiveDate) -> Option<DateTime<Utc>> {
    Some(date.and_hms_opt(DEFAULT_HOUR, 0, 0)?.and_utc())
}
