//! PII redaction: Stage 4 of the pipeline (§4.4). Pure function
//! `redact(record) -> (record', changed)` operating over every string-valued
//! field of a record.
//!
//! Entity categories and patterns grounded on
//! `agents/cleaning_agent.py`/`enhancers/pii_cleaner.py`'s pattern table
//! (phone, email, id number, credit card, IP address); presidio/NLP-based
//! detection is out of scope (§1 Non-goals exclude pulling in a PII model),
//! so this reimplements the structured-pattern subset with `regex`.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::Record;

struct Pattern {
    label: &'static str,
    source: &'static str,
    cell: OnceLock<Regex>,
}

impl Pattern {
    fn get(&self) -> &Regex {
        self.cell.get_or_init(|| Regex::new(self.source).expect("valid PII regex"))
    }
}

macro_rules! pattern {
    ($label:expr, $re:expr) => {
        Pattern {
            label: $label,
            source: $re,
            cell: OnceLock::new(),
        }
    };
}

static EMAIL: Pattern = pattern!("EMAIL", r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b");
static PHONE: Pattern = pattern!(
    "PHONE",
    r"\b(?:\(\d{3}\)\s*\d{3}-\d{4}|\d{3}-\d{3,4}-\d{4})\b"
);
static CREDIT_CARD: Pattern = pattern!("CREDIT_CARD", r"\b\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4}\b");
static SSN: Pattern = pattern!("ID_NUMBER", r"\b\d{3}-\d{2}-\d{4}\b");
static IP_ADDRESS: Pattern = pattern!(
    "IP_ADDRESS",
    r"\b(?:\d{1,3}\.){3}\d{1,3}\b"
);

fn patterns() -> [&'static Pattern; 5] {
    [&EMAIL, &PHONE, &CREDIT_CARD, &SSN, &IP_ADDRESS]
}

/// Redact recognized PII patterns from a single string. Returns the
/// (possibly unchanged) text and whether any replacement occurred.
pub fn redact_text(text: &str) -> (String, bool) {
    let mut out = text.to_string();
    let mut changed = false;
    for pattern in patterns() {
        let regex = pattern.get();
        if regex.is_match(&out) {
            changed = true;
            out = regex
                .replace_all(&out, format!("[{}]", pattern.label).as_str())
                .into_owned();
        }
    }
    (out, changed)
}

/// Redact every string field of a record. Returns the new record and whether
/// any field was modified; callers mark `_pii_cleaned = true` on `changed`.
pub fn redact(record: &Record) -> (Record, bool) {
    let mut out = Record::new();
    let mut changed = false;
    for (key, value) in &record.fields {
        if key == "_pii_cleaned" {
            continue;
        }
        match value.as_str() {
            Some(text) => {
                let (redacted, field_changed) = redact_text(text);
                changed |= field_changed;
                out.set(key, serde_json::Value::String(redacted));
            }
            None => out.set(key, value.clone()),
        }
    }
    if changed {
        out.set("_pii_cleaned", serde_json::Value::Bool(true));
    }
    (out, changed)
}
