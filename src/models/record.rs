//! `Record`: an open property bag representing one unit of the dataset.
//!
//! Records carry a handful of recognized keys (question/answer/reasoning
//! variants) plus arbitrary additional fields, mirroring the open-ended JSON
//! documents the Python original passed between agents.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form reasoning keys recognized by the low-quality check (§3), distinct
/// from `think` which has its own dedicated scan (`has_think_field`).
pub const REASONING_FIELDS: &[&str] =
    &["reasoning", "rationale", "explanation", "steps", "cot", "chain_of_thought"];

/// A single dataset record: a question/answer pair plus optional reasoning
/// trace and any other fields the caller attached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self { fields: Map::new() }
    }

    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self { fields },
            other => {
                let mut fields = Map::new();
                fields.insert("value".to_string(), other);
                Self { fields }
            }
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    pub fn question(&self) -> Option<&str> {
        self.fields.get("question").and_then(Value::as_str)
    }

    pub fn answer(&self) -> Option<&str> {
        self.fields.get("answer").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.fields.insert(key.to_string(), value);
    }

    /// Whether this record carries a key equal to "think", ignoring case
    /// (§3, §4.4 Stage 1). This is a distinct scan from the recognized
    /// reasoning-field set used by `lacks_reasoning_content`.
    pub fn has_think_key(&self) -> bool {
        self.fields.keys().any(|k| k.eq_ignore_ascii_case("think"))
    }

    /// Whether this record lacks every recognized reasoning field
    /// (`reasoning`, `rationale`, `explanation`, `steps`, `cot`,
    /// `chain_of_thought`) with non-empty text. Used by the low-quality
    /// check in Stage 1, which only runs once `has_think_field` is true.
    pub fn lacks_reasoning_content(&self) -> bool {
        !REASONING_FIELDS.iter().any(|field| {
            self.fields
                .get(*field)
                .and_then(Value::as_str)
                .is_some_and(|s| !s.trim().is_empty())
        })
    }

    /// Concatenated text used for embedding/clustering: question + answer.
    pub fn embedding_text(&self) -> String {
        let q = self.question().unwrap_or_default();
        let a = self.answer().unwrap_or_default();
        format!("{q}\n{a}")
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn has_think_key_is_case_insensitive() {
        let r = Record::from_value(json!({"question": "q", "answer": "a", "THINK": "t"}));
        assert!(r.has_think_key());

        let r = Record::from_value(json!({"question": "q", "answer": "a"}));
        assert!(!r.has_think_key());
    }

    #[test]
    fn lacks_reasoning_content_checks_recognized_keys_only() {
        let r = Record::from_value(json!({"question": "q", "answer": "a", "reasoning": "because"}));
        assert!(!r.lacks_reasoning_content());

        let r = Record::from_value(json!({"question": "q", "answer": "a"}));
        assert!(r.lacks_reasoning_content());

        // `think` alone does not count as recognized reasoning content.
        let r = Record::from_value(json!({"question": "q", "answer": "a", "think": "t"}));
        assert!(r.lacks_reasoning_content());

        let r = Record::from_value(json!({"question": "q", "answer": "a", "cot": "   "}));
        assert!(r.lacks_reasoning_content());
    }

    #[test]
    fn embedding_text_joins_question_and_answer() {
        let r = Record::from_value(json!({"question": "why", "answer": "because"}));
        assert_eq!(r.embedding_text(), "why\nbecause");
    }

    #[test]
    fn round_trips_through_value() {
        let original = json!({"question": "q", "answer": "a", "extra": 42});
        let record = Record::from_value(original.clone());
        assert_eq!(record.into_value(), original);
    }
}
