//! Stage 4 — Redact (§4.4). Applies `redact::redact` to every verified
//! record and marks `_pii_cleaned = true` where a redaction occurred.

use crate::models::Record;

pub fn redact_all(records: &[Record]) -> Vec<Record> {
    records
        .iter()
        .map(|r| crate::redact::redact(r).0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_every_record_independently() {
        let records = vec![
            Record::from_value(json!({"question": "q", "answer": "call 555-123-4567"})),
            Record::from_value(json!({"question": "q2", "answer": "clean"})),
        ];
        let redacted = redact_all(&records);
        assert_eq!(redacted[0].get("_pii_cleaned"), Some(&json!(true)));
        assert_eq!(redacted[1].get("_pii_cleaned"), None);
    }
}
