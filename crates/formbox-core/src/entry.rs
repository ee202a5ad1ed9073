//! Form entries — one persisted submission each.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One form submission's persisted data.
///
/// `data` and `form` are immutable after creation; only `meta` may change
/// (admin annotations, read markers, and the like).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    /// Store-assigned ID.
    pub id: i64,
    /// Slug of the form this entry was submitted to.
    pub form: String,
    /// Submission timestamp, storage format ("YYYY-MM-DD HH:MM:SS").
    pub submitted_on: String,
    /// Submitted field values.
    pub data: Map<String, Value>,
    /// Mutable metadata.
    pub meta: Map<String, Value>,
}

impl Entry {
    /// Value of a submitted field, or None.
    pub fn data_field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    /// Submitter name, from the conventional "from_name" field.
    pub fn sender_name(&self) -> &str {
        self.data
            .get("from_name")
            .and_then(|v| v.as_str())
            .unwrap_or("")
    }

    /// Submitter address, from the conventional "from_email" field.
    pub fn sender_email(&self) -> &str {
        self.data
            .get("from_email")
            .and_then(|v| v.as_str())
            .unwrap_or("")
    }

    /// Value of a meta key, or None.
    pub fn meta_field(&self, key: &str) -> Option<&Value> {
        self.meta.get(key)
    }

    /// Set a meta key in memory. Call the store's `update` to persist.
    pub fn set_meta(&mut self, key: &str, value: Value) {
        self.meta.insert(key.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sender_accessors() {
        let mut data = Map::new();
        data.insert("from_name".into(), json!("Ana"));
        data.insert("from_email".into(), json!("a@x.com"));
        let entry = Entry {
            id: 1,
            form: "contact".into(),
            submitted_on: "2026-01-01 10:00:00".into(),
            data,
            meta: Map::new(),
        };
        assert_eq!(entry.sender_name(), "Ana");
        assert_eq!(entry.sender_email(), "a@x.com");
        assert_eq!(entry.data_field("missing"), None);
    }

    #[test]
    fn test_sender_defaults_empty() {
        let entry = Entry {
            id: 2,
            form: "contact".into(),
            submitted_on: "2026-01-01 10:00:00".into(),
            data: Map::new(),
            meta: Map::new(),
        };
        assert_eq!(entry.sender_name(), "");
        assert_eq!(entry.sender_email(), "");
    }

    #[test]
    fn test_set_meta() {
        let mut entry = Entry {
            id: 3,
            form: "contact".into(),
            submitted_on: "2026-01-01 10:00:00".into(),
            data: Map::new(),
            meta: Map::new(),
        };
        entry.set_meta("reviewed", json!(true));
        assert_eq!(entry.meta_field("reviewed"), Some(&json!(true)));
    }
}
