use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{collections::HashSet, fmt};

/// Sequence number the loader assigns to every `TokenedBatch` it receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Origin(u64);

impl Origin {
    pub fn new(seq: u64) -> Self {
        Self(seq)
    }

    pub fn seq(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "origin-{}", self.0)
    }
}

/// A structured record ready to be written to the destination table.
#[derive(Debug, Clone)]
pub struct ParsedRow {
    /// The tokened batch this row was parsed from.
    pub origin: Origin,
    /// Position of the raw event inside its tokened batch.
    pub index: usize,
    /// Column name to value, in event order.
    pub fields: Map<String, Value>,
    /// The raw event, kept so a rejected row can be routed as a bad row.
    pub raw: Bytes,
}

impl ParsedRow {
    pub fn new(origin: Origin, index: usize, fields: Map<String, Value>, raw: Bytes) -> Self {
        Self {
            origin,
            index,
            fields,
            raw,
        }
    }

    /// Size estimate used to bound batches.
    pub fn size_bytes(&self) -> usize {
        self.raw.len()
    }

    /// Columns carried by this row that are not part of `known`.
    pub fn unknown_columns(&self, known: &HashSet<String>) -> Vec<String> {
        self.fields
            .keys()
            .filter(|name| !known.contains(*name))
            .cloned()
            .collect()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> ParsedRow {
        let raw = Bytes::from(value.to_string());
        let Value::Object(fields) = value else {
            panic!("expected object");
        };
        ParsedRow::new(Origin::new(7), 3, fields, raw)
    }

    #[test]
    fn test_unknown_columns_keeps_event_order() {
        let r = row(json!({"event_id": "e1", "zeta": 1, "alpha": true}));
        let known: HashSet<String> = ["event_id".to_string()].into_iter().collect();

        assert_eq!(r.unknown_columns(&known), vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_size_follows_raw_payload() {
        let r = row(json!({"event_id": "e1"}));
        assert_eq!(r.size_bytes(), r.raw.len());
        assert_eq!(r.origin.to_string(), "origin-7");
        assert_eq!(r.fields.get("event_id"), Some(&json!("e1")));
    }
}
