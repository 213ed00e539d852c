use crate::{error::ParseError, producer::filter::SchemaFilter};
use bytes::Bytes;
use model::{
    core::column::column_name,
    execution::bad_row::{BadRow, FailureStage},
    records::{
        event::TokenedBatch,
        row::{Origin, ParsedRow},
    },
};
use serde_json::{Map, Value};

/// Field holding the schema an event was tracked with.
pub const SCHEMA_FIELD: &str = "schema";

/// Result of parsing one tokened batch.
#[derive(Debug, Default)]
pub struct ParsedEvents {
    pub rows: Vec<ParsedRow>,
    pub bad: Vec<BadRow>,
    /// Events dropped because their schema is skipped.
    pub skipped: usize,
}

/// Turns raw events into rows keyed by warehouse column names.
#[derive(Debug, Clone)]
pub struct EventParser {
    processor: String,
    skip: SchemaFilter,
    bad_row_max_size: usize,
}

impl EventParser {
    pub fn new(processor: impl Into<String>, skip: SchemaFilter, bad_row_max_size: usize) -> Self {
        Self {
            processor: processor.into(),
            skip,
            bad_row_max_size,
        }
    }

    pub fn parse(&self, origin: Origin, batch: &TokenedBatch) -> ParsedEvents {
        let mut parsed = ParsedEvents::default();

        for (index, raw) in batch.events.iter().enumerate() {
            match self.parse_event(raw) {
                Ok(Some(fields)) => {
                    parsed
                        .rows
                        .push(ParsedRow::new(origin, index, fields, raw.clone()));
                }
                Ok(None) => parsed.skipped += 1,
                Err(err) => parsed.bad.push(
                    BadRow::new(
                        &self.processor,
                        FailureStage::Parse,
                        raw,
                        err.to_string(),
                        self.bad_row_max_size,
                    )
                    .with_position(origin, index),
                ),
            }
        }

        parsed
    }

    /// `Ok(None)` when the event belongs to a skipped schema.
    fn parse_event(&self, raw: &Bytes) -> Result<Option<Map<String, Value>>, ParseError> {
        let object = match serde_json::from_slice::<Value>(raw)? {
            Value::Object(object) => object,
            other => return Err(ParseError::NotAnObject(kind_of(&other))),
        };

        if !self.skip.is_empty()
            && let Some(Value::String(schema)) = object.get(SCHEMA_FIELD)
            && self.skip.matches(schema)
        {
            return Ok(None);
        }

        let mut fields = Map::with_capacity(object.len());
        let mut keys: Vec<(String, String)> = Vec::with_capacity(object.len());
        for (key, value) in object {
            let column = column_name(&key);
            if let Some((_, first)) = keys.iter().find(|(c, _)| *c == column) {
                return Err(ParseError::ColumnCollision {
                    column,
                    first: first.clone(),
                    second: key,
                });
            }
            keys.push((column.clone(), key));
            fields.insert(column, value);
        }

        Ok(Some(fields))
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::records::token::Token;
    use serde_json::json;

    fn batch(events: &[&str]) -> TokenedBatch {
        TokenedBatch::new(
            events.iter().map(|e| Bytes::from(e.to_string())).collect(),
            vec![Token::new(1)],
        )
    }

    fn parser(skip: &[&str]) -> EventParser {
        EventParser::new("streamload", SchemaFilter::new(skip.iter().copied()), 4096)
    }

    #[test]
    fn test_keys_become_column_names() {
        let parsed = parser(&[]).parse(
            Origin::new(0),
            &batch(&[r#"{"eventId":"e1","pageURL":"https://x","app.version":2}"#]),
        );

        assert!(parsed.bad.is_empty());
        let row = &parsed.rows[0];
        assert_eq!(row.fields.get("event_id"), Some(&json!("e1")));
        assert_eq!(row.fields.get("page_url"), Some(&json!("https://x")));
        assert_eq!(row.fields.get("app_version"), Some(&json!(2)));
        assert_eq!(row.index, 0);
    }

    #[test]
    fn test_invalid_events_become_parse_bad_rows() {
        let parsed = parser(&[]).parse(
            Origin::new(4),
            &batch(&[r#"{"event_id":"ok"}"#, "not json", "[1,2]", r#"{"a_b":1,"aB":2}"#]),
        );

        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.bad.len(), 3);
        assert!(parsed.bad.iter().all(|b| b.stage == FailureStage::Parse));
        assert_eq!(parsed.bad[0].row_index, Some(1));
        assert_eq!(parsed.bad[0].origin, Some(4));
        assert!(parsed.bad[1].error.contains("array"));
        assert!(parsed.bad[2].error.contains("'a_b'"));
    }

    #[test]
    fn test_skipped_schemas_are_neither_rows_nor_bad() {
        let parsed = parser(&["iglu:com.acme/ignored/*"]).parse(
            Origin::new(0),
            &batch(&[
                r#"{"schema":"iglu:com.acme/ignored/jsonschema/1-0-0","x":1}"#,
                r#"{"schema":"iglu:com.acme/kept/jsonschema/1-0-0","x":2}"#,
            ]),
        );

        assert_eq!(parsed.skipped, 1);
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].index, 1);
        assert!(parsed.bad.is_empty());
    }
}
