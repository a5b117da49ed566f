//! Bulk import of agent records from a JSON array file.
//!
//! Accepts the spaced keys found in hand-maintained data dumps (`"Use Case"`,
//! `"Input Price"`, ...) as well as their camel-case spellings.
use std::fs;
use std::path::Path;

use agentdex_core::error::{Error, Result};
use agentdex_core::types::{AgentRecord, Field};
use serde_json::{Map, Value};
use tracing::warn;

#[derive(Debug, Default)]
pub struct ImportBatch {
    pub records: Vec<AgentRecord>,
    pub skipped: usize,
}

pub fn import_json(path: &Path) -> Result<ImportBatch> {
    let text = fs::read_to_string(path)
        .map_err(|e| Error::Storage(format!("read {}: {}", path.display(), e)))?;
    parse_records(&text)
}

pub fn parse_records(text: &str) -> Result<ImportBatch> {
    let value: Value = serde_json::from_str(text).map_err(|e| Error::Parse(e.to_string()))?;
    let items = match value {
        Value::Array(items) => items,
        other => return Err(Error::Parse(format!("expected a JSON array, got {}", kind(&other)))),
    };
    let mut batch = ImportBatch::default();
    for (i, item) in items.into_iter().enumerate() {
        match item {
            Value::Object(obj) => match record_from_object(&obj) {
                Some(rec) => batch.records.push(rec),
                None => {
                    warn!(position = i, "skipping agent without a name");
                    batch.skipped += 1;
                }
            },
            other => {
                warn!(position = i, kind = kind(&other), "skipping non-object entry");
                batch.skipped += 1;
            }
        }
    }
    Ok(batch)
}

fn record_from_object(obj: &Map<String, Value>) -> Option<AgentRecord> {
    let mut rec = AgentRecord::default();
    for (key, value) in obj {
        if let Some(field) = Field::from_key(key) {
            rec.set_field(field, scalar_text(value));
        }
    }
    if rec.name.trim().is_empty() {
        return None;
    }
    rec.name = rec.name.trim().to_string();
    Some(rec)
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(scalar_text).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spaced_keys_and_scalars() {
        let batch = parse_records(
            r#"[{"Name": "Jasper", "Use Case": "marketing copy", "Input Price": 0.5,
                 "Free Tier": true, "Alternatives": ["Copy.ai", "Writesonic"], "Website": null}]"#,
        )
        .expect("parse");
        assert_eq!(batch.skipped, 0);
        let rec = &batch.records[0];
        assert_eq!(rec.name, "Jasper");
        assert_eq!(rec.use_case, "marketing copy");
        assert_eq!(rec.input_price, "0.5");
        assert_eq!(rec.free_tier, "true");
        assert_eq!(rec.alternatives, "Copy.ai, Writesonic");
        assert_eq!(rec.website, "");
        assert!(!rec.enriched);
    }

    #[test]
    fn nameless_and_non_object_rows_are_skipped() {
        let batch = parse_records(r#"[{"Provider": "x"}, 3, {"Name": "  "}, {"Name": "ok"}]"#).expect("parse");
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.skipped, 3);
    }

    #[test]
    fn top_level_must_be_array() {
        assert!(matches!(parse_records(r#"{"Name": "x"}"#), Err(Error::Parse(_))));
    }
}
