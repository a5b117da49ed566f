//! Incremental enrichment of sparse catalog rows.
//!
//! Only rows with `enriched == false` are visited. Each row gets one
//! generation call seeded with its current values; the reply is read with a
//! tolerant key/value scanner rather than a strict JSON parser, because the
//! call is not schema-constrained and replies often arrive wrapped in prose or
//! code fences. Fields the reply does not mention keep their prior values.
//! Rows whose call fails stay un-enriched and are retried on the next run.
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

use agentdex_core::error::{Error, Result};
use agentdex_core::traits::TextGenerator;
use agentdex_core::types::{AgentRecord, Field};
use futures::stream::{self, StreamExt};
use regex::Regex;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::progress::progress_bar;
use crate::store::CatalogStore;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnrichReport {
    pub candidates: usize,
    pub enriched: usize,
    pub failed: usize,
}

pub struct Enricher<'a> {
    store: &'a CatalogStore,
    generator: &'a dyn TextGenerator,
    concurrency: usize,
    call_timeout: Duration,
}

impl<'a> Enricher<'a> {
    pub fn new(store: &'a CatalogStore, generator: &'a dyn TextGenerator) -> Self {
        Self { store, generator, concurrency: 1, call_timeout: Duration::from_secs(60) }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Enrich every un-enriched row and flush the results in one bulk write.
    pub async fn run(&self) -> anyhow::Result<EnrichReport> {
        let candidates = self.store.scan_unenriched()?;
        let mut report = EnrichReport { candidates: candidates.len(), ..EnrichReport::default() };
        if candidates.is_empty() {
            info!("no un-enriched agents");
            return Ok(report);
        }

        let pb = progress_bar(candidates.len(), "agents");
        let outcomes: Vec<(String, Result<AgentRecord>)> = stream::iter(candidates)
            .map(|rec| async move {
                let outcome = self.enrich_one(&rec).await;
                (rec.name, outcome)
            })
            .buffered(self.concurrency)
            .inspect(|_| pb.inc(1))
            .collect()
            .await;
        pb.finish_and_clear();

        let mut pending = Vec::with_capacity(outcomes.len());
        for (name, outcome) in outcomes {
            match outcome {
                Ok(rec) => pending.push(rec),
                Err(e) => {
                    warn!(%name, error = %e, "enrichment failed; row left for the next run");
                    report.failed += 1;
                }
            }
        }
        if !pending.is_empty() {
            report.enriched = self.store.update_many(&pending)?;
        }
        info!(candidates = report.candidates, enriched = report.enriched, failed = report.failed, "enrichment finished");
        Ok(report)
    }

    async fn enrich_one(&self, rec: &AgentRecord) -> Result<AgentRecord> {
        let prompt = enrichment_prompt(rec);
        let reply = timeout(self.call_timeout, self.generator.generate(&prompt, None))
            .await
            .map_err(|_| Error::Provider(format!("generation timed out after {:?}", self.call_timeout)))??;
        let fields = scan_fields(&reply);
        if fields.is_empty() {
            return Err(Error::Parse("reply mentions none of the catalog fields".to_string()));
        }
        Ok(merge_fields(rec, &fields))
    }
}

pub fn enrichment_prompt(rec: &AgentRecord) -> String {
    let mut current = String::new();
    for field in Field::ALL {
        current.push_str(&format!("{}: {}\n", field.key(), rec.field(field)));
    }
    let keys = Field::ALL.map(Field::key).join(", ");
    format!(
        "You are an AI product expert.\n\n\
         Take the following basic AI tool data and enhance each field with more clarity and detail. \
         Elaborate the UseCase by listing specific tasks, and make each field useful for cost \
         estimation and quality assessment.\n\n\
         {current}\n\
         Return a single flat JSON object with exactly these keys: {keys}.\n\
         Return only the JSON object."
    )
}

const KEY_PATTERN: &str = r#"(?i)["']?\b(name|provider|use[ _-]?case|category|input[ _-]?price|output[ _-]?price|integration|free[ _-]?tier|latency|website|alternatives)\b["']?\s*:"#;

fn key_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(KEY_PATTERN).ok()).as_ref()
}

/// Scan free text for `key: value` pairs over the known catalog keys.
///
/// A value starts after its key and never runs past the next recognized key.
/// JSON values end with their token; anything else ends at the line end or an
/// unquoted comma. The first occurrence of a key wins; empty values are dropped.
pub fn scan_fields(text: &str) -> BTreeMap<Field, String> {
    let Some(pattern) = key_pattern() else {
        return BTreeMap::new();
    };
    let hits: Vec<(Field, usize, usize)> = pattern
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let field = Field::from_key(caps.get(1)?.as_str())?;
            Some((field, whole.start(), whole.end()))
        })
        .collect();

    let mut fields = BTreeMap::new();
    for (i, &(field, _, value_start)) in hits.iter().enumerate() {
        let value_end = hits.get(i + 1).map_or(text.len(), |&(_, next_start, _)| next_start);
        if fields.contains_key(&field) {
            continue;
        }
        if let Some(value) = clean_value(&text[value_start..value_end]) {
            fields.insert(field, value);
        }
    }
    fields
}

fn clean_value(raw: &str) -> Option<String> {
    let raw = raw.trim_start();
    let value = json_value(raw).unwrap_or_else(|| plain_value(raw));
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Decode the JSON token at the start of `raw` and ignore whatever follows it.
/// Bare scalars only count when the line ends or a delimiter follows, so
/// `200 ms` stays prose.
fn json_value(raw: &str) -> Option<String> {
    let mut stream = serde_json::Deserializer::from_str(raw).into_iter::<Value>();
    let value = stream.next()?.ok()?;
    let rest = raw[stream.byte_offset()..].trim_start_matches([' ', '\t']);
    let delimited = rest.is_empty() || rest.starts_with([',', '}', ']', '\n', '\r']);
    Some(match value {
        Value::String(s) => s,
        Value::Array(items) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
        Value::Null if delimited => String::new(),
        _ if delimited => value.to_string(),
        _ => return None,
    })
}

/// Prose value: up to the end of the line or the first comma outside quotes.
fn plain_value(raw: &str) -> String {
    let mut quoted = false;
    let mut end = raw.len();
    for (i, c) in raw.char_indices() {
        match c {
            '"' | '\u{201c}' | '\u{201d}' => quoted = !quoted,
            '\n' | '\r' => {
                end = i;
                break;
            }
            ',' if !quoted => {
                end = i;
                break;
            }
            _ => {}
        }
    }
    raw[..end]
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '"' | '\u{201c}' | '\u{201d}' | '`' | '{' | '}'))
        .to_string()
}

/// Overlay scanned fields on a record. `name` is never rewritten.
pub fn merge_fields(rec: &AgentRecord, fields: &BTreeMap<Field, String>) -> AgentRecord {
    let mut merged = rec.clone();
    for (&field, value) in fields {
        if field != Field::Name {
            merged.set_field(field, value.clone());
        }
    }
    merged.enriched = true;
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_pretty_json() {
        let reply = "Here you go:\n```json\n{\n  \"Name\": \"Jasper\",\n  \"UseCase\": \"Drafts blogs, ads, and emails\",\n  \"Alternatives\": [\"Copy.ai\", \"Writesonic\"],\n  \"Latency\": \"~2s\"\n}\n```";
        let fields = scan_fields(reply);
        assert_eq!(fields[&Field::UseCase], "Drafts blogs, ads, and emails");
        assert_eq!(fields[&Field::Alternatives], "Copy.ai, Writesonic");
        assert_eq!(fields[&Field::Latency], "~2s");
        assert_eq!(fields.len(), 4);
    }

    #[test]
    fn single_line_json_with_escapes() {
        let fields = scan_fields(r#"{"Provider": "Acme \"Labs\"", "Input Price": 0.25, "Website": "https://acme.ai"}"#);
        assert_eq!(fields[&Field::Provider], "Acme \"Labs\"");
        assert_eq!(fields[&Field::InputPrice], "0.25");
        assert_eq!(fields[&Field::Website], "https://acme.ai");
    }

    #[test]
    fn prose_key_value_lines() {
        let fields = scan_fields("Category: Sales Automation\nFree Tier: yes, 100 calls/month\nnotes without key");
        assert_eq!(fields[&Field::Category], "Sales Automation");
        assert_eq!(fields[&Field::FreeTier], "yes");
        let fields = scan_fields("Latency: 200 ms\nInput Price: 3");
        assert_eq!(fields[&Field::Latency], "200 ms");
        assert_eq!(fields[&Field::InputPrice], "3");
    }

    #[test]
    fn chatter_after_fenced_json_is_ignored() {
        let reply = "```json\n{\"UseCase\": \"Drafts blogs\", \"Latency\": \"~2s\"}\n```\nLet me know if you need anything else!";
        let fields = scan_fields(reply);
        assert_eq!(fields[&Field::UseCase], "Drafts blogs");
        assert_eq!(fields[&Field::Latency], "~2s");
    }

    #[test]
    fn chatter_after_plain_json_is_ignored() {
        let reply = "{\"Latency\": \"~2s\", \"Free Tier\": true}\nThese fields were expanded for clarity.";
        let fields = scan_fields(reply);
        assert_eq!(fields[&Field::Latency], "~2s");
        assert_eq!(fields[&Field::FreeTier], "true");
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn curly_quotes_are_stripped() {
        let fields = scan_fields("UseCase: \u{201c}Drafts blogs, ads\u{201d}\nWebsite: \u{201c}https://jasper.ai\u{201d}");
        assert_eq!(fields[&Field::UseCase], "Drafts blogs, ads");
        assert_eq!(fields[&Field::Website], "https://jasper.ai");
    }

    #[test]
    fn first_occurrence_wins_and_empty_values_drop() {
        let fields = scan_fields("Latency: fast\nLatency: slow\nWebsite: \"\"");
        assert_eq!(fields[&Field::Latency], "fast");
        assert!(!fields.contains_key(&Field::Website));
    }

    #[test]
    fn nothing_recognizable() {
        assert!(scan_fields("I cannot help with that.").is_empty());
    }

    #[test]
    fn merge_keeps_unmentioned_fields_and_name() {
        let mut rec = AgentRecord::new("Jasper");
        rec.website = "https://jasper.ai".into();
        rec.latency = "low".into();
        let mut fields = BTreeMap::new();
        fields.insert(Field::Name, "Renamed".to_string());
        fields.insert(Field::Latency, "~1s".to_string());
        let merged = merge_fields(&rec, &fields);
        assert_eq!(merged.name, "Jasper");
        assert_eq!(merged.latency, "~1s");
        assert_eq!(merged.website, "https://jasper.ai");
        assert!(merged.enriched);
    }

    #[test]
    fn prompt_seeds_current_values() {
        let mut rec = AgentRecord::new("Jasper");
        rec.use_case = "copywriting".into();
        let prompt = enrichment_prompt(&rec);
        assert!(prompt.contains("Name: Jasper"));
        assert!(prompt.contains("UseCase: copywriting"));
        assert!(prompt.contains("Alternatives"));
    }
}
