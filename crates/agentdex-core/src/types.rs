//! Domain types shared by the catalog, index and search crates.

use serde::{Deserialize, Serialize};

/// One catalog entry describing an external AI tool or service.
///
/// - `name`: natural key, unique once the catalog has been deduplicated
/// - price fields are free text; they may hold a listed price or a
///   price-change annotation written by the price monitor
/// - `enriched`: set once by the enrichment stage, never cleared
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub name: String,
    pub provider: String,
    pub use_case: String,
    pub category: String,
    pub input_price: String,
    pub output_price: String,
    pub integration: String,
    pub free_tier: String,
    pub latency: String,
    pub website: String,
    pub alternatives: String,
    #[serde(default)]
    pub enriched: bool,
}

impl AgentRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Text that represents this record in the vector index.
    pub fn embedding_text(&self) -> String {
        format!("{}. Category: {}", self.use_case, self.category)
    }

    pub fn field(&self, field: Field) -> &str {
        match field {
            Field::Name => &self.name,
            Field::Provider => &self.provider,
            Field::UseCase => &self.use_case,
            Field::Category => &self.category,
            Field::InputPrice => &self.input_price,
            Field::OutputPrice => &self.output_price,
            Field::Integration => &self.integration,
            Field::FreeTier => &self.free_tier,
            Field::Latency => &self.latency,
            Field::Website => &self.website,
            Field::Alternatives => &self.alternatives,
        }
    }

    pub fn set_field(&mut self, field: Field, value: String) {
        let slot = match field {
            Field::Name => &mut self.name,
            Field::Provider => &mut self.provider,
            Field::UseCase => &mut self.use_case,
            Field::Category => &mut self.category,
            Field::InputPrice => &mut self.input_price,
            Field::OutputPrice => &mut self.output_price,
            Field::Integration => &mut self.integration,
            Field::FreeTier => &mut self.free_tier,
            Field::Latency => &mut self.latency,
            Field::Website => &mut self.website,
            Field::Alternatives => &mut self.alternatives,
        };
        *slot = value;
    }

    /// Price-change annotation currently stored in the price fields, if any.
    pub fn price_flag(&self) -> Option<PriceChange> {
        PriceChange::from_annotation(&self.input_price)
            .or_else(|| PriceChange::from_annotation(&self.output_price))
    }
}

/// The eleven textual fields of an [`AgentRecord`], in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Name,
    Provider,
    UseCase,
    Category,
    InputPrice,
    OutputPrice,
    Integration,
    FreeTier,
    Latency,
    Website,
    Alternatives,
}

impl Field {
    pub const ALL: [Field; 11] = [
        Field::Name,
        Field::Provider,
        Field::UseCase,
        Field::Category,
        Field::InputPrice,
        Field::OutputPrice,
        Field::Integration,
        Field::FreeTier,
        Field::Latency,
        Field::Website,
        Field::Alternatives,
    ];

    /// Canonical key used in prompts and generated JSON.
    pub fn key(self) -> &'static str {
        match self {
            Field::Name => "Name",
            Field::Provider => "Provider",
            Field::UseCase => "UseCase",
            Field::Category => "Category",
            Field::InputPrice => "InputPrice",
            Field::OutputPrice => "OutputPrice",
            Field::Integration => "Integration",
            Field::FreeTier => "FreeTier",
            Field::Latency => "Latency",
            Field::Website => "Website",
            Field::Alternatives => "Alternatives",
        }
    }

    /// Resolve a loosely spelled key: case, spaces, underscores and dashes are ignored.
    pub fn from_key(key: &str) -> Option<Field> {
        let folded: String = key
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        Field::ALL
            .into_iter()
            .find(|f| f.key().eq_ignore_ascii_case(&folded))
    }
}

/// Direction of a detected price change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceChange {
    Increase,
    Decrease,
}

impl PriceChange {
    /// Text written into both price fields when a change is detected.
    pub fn annotation(self) -> &'static str {
        match self {
            PriceChange::Increase => "Possible price increase - check latest pricing",
            PriceChange::Decrease => "Possible price decrease/discount - check latest pricing",
        }
    }

    pub fn from_annotation(text: &str) -> Option<PriceChange> {
        let text = text.trim();
        [PriceChange::Increase, PriceChange::Decrease]
            .into_iter()
            .find(|c| c.annotation() == text)
    }
}

/// A ranked candidate returned by search, with its generated justification.
///
/// `distance` is the L2 distance from the query embedding; lower is better.
/// `justification` is empty when the generation call for this candidate failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub record: AgentRecord,
    pub justification: String,
    pub distance: f32,
}
