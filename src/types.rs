use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// A card is an open-ended mapping of named fields
pub type Card = Map<String, Value>;

/// Fields every valid card must carry
pub const REQUIRED_FIELDS: [&str; 7] = [
    "name",
    "type",
    "colors",
    "colorIdentity",
    "rarity",
    "setCode",
    "number",
];

/// Identity of a card within its set: the uuid when present, else the collector number
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CardId {
    pub set_code: String,
    pub key: String,
}

/// One card pulled out of the dataset together with the set it belongs to
#[derive(Debug, Clone)]
pub struct CardRecord {
    /// The `data` key of the owning set
    pub set_code: Arc<str>,

    /// The set's `block`, if it appeared before the `cards` array
    pub block: Option<Value>,

    /// Position of the card within its set
    pub index: usize,

    pub card: Card,
}

impl CardRecord {
    pub fn new(set_code: Arc<str>, block: Option<Value>, index: usize, card: Card) -> Self {
        CardRecord {
            set_code,
            block,
            index,
            card,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.card.get("name").and_then(Value::as_str)
    }

    pub fn identity(&self) -> CardId {
        let key = self
            .card
            .get("uuid")
            .or_else(|| self.card.get("number"))
            .map(scalar_text)
            .unwrap_or_default();

        CardId {
            set_code: self.set_code.to_string(),
            key,
        }
    }
}

/// Events produced while walking the dataset, in input order
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// The `meta` object, passed through verbatim
    Meta(Value),

    /// A set's `cards` array is about to be read
    SetStart {
        set_code: Arc<str>,
        block: Option<Value>,
    },

    Card(CardRecord),

    /// A card failed per-record validation; the rest of the set is still readable
    Rejected(crate::error::StructuralError),

    /// The set entry is complete. `block` is final here even if it followed `cards`.
    SetEnd {
        set_code: Arc<str>,
        block: Option<Value>,
        cards: usize,
    },
}

/// Name of the first required field absent from the card
pub fn missing_required_field(card: &Card) -> Option<&'static str> {
    REQUIRED_FIELDS
        .iter()
        .copied()
        .find(|field| !card.contains_key(*field))
}

/// Render a scalar as bare text (strings without quotes)
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
