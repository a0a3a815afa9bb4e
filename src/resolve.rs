//! Deck resolution - find the dataset card behind each deck-list entry
//!
//! Each entry becomes a name predicate: the exact name, or the front face of
//! a double-faced card (`"Name // Back"`). The dataset is streamed once. An
//! entry resolves to the card in its requested set with its collector number
//! (any printing in that set when no number is given) when there is one, otherwise to the first card with that name found in any
//! other set.

use crate::error::{FilterSpecError, PipelineError};
use crate::filter::{Filter, Matcher, PredicateNode};
use crate::progress::ProgressState;
use crate::project::Projector;
use crate::stream::RecordStream;
use crate::types::{scalar_text, Card, CardRecord, StreamEvent};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Read;
use std::sync::Arc;
use tracing::{debug, warn};

fn one() -> u32 {
    1
}

/// One line of a deck list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckEntry {
    pub name: String,

    #[serde(default = "one")]
    pub quantity: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_code: Option<String>,

    /// Collector number within `set_code`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
}

impl DeckEntry {
    pub fn new(name: impl Into<String>, quantity: u32) -> Self {
        DeckEntry {
            name: name.into(),
            quantity,
            set_code: None,
            number: None,
        }
    }

    pub fn printing(mut self, set_code: impl Into<String>, number: impl Into<String>) -> Self {
        self.set_code = Some(set_code.into());
        self.number = Some(number.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// Requested set, and collector number when one was given
    Exact,
    /// Same name, first seen in another set
    Fallback,
}

/// Outcome for one deck entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub entry: DeckEntry,
    pub set_code: Option<String>,
    pub match_kind: Option<MatchKind>,
    pub card: Option<Card>,
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        self.card.is_some()
    }

    /// The resolved card, projected, with the entry's `quantity` attached
    pub fn deck_card(&self, projector: &Projector) -> Option<Card> {
        let mut card = projector.project(self.card.clone()?);
        card.insert("quantity".to_string(), Value::from(self.entry.quantity));
        Some(card)
    }
}

/// Result of resolving a whole deck list
#[derive(Debug, Clone, PartialEq)]
pub struct DeckResolution {
    /// The dataset's `meta`, if it had one
    pub meta: Option<Value>,
    pub resolutions: Vec<Resolution>,
}

impl DeckResolution {
    pub fn found(&self) -> usize {
        self.resolutions.iter().filter(|r| r.is_resolved()).count()
    }

    pub fn missing(&self) -> impl Iterator<Item = &DeckEntry> {
        self.resolutions
            .iter()
            .filter(|r| !r.is_resolved())
            .map(|r| &r.entry)
    }
}

struct Candidate {
    filter: Filter,
    exact: Option<(String, CardRecord)>,
    fallback: Option<(String, CardRecord)>,
}

pub struct DeckResolver {
    entries: Vec<DeckEntry>,
    filters: Vec<Filter>,
}

impl DeckResolver {
    pub fn new(entries: Vec<DeckEntry>) -> Result<Self, FilterSpecError> {
        let filters = entries
            .iter()
            .map(|entry| Filter::new(Self::name_predicate(&entry.name)?))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DeckResolver { entries, filters })
    }

    /// `name == X` or `name` starts with `"X //"`
    pub fn name_predicate(name: &str) -> Result<PredicateNode, FilterSpecError> {
        let pattern = format!("^{} //", regex::escape(name));
        let front_face = Regex::new(&pattern).map_err(|e| FilterSpecError::InvalidRegex {
            field: "name".to_string(),
            reason: e.to_string(),
        })?;
        PredicateNode::or(vec![
            PredicateNode::comparison("name", Matcher::Equals(Value::String(name.to_string()))),
            PredicateNode::comparison("name", Matcher::Regex(front_face)),
        ])
    }

    pub fn entries(&self) -> &[DeckEntry] {
        &self.entries
    }

    /// Stream the dataset once and resolve every entry against it
    pub fn resolve<R>(&self, reader: R) -> Result<DeckResolution, PipelineError>
    where
        R: Read + Send + 'static,
    {
        let progress = Arc::new(ProgressState::new());
        let mut candidates: Vec<Candidate> = self
            .filters
            .iter()
            .map(|filter| Candidate {
                filter: filter.clone(),
                exact: None,
                fallback: None,
            })
            .collect();
        let mut meta = None;

        for item in RecordStream::new(reader, Arc::clone(&progress)) {
            match item? {
                StreamEvent::Meta(value) => meta = Some(value),
                StreamEvent::Card(record) => {
                    progress.record_seen();
                    self.offer(&mut candidates, &record)?;
                }
                StreamEvent::Rejected(err) => {
                    progress.record_skipped();
                    warn!("ignoring invalid card: {}", err);
                }
                StreamEvent::SetStart { .. } | StreamEvent::SetEnd { .. } => {}
            }
        }
        debug!(records = progress.records_seen(), "deck resolution pass finished");

        let resolutions = self
            .entries
            .iter()
            .zip(candidates)
            .map(|(entry, candidate)| {
                let (kind, found) = match (candidate.exact, candidate.fallback) {
                    (Some(found), _) => (Some(MatchKind::Exact), Some(found)),
                    (None, Some(found)) => (Some(MatchKind::Fallback), Some(found)),
                    (None, None) => (None, None),
                };
                if kind == Some(MatchKind::Fallback) && entry.set_code.is_some() {
                    debug!(name = %entry.name, "no exact printing, using fallback match");
                }
                let (set_code, card) = match found {
                    Some((set_code, record)) => (Some(set_code), Some(record.card)),
                    None => (None, None),
                };
                Resolution {
                    entry: entry.clone(),
                    set_code,
                    match_kind: kind,
                    card,
                }
            })
            .collect();

        Ok(DeckResolution { meta, resolutions })
    }

    fn offer(&self, candidates: &mut [Candidate], record: &CardRecord) -> Result<(), PipelineError> {
        for (entry, candidate) in self.entries.iter().zip(candidates.iter_mut()) {
            if candidate.exact.is_some() || !candidate.filter.matches(&record.card)? {
                continue;
            }

            let requested_set = entry.set_code.as_deref();
            let in_requested_set = requested_set == Some(&*record.set_code);
            if in_requested_set {
                // without a collector number any printing in the set is exact
                let number_matches = match &entry.number {
                    Some(wanted) => record.card.get("number").map(scalar_text).as_ref() == Some(wanted),
                    None => true,
                };
                if number_matches {
                    candidate.exact = Some((record.set_code.to_string(), record.clone()));
                }
                continue;
            }

            if candidate.fallback.is_none() {
                candidate.fallback = Some((record.set_code.to_string(), record.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    fn card(name: &str, set: &str, number: &str) -> Value {
        json!({
            "name": name, "type": "Creature", "colors": [], "colorIdentity": [],
            "rarity": "common", "setCode": set, "number": number
        })
    }

    fn dataset() -> Cursor<Vec<u8>> {
        let value = json!({
            "meta": {"version": "5.2"},
            "data": {
                "OLD": {"cards": [card("Alpha", "OLD", "1"), card("Delver // Flipped", "OLD", "2")]},
                "NEW": {"cards": [card("Alpha", "NEW", "7"), card("Alpha", "NEW", "8")]}
            }
        });
        Cursor::new(serde_json::to_vec(&value).unwrap())
    }

    #[test]
    fn test_exact_printing_preferred() {
        let resolver = DeckResolver::new(vec![DeckEntry::new("Alpha", 4).printing("NEW", "8")]).unwrap();
        let result = resolver.resolve(dataset()).unwrap();

        let resolution = &result.resolutions[0];
        assert_eq!(resolution.match_kind, Some(MatchKind::Exact));
        assert_eq!(resolution.set_code.as_deref(), Some("NEW"));
        assert_eq!(resolution.card.as_ref().unwrap()["number"], "8");
        assert_eq!(resolution.deck_card(&Projector::default()).unwrap()["quantity"], 4);
        assert_eq!(result.meta, Some(json!({"version": "5.2"})));
    }

    #[test]
    fn test_fallback_to_first_other_set() {
        let resolver = DeckResolver::new(vec![DeckEntry::new("Alpha", 1).printing("NEW", "99")]).unwrap();
        let result = resolver.resolve(dataset()).unwrap();

        let resolution = &result.resolutions[0];
        assert_eq!(resolution.match_kind, Some(MatchKind::Fallback));
        assert_eq!(resolution.set_code.as_deref(), Some("OLD"));
    }

    #[test]
    fn test_front_face_and_missing() {
        let resolver = DeckResolver::new(vec![
            DeckEntry::new("Delver", 2),
            DeckEntry::new("Del", 1),
            DeckEntry::new("Nope (1.0)", 1),
        ])
        .unwrap();
        let result = resolver.resolve(dataset()).unwrap();

        assert_eq!(result.resolutions[0].card.as_ref().unwrap()["name"], "Delver // Flipped");
        assert!(!result.resolutions[1].is_resolved());
        assert!(!result.resolutions[2].is_resolved());
        assert_eq!(result.found(), 1);
        assert_eq!(result.missing().count(), 2);
    }

    #[test]
    fn test_set_without_number_takes_first_printing_in_set() {
        let mut entry = DeckEntry::new("Alpha", 1);
        entry.set_code = Some("NEW".to_string());
        let resolver = DeckResolver::new(vec![entry]).unwrap();
        let result = resolver.resolve(dataset()).unwrap();

        let resolution = &result.resolutions[0];
        assert_eq!(resolution.match_kind, Some(MatchKind::Exact));
        assert_eq!(resolution.set_code.as_deref(), Some("NEW"));
        assert_eq!(resolution.card.as_ref().unwrap()["number"], "7");
    }

    #[test]
    fn test_set_only_printing_resolves() {
        let value = json!({"data": {"NEW": {"cards": [card("Alpha", "NEW", "3")]}}});
        let mut entry = DeckEntry::new("Alpha", 2);
        entry.set_code = Some("NEW".to_string());
        let resolver = DeckResolver::new(vec![entry]).unwrap();
        let result = resolver
            .resolve(Cursor::new(serde_json::to_vec(&value).unwrap()))
            .unwrap();

        assert!(result.resolutions[0].is_resolved());
        assert_eq!(result.resolutions[0].match_kind, Some(MatchKind::Exact));
    }

    #[test]
    fn test_entry_defaults_from_json() {
        let entry: DeckEntry = serde_json::from_value(json!({"name": "Alpha"})).unwrap();
        assert_eq!(entry.quantity, 1);
        assert_eq!(entry.set_code, None);
    }
}
