//! Incremental walk over the `meta/data/{setCode}/cards[]` structure
//!
//! The dataset is driven through `serde` seeds so that only one card is
//! materialized at a time: each card is deserialized into a `Value`, validated,
//! and handed to an [`EventSink`] before the next one is read.

use crate::error::{Location, StreamError, StructuralError};
use crate::types::{missing_required_field, CardRecord, StreamEvent};
use serde::de::{self, DeserializeSeed, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::io::Read;
use std::sync::Arc;

/// Receives events in input order as the parser produces them
pub trait EventSink {
    /// Deliver one event. Returns false once the receiving side is gone.
    fn emit(&mut self, event: StreamEvent) -> bool;
}

impl EventSink for Vec<StreamEvent> {
    fn emit(&mut self, event: StreamEvent) -> bool {
        self.push(event);
        true
    }
}

/// Parse a whole dataset from `reader`, pushing events into `sink`.
///
/// Per-card validation failures are delivered as [`StreamEvent::Rejected`] and
/// parsing continues; anything wrong with the envelope or a set entry stops
/// the walk and is returned.
pub fn parse_dataset<R: Read, S: EventSink>(reader: R, sink: &mut S) -> Result<(), StreamError> {
    let mut ctx = ParseContext::new(sink);
    let mut de = serde_json::Deserializer::from_reader(reader);

    let result = DatasetSeed { ctx: &mut ctx }
        .deserialize(&mut de)
        .and_then(|()| de.end());

    result.map_err(|err| ctx.into_error(err))
}

struct ParseContext<'s, S: EventSink> {
    sink: &'s mut S,
    seen_sets: HashSet<String>,
    current_set: Option<Arc<str>>,
    current_index: Option<usize>,
    failure: Option<StreamError>,
}

impl<'s, S: EventSink> ParseContext<'s, S> {
    fn new(sink: &'s mut S) -> Self {
        ParseContext {
            sink,
            seen_sets: HashSet::new(),
            current_set: None,
            current_index: None,
            failure: None,
        }
    }

    fn emit<E: de::Error>(&mut self, event: StreamEvent) -> Result<(), E> {
        if self.sink.emit(event) {
            Ok(())
        } else {
            self.fail(StreamError::Closed)
        }
    }

    /// Stash the real error and unwind the deserializer with a placeholder
    fn fail<T, E: de::Error>(&mut self, err: StreamError) -> Result<T, E> {
        let message = err.to_string();
        self.failure = Some(err);
        Err(E::custom(message))
    }

    fn location(&self) -> Location {
        match (&self.current_set, self.current_index) {
            (Some(code), Some(index)) => Location::Card {
                set_code: code.to_string(),
                index,
            },
            (Some(code), None) => Location::Set(code.to_string()),
            (None, _) => Location::Envelope,
        }
    }

    fn into_error(mut self, err: serde_json::Error) -> StreamError {
        if let Some(failure) = self.failure.take() {
            return failure;
        }
        if err.is_io() {
            return StreamError::Read(err.into());
        }
        StreamError::Structural(StructuralError::new(self.location(), err.to_string()))
    }
}

struct DatasetSeed<'c, 's, S: EventSink> {
    ctx: &'c mut ParseContext<'s, S>,
}

impl<'de, 'c, 's, S: EventSink> DeserializeSeed<'de> for DatasetSeed<'c, 's, S> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, 'c, 's, S: EventSink> Visitor<'de> for DatasetSeed<'c, 's, S> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a dataset object with `meta` and `data` keys")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        let ctx = self.ctx;
        let mut saw_data = false;

        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "meta" => {
                    let meta: Value = map.next_value()?;
                    ctx.emit(StreamEvent::Meta(meta))?;
                }
                "data" => {
                    if saw_data {
                        return ctx.fail(StructuralError::envelope("duplicate `data` key").into());
                    }
                    saw_data = true;
                    map.next_value_seed(DataSeed { ctx: &mut *ctx })?;
                }
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }

        if !saw_data {
            return ctx.fail(StructuralError::envelope("missing `data` object").into());
        }
        Ok(())
    }
}

struct DataSeed<'c, 's, S: EventSink> {
    ctx: &'c mut ParseContext<'s, S>,
}

impl<'de, 'c, 's, S: EventSink> DeserializeSeed<'de> for DataSeed<'c, 's, S> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, 'c, 's, S: EventSink> Visitor<'de> for DataSeed<'c, 's, S> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object mapping set codes to set entries")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        let ctx = self.ctx;

        while let Some(code) = map.next_key::<String>()? {
            // A repeated key would otherwise silently merge two sets
            if !ctx.seen_sets.insert(code.clone()) {
                return ctx.fail(StructuralError::set(code, "duplicate set key").into());
            }

            let set_code: Arc<str> = Arc::from(code.as_str());
            ctx.current_set = Some(Arc::clone(&set_code));
            map.next_value_seed(SetSeed {
                ctx: &mut *ctx,
                set_code,
            })?;
            ctx.current_set = None;
        }
        Ok(())
    }
}

struct SetSeed<'c, 's, S: EventSink> {
    ctx: &'c mut ParseContext<'s, S>,
    set_code: Arc<str>,
}

impl<'de, 'c, 's, S: EventSink> DeserializeSeed<'de> for SetSeed<'c, 's, S> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, 'c, 's, S: EventSink> Visitor<'de> for SetSeed<'c, 's, S> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a set entry object with a `cards` array")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        let SetSeed { ctx, set_code } = self;
        let mut block: Option<Value> = None;
        let mut cards: Option<usize> = None;

        while let Some(key) = map.next_key::<String>()? {
            match key.as_str() {
                "block" => block = Some(map.next_value()?),
                "cards" => {
                    if cards.is_some() {
                        return ctx.fail(StructuralError::set(&*set_code, "duplicate `cards` key").into());
                    }
                    ctx.emit(StreamEvent::SetStart {
                        set_code: Arc::clone(&set_code),
                        block: block.clone(),
                    })?;
                    let count = map.next_value_seed(CardsSeed {
                        ctx: &mut *ctx,
                        set_code: Arc::clone(&set_code),
                        block: block.clone(),
                    })?;
                    cards = Some(count);
                }
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }

        let Some(cards) = cards else {
            return ctx.fail(StructuralError::set(&*set_code, "missing `cards` array").into());
        };

        ctx.emit(StreamEvent::SetEnd {
            set_code,
            block,
            cards,
        })
    }
}

struct CardsSeed<'c, 's, S: EventSink> {
    ctx: &'c mut ParseContext<'s, S>,
    set_code: Arc<str>,
    block: Option<Value>,
}

impl<'de, 'c, 's, S: EventSink> DeserializeSeed<'de> for CardsSeed<'c, 's, S> {
    type Value = usize;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<usize, D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de, 'c, 's, S: EventSink> Visitor<'de> for CardsSeed<'c, 's, S> {
    type Value = usize;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a `cards` array")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<usize, A::Error> {
        let CardsSeed {
            ctx,
            set_code,
            block,
        } = self;
        let mut index = 0;

        loop {
            ctx.current_index = Some(index);
            let Some(value) = seq.next_element::<Value>()? else {
                break;
            };

            let event = match value {
                Value::Object(card) => match missing_required_field(&card) {
                    None => StreamEvent::Card(CardRecord::new(
                        Arc::clone(&set_code),
                        block.clone(),
                        index,
                        card,
                    )),
                    Some(field) => StreamEvent::Rejected(StructuralError::card(
                        &*set_code,
                        index,
                        format!("missing required field `{}`", field),
                    )),
                },
                other => StreamEvent::Rejected(StructuralError::card(
                    &*set_code,
                    index,
                    format!("card is not an object (found {})", json_type_name(&other)),
                )),
            };
            ctx.emit(event)?;
            index += 1;
        }

        ctx.current_index = None;
        Ok(index)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
