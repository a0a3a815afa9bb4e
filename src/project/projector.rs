use crate::types::Card;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// Fields kept when the caller asks for the default schema
pub const DEFAULT_FIELDS: [&str; 10] = [
    "name",
    "type",
    "colors",
    "colorIdentity",
    "convertedManaCost",
    "availability",
    "text",
    "edhrecSaltiness",
    "language",
    "foreignData",
];

/// Ordered, de-duplicated set of field names to keep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct ProjectionSchema {
    fields: Vec<String>,
}

impl ProjectionSchema {
    /// Build from names; repeats after the first occurrence are dropped
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let fields = fields
            .into_iter()
            .map(Into::into)
            .filter(|field: &String| seen.insert(field.clone()))
            .collect();
        ProjectionSchema { fields }
    }

    /// The empty schema: project nothing away
    pub fn pass_through() -> Self {
        Self::default()
    }

    pub fn default_fields() -> Self {
        Self::new(DEFAULT_FIELDS)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }
}

impl From<Vec<String>> for ProjectionSchema {
    fn from(fields: Vec<String>) -> Self {
        Self::new(fields)
    }
}

impl From<ProjectionSchema> for Vec<String> {
    fn from(schema: ProjectionSchema) -> Self {
        schema.fields
    }
}

/// Reduce a card to the schema's fields, in schema order.
///
/// Requested fields the card lacks are left out; nothing is synthesized.
pub fn project(card: &Card, schema: &ProjectionSchema) -> Card {
    if schema.is_empty() {
        return card.clone();
    }
    schema
        .fields()
        .iter()
        .filter_map(|field| card.get(field).map(|value| (field.clone(), value.clone())))
        .collect()
}

/// Applies a projection schema, and optionally narrows `foreignData` to a set
/// of languages, to cards that survived filtering
#[derive(Debug, Clone, Default)]
pub struct Projector {
    schema: ProjectionSchema,
    languages: Option<HashSet<String>>,
}

impl Projector {
    pub fn new(schema: ProjectionSchema) -> Self {
        Projector {
            schema,
            languages: None,
        }
    }

    /// Keep only `foreignData` entries whose `language` is listed
    pub fn with_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.languages = Some(languages.into_iter().map(Into::into).collect());
        self
    }

    pub fn schema(&self) -> &ProjectionSchema {
        &self.schema
    }

    pub fn is_identity(&self) -> bool {
        self.schema.is_empty() && self.languages.is_none()
    }

    /// Project an owned card, moving field values rather than copying them
    pub fn project(&self, mut card: Card) -> Card {
        if let Some(languages) = &self.languages {
            narrow_foreign_data(&mut card, languages);
        }

        if self.schema.is_empty() {
            return card;
        }

        self.schema
            .fields()
            .iter()
            .filter_map(|field| card.remove(field).map(|value| (field.clone(), value)))
            .collect()
    }
}

fn narrow_foreign_data(card: &mut Card, languages: &HashSet<String>) {
    if let Some(Value::Array(entries)) = card.get_mut("foreignData") {
        entries.retain(|entry| {
            entry
                .get("language")
                .and_then(Value::as_str)
                .map_or(false, |lang| languages.contains(lang))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn alpha() -> Card {
        serde_json::from_value(json!({
            "name": "Alpha", "colors": ["W"], "colorIdentity": ["W"], "type": "Creature",
            "text": "", "rarity": "common", "setCode": "BIG", "number": "1"
        }))
        .unwrap()
    }

    #[test]
    fn test_project_name_and_rarity() {
        let schema = ProjectionSchema::new(["name", "rarity"]);
        let projected = Projector::new(schema).project(alpha());
        assert_eq!(
            serde_json::to_value(&projected).unwrap(),
            json!({"name": "Alpha", "rarity": "common"})
        );
    }

    #[test]
    fn test_output_follows_schema_order() {
        let schema = ProjectionSchema::new(["rarity", "name", "rarity"]);
        assert_eq!(schema.fields(), &["rarity".to_string(), "name".to_string()]);

        let projected = project(&alpha(), &schema);
        let keys: Vec<&String> = projected.keys().collect();
        assert_eq!(keys, vec!["rarity", "name"]);
    }

    #[test]
    fn test_missing_fields_silently_omitted() {
        let schema = ProjectionSchema::new(["name", "power", "toughness"]);
        let projected = project(&alpha(), &schema);
        assert_eq!(projected.len(), 1);
        assert!(projected.contains_key("name"));
    }

    #[test]
    fn test_empty_and_full_schema_are_identity() {
        let card = alpha();
        assert_eq!(project(&card, &ProjectionSchema::pass_through()), card);

        let full = ProjectionSchema::new(card.keys().cloned());
        assert_eq!(project(&card, &full), card);
        assert_eq!(Projector::new(full).project(card.clone()), card);
    }

    #[test]
    fn test_projected_fields_subset_of_schema_and_card() {
        let card = alpha();
        let schema = ProjectionSchema::new(["text", "artist", "number"]);
        let projected = project(&card, &schema);
        for key in projected.keys() {
            assert!(schema.contains(key));
            assert!(card.contains_key(key));
        }
    }

    #[test]
    fn test_foreign_data_narrowed_to_languages() {
        let mut card = alpha();
        card.insert(
            "foreignData".to_string(),
            json!([
                {"language": "German", "name": "Alpha DE"},
                {"language": "Japanese", "name": "Alpha JA"}
            ]),
        );

        let projector = Projector::new(ProjectionSchema::pass_through()).with_languages(["Japanese"]);
        assert!(!projector.is_identity());
        let projected = projector.project(card);
        assert_eq!(projected["foreignData"], json!([{"language": "Japanese", "name": "Alpha JA"}]));
        assert_eq!(projected["name"], "Alpha");
    }

    #[test]
    fn test_schema_deserializes_from_list() {
        let schema: ProjectionSchema = serde_json::from_value(json!(["name", "name", "type"])).unwrap();
        assert_eq!(schema.fields().len(), 2);
        assert_eq!(ProjectionSchema::default_fields().fields().len(), DEFAULT_FIELDS.len());
    }
}
