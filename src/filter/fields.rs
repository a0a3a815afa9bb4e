//! Known card fields and their value kinds
//!
//! Lets the compiler reject a numeric operator on a field that can never hold
//! a number before any record is read. Fields not in the catalog are checked
//! at evaluation time instead.

use once_cell::sync::Lazy;
use std::collections::HashMap;

static MTGJSON_CATALOG: Lazy<FieldCatalog> = Lazy::new(FieldCatalog::build_mtgjson);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Numeric,
    Text,
    List,
    Flag,
    Object,
}

impl FieldKind {
    pub fn is_numeric(self) -> bool {
        self == FieldKind::Numeric
    }
}

const NUMERIC_FIELDS: &[&str] = &[
    "manaValue",
    "convertedManaCost",
    "faceManaValue",
    "faceConvertedManaCost",
    "edhrecRank",
    "edhrecSaltiness",
    "hand",
    "life",
];

const TEXT_FIELDS: &[&str] = &[
    "name",
    "asciiName",
    "faceName",
    "type",
    "text",
    "flavorText",
    "originalText",
    "originalType",
    "rarity",
    "setCode",
    "manaCost",
    "artist",
    "borderColor",
    "frameVersion",
    "layout",
    "language",
    "securityStamp",
    "side",
    "uuid",
    "watermark",
];

const LIST_FIELDS: &[&str] = &[
    "colors",
    "colorIdentity",
    "colorIndicator",
    "types",
    "subtypes",
    "supertypes",
    "keywords",
    "availability",
    "finishes",
    "frameEffects",
    "printings",
    "promoTypes",
    "foreignData",
    "rulings",
    "otherFaceIds",
    "variations",
];

const FLAG_FIELDS: &[&str] = &[
    "isReprint",
    "isPromo",
    "isFullArt",
    "isOnlineOnly",
    "isReserved",
    "isTextless",
    "hasFoil",
    "hasNonFoil",
];

const OBJECT_FIELDS: &[&str] = &["identifiers", "legalities", "purchaseUrls", "leadershipSkills"];

/// Field name to kind lookup used by the filter compiler
#[derive(Debug, Clone, Default)]
pub struct FieldCatalog {
    kinds: HashMap<String, FieldKind>,
}

impl FieldCatalog {
    /// A catalog that knows nothing; every check is deferred to evaluation
    pub fn empty() -> Self {
        Self::default()
    }

    /// Field kinds of the MTGJSON card model
    pub fn mtgjson() -> Self {
        MTGJSON_CATALOG.clone()
    }

    fn build_mtgjson() -> Self {
        let mut catalog = Self::empty();
        for (names, kind) in [
            (NUMERIC_FIELDS, FieldKind::Numeric),
            (TEXT_FIELDS, FieldKind::Text),
            (LIST_FIELDS, FieldKind::List),
            (FLAG_FIELDS, FieldKind::Flag),
            (OBJECT_FIELDS, FieldKind::Object),
        ] {
            for name in names {
                catalog.insert(*name, kind);
            }
        }
        catalog
    }

    pub fn insert(&mut self, field: impl Into<String>, kind: FieldKind) {
        self.kinds.insert(field.into(), kind);
    }

    pub fn kind(&self, field: &str) -> Option<FieldKind> {
        self.kinds.get(field).copied()
    }

    /// True when the field is known and can never hold a number
    pub fn is_known_non_numeric(&self, field: &str) -> bool {
        matches!(self.kind(field), Some(kind) if !kind.is_numeric())
    }
}
