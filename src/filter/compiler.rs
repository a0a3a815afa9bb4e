//! Filter specification compiler
//!
//! A filter spec is a JSON object. Each key is a field name whose value is
//! either a literal or an object of operator → operand:
//!
//! ```json
//! {
//!   "colors": {"contains": "W"},
//!   "rarity": ["rare", "mythic"],
//!   "manaValue": {"gte": 2, "lte": 4},
//!   "name": {"not": {"regex": "^Serra"}},
//!   "$or": [{"type": {"contains": "Instant"}}, {"type": {"contains": "Sorcery"}}]
//! }
//! ```
//!
//! A scalar literal means `equals`, a list literal means `in`. Keys combine
//! with AND. `$and`, `$or` and `$not` nest whole sub-specs.

use crate::error::FilterSpecError;
use crate::filter::fields::FieldCatalog;
use crate::filter::operators::{numeric_value, Matcher, Needle, NumericOp};
use crate::filter::predicate::{Filter, PredicateNode};
use regex::Regex;
use serde_json::{Map, Value};

/// Operators accepted inside a field's operator object
pub const OPERATORS: &[&str] = &[
    "equals", "eq", "contains", "in", "gt", "lt", "gte", "lte", "regex", "not",
];

/// Translates filter specs into predicate trees
#[derive(Debug, Clone)]
pub struct FilterCompiler {
    catalog: FieldCatalog,
}

impl Default for FilterCompiler {
    fn default() -> Self {
        FilterCompiler {
            catalog: FieldCatalog::mtgjson(),
        }
    }
}

impl FilterCompiler {
    pub fn new(catalog: FieldCatalog) -> Self {
        FilterCompiler { catalog }
    }

    /// Parse JSON text and compile it
    pub fn compile_str(&self, text: &str) -> Result<Filter, FilterSpecError> {
        let spec: Value =
            serde_json::from_str(text).map_err(|e| FilterSpecError::Parse(e.to_string()))?;
        self.compile(&spec)
    }

    /// Compile a spec. An empty object yields the pass-all filter.
    pub fn compile(&self, spec: &Value) -> Result<Filter, FilterSpecError> {
        let Value::Object(entries) = spec else {
            return Err(FilterSpecError::malformed("$", "filter spec must be an object"));
        };
        if entries.is_empty() {
            return Ok(Filter::pass_all());
        }
        let root = self.compile_object(entries, "$")?;
        Filter::new(root)
    }

    fn compile_object(&self, entries: &Map<String, Value>, path: &str) -> Result<PredicateNode, FilterSpecError> {
        if entries.is_empty() {
            return Err(FilterSpecError::malformed(path, "empty condition object"));
        }

        let mut children = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let child_path = format!("{}.{}", path, key);
            let node = match key.as_str() {
                "$and" => PredicateNode::and(self.compile_list(value, &child_path)?)?,
                "$or" => PredicateNode::or(self.compile_list(value, &child_path)?)?,
                "$not" => match value {
                    Value::Object(inner) => PredicateNode::not(self.compile_object(inner, &child_path)?),
                    _ => {
                        return Err(FilterSpecError::malformed(
                            child_path,
                            "`$not` takes exactly one condition object",
                        ))
                    }
                },
                other if other.starts_with('$') => {
                    return Err(FilterSpecError::UnknownOperator {
                        field: path.to_string(),
                        operator: other.to_string(),
                    })
                }
                field => self.compile_field(field, value, &child_path)?,
            };
            children.push(node);
        }

        PredicateNode::all_of(children)
    }

    fn compile_list(&self, value: &Value, path: &str) -> Result<Vec<PredicateNode>, FilterSpecError> {
        let Value::Array(items) = value else {
            return Err(FilterSpecError::malformed(path, "expected a list of condition objects"));
        };
        if items.is_empty() {
            return Err(FilterSpecError::malformed(path, "empty condition list"));
        }

        items
            .iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(inner) => self.compile_object(inner, &format!("{}[{}]", path, i)),
                _ => Err(FilterSpecError::malformed(
                    format!("{}[{}]", path, i),
                    "expected a condition object",
                )),
            })
            .collect()
    }

    fn compile_field(&self, field: &str, value: &Value, path: &str) -> Result<PredicateNode, FilterSpecError> {
        match value {
            Value::Object(ops) => self.compile_operators(field, ops, path),
            Value::Array(options) => Ok(PredicateNode::comparison(field, Matcher::In(options.clone()))),
            literal => Ok(PredicateNode::comparison(field, Matcher::Equals(literal.clone()))),
        }
    }

    fn compile_operators(
        &self,
        field: &str,
        ops: &Map<String, Value>,
        path: &str,
    ) -> Result<PredicateNode, FilterSpecError> {
        if ops.is_empty() {
            return Err(FilterSpecError::malformed(path, "empty operator object"));
        }

        let children = ops
            .iter()
            .map(|(op, operand)| self.compile_operator(field, op, operand, &format!("{}.{}", path, op)))
            .collect::<Result<Vec<_>, _>>()?;

        PredicateNode::all_of(children)
    }

    fn compile_operator(
        &self,
        field: &str,
        op: &str,
        operand: &Value,
        path: &str,
    ) -> Result<PredicateNode, FilterSpecError> {
        if let Some(numeric) = NumericOp::from_name(op) {
            return self.compile_numeric(field, numeric, operand);
        }

        let matcher = match op {
            "equals" | "eq" => {
                require_scalar(operand, path)?;
                Matcher::Equals(operand.clone())
            }
            "contains" => {
                require_scalar(operand, path)?;
                if operand.is_null() {
                    return Err(FilterSpecError::malformed(path, "`contains` needs a non-null operand"));
                }
                Matcher::Contains(Needle::new(operand.clone()))
            }
            "in" => match operand {
                Value::Array(options) => Matcher::In(options.clone()),
                _ => return Err(FilterSpecError::malformed(path, "`in` needs a list operand")),
            },
            "regex" => {
                let Some(pattern) = operand.as_str() else {
                    return Err(FilterSpecError::malformed(path, "`regex` needs a string pattern"));
                };
                let re = Regex::new(pattern).map_err(|e| FilterSpecError::InvalidRegex {
                    field: field.to_string(),
                    reason: e.to_string(),
                })?;
                Matcher::Regex(re)
            }
            "not" => {
                let inner = match operand {
                    Value::Object(inner_ops) => self.compile_operators(field, inner_ops, path)?,
                    Value::Array(_) => {
                        return Err(FilterSpecError::malformed(
                            path,
                            "`not` takes exactly one operand, not a list",
                        ))
                    }
                    literal => PredicateNode::comparison(field, Matcher::Equals(literal.clone())),
                };
                return Ok(PredicateNode::not(inner));
            }
            unknown => {
                return Err(FilterSpecError::UnknownOperator {
                    field: field.to_string(),
                    operator: unknown.to_string(),
                })
            }
        };

        Ok(PredicateNode::comparison(field, matcher))
    }

    fn compile_numeric(&self, field: &str, op: NumericOp, operand: &Value) -> Result<PredicateNode, FilterSpecError> {
        let Some(bound) = numeric_value(operand) else {
            return Err(FilterSpecError::NonNumericOperand {
                field: field.to_string(),
                operator: op.name().to_string(),
                operand: operand.to_string(),
            });
        };

        if self.catalog.is_known_non_numeric(field) {
            return Err(FilterSpecError::NonNumericField {
                field: field.to_string(),
                operator: op.name().to_string(),
                value: None,
            });
        }

        Ok(PredicateNode::comparison(field, Matcher::Numeric(op, bound)))
    }
}

fn require_scalar(operand: &Value, path: &str) -> Result<(), FilterSpecError> {
    if operand.is_array() || operand.is_object() {
        return Err(FilterSpecError::malformed(path, "expected a scalar operand"));
    }
    Ok(())
}

/// Compile a spec with the default field catalog
pub fn compile_filter(spec: &Value) -> Result<Filter, FilterSpecError> {
    FilterCompiler::default().compile(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Card;
    use serde_json::json;

    fn card(value: Value) -> Card {
        serde_json::from_value(value).unwrap()
    }

    fn alpha() -> Card {
        card(json!({
            "name": "Alpha", "colors": ["W"], "colorIdentity": ["W"], "type": "Creature",
            "text": "", "rarity": "common", "setCode": "BIG", "number": "1", "manaValue": 2
        }))
    }

    fn beta() -> Card {
        card(json!({
            "name": "Beta", "colors": ["U"], "colorIdentity": ["U"], "type": "Instant",
            "text": "Counter target spell.", "rarity": "rare", "setCode": "BIG", "number": "2", "manaValue": 4
        }))
    }

    #[test]
    fn test_contains_on_colors() {
        let filter = compile_filter(&json!({"colors": {"contains": "W"}})).unwrap();
        assert!(filter.matches(&alpha()).unwrap());
        assert!(!filter.matches(&beta()).unwrap());
    }

    #[test]
    fn test_literals_mean_equals_and_in() {
        let filter = compile_filter(&json!({"rarity": "rare"})).unwrap();
        assert!(!filter.matches(&alpha()).unwrap());
        assert!(filter.matches(&beta()).unwrap());

        let filter = compile_filter(&json!({"rarity": ["common", "uncommon"]})).unwrap();
        assert!(filter.matches(&alpha()).unwrap());
        assert!(!filter.matches(&beta()).unwrap());
    }

    #[test]
    fn test_top_level_keys_are_anded() {
        let filter = compile_filter(&json!({"type": "Creature", "manaValue": {"lte": 3}})).unwrap();
        assert!(filter.matches(&alpha()).unwrap());
        assert!(!filter.matches(&beta()).unwrap());

        let filter = compile_filter(&json!({"manaValue": {"gte": 3, "lte": 5}})).unwrap();
        assert!(!filter.matches(&alpha()).unwrap());
        assert!(filter.matches(&beta()).unwrap());
    }

    #[test]
    fn test_not_and_nested_logic() {
        let filter = compile_filter(&json!({"colors": {"not": {"contains": "W"}}})).unwrap();
        assert!(!filter.matches(&alpha()).unwrap());
        assert!(filter.matches(&beta()).unwrap());

        let filter = compile_filter(&json!({
            "$or": [
                {"name": "Alpha"},
                {"$and": [{"rarity": "rare"}, {"$not": {"text": {"contains": "counter"}}}]}
            ]
        }))
        .unwrap();
        assert!(filter.matches(&alpha()).unwrap());
        assert!(!filter.matches(&beta()).unwrap());
    }

    #[test]
    fn test_regex_and_case_insensitive_contains() {
        let filter = compile_filter(&json!({"text": {"contains": "COUNTER"}})).unwrap();
        assert!(filter.matches(&beta()).unwrap());

        let filter = compile_filter(&json!({"name": {"regex": "^B.t"}})).unwrap();
        assert!(filter.matches(&beta()).unwrap());
        assert!(!filter.matches(&alpha()).unwrap());
    }

    #[test]
    fn test_empty_spec_passes_everything() {
        let filter = compile_filter(&json!({})).unwrap();
        assert!(filter.is_pass_all());
        assert!(filter.matches(&alpha()).unwrap());
    }

    #[test]
    fn test_non_numeric_operand_rejected_eagerly() {
        let err = compile_filter(&json!({"manaValue": {"gt": "three"}})).unwrap_err();
        assert!(matches!(err, FilterSpecError::NonNumericOperand { ref operator, .. } if operator == "gt"));

        // numeric text is fine
        assert!(compile_filter(&json!({"manaValue": {"gt": "3"}})).is_ok());
    }

    #[test]
    fn test_numeric_operator_on_known_text_field_rejected() {
        let err = compile_filter(&json!({"name": {"lt": 5}})).unwrap_err();
        assert!(matches!(err, FilterSpecError::NonNumericField { value: None, .. }));

        let lenient = FilterCompiler::new(FieldCatalog::empty());
        assert!(lenient.compile(&json!({"name": {"lt": 5}})).is_ok());
    }

    #[test]
    fn test_malformed_specs() {
        assert!(matches!(
            compile_filter(&json!({"name": {"startswith": "A"}})),
            Err(FilterSpecError::UnknownOperator { .. })
        ));
        assert!(matches!(
            compile_filter(&json!({"colors": {"not": [{"contains": "W"}, {"contains": "U"}]}})),
            Err(FilterSpecError::Malformed { .. })
        ));
        assert!(matches!(
            compile_filter(&json!({"$not": [{"name": "Alpha"}]})),
            Err(FilterSpecError::Malformed { .. })
        ));
        assert!(matches!(
            compile_filter(&json!({"$or": []})),
            Err(FilterSpecError::Malformed { .. })
        ));
        assert!(matches!(
            compile_filter(&json!({"name": {}})),
            Err(FilterSpecError::Malformed { .. })
        ));
        assert!(matches!(
            compile_filter(&json!({"rarity": {"in": "rare"}})),
            Err(FilterSpecError::Malformed { .. })
        ));
        assert!(matches!(
            compile_filter(&json!({"name": {"regex": "("}})),
            Err(FilterSpecError::InvalidRegex { .. })
        ));
        assert!(matches!(compile_filter(&json!(["name"])), Err(FilterSpecError::Malformed { .. })));
        assert!(matches!(
            compile_filter(&json!({"$nor": [{"name": "Alpha"}]})),
            Err(FilterSpecError::UnknownOperator { operator, .. }) if operator == "$nor"
        ));
        assert!(matches!(
            compile_filter(&json!({"$or": [{"$AND": [{"name": "Alpha"}]}]})),
            Err(FilterSpecError::UnknownOperator { .. })
        ));
    }

    #[test]
    fn test_compile_str() {
        let compiler = FilterCompiler::default();
        assert!(compiler.compile_str(r#"{"colors": {"contains": "W"}}"#).is_ok());
        assert!(matches!(compiler.compile_str("{not json"), Err(FilterSpecError::Parse(_))));
    }
}
