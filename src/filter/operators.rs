//! Comparison matchers
//!
//! Each matcher is the compiled form of one operator plus its operand, so an
//! operator can never meet an operand of the wrong shape at evaluation time.

use crate::error::FilterSpecError;
use regex::Regex;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericOp {
    Gt,
    Lt,
    Gte,
    Lte,
}

impl NumericOp {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "gt" => Some(NumericOp::Gt),
            "lt" => Some(NumericOp::Lt),
            "gte" => Some(NumericOp::Gte),
            "lte" => Some(NumericOp::Lte),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NumericOp::Gt => "gt",
            NumericOp::Lt => "lt",
            NumericOp::Gte => "gte",
            NumericOp::Lte => "lte",
        }
    }

    fn apply(self, actual: f64, bound: f64) -> bool {
        match self {
            NumericOp::Gt => actual > bound,
            NumericOp::Lt => actual < bound,
            NumericOp::Gte => actual >= bound,
            NumericOp::Lte => actual <= bound,
        }
    }
}

/// Operand of `contains`, with a lowercased copy for substring matching
#[derive(Debug, Clone)]
pub struct Needle {
    value: Value,
    folded: Option<String>,
}

impl Needle {
    pub fn new(value: Value) -> Self {
        let folded = value.as_str().map(str::to_lowercase);
        Needle { value, folded }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    fn found_in(&self, haystack: &Value) -> bool {
        match haystack {
            Value::String(s) => match &self.folded {
                Some(needle) => s.to_lowercase().contains(needle.as_str()),
                None => false,
            },
            Value::Array(items) => items.iter().any(|item| values_equal(item, &self.value)),
            _ => false,
        }
    }
}

/// A compiled operator with its operand
#[derive(Debug, Clone)]
pub enum Matcher {
    Equals(Value),
    Contains(Needle),
    In(Vec<Value>),
    Numeric(NumericOp, f64),
    Regex(Regex),
}

impl Matcher {
    pub fn operator_name(&self) -> &'static str {
        match self {
            Matcher::Equals(_) => "equals",
            Matcher::Contains(_) => "contains",
            Matcher::In(_) => "in",
            Matcher::Numeric(op, _) => op.name(),
            Matcher::Regex(_) => "regex",
        }
    }

    /// Test a present, non-null field value.
    ///
    /// Only numeric operators can fail, when the field holds something that is
    /// not a number.
    pub fn matches(&self, field: &str, value: &Value) -> Result<bool, FilterSpecError> {
        match self {
            Matcher::Equals(expected) => Ok(values_equal(value, expected)),
            Matcher::Contains(needle) => Ok(needle.found_in(value)),
            Matcher::In(options) => Ok(!value.is_array()
                && !value.is_object()
                && options.iter().any(|option| values_equal(value, option))),
            Matcher::Numeric(op, bound) => match numeric_value(value) {
                Some(actual) => Ok(op.apply(actual, *bound)),
                None => Err(FilterSpecError::NonNumericField {
                    field: field.to_string(),
                    operator: op.name().to_string(),
                    value: Some(value.to_string()),
                }),
            },
            Matcher::Regex(re) => Ok(match value {
                Value::String(s) => re.is_match(s),
                Value::Number(n) => re.is_match(&n.to_string()),
                Value::Bool(b) => re.is_match(if *b { "true" } else { "false" }),
                _ => false,
            }),
        }
    }
}

/// Equality that treats `3` and `3.0` as the same number but never equates
/// a number with a string
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(xi), Some(yi)) = (x.as_i64(), y.as_i64()) {
                xi == yi
            } else if let (Some(xu), Some(yu)) = (x.as_u64(), y.as_u64()) {
                xu == yu
            } else {
                match (x.as_f64(), y.as_f64()) {
                    (Some(xf), Some(yf)) => xf == yf,
                    _ => x == y,
                }
            }
        }
        _ => a == b,
    }
}

/// Numbers, and strings holding a finite number (collector data often stores
/// numbers as text)
pub fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_equals_is_type_aware() {
        let m = Matcher::Equals(json!(3));
        assert!(m.matches("manaValue", &json!(3.0)).unwrap());
        assert!(!m.matches("manaValue", &json!("3")).unwrap());

        let m = Matcher::Equals(json!("Alpha"));
        assert!(m.matches("name", &json!("Alpha")).unwrap());
        assert!(!m.matches("name", &json!("alpha")).unwrap());
    }

    #[test]
    fn test_equals_large_unsigned_is_exact() {
        // both round to the same f64
        assert!(!values_equal(&json!(u64::MAX), &json!(u64::MAX - 1)));
        assert!(values_equal(&json!(u64::MAX), &json!(u64::MAX)));
        assert!(!values_equal(&json!(u64::MAX), &json!(-1)));

        let m = Matcher::Equals(json!(u64::MAX - 1));
        assert!(!m.matches("multiverseId", &json!(u64::MAX)).unwrap());
    }

    #[test]
    fn test_contains_substring_and_membership() {
        let m = Matcher::Contains(Needle::new(json!("bolt")));
        assert!(m.matches("name", &json!("Lightning Bolt")).unwrap());
        assert!(!m.matches("name", &json!("Shock")).unwrap());

        let m = Matcher::Contains(Needle::new(json!("W")));
        assert!(m.matches("colors", &json!(["W", "U"])).unwrap());
        assert!(!m.matches("colors", &json!(["U"])).unwrap());
        assert!(!m.matches("colors", &json!(5)).unwrap());
    }

    #[test]
    fn test_in_membership() {
        let m = Matcher::In(vec![json!("rare"), json!("mythic")]);
        assert!(m.matches("rarity", &json!("rare")).unwrap());
        assert!(!m.matches("rarity", &json!("common")).unwrap());
        assert!(!m.matches("rarity", &json!(["rare"])).unwrap());
    }

    #[test]
    fn test_numeric_comparisons() {
        let m = Matcher::Numeric(NumericOp::Gte, 3.0);
        assert!(m.matches("manaValue", &json!(3)).unwrap());
        assert!(m.matches("manaValue", &json!(4.5)).unwrap());
        assert!(!m.matches("manaValue", &json!(2)).unwrap());
        assert!(m.matches("power", &json!("5")).unwrap());

        let err = m.matches("power", &json!("*")).unwrap_err();
        assert!(matches!(err, FilterSpecError::NonNumericField { ref field, .. } if field == "power"));
    }

    #[test]
    fn test_regex_against_scalars() {
        let m = Matcher::Regex(Regex::new("^Lightning").unwrap());
        assert!(m.matches("name", &json!("Lightning Bolt")).unwrap());
        assert!(!m.matches("name", &json!("Chain Lightning")).unwrap());

        let m = Matcher::Regex(Regex::new(r"^\d+$").unwrap());
        assert!(m.matches("number", &json!(12)).unwrap());
        assert!(!m.matches("colors", &json!(["1"])).unwrap());
    }
}
