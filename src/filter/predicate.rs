//! The predicate tree and its evaluation

use crate::error::FilterSpecError;
use crate::filter::operators::Matcher;
use crate::types::Card;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

impl LogicalOp {
    pub fn name(self) -> &'static str {
        match self {
            LogicalOp::And => "and",
            LogicalOp::Or => "or",
            LogicalOp::Not => "not",
        }
    }
}

/// Immutable boolean expression over one card
#[derive(Debug, Clone)]
pub enum PredicateNode {
    Comparison { field: String, matcher: Matcher },
    Logical { op: LogicalOp, children: Vec<PredicateNode> },
}

impl PredicateNode {
    pub fn comparison(field: impl Into<String>, matcher: Matcher) -> Self {
        PredicateNode::Comparison {
            field: field.into(),
            matcher,
        }
    }

    pub fn and(children: Vec<PredicateNode>) -> Result<Self, FilterSpecError> {
        Self::logical(LogicalOp::And, children)
    }

    pub fn or(children: Vec<PredicateNode>) -> Result<Self, FilterSpecError> {
        Self::logical(LogicalOp::Or, children)
    }

    pub fn not(child: PredicateNode) -> Self {
        PredicateNode::Logical {
            op: LogicalOp::Not,
            children: vec![child],
        }
    }

    /// Build an interior node, rejecting arities the operator does not allow
    pub fn logical(op: LogicalOp, children: Vec<PredicateNode>) -> Result<Self, FilterSpecError> {
        check_arity(op, children.len())?;
        Ok(PredicateNode::Logical { op, children })
    }

    /// Combine with AND, collapsing a single child to itself
    pub fn all_of(mut children: Vec<PredicateNode>) -> Result<Self, FilterSpecError> {
        if children.len() == 1 {
            return Ok(children.remove(0));
        }
        Self::and(children)
    }

    /// Check arity of every interior node, for trees built by hand
    pub fn validate(&self) -> Result<(), FilterSpecError> {
        match self {
            PredicateNode::Comparison { .. } => Ok(()),
            PredicateNode::Logical { op, children } => {
                check_arity(*op, children.len())?;
                children.iter().try_for_each(PredicateNode::validate)
            }
        }
    }

    /// Evaluate against one card.
    ///
    /// An absent or null field makes its comparison false. The only error is a
    /// numeric operator meeting a non-numeric value.
    pub fn evaluate(&self, card: &Card) -> Result<bool, FilterSpecError> {
        match self {
            PredicateNode::Comparison { field, matcher } => match card.get(field) {
                None | Some(Value::Null) => Ok(false),
                Some(value) => matcher.matches(field, value),
            },
            PredicateNode::Logical { op, children } => {
                check_arity(*op, children.len())?;
                match op {
                    LogicalOp::And => {
                        for child in children {
                            if !child.evaluate(card)? {
                                return Ok(false);
                            }
                        }
                        Ok(true)
                    }
                    LogicalOp::Or => {
                        for child in children {
                            if child.evaluate(card)? {
                                return Ok(true);
                            }
                        }
                        Ok(false)
                    }
                    LogicalOp::Not => Ok(!children[0].evaluate(card)?),
                }
            }
        }
    }

    /// Number of comparison leaves
    pub fn leaf_count(&self) -> usize {
        match self {
            PredicateNode::Comparison { .. } => 1,
            PredicateNode::Logical { children, .. } => children.iter().map(Self::leaf_count).sum(),
        }
    }
}

fn check_arity(op: LogicalOp, count: usize) -> Result<(), FilterSpecError> {
    let ok = match op {
        LogicalOp::Not => count == 1,
        LogicalOp::And | LogicalOp::Or => count >= 1,
    };
    if ok {
        Ok(())
    } else {
        Err(FilterSpecError::malformed(
            op.name(),
            format!("`{}` cannot take {} operand(s)", op.name(), count),
        ))
    }
}

/// A compiled filter; the empty filter keeps every card
#[derive(Debug, Clone, Default)]
pub struct Filter {
    root: Option<PredicateNode>,
}

impl Filter {
    pub fn pass_all() -> Self {
        Filter { root: None }
    }

    pub fn new(root: PredicateNode) -> Result<Self, FilterSpecError> {
        root.validate()?;
        Ok(Filter { root: Some(root) })
    }

    pub fn root(&self) -> Option<&PredicateNode> {
        self.root.as_ref()
    }

    pub fn is_pass_all(&self) -> bool {
        self.root.is_none()
    }

    pub fn matches(&self, card: &Card) -> Result<bool, FilterSpecError> {
        match &self.root {
            None => Ok(true),
            Some(node) => node.evaluate(card),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::operators::{Needle, NumericOp};
    use serde_json::json;

    fn card(value: Value) -> Card {
        serde_json::from_value(value).unwrap()
    }

    fn has_color(c: &str) -> PredicateNode {
        PredicateNode::comparison("colors", Matcher::Contains(Needle::new(json!(c))))
    }

    #[test]
    fn test_absent_field_is_false() {
        let node = PredicateNode::comparison("power", Matcher::Numeric(NumericOp::Gt, 2.0));
        assert!(!node.evaluate(&card(json!({"name": "Shock"}))).unwrap());
        assert!(!node.evaluate(&card(json!({"power": null}))).unwrap());
    }

    #[test]
    fn test_nested_logic() {
        // (W or U) and not B
        let node = PredicateNode::and(vec![
            PredicateNode::or(vec![has_color("W"), has_color("U")]).unwrap(),
            PredicateNode::not(has_color("B")),
        ])
        .unwrap();

        assert!(node.evaluate(&card(json!({"colors": ["W"]}))).unwrap());
        assert!(node.evaluate(&card(json!({"colors": ["U", "R"]}))).unwrap());
        assert!(!node.evaluate(&card(json!({"colors": ["W", "B"]}))).unwrap());
        assert!(!node.evaluate(&card(json!({"colors": ["G"]}))).unwrap());
        assert_eq!(node.leaf_count(), 3);
    }

    #[test]
    fn test_degenerate_nodes_rejected() {
        assert!(PredicateNode::and(vec![]).is_err());
        assert!(PredicateNode::or(vec![]).is_err());
        assert!(PredicateNode::logical(LogicalOp::Not, vec![has_color("W"), has_color("U")]).is_err());

        let hand_built = PredicateNode::Logical {
            op: LogicalOp::And,
            children: vec![],
        };
        assert!(Filter::new(hand_built.clone()).is_err());
        assert!(hand_built.evaluate(&card(json!({}))).is_err());
    }

    #[test]
    fn test_numeric_error_propagates_through_logic() {
        let node = PredicateNode::or(vec![
            PredicateNode::comparison("power", Matcher::Numeric(NumericOp::Gt, 2.0)),
            has_color("W"),
        ])
        .unwrap();
        assert!(node.evaluate(&card(json!({"power": "*", "colors": ["W"]}))).is_err());
    }

    #[test]
    fn test_pass_all_filter() {
        let filter = Filter::pass_all();
        assert!(filter.is_pass_all());
        assert!(filter.matches(&card(json!({}))).unwrap());
    }
}
