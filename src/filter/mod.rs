//! Filtering - compile filter specs into predicate trees and evaluate them
//!
//! The operator set is closed: every comparison is a [`Matcher`] variant and
//! every interior node a [`LogicalOp`], so evaluation matches exhaustively.

pub mod compiler;
pub mod fields;
pub mod operators;
pub mod predicate;

pub use compiler::{compile_filter, FilterCompiler, OPERATORS};
pub use fields::{FieldCatalog, FieldKind};
pub use operators::{Matcher, Needle, NumericOp};
pub use predicate::{Filter, LogicalOp, PredicateNode};
