//! Query Module
//!
//! Predicate classification and document matching.
//!
//! ## Responsibilities
//! - Classify duck-typed payload shapes into tagged predicate variants
//! - Evaluate predicates against documents (equality, inequality, range)
//! - Compile `^` / `~` / `$` pattern operators into regular expressions
//! - Filter resource names (databases, collections) with the same vocabulary

mod matcher;
mod predicate;

pub use matcher::{compare, lookup_path, matches_query, values_equal};
pub use predicate::{is_pattern_key, CompareOp, DocQuery, NameFilter, Pattern, PatternKind};
