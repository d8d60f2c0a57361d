//! The unified query AST.
//!
//! Immutable value types describing a backend-agnostic query. Callers
//! typically deserialize JSON into [`Query`] and hand it to the
//! [`Validator`](crate::validation::Validator).

mod field;
mod filter;
mod query;
mod window;

pub use field::FieldRef;
pub use filter::{canonical_operator, Condition, FilterExpr, FilterValue};
pub use query::{
    AggregateFunction, Aggregation, JoinCondition, JoinSpec, JoinType, Pagination, Query,
    SortOrder, SortSpec,
};
pub use window::{Frame, FrameBound, FrameType, WindowFunction, WindowFunctionKind, WindowSpec};

/// The input could not be read as a query at all.
///
/// Raised before validation; a query that parses always reaches the validator.
#[derive(Debug, thiserror::Error)]
pub enum QueryParseError {
    #[error("Invalid query JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid filter at {path}: {message}")]
    InvalidFilter { path: String, message: String },

    #[error("Invalid filter value: {0}")]
    InvalidValue(String),
}
