//! Validation error types.

use std::fmt;

/// A validation failure at a node of the query.
///
/// `path` names the offending node, e.g. `joins[1].on.left` or
/// `windowFunctions[0].over.frame`. Subquery nodes are prefixed with the
/// path of the join that owns them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValidationError {
    pub path: String,
    pub kind: ValidationErrorKind,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, kind: ValidationErrorKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.kind)
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ValidationErrorKind {
    // Structural
    #[error("Query object name is empty")]
    EmptyObject,

    #[error("'{name}' is not a valid identifier")]
    InvalidIdentifier { name: String },

    #[error("'{combinator}' must have at least one operand")]
    EmptyCombinator { combinator: String },

    #[error("Unknown operator: '{operator}'")]
    UnknownOperator { operator: String },

    #[error("Nesting exceeds the configured depth limit of {limit}")]
    MaxDepthExceeded { limit: usize },

    // Semantic
    #[error("Operator '{operator}' expects {expected}, found {found}")]
    InvalidOperand {
        operator: String,
        expected: String,
        found: String,
    },

    #[error("Invalid regular expression '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("Aggregate function '{function}' requires a field")]
    MissingAggregationField { function: String },

    #[error("Duplicate output alias: '{alias}'")]
    DuplicateAlias { alias: String },

    #[error("Field '{field}' must appear in groupBy or be aggregated")]
    UngroupedField { field: String },

    #[error("Having references '{field}', which is neither an aggregation alias nor a groupBy field")]
    InvalidHavingReference { field: String },

    #[error("Window function '{function}' does not take a field")]
    WindowFieldForbidden { function: String },

    #[error("Window function '{function}' requires a field")]
    WindowFieldRequired { function: String },

    #[error("Window function '{function}' does not take an offset")]
    InvalidWindowOffset { function: String },

    #[error("A window frame requires orderBy")]
    FrameRequiresOrdering,

    #[error("Window frame start '{start}' comes after end '{end}'")]
    InvalidFrameBounds { start: String, end: String },

    #[error("Duplicate join alias: '{alias}'")]
    DuplicateJoinAlias { alias: String },

    #[error("Join condition references '{alias}', which is declared by a later join")]
    ForwardJoinReference { alias: String },

    #[error("Join condition references unknown alias '{alias}'")]
    UnknownJoinReference { alias: String },

    #[error("'{qualifier}' is neither the root object nor a join alias")]
    UnknownSourceReference { qualifier: String },

    #[error("Cursor pagination cannot be combined with top/skip")]
    ConflictingPagination,
}
