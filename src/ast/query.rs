//! The root query value and its clauses.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::field::FieldRef;
use super::filter::FilterExpr;
use super::window::WindowFunction;
use super::QueryParseError;

/// A backend-agnostic query.
///
/// Built once by the caller and never mutated afterwards: builder methods
/// consume the value and return a new one.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    /// Root object (table, entity set, resource).
    pub object: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<FilterExpr>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aggregations: Vec<Aggregation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_by: Vec<FieldRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub having: Option<FilterExpr>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub joins: Vec<JoinSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub window_functions: Vec<WindowFunction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl Query {
    pub fn new(object: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            ..Default::default()
        }
    }

    /// Deserialize a query from JSON text.
    pub fn from_json(json: &str) -> Result<Self, QueryParseError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Deserialize a query from an already-parsed JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, QueryParseError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn select<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<FieldRef>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn filter(mut self, expr: FilterExpr) -> Self {
        self.filters = Some(expr);
        self
    }

    pub fn aggregate(mut self, aggregation: Aggregation) -> Self {
        self.aggregations.push(aggregation);
        self
    }

    pub fn group_by(mut self, field: impl Into<FieldRef>) -> Self {
        self.group_by.push(field.into());
        self
    }

    pub fn having(mut self, expr: FilterExpr) -> Self {
        self.having = Some(expr);
        self
    }

    pub fn join(mut self, join: JoinSpec) -> Self {
        self.joins.push(join);
        self
    }

    pub fn window(mut self, window: WindowFunction) -> Self {
        self.window_functions.push(window);
        self
    }

    pub fn sort(mut self, spec: SortSpec) -> Self {
        self.sort.push(spec);
        self
    }

    pub fn paginate(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    pub fn has_aggregation(&self) -> bool {
        !self.aggregations.is_empty() || !self.group_by.is_empty()
    }
}

// ============================================================================
// Aggregation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    CountDistinct,
}

impl AggregateFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::CountDistinct => "count_distinct",
        }
    }

    /// Only a plain row count may omit the field.
    pub fn requires_field(&self) -> bool {
        !matches!(self, AggregateFunction::Count)
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub function: AggregateFunction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<FieldRef>,
    pub alias: String,
}

impl Aggregation {
    pub fn count(alias: impl Into<String>) -> Self {
        Self {
            function: AggregateFunction::Count,
            field: None,
            alias: alias.into(),
        }
    }

    pub fn new(
        function: AggregateFunction,
        field: impl Into<FieldRef>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            function,
            field: Some(field.into()),
            alias: alias.into(),
        }
    }
}

// ============================================================================
// Joins
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    pub const ALL: [JoinType; 4] = [JoinType::Inner, JoinType::Left, JoinType::Right, JoinType::Full];

    pub fn as_str(&self) -> &'static str {
        match self {
            JoinType::Inner => "inner",
            JoinType::Left => "left",
            JoinType::Right => "right",
            JoinType::Full => "full",
        }
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Equality predicate `left = right`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinCondition {
    pub left: FieldRef,
    pub right: FieldRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinSpec {
    #[serde(rename = "type", default)]
    pub join_type: JoinType,
    #[serde(alias = "targetObject")]
    pub object: String,
    pub alias: String,
    #[serde(alias = "onCondition")]
    pub on: JoinCondition,
    /// Joined against a derived source instead of the bare object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subquery: Option<Box<Query>>,
}

impl JoinSpec {
    pub fn new(
        join_type: JoinType,
        object: impl Into<String>,
        alias: impl Into<String>,
        left: impl Into<FieldRef>,
        right: impl Into<FieldRef>,
    ) -> Self {
        Self {
            join_type,
            object: object.into(),
            alias: alias.into(),
            on: JoinCondition {
                left: left.into(),
                right: right.into(),
            },
            subquery: None,
        }
    }

    pub fn with_subquery(mut self, subquery: Query) -> Self {
        self.subquery = Some(Box::new(subquery));
        self
    }
}

// ============================================================================
// Sorting & pagination
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Sort key. Also accepts the string shorthand `"name"` / `"-name"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "SortSpecRepr")]
pub struct SortSpec {
    pub field: FieldRef,
    pub order: SortOrder,
}

impl SortSpec {
    pub fn asc(field: impl Into<FieldRef>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: impl Into<FieldRef>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }

    pub fn is_descending(&self) -> bool {
        self.order == SortOrder::Desc
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SortSpecRepr {
    Shorthand(String),
    Full {
        field: FieldRef,
        #[serde(default)]
        order: SortOrder,
    },
}

impl From<SortSpecRepr> for SortSpec {
    fn from(repr: SortSpecRepr) -> Self {
        match repr {
            SortSpecRepr::Shorthand(s) => match s.strip_prefix('-') {
                Some(rest) => SortSpec::desc(rest),
                None => SortSpec::asc(s.trim_start_matches('+')),
            },
            SortSpecRepr::Full { field, order } => SortSpec { field, order },
        }
    }
}

/// Offset pagination (`top`/`skip`) or cursor pagination, never both.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

impl Pagination {
    pub fn top(top: u64) -> Self {
        Self {
            top: Some(top),
            ..Default::default()
        }
    }

    pub fn offset(top: u64, skip: u64) -> Self {
        Self {
            top: Some(top),
            skip: Some(skip),
            cursor: None,
        }
    }

    pub fn cursor(cursor: impl Into<String>) -> Self {
        Self {
            cursor: Some(cursor.into()),
            ..Default::default()
        }
    }

    pub fn is_conflicting(&self) -> bool {
        self.cursor.is_some() && (self.top.is_some() || self.skip.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.top.is_none() && self.skip.is_none() && self.cursor.is_none()
    }
}
