//! Validation of queries.
//!
//! Structural checks (identifiers, combinators, operators, depth) and
//! semantic checks (operand arity, alias uniqueness, grouping, window
//! constraints, join alias resolution, pagination) run over the whole query
//! and every error is collected. Subqueries are validated recursively up to
//! [`ValidationOptions::max_subquery_depth`].

mod error;

pub use error::{ValidationError, ValidationErrorKind};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::ast::{Condition, FieldRef, FilterExpr, FilterValue, FrameBound, Query};
use crate::registry::{Arity, OperatorRegistry};

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

/// Recursion bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationOptions {
    /// Maximum nesting of join subqueries (the root query is depth 0).
    pub max_subquery_depth: usize,
    /// Maximum nesting of boolean combinators in a filter.
    pub max_filter_depth: usize,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            max_subquery_depth: 5,
            max_filter_depth: 32,
        }
    }
}

/// Validate a query against the canonical operator set and default limits.
pub fn validate(query: &Query) -> Result<(), Vec<ValidationError>> {
    Validator::new(OperatorRegistry::global()).validate(query)
}

/// Query validator.
pub struct Validator<'a> {
    registry: &'a OperatorRegistry,
    options: ValidationOptions,
}

impl<'a> Validator<'a> {
    pub fn new(registry: &'a OperatorRegistry) -> Self {
        Self {
            registry,
            options: ValidationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ValidationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.options.max_subquery_depth = depth;
        self
    }

    /// Validate a query. Returns every independent error found.
    pub fn validate(&self, query: &Query) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        self.validate_query(query, "", 0, &mut errors);

        if errors.is_empty() {
            tracing::debug!(object = %query.object, "query is valid");
            Ok(())
        } else {
            tracing::debug!(
                object = %query.object,
                errors = errors.len(),
                "query failed validation"
            );
            Err(errors)
        }
    }

    fn validate_query(
        &self,
        query: &Query,
        prefix: &str,
        depth: usize,
        errors: &mut Vec<ValidationError>,
    ) {
        if depth > self.options.max_subquery_depth {
            errors.push(ValidationError::new(
                if prefix.is_empty() { "<root>" } else { prefix },
                ValidationErrorKind::MaxDepthExceeded {
                    limit: self.options.max_subquery_depth,
                },
            ));
            return;
        }

        if query.object.is_empty() {
            errors.push(ValidationError::new(
                at(prefix, "object"),
                ValidationErrorKind::EmptyObject,
            ));
        } else {
            check_identifier(&query.object, &at(prefix, "object"), errors);
        }

        self.validate_joins(query, prefix, depth, errors);

        let scope = Scope::rows(query);

        for (i, field) in query.fields.iter().enumerate() {
            scope.check_field(field, &at(prefix, &format!("fields[{}]", i)), errors);
        }

        if let Some(filters) = &query.filters {
            self.validate_filter(filters, &at(prefix, "filters"), 1, &scope, errors);
        }

        let mut output_aliases = HashSet::new();
        self.validate_aggregations(query, prefix, &scope, &mut output_aliases, errors);
        self.validate_windows(query, prefix, &scope, &mut output_aliases, errors);

        if let Some(having) = &query.having {
            let having_scope = Scope::aggregate(query);
            self.validate_filter(having, &at(prefix, "having"), 1, &having_scope, errors);
        }

        for (i, spec) in query.sort.iter().enumerate() {
            scope.check_field(&spec.field, &at(prefix, &format!("sort[{}]", i)), errors);
        }

        if let Some(pagination) = &query.pagination {
            if pagination.is_conflicting() {
                errors.push(ValidationError::new(
                    at(prefix, "pagination"),
                    ValidationErrorKind::ConflictingPagination,
                ));
            }
        }
    }

    // ========================================================================
    // Joins
    // ========================================================================

    fn validate_joins(
        &self,
        query: &Query,
        prefix: &str,
        depth: usize,
        errors: &mut Vec<ValidationError>,
    ) {
        let mut declared: Vec<&str> = Vec::new();

        for (i, join) in query.joins.iter().enumerate() {
            let join_path = at(prefix, &format!("joins[{}]", i));

            check_identifier(&join.object, &format!("{}.object", join_path), errors);
            check_identifier(&join.alias, &format!("{}.alias", join_path), errors);

            if join.alias == query.object || declared.contains(&join.alias.as_str()) {
                errors.push(ValidationError::new(
                    format!("{}.alias", join_path),
                    ValidationErrorKind::DuplicateJoinAlias {
                        alias: join.alias.clone(),
                    },
                ));
            }

            for (side, operand) in [("left", &join.on.left), ("right", &join.on.right)] {
                let operand_path = format!("{}.on.{}", join_path, side);
                check_identifier(&operand.name, &operand_path, errors);
                let Some(qualifier) = operand.qualifier.as_deref() else {
                    continue;
                };
                if qualifier == query.object
                    || qualifier == join.alias
                    || declared.contains(&qualifier)
                {
                    continue;
                }
                let kind = if query.joins[i + 1..].iter().any(|j| j.alias == qualifier) {
                    ValidationErrorKind::ForwardJoinReference {
                        alias: qualifier.to_string(),
                    }
                } else {
                    ValidationErrorKind::UnknownJoinReference {
                        alias: qualifier.to_string(),
                    }
                };
                errors.push(ValidationError::new(operand_path, kind));
            }

            if let Some(subquery) = &join.subquery {
                self.validate_query(
                    subquery,
                    &format!("{}.subquery", join_path),
                    depth + 1,
                    errors,
                );
            }

            declared.push(&join.alias);
        }
    }

    // ========================================================================
    // Aggregations & windows
    // ========================================================================

    fn validate_aggregations(
        &self,
        query: &Query,
        prefix: &str,
        scope: &Scope,
        output_aliases: &mut HashSet<String>,
        errors: &mut Vec<ValidationError>,
    ) {
        for (i, agg) in query.aggregations.iter().enumerate() {
            let path = at(prefix, &format!("aggregations[{}]", i));

            match &agg.field {
                Some(field) => scope.check_field(field, &format!("{}.field", path), errors),
                None if agg.function.requires_field() => errors.push(ValidationError::new(
                    format!("{}.field", path),
                    ValidationErrorKind::MissingAggregationField {
                        function: agg.function.to_string(),
                    },
                )),
                None => {}
            }

            check_alias(&agg.alias, &format!("{}.alias", path), output_aliases, errors);
        }

        for (i, field) in query.group_by.iter().enumerate() {
            scope.check_field(field, &at(prefix, &format!("groupBy[{}]", i)), errors);
        }

        if query.aggregations.is_empty() {
            return;
        }

        let grouped: HashSet<FieldRef> = query
            .group_by
            .iter()
            .map(|f| scope.normalize(f))
            .collect();

        for (i, field) in query.fields.iter().enumerate() {
            let is_alias = field.qualifier.is_none()
                && query.aggregations.iter().any(|a| a.alias == field.name);
            if !is_alias && !grouped.contains(&scope.normalize(field)) {
                errors.push(ValidationError::new(
                    at(prefix, &format!("fields[{}]", i)),
                    ValidationErrorKind::UngroupedField {
                        field: field.path(),
                    },
                ));
            }
        }
    }

    fn validate_windows(
        &self,
        query: &Query,
        prefix: &str,
        scope: &Scope,
        output_aliases: &mut HashSet<String>,
        errors: &mut Vec<ValidationError>,
    ) {
        for (i, window) in query.window_functions.iter().enumerate() {
            let path = at(prefix, &format!("windowFunctions[{}]", i));
            let function = window.function;

            match &window.field {
                Some(_) if function.is_rank_family() => errors.push(ValidationError::new(
                    format!("{}.field", path),
                    ValidationErrorKind::WindowFieldForbidden {
                        function: function.to_string(),
                    },
                )),
                Some(field) => scope.check_field(field, &format!("{}.field", path), errors),
                None if function.requires_field() => errors.push(ValidationError::new(
                    format!("{}.field", path),
                    ValidationErrorKind::WindowFieldRequired {
                        function: function.to_string(),
                    },
                )),
                None => {}
            }

            if window.offset.is_some() && !function.accepts_offset() {
                errors.push(ValidationError::new(
                    format!("{}.offset", path),
                    ValidationErrorKind::InvalidWindowOffset {
                        function: function.to_string(),
                    },
                ));
            }

            check_alias(&window.alias, &format!("{}.alias", path), output_aliases, errors);

            for (j, field) in window.over.partition_by.iter().enumerate() {
                scope.check_field(field, &format!("{}.over.partitionBy[{}]", path, j), errors);
            }
            for (j, spec) in window.over.order_by.iter().enumerate() {
                scope.check_field(&spec.field, &format!("{}.over.orderBy[{}]", path, j), errors);
            }

            if let Some(frame) = &window.over.frame {
                let frame_path = format!("{}.over.frame", path);
                if window.over.order_by.is_empty() {
                    errors.push(ValidationError::new(
                        frame_path.clone(),
                        ValidationErrorKind::FrameRequiresOrdering,
                    ));
                }
                if !frame.is_ordered() {
                    errors.push(ValidationError::new(
                        frame_path,
                        ValidationErrorKind::InvalidFrameBounds {
                            start: describe_bound(&frame.start),
                            end: describe_bound(&frame.end),
                        },
                    ));
                }
            }
        }
    }

    // ========================================================================
    // Filters
    // ========================================================================

    fn validate_filter(
        &self,
        expr: &FilterExpr,
        path: &str,
        depth: usize,
        scope: &Scope,
        errors: &mut Vec<ValidationError>,
    ) {
        if depth > self.options.max_filter_depth {
            errors.push(ValidationError::new(
                path,
                ValidationErrorKind::MaxDepthExceeded {
                    limit: self.options.max_filter_depth,
                },
            ));
            return;
        }

        match expr {
            FilterExpr::And(children) | FilterExpr::Or(children) => {
                let name = expr.node_name();
                if children.is_empty() {
                    errors.push(ValidationError::new(
                        path,
                        ValidationErrorKind::EmptyCombinator {
                            combinator: name.to_string(),
                        },
                    ));
                }
                for (i, child) in children.iter().enumerate() {
                    let child_path = format!("{}.{}[{}]", path, name, i);
                    self.validate_filter(child, &child_path, depth + 1, scope, errors);
                }
            }
            FilterExpr::Not(child) => {
                let child_path = format!("{}.not", path);
                self.validate_filter(child, &child_path, depth + 1, scope, errors);
            }
            FilterExpr::Condition(condition) => {
                self.validate_condition(condition, path, scope, errors);
            }
        }
    }

    fn validate_condition(
        &self,
        condition: &Condition,
        path: &str,
        scope: &Scope,
        errors: &mut Vec<ValidationError>,
    ) {
        scope.check_field(&condition.field, &format!("{}.field", path), errors);

        if let FilterValue::Reference(field) = &condition.value {
            scope.check_field(field, &format!("{}.value", path), errors);
        }

        let mapping = match self.registry.resolve(&condition.operator) {
            Ok(mapping) => mapping,
            Err(_) => {
                errors.push(ValidationError::new(
                    format!("{}.operator", path),
                    ValidationErrorKind::UnknownOperator {
                        operator: condition.operator.clone(),
                    },
                ));
                return;
            }
        };

        if let Some(expected) = arity_mismatch(mapping.arity, &condition.value) {
            errors.push(ValidationError::new(
                format!("{}.value", path),
                ValidationErrorKind::InvalidOperand {
                    operator: condition.operator.clone(),
                    expected: expected.to_string(),
                    found: describe_value(&condition.value),
                },
            ));
            return;
        }

        if condition.operator == "regex" {
            if let FilterValue::String(pattern) = &condition.value {
                if let Err(e) = Regex::new(pattern) {
                    errors.push(ValidationError::new(
                        format!("{}.value", path),
                        ValidationErrorKind::InvalidRegex {
                            pattern: pattern.clone(),
                            message: e.to_string(),
                        },
                    ));
                }
            }
        }
    }
}

// ============================================================================
// Field scopes
// ============================================================================

/// Names a field reference may resolve against.
struct Scope {
    root: String,
    qualifiers: HashSet<String>,
    /// Set for `having`: leaf fields must be one of these.
    aggregate_outputs: Option<(HashSet<String>, HashSet<FieldRef>)>,
}

impl Scope {
    fn rows(query: &Query) -> Self {
        let mut qualifiers: HashSet<String> = HashSet::new();
        qualifiers.insert(query.object.clone());
        qualifiers.extend(query.joins.iter().map(|j| j.alias.clone()));
        Self {
            root: query.object.clone(),
            qualifiers,
            aggregate_outputs: None,
        }
    }

    fn aggregate(query: &Query) -> Self {
        let mut scope = Self::rows(query);
        let aliases = query.aggregations.iter().map(|a| a.alias.clone()).collect();
        let grouped = query.group_by.iter().map(|f| scope.normalize(f)).collect();
        scope.aggregate_outputs = Some((aliases, grouped));
        scope
    }

    /// Strip projection aliases and a redundant root qualifier.
    fn normalize(&self, field: &FieldRef) -> FieldRef {
        let mut normalized = field.unaliased();
        if normalized.qualifier.as_deref() == Some(self.root.as_str()) {
            normalized.qualifier = None;
        }
        normalized
    }

    fn check_field(&self, field: &FieldRef, path: &str, errors: &mut Vec<ValidationError>) {
        check_identifier(&field.name, path, errors);
        if let Some(alias) = &field.alias {
            check_identifier(alias, path, errors);
        }

        if let Some(qualifier) = &field.qualifier {
            if !self.qualifiers.contains(qualifier) {
                errors.push(ValidationError::new(
                    path,
                    ValidationErrorKind::UnknownSourceReference {
                        qualifier: qualifier.clone(),
                    },
                ));
                return;
            }
        }

        if let Some((aliases, grouped)) = &self.aggregate_outputs {
            let is_alias = field.qualifier.is_none() && aliases.contains(&field.name);
            if !is_alias && !grouped.contains(&self.normalize(field)) {
                errors.push(ValidationError::new(
                    path,
                    ValidationErrorKind::InvalidHavingReference {
                        field: field.path(),
                    },
                ));
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn at(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", prefix, segment)
    }
}

fn check_identifier(name: &str, path: &str, errors: &mut Vec<ValidationError>) {
    if !IDENTIFIER.is_match(name) {
        errors.push(ValidationError::new(
            path,
            ValidationErrorKind::InvalidIdentifier {
                name: name.to_string(),
            },
        ));
    }
}

fn check_alias(
    alias: &str,
    path: &str,
    seen: &mut HashSet<String>,
    errors: &mut Vec<ValidationError>,
) {
    check_identifier(alias, path, errors);
    if !seen.insert(alias.to_string()) {
        errors.push(ValidationError::new(
            path,
            ValidationErrorKind::DuplicateAlias {
                alias: alias.to_string(),
            },
        ));
    }
}

/// Returns the expected shape when `value` does not fit `arity`.
fn arity_mismatch(arity: Arity, value: &FilterValue) -> Option<&'static str> {
    let is_plain_scalar =
        |v: &FilterValue| !matches!(v, FilterValue::List(_) | FilterValue::Reference(_));

    match arity {
        Arity::Scalar if value.is_scalar() => None,
        Arity::Scalar => Some("a single value"),
        Arity::List => match value {
            FilterValue::List(items) if !items.is_empty() && items.iter().all(is_plain_scalar) => {
                None
            }
            _ => Some("a non-empty list of values"),
        },
        Arity::Range => match value {
            FilterValue::List(items)
                if items.len() == 2
                    && items
                        .iter()
                        .all(|v| is_plain_scalar(v) && *v != FilterValue::Null) =>
            {
                None
            }
            _ => Some("a [low, high] pair"),
        },
        Arity::Flag => match value {
            FilterValue::Bool(_) => None,
            _ => Some("a boolean"),
        },
    }
}

fn describe_value(value: &FilterValue) -> String {
    match value {
        FilterValue::List(items) => format!("a list of {}", items.len()),
        other => other.kind().to_string(),
    }
}

fn describe_bound(bound: &FrameBound) -> String {
    match bound {
        FrameBound::UnboundedPreceding => "unbounded_preceding".to_string(),
        FrameBound::Preceding(n) => format!("{} preceding", n),
        FrameBound::CurrentRow => "current_row".to_string(),
        FrameBound::Following(n) => format!("{} following", n),
        FrameBound::UnboundedFollowing => "unbounded_following".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{FilterExpr, JoinSpec, JoinType, Query};

    fn kinds(result: Result<(), Vec<ValidationError>>) -> Vec<ValidationErrorKind> {
        result.unwrap_err().into_iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_simple_query_is_valid() {
        let query = Query::new("product")
            .select(["name", "price"])
            .filter(FilterExpr::condition("price", "gt", 10));
        assert!(validate(&query).is_ok());
    }

    #[test]
    fn test_empty_combinator() {
        let query = Query::new("product").filter(FilterExpr::And(vec![]));
        assert_eq!(
            kinds(validate(&query)),
            vec![ValidationErrorKind::EmptyCombinator {
                combinator: "and".to_string()
            }]
        );
    }

    #[test]
    fn test_operand_arity() {
        let query = Query::new("product").filter(FilterExpr::and([
            FilterExpr::condition("id", "in", "a"),
            FilterExpr::condition("price", "between", vec![1i64]),
            FilterExpr::condition("tag", "exists", "yes"),
        ]));
        let errors = validate(&query).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[0].path, "filters.and[0].value");
        assert_eq!(errors[1].path, "filters.and[1].value");
        assert_eq!(errors[2].path, "filters.and[2].value");
    }

    #[test]
    fn test_invalid_regex() {
        let query = Query::new("product").filter(FilterExpr::condition("sku", "regex", "(abc"));
        assert!(matches!(
            kinds(validate(&query)).as_slice(),
            [ValidationErrorKind::InvalidRegex { .. }]
        ));
    }

    #[test]
    fn test_own_alias_in_join_condition() {
        let query = Query::new("order").join(JoinSpec::new(
            JoinType::Inner,
            "customer",
            "c",
            "order.customer_id",
            "c.id",
        ));
        assert!(validate(&query).is_ok());
    }

    #[test]
    fn test_filter_depth_bound() {
        let mut expr = FilterExpr::condition("a", "eq", 1);
        for _ in 0..5 {
            expr = FilterExpr::not(expr);
        }
        let query = Query::new("t").filter(expr);
        let validator = Validator::new(OperatorRegistry::global()).with_options(ValidationOptions {
            max_subquery_depth: 5,
            max_filter_depth: 3,
        });
        assert!(matches!(
            kinds(validator.validate(&query)).as_slice(),
            [ValidationErrorKind::MaxDepthExceeded { limit: 3 }]
        ));
    }
}
