//! Filter canonicalization.
//!
//! Rewrites a filter tree into a stable shape:
//!
//! - same-combinator nesting is flattened: `and[and[a,b],c]` → `and[a,b,c]`
//! - single-operand `and`/`or` collapse to the operand
//! - double negation is removed
//! - field qualifiers naming the root object are dropped
//!
//! Operand order is preserved.

use crate::ast::{Condition, FieldRef, FilterExpr, FilterValue};

/// Canonicalize `expr`, treating `root` as the implicit qualifier.
pub fn canonicalize(expr: &FilterExpr, root: &str) -> FilterExpr {
    match expr {
        FilterExpr::Condition(c) => FilterExpr::Condition(Condition {
            field: normalize_field(&c.field, root),
            operator: c.operator.clone(),
            value: normalize_value(&c.value, root),
        }),
        FilterExpr::And(children) => collapse(flatten(children, root, true), FilterExpr::And),
        FilterExpr::Or(children) => collapse(flatten(children, root, false), FilterExpr::Or),
        FilterExpr::Not(child) => match canonicalize(child, root) {
            FilterExpr::Not(inner) => *inner,
            other => FilterExpr::Not(Box::new(other)),
        },
    }
}

/// Drop a qualifier that names the root object.
pub fn normalize_field(field: &FieldRef, root: &str) -> FieldRef {
    let mut normalized = field.clone();
    if normalized.qualifier.as_deref() == Some(root) {
        normalized.qualifier = None;
    }
    normalized
}

fn normalize_value(value: &FilterValue, root: &str) -> FilterValue {
    match value {
        FilterValue::Reference(field) => FilterValue::Reference(normalize_field(field, root)),
        other => other.clone(),
    }
}

/// Canonicalize children, splicing in operands of same-combinator children.
fn flatten(children: &[FilterExpr], root: &str, is_and: bool) -> Vec<FilterExpr> {
    let mut out = Vec::with_capacity(children.len());
    for child in children {
        match (canonicalize(child, root), is_and) {
            (FilterExpr::And(inner), true) | (FilterExpr::Or(inner), false) => out.extend(inner),
            (other, _) => out.push(other),
        }
    }
    out
}

fn collapse(mut children: Vec<FilterExpr>, wrap: fn(Vec<FilterExpr>) -> FilterExpr) -> FilterExpr {
    if children.len() == 1 {
        children.remove(0)
    } else {
        wrap(children)
    }
}
