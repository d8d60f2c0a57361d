//! Filter expressions and values.
//!
//! Filters deserialize from two JSON shapes. The object form is explicit:
//!
//! ```text
//! {"and": [{"field": "status", "operator": "eq", "value": "open"},
//!          {"not": {"field": "amount", "operator": "lt", "value": 10}}]}
//! ```
//!
//! The array form is the compact infix notation, where `and` binds tighter
//! than `or` and symbolic operators map to canonical names:
//!
//! ```text
//! [["status", "=", "open"], "and", "not", ["amount", "<", 10]]
//! ```
//!
//! Both forms produce the same [`FilterExpr`]. Serialization always emits the
//! object form.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;

use super::field::FieldRef;
use super::QueryParseError;

// ============================================================================
// Values
// ============================================================================

/// Right-hand operand of a condition.
///
/// A closed set so every encoder can match it exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum FilterValue {
    String(String),
    Number(Number),
    Bool(bool),
    Null,
    List(Vec<FilterValue>),
    /// Another field, written `{"$ref": "alias.field"}`.
    Reference(FieldRef),
}

impl FilterValue {
    pub fn is_scalar(&self) -> bool {
        !matches!(self, FilterValue::List(_))
    }

    pub fn as_list(&self) -> Option<&[FilterValue]> {
        match self {
            FilterValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FilterValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Name of the variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            FilterValue::String(_) => "string",
            FilterValue::Number(_) => "number",
            FilterValue::Bool(_) => "boolean",
            FilterValue::Null => "null",
            FilterValue::List(_) => "list",
            FilterValue::Reference(_) => "field reference",
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::String(s) => write!(f, "{}", s),
            FilterValue::Number(n) => write!(f, "{}", n),
            FilterValue::Bool(b) => write!(f, "{}", b),
            FilterValue::Null => write!(f, "null"),
            FilterValue::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            FilterValue::Reference(field) => write!(f, "$ref({})", field.path()),
        }
    }
}

impl TryFrom<Value> for FilterValue {
    type Error = QueryParseError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) => Ok(FilterValue::String(s)),
            Value::Number(n) => Ok(FilterValue::Number(n)),
            Value::Bool(b) => Ok(FilterValue::Bool(b)),
            Value::Null => Ok(FilterValue::Null),
            Value::Array(items) => items
                .into_iter()
                .map(FilterValue::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(FilterValue::List),
            Value::Object(map) => match map.get("$ref") {
                Some(Value::String(path)) if map.len() == 1 => {
                    Ok(FilterValue::Reference(FieldRef::parse(path)))
                }
                _ => Err(QueryParseError::InvalidValue(
                    "objects are only allowed as {\"$ref\": \"field\"}".to_string(),
                )),
            },
        }
    }
}

impl From<FilterValue> for Value {
    fn from(value: FilterValue) -> Self {
        match value {
            FilterValue::String(s) => Value::String(s),
            FilterValue::Number(n) => Value::Number(n),
            FilterValue::Bool(b) => Value::Bool(b),
            FilterValue::Null => Value::Null,
            FilterValue::List(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            FilterValue::Reference(field) => {
                let mut map = Map::new();
                map.insert("$ref".to_string(), Value::String(field.path()));
                Value::Object(map)
            }
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::String(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        FilterValue::String(s)
    }
}

impl From<i32> for FilterValue {
    fn from(n: i32) -> Self {
        FilterValue::Number(n.into())
    }
}

impl From<i64> for FilterValue {
    fn from(n: i64) -> Self {
        FilterValue::Number(n.into())
    }
}

impl From<f64> for FilterValue {
    fn from(n: f64) -> Self {
        Number::from_f64(n)
            .map(FilterValue::Number)
            .unwrap_or(FilterValue::Null)
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        FilterValue::Bool(b)
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(items: Vec<T>) -> Self {
        FilterValue::List(items.into_iter().map(Into::into).collect())
    }
}

// ============================================================================
// Expressions
// ============================================================================

/// A single `field operator value` comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: FieldRef,
    /// Canonical operator name, resolved against the operator registry.
    pub operator: String,
    pub value: FilterValue,
}

/// Boolean filter tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum FilterExpr {
    Condition(Condition),
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
    Not(Box<FilterExpr>),
}

impl FilterExpr {
    pub fn condition(
        field: impl Into<FieldRef>,
        operator: &str,
        value: impl Into<FilterValue>,
    ) -> Self {
        FilterExpr::Condition(Condition {
            field: field.into(),
            operator: canonical_operator(operator),
            value: value.into(),
        })
    }

    pub fn and(children: impl IntoIterator<Item = FilterExpr>) -> Self {
        FilterExpr::And(children.into_iter().collect())
    }

    pub fn or(children: impl IntoIterator<Item = FilterExpr>) -> Self {
        FilterExpr::Or(children.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(child: FilterExpr) -> Self {
        FilterExpr::Not(Box::new(child))
    }

    /// Nesting depth; a bare condition has depth 1.
    pub fn depth(&self) -> usize {
        match self {
            FilterExpr::Condition(_) => 1,
            FilterExpr::And(children) | FilterExpr::Or(children) => {
                1 + children.iter().map(|c| c.depth()).max().unwrap_or(0)
            }
            FilterExpr::Not(child) => 1 + child.depth(),
        }
    }

    /// All leaf conditions, left to right.
    pub fn conditions(&self) -> Vec<&Condition> {
        let mut out = Vec::new();
        self.collect_conditions(&mut out);
        out
    }

    fn collect_conditions<'a>(&'a self, out: &mut Vec<&'a Condition>) {
        match self {
            FilterExpr::Condition(c) => out.push(c),
            FilterExpr::And(children) | FilterExpr::Or(children) => {
                for child in children {
                    child.collect_conditions(out);
                }
            }
            FilterExpr::Not(child) => child.collect_conditions(out),
        }
    }

    /// Name used in node paths and error messages.
    pub fn node_name(&self) -> &'static str {
        match self {
            FilterExpr::Condition(_) => "condition",
            FilterExpr::And(_) => "and",
            FilterExpr::Or(_) => "or",
            FilterExpr::Not(_) => "not",
        }
    }

    /// Parse either the object or array form.
    pub fn from_value(value: Value) -> Result<Self, QueryParseError> {
        parse_expr(value, "")
    }
}

impl From<Condition> for FilterExpr {
    fn from(c: Condition) -> Self {
        FilterExpr::Condition(c)
    }
}

impl TryFrom<Value> for FilterExpr {
    type Error = QueryParseError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        FilterExpr::from_value(value)
    }
}

impl From<FilterExpr> for Value {
    fn from(expr: FilterExpr) -> Self {
        let mut map = Map::new();
        match expr {
            FilterExpr::Condition(c) => {
                map.insert("field".to_string(), Value::String(c.field.path()));
                map.insert("operator".to_string(), Value::String(c.operator));
                map.insert("value".to_string(), c.value.into());
            }
            FilterExpr::And(children) => {
                map.insert(
                    "and".to_string(),
                    Value::Array(children.into_iter().map(Value::from).collect()),
                );
            }
            FilterExpr::Or(children) => {
                map.insert(
                    "or".to_string(),
                    Value::Array(children.into_iter().map(Value::from).collect()),
                );
            }
            FilterExpr::Not(child) => {
                map.insert("not".to_string(), Value::from(*child));
            }
        }
        Value::Object(map)
    }
}

/// Map operator spellings onto canonical registry names.
pub fn canonical_operator(op: &str) -> String {
    let trimmed = op.trim();
    match trimmed {
        "=" | "==" => "eq".to_string(),
        "!=" | "<>" => "ne".to_string(),
        ">" => "gt".to_string(),
        ">=" => "gte".to_string(),
        "<" => "lt".to_string(),
        "<=" => "lte".to_string(),
        _ => match trimmed.to_ascii_lowercase().as_str() {
            "startswith" => "starts_with".to_string(),
            "endswith" => "ends_with".to_string(),
            "not in" | "notin" => "nin".to_string(),
            other => other.to_string(),
        },
    }
}

// ============================================================================
// Parsing
// ============================================================================

fn invalid(path: &str, message: impl Into<String>) -> QueryParseError {
    QueryParseError::InvalidFilter {
        path: if path.is_empty() {
            "<root>".to_string()
        } else {
            path.to_string()
        },
        message: message.into(),
    }
}

fn child_path(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else if segment.starts_with('[') {
        format!("{}{}", path, segment)
    } else {
        format!("{}.{}", path, segment)
    }
}

fn parse_expr(value: Value, path: &str) -> Result<FilterExpr, QueryParseError> {
    match value {
        Value::Object(map) => parse_object(map, path),
        Value::Array(items) => {
            if is_array_condition(&items) {
                parse_array_condition(items, path)
            } else {
                parse_group(items, path)
            }
        }
        other => Err(invalid(
            path,
            format!("expected an object or array, found {}", other),
        )),
    }
}

fn parse_object(mut map: Map<String, Value>, path: &str) -> Result<FilterExpr, QueryParseError> {
    for key in ["and", "or"] {
        if let Some(children) = map.remove(key) {
            let Value::Array(children) = children else {
                return Err(invalid(path, format!("'{}' expects an array", key)));
            };
            let parsed = children
                .into_iter()
                .enumerate()
                .map(|(i, child)| parse_expr(child, &child_path(path, &format!("{}[{}]", key, i))))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(if key == "and" {
                FilterExpr::And(parsed)
            } else {
                FilterExpr::Or(parsed)
            });
        }
    }

    if let Some(child) = map.remove("not") {
        let parsed = parse_expr(child, &child_path(path, "not"))?;
        return Ok(FilterExpr::not(parsed));
    }

    let field = match map.remove("field") {
        Some(Value::String(f)) => FieldRef::parse(&f),
        Some(other) => serde_json::from_value::<FieldRef>(other)?,
        None => return Err(invalid(path, "condition is missing 'field'")),
    };
    let operator = match map.remove("operator").or_else(|| map.remove("op")) {
        Some(Value::String(op)) => canonical_operator(&op),
        _ => return Err(invalid(path, "condition is missing 'operator'")),
    };
    let value = FilterValue::try_from(map.remove("value").unwrap_or(Value::Null))?;

    Ok(FilterExpr::Condition(Condition {
        field,
        operator,
        value,
    }))
}

fn combinator(value: &Value) -> Option<&'static str> {
    match value.as_str().map(|s| s.to_ascii_lowercase()) {
        Some(s) if s == "and" => Some("and"),
        Some(s) if s == "or" => Some("or"),
        Some(s) if s == "not" => Some("not"),
        _ => None,
    }
}

fn is_array_condition(items: &[Value]) -> bool {
    items.len() == 3
        && items[0].is_string()
        && items[1].is_string()
        && combinator(&items[0]).is_none()
        && combinator(&items[1]).is_none()
}

fn parse_array_condition(items: Vec<Value>, path: &str) -> Result<FilterExpr, QueryParseError> {
    let mut iter = items.into_iter();
    let (Some(Value::String(field)), Some(Value::String(op)), Some(value)) =
        (iter.next(), iter.next(), iter.next())
    else {
        return Err(invalid(path, "condition must be [field, operator, value]"));
    };

    Ok(FilterExpr::Condition(Condition {
        field: FieldRef::parse(&field),
        operator: canonical_operator(&op),
        value: FilterValue::try_from(value)?,
    }))
}

/// Parse `[expr, "and", expr, "or", "not", expr]` with `and` over `or`.
fn parse_group(items: Vec<Value>, path: &str) -> Result<FilterExpr, QueryParseError> {
    let mut or_terms: Vec<Vec<FilterExpr>> = vec![Vec::new()];
    let mut negate_next = false;
    let mut expect_operand = true;
    let mut last_was_combinator = false;

    for (i, item) in items.into_iter().enumerate() {
        match combinator(&item) {
            Some("not") => {
                if !expect_operand {
                    return Err(invalid(path, format!("'not' at [{}] must follow a combinator", i)));
                }
                negate_next = !negate_next;
                expect_operand = true;
                last_was_combinator = true;
            }
            Some(op) => {
                if expect_operand {
                    return Err(invalid(path, format!("'{}' at [{}] has no left operand", op, i)));
                }
                if op == "or" {
                    or_terms.push(Vec::new());
                }
                expect_operand = true;
                last_was_combinator = true;
            }
            None => {
                if !expect_operand {
                    return Err(invalid(
                        path,
                        format!("operand at [{}] is not joined by 'and' or 'or'", i),
                    ));
                }
                let mut expr = parse_expr(item, &child_path(path, &format!("[{}]", i)))?;
                if negate_next {
                    expr = FilterExpr::not(expr);
                    negate_next = false;
                }
                if let Some(term) = or_terms.last_mut() {
                    term.push(expr);
                }
                expect_operand = false;
                last_was_combinator = false;
            }
        }
    }

    if last_was_combinator {
        return Err(invalid(path, "filter ends with a dangling combinator"));
    }

    let mut terms: Vec<FilterExpr> = or_terms
        .into_iter()
        .map(|mut term| {
            if term.len() == 1 {
                term.remove(0)
            } else {
                FilterExpr::And(term)
            }
        })
        .collect();

    Ok(if terms.len() == 1 {
        terms.remove(0)
    } else {
        FilterExpr::Or(terms)
    })
}
