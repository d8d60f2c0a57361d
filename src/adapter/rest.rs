//! REST query-string adapter.
//!
//! Filter styles:
//!
//! | Style | `price >= 10` | `status in (a,b)` | Boolean nesting |
//! |-------|---------------|-------------------|-----------------|
//! | bracket | `filter[price][gte]=10` | `filter[status][in]=a,b` | conjunction only |
//! | dot | `price=gte.10` | `status=in.(a,b)` | conjunction only |
//! | flat | `price__gte=10` | `status__in=a,b` | conjunction only |
//! | rsql | `filter=price=ge=10` | `filter=status=in=(a,b)` | `;` and, `,` or |
//!
//! In the dot and flat styles, having conditions are keyed under the having
//! parameter (`having.n=gt.5`, `having.n__gt=5`) so they cannot collide with
//! row filters.
//!
//! Outside RSQL, a string that would read back as another kind (`"42"`,
//! `"true"`, `"null"`) is sent as a JSON string literal, as is a list item
//! containing the `,` separator. Everything else goes out bare.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    check_join_type, child_path, conjuncts, join_path, operator_template, AdapterConfig,
    AdapterError, AdapterResult, ProtocolAdapter, ProtocolQuery, Target,
};
use crate::ast::{
    AggregateFunction, Aggregation, Condition, FieldRef, FilterExpr, FilterValue, SortSpec,
};
use crate::planner::logical::{LogicalPlan, PaginateStage};
use crate::registry::{Arity, OperatorRegistry};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestFilterStyle {
    #[default]
    Bracket,
    Dot,
    Flat,
    Rsql,
}

impl RestFilterStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestFilterStyle::Bracket => "bracket",
            RestFilterStyle::Dot => "dot",
            RestFilterStyle::Flat => "flat",
            RestFilterStyle::Rsql => "rsql",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestSortStyle {
    /// `sort=-a,b`
    #[default]
    Comma,
    /// `sort=-a|b`
    Pipe,
    /// `sort[]=a:desc&sort[]=b:asc`
    Array,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestConfig {
    pub filter_style: RestFilterStyle,
    pub sort_style: RestSortStyle,

    /// Parameter holding bracket/rsql filters.
    pub filter_param: String,
    pub having_param: String,
    pub fields_param: String,
    pub include_param: String,
    pub sort_param: String,

    pub limit_param: String,
    pub offset_param: String,
    pub cursor_param: String,
    /// Send the cursor as this header instead of a query parameter.
    pub cursor_header: Option<String>,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            filter_style: RestFilterStyle::default(),
            sort_style: RestSortStyle::default(),
            filter_param: "filter".to_string(),
            having_param: "having".to_string(),
            fields_param: "fields".to_string(),
            include_param: "include".to_string(),
            sort_param: "sort".to_string(),
            limit_param: "limit".to_string(),
            offset_param: "offset".to_string(),
            cursor_param: "cursor".to_string(),
            cursor_header: None,
        }
    }
}

impl RestConfig {
    /// Parameters that never carry dot/flat filter conditions.
    fn is_reserved(&self, name: &str) -> bool {
        [
            &self.filter_param,
            &self.fields_param,
            &self.include_param,
            &self.sort_param,
            &self.limit_param,
            &self.offset_param,
            &self.cursor_param,
        ]
        .iter()
        .any(|p| p.as_str() == name)
            || name == AGGREGATE_PARAM
            || name == GROUP_BY_PARAM
            || name == self.having_param
            || name.starts_with(&format!("{}.", self.having_param))
            || name.starts_with(&format!("{}[", self.sort_param))
    }
}

const AGGREGATE_PARAM: &str = "aggregate";
const GROUP_BY_PARAM: &str = "group_by";

// ============================================================================
// Output
// ============================================================================

/// Encoded REST request parts, in emission order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestQuery {
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl RestQuery {
    /// First value of a parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Percent-encoded `name=value&...` string.
    pub fn query_string(&self) -> String {
        self.params
            .iter()
            .map(|(name, value)| {
                format!(
                    "{}={}",
                    urlencoding::encode(name),
                    urlencoding::encode(value)
                )
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.params.push((name.into(), value.into()));
    }
}

// ============================================================================
// Adapter
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct RestAdapter;

impl ProtocolAdapter for RestAdapter {
    fn name(&self) -> &'static str {
        "REST"
    }

    fn target(&self) -> Target {
        Target::Rest
    }

    fn encode(
        &self,
        plan: &LogicalPlan,
        config: &AdapterConfig,
        registry: &OperatorRegistry,
    ) -> AdapterResult<ProtocolQuery> {
        RestEncoder {
            config: &config.rest,
            registry,
        }
        .encode(plan)
        .map(ProtocolQuery::Rest)
    }
}

struct RestEncoder<'a> {
    config: &'a RestConfig,
    registry: &'a OperatorRegistry,
}

impl<'a> RestEncoder<'a> {
    fn encode(&self, plan: &LogicalPlan) -> AdapterResult<RestQuery> {
        let mut out = RestQuery::default();

        if !plan.windows().is_empty() {
            return Err(unsupported_feature("window functions", "windowFunctions"));
        }

        if !plan.projection.is_empty() {
            let mut names = Vec::with_capacity(plan.projection.len());
            for (i, field) in plan.projection.iter().enumerate() {
                if field.alias.is_some() {
                    return Err(unsupported_feature("field aliases", &format!("fields[{}]", i)));
                }
                names.push(field.path());
            }
            out.push(&self.config.fields_param, names.join(","));
        }

        let mut includes = Vec::new();
        for join in plan.joins() {
            check_join_type(&RestAdapter, join)?;
            let source = &plan.sources[join.target.0];
            if source.is_derived() {
                return Err(unsupported_feature(
                    "subquery joins",
                    &format!("{}.subquery", join_path(join)),
                ));
            }
            includes.push(source.alias.clone());
        }
        if !includes.is_empty() {
            out.push(&self.config.include_param, includes.join(","));
        }

        if let Some(filter) = plan.filter() {
            self.encode_filter(filter, FilterTarget::Rows, "filters", &mut out)?;
        }

        if let Some(aggregate) = plan.aggregate() {
            if !aggregate.aggregates.is_empty() {
                let parts: Vec<String> = aggregate.aggregates.iter().map(aggregate_term).collect();
                out.push(AGGREGATE_PARAM, parts.join(","));
            }
            if !aggregate.group_by.is_empty() {
                let names: Vec<String> = aggregate.group_by.iter().map(FieldRef::path).collect();
                out.push(GROUP_BY_PARAM, names.join(","));
            }
        }

        if let Some(having) = plan.having() {
            self.encode_filter(having, FilterTarget::Having, "having", &mut out)?;
        }

        self.encode_sort(plan.sort(), &mut out);

        match plan.pagination() {
            Some(PaginateStage::Offset { top, skip }) => {
                if let Some(top) = top {
                    out.push(&self.config.limit_param, top.to_string());
                }
                if let Some(skip) = skip {
                    out.push(&self.config.offset_param, skip.to_string());
                }
            }
            Some(PaginateStage::Cursor { cursor }) => match &self.config.cursor_header {
                Some(header) => out.headers.push((header.clone(), cursor.clone())),
                None => out.push(&self.config.cursor_param, cursor.clone()),
            },
            None => {}
        }

        Ok(out)
    }

    fn encode_filter(
        &self,
        expr: &FilterExpr,
        target: FilterTarget,
        path: &str,
        out: &mut RestQuery,
    ) -> AdapterResult<()> {
        let style = self.config.filter_style;
        let param = match target {
            FilterTarget::Rows => &self.config.filter_param,
            FilterTarget::Having => &self.config.having_param,
        };

        if style == RestFilterStyle::Rsql {
            let rendered = self.rsql(expr, path)?;
            out.push(param.as_str(), rendered);
            return Ok(());
        }

        let mut leaves = Vec::new();
        conjuncts(expr, style.as_str(), path, &mut leaves)?;

        for (condition, path) in leaves {
            let (mapping, token) = operator_template(self.registry, condition, Target::Rest, &path)?;
            let field = condition.field.path();
            self.check_parameter_name(&field, target, &path)?;
            let value = scalar_or_list(&condition.value, mapping.arity, style, &path)?;

            let (name, value) = match style {
                RestFilterStyle::Bracket => (format!("{}[{}][{}]", param, field, token), value),
                RestFilterStyle::Dot => (keyed(target, param, &field), format!("{}.{}", token, value)),
                _ if condition.operator == "eq" => (keyed(target, param, &field), value),
                _ => (format!("{}__{}", keyed(target, param, &field), token), value),
            };
            out.push(name, value);
        }
        Ok(())
    }

    /// Dot and flat conditions are keyed by field name, which must not read
    /// back as a reserved parameter or as a flat operator suffix.
    fn check_parameter_name(&self, field: &str, target: FilterTarget, path: &str) -> AdapterResult<()> {
        let clashes = match self.config.filter_style {
            RestFilterStyle::Dot => target == FilterTarget::Rows && self.config.is_reserved(field),
            RestFilterStyle::Flat => {
                field.contains("__") || (target == FilterTarget::Rows && self.config.is_reserved(field))
            }
            RestFilterStyle::Bracket | RestFilterStyle::Rsql => false,
        };
        if clashes {
            return Err(AdapterError::AmbiguousEncoding {
                name: field.to_string(),
                target: Target::Rest,
                path: child_path(path, "field"),
            });
        }
        Ok(())
    }

    fn rsql(&self, expr: &FilterExpr, path: &str) -> AdapterResult<String> {
        match expr {
            FilterExpr::Condition(c) => {
                let (mapping, token) = operator_template(self.registry, c, Target::Rest, path)?;
                let value = scalar_or_list(&c.value, mapping.arity, RestFilterStyle::Rsql, path)?;
                Ok(format!("{}{}{}", c.field.path(), rsql_operator(token), value))
            }
            FilterExpr::And(children) => self.rsql_group(children, "and", ";", path),
            FilterExpr::Or(children) => self.rsql_group(children, "or", ",", path),
            FilterExpr::Not(child) => match negate(child) {
                Some(pushed) => self.rsql(&pushed, path),
                None => Err(AdapterError::UnsupportedLogicalCombinatorForStyle {
                    combinator: "not".to_string(),
                    style: RestFilterStyle::Rsql.as_str().to_string(),
                    path: path.to_string(),
                }),
            },
        }
    }

    fn rsql_group(
        &self,
        children: &[FilterExpr],
        name: &str,
        separator: &str,
        path: &str,
    ) -> AdapterResult<String> {
        let mut parts = Vec::with_capacity(children.len());
        for (i, child) in children.iter().enumerate() {
            let rendered = self.rsql(child, &child_path(path, &format!("{}[{}]", name, i)))?;
            if matches!(child, FilterExpr::Condition(_)) {
                parts.push(rendered);
            } else {
                parts.push(format!("({})", rendered));
            }
        }
        Ok(parts.join(separator))
    }

    fn encode_sort(&self, keys: &[SortSpec], out: &mut RestQuery) {
        if keys.is_empty() {
            return;
        }
        match self.config.sort_style {
            RestSortStyle::Comma | RestSortStyle::Pipe => {
                let separator = if self.config.sort_style == RestSortStyle::Comma {
                    ","
                } else {
                    "|"
                };
                let parts: Vec<String> = keys
                    .iter()
                    .map(|k| {
                        if k.is_descending() {
                            format!("-{}", k.field.path())
                        } else {
                            k.field.path()
                        }
                    })
                    .collect();
                out.push(&self.config.sort_param, parts.join(separator));
            }
            RestSortStyle::Array => {
                for key in keys {
                    let order = if key.is_descending() { "desc" } else { "asc" };
                    out.push(
                        format!("{}[]", self.config.sort_param),
                        format!("{}:{}", key.field.path(), order),
                    );
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterTarget {
    Rows,
    Having,
}

fn keyed(target: FilterTarget, having_param: &str, field: &str) -> String {
    match target {
        FilterTarget::Rows => field.to_string(),
        FilterTarget::Having => format!("{}.{}", having_param, field),
    }
}

fn unsupported_feature(feature: &str, path: &str) -> AdapterError {
    AdapterError::UnsupportedFeature {
        feature: feature.to_string(),
        target: Target::Rest,
        path: path.to_string(),
    }
}

/// Push a negation down to the leaves, inverting comparison operators.
///
/// Returns `None` when a leaf operator has no inverse.
fn negate(expr: &FilterExpr) -> Option<FilterExpr> {
    match expr {
        FilterExpr::Condition(c) => {
            let mut inverted = c.clone();
            match c.operator.as_str() {
                "exists" => {
                    let FilterValue::Bool(b) = c.value else {
                        return None;
                    };
                    inverted.value = FilterValue::Bool(!b);
                }
                op => inverted.operator = inverse_operator(op)?.to_string(),
            }
            Some(FilterExpr::Condition(inverted))
        }
        FilterExpr::And(children) => children.iter().map(negate).collect::<Option<Vec<_>>>().map(FilterExpr::Or),
        FilterExpr::Or(children) => children.iter().map(negate).collect::<Option<Vec<_>>>().map(FilterExpr::And),
        FilterExpr::Not(child) => Some((**child).clone()),
    }
}

fn inverse_operator(op: &str) -> Option<&'static str> {
    Some(match op {
        "eq" => "ne",
        "ne" => "eq",
        "gt" => "lte",
        "gte" => "lt",
        "lt" => "gte",
        "lte" => "gt",
        "in" => "nin",
        "nin" => "in",
        _ => return None,
    })
}

fn rsql_operator(token: &str) -> String {
    match token {
        "eq" => "==".to_string(),
        "ne" => "!=".to_string(),
        "gte" => "=ge=".to_string(),
        "lte" => "=le=".to_string(),
        "nin" => "=out=".to_string(),
        other => format!("={}=", other),
    }
}

fn aggregate_term(agg: &Aggregation) -> String {
    match (&agg.function, &agg.field) {
        (AggregateFunction::Count, None) => format!("{}:count", agg.alias),
        (function, Some(field)) => format!("{}:{}({})", agg.alias, function, field.path()),
        (function, None) => format!("{}:{}", agg.alias, function),
    }
}

fn scalar_or_list(
    value: &FilterValue,
    arity: Arity,
    style: RestFilterStyle,
    path: &str,
) -> AdapterResult<String> {
    match value {
        FilterValue::List(items) => {
            let parts = items
                .iter()
                .map(|item| scalar(item, style, true, path))
                .collect::<AdapterResult<Vec<_>>>()?;
            let joined = parts.join(",");
            let parenthesize = matches!(style, RestFilterStyle::Dot | RestFilterStyle::Rsql)
                && matches!(arity, Arity::List | Arity::Range);
            Ok(if parenthesize {
                format!("({})", joined)
            } else {
                joined
            })
        }
        other => scalar(other, style, false, path),
    }
}

fn scalar(
    value: &FilterValue,
    style: RestFilterStyle,
    in_list: bool,
    path: &str,
) -> AdapterResult<String> {
    match value {
        FilterValue::String(s) if style == RestFilterStyle::Rsql => Ok(rsql_string(s)),
        FilterValue::String(s) if needs_quoting(s, in_list) => {
            Ok(serde_json::Value::String(s.clone()).to_string())
        }
        FilterValue::String(s) => Ok(s.clone()),
        FilterValue::Number(n) => Ok(n.to_string()),
        FilterValue::Bool(b) => Ok(b.to_string()),
        FilterValue::Null => Ok("null".to_string()),
        FilterValue::List(_) | FilterValue::Reference(_) => {
            Err(AdapterError::UnsupportedValueForTarget {
                kind: value.kind().to_string(),
                target: Target::Rest,
                path: child_path(path, "value"),
            })
        }
    }
}

/// Whether a bare string would decode to something else.
fn needs_quoting(s: &str, in_list: bool) -> bool {
    s.starts_with('"')
        || !matches!(typed_value(s), FilterValue::String(_))
        || (in_list && (s.is_empty() || s.contains(',')))
}

/// Quote RSQL string arguments that contain reserved characters.
fn rsql_string(s: &str) -> String {
    const RESERVED: &[char] = &[' ', '"', '\'', '(', ')', ';', ',', '=', '!', '~', '<', '>'];
    if !s.is_empty() && !s.contains(RESERVED) {
        return s.to_string();
    }
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

// ============================================================================
// Decoding
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Decoding is not supported for the {0} filter style")]
    UnsupportedStyle(String),

    #[error("Malformed filter parameter: {0}")]
    MalformedParameter(String),

    #[error("Unknown REST operator token: {0}")]
    UnknownToken(String),

    #[error("Invalid percent-encoding in: {0}")]
    InvalidEncoding(String),
}

/// Decode bracket, dot or flat filter parameters back into a filter.
///
/// Multiple conditions decode to a conjunction. Returns `None` when the query
/// string carries no filter parameters. A JSON string literal decodes to that
/// string. Otherwise `true`, `false`, `null` and numerals decode to their JSON
/// kinds and anything else is a bare string.
pub fn decode_filter(
    query_string: &str,
    config: &RestConfig,
    registry: &OperatorRegistry,
) -> Result<Option<FilterExpr>, DecodeError> {
    let style = config.filter_style;
    if style == RestFilterStyle::Rsql {
        return Err(DecodeError::UnsupportedStyle(style.as_str().to_string()));
    }

    let mut conditions = Vec::new();
    for pair in query_string.trim_start_matches('?').split('&') {
        if pair.is_empty() {
            continue;
        }
        let (raw_name, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        let name = percent_decode(raw_name)?;
        let value = percent_decode(raw_value)?;

        let decoded = match style {
            RestFilterStyle::Bracket => decode_bracket(&name, &value, config, registry)?,
            RestFilterStyle::Dot => decode_dot(&name, &value, config, registry)?,
            RestFilterStyle::Flat => decode_flat(&name, &value, config, registry)?,
            RestFilterStyle::Rsql => None,
        };
        conditions.extend(decoded);
    }

    Ok(match conditions.len() {
        0 => None,
        1 => conditions.pop(),
        _ => Some(FilterExpr::And(conditions)),
    })
}

fn percent_decode(s: &str) -> Result<String, DecodeError> {
    let plus_as_space = s.replace('+', " ");
    urlencoding::decode(&plus_as_space)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| DecodeError::InvalidEncoding(s.to_string()))
}

fn decode_bracket(
    name: &str,
    value: &str,
    config: &RestConfig,
    registry: &OperatorRegistry,
) -> Result<Option<FilterExpr>, DecodeError> {
    let Some(rest) = name
        .strip_prefix(config.filter_param.as_str())
        .and_then(|r| r.strip_prefix('['))
    else {
        return Ok(None);
    };
    let inner = rest
        .strip_suffix(']')
        .ok_or_else(|| DecodeError::MalformedParameter(name.to_string()))?;
    let (field, token) = inner
        .split_once("][")
        .ok_or_else(|| DecodeError::MalformedParameter(name.to_string()))?;

    condition_from_token(field, token, value, false, registry).map(Some)
}

fn decode_dot(
    name: &str,
    value: &str,
    config: &RestConfig,
    registry: &OperatorRegistry,
) -> Result<Option<FilterExpr>, DecodeError> {
    if config.is_reserved(name) {
        return Ok(None);
    }
    let (token, operand) = value
        .split_once('.')
        .ok_or_else(|| DecodeError::MalformedParameter(format!("{}={}", name, value)))?;
    condition_from_token(name, token, operand, true, registry).map(Some)
}

fn decode_flat(
    name: &str,
    value: &str,
    config: &RestConfig,
    registry: &OperatorRegistry,
) -> Result<Option<FilterExpr>, DecodeError> {
    if config.is_reserved(name) {
        return Ok(None);
    }
    match name.rsplit_once("__") {
        Some((field, token)) if token_operator(token, registry).is_some() => {
            condition_from_token(field, token, value, false, registry).map(Some)
        }
        _ => condition_from_token(name, "eq", value, false, registry).map(Some),
    }
}

fn token_operator<'r>(token: &str, registry: &'r OperatorRegistry) -> Option<(&'r str, Arity)> {
    registry.operators().find_map(|op| {
        let mapping = registry.resolve(op).ok()?;
        (mapping.rest.as_deref() == Some(token)).then_some((op, mapping.arity))
    })
}

fn condition_from_token(
    field: &str,
    token: &str,
    raw: &str,
    parenthesized_lists: bool,
    registry: &OperatorRegistry,
) -> Result<FilterExpr, DecodeError> {
    let (operator, arity) =
        token_operator(token, registry).ok_or_else(|| DecodeError::UnknownToken(token.to_string()))?;

    let value = match arity {
        Arity::List | Arity::Range => {
            let inner = if parenthesized_lists {
                raw.strip_prefix('(')
                    .and_then(|r| r.strip_suffix(')'))
                    .unwrap_or(raw)
            } else {
                raw
            };
            let items = split_list(inner).ok_or_else(|| DecodeError::MalformedParameter(raw.to_string()))?;
            FilterValue::List(items.into_iter().map(decode_value).collect::<Result<_, _>>()?)
        }
        Arity::Scalar | Arity::Flag => decode_value(raw)?,
    };

    Ok(FilterExpr::Condition(Condition {
        field: FieldRef::parse(field),
        operator: operator.to_string(),
        value,
    }))
}

/// Split a list on `,` outside JSON string literals. `None` when a literal is
/// left open.
fn split_list(inner: &str) -> Option<Vec<&str>> {
    if inner.is_empty() {
        return Some(Vec::new());
    }
    let mut items = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;
    for (i, ch) in inner.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ',' if !quoted => {
                items.push(&inner[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if quoted {
        return None;
    }
    items.push(&inner[start..]);
    Some(items)
}

fn decode_value(raw: &str) -> Result<FilterValue, DecodeError> {
    if raw.starts_with('"') {
        return serde_json::from_str::<String>(raw)
            .map(FilterValue::String)
            .map_err(|_| DecodeError::MalformedParameter(raw.to_string()));
    }
    Ok(typed_value(raw))
}

fn typed_value(raw: &str) -> FilterValue {
    match raw {
        "true" => FilterValue::Bool(true),
        "false" => FilterValue::Bool(false),
        "null" => FilterValue::Null,
        _ => {
            if let Ok(n) = raw.parse::<i64>() {
                FilterValue::from(n)
            } else if let Ok(n) = raw.parse::<u64>() {
                FilterValue::Number(n.into())
            } else if let Some(n) = raw
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .and_then(serde_json::Number::from_f64)
            {
                FilterValue::Number(n)
            } else {
                FilterValue::String(raw.to_string())
            }
        }
    }
}
