//! GraphQL argument and selection-set adapter.
//!
//! A plan becomes one root field with arguments and a selection set:
//!
//! ```text
//! order(where: {status: {eq: "open"}}, order_by: [{amount: DESC}], limit: 10) {
//!   id
//!   amount
//!   customer {
//!     name
//!   }
//! }
//! ```
//!
//! Joins are only expressible as relationship nesting, so a join must follow a
//! foreign key: one operand is the configured key field of its source and the
//! other is the referencing column on the other side.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{
    check_join_type, child_path, conjuncts, join_path, operator_template, AdapterConfig,
    AdapterError, AdapterResult, ProtocolAdapter, ProtocolQuery, Target,
};
use crate::ast::{FieldRef, FilterExpr, FilterValue, SortSpec};
use crate::planner::logical::{LogicalPlan, PaginateStage, SourceId};
use crate::registry::OperatorRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphQLFilterStyle {
    /// `{price: {gt: 10}}` with `AND`/`OR`/`NOT` wrappers.
    #[default]
    Nested,
    /// `{price_gt: 10}`, conjunction only.
    Flat,
    /// `[{field: "price", op: "gt", value: 10}]`, conjunction only.
    Array,
}

impl GraphQLFilterStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            GraphQLFilterStyle::Nested => "nested",
            GraphQLFilterStyle::Flat => "flat",
            GraphQLFilterStyle::Array => "array",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphQLPaginationStyle {
    #[default]
    LimitOffset,
    Relay,
}

impl GraphQLPaginationStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            GraphQLPaginationStyle::LimitOffset => "limit_offset",
            GraphQLPaginationStyle::Relay => "relay",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphQLConfig {
    pub filter_style: GraphQLFilterStyle,
    pub pagination_style: GraphQLPaginationStyle,
    pub filter_argument: String,
    pub having_argument: String,
    pub group_by_argument: String,
    pub order_by_argument: String,
    /// Primary key name used to recognise foreign-key joins.
    pub key_field: String,
    /// Relay `first` sent alongside a cursor.
    pub default_page_size: Option<u64>,
}

impl Default for GraphQLConfig {
    fn default() -> Self {
        Self {
            filter_style: GraphQLFilterStyle::default(),
            pagination_style: GraphQLPaginationStyle::default(),
            filter_argument: "where".to_string(),
            having_argument: "having".to_string(),
            group_by_argument: "group_by".to_string(),
            order_by_argument: "order_by".to_string(),
            key_field: "id".to_string(),
            default_page_size: None,
        }
    }
}

// ============================================================================
// Output
// ============================================================================

/// One field of a selection set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub arguments: Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Selection>,
}

impl Selection {
    pub fn field(name: impl Into<String>) -> Self {
        Self {
            alias: None,
            name: name.into(),
            arguments: Map::new(),
            children: Vec::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    fn render(&self, indent: usize, out: &mut String) {
        out.push_str(&"  ".repeat(indent));
        if let Some(alias) = &self.alias {
            out.push_str(alias);
            out.push_str(": ");
        }
        out.push_str(&self.name);
        if !self.arguments.is_empty() {
            out.push('(');
            render_arguments(&self.arguments, &[], out);
            out.push(')');
        }
        if !self.children.is_empty() {
            out.push_str(" {\n");
            for child in &self.children {
                child.render(indent + 1, out);
            }
            out.push_str(&"  ".repeat(indent));
            out.push('}');
        }
        out.push('\n');
    }
}

/// Encoded GraphQL root field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphQLQuery {
    /// Root field name (the plan's root object).
    pub root: String,
    /// Argument object for the root field.
    pub arguments: Value,
    pub selection: Vec<Selection>,
    /// Arguments whose string values render as enum literals.
    #[serde(skip)]
    enum_arguments: Vec<String>,
}

impl GraphQLQuery {
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name)
    }

    /// Arguments in GraphQL syntax, without the surrounding parentheses.
    pub fn render_arguments(&self) -> String {
        let mut out = String::new();
        if let Value::Object(map) = &self.arguments {
            render_arguments(map, &self.enum_arguments, &mut out);
        }
        out
    }

    /// Selection set including the enclosing braces.
    pub fn render_selection(&self) -> String {
        let mut out = String::from("{\n");
        for selection in &self.selection {
            selection.render(1, &mut out);
        }
        out.push('}');
        out
    }

    /// `root(arguments) { selection }`.
    pub fn render(&self) -> String {
        let arguments = self.render_arguments();
        if arguments.is_empty() {
            format!("{} {}", self.root, self.render_selection())
        } else {
            format!("{}({}) {}", self.root, arguments, self.render_selection())
        }
    }
}

fn render_arguments(map: &Map<String, Value>, enum_arguments: &[String], out: &mut String) {
    for (i, (name, value)) in map.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(name);
        out.push_str(": ");
        render_value(value, enum_arguments.iter().any(|a| a == name), out);
    }
}

fn render_value(value: &Value, enum_strings: bool, out: &mut String) {
    match value {
        Value::String(s) if enum_strings => out.push_str(s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                render_value(item, enum_strings, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(key);
                out.push_str(": ");
                render_value(item, enum_strings, out);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

// ============================================================================
// Adapter
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct GraphQLAdapter;

impl ProtocolAdapter for GraphQLAdapter {
    fn name(&self) -> &'static str {
        "GraphQL"
    }

    fn target(&self) -> Target {
        Target::GraphQL
    }

    fn encode(
        &self,
        plan: &LogicalPlan,
        config: &AdapterConfig,
        registry: &OperatorRegistry,
    ) -> AdapterResult<ProtocolQuery> {
        GraphQLEncoder {
            config: &config.graphql,
            registry,
        }
        .encode(plan)
        .map(ProtocolQuery::GraphQL)
    }
}

struct GraphQLEncoder<'a> {
    config: &'a GraphQLConfig,
    registry: &'a OperatorRegistry,
}

impl<'a> GraphQLEncoder<'a> {
    fn encode(&self, plan: &LogicalPlan) -> AdapterResult<GraphQLQuery> {
        if !plan.windows().is_empty() {
            return Err(AdapterError::UnsupportedInGraphQLProjection {
                feature: "window functions".to_string(),
                path: "windowFunctions[0]".to_string(),
            });
        }

        let parents = self.relationship_parents(plan)?;
        let mut arguments = Map::new();
        let mut enum_arguments = Vec::new();

        if let Some(filter) = plan.filter() {
            arguments.insert(self.config.filter_argument.clone(), self.filter(filter, "filters")?);
        }

        let mut group_by: &[FieldRef] = &[];
        let mut aggregates: Vec<Selection> = Vec::new();
        if let Some(aggregate) = plan.aggregate() {
            if !aggregate.group_by.is_empty() {
                let names = aggregate
                    .group_by
                    .iter()
                    .map(|f| Value::String(f.path()))
                    .collect();
                arguments.insert(self.config.group_by_argument.clone(), Value::Array(names));
                group_by = aggregate.group_by.as_slice();
            }
            for agg in &aggregate.aggregates {
                let mut selection = Selection::field(agg.function.as_str()).with_alias(agg.alias.clone());
                if let Some(field) = &agg.field {
                    selection
                        .arguments
                        .insert("field".to_string(), Value::String(field.path()));
                }
                aggregates.push(selection);
            }
        }

        if let Some(having) = plan.having() {
            arguments.insert(self.config.having_argument.clone(), self.filter(having, "having")?);
        }

        if !plan.sort().is_empty() {
            arguments.insert(self.config.order_by_argument.clone(), order_by(plan.sort()));
            enum_arguments.push(self.config.order_by_argument.clone());
        }

        self.pagination(plan, &mut arguments)?;

        let selection = self.selection(plan, &parents, group_by, aggregates);

        Ok(GraphQLQuery {
            root: plan.root().object.clone(),
            arguments: Value::Object(arguments),
            selection,
            enum_arguments,
        })
    }

    /// Parent source of every joined source, indexed by source id.
    fn relationship_parents(&self, plan: &LogicalPlan) -> AdapterResult<Vec<Option<SourceId>>> {
        let mut parents = vec![None; plan.sources.len()];

        for join in plan.joins() {
            check_join_type(&GraphQLAdapter, join)?;
            let path = join_path(join);

            if plan.sources[join.target.0].is_derived() {
                return Err(AdapterError::UnsupportedInGraphQLProjection {
                    feature: "subquery joins".to_string(),
                    path: child_path(&path, "subquery"),
                });
            }

            let (target_side, earlier_side) = join.oriented();
            let key = self.config.key_field.as_str();
            let spans_sources =
                target_side.source == join.target && earlier_side.source != join.target;
            let foreign_key = target_side.field.name == key || earlier_side.field.name == key;

            if !spans_sources || !foreign_key {
                return Err(AdapterError::UnsupportedInGraphQLProjection {
                    feature: "joins that do not follow a foreign key".to_string(),
                    path: child_path(&path, "on"),
                });
            }
            parents[join.target.0] = Some(earlier_side.source);
        }

        Ok(parents)
    }

    fn selection(
        &self,
        plan: &LogicalPlan,
        parents: &[Option<SourceId>],
        group_by: &[FieldRef],
        aggregates: Vec<Selection>,
    ) -> Vec<Selection> {
        let mut fields: Vec<Vec<Selection>> = vec![Vec::new(); plan.sources.len()];

        // Grouped fields sit under the relationship that provides them.
        for field in group_by {
            place_field(plan, field, &mut fields);
        }
        fields[SourceId::ROOT.0].extend(aggregates);
        for field in &plan.projection {
            place_field(plan, field, &mut fields);
        }

        self.assemble(plan, parents, SourceId::ROOT, &mut fields)
    }

    fn assemble(
        &self,
        plan: &LogicalPlan,
        parents: &[Option<SourceId>],
        id: SourceId,
        fields: &mut Vec<Vec<Selection>>,
    ) -> Vec<Selection> {
        let mut node = std::mem::take(&mut fields[id.0]);

        for source in plan.sources.iter().skip(1) {
            if parents[source.id.0] != Some(id) {
                continue;
            }
            let mut nested = Selection::field(source.object.clone());
            if source.alias != source.object {
                nested = nested.with_alias(source.alias.clone());
            }
            nested.children = self.assemble(plan, parents, source.id, fields);
            node.push(nested);
        }

        if node.is_empty() {
            node.push(Selection::field(self.config.key_field.clone()));
        }
        node
    }

    fn pagination(&self, plan: &LogicalPlan, arguments: &mut Map<String, Value>) -> AdapterResult<()> {
        let style = self.config.pagination_style;
        let unsupported = |mode: &str| AdapterError::UnsupportedPagination {
            mode: mode.to_string(),
            style: style.as_str().to_string(),
            path: "pagination".to_string(),
        };

        match (plan.pagination(), style) {
            (None, _) => {}
            (Some(PaginateStage::Offset { top, skip }), GraphQLPaginationStyle::LimitOffset) => {
                if let Some(top) = top {
                    arguments.insert("limit".to_string(), Value::from(*top));
                }
                if let Some(skip) = skip {
                    arguments.insert("offset".to_string(), Value::from(*skip));
                }
            }
            (Some(PaginateStage::Offset { skip: Some(_), .. }), GraphQLPaginationStyle::Relay) => {
                return Err(unsupported("offset"));
            }
            (Some(PaginateStage::Offset { top, skip: None }), GraphQLPaginationStyle::Relay) => {
                if let Some(top) = top {
                    arguments.insert("first".to_string(), Value::from(*top));
                }
            }
            (Some(PaginateStage::Cursor { .. }), GraphQLPaginationStyle::LimitOffset) => {
                return Err(unsupported("cursor"));
            }
            (Some(PaginateStage::Cursor { cursor }), GraphQLPaginationStyle::Relay) => {
                if let Some(size) = self.config.default_page_size {
                    arguments.insert("first".to_string(), Value::from(size));
                }
                arguments.insert("after".to_string(), Value::String(cursor.clone()));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Filters
    // ========================================================================

    fn filter(&self, expr: &FilterExpr, path: &str) -> AdapterResult<Value> {
        match self.config.filter_style {
            GraphQLFilterStyle::Nested => self.nested(expr, path),
            style => {
                let mut leaves = Vec::new();
                conjuncts(expr, style.as_str(), path, &mut leaves)?;

                let mut flat = Map::new();
                let mut array = Vec::with_capacity(leaves.len());
                for (condition, path) in leaves {
                    let (_, key) =
                        operator_template(self.registry, condition, Target::GraphQL, &path)?;
                    let value = json_value(&condition.value, &path)?;
                    let field = condition.field.path();

                    if style == GraphQLFilterStyle::Flat {
                        let name = field.replace('.', "_");
                        let name = if condition.operator == "eq" {
                            name
                        } else {
                            format!("{}_{}", name, key)
                        };
                        if flat.contains_key(&name) {
                            return Err(AdapterError::AmbiguousEncoding {
                                name,
                                target: Target::GraphQL,
                                path,
                            });
                        }
                        flat.insert(name, value);
                    } else {
                        let mut entry = Map::new();
                        entry.insert("field".to_string(), Value::String(field));
                        entry.insert("op".to_string(), Value::String(key.to_string()));
                        entry.insert("value".to_string(), value);
                        array.push(Value::Object(entry));
                    }
                }

                Ok(if style == GraphQLFilterStyle::Flat {
                    Value::Object(flat)
                } else {
                    Value::Array(array)
                })
            }
        }
    }

    fn nested(&self, expr: &FilterExpr, path: &str) -> AdapterResult<Value> {
        let wrap = |key: &str, value: Value| {
            let mut map = Map::new();
            map.insert(key.to_string(), value);
            Value::Object(map)
        };

        match expr {
            FilterExpr::Condition(c) => {
                let (_, key) = operator_template(self.registry, c, Target::GraphQL, path)?;
                let leaf = wrap(key, json_value(&c.value, path)?);
                let by_field = wrap(&c.field.name, leaf);
                Ok(match &c.field.qualifier {
                    Some(relationship) => wrap(relationship, by_field),
                    None => by_field,
                })
            }
            FilterExpr::And(children) | FilterExpr::Or(children) => {
                let name = expr.node_name();
                let parts = children
                    .iter()
                    .enumerate()
                    .map(|(i, child)| self.nested(child, &child_path(path, &format!("{}[{}]", name, i))))
                    .collect::<AdapterResult<Vec<_>>>()?;
                Ok(wrap(&name.to_ascii_uppercase(), Value::Array(parts)))
            }
            FilterExpr::Not(child) => {
                let inner = self.nested(child, &child_path(path, "not"))?;
                Ok(wrap("NOT", inner))
            }
        }
    }
}

/// Add a field to the selection bucket of its source, skipping repeats.
fn place_field(plan: &LogicalPlan, field: &FieldRef, fields: &mut [Vec<Selection>]) {
    let source = plan.source_of(field).unwrap_or(SourceId::ROOT);
    let bucket = &mut fields[source.0];
    let mut selection = Selection::field(field.name.clone());
    if let Some(alias) = &field.alias {
        selection = selection.with_alias(alias.clone());
    }
    if !bucket.iter().any(|s| s.output_name() == selection.output_name()) {
        bucket.push(selection);
    }
}

fn json_value(value: &FilterValue, path: &str) -> AdapterResult<Value> {
    match value {
        FilterValue::Reference(_) => Err(AdapterError::UnsupportedValueForTarget {
            kind: value.kind().to_string(),
            target: Target::GraphQL,
            path: child_path(path, "value"),
        }),
        FilterValue::List(items) => items
            .iter()
            .map(|item| json_value(item, path))
            .collect::<AdapterResult<Vec<_>>>()
            .map(Value::Array),
        other => Ok(Value::from(other.clone())),
    }
}

fn order_by(keys: &[SortSpec]) -> Value {
    let entries = keys
        .iter()
        .map(|key| {
            let direction = Value::String(if key.is_descending() { "DESC" } else { "ASC" }.to_string());
            Value::Object(nest(&key.field, direction))
        })
        .collect();
    Value::Array(entries)
}

/// `{name: value}`, or `{qualifier: {name: value}}` for joined fields.
fn nest(field: &FieldRef, value: Value) -> Map<String, Value> {
    let mut inner = Map::new();
    inner.insert(field.name.clone(), value);
    match &field.qualifier {
        Some(q) => {
            let mut outer = Map::new();
            outer.insert(q.clone(), Value::Object(inner));
            outer
        }
        None => inner,
    }
}
