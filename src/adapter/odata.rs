//! OData system query option adapter (v2 and v4).
//!
//! | Concern | v4 | v2 |
//! |---------|----|----|
//! | substring match | `contains(name,'x')` | `substringof('x',name)` |
//! | membership | `status in ('a','b')` | `(status eq 'a' or status eq 'b')` |
//! | 64-bit literals | `5000000000` | `5000000000L` |
//! | total count | `$count=true` | `$inlinecount=allpages` |
//! | nested expand | `$expand=a($expand=b)` | `$expand=a,a/b` |
//! | expand options | `$expand=a($filter=..;$top=5)` | ❌ |
//! | aggregation | `$apply=groupby(..)` | ❌ |
//!
//! Joins become `$expand` navigation properties named after the joined
//! object, so a field `c.name` on a join `customer as c` renders as
//! `customer/name`.

use serde::{Deserialize, Serialize};

use super::{
    check_join_type, child_path, join_path, operator_template, AdapterConfig, AdapterError,
    AdapterResult, ProtocolAdapter, ProtocolQuery, Target,
};
use crate::ast::{AggregateFunction, Condition, FieldRef, FilterExpr, FilterValue, SortSpec};
use crate::planner::logical::{LogicalPlan, PaginateStage, SourceId, StageKind};
use crate::registry::OperatorRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ODataVersion {
    V2,
    #[default]
    V4,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpandConfig {
    /// Maximum navigation depth below the root.
    pub max_depth: usize,
}

impl Default for ExpandConfig {
    fn default() -> Self {
        Self { max_depth: 3 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ODataConfig {
    pub version: ODataVersion,
    /// Canonical functions the service accepts in `$filter`.
    pub allowed_functions: Vec<String>,
    /// Request the total row count alongside the page.
    pub include_count: bool,
    pub expand: ExpandConfig,
}

impl Default for ODataConfig {
    fn default() -> Self {
        Self {
            version: ODataVersion::default(),
            allowed_functions: [
                "contains",
                "startswith",
                "endswith",
                "substringof",
                "tolower",
                "toupper",
                "length",
                "indexof",
                "trim",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            include_count: false,
            expand: ExpandConfig::default(),
        }
    }
}

impl ODataConfig {
    fn allows(&self, function: &str) -> bool {
        self.allowed_functions
            .iter()
            .any(|f| f.eq_ignore_ascii_case(function))
    }
}

/// Encoded system query options, in emission order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ODataQuery {
    pub options: Vec<(String, String)>,
}

impl ODataQuery {
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// `$filter=...&$top=...` with percent-encoded values.
    pub fn to_query_string(&self) -> String {
        self.options
            .iter()
            .map(|(name, value)| format!("{}={}", name, urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&")
    }

    fn push(&mut self, name: &str, value: impl Into<String>) {
        self.options.push((name.to_string(), value.into()));
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ODataAdapter;

impl ProtocolAdapter for ODataAdapter {
    fn name(&self) -> &'static str {
        "OData"
    }

    fn target(&self) -> Target {
        Target::OData
    }

    fn encode(
        &self,
        plan: &LogicalPlan,
        config: &AdapterConfig,
        registry: &OperatorRegistry,
    ) -> AdapterResult<ProtocolQuery> {
        ODataEncoder {
            config: &config.odata,
            registry,
        }
        .encode(plan)
        .map(ProtocolQuery::OData)
    }
}

/// Navigation layout of one plan: parent and path of every source.
struct Scope<'p> {
    plan: &'p LogicalPlan,
    parents: Vec<Option<SourceId>>,
    nav: Vec<String>,
}

impl<'p> Scope<'p> {
    fn field(&self, field: &FieldRef) -> String {
        match self.plan.source_of(field) {
            Some(id) if !id.is_root() => format!("{}/{}", self.nav[id.0], field.name),
            _ => field.name.clone(),
        }
    }

    fn children(&self, id: SourceId) -> impl Iterator<Item = SourceId> + '_ {
        self.plan
            .sources
            .iter()
            .map(|s| s.id)
            .filter(move |s| self.parents[s.0] == Some(id))
    }
}

struct ODataEncoder<'a> {
    config: &'a ODataConfig,
    registry: &'a OperatorRegistry,
}

impl<'a> ODataEncoder<'a> {
    fn is_v2(&self) -> bool {
        self.config.version == ODataVersion::V2
    }

    fn unsupported(&self, feature: &str, path: &str) -> AdapterError {
        AdapterError::UnsupportedFeature {
            feature: feature.to_string(),
            target: Target::OData,
            path: path.to_string(),
        }
    }

    fn encode(&self, plan: &LogicalPlan) -> AdapterResult<ODataQuery> {
        if !plan.windows().is_empty() {
            return Err(self.unsupported("window functions", "windowFunctions[0]"));
        }

        let scope = self.scope(plan)?;
        let mut out = ODataQuery::default();

        let select = self.select(&scope)?;
        if !select.is_empty() {
            out.push("$select", select.join(","));
        }

        let expand = self.expand(&scope, SourceId::ROOT)?;
        if !expand.is_empty() {
            out.push("$expand", expand.join(","));
        }

        if plan.has_stage(StageKind::Aggregate) {
            out.push("$apply", self.apply(&scope)?);
        } else if let Some(filter) = plan.filter() {
            out.push("$filter", self.expr(&scope, filter, "filters")?);
        }

        if !plan.sort().is_empty() {
            out.push("$orderby", order_by(&scope, plan.sort()));
        }

        match plan.pagination() {
            Some(PaginateStage::Offset { top, skip }) => {
                if let Some(top) = top {
                    out.push("$top", top.to_string());
                }
                if let Some(skip) = skip {
                    out.push("$skip", skip.to_string());
                }
            }
            Some(PaginateStage::Cursor { cursor }) => out.push("$skiptoken", cursor.clone()),
            None => {}
        }

        if self.config.include_count {
            if self.is_v2() {
                out.push("$inlinecount", "allpages");
            } else {
                out.push("$count", "true");
            }
        }

        Ok(out)
    }

    fn scope<'p>(&self, plan: &'p LogicalPlan) -> AdapterResult<Scope<'p>> {
        let mut parents = vec![None; plan.sources.len()];
        let mut nav = vec![String::new(); plan.sources.len()];
        let mut depth = vec![0usize; plan.sources.len()];

        for join in plan.joins() {
            check_join_type(&ODataAdapter, join)?;
            let (_, earlier_side) = join.oriented();
            let parent = if earlier_side.source == join.target {
                SourceId::ROOT
            } else {
                earlier_side.source
            };
            let id = join.target.0;
            let object = &plan.sources[id].object;

            depth[id] = depth[parent.0] + 1;
            if depth[id] > self.config.expand.max_depth {
                return Err(AdapterError::ExpandDepthExceeded {
                    depth: depth[id],
                    limit: self.config.expand.max_depth,
                    path: join_path(join),
                });
            }

            nav[id] = if parent.is_root() {
                object.clone()
            } else {
                format!("{}/{}", nav[parent.0], object)
            };
            // Two aliases of one relationship would share a navigation path.
            if nav[..id].contains(&nav[id]) {
                return Err(AdapterError::AmbiguousEncoding {
                    name: nav[id].clone(),
                    target: Target::OData,
                    path: join_path(join),
                });
            }
            parents[id] = Some(parent);
        }

        Ok(Scope { plan, parents, nav })
    }

    /// Root `$select` entries. v2 also carries navigation paths here.
    fn select(&self, scope: &Scope<'_>) -> AdapterResult<Vec<String>> {
        let mut out = Vec::new();
        for (i, field) in scope.plan.projection.iter().enumerate() {
            if field.alias.is_some() {
                return Err(self.unsupported("field aliases", &format!("fields[{}]", i)));
            }
            let on_root = scope.plan.source_of(field).map_or(true, |id| id.is_root());
            if on_root || self.is_v2() {
                out.push(scope.field(field));
            }
        }
        Ok(out)
    }

    /// `$expand` items for the children of `id`.
    fn expand(&self, scope: &Scope<'_>, id: SourceId) -> AdapterResult<Vec<String>> {
        let mut items = Vec::new();

        for child in scope.children(id) {
            let source = &scope.plan.sources[child.0];
            let path = format!("joins[{}]", child.0 - 1);

            if self.is_v2() {
                if source.is_derived() {
                    return Err(self.unsupported("expand options", &child_path(&path, "subquery")));
                }
                items.push(scope.nav[child.0].clone());
                items.extend(self.expand(scope, child)?);
                continue;
            }

            let mut options = Vec::new();
            let selected: Vec<String> = scope
                .plan
                .projection
                .iter()
                .filter(|f| scope.plan.source_of(f) == Some(child))
                .map(|f| f.name.clone())
                .collect();
            if !selected.is_empty() {
                options.push(format!("$select={}", selected.join(",")));
            }
            if let Some(derived) = &source.derived {
                options.extend(self.expand_options(derived, &child_path(&path, "subquery"))?);
            }
            let nested = self.expand(scope, child)?;
            if !nested.is_empty() {
                options.push(format!("$expand={}", nested.join(",")));
            }

            if options.is_empty() {
                items.push(source.object.clone());
            } else {
                items.push(format!("{}({})", source.object, options.join(";")));
            }
        }

        Ok(items)
    }

    /// v4 options derived from a subquery join.
    fn expand_options(&self, derived: &LogicalPlan, path: &str) -> AdapterResult<Vec<String>> {
        for kind in derived.stage_kinds() {
            if matches!(
                kind,
                StageKind::Join | StageKind::Aggregate | StageKind::Having | StageKind::Window
            ) {
                return Err(self.unsupported(
                    &format!("{:?} stage inside $expand", kind),
                    path,
                ));
            }
        }

        let scope = self.scope(derived)?;
        let mut options = Vec::new();

        if !derived.projection.is_empty() {
            let names: Vec<String> = derived.projection.iter().map(|f| f.name.clone()).collect();
            options.push(format!("$select={}", names.join(",")));
        }
        if let Some(filter) = derived.filter() {
            options.push(format!(
                "$filter={}",
                self.expr(&scope, filter, &child_path(path, "filters"))?
            ));
        }
        if !derived.sort().is_empty() {
            options.push(format!("$orderby={}", order_by(&scope, derived.sort())));
        }
        match derived.pagination() {
            Some(PaginateStage::Offset { top, skip }) => {
                if let Some(top) = top {
                    options.push(format!("$top={}", top));
                }
                if let Some(skip) = skip {
                    options.push(format!("$skip={}", skip));
                }
            }
            Some(PaginateStage::Cursor { .. }) => {
                return Err(self.unsupported(
                    "cursor pagination inside $expand",
                    &child_path(path, "pagination"),
                ));
            }
            None => {}
        }

        Ok(options)
    }

    /// `$apply` pipeline: row filter, grouping, then having.
    fn apply(&self, scope: &Scope<'_>) -> AdapterResult<String> {
        if self.is_v2() {
            return Err(self.unsupported("aggregation", "aggregations"));
        }

        let mut steps = Vec::new();
        if let Some(filter) = scope.plan.filter() {
            steps.push(format!("filter({})", self.expr(scope, filter, "filters")?));
        }

        if let Some(aggregate) = scope.plan.aggregate() {
            let mut aggregates = Vec::with_capacity(aggregate.aggregates.len());
            for (i, agg) in aggregate.aggregates.iter().enumerate() {
                let method = match (&agg.function, &agg.field) {
                    (AggregateFunction::Count, None) => {
                        aggregates.push(format!("$count as {}", agg.alias));
                        continue;
                    }
                    (AggregateFunction::Count, Some(_)) => {
                        return Err(self.unsupported(
                            "count over a field",
                            &format!("aggregations[{}]", i),
                        ));
                    }
                    (AggregateFunction::Sum, _) => "sum",
                    (AggregateFunction::Avg, _) => "average",
                    (AggregateFunction::Min, _) => "min",
                    (AggregateFunction::Max, _) => "max",
                    (AggregateFunction::CountDistinct, _) => "countdistinct",
                };
                let field = agg
                    .field
                    .as_ref()
                    .map(|f| scope.field(f))
                    .unwrap_or_default();
                aggregates.push(format!("{} with {} as {}", field, method, agg.alias));
            }

            let grouping: Vec<String> = aggregate.group_by.iter().map(|f| scope.field(f)).collect();
            let step = match (grouping.is_empty(), aggregates.is_empty()) {
                (true, _) => format!("aggregate({})", aggregates.join(",")),
                (false, true) => format!("groupby(({}))", grouping.join(",")),
                (false, false) => format!(
                    "groupby(({}),aggregate({}))",
                    grouping.join(","),
                    aggregates.join(",")
                ),
            };
            steps.push(step);
        }

        if let Some(having) = scope.plan.having() {
            steps.push(format!("filter({})", self.expr(scope, having, "having")?));
        }

        Ok(steps.join("/"))
    }

    // ========================================================================
    // $filter expressions
    // ========================================================================

    fn expr(&self, scope: &Scope<'_>, expr: &FilterExpr, path: &str) -> AdapterResult<String> {
        match expr {
            FilterExpr::Condition(c) => self.condition(scope, c, path),
            FilterExpr::And(children) | FilterExpr::Or(children) => {
                let name = expr.node_name();
                let mut parts = Vec::with_capacity(children.len());
                for (i, child) in children.iter().enumerate() {
                    let rendered =
                        self.expr(scope, child, &child_path(path, &format!("{}[{}]", name, i)))?;
                    if matches!(child, FilterExpr::And(_) | FilterExpr::Or(_)) {
                        parts.push(format!("({})", rendered));
                    } else {
                        parts.push(rendered);
                    }
                }
                Ok(parts.join(&format!(" {} ", name)))
            }
            FilterExpr::Not(child) => {
                let inner = self.expr(scope, child, &child_path(path, "not"))?;
                Ok(format!("not ({})", inner))
            }
        }
    }

    fn condition(&self, scope: &Scope<'_>, c: &Condition, path: &str) -> AdapterResult<String> {
        let (_, template) = operator_template(self.registry, c, Target::OData, path)?;
        let field = scope.field(&c.field);

        if self.is_v2() {
            match c.operator.as_str() {
                "in" | "nin" => {
                    let (comparison, joiner) = if c.operator == "in" {
                        ("eq", " or ")
                    } else {
                        ("ne", " and ")
                    };
                    let parts = self
                        .list_literals(scope, &c.value, path)?
                        .into_iter()
                        .map(|v| format!("{} {} {}", field, comparison, v))
                        .collect::<Vec<_>>();
                    return Ok(format!("({})", parts.join(joiner)));
                }
                "contains" => {
                    self.check_function("substringof", path)?;
                    let value = self.literal(scope, &c.value, path)?;
                    return Ok(format!("substringof({},{})", value, field));
                }
                _ => {}
            }
        }

        if let Some(function) = function_name(template) {
            self.check_function(function, path)?;
        }

        let mut rendered = template.replace("{field}", &field);
        if rendered.contains("{values}") {
            let values = self.list_literals(scope, &c.value, path)?;
            rendered = rendered.replace("{values}", &values.join(","));
        }
        if rendered.contains("{low}") || rendered.contains("{high}") {
            let bounds = self.list_literals(scope, &c.value, path)?;
            let (Some(low), Some(high)) = (bounds.first(), bounds.get(1)) else {
                return Err(self.bad_value(&c.value, path));
            };
            rendered = rendered.replace("{low}", low).replace("{high}", high);
        }
        if rendered.contains("{value}") {
            rendered = rendered.replace("{value}", &self.literal(scope, &c.value, path)?);
        }

        if c.operator == "exists" && c.value == FilterValue::Bool(false) {
            rendered = format!("not ({})", rendered);
        }
        Ok(rendered)
    }

    fn check_function(&self, function: &str, path: &str) -> AdapterResult<()> {
        if self.config.allows(function) {
            Ok(())
        } else {
            Err(AdapterError::UnsupportedODataFunction {
                function: function.to_string(),
                path: path.to_string(),
            })
        }
    }

    fn list_literals(
        &self,
        scope: &Scope<'_>,
        value: &FilterValue,
        path: &str,
    ) -> AdapterResult<Vec<String>> {
        match value {
            FilterValue::List(items) => items
                .iter()
                .map(|item| self.literal(scope, item, path))
                .collect(),
            other => Err(self.bad_value(other, path)),
        }
    }

    fn literal(&self, scope: &Scope<'_>, value: &FilterValue, path: &str) -> AdapterResult<String> {
        match value {
            FilterValue::String(s) => Ok(format!("'{}'", s.replace('\'', "''"))),
            FilterValue::Number(n) => {
                let wide = n
                    .as_i64()
                    .is_some_and(|i| i32::try_from(i).is_err());
                if self.is_v2() && wide {
                    Ok(format!("{}L", n))
                } else {
                    Ok(n.to_string())
                }
            }
            FilterValue::Bool(b) => Ok(b.to_string()),
            FilterValue::Null => Ok("null".to_string()),
            FilterValue::Reference(field) => Ok(scope.field(field)),
            FilterValue::List(_) => Err(self.bad_value(value, path)),
        }
    }

    fn bad_value(&self, value: &FilterValue, path: &str) -> AdapterError {
        AdapterError::UnsupportedValueForTarget {
            kind: value.kind().to_string(),
            target: Target::OData,
            path: child_path(path, "value"),
        }
    }
}

/// Leading function call of a template: `startswith({field},{value})` → `startswith`.
fn function_name(template: &str) -> Option<&str> {
    let (name, _) = template.split_once('(')?;
    let is_ident = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    is_ident.then_some(name)
}

fn order_by(scope: &Scope<'_>, keys: &[SortSpec]) -> String {
    keys.iter()
        .map(|k| {
            if k.is_descending() {
                format!("{} desc", scope.field(&k.field))
            } else {
                scope.field(&k.field)
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}
