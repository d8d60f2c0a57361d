//! Protocol adapters - encode a logical plan for a concrete wire protocol.
//!
//! Each adapter implements [`ProtocolAdapter`]. Encoding is a pure function of
//! the plan, the adapter configuration and the operator registry:
//!
//! ```text
//! LogicalPlan ──┬──► RestAdapter    ──► RestQuery    (params + headers)
//!               ├──► GraphQLAdapter ──► GraphQLQuery (arguments + selection)
//!               └──► ODataAdapter   ──► ODataQuery   (system query options)
//! ```
//!
//! # Capabilities
//!
//! | Feature | REST | GraphQL | OData v2 | OData v4 |
//! |---------|------|---------|----------|----------|
//! | `or` / `not` | rsql only | nested style only | ✓ | ✓ |
//! | inner/left joins | `include` | FK-style nesting | `$expand` | `$expand` |
//! | right/full joins | ❌ | ❌ | ❌ | ❌ |
//! | subquery joins | ❌ | ❌ | ❌ | expand options |
//! | aggregation | ✓ | ✓ | ❌ | `$apply` |
//! | window functions | ❌ | ❌ | ❌ | ❌ |
//! | cursor pagination | ✓ | relay only | `$skiptoken` | `$skiptoken` |
//!
//! Anything outside this table fails with an [`AdapterError`] naming the node
//! path. Adapters never drop a clause they cannot express.

pub mod graphql;
pub mod odata;
pub mod rest;

pub use graphql::{
    GraphQLAdapter, GraphQLConfig, GraphQLFilterStyle, GraphQLPaginationStyle, GraphQLQuery,
    Selection,
};
pub use odata::{ExpandConfig, ODataAdapter, ODataConfig, ODataQuery, ODataVersion};
pub use rest::{decode_filter, DecodeError, RestAdapter, RestConfig, RestFilterStyle, RestQuery, RestSortStyle};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::ast::{Condition, FilterExpr, JoinType};
use crate::planner::logical::{JoinStage, LogicalPlan};
use crate::registry::{OperatorMapping, OperatorRegistry};

/// Protocol adapter trait - encodes plans for one target protocol.
pub trait ProtocolAdapter: fmt::Debug + Send + Sync {
    /// Adapter name for display/logging.
    fn name(&self) -> &'static str;

    fn target(&self) -> Target;

    /// Encode a plan. Fails only when the target cannot express the plan.
    fn encode(
        &self,
        plan: &LogicalPlan,
        config: &AdapterConfig,
        registry: &OperatorRegistry,
    ) -> AdapterResult<ProtocolQuery>;

    // =========================================================================
    // Capabilities
    // =========================================================================

    /// Whether the protocol has syntax for this join type.
    ///
    /// None of the supported protocols can express right or full outer joins.
    fn supports_join_type(&self, join_type: JoinType) -> bool {
        matches!(join_type, JoinType::Inner | JoinType::Left)
    }

    fn supports_window_functions(&self) -> bool {
        false
    }

    fn supports_aggregation(&self) -> bool {
        true
    }

    fn supports_cursor_pagination(&self) -> bool {
        true
    }
}

/// Supported target protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    #[default]
    Rest,
    #[serde(rename = "graphql")]
    GraphQL,
    #[serde(rename = "odata")]
    OData,
}

impl Target {
    pub const ALL: [Target; 3] = [Target::Rest, Target::GraphQL, Target::OData];

    /// Get the adapter implementation.
    pub fn adapter(&self) -> &'static dyn ProtocolAdapter {
        match self {
            Target::Rest => &RestAdapter,
            Target::GraphQL => &GraphQLAdapter,
            Target::OData => &ODataAdapter,
        }
    }

    /// Operator template for this target, or `None` when it cannot express
    /// the operator.
    pub fn template<'m>(&self, mapping: &'m OperatorMapping) -> Option<&'m str> {
        match self {
            Target::Rest => mapping.rest.as_deref(),
            Target::GraphQL => mapping.graphql.as_deref(),
            Target::OData => mapping.odata.as_deref(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Rest => "rest",
            Target::GraphQL => "graphql",
            Target::OData => "odata",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rest" => Ok(Target::Rest),
            "graphql" | "gql" => Ok(Target::GraphQL),
            "odata" => Ok(Target::OData),
            other => Err(format!("unknown target '{}'", other)),
        }
    }
}

// Implement ProtocolAdapter for Target by delegating to concrete adapters
impl ProtocolAdapter for Target {
    fn name(&self) -> &'static str {
        self.adapter().name()
    }

    fn target(&self) -> Target {
        *self
    }

    fn encode(
        &self,
        plan: &LogicalPlan,
        config: &AdapterConfig,
        registry: &OperatorRegistry,
    ) -> AdapterResult<ProtocolQuery> {
        let result = self.adapter().encode(plan, config, registry);
        match &result {
            Ok(_) => tracing::debug!(target_protocol = %self, object = %plan.root().object, "encoded plan"),
            Err(e) => tracing::warn!(
                target_protocol = %self,
                path = %e.path(),
                error = %e,
                "target cannot express plan"
            ),
        }
        result
    }

    fn supports_join_type(&self, join_type: JoinType) -> bool {
        self.adapter().supports_join_type(join_type)
    }

    fn supports_window_functions(&self) -> bool {
        self.adapter().supports_window_functions()
    }

    fn supports_aggregation(&self) -> bool {
        self.adapter().supports_aggregation()
    }

    fn supports_cursor_pagination(&self) -> bool {
        self.adapter().supports_cursor_pagination()
    }
}

/// Per-protocol encoding options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    pub rest: RestConfig,
    pub graphql: GraphQLConfig,
    pub odata: ODataConfig,
}

/// Encoded output of any adapter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "target", content = "query", rename_all = "lowercase")]
pub enum ProtocolQuery {
    Rest(RestQuery),
    GraphQL(GraphQLQuery),
    OData(ODataQuery),
}

impl ProtocolQuery {
    pub fn target(&self) -> Target {
        match self {
            ProtocolQuery::Rest(_) => Target::Rest,
            ProtocolQuery::GraphQL(_) => Target::GraphQL,
            ProtocolQuery::OData(_) => Target::OData,
        }
    }

    pub fn as_rest(&self) -> Option<&RestQuery> {
        match self {
            ProtocolQuery::Rest(q) => Some(q),
            _ => None,
        }
    }

    pub fn as_graphql(&self) -> Option<&GraphQLQuery> {
        match self {
            ProtocolQuery::GraphQL(q) => Some(q),
            _ => None,
        }
    }

    pub fn as_odata(&self) -> Option<&ODataQuery> {
        match self {
            ProtocolQuery::OData(q) => Some(q),
            _ => None,
        }
    }
}

impl fmt::Display for ProtocolQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolQuery::Rest(q) => {
                for (name, value) in &q.headers {
                    writeln!(f, "{}: {}", name, value)?;
                }
                write!(f, "{}", q.query_string())
            }
            ProtocolQuery::GraphQL(q) => write!(f, "{}", q.render()),
            ProtocolQuery::OData(q) => write!(f, "{}", q.to_query_string()),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// The target protocol cannot express part of a plan.
///
/// Recoverable by choosing another adapter or relaxing the query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    #[error("{path}: operator '{operator}' has no {target} mapping")]
    UnsupportedOperatorForTarget {
        operator: String,
        target: Target,
        path: String,
    },

    #[error("{path}: '{combinator}' cannot be expressed in the {style} filter style")]
    UnsupportedLogicalCombinatorForStyle {
        combinator: String,
        style: String,
        path: String,
    },

    #[error("{path}: {feature} cannot be expressed in a GraphQL projection")]
    UnsupportedInGraphQLProjection { feature: String, path: String },

    #[error("{path}: OData function '{function}' is not allowed")]
    UnsupportedODataFunction { function: String, path: String },

    #[error("{path}: $expand depth {depth} exceeds the limit of {limit}")]
    ExpandDepthExceeded {
        depth: usize,
        limit: usize,
        path: String,
    },

    #[error("{path}: {join_type} joins are not supported by {target}")]
    UnsupportedJoinType {
        join_type: JoinType,
        target: Target,
        path: String,
    },

    #[error("{path}: {mode} pagination is not supported by the {style} style")]
    UnsupportedPagination {
        mode: String,
        style: String,
        path: String,
    },

    #[error("{path}: {feature} is not supported by {target}")]
    UnsupportedFeature {
        feature: String,
        target: Target,
        path: String,
    },

    #[error("{path}: {kind} values cannot be sent to {target}")]
    UnsupportedValueForTarget {
        kind: String,
        target: Target,
        path: String,
    },

    /// Two plan nodes would encode to the same key, or a key collides with
    /// one the target reserves.
    #[error("{path}: '{name}' cannot be encoded unambiguously for {target}")]
    AmbiguousEncoding {
        name: String,
        target: Target,
        path: String,
    },
}

impl AdapterError {
    /// Path of the plan node that could not be encoded.
    pub fn path(&self) -> &str {
        match self {
            AdapterError::UnsupportedOperatorForTarget { path, .. }
            | AdapterError::UnsupportedLogicalCombinatorForStyle { path, .. }
            | AdapterError::UnsupportedInGraphQLProjection { path, .. }
            | AdapterError::UnsupportedODataFunction { path, .. }
            | AdapterError::ExpandDepthExceeded { path, .. }
            | AdapterError::UnsupportedJoinType { path, .. }
            | AdapterError::UnsupportedPagination { path, .. }
            | AdapterError::UnsupportedFeature { path, .. }
            | AdapterError::UnsupportedValueForTarget { path, .. }
            | AdapterError::AmbiguousEncoding { path, .. } => path,
        }
    }
}

pub type AdapterResult<T> = Result<T, AdapterError>;

// ============================================================================
// Shared helpers
// ============================================================================

/// Append a segment to a node path: `filters` + `and[0]` → `filters.and[0]`.
pub(crate) fn child_path(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", path, segment)
    }
}

/// Resolve a condition's operator and its template for `target`.
pub(crate) fn operator_template<'r>(
    registry: &'r OperatorRegistry,
    condition: &Condition,
    target: Target,
    path: &str,
) -> AdapterResult<(&'r OperatorMapping, &'r str)> {
    let unsupported = || AdapterError::UnsupportedOperatorForTarget {
        operator: condition.operator.clone(),
        target,
        path: path.to_string(),
    };
    let mapping = registry.resolve(&condition.operator).map_err(|_| unsupported())?;
    let template = target.template(mapping).ok_or_else(unsupported)?;
    Ok((mapping, template))
}

/// Collect the leaves of an implicit conjunction.
///
/// Styles without boolean nesting call this and reject any `or`/`not` node.
pub(crate) fn conjuncts<'e>(
    expr: &'e FilterExpr,
    style: &str,
    path: &str,
    out: &mut Vec<(&'e Condition, String)>,
) -> AdapterResult<()> {
    match expr {
        FilterExpr::Condition(c) => {
            out.push((c, path.to_string()));
            Ok(())
        }
        FilterExpr::And(children) => {
            for (i, child) in children.iter().enumerate() {
                conjuncts(child, style, &child_path(path, &format!("and[{}]", i)), out)?;
            }
            Ok(())
        }
        FilterExpr::Or(_) | FilterExpr::Not(_) => {
            Err(AdapterError::UnsupportedLogicalCombinatorForStyle {
                combinator: expr.node_name().to_string(),
                style: style.to_string(),
                path: path.to_string(),
            })
        }
    }
}

/// Path of the join stage targeting a source, matching the query's `joins[i]`.
pub(crate) fn join_path(join: &JoinStage) -> String {
    format!("joins[{}]", join.target.0.saturating_sub(1))
}

/// Reject join types the target has no syntax for.
pub(crate) fn check_join_type(
    adapter: &dyn ProtocolAdapter,
    join: &JoinStage,
) -> AdapterResult<()> {
    if adapter.supports_join_type(join.join_type) {
        Ok(())
    } else {
        Err(AdapterError::UnsupportedJoinType {
            join_type: join.join_type,
            target: adapter.target(),
            path: join_path(join),
        })
    }
}
