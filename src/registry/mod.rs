//! Operator registry - the canonical operator catalog.
//!
//! Each operator maps to zero or more per-protocol templates. The registry is
//! a capability table: a missing template means the protocol cannot express
//! the operator, and adapters report that instead of degrading silently.
//!
//! | Operator | REST | GraphQL | OData |
//! |----------|------|---------|-------|
//! | eq, ne, gt, gte, lt, lte | ✓ | ✓ | ✓ |
//! | in, nin | ✓ | ✓ | ✓ (v2 expands to `or`/`and` chains) |
//! | contains, starts_with, ends_with | ✓ | ✓ | ✓ (allow-list gated) |
//! | exists | ✓ | ✓ | ✓ |
//! | regex | ❌ | ✓ | ✓ (`matchesPattern`, allow-list gated) |
//! | between | ✓ | ❌ | ✓ |
//!
//! The registry is assembled once at startup through [`RegistryBuilder`] and
//! is read-only afterwards.

mod defaults;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Shape of the value an operator expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arity {
    /// A single scalar or field reference.
    #[default]
    Scalar,
    /// A non-empty list of scalars.
    List,
    /// A two-element `[low, high]` list.
    Range,
    /// A boolean switch.
    Flag,
}

/// Templates for one operator.
///
/// - `rest`: operator token for bracket/dot/flat parameters (`gte`). RSQL
///   derives its comparison from this token.
/// - `graphql`: argument key (`gte`, `startsWith`).
/// - `odata`: expression template with `{field}`, `{value}`, `{values}`,
///   `{low}` and `{high}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorMapping {
    pub operator: String,
    #[serde(default)]
    pub arity: Arity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graphql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub odata: Option<String>,
}

impl OperatorMapping {
    pub fn new(operator: impl Into<String>, arity: Arity) -> Self {
        Self {
            operator: operator.into(),
            arity,
            rest: None,
            graphql: None,
            odata: None,
        }
    }

    pub fn with_rest(mut self, token: impl Into<String>) -> Self {
        self.rest = Some(token.into());
        self
    }

    pub fn with_graphql(mut self, key: impl Into<String>) -> Self {
        self.graphql = Some(key.into());
        self
    }

    pub fn with_odata(mut self, template: impl Into<String>) -> Self {
        self.odata = Some(template.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Unknown operator: '{operator}'")]
    UnknownOperator { operator: String },

    #[error("Operator '{operator}' is already registered")]
    DuplicateOperator { operator: String },
}

/// Immutable operator catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorRegistry {
    mappings: BTreeMap<String, OperatorMapping>,
}

static DEFAULT_REGISTRY: Lazy<OperatorRegistry> =
    Lazy::new(|| OperatorRegistry::builder().with_defaults().build());

impl OperatorRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Shared registry holding only the canonical operators.
    pub fn global() -> &'static OperatorRegistry {
        &DEFAULT_REGISTRY
    }

    pub fn resolve(&self, operator: &str) -> Result<&OperatorMapping, RegistryError> {
        self.mappings
            .get(operator)
            .ok_or_else(|| RegistryError::UnknownOperator {
                operator: operator.to_string(),
            })
    }

    pub fn contains(&self, operator: &str) -> bool {
        self.mappings.contains_key(operator)
    }

    pub fn operators(&self) -> impl Iterator<Item = &str> {
        self.mappings.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

impl Default for OperatorRegistry {
    fn default() -> Self {
        OperatorRegistry::global().clone()
    }
}

/// Startup-time builder. Consumed by [`RegistryBuilder::build`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    mappings: BTreeMap<String, OperatorMapping>,
}

impl RegistryBuilder {
    /// Add the canonical operator set.
    pub fn with_defaults(mut self) -> Self {
        for mapping in defaults::canonical_operators() {
            self.mappings.insert(mapping.operator.clone(), mapping);
        }
        self
    }

    /// Add a new operator. Existing operators are never replaced here.
    pub fn register(mut self, mapping: OperatorMapping) -> Result<Self, RegistryError> {
        if self.mappings.contains_key(&mapping.operator) {
            return Err(RegistryError::DuplicateOperator {
                operator: mapping.operator,
            });
        }
        self.mappings.insert(mapping.operator.clone(), mapping);
        Ok(self)
    }

    /// Add an operator or replace an existing mapping wholesale.
    pub fn override_mapping(mut self, mapping: OperatorMapping) -> Self {
        if self.mappings.contains_key(&mapping.operator) {
            tracing::debug!(operator = %mapping.operator, "overriding operator mapping");
        }
        self.mappings.insert(mapping.operator.clone(), mapping);
        self
    }

    pub fn build(self) -> OperatorRegistry {
        OperatorRegistry {
            mappings: self.mappings,
        }
    }
}
