//! End-to-end compilation from a query to a protocol request.
//!
//! This module provides the high-level API:
//!
//! ```text
//! JSON → Query → Validate → Plan → Encode → REST / GraphQL / OData
//! ```
//!
//! # Example
//!
//! ```ignore
//! use objectql::compile::{compile_json, CompileOptions};
//! use objectql::adapter::Target;
//!
//! let json = r#"{
//!     "object": "order",
//!     "filters": [["status", "=", "open"], "and", ["amount", ">", 100]],
//!     "sort": ["-amount"],
//!     "pagination": {"top": 20}
//! }"#;
//!
//! let options = CompileOptions::default().with_target(Target::OData);
//! let output = compile_json(json, &options)?;
//! println!("{}", output.query);
//! ```

use std::sync::Arc;

use crate::adapter::{AdapterConfig, AdapterError, ProtocolAdapter, ProtocolQuery, Target};
use crate::ast::{Query, QueryParseError};
use crate::cache::{CacheError, PlanCache};
use crate::config::{Settings, SettingsError};
use crate::planner::{LogicalPlan, PlanError, Planner};
use crate::registry::OperatorRegistry;
use crate::validation::{ValidationError, ValidationOptions, Validator};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during compilation.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("Parse error: {0}")]
    ParseError(#[from] QueryParseError),

    #[error("Validation failed: {}", format_validation_errors(.0))]
    ValidationError(Vec<ValidationError>),

    #[error("Planning error: {0}")]
    PlanError(#[from] PlanError),

    #[error("Encoding error: {0}")]
    AdapterError(#[from] AdapterError),

    #[error("Cache error: {0}")]
    CacheError(#[from] CacheError),

    #[error("Configuration error: {0}")]
    SettingsError(#[from] SettingsError),
}

impl From<Vec<ValidationError>> for CompileError {
    fn from(errors: Vec<ValidationError>) -> Self {
        CompileError::ValidationError(errors)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type CompileResult<T> = Result<T, CompileError>;

// ============================================================================
// Options
// ============================================================================

/// Options for compilation.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Protocol to encode for.
    pub target: Target,

    /// Per-protocol encoding options.
    pub config: AdapterConfig,

    /// Validator recursion bounds.
    pub validation: ValidationOptions,

    /// Operator catalog used by both the validator and the adapter.
    pub registry: Arc<OperatorRegistry>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            target: Target::default(),
            config: AdapterConfig::default(),
            validation: ValidationOptions::default(),
            registry: Arc::new(OperatorRegistry::global().clone()),
        }
    }
}

impl CompileOptions {
    /// Options taken from a settings file.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            target: Target::default(),
            config: settings.adapter_config(),
            validation: settings.validation,
            registry: Arc::new(settings.operator_registry()),
        }
    }

    /// Set the target protocol.
    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    pub fn with_config(mut self, config: AdapterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_registry(mut self, registry: OperatorRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }
}

// ============================================================================
// Result Types
// ============================================================================

/// Result of compiling a query.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    /// The encoded request.
    pub query: ProtocolQuery,

    /// The plan it was encoded from.
    pub plan: Arc<LogicalPlan>,

    /// Stable fingerprint of the plan.
    pub fingerprint: String,

    /// The target used for encoding.
    pub target: Target,
}

// ============================================================================
// Compilation Functions
// ============================================================================

/// Validate a query with the given options.
pub fn validate(query: &Query, options: &CompileOptions) -> CompileResult<()> {
    Validator::new(&options.registry)
        .with_options(options.validation)
        .validate(query)?;
    Ok(())
}

/// Validate and plan a query.
pub fn plan(query: &Query, options: &CompileOptions) -> CompileResult<LogicalPlan> {
    validate(query, options)?;
    Ok(Planner::new().plan(query)?)
}

/// Compile a query for the target in `options`.
pub fn compile(query: &Query, options: &CompileOptions) -> CompileResult<CompileOutput> {
    let plan = Arc::new(plan(query, options)?);
    encode(plan, options)
}

/// Compile a query, reusing a cached plan for equivalent queries.
pub fn compile_cached(
    query: &Query,
    options: &CompileOptions,
    cache: &PlanCache,
) -> CompileResult<CompileOutput> {
    validate(query, options)?;
    let plan = cache.get_or_plan(query)?;
    encode(plan, options)
}

/// Parse JSON and compile it.
pub fn compile_json(json: &str, options: &CompileOptions) -> CompileResult<CompileOutput> {
    let query = Query::from_json(json)?;
    compile(&query, options)
}

fn encode(plan: Arc<LogicalPlan>, options: &CompileOptions) -> CompileResult<CompileOutput> {
    let fingerprint = plan
        .fingerprint()
        .map_err(|e| PlanError::Internal(format!("plan is not serializable: {}", e)))?;
    let query = options
        .target
        .encode(&plan, &options.config, &options.registry)?;

    Ok(CompileOutput {
        query,
        plan,
        fingerprint,
        target: options.target,
    })
}
