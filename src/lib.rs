//! # ObjectQL
//!
//! A unified query representation that plans once and compiles to REST,
//! GraphQL and OData.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  Query (JSON / builder)                  │
//! │  (fields, filters, aggregations, joins, windows, paging) │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [validation]
//! ┌─────────────────────────────────────────────────────────┐
//! │          Validated Query (all errors, with paths)        │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [planner]
//! ┌─────────────────────────────────────────────────────────┐
//! │                     LogicalPlan                          │
//! │  Source → Join* → Filter → Aggregate → Having → Window   │
//! │         → Sort → Paginate                                │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [adapter + operator registry]
//! ┌─────────────────────────────────────────────────────────┐
//! │       REST params  │  GraphQL arguments  │  OData $opts  │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod adapter;
pub mod ast;
pub mod cache;
pub mod compile;
pub mod config;
pub mod planner;
pub mod registry;
pub mod validation;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::adapter::{
        AdapterConfig, AdapterError, GraphQLQuery, ODataQuery, ProtocolAdapter, ProtocolQuery,
        RestQuery, Target,
    };
    pub use crate::ast::{
        AggregateFunction, Aggregation, FieldRef, FilterExpr, FilterValue, JoinSpec, JoinType,
        Pagination, Query, SortSpec, WindowFunction, WindowFunctionKind, WindowSpec,
    };
    pub use crate::compile::{compile, compile_json, CompileError, CompileOptions, CompileOutput};
    pub use crate::config::Settings;
    pub use crate::planner::{LogicalPlan, StageKind};
    pub use crate::registry::OperatorRegistry;
    pub use crate::validation::{validate, ValidationError, ValidationErrorKind};
}

// Also export at crate root for convenience
pub use adapter::Target;
pub use ast::Query;
pub use compile::{compile, CompileOptions};
