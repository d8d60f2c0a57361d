//! Query planner - converts a validated Query into a LogicalPlan.
//!
//! The pipeline has a fixed order:
//!
//! ```text
//! Source → Join* → Filter → Aggregate → Having → Window → Sort → Paginate
//! ```
//!
//! Joins keep their declaration order; this is a semantic compiler, not a
//! cost-based optimizer. Filters are canonicalized so identical queries
//! produce identical plans and fingerprints.

pub mod canonical;
pub mod logical;

pub use canonical::canonicalize;
pub use logical::{LogicalPlan, LogicalPlanner, StageKind};

use thiserror::Error;

use crate::ast::Query;

/// Errors that can occur during planning.
///
/// Planning a validated query never fails, so any of these is a defect in
/// the validator/planner contract rather than a problem with the input.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Internal planning defect: {0}")]
    Internal(String),
}

pub type PlanResult<T> = Result<T, PlanError>;

/// Main entry point for planning.
#[derive(Debug, Default, Clone, Copy)]
pub struct Planner;

impl Planner {
    pub fn new() -> Self {
        Self
    }

    /// Plan a query that has already passed validation.
    pub fn plan(&self, query: &Query) -> PlanResult<LogicalPlan> {
        match LogicalPlanner::new().plan(query) {
            Ok(plan) => {
                tracing::debug!(
                    object = %query.object,
                    stages = ?plan.stage_kinds(),
                    "planned query"
                );
                Ok(plan)
            }
            Err(e) => {
                tracing::error!(object = %query.object, error = %e, "planner rejected a validated query");
                Err(e)
            }
        }
    }
}

/// Plan a query with the default planner.
pub fn plan(query: &Query) -> PlanResult<LogicalPlan> {
    Planner::new().plan(query)
}
