//! Logical planning - converts a validated Query into an ordered pipeline.

mod builder;
mod plan;

pub use plan::*;

use crate::ast::Query;
use crate::planner::PlanResult;

/// Logical planner.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogicalPlanner;

impl LogicalPlanner {
    pub fn new() -> Self {
        Self
    }

    pub fn plan(&self, query: &Query) -> PlanResult<LogicalPlan> {
        builder::PlanBuilder::new(query).build()
    }
}
