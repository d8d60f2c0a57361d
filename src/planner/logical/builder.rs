//! Build logical plans from validated queries.

use crate::ast::{FieldRef, JoinSpec, Query, SortSpec, WindowFunction};
use crate::planner::canonical::{canonicalize, normalize_field};
use crate::planner::logical::{
    AggregateStage, FilterStage, HavingStage, JoinStage, LogicalPlan, PaginateStage,
    ResolvedField, SortStage, Source, SourceId, SourceStage, Stage, WindowStage,
};
use crate::planner::{PlanError, PlanResult};

pub struct PlanBuilder<'a> {
    query: &'a Query,
    sources: Vec<Source>,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(query: &'a Query) -> Self {
        Self {
            query,
            sources: Vec::new(),
        }
    }

    pub fn build(mut self) -> PlanResult<LogicalPlan> {
        let query = self.query;
        let mut stages = Vec::new();

        // Source resolution
        self.sources.push(Source {
            id: SourceId::ROOT,
            alias: self.query.object.clone(),
            object: self.query.object.clone(),
            derived: None,
        });
        stages.push(Stage::Source(SourceStage {
            source: SourceId::ROOT,
        }));

        // Joins, in declaration order
        for (i, join) in query.joins.iter().enumerate() {
            stages.push(self.build_join(i, join)?);
        }

        if let Some(filters) = &self.query.filters {
            stages.push(Stage::Filter(FilterStage {
                predicate: canonicalize(filters, &self.query.object),
            }));
        }

        if self.query.has_aggregation() {
            stages.push(self.build_aggregate());
        }

        if let Some(having) = &self.query.having {
            stages.push(Stage::Having(HavingStage {
                predicate: canonicalize(having, &self.query.object),
            }));
        }

        if !self.query.window_functions.is_empty() {
            stages.push(self.build_window()?);
        }

        if !self.query.sort.is_empty() {
            stages.push(Stage::Sort(SortStage {
                keys: self.query.sort.iter().map(|s| self.normalize_sort(s)).collect(),
            }));
        }

        if let Some(pagination) = self.query.pagination.as_ref().filter(|p| !p.is_empty()) {
            let stage = match &pagination.cursor {
                Some(cursor) => PaginateStage::Cursor {
                    cursor: cursor.clone(),
                },
                None => PaginateStage::Offset {
                    top: pagination.top,
                    skip: pagination.skip,
                },
            };
            stages.push(Stage::Paginate(stage));
        }

        let projection = self
            .query
            .fields
            .iter()
            .map(|f| self.normalize(f))
            .collect();

        Ok(LogicalPlan {
            sources: self.sources,
            projection,
            stages,
        })
    }

    fn build_join(&mut self, index: usize, join: &JoinSpec) -> PlanResult<Stage> {
        let derived = match &join.subquery {
            Some(subquery) => Some(Box::new(PlanBuilder::new(subquery).build()?)),
            None => None,
        };

        let target = SourceId(index + 1);
        self.sources.push(Source {
            id: target,
            alias: join.alias.clone(),
            object: join.object.clone(),
            derived,
        });

        let left = self.resolve(&join.on.left, target, &format!("joins[{}].on.left", index))?;
        let right = self.resolve(&join.on.right, target, &format!("joins[{}].on.right", index))?;

        Ok(Stage::Join(JoinStage {
            join_type: join.join_type,
            target,
            left,
            right,
        }))
    }

    /// Resolve a join operand against sources declared up to `upto`.
    fn resolve(&self, field: &FieldRef, upto: SourceId, path: &str) -> PlanResult<ResolvedField> {
        let field = self.normalize(field);
        let source = match &field.qualifier {
            None => Some(SourceId::ROOT),
            Some(alias) => self
                .sources
                .iter()
                .take(upto.0 + 1)
                .find(|s| &s.alias == alias)
                .map(|s| s.id),
        };

        match source {
            Some(source) => Ok(ResolvedField { source, field }),
            None => Err(PlanError::Internal(format!(
                "{}: '{}' does not resolve to a declared source",
                path,
                field.path()
            ))),
        }
    }

    fn build_aggregate(&self) -> Stage {
        let aggregates = self
            .query
            .aggregations
            .iter()
            .map(|agg| {
                let mut agg = agg.clone();
                agg.field = agg.field.as_ref().map(|f| self.normalize(f));
                agg
            })
            .collect();

        Stage::Aggregate(AggregateStage {
            group_by: self.query.group_by.iter().map(|f| self.normalize(f)).collect(),
            aggregates,
        })
    }

    /// Window `over` clauses see every source after joins.
    fn build_window(&self) -> PlanResult<Stage> {
        let mut windows = Vec::with_capacity(self.query.window_functions.len());

        for (i, window) in self.query.window_functions.iter().enumerate() {
            let mut planned: WindowFunction = window.clone();
            planned.field = window.field.as_ref().map(|f| self.normalize(f));
            planned.over.partition_by = window
                .over
                .partition_by
                .iter()
                .map(|f| self.normalize(f))
                .collect();
            planned.over.order_by = window
                .over
                .order_by
                .iter()
                .map(|s| self.normalize_sort(s))
                .collect();

            let visible = planned
                .over
                .partition_by
                .iter()
                .chain(planned.over.order_by.iter().map(|s| &s.field))
                .all(|f| self.is_visible(f));
            if !visible {
                return Err(PlanError::Internal(format!(
                    "windowFunctions[{}].over references a source that is not joined",
                    i
                )));
            }

            windows.push(planned);
        }

        Ok(Stage::Window(WindowStage { windows }))
    }

    fn is_visible(&self, field: &FieldRef) -> bool {
        match &field.qualifier {
            None => true,
            Some(alias) => self.sources.iter().any(|s| &s.alias == alias),
        }
    }

    fn normalize(&self, field: &FieldRef) -> FieldRef {
        normalize_field(field, &self.query.object)
    }

    fn normalize_sort(&self, spec: &SortSpec) -> SortSpec {
        SortSpec {
            field: self.normalize(&spec.field),
            order: spec.order,
        }
    }
}
