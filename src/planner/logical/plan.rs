//! Logical plan types.

use serde::Serialize;

use crate::ast::{Aggregation, FieldRef, FilterExpr, JoinType, SortSpec, WindowFunction};
use crate::cache::compute_hash;

/// Index of a source in [`LogicalPlan::sources`].
///
/// Sources are numbered in declaration order, so a join may only reference
/// sources with a smaller id than its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SourceId(pub usize);

impl SourceId {
    pub const ROOT: SourceId = SourceId(0);

    pub fn is_root(&self) -> bool {
        *self == SourceId::ROOT
    }
}

/// A named input to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub id: SourceId,
    /// Name fields are qualified with (the root object name, or a join alias).
    pub alias: String,
    pub object: String,
    /// Planned subquery when this source is derived rather than a bare object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derived: Option<Box<LogicalPlan>>,
}

impl Source {
    pub fn is_derived(&self) -> bool {
        self.derived.is_some()
    }
}

/// A field resolved to the source that provides it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedField {
    pub source: SourceId,
    pub field: FieldRef,
}

/// Ordered pipeline of stages over an arena of sources.
///
/// Field references inside the plan are normalized: a reference without a
/// qualifier belongs to the root source (or names an output alias), a
/// qualified reference names a join alias.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogicalPlan {
    pub sources: Vec<Source>,
    pub projection: Vec<FieldRef>,
    pub stages: Vec<Stage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StageKind {
    Source,
    Join,
    Filter,
    Aggregate,
    Having,
    Window,
    Sort,
    Paginate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Stage {
    Source(SourceStage),
    Join(JoinStage),
    Filter(FilterStage),
    Aggregate(AggregateStage),
    Having(HavingStage),
    Window(WindowStage),
    Sort(SortStage),
    Paginate(PaginateStage),
}

impl Stage {
    pub fn kind(&self) -> StageKind {
        match self {
            Stage::Source(_) => StageKind::Source,
            Stage::Join(_) => StageKind::Join,
            Stage::Filter(_) => StageKind::Filter,
            Stage::Aggregate(_) => StageKind::Aggregate,
            Stage::Having(_) => StageKind::Having,
            Stage::Window(_) => StageKind::Window,
            Stage::Sort(_) => StageKind::Sort,
            Stage::Paginate(_) => StageKind::Paginate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceStage {
    pub source: SourceId,
}

/// Equality join of `target` onto the sources declared before it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinStage {
    pub join_type: JoinType,
    pub target: SourceId,
    pub left: ResolvedField,
    pub right: ResolvedField,
}

impl JoinStage {
    /// The operand on the target side, then the operand on the earlier side.
    ///
    /// When both operands name the target, the right operand is returned first.
    pub fn oriented(&self) -> (&ResolvedField, &ResolvedField) {
        if self.left.source == self.target && self.right.source != self.target {
            (&self.left, &self.right)
        } else {
            (&self.right, &self.left)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterStage {
    pub predicate: FilterExpr,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateStage {
    pub group_by: Vec<FieldRef>,
    pub aggregates: Vec<Aggregation>,
}

/// Filter over the aggregate output schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HavingStage {
    pub predicate: FilterExpr,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowStage {
    pub windows: Vec<WindowFunction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SortStage {
    pub keys: Vec<SortSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PaginateStage {
    Offset { top: Option<u64>, skip: Option<u64> },
    Cursor { cursor: String },
}

impl LogicalPlan {
    pub fn root(&self) -> &Source {
        &self.sources[SourceId::ROOT.0]
    }

    pub fn source(&self, id: SourceId) -> Option<&Source> {
        self.sources.get(id.0)
    }

    pub fn source_by_alias(&self, alias: &str) -> Option<&Source> {
        self.sources.iter().find(|s| s.alias == alias)
    }

    /// Source providing a normalized field. Unqualified fields map to the root.
    pub fn source_of(&self, field: &FieldRef) -> Option<SourceId> {
        match &field.qualifier {
            None => Some(SourceId::ROOT),
            Some(q) => self.source_by_alias(q).map(|s| s.id),
        }
    }

    pub fn stage_kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(Stage::kind).collect()
    }

    pub fn has_stage(&self, kind: StageKind) -> bool {
        self.stages.iter().any(|s| s.kind() == kind)
    }

    pub fn joins(&self) -> impl Iterator<Item = &JoinStage> {
        self.stages.iter().filter_map(|s| match s {
            Stage::Join(join) => Some(join),
            _ => None,
        })
    }

    pub fn filter(&self) -> Option<&FilterExpr> {
        self.stages.iter().find_map(|s| match s {
            Stage::Filter(f) => Some(&f.predicate),
            _ => None,
        })
    }

    pub fn aggregate(&self) -> Option<&AggregateStage> {
        self.stages.iter().find_map(|s| match s {
            Stage::Aggregate(a) => Some(a),
            _ => None,
        })
    }

    pub fn having(&self) -> Option<&FilterExpr> {
        self.stages.iter().find_map(|s| match s {
            Stage::Having(h) => Some(&h.predicate),
            _ => None,
        })
    }

    pub fn windows(&self) -> &[WindowFunction] {
        self.stages
            .iter()
            .find_map(|s| match s {
                Stage::Window(w) => Some(w.windows.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    pub fn sort(&self) -> &[SortSpec] {
        self.stages
            .iter()
            .find_map(|s| match s {
                Stage::Sort(sort) => Some(sort.keys.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    pub fn pagination(&self) -> Option<&PaginateStage> {
        self.stages.iter().find_map(|s| match s {
            Stage::Paginate(p) => Some(p),
            _ => None,
        })
    }

    /// SHA-256 of the plan's canonical JSON form.
    ///
    /// Equal queries produce equal fingerprints, so this can key a plan cache.
    pub fn fingerprint(&self) -> Result<String, serde_json::Error> {
        compute_hash(self)
    }
}
