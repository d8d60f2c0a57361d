//! Window function specifications.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::field::FieldRef;
use super::query::SortSpec;

/// Functions allowed in a window specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowFunctionKind {
    // Ranking
    RowNumber,
    Rank,
    DenseRank,
    PercentRank,
    CumeDist,
    // Offset
    Lag,
    Lead,
    FirstValue,
    LastValue,
    // Aggregate over window
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

impl WindowFunctionKind {
    /// Ranking functions operate on row position and take no field.
    pub fn is_rank_family(&self) -> bool {
        matches!(
            self,
            WindowFunctionKind::RowNumber
                | WindowFunctionKind::Rank
                | WindowFunctionKind::DenseRank
                | WindowFunctionKind::PercentRank
                | WindowFunctionKind::CumeDist
        )
    }

    /// Functions that accept an `offset` argument.
    pub fn accepts_offset(&self) -> bool {
        matches!(self, WindowFunctionKind::Lag | WindowFunctionKind::Lead)
    }

    pub fn requires_field(&self) -> bool {
        !self.is_rank_family()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WindowFunctionKind::RowNumber => "row_number",
            WindowFunctionKind::Rank => "rank",
            WindowFunctionKind::DenseRank => "dense_rank",
            WindowFunctionKind::PercentRank => "percent_rank",
            WindowFunctionKind::CumeDist => "cume_dist",
            WindowFunctionKind::Lag => "lag",
            WindowFunctionKind::Lead => "lead",
            WindowFunctionKind::FirstValue => "first_value",
            WindowFunctionKind::LastValue => "last_value",
            WindowFunctionKind::Sum => "sum",
            WindowFunctionKind::Avg => "avg",
            WindowFunctionKind::Min => "min",
            WindowFunctionKind::Max => "max",
            WindowFunctionKind::Count => "count",
        }
    }
}

impl fmt::Display for WindowFunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A window function projected under `alias`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowFunction {
    pub function: WindowFunctionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<FieldRef>,
    /// Row offset for `lag`/`lead`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
    pub alias: String,
    #[serde(default)]
    pub over: WindowSpec,
}

/// The `OVER (...)` clause.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partition_by: Vec<FieldRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<SortSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<Frame>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    Rows,
    Range,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub frame_type: FrameType,
    pub start: FrameBound,
    pub end: FrameBound,
}

impl Frame {
    /// Whether `start` does not come after `end` in row order.
    pub fn is_ordered(&self) -> bool {
        !matches!(self.start, FrameBound::UnboundedFollowing)
            && !matches!(self.end, FrameBound::UnboundedPreceding)
            && self.start.position() <= self.end.position()
    }
}

/// One end of a window frame.
///
/// Unit variants are written as strings (`"current_row"`), offsets as
/// `{"preceding": 3}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameBound {
    UnboundedPreceding,
    Preceding(u64),
    CurrentRow,
    Following(u64),
    UnboundedFollowing,
}

impl FrameBound {
    /// Signed row position relative to the current row.
    pub fn position(&self) -> i128 {
        match self {
            FrameBound::UnboundedPreceding => i128::MIN,
            FrameBound::Preceding(n) => -(*n as i128),
            FrameBound::CurrentRow => 0,
            FrameBound::Following(n) => *n as i128,
            FrameBound::UnboundedFollowing => i128::MAX,
        }
    }
}
