pub mod binary;
pub mod expression;
pub mod margin;
pub mod materialize;
pub mod pipeline;
pub mod reduce;
pub mod slice_index;

pub use binary::ApplyBinary;
pub use expression::{Expression, SliceSource, StoreSource};
pub use margin::ApplyMargin;
pub use materialize::Materialize;
pub use pipeline::{Pipeline, PipelineStep, StepOp};
pub use reduce::UnionReduce;
pub use slice_index::{combined_keys, SliceEntry, SliceMap};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::clipping::BooleanOp;

/// The result of a slice-wise operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SliceOutcome {
    /// Polygons per slice. Slices with an empty result are absent.
    pub slices: SliceMap,
    /// Slice keys dropped because the clipping primitive failed on them.
    pub skipped: Vec<f64>,
}

impl SliceOutcome {
    /// Folds the skipped slices of an earlier step into this outcome.
    #[must_use]
    pub(crate) fn with_skipped(mut self, earlier: &[f64]) -> Self {
        self.skipped.extend_from_slice(earlier);
        self.skipped.sort_by(f64::total_cmp);
        self.skipped.dedup();
        self
    }
}

/// The kind of operation a derived structure is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Union,
    Intersect,
    Subtract,
    Xor,
    /// More than one kind of operation, or none.
    Complex,
    Margin,
}

impl From<BooleanOp> for OperationType {
    fn from(op: BooleanOp) -> Self {
        match op {
            BooleanOp::Union => Self::Union,
            BooleanOp::Intersect => Self::Intersect,
            BooleanOp::Subtract => Self::Subtract,
            BooleanOp::Xor => Self::Xor,
        }
    }
}

/// Maps `f` over independent slice work items, on the rayon pool when
/// `parallel` is set. Output order matches input order.
pub(crate) fn map_slices<T, R, F>(items: Vec<T>, parallel: bool, f: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync + Send,
{
    if parallel {
        items.into_par_iter().map(f).collect()
    } else {
        items.into_iter().map(f).collect()
    }
}
