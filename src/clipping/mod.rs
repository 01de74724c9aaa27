//! Single-polygon clipping and offsetting primitives.
//!
//! The algebra engine treats these as black boxes: it only ever hands them two
//! closed polygons sharing a slice plane and collects the closed polygons they
//! return.

mod cavalier;

pub use cavalier::CavalierClipper;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::structure::Polygon;

/// The binary boolean operators of the structure algebra.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BooleanOp {
    Union,
    Intersect,
    Subtract,
    Xor,
}

impl BooleanOp {
    /// The glyph used for this operator in expressions.
    #[must_use]
    pub fn glyph(self) -> char {
        match self {
            Self::Union => '∪',
            Self::Intersect => '∩',
            Self::Subtract => '-',
            Self::Xor => '⊕',
        }
    }

    /// Maps an operator glyph, or its ASCII alias, to an operator.
    #[must_use]
    pub fn from_glyph(c: char) -> Option<Self> {
        match c {
            '∪' | '|' => Some(Self::Union),
            '∩' | '&' => Some(Self::Intersect),
            '-' => Some(Self::Subtract),
            '⊕' | '^' => Some(Self::Xor),
            _ => None,
        }
    }
}

/// Failure reported by a primitive for one polygon pair.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ClipError(pub String);

/// Boolean operations between two single closed polygons on one slice plane.
///
/// Empty or degenerate (collinear, zero-area) input yields an empty list, not
/// an error. Output polygons lie on the plane of `a`.
pub trait ClipPrimitive: Send + Sync {
    /// Applies `op` to `a` and `b`.
    ///
    /// # Errors
    ///
    /// Returns [`ClipError`] if the pair cannot be clipped.
    fn clip(&self, op: BooleanOp, a: &Polygon, b: &Polygon) -> Result<Vec<Polygon>, ClipError>;

    /// Union of `a` and `b`.
    ///
    /// # Errors
    ///
    /// Returns [`ClipError`] if the pair cannot be clipped.
    fn union(&self, a: &Polygon, b: &Polygon) -> Result<Vec<Polygon>, ClipError> {
        self.clip(BooleanOp::Union, a, b)
    }

    /// Intersection of `a` and `b`.
    ///
    /// # Errors
    ///
    /// Returns [`ClipError`] if the pair cannot be clipped.
    fn intersect(&self, a: &Polygon, b: &Polygon) -> Result<Vec<Polygon>, ClipError> {
        self.clip(BooleanOp::Intersect, a, b)
    }

    /// `a` minus `b`.
    ///
    /// # Errors
    ///
    /// Returns [`ClipError`] if the pair cannot be clipped.
    fn subtract(&self, a: &Polygon, b: &Polygon) -> Result<Vec<Polygon>, ClipError> {
        self.clip(BooleanOp::Subtract, a, b)
    }

    /// Symmetric difference of `a` and `b`.
    ///
    /// # Errors
    ///
    /// Returns [`ClipError`] if the pair cannot be clipped.
    fn xor(&self, a: &Polygon, b: &Polygon) -> Result<Vec<Polygon>, ClipError> {
        self.clip(BooleanOp::Xor, a, b)
    }
}

/// In-plane parallel offset of a single closed polygon.
pub trait OffsetPrimitive: Send + Sync {
    /// Grows the polygon outward by `distance` mm, or shrinks it when
    /// `distance` is negative. A polygon shrunk past its width yields an
    /// empty list.
    ///
    /// # Errors
    ///
    /// Returns [`ClipError`] if the polygon cannot be offset.
    fn offset(&self, polygon: &Polygon, distance: f64) -> Result<Vec<Polygon>, ClipError>;
}
