use serde::{Deserialize, Serialize};

use crate::math::DEFAULT_SLICE_TOLERANCE;

/// Tunables for slice matching and evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlgebraConfig {
    /// Slice positions closer than this (mm) are treated as the same slice.
    pub slice_tolerance: f64,
    /// Evaluate slice keys on the rayon thread pool.
    pub parallel: bool,
}

impl Default for AlgebraConfig {
    fn default() -> Self {
        Self {
            slice_tolerance: DEFAULT_SLICE_TOLERANCE,
            parallel: true,
        }
    }
}

impl AlgebraConfig {
    /// Sets the slice tolerance.
    #[must_use]
    pub fn with_slice_tolerance(mut self, tolerance: f64) -> Self {
        self.slice_tolerance = tolerance;
        self
    }

    /// Enables or disables per-slice parallel evaluation.
    #[must_use]
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}
