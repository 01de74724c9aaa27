pub mod polygon_2d;

/// 3D point type in patient space (millimetres).
pub type Point3 = nalgebra::Point3<f64>;

/// Global geometric tolerance for floating-point comparisons.
pub const TOLERANCE: f64 = 1e-10;

/// Default distance (mm) within which two slice positions are the same slice.
pub const DEFAULT_SLICE_TOLERANCE: f64 = 1.0;

/// Polygons with an absolute area below this (mm²) are degenerate.
pub const AREA_EPSILON: f64 = 1e-9;
