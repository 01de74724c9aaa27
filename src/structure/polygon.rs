use crate::math::polygon_2d::{all_finite, dedup_closed, rotate_to_canonical_start, signed_area_2d};
use crate::math::{Point3, AREA_EPSILON};

/// A single closed polygon lying in one slice plane.
///
/// The closing edge is implicit: the last point connects back to the first.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    points: Vec<Point3>,
}

impl Polygon {
    /// Creates a polygon from its vertices, dropping repeated vertices.
    #[must_use]
    pub fn new(points: Vec<Point3>) -> Self {
        Self {
            points: dedup_closed(&points),
        }
    }

    /// Counter-clockwise regular `segments`-gon approximating a circle.
    #[must_use]
    pub fn circle(cx: f64, cy: f64, radius: f64, segments: usize, z: f64) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let step = std::f64::consts::TAU / segments as f64;
        let points = (0..segments)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let t = step * i as f64;
                Point3::new(cx + radius * t.cos(), cy + radius * t.sin(), z)
            })
            .collect();
        Self::new(points)
    }

    /// Counter-clockwise axis-aligned rectangle.
    #[must_use]
    pub fn rectangle(x0: f64, y0: f64, x1: f64, y1: f64, z: f64) -> Self {
        Self::new(vec![
            Point3::new(x0, y0, z),
            Point3::new(x1, y0, z),
            Point3::new(x1, y1, z),
            Point3::new(x0, y1, z),
        ])
    }

    /// Returns the vertices.
    #[must_use]
    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    /// Consumes the polygon, returning its vertices.
    #[must_use]
    pub fn into_points(self) -> Vec<Point3> {
        self.points
    }

    /// Number of vertices.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.points.len()
    }

    /// Signed area in the slice plane. Positive for counter-clockwise.
    #[must_use]
    pub fn signed_area(&self) -> f64 {
        signed_area_2d(&self.points)
    }

    /// Unsigned area in the slice plane.
    #[must_use]
    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    /// The z of the slice plane, taken from the first vertex.
    #[must_use]
    pub fn plane_z(&self) -> Option<f64> {
        self.points.first().map(|p| p.z)
    }

    /// Returns `true` if the polygon has fewer than 3 vertices, zero area,
    /// or non-finite coordinates.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.points.len() < 3 || self.area() < AREA_EPSILON || !all_finite(&self.points)
    }

    /// Moves every vertex onto the plane `z`.
    #[must_use]
    pub fn with_z(mut self, z: f64) -> Self {
        for p in &mut self.points {
            p.z = z;
        }
        self
    }

    /// Counter-clockwise winding starting at the leftmost-bottom vertex.
    #[must_use]
    pub fn canonical(self) -> Self {
        let mut points = self.points;
        if signed_area_2d(&points) < 0.0 {
            points.reverse();
        }
        Self {
            points: rotate_to_canonical_start(&points),
        }
    }
}

/// Total unsigned area of a polygon list.
#[must_use]
pub fn total_area(polygons: &[Polygon]) -> f64 {
    polygons.iter().map(Polygon::area).sum()
}
