use crate::error::{AlgebraError, Result};
use crate::math::polygon_2d::all_finite;
use crate::math::Point3;

use super::Polygon;

/// Maximum distance (mm) a vertex may sit off its contour's slice plane.
const PLANE_TOLERANCE: f64 = 1e-6;

/// One closed polygon on one slice of a structure.
///
/// Every point shares the contour's `slice_position` as its z coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    slice_position: f64,
    points: Vec<Point3>,
}

impl Contour {
    /// Minimum number of vertices for a stored contour.
    pub const MIN_VERTICES: usize = 3;

    /// Creates a contour, checking the vertex count and that all points lie on
    /// the slice plane.
    ///
    /// # Errors
    ///
    /// Returns `AlgebraError::InvalidContour` if there are fewer than 3 points,
    /// a coordinate is not finite, or a point is off the slice plane.
    pub fn new(slice_position: f64, points: Vec<Point3>) -> Result<Self> {
        if points.len() < Self::MIN_VERTICES {
            return Err(AlgebraError::InvalidContour(format!(
                "{} vertices on slice {slice_position}, at least {} required",
                points.len(),
                Self::MIN_VERTICES
            ))
            .into());
        }
        if !slice_position.is_finite() || !all_finite(&points) {
            return Err(AlgebraError::InvalidContour("non-finite coordinate".to_owned()).into());
        }
        if let Some(off) = points
            .iter()
            .find(|p| (p.z - slice_position).abs() > PLANE_TOLERANCE)
        {
            return Err(AlgebraError::InvalidContour(format!(
                "point z {} is off slice {slice_position}",
                off.z
            ))
            .into());
        }
        Ok(Self {
            slice_position,
            points,
        })
    }

    /// Decodes a flat `[x0, y0, z0, x1, y1, z1, ...]` array. The slice
    /// position is the z of the first point.
    ///
    /// # Errors
    ///
    /// Returns `AlgebraError::InvalidContour` if the length is not a multiple
    /// of 3 or is shorter than 9, or if the points do not share one z.
    pub fn from_flat(data: &[f64]) -> Result<Self> {
        if data.len() % 3 != 0 || data.len() < 3 * Self::MIN_VERTICES {
            return Err(AlgebraError::InvalidContour(format!(
                "flat point array of length {} is not a multiple of 3 with at least 9 values",
                data.len()
            ))
            .into());
        }
        let points: Vec<Point3> = data
            .chunks_exact(3)
            .map(|c| Point3::new(c[0], c[1], c[2]))
            .collect();
        Self::new(points[0].z, points)
    }

    /// Encodes the points as a flat `[x, y, z, ...]` array.
    #[must_use]
    pub fn to_flat(&self) -> Vec<f64> {
        self.points.iter().flat_map(|p| [p.x, p.y, p.z]).collect()
    }

    /// Slice position (mm).
    #[must_use]
    pub fn slice_position(&self) -> f64 {
        self.slice_position
    }

    /// Polygon vertices.
    #[must_use]
    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    /// Number of vertices.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Copies the contour into a [`Polygon`].
    #[must_use]
    pub fn to_polygon(&self) -> Polygon {
        Polygon::new(self.points.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn flat_round_trip() {
        let flat = [0.0, 0.0, 5.0, 1.0, 0.0, 5.0, 1.0, 1.0, 5.0];
        let contour = Contour::from_flat(&flat).unwrap();
        assert_eq!(contour.point_count(), 3);
        assert!((contour.slice_position() - 5.0).abs() < f64::EPSILON);
        assert_eq!(contour.to_flat(), flat.to_vec());
    }

    #[test]
    fn flat_length_not_multiple_of_three() {
        let flat = [0.0, 0.0, 5.0, 1.0, 0.0, 5.0, 1.0, 1.0, 5.0, 2.0];
        assert!(Contour::from_flat(&flat).is_err());
    }

    #[test]
    fn two_vertices_rejected() {
        let flat = [0.0, 0.0, 5.0, 1.0, 0.0, 5.0];
        assert!(Contour::from_flat(&flat).is_err());
    }

    #[test]
    fn off_plane_point_rejected() {
        let points = vec![
            Point3::new(0.0, 0.0, 5.0),
            Point3::new(1.0, 0.0, 5.0),
            Point3::new(1.0, 1.0, 5.5),
        ];
        assert!(Contour::new(5.0, points).is_err());
    }
}
