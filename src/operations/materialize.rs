use tracing::debug;

use crate::structure::Contour;

use super::slice_index::SliceMap;

/// Converts a slice map into contours ordered by slice position.
///
/// Every polygon becomes one contour on its slice key, with all of its points
/// moved onto that plane. Fragments with fewer than three vertices are dropped.
pub struct Materialize<'a> {
    map: &'a SliceMap,
}

impl<'a> Materialize<'a> {
    /// Creates a new `Materialize` operation.
    #[must_use]
    pub fn new(map: &'a SliceMap) -> Self {
        Self { map }
    }

    /// Executes the conversion.
    #[must_use]
    pub fn execute(&self) -> Vec<Contour> {
        let mut contours = Vec::with_capacity(self.map.polygon_count());
        let mut dropped = 0usize;
        for entry in self.map.iter() {
            for polygon in &entry.polygons {
                let points = polygon.clone().with_z(entry.position).into_points();
                match Contour::new(entry.position, points) {
                    Ok(contour) => contours.push(contour),
                    Err(_) => dropped += 1,
                }
            }
        }
        if dropped > 0 {
            debug!(dropped, "discarded invalid fragments while materializing");
        }
        contours.sort_by(|a, b| a.slice_position().total_cmp(&b.slice_position()));
        contours
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Point3;
    use crate::structure::Polygon;

    #[test]
    fn two_point_fragment_is_never_stored() {
        let mut map = SliceMap::new();
        map.insert(
            0.0,
            vec![Polygon::new(vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 0.0),
            ])],
        );
        assert!(Materialize::new(&map).execute().is_empty());
    }

    #[test]
    fn contours_sorted_and_on_slice_plane() {
        let mut map = SliceMap::new();
        map.insert(4.0, vec![Polygon::rectangle(0.0, 0.0, 1.0, 1.0, 4.3)]);
        map.insert(
            -2.0,
            vec![
                Polygon::rectangle(0.0, 0.0, 1.0, 1.0, -2.0),
                Polygon::rectangle(3.0, 0.0, 4.0, 1.0, -2.0),
            ],
        );
        let contours = Materialize::new(&map).execute();
        let positions: Vec<f64> = contours.iter().map(Contour::slice_position).collect();
        assert_eq!(positions, vec![-2.0, -2.0, 4.0]);
        assert!(contours[2].points().iter().all(|p| (p.z - 4.0).abs() < f64::EPSILON));
    }

    #[test]
    fn empty_map_gives_no_contours() {
        assert!(Materialize::new(&SliceMap::new()).execute().is_empty());
    }
}
