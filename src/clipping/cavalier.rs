use std::panic::{catch_unwind, AssertUnwindSafe};

use cavalier_contours::polyline::{
    BooleanOp as PlineBooleanOp, PlineSource, PlineSourceMut, Polyline,
};

use crate::math::polygon_2d::{all_finite, contains_point_2d, signed_area_2d};
use crate::math::Point3;
use crate::structure::Polygon;

use super::{BooleanOp, ClipError, ClipPrimitive, OffsetPrimitive};

/// Maximum angle (radians) spanned by one chord when flattening arcs.
const ARC_STEP: f64 = std::f64::consts::PI / 16.0;

/// Clipping and offsetting backed by `cavalier_contours` polylines.
///
/// Polygons are projected onto XY; results are placed back on the plane of
/// the first operand. Holes are joined to their enclosing ring through a
/// zero-width bridge, so every result is one simple keyhole ring whose area
/// is the outer area minus its holes.
#[derive(Debug, Clone, Copy, Default)]
pub struct CavalierClipper;

impl CavalierClipper {
    /// Creates a new clipper.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ClipPrimitive for CavalierClipper {
    fn clip(&self, op: BooleanOp, a: &Polygon, b: &Polygon) -> Result<Vec<Polygon>, ClipError> {
        check_finite(a)?;
        check_finite(b)?;
        if a.is_degenerate() || b.is_degenerate() {
            return Ok(Vec::new());
        }
        let z = a.plane_z().unwrap_or_default();
        let pa = to_pline(&a.clone().canonical());
        let pb = to_pline(&b.clone().canonical());
        let pline_op = match op {
            BooleanOp::Union => PlineBooleanOp::Or,
            BooleanOp::Intersect => PlineBooleanOp::And,
            BooleanOp::Subtract => PlineBooleanOp::Not,
            BooleanOp::Xor => PlineBooleanOp::Xor,
        };
        let result = catch_unwind(AssertUnwindSafe(|| pa.boolean(&pb, pline_op)))
            .map_err(|_| ClipError(format!("polyline boolean {op:?} panicked")))?;
        let outers: Vec<Polygon> = result
            .pos_plines
            .iter()
            .filter_map(|r| from_pline(&r.pline, z))
            .collect();
        let holes: Vec<Polygon> = result
            .neg_plines
            .iter()
            .filter_map(|r| from_pline(&r.pline, z))
            .collect();
        bridge_holes(outers, holes)
    }
}

/// Splices every hole into the smallest outer ring containing it.
fn bridge_holes(outers: Vec<Polygon>, holes: Vec<Polygon>) -> Result<Vec<Polygon>, ClipError> {
    if holes.is_empty() {
        return Ok(outers);
    }
    let mut rings: Vec<Vec<Point3>> = outers.into_iter().map(Polygon::into_points).collect();
    let areas: Vec<f64> = rings
        .iter()
        .map(|r| signed_area_2d(r).abs())
        .collect();
    for hole in holes {
        let Some(&first) = hole.points().first() else {
            continue;
        };
        let owner = rings
            .iter()
            .enumerate()
            .filter(|(_, ring)| contains_point_2d(ring, &first))
            .min_by(|(i, _), (j, _)| areas[*i].total_cmp(&areas[*j]))
            .map(|(i, _)| i)
            .ok_or_else(|| ClipError("hole lies outside every result ring".to_owned()))?;
        let mut hole_points = hole.into_points();
        hole_points.reverse();
        rings[owner] = splice(&rings[owner], &hole_points);
    }
    Ok(rings
        .into_iter()
        .map(|r| Polygon::new(r).canonical())
        .collect())
}

/// Joins a clockwise hole into a counter-clockwise ring at their closest
/// vertex pair.
fn splice(ring: &[Point3], hole: &[Point3]) -> Vec<Point3> {
    let mut best = (0, 0, f64::INFINITY);
    for (i, o) in ring.iter().enumerate() {
        for (j, h) in hole.iter().enumerate() {
            let d = (o.x - h.x).powi(2) + (o.y - h.y).powi(2);
            if d < best.2 {
                best = (i, j, d);
            }
        }
    }
    let (o, h, _) = best;
    let mut out = Vec::with_capacity(ring.len() + hole.len() + 2);
    out.extend_from_slice(&ring[..=o]);
    out.extend_from_slice(&hole[h..]);
    out.extend_from_slice(&hole[..=h]);
    out.extend_from_slice(&ring[o..]);
    out
}

impl OffsetPrimitive for CavalierClipper {
    fn offset(&self, polygon: &Polygon, distance: f64) -> Result<Vec<Polygon>, ClipError> {
        check_finite(polygon)?;
        if !distance.is_finite() {
            return Err(ClipError(format!("offset distance {distance} is not finite")));
        }
        if polygon.is_degenerate() {
            return Ok(Vec::new());
        }
        let z = polygon.plane_z().unwrap_or_default();
        // Counter-clockwise input: a negative polyline offset moves outward.
        let pline = to_pline(&polygon.clone().canonical());
        let results = catch_unwind(AssertUnwindSafe(|| pline.parallel_offset(-distance)))
            .map_err(|_| ClipError("polyline offset panicked".to_owned()))?;
        Ok(results.iter().filter_map(|p| from_pline(p, z)).collect())
    }
}

fn check_finite(polygon: &Polygon) -> Result<(), ClipError> {
    if all_finite(polygon.points()) {
        Ok(())
    } else {
        Err(ClipError("polygon has non-finite coordinates".to_owned()))
    }
}

fn to_pline(polygon: &Polygon) -> Polyline<f64> {
    let mut pline = Polyline::new();
    for p in polygon.points() {
        pline.add(p.x, p.y, 0.0);
    }
    pline.set_is_closed(true);
    pline
}

/// Converts a closed polyline back into a polygon on plane `z`, flattening
/// arc segments into chords.
fn from_pline(pline: &Polyline<f64>, z: f64) -> Option<Polygon> {
    let n = pline.vertex_count();
    let mut points = Vec::with_capacity(n);
    for i in 0..n {
        let v = pline.at(i);
        let next = pline.at((i + 1) % n);
        points.push(Point3::new(v.x, v.y, z));
        if v.bulge.abs() > f64::EPSILON {
            flatten_arc((v.x, v.y), (next.x, next.y), v.bulge, z, &mut points);
        }
    }
    let polygon = Polygon::new(points).canonical();
    (!polygon.is_degenerate()).then_some(polygon)
}

/// Appends the interior points of the arc from `start` to `end` with the
/// given bulge (`tan(sweep / 4)`, positive counter-clockwise).
fn flatten_arc(start: (f64, f64), end: (f64, f64), bulge: f64, z: f64, out: &mut Vec<Point3>) {
    let (dx, dy) = (end.0 - start.0, end.1 - start.1);
    let chord = dx.hypot(dy);
    if chord < f64::EPSILON {
        return;
    }
    let sweep = 4.0 * bulge.atan();
    let radius = chord * (1.0 + bulge * bulge) / (4.0 * bulge.abs());
    let offset = 0.5 * chord * (1.0 - bulge * bulge) / (2.0 * bulge);
    let (cx, cy) = (
        0.5 * (start.0 + end.0) - dy / chord * offset,
        0.5 * (start.1 + end.1) + dx / chord * offset,
    );
    let start_angle = (start.1 - cy).atan2(start.0 - cx);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let steps = (sweep.abs() / ARC_STEP).ceil().max(1.0) as usize;
    for k in 1..steps {
        #[allow(clippy::cast_precision_loss)]
        let t = start_angle + sweep * k as f64 / steps as f64;
        out.push(Point3::new(cx + radius * t.cos(), cy + radius * t.sin(), z));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::structure::total_area;

    fn circle(cx: f64) -> Polygon {
        Polygon::circle(cx, 0.0, 10.0, 64, 0.0)
    }

    #[test]
    fn union_of_overlapping_circles() {
        let out = CavalierClipper.union(&circle(0.0), &circle(8.0)).unwrap();
        assert_eq!(out.len(), 1);
        let area = total_area(&out);
        assert!(area > 314.0 && area < 628.0, "got {area}");
    }

    #[test]
    fn union_of_disjoint_squares_keeps_both() {
        let a = Polygon::rectangle(0.0, 0.0, 1.0, 1.0, 2.0);
        let b = Polygon::rectangle(5.0, 5.0, 6.0, 6.0, 2.0);
        let out = CavalierClipper.union(&a, &b).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|p| p.plane_z() == Some(2.0)));
    }

    #[test]
    fn intersect_of_disjoint_squares_is_empty() {
        let a = Polygon::rectangle(0.0, 0.0, 1.0, 1.0, 0.0);
        let b = Polygon::rectangle(5.0, 5.0, 6.0, 6.0, 0.0);
        assert!(CavalierClipper.intersect(&a, &b).unwrap().is_empty());
    }

    #[test]
    fn subtracting_contained_circle_leaves_ring() {
        let big = Polygon::circle(0.0, 0.0, 20.0, 64, 0.0);
        let small = Polygon::circle(0.0, 0.0, 10.0, 64, 0.0);
        let out = CavalierClipper.subtract(&big, &small).unwrap();
        assert_eq!(out.len(), 1);
        let expected = big.area() - small.area();
        let area = total_area(&out);
        assert!((area - expected).abs() < 1e-6 * expected, "got {area}, want {expected}");
    }

    #[test]
    fn xor_of_nested_circles_matches_union_minus_intersection() {
        let big = Polygon::circle(0.0, 0.0, 20.0, 64, 0.0);
        let small = Polygon::circle(3.0, 0.0, 10.0, 64, 0.0);
        let union = total_area(&CavalierClipper.union(&big, &small).unwrap());
        let inter = total_area(&CavalierClipper.intersect(&big, &small).unwrap());
        let xor = total_area(&CavalierClipper.xor(&big, &small).unwrap());
        assert!((xor - (union - inter)).abs() < 1e-6 * union, "xor {xor}");
        assert!(xor < big.area());
    }

    #[test]
    fn two_holes_bridge_into_one_ring() {
        let outer = Polygon::rectangle(0.0, 0.0, 30.0, 10.0, 1.0);
        let left = Polygon::rectangle(2.0, 2.0, 8.0, 8.0, 1.0);
        let right = Polygon::rectangle(22.0, 2.0, 28.0, 8.0, 1.0);
        let out = bridge_holes(vec![outer], vec![left, right]).unwrap();
        assert_eq!(out.len(), 1);
        assert!((out[0].signed_area() - (300.0 - 36.0 - 36.0)).abs() < 1e-9);
        assert!(out[0].plane_z() == Some(1.0));
    }

    #[test]
    fn hole_outside_every_ring_fails() {
        let outer = Polygon::rectangle(0.0, 0.0, 10.0, 10.0, 0.0);
        let stray = Polygon::rectangle(20.0, 20.0, 25.0, 25.0, 0.0);
        assert!(bridge_holes(vec![outer], vec![stray]).is_err());
    }

    #[test]
    fn degenerate_operand_yields_empty() {
        let a = Polygon::rectangle(0.0, 0.0, 1.0, 1.0, 0.0);
        let line = Polygon::new(vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        ]);
        assert!(CavalierClipper.union(&a, &line).unwrap().is_empty());
        assert!(CavalierClipper.subtract(&line, &a).unwrap().is_empty());
    }

    #[test]
    fn non_finite_operand_fails() {
        let a = Polygon::rectangle(0.0, 0.0, 1.0, f64::NAN, 0.0);
        let b = Polygon::rectangle(0.0, 0.0, 1.0, 1.0, 0.0);
        assert!(CavalierClipper.intersect(&a, &b).is_err());
    }

    #[test]
    fn outward_offset_grows_square() {
        let square = Polygon::rectangle(0.0, 0.0, 10.0, 10.0, 4.0);
        let out = CavalierClipper.offset(&square, 1.0).unwrap();
        assert_eq!(out.len(), 1);
        // 12 x 12 with rounded corners: 100 + 4 * 10 + pi.
        let area = out[0].area();
        assert!(area > 140.0 && area < 144.0, "got {area}");
        assert_eq!(out[0].plane_z(), Some(4.0));
    }

    #[test]
    fn inward_offset_past_width_collapses() {
        let square = Polygon::rectangle(0.0, 0.0, 2.0, 2.0, 0.0);
        assert!(CavalierClipper.offset(&square, -3.0).unwrap().is_empty());
    }
}
