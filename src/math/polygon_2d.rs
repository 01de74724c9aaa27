use super::{Point3, TOLERANCE};

/// Computes the signed area of a polygon in the XY plane (shoelace formula).
///
/// Positive for counter-clockwise, negative for clockwise.
#[must_use]
pub fn signed_area_2d(points: &[Point3]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        sum += points[i].x * points[j].y - points[j].x * points[i].y;
    }
    sum * 0.5
}

/// Rotates a closed polygon so it starts at the leftmost vertex (smallest x),
/// breaking ties by smallest y. Keeps clipped output stable between runs.
#[must_use]
pub fn rotate_to_canonical_start(points: &[Point3]) -> Vec<Point3> {
    if points.len() < 2 {
        return points.to_vec();
    }
    let mut best = 0;
    for (i, pt) in points.iter().enumerate().skip(1) {
        let b = &points[best];
        if pt.x < b.x - TOLERANCE || (pt.x - b.x).abs() < TOLERANCE && pt.y < b.y {
            best = i;
        }
    }
    if best == 0 {
        return points.to_vec();
    }
    let mut rotated = Vec::with_capacity(points.len());
    rotated.extend_from_slice(&points[best..]);
    rotated.extend_from_slice(&points[..best]);
    rotated
}

/// Drops consecutive duplicate vertices, including a closing vertex that
/// repeats the first one.
#[must_use]
pub fn dedup_closed(points: &[Point3]) -> Vec<Point3> {
    let mut out: Vec<Point3> = Vec::with_capacity(points.len());
    for &pt in points {
        let repeats = out
            .last()
            .is_some_and(|last| (last.x - pt.x).abs() < TOLERANCE && (last.y - pt.y).abs() < TOLERANCE);
        if !repeats {
            out.push(pt);
        }
    }
    while out.len() > 1 {
        let (first, last) = (out[0], out[out.len() - 1]);
        if (first.x - last.x).abs() < TOLERANCE && (first.y - last.y).abs() < TOLERANCE {
            out.pop();
        } else {
            break;
        }
    }
    out
}

/// Even-odd test of `pt` against a closed polygon in the XY plane. Points on
/// the boundary may land either side.
#[must_use]
pub fn contains_point_2d(points: &[Point3], pt: &Point3) -> bool {
    let n = points.len();
    let mut inside = false;
    let mut j = n.wrapping_sub(1);
    for i in 0..n {
        let (a, b) = (&points[i], &points[j]);
        if (a.y > pt.y) != (b.y > pt.y) {
            let x = a.x + (pt.y - a.y) / (b.y - a.y) * (b.x - a.x);
            if pt.x < x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Returns `true` if every coordinate of every point is finite.
#[must_use]
pub fn all_finite(points: &[Point3]) -> bool {
    points
        .iter()
        .all(|p| p.x.is_finite() && p.y.is_finite() && p.z.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_point_in_square() {
        let pts = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(2.0, 2.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
        ];
        assert!(contains_point_2d(&pts, &Point3::new(1.0, 1.0, 0.0)));
        assert!(!contains_point_2d(&pts, &Point3::new(3.0, 1.0, 0.0)));
    }

    #[test]
    fn signed_area_ccw_square() {
        let pts = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let area = signed_area_2d(&pts);
        assert!((area - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn signed_area_cw_square() {
        let pts = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
        ];
        let area = signed_area_2d(&pts);
        assert!((area + 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn signed_area_degenerate() {
        assert!((signed_area_2d(&[Point3::new(0.0, 0.0, 0.0)])).abs() < TOLERANCE);
        assert!((signed_area_2d(&[])).abs() < TOLERANCE);
    }

    #[test]
    fn canonical_start_rotation() {
        let pts = vec![
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 0.0),
        ];
        let rotated = rotate_to_canonical_start(&pts);
        assert!((rotated[0].x).abs() < TOLERANCE);
        assert!((rotated[0].y).abs() < TOLERANCE);
        assert_eq!(rotated.len(), 4);
    }

    #[test]
    fn dedup_removes_closing_vertex() {
        let pts = vec![
            Point3::new(0.0, 0.0, 2.0),
            Point3::new(1.0, 0.0, 2.0),
            Point3::new(1.0, 0.0, 2.0),
            Point3::new(1.0, 1.0, 2.0),
            Point3::new(0.0, 0.0, 2.0),
        ];
        assert_eq!(dedup_closed(&pts).len(), 3);
    }

    #[test]
    fn finite_check() {
        assert!(all_finite(&[Point3::new(0.0, 1.0, 2.0)]));
        assert!(!all_finite(&[Point3::new(f64::NAN, 1.0, 2.0)]));
    }
}
