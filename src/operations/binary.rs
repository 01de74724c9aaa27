use tracing::warn;

use crate::clipping::{BooleanOp, ClipError, ClipPrimitive};
use crate::config::AlgebraConfig;
use crate::structure::Polygon;

use super::reduce::UnionReduce;
use super::slice_index::{combined_keys, gather_near, SliceMap};
use super::{map_slices, SliceOutcome};

/// Applies one boolean operator between two slice maps, slice by slice.
///
/// For every combined slice key, each side's nearby polygons are union-reduced
/// before the operator runs. A slice on which the primitive fails is left out
/// of the result and reported in [`SliceOutcome::skipped`].
pub struct ApplyBinary<'a> {
    op: BooleanOp,
    a: &'a SliceMap,
    b: &'a SliceMap,
    config: AlgebraConfig,
}

impl<'a> ApplyBinary<'a> {
    /// Creates a new `ApplyBinary` operation with the default configuration.
    #[must_use]
    pub fn new(op: BooleanOp, a: &'a SliceMap, b: &'a SliceMap) -> Self {
        Self {
            op,
            a,
            b,
            config: AlgebraConfig::default(),
        }
    }

    /// Sets the evaluation configuration.
    #[must_use]
    pub fn with_config(mut self, config: AlgebraConfig) -> Self {
        self.config = config;
        self
    }

    /// Executes the operation.
    pub fn execute<C>(&self, clipper: &C) -> SliceOutcome
    where
        C: ClipPrimitive + ?Sized,
    {
        let tolerance = self.config.slice_tolerance;
        let keys = combined_keys(self.a, self.b, tolerance);
        let sides: Vec<(f64, Vec<Polygon>, Vec<Polygon>)> = keys
            .iter()
            .copied()
            .zip(gather_near(self.a, &keys, tolerance))
            .zip(gather_near(self.b, &keys, tolerance))
            .map(|((key, a), b)| (key, a, b))
            .collect();

        let op = self.op;
        let results = map_slices(sides, self.config.parallel, |(key, a, b)| {
            (key, evaluate_slice(op, a, b, clipper))
        });

        let mut outcome = SliceOutcome::default();
        for (key, result) in results {
            match result {
                Ok(polygons) => outcome.slices.insert(key, polygons),
                Err(e) => {
                    warn!(slice = key, op = ?op, error = %e, "skipping slice after clipping failure");
                    outcome.skipped.push(key);
                }
            }
        }
        outcome
    }
}

/// Computes `a op b` for the polygons of one slice key.
fn evaluate_slice<C>(
    op: BooleanOp,
    a: Vec<Polygon>,
    b: Vec<Polygon>,
    clipper: &C,
) -> Result<Vec<Polygon>, ClipError>
where
    C: ClipPrimitive + ?Sized,
{
    if a.is_empty() && b.is_empty() {
        return Ok(Vec::new());
    }
    let a = UnionReduce::new(a).execute(clipper)?;
    let b = UnionReduce::new(b).execute(clipper)?;

    if a.is_empty() {
        return Ok(match op {
            BooleanOp::Union | BooleanOp::Xor => b,
            BooleanOp::Intersect | BooleanOp::Subtract => Vec::new(),
        });
    }
    if b.is_empty() {
        return Ok(match op {
            BooleanOp::Union | BooleanOp::Xor | BooleanOp::Subtract => a,
            BooleanOp::Intersect => Vec::new(),
        });
    }

    // A single primitive call already returns a canonical polygon set.
    if a.len() == 1 && b.len() == 1 {
        return clipper.clip(op, &a[0], &b[0]);
    }

    let combined = match op {
        BooleanOp::Union => a.into_iter().chain(b).collect(),
        BooleanOp::Intersect => {
            let mut out = Vec::new();
            for pa in &a {
                for pb in &b {
                    out.extend(clipper.intersect(pa, pb)?);
                }
            }
            out
        }
        BooleanOp::Subtract => subtract_all(&a, &b, clipper)?,
        BooleanOp::Xor => {
            let mut out = subtract_all(&a, &b, clipper)?;
            out.extend(subtract_all(&b, &a, clipper)?);
            out
        }
    };
    UnionReduce::new(combined).execute(clipper)
}

/// Removes every polygon of `b` from every polygon of `a`.
fn subtract_all<C>(a: &[Polygon], b: &[Polygon], clipper: &C) -> Result<Vec<Polygon>, ClipError>
where
    C: ClipPrimitive + ?Sized,
{
    let mut out = Vec::new();
    for pa in a {
        let mut remaining = vec![pa.clone()];
        for pb in b {
            let mut next = Vec::with_capacity(remaining.len());
            for piece in &remaining {
                next.extend(clipper.subtract(piece, pb)?);
            }
            remaining = next;
            if remaining.is_empty() {
                break;
            }
        }
        out.extend(remaining);
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clipping::CavalierClipper;

    fn circle(cx: f64, z: f64) -> Polygon {
        Polygon::circle(cx, 0.0, 10.0, 64, z)
    }

    fn map(items: Vec<(f64, Polygon)>) -> SliceMap {
        SliceMap::bucket(items, 1.0)
    }

    fn apply(op: BooleanOp, a: &SliceMap, b: &SliceMap) -> SliceOutcome {
        ApplyBinary::new(op, a, b).execute(&CavalierClipper)
    }

    #[test]
    fn union_with_empty_is_identity() {
        let a = map(vec![(0.0, circle(0.0, 0.0))]);
        let empty = SliceMap::new();
        let out = apply(BooleanOp::Union, &a, &empty);
        assert!(out.skipped.is_empty());
        assert!((out.slices.total_area() - a.total_area()).abs() < 1e-9);
    }

    #[test]
    fn intersect_with_empty_is_empty() {
        let a = map(vec![(0.0, circle(0.0, 0.0))]);
        let out = apply(BooleanOp::Intersect, &a, &SliceMap::new());
        assert!(out.slices.is_empty());
    }

    #[test]
    fn subtract_identities() {
        let a = map(vec![(0.0, circle(0.0, 0.0))]);
        let empty = SliceMap::new();
        let kept = apply(BooleanOp::Subtract, &a, &empty);
        assert!((kept.slices.total_area() - a.total_area()).abs() < 1e-9);
        let gone = apply(BooleanOp::Subtract, &empty, &a);
        assert!(gone.slices.is_empty());
    }

    #[test]
    fn empty_slices_are_omitted() {
        let a = map(vec![(0.0, circle(0.0, 0.0)), (3.0, circle(0.0, 3.0))]);
        let b = map(vec![(3.0, circle(50.0, 3.0))]);
        let out = apply(BooleanOp::Intersect, &a, &b);
        assert!(out.slices.is_empty());
        assert!(out.skipped.is_empty());
    }

    #[test]
    fn slices_within_tolerance_are_matched() {
        let a = map(vec![(10.0, circle(0.0, 10.0))]);
        let b = map(vec![(10.4, circle(8.0, 10.4))]);
        let out = apply(BooleanOp::Intersect, &a, &b);
        assert_eq!(out.slices.keys().collect::<Vec<_>>(), vec![10.0]);
        let area = out.slices.total_area();
        assert!(area > 0.0 && area < 314.0, "got {area}");
    }

    #[test]
    fn subtract_removes_every_operand_polygon() {
        let a = map(vec![(0.0, Polygon::rectangle(0.0, 0.0, 10.0, 2.0, 0.0))]);
        let b = map(vec![
            (0.0, Polygon::rectangle(-1.0, -1.0, 2.0, 3.0, 0.0)),
            (0.0, Polygon::rectangle(8.0, -1.0, 11.0, 3.0, 0.0)),
        ]);
        let out = apply(BooleanOp::Subtract, &a, &b);
        assert!((out.slices.total_area() - 12.0).abs() < 1e-6);
    }

    #[test]
    fn xor_matches_union_minus_intersect() {
        let a = map(vec![
            (0.0, circle(0.0, 0.0)),
            (0.0, Polygon::circle(40.0, 0.0, 5.0, 48, 0.0)),
        ]);
        let b = map(vec![(0.0, circle(8.0, 0.0))]);
        let xor = apply(BooleanOp::Xor, &a, &b).slices.total_area();
        let union = apply(BooleanOp::Union, &a, &b).slices.total_area();
        let intersect = apply(BooleanOp::Intersect, &a, &b).slices.total_area();
        assert!((xor - (union - intersect)).abs() < 1e-2 * union, "{xor} vs {}", union - intersect);
    }

    #[test]
    fn contained_operand_leaves_a_hole() {
        let big = Polygon::circle(0.0, 0.0, 20.0, 64, 0.0);
        let a = map(vec![(0.0, big.clone())]);
        let b = map(vec![(0.0, circle(2.0, 0.0))]);
        let subtract = apply(BooleanOp::Subtract, &a, &b).slices.total_area();
        let xor = apply(BooleanOp::Xor, &a, &b).slices.total_area();
        let union = apply(BooleanOp::Union, &a, &b).slices.total_area();
        let intersect = apply(BooleanOp::Intersect, &a, &b).slices.total_area();
        assert!(subtract < big.area() - 300.0, "got {subtract}");
        assert!((xor - (union - intersect)).abs() < 1e-2 * union, "{xor} vs {}", union - intersect);
    }

    struct Failing;

    impl ClipPrimitive for Failing {
        fn clip(&self, _: BooleanOp, a: &Polygon, _: &Polygon) -> Result<Vec<Polygon>, ClipError> {
            if a.plane_z() == Some(5.0) {
                Err(ClipError("boom".to_owned()))
            } else {
                Ok(vec![a.clone()])
            }
        }
    }

    #[test]
    fn failing_slice_is_skipped_not_fatal() {
        let a = map(vec![(0.0, circle(0.0, 0.0)), (5.0, circle(0.0, 5.0))]);
        let b = map(vec![(0.0, circle(8.0, 0.0)), (5.0, circle(8.0, 5.0))]);
        let out = ApplyBinary::new(BooleanOp::Intersect, &a, &b)
            .with_config(AlgebraConfig::default().with_parallel(false))
            .execute(&Failing);
        assert_eq!(out.skipped, vec![5.0]);
        assert_eq!(out.slices.keys().collect::<Vec<_>>(), vec![0.0]);
    }
}
