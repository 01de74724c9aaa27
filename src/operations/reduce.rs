use crate::clipping::{ClipError, ClipPrimitive};
use crate::structure::Polygon;

/// Canonicalizes possibly-overlapping polygons of one slice into a set of
/// non-overlapping polygons covering the same region.
///
/// Polygons are folded left to right into an accumulator. Each incoming
/// polygon absorbs every accumulator member it overlaps (their union is a
/// single ring); members it does not touch are kept as they are. A union that
/// yields nothing leaves both operands in place.
///
/// Running the reduction on its own output changes neither the polygon count
/// nor the total area.
pub struct UnionReduce {
    polygons: Vec<Polygon>,
}

impl UnionReduce {
    /// Creates a new `UnionReduce` operation.
    #[must_use]
    pub fn new(polygons: Vec<Polygon>) -> Self {
        Self { polygons }
    }

    /// Executes the reduction.
    ///
    /// # Errors
    ///
    /// Returns the primitive's [`ClipError`] if a union fails.
    pub fn execute<C>(self, clipper: &C) -> Result<Vec<Polygon>, ClipError>
    where
        C: ClipPrimitive + ?Sized,
    {
        if self.polygons.len() <= 1 {
            return Ok(self.polygons);
        }

        let mut incoming = self.polygons.into_iter().filter(|p| !p.is_degenerate());
        let Some(first) = incoming.next() else {
            return Ok(Vec::new());
        };

        let mut acc = vec![first];
        for polygon in incoming {
            let mut merged = polygon;
            let mut kept = Vec::with_capacity(acc.len() + 1);
            for member in acc {
                let mut union = clipper.union(&member, &merged)?;
                if union.len() == 1 {
                    if let Some(single) = union.pop() {
                        merged = single;
                    }
                } else {
                    kept.push(member);
                }
            }
            kept.push(merged);
            acc = kept;
        }
        Ok(acc)
    }
}
