use tracing::warn;

use crate::clipping::{ClipError, ClipPrimitive, OffsetPrimitive};
use crate::config::AlgebraConfig;
use crate::structure::Polygon;

use super::reduce::UnionReduce;
use super::slice_index::SliceMap;
use super::{map_slices, SliceOutcome};

/// Grows (positive distance) or shrinks (negative distance) every polygon of
/// a slice map within its slice plane, then union-reduces each slice.
pub struct ApplyMargin<'a> {
    map: &'a SliceMap,
    distance: f64,
    config: AlgebraConfig,
}

impl<'a> ApplyMargin<'a> {
    /// Creates a new `ApplyMargin` operation; `distance` is in millimetres.
    #[must_use]
    pub fn new(map: &'a SliceMap, distance: f64) -> Self {
        Self {
            map,
            distance,
            config: AlgebraConfig::default(),
        }
    }

    /// Sets the evaluation configuration.
    #[must_use]
    pub fn with_config(mut self, config: AlgebraConfig) -> Self {
        self.config = config;
        self
    }

    /// Executes the margin.
    pub fn execute<C>(&self, clipper: &C) -> SliceOutcome
    where
        C: ClipPrimitive + OffsetPrimitive + ?Sized,
    {
        let distance = self.distance;
        let work: Vec<(f64, Vec<Polygon>)> = self
            .map
            .iter()
            .map(|e| (e.position, e.polygons.clone()))
            .collect();
        let results = map_slices(work, self.config.parallel, |(key, polygons)| {
            (key, offset_slice(&polygons, distance, clipper))
        });

        let mut outcome = SliceOutcome::default();
        for (key, result) in results {
            match result {
                Ok(polygons) => outcome.slices.insert(key, polygons),
                Err(e) => {
                    warn!(slice = key, distance, error = %e, "skipping slice after offset failure");
                    outcome.skipped.push(key);
                }
            }
        }
        outcome
    }
}

fn offset_slice<C>(polygons: &[Polygon], distance: f64, clipper: &C) -> Result<Vec<Polygon>, ClipError>
where
    C: ClipPrimitive + OffsetPrimitive + ?Sized,
{
    let reduced = UnionReduce::new(polygons.to_vec()).execute(clipper)?;
    let mut grown = Vec::with_capacity(reduced.len());
    for polygon in &reduced {
        grown.extend(clipper.offset(polygon, distance)?);
    }
    UnionReduce::new(grown).execute(clipper)
}
