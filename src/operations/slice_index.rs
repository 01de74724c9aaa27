use crate::structure::{total_area, Polygon, Structure};

/// The polygons sharing one slice key.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceEntry {
    /// Representative slice position (mm).
    pub position: f64,
    pub polygons: Vec<Polygon>,
}

/// Polygons grouped by slice key, ordered by ascending key.
///
/// Built on demand from a structure or produced by an operation; never
/// persisted. Keys with no polygons are never stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SliceMap {
    entries: Vec<SliceEntry>,
}

impl SliceMap {
    /// Creates an empty slice map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Buckets a structure's contours by slice position.
    #[must_use]
    pub fn from_structure(structure: &Structure, tolerance: f64) -> Self {
        Self::bucket(
            structure
                .contours
                .iter()
                .map(|c| (c.slice_position(), c.to_polygon())),
            tolerance,
        )
    }

    /// Groups polygons into tolerance buckets.
    ///
    /// Positions are visited in ascending order. Each joins the first
    /// existing bucket whose key lies within `tolerance`, otherwise it opens
    /// a new bucket keyed by its own position. Keys are never averaged, so
    /// repeated operations do not drift.
    #[must_use]
    pub fn bucket(items: impl IntoIterator<Item = (f64, Polygon)>, tolerance: f64) -> Self {
        let mut items: Vec<(f64, Polygon)> = items.into_iter().collect();
        items.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut entries: Vec<SliceEntry> = Vec::new();
        for (position, polygon) in items {
            match entries
                .iter_mut()
                .find(|e| (e.position - position).abs() < tolerance)
            {
                Some(entry) => entry.polygons.push(polygon),
                None => entries.push(SliceEntry {
                    position,
                    polygons: vec![polygon],
                }),
            }
        }
        Self { entries }
    }

    /// Stores polygons under an exact key, appending if the key exists.
    /// An empty polygon list is ignored.
    pub fn insert(&mut self, position: f64, polygons: Vec<Polygon>) {
        if polygons.is_empty() {
            return;
        }
        match self
            .entries
            .binary_search_by(|e| e.position.total_cmp(&position))
        {
            Ok(i) => self.entries[i].polygons.extend(polygons),
            Err(i) => self.entries.insert(
                i,
                SliceEntry {
                    position,
                    polygons,
                },
            ),
        }
    }

    /// Polygons stored under exactly `position`.
    #[must_use]
    pub fn get(&self, position: f64) -> Option<&[Polygon]> {
        self.entries
            .binary_search_by(|e| e.position.total_cmp(&position))
            .ok()
            .map(|i| self.entries[i].polygons.as_slice())
    }

    /// Slice keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|e| e.position)
    }

    /// Entries in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = &SliceEntry> {
        self.entries.iter()
    }

    /// Number of slice keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no slice holds a polygon.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of polygons across all slices.
    #[must_use]
    pub fn polygon_count(&self) -> usize {
        self.entries.iter().map(|e| e.polygons.len()).sum()
    }

    /// Sum of polygon areas across all slices (mm²).
    #[must_use]
    pub fn total_area(&self) -> f64 {
        self.entries.iter().map(|e| total_area(&e.polygons)).sum()
    }
}

impl IntoIterator for SliceMap {
    type Item = SliceEntry;
    type IntoIter = std::vec::IntoIter<SliceEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Merges the keys of both maps into one ascending list, dropping any key
/// within `tolerance` of an already accepted one.
#[must_use]
pub fn combined_keys(a: &SliceMap, b: &SliceMap, tolerance: f64) -> Vec<f64> {
    let mut all: Vec<f64> = a.keys().chain(b.keys()).collect();
    all.sort_by(f64::total_cmp);

    let mut accepted: Vec<f64> = Vec::with_capacity(all.len());
    for key in all {
        if !accepted.iter().any(|k| (k - key).abs() < tolerance) {
            accepted.push(key);
        }
    }
    accepted
}

/// Distributes a map's polygons over `keys`: each entry goes to its nearest
/// key if that key is within `tolerance`. The result is indexed like `keys`.
#[must_use]
pub fn gather_near(map: &SliceMap, keys: &[f64], tolerance: f64) -> Vec<Vec<Polygon>> {
    let mut gathered: Vec<Vec<Polygon>> = vec![Vec::new(); keys.len()];
    for entry in map.iter() {
        let nearest = keys
            .iter()
            .enumerate()
            .map(|(i, k)| (i, (k - entry.position).abs()))
            .filter(|&(_, d)| d < tolerance)
            .min_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((i, _)) = nearest {
            gathered[i].extend(entry.polygons.iter().cloned());
        }
    }
    gathered
}
