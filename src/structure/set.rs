use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{RegistryError, Result};

use super::{Contour, RoiNumber, Rgb, Structure};

/// Read and write access to the live structures of one structure set.
///
/// Writers that replace a structure's contours must hold that structure's
/// write lock from [`StructureStore::roi_lock`] for the duration of the write.
pub trait StructureStore: Send + Sync {
    /// Identifier of the structure set.
    fn structure_set_id(&self) -> &str;

    /// Returns a snapshot of the structure with the given ROI number.
    fn structure(&self, roi: RoiNumber) -> Option<Structure>;

    /// Returns a snapshot of the first structure with the given name.
    fn find_by_name(&self, name: &str) -> Option<Structure>;

    /// ROI numbers of all existing structures.
    fn roi_numbers(&self) -> BTreeSet<RoiNumber>;

    /// The write lock scoped to one ROI number.
    fn roi_lock(&self, roi: RoiNumber) -> Arc<Mutex<()>>;

    /// Replaces all contours of a structure in one step. The caller holds the
    /// ROI's write lock.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::TargetMissing` if the structure does not exist.
    fn write_contours(&self, roi: RoiNumber, contours: Vec<Contour>) -> Result<()>;

    /// The ROI number a new structure would get: one past the largest in use.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::RoiNumbersExhausted` if the largest is
    /// `RoiNumber::MAX`.
    fn next_roi_number(&self) -> Result<RoiNumber>;

    /// Creates the structure if absent (at [`StructureStore::next_roi_number`]
    /// when `roi` is `None`), otherwise updates its name and color in place.
    /// Returns the ROI number.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::RoiNumbersExhausted` if no new ROI number is
    /// available.
    fn ensure_structure(&self, roi: Option<RoiNumber>, name: &str, color: Rgb) -> Result<RoiNumber>;

    /// Takes the ROI's write lock and replaces its contours.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::TargetMissing` if the structure does not exist.
    fn replace_contours(&self, roi: RoiNumber, contours: Vec<Contour>) -> Result<()> {
        let lock = self.roi_lock(roi);
        let _guard = lock.lock();
        self.write_contours(roi, contours)
    }
}

/// In-memory structure set keyed by ROI number.
#[derive(Debug, Default)]
pub struct StructureSet {
    id: String,
    structures: RwLock<BTreeMap<RoiNumber, Structure>>,
    locks: Mutex<HashMap<RoiNumber, Arc<Mutex<()>>>>,
}

impl StructureSet {
    /// Creates an empty structure set.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Inserts or replaces a structure.
    pub fn insert(&self, mut structure: Structure) {
        let contours = std::mem::take(&mut structure.contours);
        structure.set_contours(contours);
        self.structures.write().insert(structure.roi_number, structure);
    }

    /// Removes a structure, returning it if present.
    pub fn remove(&self, roi: RoiNumber) -> Option<Structure> {
        let lock = self.roi_lock(roi);
        let _guard = lock.lock();
        self.structures.write().remove(&roi)
    }

    /// Number of structures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.structures.read().len()
    }

    /// Returns `true` if there are no structures.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.structures.read().is_empty()
    }
}

impl StructureStore for StructureSet {
    fn structure_set_id(&self) -> &str {
        &self.id
    }

    fn structure(&self, roi: RoiNumber) -> Option<Structure> {
        self.structures.read().get(&roi).cloned()
    }

    fn find_by_name(&self, name: &str) -> Option<Structure> {
        self.structures
            .read()
            .values()
            .find(|s| s.name == name)
            .cloned()
    }

    fn roi_numbers(&self) -> BTreeSet<RoiNumber> {
        self.structures.read().keys().copied().collect()
    }

    fn roi_lock(&self, roi: RoiNumber) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.lock().entry(roi).or_default())
    }

    fn write_contours(&self, roi: RoiNumber, contours: Vec<Contour>) -> Result<()> {
        let mut structures = self.structures.write();
        let structure = structures
            .get_mut(&roi)
            .ok_or(RegistryError::TargetMissing(roi))?;
        structure.set_contours(contours);
        Ok(())
    }

    fn next_roi_number(&self) -> Result<RoiNumber> {
        next_after(&self.structures.read())
    }

    fn ensure_structure(&self, roi: Option<RoiNumber>, name: &str, color: Rgb) -> Result<RoiNumber> {
        let mut structures = self.structures.write();
        let roi = match roi {
            Some(roi) => roi,
            None => next_after(&structures)?,
        };
        structures
            .entry(roi)
            .and_modify(|s| {
                name.clone_into(&mut s.name);
                s.color = color;
            })
            .or_insert_with(|| Structure::new(roi, name, color));
        Ok(roi)
    }
}

fn next_after(structures: &BTreeMap<RoiNumber, Structure>) -> Result<RoiNumber> {
    match structures.keys().next_back() {
        None => Ok(1),
        Some(&max) => Ok(max
            .checked_add(1)
            .ok_or(RegistryError::RoiNumbersExhausted(max))?),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::math::Point3;

    fn triangle(z: f64) -> Contour {
        Contour::new(
            z,
            vec![
                Point3::new(0.0, 0.0, z),
                Point3::new(1.0, 0.0, z),
                Point3::new(0.0, 1.0, z),
            ],
        )
        .unwrap()
    }

    #[test]
    fn new_target_gets_next_roi_number() {
        let set = StructureSet::new("ss");
        set.insert(Structure::new(4, "PTV", Rgb(255, 0, 0)));
        set.insert(Structure::new(9, "CTV", Rgb(0, 255, 0)));
        assert_eq!(set.next_roi_number().unwrap(), 10);
        let roi = set.ensure_structure(None, "PTV_ring", Rgb(0, 0, 255)).unwrap();
        assert_eq!(roi, 10);
        assert_eq!(set.structure(10).unwrap().name, "PTV_ring");
    }

    #[test]
    fn roi_numbers_start_at_one_and_run_out_at_max() {
        let set = StructureSet::new("ss");
        assert_eq!(set.next_roi_number().unwrap(), 1);
        set.insert(Structure::new(RoiNumber::MAX, "last", Rgb(1, 1, 1)));
        assert!(matches!(
            set.ensure_structure(None, "overflow", Rgb(1, 1, 1)),
            Err(crate::error::Error::Registry(RegistryError::RoiNumbersExhausted(RoiNumber::MAX)))
        ));
        assert_eq!(set.len(), 1);
        assert_eq!(set.ensure_structure(Some(7), "explicit", Rgb(1, 1, 1)).unwrap(), 7);
    }

    #[test]
    fn existing_target_updated_in_place() {
        let set = StructureSet::new("ss");
        set.insert(Structure::new(3, "old", Rgb(1, 1, 1)).with_contours(vec![triangle(0.0)]));
        let roi = set.ensure_structure(Some(3), "new", Rgb(2, 2, 2)).unwrap();
        assert_eq!(roi, 3);
        let s = set.structure(3).unwrap();
        assert_eq!(s.name, "new");
        assert_eq!(s.color, Rgb(2, 2, 2));
        assert_eq!(s.contours.len(), 1);
    }

    #[test]
    fn replace_contours_orders_by_slice() {
        let set = StructureSet::new("ss");
        set.insert(Structure::new(1, "A", Rgb(1, 1, 1)));
        set.replace_contours(1, vec![triangle(6.0), triangle(-3.0), triangle(0.0)])
            .unwrap();
        let positions: Vec<f64> = set
            .structure(1)
            .unwrap()
            .contours
            .iter()
            .map(Contour::slice_position)
            .collect();
        assert_eq!(positions, vec![-3.0, 0.0, 6.0]);
    }

    #[test]
    fn replace_contours_on_missing_structure_fails() {
        let set = StructureSet::new("ss");
        assert!(set.replace_contours(7, vec![triangle(0.0)]).is_err());
    }

    #[test]
    fn roi_lock_is_shared_per_roi() {
        let set = StructureSet::new("ss");
        let a = set.roi_lock(2);
        let b = set.roi_lock(2);
        assert!(Arc::ptr_eq(&a, &b));
        let _guard = a.lock();
        assert!(b.try_lock().is_none());
        assert!(set.roi_lock(3).try_lock().is_some());
    }
}
