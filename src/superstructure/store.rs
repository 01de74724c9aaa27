use std::collections::{BTreeMap, BTreeSet};
use std::time::SystemTime;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{RegistryError, Result};
use crate::structure::RoiNumber;

use super::{NewSuperstructure, Superstructure, SuperstructureId};

/// Result of an orphan cleanup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub cleaned_count: usize,
}

/// Persistence boundary for superstructure records.
pub trait SuperstructureStore: Send + Sync {
    /// Records of one structure set, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn list(&self, structure_set_id: &str) -> Result<Vec<Superstructure>>;

    /// Looks a record up by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn get(&self, id: SuperstructureId) -> Result<Option<Superstructure>>;

    /// Stores a new record, assigning its id and timestamps.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn create(&self, record: NewSuperstructure) -> Result<Superstructure>;

    /// Sets `last_updated` after a successful regeneration.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` for an unknown id.
    fn mark_updated(&self, id: SuperstructureId, at: SystemTime) -> Result<()>;

    /// Deletes a record.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` for an unknown id.
    fn delete(&self, id: SuperstructureId) -> Result<()>;

    /// Enables or disables automatic regeneration.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` for an unknown id.
    fn set_auto_update(&self, id: SuperstructureId, enabled: bool) -> Result<()>;

    /// Removes every record of the structure set whose target is not in
    /// `existing`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn cleanup_orphans(
        &self,
        structure_set_id: &str,
        existing: &BTreeSet<RoiNumber>,
    ) -> Result<CleanupReport>;
}

/// Record table shared by the store implementations.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct RecordTable {
    records: BTreeMap<SuperstructureId, Superstructure>,
}

impl RecordTable {
    pub(crate) fn list(&self, structure_set_id: &str) -> Vec<Superstructure> {
        let mut out: Vec<Superstructure> = self
            .records
            .values()
            .filter(|r| r.structure_set_id == structure_set_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        out
    }

    pub(crate) fn get(&self, id: SuperstructureId) -> Option<Superstructure> {
        self.records.get(&id).cloned()
    }

    pub(crate) fn create(&mut self, record: NewSuperstructure) -> Superstructure {
        let now = SystemTime::now();
        let record = Superstructure {
            id: SuperstructureId::new_v4(),
            structure_set_id: record.structure_set_id,
            target_roi_number: record.target_roi_number,
            source_roi_numbers: record.source_roi_numbers,
            source_names: record.source_names,
            operation_expression: record.operation_expression,
            operation_type: record.operation_type,
            auto_update: record.auto_update,
            created_at: now,
            last_updated: now,
        };
        self.records.insert(record.id, record.clone());
        record
    }

    fn record_mut(&mut self, id: SuperstructureId) -> Result<&mut Superstructure> {
        Ok(self
            .records
            .get_mut(&id)
            .ok_or(RegistryError::NotFound(id))?)
    }

    pub(crate) fn mark_updated(&mut self, id: SuperstructureId, at: SystemTime) -> Result<()> {
        self.record_mut(id)?.last_updated = at;
        Ok(())
    }

    pub(crate) fn delete(&mut self, id: SuperstructureId) -> Result<()> {
        self.records
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RegistryError::NotFound(id).into())
    }

    pub(crate) fn set_auto_update(&mut self, id: SuperstructureId, enabled: bool) -> Result<()> {
        self.record_mut(id)?.auto_update = enabled;
        Ok(())
    }

    pub(crate) fn cleanup_orphans(
        &mut self,
        structure_set_id: &str,
        existing: &BTreeSet<RoiNumber>,
    ) -> CleanupReport {
        let before = self.records.len();
        self.records.retain(|_, r| {
            r.structure_set_id != structure_set_id || existing.contains(&r.target_roi_number)
        });
        let cleaned_count = before - self.records.len();
        if cleaned_count > 0 {
            info!(structure_set_id, cleaned_count, "removed orphaned superstructures");
        }
        CleanupReport { cleaned_count }
    }
}

/// Superstructure records held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    table: RwLock<RecordTable>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SuperstructureStore for MemoryStore {
    fn list(&self, structure_set_id: &str) -> Result<Vec<Superstructure>> {
        Ok(self.table.read().list(structure_set_id))
    }

    fn get(&self, id: SuperstructureId) -> Result<Option<Superstructure>> {
        Ok(self.table.read().get(id))
    }

    fn create(&self, record: NewSuperstructure) -> Result<Superstructure> {
        Ok(self.table.write().create(record))
    }

    fn mark_updated(&self, id: SuperstructureId, at: SystemTime) -> Result<()> {
        self.table.write().mark_updated(id, at)
    }

    fn delete(&self, id: SuperstructureId) -> Result<()> {
        self.table.write().delete(id)
    }

    fn set_auto_update(&self, id: SuperstructureId, enabled: bool) -> Result<()> {
        self.table.write().set_auto_update(id, enabled)
    }

    fn cleanup_orphans(
        &self,
        structure_set_id: &str,
        existing: &BTreeSet<RoiNumber>,
    ) -> Result<CleanupReport> {
        Ok(self.table.write().cleanup_orphans(structure_set_id, existing))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use crate::error::Error;
    use crate::operations::OperationType;

    pub(crate) fn new_record(set: &str, target: RoiNumber, sources: &[RoiNumber]) -> NewSuperstructure {
        NewSuperstructure {
            structure_set_id: set.to_owned(),
            target_roi_number: target,
            source_roi_numbers: sources.to_vec(),
            source_names: sources.iter().map(|r| format!("S{r}")).collect(),
            operation_expression: "S1 ∪ S2".to_owned(),
            operation_type: OperationType::Union,
            auto_update: true,
        }
    }

    #[test]
    fn create_assigns_id_and_timestamps() {
        let store = MemoryStore::new();
        let record = store.create(new_record("ss", 3, &[1, 2])).unwrap();
        assert_eq!(record.created_at, record.last_updated);
        assert_eq!(store.get(record.id).unwrap(), Some(record));
    }

    #[test]
    fn list_filters_by_structure_set() {
        let store = MemoryStore::new();
        store.create(new_record("ss", 3, &[1, 2])).unwrap();
        store.create(new_record("other", 3, &[1, 2])).unwrap();
        assert_eq!(store.list("ss").unwrap().len(), 1);
    }

    #[test]
    fn cleanup_removes_records_with_missing_targets() {
        let store = MemoryStore::new();
        store.create(new_record("ss", 3, &[1, 2])).unwrap();
        store.create(new_record("ss", 4, &[1, 2])).unwrap();
        store.create(new_record("other", 4, &[1, 2])).unwrap();
        let existing: BTreeSet<RoiNumber> = [1, 2, 3].into_iter().collect();
        let report = store.cleanup_orphans("ss", &existing).unwrap();
        assert_eq!(report.cleaned_count, 1);
        let left = store.list("ss").unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].target_roi_number, 3);
        assert_eq!(store.list("other").unwrap().len(), 1);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let store = MemoryStore::new();
        let id = SuperstructureId::new_v4();
        assert!(matches!(
            store.delete(id),
            Err(Error::Registry(RegistryError::NotFound(_)))
        ));
        assert!(store.set_auto_update(id, false).is_err());
        assert!(store.get(id).unwrap().is_none());
    }
}
