use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{PersistenceError, Result};
use crate::structure::RoiNumber;

use super::store::{CleanupReport, RecordTable, SuperstructureStore};
use super::{NewSuperstructure, Superstructure, SuperstructureId};

/// Superstructure records persisted to a single JSON document.
///
/// Every mutation rewrites the document through a temporary sibling file and
/// a rename, so a crash never leaves a half-written file behind.
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    table: Mutex<RecordTable>,
}

impl JsonStore {
    /// Opens the store at `path`, starting empty if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError` if the file exists but cannot be read or
    /// parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let table = if path.exists() {
            let bytes = fs::read(&path).map_err(PersistenceError::from)?;
            serde_json::from_slice(&bytes).map_err(PersistenceError::from)?
        } else {
            RecordTable::default()
        };
        debug!(path = %path.display(), "opened superstructure store");
        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    /// Location of the backing document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, table: &RecordTable) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(table).map_err(PersistenceError::from)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, bytes).map_err(PersistenceError::from)?;
        fs::rename(&tmp, &self.path).map_err(PersistenceError::from)?;
        Ok(())
    }

    /// Applies `f` to a copy of the table and commits it only once written.
    fn mutate<T>(&self, f: impl FnOnce(&mut RecordTable) -> Result<T>) -> Result<T> {
        let mut table = self.table.lock();
        let mut next = table.clone();
        let value = f(&mut next)?;
        self.persist(&next)?;
        *table = next;
        Ok(value)
    }
}

impl SuperstructureStore for JsonStore {
    fn list(&self, structure_set_id: &str) -> Result<Vec<Superstructure>> {
        Ok(self.table.lock().list(structure_set_id))
    }

    fn get(&self, id: SuperstructureId) -> Result<Option<Superstructure>> {
        Ok(self.table.lock().get(id))
    }

    fn create(&self, record: NewSuperstructure) -> Result<Superstructure> {
        self.mutate(|t| Ok(t.create(record)))
    }

    fn mark_updated(&self, id: SuperstructureId, at: SystemTime) -> Result<()> {
        self.mutate(|t| t.mark_updated(id, at))
    }

    fn delete(&self, id: SuperstructureId) -> Result<()> {
        self.mutate(|t| t.delete(id))
    }

    fn set_auto_update(&self, id: SuperstructureId, enabled: bool) -> Result<()> {
        self.mutate(|t| t.set_auto_update(id, enabled))
    }

    fn cleanup_orphans(
        &self,
        structure_set_id: &str,
        existing: &BTreeSet<RoiNumber>,
    ) -> Result<CleanupReport> {
        self.mutate(|t| Ok(t.cleanup_orphans(structure_set_id, existing)))
    }
}
