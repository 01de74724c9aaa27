//! Derived structures that are rebuilt from a stored expression whenever one
//! of their sources changes.

pub mod controller;
pub mod flight;
pub mod graph;
pub mod json_store;
pub mod store;

pub use controller::{
    CreateOutcome, CreateSuperstructure, Definition, RegenerationController, RegenerationOutcome,
    RegenerationReport, TargetSpec,
};
pub use flight::{FlightTable, RegenerationState};
pub use graph::DependencyGraph;
pub use json_store::JsonStore;
pub use store::{CleanupReport, MemoryStore, SuperstructureStore};

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::operations::OperationType;
use crate::structure::RoiNumber;

/// Unique identifier of a superstructure record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SuperstructureId(pub Uuid);

impl SuperstructureId {
    /// Generates a fresh random identifier.
    #[must_use]
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SuperstructureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A persisted derived-structure definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Superstructure {
    pub id: SuperstructureId,
    pub structure_set_id: String,
    /// The structure whose contours this record produces.
    pub target_roi_number: RoiNumber,
    /// Source structures in order of first use, without repeats.
    pub source_roi_numbers: Vec<RoiNumber>,
    /// Names of the sources, index-aligned with `source_roi_numbers`.
    pub source_names: Vec<String>,
    /// The expression, stored exactly as written.
    pub operation_expression: String,
    pub operation_type: OperationType,
    pub auto_update: bool,
    pub created_at: SystemTime,
    pub last_updated: SystemTime,
}

/// The fields of a superstructure supplied by its creator; the store assigns
/// the id and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSuperstructure {
    pub structure_set_id: String,
    pub target_roi_number: RoiNumber,
    pub source_roi_numbers: Vec<RoiNumber>,
    pub source_names: Vec<String>,
    pub operation_expression: String,
    pub operation_type: OperationType,
    pub auto_update: bool,
}
