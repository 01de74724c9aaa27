//! Slice-by-slice boolean algebra over planar contour stacks, and derived
//! structures that regenerate when their sources change.

pub mod clipping;
pub mod config;
pub mod error;
pub mod math;
pub mod operations;
pub mod structure;
pub mod superstructure;

pub use clipping::{BooleanOp, CavalierClipper, ClipPrimitive, OffsetPrimitive};
pub use config::AlgebraConfig;
pub use error::{AlgebraError, Error, PersistenceError, RegistryError, Result};
pub use operations::{Expression, OperationType, Pipeline, PipelineStep, SliceMap, SliceOutcome};
pub use structure::{Contour, Polygon, RoiNumber, Rgb, Structure, StructureSet, StructureStore};
pub use superstructure::{
    RegenerationController, Superstructure, SuperstructureId, SuperstructureStore,
};
