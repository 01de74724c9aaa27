use thiserror::Error;

use crate::structure::RoiNumber;
use crate::superstructure::SuperstructureId;

/// Top-level error type for the structure algebra engine.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Algebra(#[from] AlgebraError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Errors raised while evaluating boolean algebra over structures.
#[derive(Debug, Error)]
pub enum AlgebraError {
    #[error("structure not found: {name}")]
    StructureNotFound { name: String },

    #[error("malformed expression at {position}: {reason}")]
    MalformedExpression { reason: String, position: usize },

    #[error("invalid contour: {0}")]
    InvalidContour(String),
}

impl AlgebraError {
    pub(crate) fn malformed(reason: impl Into<String>, position: usize) -> Self {
        Self::MalformedExpression {
            reason: reason.into(),
            position,
        }
    }
}

/// Errors related to superstructure bookkeeping.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("superstructure not found: {0}")]
    NotFound(SuperstructureId),

    #[error("target structure {0} does not exist")]
    TargetMissing(RoiNumber),

    #[error("structure {0} cannot be derived from itself")]
    SelfReference(RoiNumber),

    #[error("deriving structure {target} would create a dependency cycle")]
    DependencyCycle { target: RoiNumber },

    #[error("structure {0} is already the target of another superstructure")]
    TargetAlreadyDerived(RoiNumber),

    #[error("no ROI number left above {0}")]
    RoiNumbersExhausted(RoiNumber),
}

/// Errors from the superstructure persistence boundary.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Convenience type alias for results using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
