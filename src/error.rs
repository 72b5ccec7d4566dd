use thiserror::Error;

use crate::diagnosis::image_prep::IntakeError;
use crate::persistence::StorageError;
use crate::store::StoreError;

/// Top-level error for application entry points.
#[derive(Debug, Error)]
pub enum AgriEdgeError {
    #[error("Intake error: {0}")]
    Intake(#[from] IntakeError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Usage(String),
}

impl From<AgriEdgeError> for String {
    fn from(err: AgriEdgeError) -> Self {
        err.to_string()
    }
}
