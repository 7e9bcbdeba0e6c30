//! Incident lifecycle: `open -> acknowledged -> resolved`, or straight from
//! `open` to `resolved`. `resolved` is terminal.

pub mod lifecycle;
pub mod tracker;


pub use tracker::{IncidentTracker, OpenOutcome};

use thiserror::Error;
use uuid::Uuid;

use crate::database::StorageError;

#[derive(Debug, Error)]
pub enum IncidentError {
    #[error("Incident {0} is already resolved")]
    AlreadyResolved(Uuid),

    #[error("Incident not found: {0}")]
    NotFound(Uuid),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
