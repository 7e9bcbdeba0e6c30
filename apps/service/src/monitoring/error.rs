use thiserror::Error;
use uuid::Uuid;

use crate::database::StorageError;
use crate::incidents::IncidentError;

/// Errors that abort the check of a single monitor
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Monitor not found: {0}")]
    MonitorNotFound(Uuid),

    #[error("Monitor {0} is paused")]
    MonitorPaused(Uuid),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Incident(#[from] IncidentError),
}
