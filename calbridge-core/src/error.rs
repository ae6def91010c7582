//! Error types for the calbridge translation engine.

use chrono::NaiveDate;
use thiserror::Error;

/// Errors that abort a mapping call.
///
/// Degraded-but-successful mappings never produce one of these; they are
/// reported through the [`MappingLogger`](crate::logging::MappingLogger).
#[derive(Error, Debug)]
pub enum CalBridgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("ICS parse error: {0}")]
    IcsParse(String),

    #[error("ICS generation error: {0}")]
    IcsGenerate(String),

    #[error("Recurrence error: {0}")]
    Recurrence(String),

    #[error("Master event missing: {0}")]
    MasterEventMissing(String),

    #[error("Timezone lookup failed for '{tzid}': {message}")]
    TimezoneLookup { tzid: String, message: String },

    #[error("Host item error: {0}")]
    Host(#[from] HostError),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for calbridge operations.
pub type CalBridgeResult<T> = Result<T, CalBridgeError>;

/// Failures raised by the host item model when an occurrence-level
/// operation violates one of its constraints.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("item has no recurrence pattern")]
    NotRecurring,

    #[error("recurrence pattern changed; the item must be saved and reloaded first")]
    NotMaterialized,

    #[error("no occurrence on {0}")]
    OccurrenceNotFound(NaiveDate),

    #[error("occurrence on {0} has been deleted")]
    OccurrenceDeleted(NaiveDate),

    #[error("cannot move the occurrence of {original} to {target}: it would skip over another occurrence")]
    OccurrenceSkipped {
        original: NaiveDate,
        target: NaiveDate,
    },

    #[error("invalid recurrence pattern: {0}")]
    InvalidPattern(String),

    #[error("save failed: {0}")]
    Save(String),
}
