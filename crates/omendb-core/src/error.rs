//! Error types for `OmenDB` core operations.
//!
//! A single tagged enum covers every failure the engine can report. Error
//! codes follow the pattern `OMEN-XXX` and are stable across releases so
//! callers and language bindings can match on them.

use thiserror::Error;

/// Result type alias for `OmenDB` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in `OmenDB` operations.
///
/// Input faults are rejected before any state mutation: a failed operation
/// leaves the index unchanged.
#[derive(Error, Debug)]
pub enum Error {
    /// Operation attempted before `init` (OMEN-001).
    #[error("[OMEN-001] Index not initialized")]
    NotInitialized,

    /// Vector dimension mismatch (OMEN-002).
    #[error("[OMEN-002] Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },

    /// Arena or id-space capacity exhausted (OMEN-003).
    #[error("[OMEN-003] Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Invalid input vector or argument (OMEN-004).
    #[error("[OMEN-004] Invalid input: {0}")]
    InvalidInput(String),

    /// Id already present in the index (OMEN-005).
    #[error("[OMEN-005] Duplicate id '{0}'")]
    DuplicateId(String),

    /// Id not found on delete/get (OMEN-006).
    #[error("[OMEN-006] Id '{0}' not found")]
    IdNotFound(String),

    /// IO error from the persistence layer (OMEN-007).
    #[error("[OMEN-007] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Corrupt checkpoint file (OMEN-008).
    #[error("[OMEN-008] Corrupt checkpoint: {0}")]
    Corrupt(String),

    /// Invalid configuration (OMEN-009).
    #[error("[OMEN-009] Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns the stable error code (e.g., "OMEN-001").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotInitialized => "OMEN-001",
            Self::DimensionMismatch { .. } => "OMEN-002",
            Self::CapacityExceeded(_) => "OMEN-003",
            Self::InvalidInput(_) => "OMEN-004",
            Self::DuplicateId(_) => "OMEN-005",
            Self::IdNotFound(_) => "OMEN-006",
            Self::Io(_) => "OMEN-007",
            Self::Corrupt(_) => "OMEN-008",
            Self::Config(_) => "OMEN-009",
        }
    }

    /// Returns true if the index is still usable after this error.
    ///
    /// Corruption reported during recovery leaves the in-memory index empty
    /// but structurally sound; every other error leaves it unchanged.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Corrupt(_))
    }
}
