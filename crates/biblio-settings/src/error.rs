//! Error types for settings operations.

use std::error::Error;

use thiserror::Error;

/// A single field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    /// Wire name of the offending field.
    pub field: &'static str,
    /// Offending value when printable.
    pub value: Option<String>,
    /// Machine-readable reason for the failure.
    pub reason: &'static str,
}

/// Primary error type for settings operations.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// One or more patch fields were rejected; nothing was written.
    #[error("settings validation failed")]
    Validation {
        /// Every violation found in the patch.
        violations: Vec<FieldViolation>,
    },
    /// The record already exists; raised by `insert` only.
    #[error("settings record already exists")]
    Duplicate,
    /// The storage backend failed.
    #[error("settings storage unavailable")]
    StorageUnavailable {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The stored record could not be mapped into the domain model.
    #[error("stored settings record is corrupt")]
    CorruptRecord {
        /// Wire name of the unreadable field.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
}

/// Coarse classification of [`SettingsError`] for callers that map errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsErrorKind {
    /// Caller supplied invalid values.
    Validation,
    /// Record already exists.
    Duplicate,
    /// Backend failure.
    StorageUnavailable,
    /// Stored data is unreadable.
    CorruptRecord,
}

impl SettingsError {
    /// Classification of the error.
    #[must_use]
    pub const fn kind(&self) -> SettingsErrorKind {
        match self {
            Self::Validation { .. } => SettingsErrorKind::Validation,
            Self::Duplicate => SettingsErrorKind::Duplicate,
            Self::StorageUnavailable { .. } => SettingsErrorKind::StorageUnavailable,
            Self::CorruptRecord { .. } => SettingsErrorKind::CorruptRecord,
        }
    }

    /// Whether repeating the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable { .. })
    }

    /// Violations carried by a validation failure; empty for other kinds.
    #[must_use]
    pub fn violations(&self) -> &[FieldViolation] {
        match self {
            Self::Validation { violations } => violations,
            _ => &[],
        }
    }

    pub(crate) fn storage(
        operation: &'static str,
        source: impl Error + Send + Sync + 'static,
    ) -> Self {
        Self::StorageUnavailable {
            operation,
            source: Box::new(source),
        }
    }
}

/// The record vanished between a conflicting insert and the follow-up read.
#[derive(Debug, Error)]
#[error("settings record missing after conflicting insert")]
pub struct MissingAfterConflict;

/// Convenience alias for settings results.
pub type SettingsResult<T> = Result<T, SettingsError>;
