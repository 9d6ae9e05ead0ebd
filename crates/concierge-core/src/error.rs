//! Error types at the core's boundaries
//!
//! Specialist failures never escape a turn as errors: they are captured as a
//! [`FailureRecord`] and turned into fallback text. Registry construction is the
//! only operation that hands a typed error back to the caller.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fallback::classify_failure;

/// Failure taxonomy, in the order categories are checked
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    /// Upstream capacity or rate limit
    ServiceOverloaded,
    /// Network failure or timeout reaching the specialist
    Connectivity,
    /// Credentials rejected by an external dependency
    Authentication,
    /// A retrieval-backed specialist lost its data store
    KnowledgeStoreUnavailable,
    /// The specialist could not transform its input or output
    Processing,
    Unknown,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 6] = [
        ErrorCategory::ServiceOverloaded,
        ErrorCategory::Connectivity,
        ErrorCategory::Authentication,
        ErrorCategory::KnowledgeStoreUnavailable,
        ErrorCategory::Processing,
        ErrorCategory::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServiceOverloaded => "service-overloaded",
            Self::Connectivity => "connectivity",
            Self::Authentication => "authentication",
            Self::KnowledgeStoreUnavailable => "knowledge-store-unavailable",
            Self::Processing => "processing",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A caught specialist failure. `raw_message` is for logs only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{category} failure: {raw_message}")]
pub struct FailureRecord {
    pub category: ErrorCategory,
    pub raw_message: String,
}

impl FailureRecord {
    pub fn new(category: ErrorCategory, raw_message: impl Into<String>) -> Self {
        Self {
            category,
            raw_message: raw_message.into(),
        }
    }

    /// Build a record whose category is derived from the failure text
    pub fn from_raw(raw_message: impl Into<String>) -> Self {
        let raw_message = raw_message.into();
        Self {
            category: classify_failure(&raw_message),
            raw_message,
        }
    }
}

/// Errors raised while building a [`SpecialistRegistry`](crate::registry::SpecialistRegistry)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("specialist registry is empty")]
    Empty,

    #[error("duplicate specialist id '{0}'")]
    DuplicateId(String),

    #[error("specialist id must not be empty")]
    EmptyId,

    #[error("no default specialist was designated")]
    NoDefault,

    #[error("default specialist '{0}' is not registered")]
    UnknownDefault(String),
}
