//! Error types for the resource database.

use crate::types::{ResourceTypeId, Rid};
use std::fmt;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in resource database operations.
///
/// Lookups that simply find nothing return `None` instead of an error, and
/// destroying a resource twice is a no-op.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Serialized form could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] resdb_codec::CodecError),

    /// No schema is registered under the requested id or name.
    #[error("resource type not found: {name}")]
    TypeNotFound {
        /// The id or name that was looked up.
        name: String,
    },

    /// The RID has no storage, or no type to build a fresh instance from.
    #[error("resource not found: {rid}")]
    ResourceNotFound {
        /// The RID that was looked up.
        rid: Rid,
    },

    /// The page table has no room for another page.
    #[error("page table exhausted: page {page} exceeds limit of {max_pages}")]
    CapacityExceeded {
        /// Page index that was requested.
        page: usize,
        /// Configured page limit.
        max_pages: usize,
    },

    /// Another writer committed the same resource first.
    ///
    /// The losing copy is discarded; re-`write` and retry to apply it.
    #[error("commit conflict on {rid}: resource changed since write began")]
    CommitConflict {
        /// The contended resource.
        rid: Rid,
    },

    /// Serialized input does not describe a valid resource graph.
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },

    /// The database has been shut down.
    #[error("database is shut down")]
    DatabaseClosed,
}

impl CoreError {
    /// Creates a type-not-found error for a type id.
    pub fn type_not_found(id: ResourceTypeId) -> Self {
        Self::TypeNotFound {
            name: id.to_string(),
        }
    }

    /// Creates a type-not-found error for a type name.
    pub fn type_name_not_found(name: impl Into<String>) -> Self {
        Self::TypeNotFound { name: name.into() }
    }

    /// Creates a resource-not-found error.
    pub fn resource_not_found(rid: Rid) -> Self {
        Self::ResourceNotFound { rid }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }
}

/// Reports misuse of the typed field API.
///
/// Panics in debug builds. Release builds log and let the caller ignore the
/// offending get or set.
#[track_caller]
pub(crate) fn contract_violation(args: fmt::Arguments<'_>) {
    if cfg!(debug_assertions) {
        panic!("contract violation: {args}");
    }
    tracing::warn!("contract violation: {args}");
}
