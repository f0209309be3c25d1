//! Error types for the warrant engine.
//!
//! The [`Error`] enum provides structured, matchable error variants covering
//! input validation, schema mismatches, revision-window violations, read-only
//! policy rejections, and unexpected datastore failures.
//!
//! ## Canonical Status Code Mapping
//!
//! | Code | Meaning |
//! |------|---------|
//! | `INVALID_ARGUMENT` | Malformed reference, filter, or update shape |
//! | `FAILED_PRECONDITION` | Unknown namespace/relation, schema violation, missing precondition relationship |
//! | `OUT_OF_RANGE` | Revision outside the garbage-collection window or past the head |
//! | `INTERNAL` | Unexpected datastore failure |
//!
//! A read-only rejection is its own [`Error`] variant in-process; on the wire
//! it maps to `FAILED_PRECONDITION` (the canonical code set has no read-only
//! code).

/// Canonical status codes, numbered to match their gRPC equivalents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    /// The operation completed successfully.
    Ok = 0,
    /// The caller supplied a malformed argument.
    InvalidArgument = 3,
    /// The system is not in a state required for the operation.
    FailedPrecondition = 9,
    /// A revision outside the readable window was requested.
    OutOfRange = 11,
    /// An unexpected internal failure.
    Internal = 13,
}

/// Errors returned by the warrant engine.
///
/// All public methods return `Result<T, Error>`. Use pattern matching to
/// handle specific failure modes, or [`Error::code`] to map onto a canonical
/// status code at a transport boundary.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Local validation failures: empty or oversized identifiers, an unmarked
    /// filter field carrying a value, an empty update list.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Schema or state mismatches: an unknown namespace or relation, a subject
    /// type the schema does not admit, or a write precondition that did not
    /// hold at the pre-write snapshot.
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// The requested revision is older than the garbage-collection window or
    /// newer than the observed head.
    #[error("revision out of range: {0}")]
    OutOfRange(String),

    /// A mutation was attempted against a read-only datastore.
    #[error("datastore is read-only: {operation} rejected")]
    ReadOnly {
        /// The rejected operation's name.
        operation: &'static str,
    },

    /// An unexpected datastore failure.
    #[error("internal error: {reason}")]
    Internal {
        /// Human-readable description of the failure.
        reason: String,
        /// The underlying cause, when one is available.
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Returns the canonical status code for this error.
    ///
    /// `ReadOnly` maps to [`Code::FailedPrecondition`]; everything else maps
    /// onto its namesake.
    pub fn code(&self) -> Code {
        match self {
            Error::InvalidArgument(_) => Code::InvalidArgument,
            Error::FailedPrecondition(_) | Error::ReadOnly { .. } => Code::FailedPrecondition,
            Error::OutOfRange(_) => Code::OutOfRange,
            Error::Internal { .. } => Code::Internal,
        }
    }

    pub(crate) fn internal(reason: impl Into<String>) -> Self {
        Error::Internal {
            reason: reason.into(),
            cause: None,
        }
    }
}
