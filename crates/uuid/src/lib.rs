//! Canonical record identifiers.
//!
//! Every OpenCare record is keyed by an opaque identifier in a single *canonical* form:
//! **32 lowercase hexadecimal characters** (no hyphens), for example
//! `550e8400e29b41d4a716446655440000`.
//!
//! - [`RecordId::new`] allocates a fresh identifier (UUID v4).
//! - [`RecordId::parse`] validates an externally supplied identifier. Non-canonical values
//!   (uppercase, hyphenated, wrong length, non-hex) are rejected rather than normalised, so a
//!   record can only ever be addressed by one spelling.

mod record_id;

pub use record_id::{RecordId, Uuid};

/// Error type for identifier operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type UuidResult<T> = Result<T, UuidError>;
