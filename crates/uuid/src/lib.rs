//! Identifier types for notefs resources.
//!
//! notefs hands out two kinds of opaque identifiers, both UUID-backed and both rendered in a
//! *canonical* form: **32 lowercase hexadecimal characters** (no hyphens).
//!
//! - [`ExternalId`]: the immutable, globally unique identifier of a cluster, directory or file.
//!   Callers address resources exclusively through it.
//! - [`VersionMarker`]: the token stored on a file and regenerated on every content update.
//!   Pre-update archive snapshots are keyed by it, so it also appears in archive file names.
//!
//! ## Canonical form
//! - Length: 32
//! - Characters: `0-9` and `a-f` only
//! - Example: `550e8400e29b41d4a716446655440000`
//!
//! Externally supplied identifiers must already be canonical; hyphenated or uppercase input
//! is rejected rather than normalised.

mod service;

pub use service::{ExternalId, Uuid, VersionMarker};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type UuidResult<T> = Result<T, UuidError>;
