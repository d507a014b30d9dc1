//! Implementation of the canonical identifier types.

use crate::{UuidError, UuidResult};
use std::{fmt, str::FromStr};

/// Re-exported for convenience.
pub use ::uuid::Uuid;

/// Returns true if `input` is 32 lowercase hex characters.
fn is_canonical(input: &str) -> bool {
    input.len() == 32
        && input
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn parse_canonical(input: &str, what: &str) -> UuidResult<Uuid> {
    if !is_canonical(input) {
        return Err(UuidError::InvalidInput(format!(
            "{what} must be 32 lowercase hex characters without hyphens, got: '{input}'"
        )));
    }
    Uuid::parse_str(input).map_err(|e| UuidError::InvalidInput(format!("{what}: {e}")))
}

/// External identifier of a cluster, directory or file.
///
/// Once constructed, the contained UUID is guaranteed to be canonical, so its string form can
/// be used directly as a map key in the durable store and in log fields.
///
/// # Construction
/// - [`ExternalId::new`] generates a fresh identifier (resource creation).
/// - [`ExternalId::parse`] validates an externally supplied identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExternalId(Uuid);

impl Default for ExternalId {
    fn default() -> Self {
        Self::new()
    }
}

impl ExternalId {
    /// Generates a new random (v4) identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Validates and parses an identifier that must already be in canonical form.
    ///
    /// # Errors
    ///
    /// Returns [`UuidError::InvalidInput`] if `input` is not canonical.
    pub fn parse(input: &str) -> UuidResult<Self> {
        parse_canonical(input, "external id").map(Self)
    }

    /// Returns true if `input` is in canonical form.
    pub fn is_canonical(input: &str) -> bool {
        is_canonical(input)
    }

    /// Returns the underlying `uuid::Uuid`.
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for ExternalId {
    type Err = UuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExternalId::parse(s)
    }
}

/// Opaque version token of a file's content.
///
/// A new marker is generated for every content update and is never reused, which is what
/// keeps version-tagged archive snapshots collision free.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VersionMarker(Uuid);

impl Default for VersionMarker {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionMarker {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Validates and parses a version marker in canonical form.
    ///
    /// # Errors
    ///
    /// Returns [`UuidError::InvalidInput`] if `input` is not canonical.
    pub fn parse(input: &str) -> UuidResult<Self> {
        parse_canonical(input, "version marker").map(Self)
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for VersionMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for VersionMarker {
    type Err = UuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VersionMarker::parse(s)
    }
}

#[cfg(feature = "serde")]
mod serde_impls {
    use super::{ExternalId, VersionMarker};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    impl Serialize for ExternalId {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.collect_str(self)
        }
    }

    impl<'de> Deserialize<'de> for ExternalId {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let s = String::deserialize(deserializer)?;
            ExternalId::parse(&s).map_err(serde::de::Error::custom)
        }
    }

    impl Serialize for VersionMarker {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.collect_str(self)
        }
    }

    impl<'de> Deserialize<'de> for VersionMarker {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let s = String::deserialize(deserializer)?;
            VersionMarker::parse(&s).map_err(serde::de::Error::custom)
        }
    }
}
