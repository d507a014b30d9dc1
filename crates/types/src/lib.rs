//! Validated text types shared across the notefs workspace.
//!
//! Every name that ends up as a path segment (cluster titles, directory names, file names) is
//! carried as a [`ResourceName`], so filesystem and archive paths can be derived from the
//! ownership chain without re-checking the input at each layer.

use std::fmt;
use std::path::PathBuf;

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,

    /// The input exceeds the maximum allowed length
    #[error("Text exceeds maximum length of {max} characters")]
    TooLong { max: usize },

    /// The input cannot be used as a single path segment
    #[error("Invalid resource name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },
}

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one non-whitespace character.
/// The input is automatically trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace. If the trimmed
    /// result is empty, an error is returned.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// Name of a cluster, directory or file.
///
/// A `ResourceName` is always safe to use as exactly one path segment:
/// - non-empty after trimming, at most [`ResourceName::MAX_LEN`] bytes
/// - no `/`, `\` or control characters
/// - not `.` or `..`, and no leading `.` (hidden names are reserved for archive markers)
/// - no [`ResourceName::VERSION_SEPARATOR`], which tags version snapshots in the archive
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceName(NonEmptyText);

impl ResourceName {
    /// Longest accepted name, in bytes. Matches the common filesystem segment limit.
    pub const MAX_LEN: usize = 255;

    /// Separates a file name from a version marker in archive snapshot names.
    pub const VERSION_SEPARATOR: char = '@';

    /// Validates `input` as a single path segment.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let text = NonEmptyText::new(input)?;
        let name = text.as_str();

        if name.len() > Self::MAX_LEN {
            return Err(TextError::TooLong { max: Self::MAX_LEN });
        }

        let reject = |reason| {
            Err(TextError::InvalidName {
                name: name.to_owned(),
                reason,
            })
        };

        if name.starts_with('.') {
            return reject("names must not start with '.'");
        }
        if name.contains(['/', '\\']) {
            return reject("names must not contain path separators");
        }
        if name.chars().any(char::is_control) {
            return reject("names must not contain control characters");
        }
        if name.contains(Self::VERSION_SEPARATOR) {
            return reject("names must not contain '@'");
        }

        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for ResourceName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl std::str::FromStr for ResourceName {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl serde::Serialize for ResourceName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for ResourceName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ResourceName::new(&s).map_err(serde::de::Error::custom)
    }
}

/// Logical location of a resource in the ownership chain `cluster/directory/file`.
///
/// Both the live content layout and the archive layout are derived from this path, so a file
/// keeps the same logical path for its whole life.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogicalPath {
    cluster: ResourceName,
    directory: Option<ResourceName>,
    file: Option<ResourceName>,
}

impl LogicalPath {
    pub fn cluster(cluster: ResourceName) -> Self {
        Self {
            cluster,
            directory: None,
            file: None,
        }
    }

    /// Full path of a file.
    pub fn file(cluster: ResourceName, directory: ResourceName, file: ResourceName) -> Self {
        Self {
            cluster,
            directory: Some(directory),
            file: Some(file),
        }
    }

    /// Extends a cluster path with a directory. Any file segment is dropped.
    pub fn with_directory(&self, directory: ResourceName) -> Self {
        Self {
            cluster: self.cluster.clone(),
            directory: Some(directory),
            file: None,
        }
    }

    /// Extends a directory path with a file.
    ///
    /// Returns `None` when called on a cluster-level path, since a file always lives in a
    /// directory.
    pub fn with_file(&self, file: ResourceName) -> Option<Self> {
        let directory = self.directory.clone()?;
        Some(Self {
            cluster: self.cluster.clone(),
            directory: Some(directory),
            file: Some(file),
        })
    }

    pub fn cluster_name(&self) -> &ResourceName {
        &self.cluster
    }

    pub fn directory_name(&self) -> Option<&ResourceName> {
        self.directory.as_ref()
    }

    pub fn file_name(&self) -> Option<&ResourceName> {
        self.file.as_ref()
    }

    /// Relative filesystem path for this logical path (`cluster/directory/file`).
    pub fn to_relative_path(&self) -> PathBuf {
        self.segments().collect()
    }

    fn segments(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.cluster.as_str())
            .chain(self.directory.as_ref().map(ResourceName::as_str))
            .chain(self.file.as_ref().map(ResourceName::as_str))
    }
}

impl fmt::Display for LogicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.segments().collect();
        f.write_str(&joined.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_text_trims_input() {
        let text = NonEmptyText::new("  hello ").unwrap();
        assert_eq!(text.as_str(), "hello");
    }

    #[test]
    fn non_empty_text_rejects_whitespace() {
        assert_eq!(NonEmptyText::new("   ").unwrap_err(), TextError::Empty);
    }

    #[test]
    fn resource_name_accepts_ordinary_names() {
        for name in ["Notes", "a.txt", "my draft (v2)", "résumé.md"] {
            assert!(ResourceName::new(name).is_ok(), "{name} should be accepted");
        }
    }

    #[test]
    fn resource_name_rejects_unsafe_segments() {
        for name in ["..", ".", ".hidden", "a/b", "a\\b", "line\nbreak"] {
            let err = ResourceName::new(name).expect_err("name should be rejected");
            assert!(
                matches!(err, TextError::InvalidName { .. }),
                "unexpected error for {name:?}: {err:?}"
            );
        }
    }

    #[test]
    fn resource_name_rejects_version_separator() {
        // "a.txt@<marker>" would address the version snapshot of "a.txt"
        let err = ResourceName::new("a.txt@550e8400e29b41d4a716446655440000").unwrap_err();

        assert!(matches!(err, TextError::InvalidName { .. }));
    }

    #[test]
    fn resource_name_rejects_overlong_names() {
        let long = "x".repeat(ResourceName::MAX_LEN + 1);
        assert_eq!(
            ResourceName::new(long).unwrap_err(),
            TextError::TooLong {
                max: ResourceName::MAX_LEN
            }
        );
    }

    #[test]
    fn resource_name_deserialise_validates() {
        let err = serde_json::from_str::<ResourceName>("\"../etc\"");
        assert!(err.is_err());
    }

    #[test]
    fn logical_path_renders_ownership_chain() {
        let cluster = LogicalPath::cluster(ResourceName::new("Notes").unwrap());
        let directory = cluster.with_directory(ResourceName::new("Drafts").unwrap());
        let file = directory
            .with_file(ResourceName::new("a.txt").unwrap())
            .unwrap();

        assert_eq!(cluster.to_string(), "Notes");
        assert_eq!(directory.to_string(), "Notes/Drafts");
        assert_eq!(file.to_string(), "Notes/Drafts/a.txt");
        assert_eq!(
            file.to_relative_path(),
            PathBuf::from("Notes").join("Drafts").join("a.txt")
        );
    }

    #[test]
    fn logical_path_file_requires_directory() {
        let cluster = LogicalPath::cluster(ResourceName::new("Notes").unwrap());
        assert!(cluster
            .with_file(ResourceName::new("a.txt").unwrap())
            .is_none());
    }
}
