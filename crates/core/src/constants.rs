//! Constants used throughout the notefs core crate.
//!
//! Path and filename constants live here so the live layout, the archive layout and the store
//! location stay consistent across modules.

/// Default directory for all notefs data when no explicit directory is configured.
pub const DEFAULT_DATA_DIR: &str = "notefs_data";

/// Directory name (under the data dir) holding live content.
pub const CONTENT_DIR_NAME: &str = "content";

/// Directory name (under the data dir) holding archive snapshots.
pub const ARCHIVE_DIR_NAME: &str = "archive";

/// Filename of the durable entity store.
pub const STORE_FILENAME: &str = "store.json";

/// File extension of every archive snapshot.
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Separates a file name from its version marker in version snapshot names.
///
/// Resource names never contain it, so a terminal key cannot alias a version key.
pub const VERSION_SEPARATOR: char = notefs_types::ResourceName::VERSION_SEPARATOR;

/// Name of the marker snapshot written for an archived directory.
///
/// The leading dot keeps it out of the namespace of user-chosen names.
pub const DIRECTORY_MARKER_NAME: &str = ".directory";

/// Default deflate level for archive snapshots.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 6;

/// Largest accepted live file, in bytes.
pub const MAX_FILE_BYTES: usize = 50 * 1024 * 1024; // 50 MiB
