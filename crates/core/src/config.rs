//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and passed into the services as an
//! `Arc<CoreConfig>`. Nothing in this crate reads environment variables; the helpers at the
//! bottom of this module only parse values a caller has already read.

use crate::constants::{
    ARCHIVE_DIR_NAME, CONTENT_DIR_NAME, DEFAULT_COMPRESSION_LEVEL, STORE_FILENAME,
};
use crate::{NotesError, NotesResult};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Compression method for archive snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompressionMethod {
    Deflated,
    Stored,
}

impl CompressionMethod {
    pub(crate) fn to_zip(self) -> zip::CompressionMethod {
        match self {
            Self::Deflated => zip::CompressionMethod::Deflated,
            Self::Stored => zip::CompressionMethod::Stored,
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Deflated => "deflated",
            Self::Stored => "stored",
        })
    }
}

impl FromStr for CompressionMethod {
    type Err = NotesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deflated" | "deflate" => Ok(Self::Deflated),
            "stored" | "none" => Ok(Self::Stored),
            other => Err(NotesError::InvalidInput(format!(
                "unknown compression method '{other}' (expected 'deflated' or 'stored')"
            ))),
        }
    }
}

/// Compression parameters for archive snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompressionConfig {
    method: CompressionMethod,
    level: Option<i32>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            method: CompressionMethod::Deflated,
            level: Some(DEFAULT_COMPRESSION_LEVEL),
        }
    }
}

impl CompressionConfig {
    /// Deflate with the given level (0-9).
    pub fn deflated(level: i32) -> NotesResult<Self> {
        if !(0..=9).contains(&level) {
            return Err(NotesError::InvalidInput(format!(
                "compression level must be between 0 and 9, got {level}"
            )));
        }
        Ok(Self {
            method: CompressionMethod::Deflated,
            level: Some(level),
        })
    }

    /// No compression. Snapshots are still zip containers.
    pub fn stored() -> Self {
        Self {
            method: CompressionMethod::Stored,
            level: None,
        }
    }

    pub fn method(&self) -> CompressionMethod {
        self.method
    }

    pub fn level(&self) -> Option<i32> {
        self.level
    }

    pub(crate) fn file_options(&self) -> zip::write::FileOptions {
        zip::write::FileOptions::default()
            .compression_method(self.method.to_zip())
            .compression_level(self.level)
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    content_dir: PathBuf,
    archive_dir: PathBuf,
    store_path: PathBuf,
    compression: CompressionConfig,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// The archive directory must not overlap the content directory: archived snapshots would
    /// otherwise show up as live content (or the other way round).
    pub fn new(
        content_dir: PathBuf,
        archive_dir: PathBuf,
        store_path: PathBuf,
        compression: CompressionConfig,
    ) -> NotesResult<Self> {
        if content_dir.starts_with(&archive_dir) || archive_dir.starts_with(&content_dir) {
            return Err(NotesError::InvalidInput(format!(
                "archive directory {} must not overlap content directory {}",
                archive_dir.display(),
                content_dir.display()
            )));
        }

        if store_path.starts_with(&content_dir) || store_path.starts_with(&archive_dir) {
            return Err(NotesError::InvalidInput(
                "store file must live outside the content and archive directories".into(),
            ));
        }

        Ok(Self {
            content_dir,
            archive_dir,
            store_path,
            compression,
        })
    }

    /// Standard layout under a single data directory:
    /// `<data_dir>/content`, `<data_dir>/archive` and `<data_dir>/store.json`.
    pub fn under(data_dir: &Path, compression: CompressionConfig) -> NotesResult<Self> {
        Self::new(
            data_dir.join(CONTENT_DIR_NAME),
            data_dir.join(ARCHIVE_DIR_NAME),
            data_dir.join(STORE_FILENAME),
            compression,
        )
    }

    /// Same as [`CoreConfig::under`] but with a separately located archive directory.
    pub fn with_archive_dir(self, archive_dir: PathBuf) -> NotesResult<Self> {
        Self::new(
            self.content_dir,
            archive_dir,
            self.store_path,
            self.compression,
        )
    }

    pub fn content_dir(&self) -> &Path {
        &self.content_dir
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    pub fn compression(&self) -> CompressionConfig {
        self.compression
    }
}

/// Parse the compression level from an optional string value.
///
/// `None` or empty/whitespace yields the default deflate configuration; `"0"`-`"9"` selects a
/// deflate level.
pub fn compression_from_env_values(
    method: Option<String>,
    level: Option<String>,
) -> NotesResult<CompressionConfig> {
    let method = method
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(|v| v.parse::<CompressionMethod>())
        .transpose()?
        .unwrap_or(CompressionMethod::Deflated);

    match method {
        CompressionMethod::Stored => Ok(CompressionConfig::stored()),
        CompressionMethod::Deflated => {
            let level = compression_level_from_env_value(level)?;
            CompressionConfig::deflated(level.unwrap_or(DEFAULT_COMPRESSION_LEVEL))
        }
    }
}

/// Parse an optional deflate level. Empty values mean "use the default".
pub fn compression_level_from_env_value(value: Option<String>) -> NotesResult<Option<i32>> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(|v| {
            v.parse::<i32>().map_err(|e| {
                NotesError::InvalidInput(format!("invalid compression level '{v}': {e}"))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn under_derives_standard_layout() {
        let cfg = CoreConfig::under(Path::new("/data"), CompressionConfig::default()).unwrap();

        assert_eq!(cfg.content_dir(), Path::new("/data/content"));
        assert_eq!(cfg.archive_dir(), Path::new("/data/archive"));
        assert_eq!(cfg.store_path(), Path::new("/data/store.json"));
    }

    #[test]
    fn rejects_archive_inside_content() {
        let err = CoreConfig::new(
            PathBuf::from("/data/content"),
            PathBuf::from("/data/content/archive"),
            PathBuf::from("/data/store.json"),
            CompressionConfig::default(),
        )
        .unwrap_err();

        assert!(matches!(err, NotesError::InvalidInput(_)));
    }

    #[test]
    fn rejects_store_inside_archive() {
        let result = CoreConfig::new(
            PathBuf::from("/data/content"),
            PathBuf::from("/data/archive"),
            PathBuf::from("/data/archive/store.json"),
            CompressionConfig::default(),
        );

        assert!(result.is_err());
    }

    #[test]
    fn with_archive_dir_revalidates() {
        let cfg = CoreConfig::under(Path::new("/data"), CompressionConfig::default()).unwrap();

        assert!(cfg
            .clone()
            .with_archive_dir(PathBuf::from("/backup/archive"))
            .is_ok());
        assert!(cfg
            .with_archive_dir(PathBuf::from("/data/content/zips"))
            .is_err());
    }

    #[test]
    fn deflate_level_is_bounded() {
        assert!(CompressionConfig::deflated(0).is_ok());
        assert!(CompressionConfig::deflated(9).is_ok());
        assert!(CompressionConfig::deflated(10).is_err());
        assert!(CompressionConfig::deflated(-1).is_err());
    }

    #[test]
    fn env_values_default_to_deflate() {
        let cfg = compression_from_env_values(None, Some("  ".into())).unwrap();
        assert_eq!(cfg, CompressionConfig::default());
    }

    #[test]
    fn env_values_parse_method_and_level() {
        let cfg = compression_from_env_values(Some("deflated".into()), Some("9".into())).unwrap();
        assert_eq!(cfg.level(), Some(9));

        let cfg = compression_from_env_values(Some("Stored".into()), Some("9".into())).unwrap();
        assert_eq!(cfg, CompressionConfig::stored());
    }

    #[test]
    fn env_values_reject_garbage() {
        assert!(compression_level_from_env_value(Some("fast".into())).is_err());
        assert!(compression_from_env_values(Some("lzma".into()), None).is_err());
    }
}
