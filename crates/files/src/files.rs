//! Filesystem-backed content gateway.
//!
//! [`FilesService`] is the production [`ContentGateway`]: it resolves logical paths under a
//! single content root. Writes are staged in a temporary file next to the target and renamed
//! into place. It keeps no state besides the root, so a
//! single instance can be shared across threads.

use crate::FilesError;
use chrono::{DateTime, Utc};
use notefs_types::LogicalPath;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Metadata for live content that has just been written.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct LiveFileMetadata {
    /// Hexadecimal SHA-256 digest of the content
    pub sha256: String,

    /// Size of the content in bytes
    pub size_bytes: u64,

    /// Detected media type (MIME type), if available
    ///
    /// Best-effort detection from magic bytes; plain text usually yields `None`.
    pub media_type: Option<String>,

    /// UTC timestamp when the content was written
    pub stored_at: DateTime<Utc>,
}

impl LiveFileMetadata {
    /// Describes `bytes` as if they were written now.
    pub fn describe(bytes: &[u8]) -> Self {
        Self {
            sha256: hex::encode(Sha256::digest(bytes)),
            size_bytes: bytes.len() as u64,
            media_type: infer::get(bytes).map(|kind| kind.mime_type().to_owned()),
            stored_at: Utc::now(),
        }
    }
}

/// Byte-level access to live content.
///
/// The archival engine depends on this trait only to obtain the bytes it compresses, which
/// lets tests substitute an in-memory or failing gateway.
pub trait ContentGateway: Send + Sync + fmt::Debug {
    /// Creates the live root folder for a cluster. Idempotent.
    fn create_cluster_root(&self, cluster: &LogicalPath) -> Result<(), FilesError>;

    /// Creates the live folder for a directory. Idempotent.
    fn create_directory(&self, directory: &LogicalPath) -> Result<(), FilesError>;

    /// Writes (or overwrites) the live content of a file.
    fn write_bytes(&self, file: &LogicalPath, bytes: &[u8])
        -> Result<LiveFileMetadata, FilesError>;

    /// Reads the live content of a file.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::NotFound`] if the live artifact is absent.
    fn read_bytes(&self, file: &LogicalPath) -> Result<Vec<u8>, FilesError>;
}

/// Content gateway rooted at a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FilesService {
    /// Canonicalised root directory containing all cluster roots
    root_directory: PathBuf,
}

impl FilesService {
    /// Creates a new `FilesService` rooted at `root_directory`.
    ///
    /// The root is created if missing, then canonicalised.
    ///
    /// # Errors
    ///
    /// Returns `FilesError::InvalidRootDirectory` if the root exists but is not a directory,
    /// cannot be created, or cannot be canonicalised.
    pub fn new(root_directory: &Path) -> Result<Self, FilesError> {
        if root_directory.exists() && !root_directory.is_dir() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Path is not a directory: {}",
                root_directory.display()
            )));
        }

        fs::create_dir_all(root_directory).map_err(|e| {
            FilesError::InvalidRootDirectory(format!(
                "Cannot create directory {}: {}",
                root_directory.display(),
                e
            ))
        })?;

        let root_directory = root_directory.canonicalize().map_err(|e| {
            FilesError::InvalidRootDirectory(format!(
                "Cannot canonicalize path {}: {}",
                root_directory.display(),
                e
            ))
        })?;

        Ok(Self { root_directory })
    }

    /// Returns the canonicalised content root.
    #[must_use]
    pub fn root_directory(&self) -> &Path {
        &self.root_directory
    }

    /// Absolute live path for a logical path.
    #[must_use]
    pub fn live_path(&self, path: &LogicalPath) -> PathBuf {
        self.root_directory.join(path.to_relative_path())
    }

    fn create_dir(&self, path: &LogicalPath) -> Result<(), FilesError> {
        let target = self.live_path(path);
        fs::create_dir_all(&target).map_err(|e| {
            FilesError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to create directory {}: {}", target.display(), e),
            ))
        })
    }
}

impl ContentGateway for FilesService {
    fn create_cluster_root(&self, cluster: &LogicalPath) -> Result<(), FilesError> {
        if cluster.directory_name().is_some() {
            return Err(FilesError::InvalidPath(format!(
                "{cluster} is not a cluster path"
            )));
        }
        self.create_dir(cluster)
    }

    fn create_directory(&self, directory: &LogicalPath) -> Result<(), FilesError> {
        if directory.directory_name().is_none() || directory.file_name().is_some() {
            return Err(FilesError::InvalidPath(format!(
                "{directory} is not a directory path"
            )));
        }
        self.create_dir(directory)
    }

    fn write_bytes(
        &self,
        file: &LogicalPath,
        bytes: &[u8],
    ) -> Result<LiveFileMetadata, FilesError> {
        if file.file_name().is_none() {
            return Err(FilesError::InvalidPath(format!("{file} is not a file path")));
        }

        let target = self.live_path(file);
        let parent = target.parent().unwrap_or(&self.root_directory);
        let io_err = |e: std::io::Error, action: &str| {
            FilesError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to {action} {}: {}", target.display(), e),
            ))
        };

        fs::create_dir_all(parent).map_err(|e| {
            FilesError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to create directory {}: {}", parent.display(), e),
            ))
        })?;

        // Readers see either the old or the new content, never a partial write.
        let mut temp = NamedTempFile::new_in(parent).map_err(|e| io_err(e, "stage"))?;
        temp.write_all(bytes).map_err(|e| io_err(e, "write"))?;
        temp.as_file().sync_all().map_err(|e| io_err(e, "sync"))?;
        temp.persist(&target)
            .map_err(|e| io_err(e.error, "replace"))?;

        Ok(LiveFileMetadata::describe(bytes))
    }

    fn read_bytes(&self, file: &LogicalPath) -> Result<Vec<u8>, FilesError> {
        if file.file_name().is_none() {
            return Err(FilesError::InvalidPath(format!("{file} is not a file path")));
        }

        let target = self.live_path(file);
        match fs::read(&target) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(FilesError::NotFound(file.to_string()))
            }
            Err(e) => Err(FilesError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read file from {}: {}", target.display(), e),
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notefs_types::ResourceName;
    use tempfile::TempDir;

    fn name(s: &str) -> ResourceName {
        ResourceName::new(s).unwrap()
    }

    fn file_path() -> LogicalPath {
        LogicalPath::cluster(name("Notes"))
            .with_directory(name("Drafts"))
            .with_file(name("a.txt"))
            .unwrap()
    }

    #[test]
    fn test_new_creates_missing_root() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("content");

        let service = FilesService::new(&root).expect("root should be created");

        assert!(root.is_dir());
        assert_eq!(service.root_directory(), root.canonicalize().unwrap());
    }

    #[test]
    fn test_new_rejects_file_root() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("file.txt");
        fs::write(&root, "not a directory").unwrap();

        let result = FilesService::new(&root);

        assert!(matches!(result, Err(FilesError::InvalidRootDirectory(_))));
    }

    #[test]
    fn test_create_cluster_and_directory() {
        let temp = TempDir::new().unwrap();
        let service = FilesService::new(temp.path()).unwrap();
        let cluster = LogicalPath::cluster(name("Notes"));
        let directory = cluster.with_directory(name("Drafts"));

        service.create_cluster_root(&cluster).unwrap();
        service.create_directory(&directory).unwrap();
        // idempotent
        service.create_directory(&directory).unwrap();

        assert!(service.live_path(&directory).is_dir());
    }

    #[test]
    fn test_create_cluster_root_rejects_directory_path() {
        let temp = TempDir::new().unwrap();
        let service = FilesService::new(temp.path()).unwrap();
        let directory = LogicalPath::cluster(name("Notes")).with_directory(name("Drafts"));

        let result = service.create_cluster_root(&directory);

        assert!(matches!(result, Err(FilesError::InvalidPath(_))));
    }

    #[test]
    fn test_write_and_read_bytes() {
        let temp = TempDir::new().unwrap();
        let service = FilesService::new(temp.path()).unwrap();

        let metadata = service.write_bytes(&file_path(), b"hello").unwrap();
        let content = service.read_bytes(&file_path()).unwrap();

        assert_eq!(content, b"hello");
        assert_eq!(metadata.size_bytes, 5);
        assert_eq!(
            metadata.sha256,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(metadata.media_type, None);
    }

    #[test]
    fn test_write_overwrites_existing_content() {
        let temp = TempDir::new().unwrap();
        let service = FilesService::new(temp.path()).unwrap();

        service.write_bytes(&file_path(), b"hello").unwrap();
        service.write_bytes(&file_path(), b"world").unwrap();

        assert_eq!(service.read_bytes(&file_path()).unwrap(), b"world");
    }

    #[test]
    fn test_write_leaves_no_staging_files() {
        let temp = TempDir::new().unwrap();
        let service = FilesService::new(temp.path()).unwrap();

        service.write_bytes(&file_path(), b"hello").unwrap();
        service.write_bytes(&file_path(), b"world").unwrap();

        let folder = service.live_path(&file_path());
        let names: Vec<String> = fs::read_dir(folder.parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.txt"]);
    }

    #[test]
    fn test_detects_binary_media_type() {
        let temp = TempDir::new().unwrap();
        let service = FilesService::new(temp.path()).unwrap();
        let png_header = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

        let metadata = service.write_bytes(&file_path(), &png_header).unwrap();

        assert_eq!(metadata.media_type.as_deref(), Some("image/png"));
    }

    #[test]
    fn test_read_missing_file_is_not_found() {
        let temp = TempDir::new().unwrap();
        let service = FilesService::new(temp.path()).unwrap();

        let result = service.read_bytes(&file_path());

        match result {
            Err(FilesError::NotFound(path)) => assert_eq!(path, "Notes/Drafts/a.txt"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_read_rejects_directory_path() {
        let temp = TempDir::new().unwrap();
        let service = FilesService::new(temp.path()).unwrap();
        let directory = LogicalPath::cluster(name("Notes")).with_directory(name("Drafts"));

        assert!(matches!(
            service.read_bytes(&directory),
            Err(FilesError::InvalidPath(_))
        ));
    }
}
