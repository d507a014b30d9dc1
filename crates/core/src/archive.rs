//! Compressed archive storage keyed by resource path.
//!
//! ## Archive Layout
//!
//! ```text
//! <archive_root>/
//! └── <cluster>/
//!     └── <directory>/
//!         ├── <file>.zip               # terminal snapshot, taken on delete
//!         ├── <file>@<version>.zip     # pre-update snapshot, one per version
//!         └── .directory.zip           # manifest of the files archived with the directory
//! ```
//!
//! Every snapshot is a zip holding a single entry. Writes go through a temporary file in the
//! target folder and a rename, so no partially written snapshot ever sits under its final name.

use crate::config::CompressionConfig;
use crate::constants::{ARCHIVE_EXTENSION, DIRECTORY_MARKER_NAME, VERSION_SEPARATOR};
use crate::{NotesError, NotesResult};
use notefs_types::LogicalPath;
use notefs_uuid::VersionMarker;
use std::fmt;
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use zip::{ZipArchive, ZipWriter};

/// Which snapshot of a resource a key addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotKind {
    /// Final content of a deleted file. Overwritten when taken again.
    Terminal,
    /// Content of a file as it was before the update that introduced this version.
    Version(VersionMarker),
    /// Manifest of an archived directory.
    DirectoryMarker,
}

/// Deterministic address of one snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveKey {
    path: LogicalPath,
    kind: SnapshotKind,
}

impl ArchiveKey {
    pub fn terminal(file: &LogicalPath) -> NotesResult<Self> {
        Self::for_file(file, SnapshotKind::Terminal)
    }

    pub fn version(file: &LogicalPath, version: VersionMarker) -> NotesResult<Self> {
        Self::for_file(file, SnapshotKind::Version(version))
    }

    pub fn directory_marker(directory: &LogicalPath) -> NotesResult<Self> {
        if directory.directory_name().is_none() || directory.file_name().is_some() {
            return Err(NotesError::InvalidInput(format!(
                "{directory} is not a directory path"
            )));
        }
        Ok(Self {
            path: directory.clone(),
            kind: SnapshotKind::DirectoryMarker,
        })
    }

    fn for_file(file: &LogicalPath, kind: SnapshotKind) -> NotesResult<Self> {
        if file.file_name().is_none() {
            return Err(NotesError::InvalidInput(format!("{file} is not a file path")));
        }
        Ok(Self {
            path: file.clone(),
            kind,
        })
    }

    pub fn logical_path(&self) -> &LogicalPath {
        &self.path
    }

    pub fn kind(&self) -> SnapshotKind {
        self.kind
    }

    /// Only version snapshots are write-once.
    pub fn allows_overwrite(&self) -> bool {
        !matches!(self.kind, SnapshotKind::Version(_))
    }

    /// Path of the snapshot relative to the archive root, using `/` separators.
    pub fn relative_path(&self) -> String {
        match self.kind {
            SnapshotKind::Terminal => format!("{}.{ARCHIVE_EXTENSION}", self.path),
            SnapshotKind::Version(version) => {
                format!("{}{VERSION_SEPARATOR}{version}.{ARCHIVE_EXTENSION}", self.path)
            }
            SnapshotKind::DirectoryMarker => {
                format!("{}/{DIRECTORY_MARKER_NAME}.{ARCHIVE_EXTENSION}", self.path)
            }
        }
    }

    /// Name of the single entry stored inside the zip.
    pub fn entry_name(&self) -> String {
        match self.kind {
            SnapshotKind::Terminal | SnapshotKind::Version(_) => self
                .path
                .file_name()
                .map(ToString::to_string)
                .unwrap_or_default(),
            SnapshotKind::DirectoryMarker => format!("{DIRECTORY_MARKER_NAME}.json"),
        }
    }
}

impl fmt::Display for ArchiveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.relative_path())
    }
}

/// Result of a successful snapshot write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveRef {
    pub relative_path: String,
    pub original_bytes: u64,
    pub compressed_bytes: u64,
}

/// Durable storage for archive snapshots.
pub trait ArchiveStore: Send + Sync + fmt::Debug {
    /// Writes a snapshot. Terminal and marker keys are overwritten; an existing version key is
    /// a [`NotesError::SnapshotCollision`].
    fn write_snapshot(&self, key: &ArchiveKey, bytes: &[u8]) -> NotesResult<ArchiveRef>;

    /// Reads the bytes stored under `key`.
    fn read_snapshot(&self, key: &ArchiveKey) -> NotesResult<Vec<u8>>;

    /// Deletes a snapshot. Returns whether anything was removed.
    fn delete_snapshot(&self, key: &ArchiveKey) -> NotesResult<bool>;

    fn contains(&self, key: &ArchiveKey) -> NotesResult<bool>;

    /// Version markers of every version snapshot stored for `file`.
    fn list_versions(&self, file: &LogicalPath) -> NotesResult<Vec<VersionMarker>>;

    /// Removes the folder for `path` and its ancestors while they are empty.
    fn prune_empty(&self, path: &LogicalPath) -> NotesResult<()>;
}

/// [`ArchiveStore`] writing zip files below a root folder.
#[derive(Clone, Debug)]
pub struct ZipArchiveStore {
    root: PathBuf,
    compression: CompressionConfig,
}

impl ZipArchiveStore {
    /// Creates the store, creating `root` when missing.
    pub fn new(root: &Path, compression: CompressionConfig) -> NotesResult<Self> {
        fs::create_dir_all(root).map_err(|source| NotesError::ArchiveWrite {
            path: root.to_path_buf(),
            source,
        })?;
        Ok(Self {
            root: root.to_path_buf(),
            compression,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a snapshot.
    pub fn snapshot_path(&self, key: &ArchiveKey) -> PathBuf {
        self.root.join(key.relative_path())
    }

    fn encode(&self, key: &ArchiveKey, bytes: &[u8], temp: &mut NamedTempFile) -> NotesResult<()> {
        let temp_path = temp.path().to_path_buf();
        let zip_err = |source| NotesError::Zip {
            path: temp_path.clone(),
            source,
        };

        let mut zip = ZipWriter::new(temp.as_file_mut());
        zip.start_file(key.entry_name(), self.compression.file_options())
            .map_err(zip_err)?;
        zip.write_all(bytes)
            .map_err(|source| NotesError::ArchiveWrite {
                path: temp_path.clone(),
                source,
            })?;
        zip.finish().map_err(zip_err)?;
        Ok(())
    }

    /// Whether writing `bytes` under a terminal key would replace different content.
    ///
    /// Happens when a reused cluster title is deleted again.
    fn replaces_different_content(&self, key: &ArchiveKey, bytes: &[u8]) -> bool {
        key.kind() == SnapshotKind::Terminal
            && self
                .read_snapshot(key)
                .is_ok_and(|existing| existing != bytes)
    }
}

impl ArchiveStore for ZipArchiveStore {
    fn write_snapshot(&self, key: &ArchiveKey, bytes: &[u8]) -> NotesResult<ArchiveRef> {
        let target = self.snapshot_path(key);
        let write_err = |source| NotesError::ArchiveWrite {
            path: target.clone(),
            source,
        };

        let parent = target.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent).map_err(write_err)?;

        if !key.allows_overwrite() && target.exists() {
            return Err(NotesError::SnapshotCollision(target.clone()));
        }
        if self.replaces_different_content(key, bytes) {
            tracing::warn!("overwriting terminal snapshot {} with different content", key);
        }

        let mut temp = NamedTempFile::new_in(parent).map_err(write_err)?;
        self.encode(key, bytes, &mut temp)?;
        temp.as_file().sync_all().map_err(write_err)?;

        if key.allows_overwrite() {
            temp.persist(&target).map_err(|e| write_err(e.error))?;
        } else {
            temp.persist_noclobber(&target).map_err(|e| {
                if e.error.kind() == ErrorKind::AlreadyExists {
                    NotesError::SnapshotCollision(target.clone())
                } else {
                    write_err(e.error)
                }
            })?;
        }

        let compressed_bytes = fs::metadata(&target).map_err(write_err)?.len();
        tracing::debug!(
            "wrote snapshot {} ({} -> {} bytes)",
            key,
            bytes.len(),
            compressed_bytes
        );

        Ok(ArchiveRef {
            relative_path: key.relative_path(),
            original_bytes: bytes.len() as u64,
            compressed_bytes,
        })
    }

    fn read_snapshot(&self, key: &ArchiveKey) -> NotesResult<Vec<u8>> {
        let path = self.snapshot_path(key);

        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(NotesError::SnapshotNotFound(path))
            }
            Err(source) => return Err(NotesError::ArchiveRead { path, source }),
        };

        let mut archive = ZipArchive::new(file).map_err(|source| NotesError::Zip {
            path: path.clone(),
            source,
        })?;
        let mut entry = archive
            .by_name(&key.entry_name())
            .map_err(|source| NotesError::Zip {
                path: path.clone(),
                source,
            })?;

        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|source| NotesError::ArchiveRead { path, source })?;
        Ok(bytes)
    }

    fn delete_snapshot(&self, key: &ArchiveKey) -> NotesResult<bool> {
        let path = self.snapshot_path(key);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!("deleted snapshot {}", key);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(NotesError::ArchiveDelete { path, source }),
        }
    }

    fn contains(&self, key: &ArchiveKey) -> NotesResult<bool> {
        let path = self.snapshot_path(key);
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(NotesError::ArchiveRead { path, source }),
        }
    }

    fn list_versions(&self, file: &LogicalPath) -> NotesResult<Vec<VersionMarker>> {
        let Some(file_name) = file.file_name() else {
            return Err(NotesError::InvalidInput(format!("{file} is not a file path")));
        };
        let folder = self.root.join(file.to_relative_path());
        let folder = folder.parent().unwrap_or(&self.root);

        let entries = match fs::read_dir(folder) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(NotesError::ArchiveRead {
                    path: folder.to_path_buf(),
                    source,
                })
            }
        };

        let prefix = format!("{file_name}{VERSION_SEPARATOR}");
        let suffix = format!(".{ARCHIVE_EXTENSION}");

        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| NotesError::ArchiveRead {
                path: folder.to_path_buf(),
                source,
            })?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };

            let marker = name
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(&suffix))
                .and_then(|raw| VersionMarker::parse(raw).ok());
            if let Some(marker) = marker {
                versions.push(marker);
            }
        }
        Ok(versions)
    }

    fn prune_empty(&self, path: &LogicalPath) -> NotesResult<()> {
        let mut current = self.root.join(path.to_relative_path());

        while current.starts_with(&self.root) && current != self.root {
            let is_empty = match fs::read_dir(&current) {
                Ok(mut entries) => entries.next().is_none(),
                Err(e) if e.kind() == ErrorKind::NotFound => true,
                Err(source) => {
                    return Err(NotesError::ArchiveDelete {
                        path: current,
                        source,
                    })
                }
            };
            if !is_empty {
                break;
            }

            match fs::remove_dir(&current) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(NotesError::ArchiveDelete {
                        path: current,
                        source,
                    })
                }
            }

            if !current.pop() {
                break;
            }
        }
        Ok(())
    }
}
