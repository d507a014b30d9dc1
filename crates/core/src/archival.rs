//! Archival engine and the process-wide archival section.
//!
//! The engine turns live content into archive snapshots (and removes them again on purge). It
//! never touches the entity store: callers decide what to archive from a tree they loaded and
//! flip existence state only after the engine returns successfully.
//!
//! Every multi-resource operation takes an [`ArchivalSection`] guard as a parameter, so archive
//! writes for overlapping resources can only happen while the single lock is held.

use crate::archive::{ArchiveKey, ArchiveRef, ArchiveStore};
use crate::model::{self, ClusterTree, CreatedFile, DirectoryTree, FileContext};
use crate::{NotesError, NotesResult};
use chrono::{DateTime, Utc};
use notefs_files::ContentGateway;
use notefs_types::LogicalPath;
use notefs_uuid::{ExternalId, VersionMarker};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

static ARCHIVAL_SECTION: Mutex<()> = Mutex::new(());

/// Proof that the caller holds the process-wide archival lock.
///
/// Released on drop. Never acquire it twice on one call chain.
#[derive(Debug)]
pub struct ArchivalSection {
    _guard: MutexGuard<'static, ()>,
}

impl ArchivalSection {
    /// Blocks until the archival lock is available.
    pub fn enter() -> Self {
        // A panic inside another section leaves no half-applied store state behind, since
        // store commits are atomic.
        let guard = ARCHIVAL_SECTION
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Self { _guard: guard }
    }
}

/// Content of a directory marker snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryManifest {
    pub directory_id: ExternalId,
    pub logical_path: String,
    pub archived_at: DateTime<Utc>,
    pub files: Vec<ManifestEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub file_id: ExternalId,
    pub name: String,
    pub archive_path: String,
}

/// Snapshots written for one directory.
#[derive(Clone, Debug)]
pub struct ArchivedDirectory {
    pub marker: ArchiveRef,
    pub files: Vec<(ExternalId, ArchiveRef)>,
}

/// Moves live content into the archive store.
#[derive(Clone, Debug)]
pub struct ArchivalEngine {
    content: Arc<dyn ContentGateway>,
    archive: Arc<dyn ArchiveStore>,
}

impl ArchivalEngine {
    pub fn new(content: Arc<dyn ContentGateway>, archive: Arc<dyn ArchiveStore>) -> Self {
        Self { content, archive }
    }

    pub fn archive_store(&self) -> &Arc<dyn ArchiveStore> {
        &self.archive
    }

    /// Reads the current bytes of `path` and writes them as the terminal snapshot.
    ///
    /// Repeating the call on unchanged content leaves the same snapshot behind.
    pub fn archive_file(&self, path: &LogicalPath) -> NotesResult<ArchiveRef> {
        let key = ArchiveKey::terminal(path)?;
        let bytes = self.content.read_bytes(path)?;
        self.archive.write_snapshot(&key, &bytes)
    }

    /// Reads the current bytes of `path` and stores them under `version`.
    pub fn archive_file_version(
        &self,
        _section: &ArchivalSection,
        path: &LogicalPath,
        version: VersionMarker,
    ) -> NotesResult<ArchiveRef> {
        let key = ArchiveKey::version(path, version)?;
        let bytes = self.content.read_bytes(path)?;
        self.archive.write_snapshot(&key, &bytes)
    }

    /// Archives every file in `tree`, then writes the directory marker.
    ///
    /// The tree is expected to hold only active files. Stops at the first fault; snapshots
    /// written before it stay behind.
    pub fn archive_directory(
        &self,
        _section: &ArchivalSection,
        cluster: &model::Cluster,
        tree: &DirectoryTree,
    ) -> NotesResult<ArchivedDirectory> {
        let directory_path = model::directory_path(cluster, &tree.directory);

        let mut files = Vec::with_capacity(tree.files.len());
        for file in &tree.files {
            let path = model::file_path(cluster, &tree.directory, file);
            let archived = self.archive_file(&path).inspect_err(|e| {
                tracing::warn!("failed to archive {}: {}", path, e);
            })?;
            files.push((file.external_id(), archived));
        }

        let manifest = DirectoryManifest {
            directory_id: tree.directory.external_id(),
            logical_path: directory_path.to_string(),
            archived_at: Utc::now(),
            files: tree
                .files
                .iter()
                .zip(&files)
                .map(|(file, (_, archived))| ManifestEntry {
                    file_id: file.external_id(),
                    name: file.name().to_string(),
                    archive_path: archived.relative_path.clone(),
                })
                .collect(),
        };
        let bytes =
            serde_json::to_vec_pretty(&manifest).map_err(NotesError::ManifestSerialization)?;
        let marker = self
            .archive
            .write_snapshot(&ArchiveKey::directory_marker(&directory_path)?, &bytes)?;

        Ok(ArchivedDirectory { marker, files })
    }

    /// Archives every directory of `tree` through [`ArchivalEngine::archive_directory`].
    pub fn archive_cluster(
        &self,
        section: &ArchivalSection,
        tree: &ClusterTree,
    ) -> NotesResult<Vec<ArchivedDirectory>> {
        tree.directories
            .iter()
            .map(|directory| self.archive_directory(section, &tree.cluster, directory))
            .collect()
    }

    /// Archives a single file as part of a file deletion.
    pub fn archive_single_file(
        &self,
        _section: &ArchivalSection,
        ctx: &FileContext,
    ) -> NotesResult<ArchiveRef> {
        self.archive_file(&ctx.logical_path())
    }

    /// Deletes the terminal snapshot of a file and the version snapshots in `versions`.
    ///
    /// `versions` are the markers the file itself recorded; other snapshots under the same
    /// path belong to another file that reused the names. Returns the number removed.
    pub fn purge_archive(
        &self,
        section: &ArchivalSection,
        cluster: &model::Cluster,
        directory: &model::Directory,
        file: &CreatedFile,
        versions: &[VersionMarker],
    ) -> NotesResult<usize> {
        let path = model::file_path(cluster, directory, file);

        let terminal = self.archive.delete_snapshot(&ArchiveKey::terminal(&path)?)?;
        Ok(usize::from(terminal) + self.purge_versions(section, &path, versions)?)
    }

    /// Deletes the given version snapshots of `path`. Returns the number removed.
    pub fn purge_versions(
        &self,
        _section: &ArchivalSection,
        path: &LogicalPath,
        versions: &[VersionMarker],
    ) -> NotesResult<usize> {
        let mut removed = 0;
        for version in versions {
            if self
                .archive
                .delete_snapshot(&ArchiveKey::version(path, *version)?)?
            {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Deletes the marker snapshot of a directory.
    pub fn purge_directory_marker(
        &self,
        _section: &ArchivalSection,
        cluster: &model::Cluster,
        directory: &model::Directory,
    ) -> NotesResult<bool> {
        let path = model::directory_path(cluster, directory);
        self.archive
            .delete_snapshot(&ArchiveKey::directory_marker(&path)?)
    }

    /// Removes archive folders of a cluster that were left empty by a purge.
    pub fn prune(&self, _section: &ArchivalSection, tree: &ClusterTree) -> NotesResult<()> {
        for directory in &tree.directories {
            self.archive
                .prune_empty(&model::directory_path(&tree.cluster, &directory.directory))?;
        }
        self.archive.prune_empty(&tree.cluster.logical_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ZipArchiveStore;
    use crate::config::CompressionConfig;
    use crate::model::{Cluster, Directory};
    use notefs_files::FilesService;
    use notefs_types::ResourceName;
    use tempfile::TempDir;

    fn name(s: &str) -> ResourceName {
        ResourceName::new(s).unwrap()
    }

    struct Fixture {
        _temp: TempDir,
        files: Arc<FilesService>,
        archive: Arc<ZipArchiveStore>,
        engine: ArchivalEngine,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let files = Arc::new(FilesService::new(&temp.path().join("content")).unwrap());
        let archive = Arc::new(
            ZipArchiveStore::new(&temp.path().join("archive"), CompressionConfig::default())
                .unwrap(),
        );
        let engine = ArchivalEngine::new(files.clone(), archive.clone());
        Fixture {
            _temp: temp,
            files,
            archive,
            engine,
        }
    }

    /// Notes/Drafts with the given files written to live content.
    fn tree(fx: &Fixture, contents: &[(&str, &[u8])]) -> (Cluster, DirectoryTree) {
        let cluster = Cluster::new(name("Notes"), Utc::now());
        let directory = Directory::new(cluster.external_id(), name("Drafts"), Utc::now());
        let files = contents
            .iter()
            .map(|(file_name, bytes)| {
                let path = LogicalPath::file(name("Notes"), name("Drafts"), name(file_name));
                let metadata = fx.files.write_bytes(&path, bytes).unwrap();
                CreatedFile::new(directory.external_id(), name(file_name), metadata)
            })
            .collect();
        (cluster, DirectoryTree { directory, files })
    }

    #[test]
    fn archive_file_twice_equals_once() {
        let fx = fixture();
        let (cluster, tree) = tree(&fx, &[("a.txt", b"hello")]);
        let path = model::file_path(&cluster, &tree.directory, &tree.files[0]);
        let key = ArchiveKey::terminal(&path).unwrap();

        fx.engine.archive_file(&path).unwrap();
        let once = std::fs::read(fx.archive.snapshot_path(&key)).unwrap();
        fx.engine.archive_file(&path).unwrap();
        let twice = std::fs::read(fx.archive.snapshot_path(&key)).unwrap();

        assert_eq!(once, twice);
        assert_eq!(fx.archive.read_snapshot(&key).unwrap(), b"hello");
    }

    #[test]
    fn archive_directory_writes_files_and_manifest() {
        let fx = fixture();
        let (cluster, tree) = tree(&fx, &[("a.txt", b"hello"), ("b.txt", b"bye")]);
        let section = ArchivalSection::enter();

        let archived = fx.engine.archive_directory(&section, &cluster, &tree).unwrap();

        assert_eq!(archived.files.len(), 2);
        let marker_key =
            ArchiveKey::directory_marker(&model::directory_path(&cluster, &tree.directory))
                .unwrap();
        let manifest: DirectoryManifest =
            serde_json::from_slice(&fx.archive.read_snapshot(&marker_key).unwrap()).unwrap();
        assert_eq!(manifest.logical_path, "Notes/Drafts");
        let names: Vec<&str> = manifest.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["a.txt", "b.txt"]);
    }

    #[test]
    fn archive_directory_fails_on_missing_content() {
        let fx = fixture();
        let (cluster, mut tree) = tree(&fx, &[("a.txt", b"hello")]);
        let ghost = CreatedFile::new(
            tree.directory.external_id(),
            name("ghost.txt"),
            notefs_files::LiveFileMetadata {
                sha256: String::new(),
                size_bytes: 0,
                media_type: None,
                stored_at: Utc::now(),
            },
        );
        tree.files.push(ghost);
        let section = ArchivalSection::enter();

        let err = fx
            .engine
            .archive_directory(&section, &cluster, &tree)
            .unwrap_err();

        assert!(matches!(err, NotesError::ContentNotFound(_)));
        let marker_key =
            ArchiveKey::directory_marker(&model::directory_path(&cluster, &tree.directory))
                .unwrap();
        assert!(!fx.archive.contains(&marker_key).unwrap());
    }

    #[test]
    fn purge_removes_only_recorded_versions() {
        let fx = fixture();
        let (cluster, tree) = tree(&fx, &[("a.txt", b"hello")]);
        let file = &tree.files[0];
        let path = model::file_path(&cluster, &tree.directory, file);
        let section = ArchivalSection::enter();
        let recorded = [VersionMarker::new(), VersionMarker::new()];
        let foreign = VersionMarker::new();

        for version in recorded.iter().chain([&foreign]) {
            fx.engine
                .archive_file_version(&section, &path, *version)
                .unwrap();
        }
        fx.engine.archive_file(&path).unwrap();

        let removed = fx
            .engine
            .purge_archive(&section, &cluster, &tree.directory, file, &recorded)
            .unwrap();

        assert_eq!(removed, 3);
        assert_eq!(fx.archive.list_versions(&path).unwrap(), vec![foreign]);
        assert!(!fx
            .archive
            .contains(&ArchiveKey::terminal(&path).unwrap())
            .unwrap());
    }
}
