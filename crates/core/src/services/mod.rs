//! Orchestrating services for clusters, directories and files.
//!
//! Each service is a thin handle around a shared [`NotesContext`]. Cloning a service is cheap,
//! and every clone sees the same store, content gateway and archive store, so services can be
//! moved freely across threads.
//!
//! ## Delete flow
//!
//! 1. Enter the archival section.
//! 2. Load the active target tree (`NotFound` if absent or already deleted).
//! 3. Build the flat deletion plan and commit its history entries.
//! 4. Archive every affected file (and directory markers).
//! 5. Flip the subtree to soft-deleted in one commit. If creates added resources below the
//!    target since step 2, the flip changes nothing; their history is committed, they are
//!    archived, and the flip is retried.
//!
//! A fault in step 4 leaves the history from step 3 in place and the state untouched.

mod cluster;
mod directory;
mod file;

pub use cluster::{ClusterService, EraseReport};
pub use directory::DirectoryService;
pub use file::FileService;

use crate::archival::ArchivalEngine;
use crate::archive::{ArchiveStore, ZipArchiveStore};
use crate::config::CoreConfig;
use crate::existence::ExistenceStateChanger;
use crate::history::DeleteHistoryService;
use crate::store::EntityStore;
use crate::NotesResult;
use notefs_files::{ContentGateway, FilesService};
use notefs_uuid::ExternalId;
use std::sync::Arc;

/// Shared collaborators of every service.
#[derive(Clone, Debug)]
pub struct NotesContext {
    store: Arc<EntityStore>,
    content: Arc<dyn ContentGateway>,
    engine: ArchivalEngine,
    history: DeleteHistoryService,
    existence: ExistenceStateChanger,
}

impl NotesContext {
    /// Opens the filesystem-backed store, content root and archive root described by `cfg`.
    pub fn open(cfg: Arc<CoreConfig>) -> NotesResult<Self> {
        let content = Arc::new(FilesService::new(cfg.content_dir())?);
        let archive = Arc::new(ZipArchiveStore::new(cfg.archive_dir(), cfg.compression())?);
        let store = Arc::new(EntityStore::open(cfg.store_path())?);

        tracing::info!(
            "opened notes store at {} (content: {}, archive: {})",
            cfg.store_path().display(),
            cfg.content_dir().display(),
            cfg.archive_dir().display()
        );
        Ok(Self::with_parts(store, content, archive))
    }

    /// Assembles a context from explicit collaborators.
    pub fn with_parts(
        store: Arc<EntityStore>,
        content: Arc<dyn ContentGateway>,
        archive: Arc<dyn ArchiveStore>,
    ) -> Self {
        Self {
            engine: ArchivalEngine::new(content.clone(), archive),
            history: DeleteHistoryService::new(store.clone()),
            existence: ExistenceStateChanger::new(store.clone()),
            store,
            content,
        }
    }

    pub fn clusters(&self) -> ClusterService {
        ClusterService::new(self.clone())
    }

    pub fn directories(&self) -> DirectoryService {
        DirectoryService::new(self.clone())
    }

    pub fn files(&self) -> FileService {
        FileService::new(self.clone())
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    pub fn archive_store(&self) -> &Arc<dyn ArchiveStore> {
        self.engine.archive_store()
    }
}

/// Outcome of a delete operation.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct DeletionReport {
    pub cluster_id: ExternalId,
    pub history_entries: usize,
    pub archived_files: usize,
    pub archived_directories: usize,
    pub soft_deleted: usize,
}
