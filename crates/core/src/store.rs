//! Durable entity store.
//!
//! All relational state (clusters, directories, files, deletion history) lives in one
//! [`StoreState`] value guarded by a read/write lock. Every mutation goes through
//! [`EntityStore::commit`], which applies the change to a copy, persists the copy as JSON via a
//! temporary file and rename, and only then swaps it in. A failed commit therefore leaves both
//! memory and disk untouched.
//!
//! ```text
//! <data_dir>/store.json
//! ```

use crate::model::{
    self, Cluster, ClusterTree, CreatedFile, DeleteHistoryEntry, Directory, DirectoryTree,
    EventType, ExistenceState, FileContext, ResourceKind,
};
use crate::{NotesError, NotesResult};
use notefs_types::ResourceName;
use notefs_uuid::{ExternalId, VersionMarker};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tempfile::NamedTempFile;

/// Snapshot of every persisted row.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StoreState {
    clusters: BTreeMap<ExternalId, Cluster>,
    directories: BTreeMap<ExternalId, Directory>,
    files: BTreeMap<ExternalId, CreatedFile>,
    history: Vec<DeleteHistoryEntry>,
}

impl StoreState {
    // ------------------------------------------------------------------
    // Clusters
    // ------------------------------------------------------------------

    pub fn cluster(&self, id: ExternalId) -> Option<&Cluster> {
        self.clusters.get(&id)
    }

    /// Returns the cluster if it exists and is active.
    pub fn active_cluster(&self, id: ExternalId) -> NotesResult<&Cluster> {
        self.cluster(id)
            .filter(|c| c.state().is_active())
            .ok_or_else(|| NotesError::not_found(ResourceKind::Cluster, id))
    }

    pub fn active_cluster_by_title(&self, title: &ResourceName) -> Option<&Cluster> {
        self.clusters
            .values()
            .find(|c| c.state().is_active() && c.title() == title)
    }

    /// Clusters in `state`, oldest first.
    pub fn clusters_in_state(&self, state: ExistenceState) -> Vec<&Cluster> {
        let mut clusters: Vec<&Cluster> = self
            .clusters
            .values()
            .filter(|c| c.state() == state)
            .collect();
        clusters.sort_by_key(|c| c.created_at());
        clusters
    }

    pub(crate) fn cluster_mut(&mut self, id: ExternalId) -> NotesResult<&mut Cluster> {
        self.clusters
            .get_mut(&id)
            .ok_or_else(|| NotesError::not_found(ResourceKind::Cluster, id))
    }

    pub(crate) fn save_cluster(&mut self, cluster: Cluster) {
        self.clusters.insert(cluster.external_id(), cluster);
    }

    // ------------------------------------------------------------------
    // Directories
    // ------------------------------------------------------------------

    pub fn directory(&self, id: ExternalId) -> Option<&Directory> {
        self.directories.get(&id)
    }

    /// Returns the directory if it and its cluster are active.
    pub fn active_directory(&self, id: ExternalId) -> NotesResult<&Directory> {
        self.directory(id)
            .filter(|d| d.state().is_active())
            .filter(|d| self.active_cluster(d.cluster_id()).is_ok())
            .ok_or_else(|| NotesError::not_found(ResourceKind::Directory, id))
    }

    pub fn active_directory_by_name(
        &self,
        cluster_id: ExternalId,
        name: &ResourceName,
    ) -> Option<&Directory> {
        self.directories.values().find(|d| {
            d.cluster_id() == cluster_id && d.state().is_active() && d.name() == name
        })
    }

    pub(crate) fn directory_mut(&mut self, id: ExternalId) -> NotesResult<&mut Directory> {
        self.directories
            .get_mut(&id)
            .ok_or_else(|| NotesError::not_found(ResourceKind::Directory, id))
    }

    pub(crate) fn save_directory(&mut self, directory: Directory) {
        self.directories.insert(directory.external_id(), directory);
    }

    // ------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------

    pub fn file(&self, id: ExternalId) -> Option<&CreatedFile> {
        self.files.get(&id)
    }

    pub fn active_file_by_name(
        &self,
        directory_id: ExternalId,
        name: &ResourceName,
    ) -> Option<&CreatedFile> {
        self.files.values().find(|f| {
            f.directory_id() == directory_id && f.state().is_active() && f.name() == name
        })
    }

    pub(crate) fn file_mut(&mut self, id: ExternalId) -> NotesResult<&mut CreatedFile> {
        self.files
            .get_mut(&id)
            .ok_or_else(|| NotesError::not_found(ResourceKind::File, id))
    }

    pub(crate) fn save_file(&mut self, file: CreatedFile) {
        self.files.insert(file.external_id(), file);
    }

    /// Resolves an active file together with its active owners.
    pub fn active_file_context(&self, id: ExternalId) -> NotesResult<FileContext> {
        let not_found = || NotesError::not_found(ResourceKind::File, id);

        let file = self
            .file(id)
            .filter(|f| f.state().is_active())
            .ok_or_else(not_found)?;
        let directory = self
            .active_directory(file.directory_id())
            .map_err(|_| not_found())?;
        let cluster = self
            .active_cluster(directory.cluster_id())
            .map_err(|_| not_found())?;

        Ok(FileContext {
            cluster: cluster.clone(),
            directory: directory.clone(),
            file: file.clone(),
        })
    }

    // ------------------------------------------------------------------
    // Aggregates
    // ------------------------------------------------------------------

    fn files_of(&self, directory_id: ExternalId, active_only: bool) -> Vec<CreatedFile> {
        let mut files: Vec<CreatedFile> = self
            .files
            .values()
            .filter(|f| f.directory_id() == directory_id)
            .filter(|f| !active_only || f.state().is_active())
            .cloned()
            .collect();
        files.sort_by_key(|f| f.created_at());
        files
    }

    fn directory_tree(&self, directory: &Directory, active_only: bool) -> DirectoryTree {
        DirectoryTree {
            directory: directory.clone(),
            files: self.files_of(directory.external_id(), active_only),
        }
    }

    fn cluster_tree(&self, cluster: &Cluster, active_only: bool) -> ClusterTree {
        let mut directories: Vec<&Directory> = self
            .directories
            .values()
            .filter(|d| d.cluster_id() == cluster.external_id())
            .filter(|d| !active_only || d.state().is_active())
            .collect();
        directories.sort_by_key(|d| d.created_at());

        ClusterTree {
            cluster: cluster.clone(),
            directories: directories
                .into_iter()
                .map(|d| self.directory_tree(d, active_only))
                .collect(),
        }
    }

    /// An active cluster with its active directories and their active files.
    pub fn active_cluster_tree(&self, id: ExternalId) -> NotesResult<ClusterTree> {
        let cluster = self.active_cluster(id)?;
        Ok(self.cluster_tree(cluster, true))
    }

    /// A cluster in any state with every descendant row.
    pub fn full_cluster_tree(&self, id: ExternalId) -> NotesResult<ClusterTree> {
        let cluster = self
            .cluster(id)
            .ok_or_else(|| NotesError::not_found(ResourceKind::Cluster, id))?;
        Ok(self.cluster_tree(cluster, false))
    }

    /// An active directory with its active files, plus its owning cluster.
    pub fn active_directory_tree(&self, id: ExternalId) -> NotesResult<(Cluster, DirectoryTree)> {
        let directory = self.active_directory(id)?;
        let cluster = self.active_cluster(directory.cluster_id())?;
        Ok((cluster.clone(), self.directory_tree(directory, true)))
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    pub(crate) fn append_history(&mut self, entries: impl IntoIterator<Item = DeleteHistoryEntry>) {
        self.history.extend(entries);
    }

    /// Version markers of the snapshots recorded by the file's own UPDATED entries.
    pub fn recorded_versions(&self, file_id: ExternalId) -> Vec<VersionMarker> {
        self.history
            .iter()
            .filter(|h| h.resource_id == file_id && h.event_type == EventType::Updated)
            .filter_map(|h| h.version)
            .collect()
    }

    /// Every history entry recorded for a cluster's subtree, in commit order.
    pub fn history_for_cluster(&self, cluster_id: ExternalId) -> Vec<DeleteHistoryEntry> {
        self.history
            .iter()
            .filter(|h| h.cluster_id == cluster_id)
            .cloned()
            .collect()
    }

    // ------------------------------------------------------------------
    // Removal
    // ------------------------------------------------------------------

    /// Logical paths of soft-deleted directories and files owned by other clusters.
    ///
    /// Reused titles map onto the same paths, so these mark archive snapshots that a purge of
    /// `cluster_id` must leave alone.
    pub fn soft_deleted_paths_outside(&self, cluster_id: ExternalId) -> BTreeSet<String> {
        let mut paths = BTreeSet::new();
        for directory in self.directories.values() {
            let Some(cluster) = self.cluster(directory.cluster_id()) else {
                continue;
            };
            if cluster.external_id() == cluster_id {
                continue;
            }
            if directory.state() == ExistenceState::SoftDeleted {
                paths.insert(model::directory_path(cluster, directory).to_string());
            }
            for file in self.files.values() {
                if file.directory_id() == directory.external_id()
                    && file.state() == ExistenceState::SoftDeleted
                {
                    paths.insert(model::file_path(cluster, directory, file).to_string());
                }
            }
        }
        paths
    }

    /// Removes a cluster, every row it owns and its history.
    pub(crate) fn remove_cluster_cascade(&mut self, cluster_id: ExternalId) -> NotesResult<()> {
        if self.clusters.remove(&cluster_id).is_none() {
            return Err(NotesError::not_found(ResourceKind::Cluster, cluster_id));
        }

        let directory_ids: Vec<ExternalId> = self
            .directories
            .values()
            .filter(|d| d.cluster_id() == cluster_id)
            .map(Directory::external_id)
            .collect();

        self.files
            .retain(|_, f| !directory_ids.contains(&f.directory_id()));
        self.directories.retain(|_, d| d.cluster_id() != cluster_id);
        self.history.retain(|h| h.cluster_id != cluster_id);

        Ok(())
    }
}

/// Thread-safe, durable holder of the [`StoreState`].
#[derive(Debug)]
pub struct EntityStore {
    state: RwLock<StoreState>,
    path: Option<PathBuf>,
}

impl EntityStore {
    /// Store that never touches disk. Used by tests.
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            path: None,
        }
    }

    /// Opens the store file at `path`, starting empty when the file does not exist yet.
    pub fn open(path: &Path) -> NotesResult<Self> {
        let state = match fs::read(path) {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(NotesError::StoreDeserialization)?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => StoreState::default(),
            Err(e) => return Err(NotesError::StoreRead(e)),
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(NotesError::StoreWrite)?;
        }

        Ok(Self {
            state: RwLock::new(state),
            path: Some(path.to_path_buf()),
        })
    }

    /// Runs a read-only query against a consistent view of the store.
    pub fn read<T>(&self, f: impl FnOnce(&StoreState) -> T) -> T {
        let guard = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    /// Applies `f` as one atomic commit.
    ///
    /// `f` works on a copy of the state. If it fails, or persisting the result fails, nothing
    /// is changed.
    pub fn commit<T>(&self, f: impl FnOnce(&mut StoreState) -> NotesResult<T>) -> NotesResult<T> {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);

        let mut next = guard.clone();
        let out = f(&mut next)?;

        if let Some(path) = &self.path {
            persist(path, &next)?;
        }

        *guard = next;
        Ok(out)
    }
}

fn persist(path: &Path, state: &StoreState) -> NotesResult<()> {
    let bytes = serde_json::to_vec_pretty(state).map_err(NotesError::StoreSerialization)?;
    let parent = path.parent().unwrap_or_else(|| Path::new("."));

    let mut temp = NamedTempFile::new_in(parent).map_err(NotesError::StoreWrite)?;
    temp.write_all(&bytes).map_err(NotesError::StoreWrite)?;
    temp.as_file().sync_all().map_err(NotesError::StoreWrite)?;
    temp.persist(path)
        .map_err(|e| NotesError::StoreWrite(e.error))?;

    Ok(())
}
