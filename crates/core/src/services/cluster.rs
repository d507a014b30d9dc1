//! Cluster lifecycle: create, read, soft-delete, history and erase.

use super::{DeletionReport, NotesContext};
use crate::archival::ArchivalSection;
use crate::existence::Flip;
use crate::history::DeletionPlan;
use crate::model::{
    self, Cluster, ClusterTree, ClusterView, DeleteHistoryEntry, ExistenceState, ResourceKind,
};
use crate::validation::validate_cluster_creation;
use crate::{NotesError, NotesResult};
use chrono::{DateTime, Utc};
use notefs_types::ResourceName;
use notefs_uuid::{ExternalId, VersionMarker};
use std::collections::BTreeMap;

/// Outcome of erasing a soft-deleted cluster.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct EraseReport {
    pub cluster_id: ExternalId,
    pub removed_snapshots: usize,
    pub removed_rows: usize,
}

#[derive(Clone, Debug)]
pub struct ClusterService {
    ctx: NotesContext,
}

impl ClusterService {
    pub(crate) fn new(ctx: NotesContext) -> Self {
        Self { ctx }
    }

    /// Creates a cluster and its live root folder.
    ///
    /// # Errors
    ///
    /// `InvalidName` for a malformed title, `AlreadyExists` when an active cluster already
    /// uses it.
    pub fn create_cluster(&self, title: &str) -> NotesResult<Cluster> {
        let title = ResourceName::new(title)?;

        let cluster = self.ctx.store.commit(|s| {
            validate_cluster_creation(s, &title)?;
            let cluster = Cluster::new(title.clone(), Utc::now());
            s.save_cluster(cluster.clone());
            Ok(cluster)
        })?;

        self.ctx.content.create_cluster_root(&cluster.logical_path())?;

        tracing::info!(
            "created cluster {} ({})",
            cluster.title(),
            cluster.external_id()
        );
        Ok(cluster)
    }

    /// Any cluster still in the store, deleted or not.
    pub fn find_by_external_id(&self, id: ExternalId) -> NotesResult<Cluster> {
        self.ctx.store.read(|s| {
            s.cluster(id)
                .cloned()
                .ok_or_else(|| NotesError::not_found(ResourceKind::Cluster, id))
        })
    }

    pub fn find_not_deleted_cluster_by_external_id(&self, id: ExternalId) -> NotesResult<Cluster> {
        self.ctx.store.read(|s| s.active_cluster(id).cloned())
    }

    pub fn find_all_not_deleted(&self) -> Vec<Cluster> {
        self.find_all_in(ExistenceState::Active)
    }

    pub fn find_all_deleted(&self) -> Vec<Cluster> {
        self.find_all_in(ExistenceState::SoftDeleted)
    }

    fn find_all_in(&self, state: ExistenceState) -> Vec<Cluster> {
        self.ctx
            .store
            .read(|s| s.clusters_in_state(state).into_iter().cloned().collect())
    }

    /// Whether an active cluster uses `title`.
    pub fn cluster_exists_by_title(&self, title: &str) -> NotesResult<bool> {
        let title = ResourceName::new(title)?;
        Ok(self
            .ctx
            .store
            .read(|s| s.active_cluster_by_title(&title).is_some()))
    }

    /// Moves the last-request timestamp of an active cluster to now.
    pub fn update_cluster_last_requested_time(&self, id: ExternalId) -> NotesResult<DateTime<Utc>> {
        self.ctx.store.commit(|s| {
            s.active_cluster(id)?;
            let cluster = s.cluster_mut(id)?;
            cluster.touch(Utc::now());
            Ok(cluster.last_request_at())
        })
    }

    /// Returns the active cluster with its active directories and files.
    pub fn read_cluster(&self, id: ExternalId) -> NotesResult<ClusterView> {
        let tree = self.ctx.store.commit(|s| {
            s.active_cluster(id)?;
            s.cluster_mut(id)?.touch(Utc::now());
            s.active_cluster_tree(id)
        })?;
        Ok(ClusterView::from(&tree))
    }

    /// Soft-deletes a cluster with every active directory and file below it.
    ///
    /// # Errors
    ///
    /// `ResourceNotFound` if the cluster is unknown or already deleted; nothing is written in
    /// that case. A `StorageFault` during archival leaves the history committed and the
    /// cluster active.
    pub fn delete_cluster(&self, id: ExternalId) -> NotesResult<DeletionReport> {
        let section = ArchivalSection::enter();

        let mut tree = self.ctx.store.read(|s| s.active_cluster_tree(id))?;
        let plan = DeletionPlan::for_cluster(&tree)?;
        self.ctx.history.record_plan(&plan)?;
        let mut history_entries = plan.len();
        self.archive(&section, &tree)?;

        let soft_deleted = loop {
            match self.ctx.existence.change_cluster_existing_status(&tree)? {
                Flip::Applied(changed) => break changed,
                Flip::Grown => {
                    let current = self.ctx.store.read(|s| s.active_cluster_tree(id))?;
                    let late = DeletionPlan::for_cluster_additions(&tree, &current)?;
                    tracing::info!(
                        "cluster {} gained {} resources during delete",
                        id,
                        late.len()
                    );
                    self.ctx.history.record_plan(&late)?;
                    history_entries += late.len();
                    self.archive(&section, &current)?;
                    tree = current;
                }
            }
        };

        let report = DeletionReport {
            cluster_id: id,
            history_entries,
            archived_files: tree.file_count(),
            archived_directories: tree.directories.len(),
            soft_deleted,
        };
        tracing::info!(
            "soft-deleted cluster {} ({} resources, {} files archived)",
            id,
            report.soft_deleted,
            report.archived_files
        );
        Ok(report)
    }

    fn archive(&self, section: &ArchivalSection, tree: &ClusterTree) -> NotesResult<()> {
        self.ctx
            .engine
            .archive_cluster(section, tree)
            .inspect_err(|e| {
                tracing::warn!(
                    "archival of cluster {} aborted: {}",
                    tree.cluster.external_id(),
                    e
                );
            })?;
        Ok(())
    }

    /// Every history entry recorded for the cluster. Works on deleted clusters too.
    pub fn get_cluster_delete_history(&self, id: ExternalId) -> NotesResult<Vec<DeleteHistoryEntry>> {
        self.ctx.history.get_cluster_delete_history(id)
    }

    /// Permanently removes a soft-deleted cluster, its rows, history and archive snapshots.
    ///
    /// # Errors
    ///
    /// `ResourceNotFound` for an unknown id, `InvalidStateTransition` for an active cluster.
    pub fn erase_cluster(&self, id: ExternalId) -> NotesResult<EraseReport> {
        let section = ArchivalSection::enter();

        let (tree, versions, shared) = self.ctx.store.read(|s| {
            let tree = s.full_cluster_tree(id)?;
            let versions: BTreeMap<ExternalId, Vec<VersionMarker>> = tree
                .directories
                .iter()
                .flat_map(|d| &d.files)
                .map(|f| (f.external_id(), s.recorded_versions(f.external_id())))
                .collect();
            Ok::<_, NotesError>((tree, versions, s.soft_deleted_paths_outside(id)))
        })?;
        let state = tree.cluster.state();
        if state != ExistenceState::SoftDeleted {
            return Err(NotesError::InvalidStateTransition {
                resource: ResourceKind::Cluster,
                id: id.to_string(),
                from: state,
                to: ExistenceState::Purged,
            });
        }

        let engine = &self.ctx.engine;
        let mut removed_snapshots = 0;
        for directory in &tree.directories {
            for file in &directory.files {
                let recorded = versions
                    .get(&file.external_id())
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                let path = model::file_path(&tree.cluster, &directory.directory, file);
                removed_snapshots += if shared.contains(&path.to_string()) {
                    // the terminal snapshot now holds another cluster's content
                    engine.purge_versions(&section, &path, recorded)?
                } else {
                    engine.purge_archive(
                        &section,
                        &tree.cluster,
                        &directory.directory,
                        file,
                        recorded,
                    )?
                };
            }
            let directory_path = model::directory_path(&tree.cluster, &directory.directory);
            if !shared.contains(&directory_path.to_string())
                && engine.purge_directory_marker(&section, &tree.cluster, &directory.directory)?
            {
                removed_snapshots += 1;
            }
        }
        self.ctx.engine.prune(&section, &tree)?;

        self.ctx.store.commit(|s| {
            s.cluster_mut(id)?.set_state(ExistenceState::Purged)?;
            s.remove_cluster_cascade(id)
        })?;

        let report = EraseReport {
            cluster_id: id,
            removed_snapshots,
            removed_rows: 1 + tree.directories.len() + tree.file_count(),
        };
        tracing::info!(
            "erased cluster {} ({} rows, {} snapshots)",
            id,
            report.removed_rows,
            report.removed_snapshots
        );
        Ok(report)
    }

    /// Erases every soft-deleted cluster. Failures are logged and skipped.
    ///
    /// Returns how many clusters were erased.
    pub fn erase_deleted_clusters(&self) -> usize {
        let mut erased = 0;
        for cluster in self.find_all_deleted() {
            match self.erase_cluster(cluster.external_id()) {
                Ok(_) => erased += 1,
                Err(e) => tracing::warn!(
                    "failed to erase cluster {}: {}",
                    cluster.external_id(),
                    e
                ),
            }
        }
        erased
    }
}
