use super::{DeletionReport, NotesContext};
use crate::archival::ArchivalSection;
use crate::existence::Flip;
use crate::history::DeletionPlan;
use crate::model::{self, Cluster, Directory, DirectoryTree, DirectoryView};
use crate::validation::validate_directory_creation;
use crate::NotesResult;
use chrono::Utc;
use notefs_types::ResourceName;
use notefs_uuid::ExternalId;

#[derive(Clone, Debug)]
pub struct DirectoryService {
    ctx: NotesContext,
}

impl DirectoryService {
    pub(crate) fn new(ctx: NotesContext) -> Self {
        Self { ctx }
    }

    /// Creates a directory inside an active cluster and its live folder.
    pub fn create_directory(&self, cluster_id: ExternalId, name: &str) -> NotesResult<Directory> {
        let name = ResourceName::new(name)?;

        let (cluster, directory) = self.ctx.store.commit(|s| {
            validate_directory_creation(s, cluster_id, &name)?;
            let now = Utc::now();
            let directory = Directory::new(cluster_id, name.clone(), now);
            s.save_directory(directory.clone());
            let cluster = s.cluster_mut(cluster_id)?;
            cluster.touch(now);
            Ok((cluster.clone(), directory))
        })?;

        self.ctx
            .content
            .create_directory(&model::directory_path(&cluster, &directory))?;

        tracing::info!(
            "created directory {}/{} ({})",
            cluster.title(),
            directory.name(),
            directory.external_id()
        );
        Ok(directory)
    }

    /// An active directory of an active cluster.
    pub fn find_directory(&self, id: ExternalId) -> NotesResult<Directory> {
        self.ctx.store.read(|s| s.active_directory(id).cloned())
    }

    /// Returns the directory with its active files and touches the owning cluster.
    pub fn read_directory(&self, id: ExternalId) -> NotesResult<DirectoryView> {
        let tree = self.ctx.store.commit(|s| {
            let (cluster, tree) = s.active_directory_tree(id)?;
            s.cluster_mut(cluster.external_id())?.touch(Utc::now());
            Ok(tree)
        })?;
        Ok(DirectoryView::from(&tree))
    }

    /// Soft-deletes a directory and its active files.
    ///
    /// Files added while the archival pass runs are recorded and archived before the flip.
    pub fn delete_directory(&self, id: ExternalId) -> NotesResult<DeletionReport> {
        let section = ArchivalSection::enter();

        let (cluster, mut tree) = self.ctx.store.read(|s| s.active_directory_tree(id))?;
        let plan = DeletionPlan::for_directory(&cluster, &tree)?;
        self.ctx.history.record_plan(&plan)?;
        let mut history_entries = plan.len();
        self.archive(&section, &cluster, &tree)?;

        let soft_deleted = loop {
            match self.ctx.existence.change_directory_existing_status(&tree)? {
                Flip::Applied(changed) => break changed,
                Flip::Grown => {
                    let (_, current) = self.ctx.store.read(|s| s.active_directory_tree(id))?;
                    let late = DeletionPlan::for_directory_additions(&cluster, &tree, &current)?;
                    self.ctx.history.record_plan(&late)?;
                    history_entries += late.len();
                    self.archive(&section, &cluster, &current)?;
                    tree = current;
                }
            }
        };

        tracing::info!(
            "soft-deleted directory {}/{} ({} files archived)",
            cluster.title(),
            tree.directory.name(),
            tree.files.len()
        );
        Ok(DeletionReport {
            cluster_id: cluster.external_id(),
            history_entries,
            archived_files: tree.files.len(),
            archived_directories: 1,
            soft_deleted,
        })
    }

    fn archive(
        &self,
        section: &ArchivalSection,
        cluster: &Cluster,
        tree: &DirectoryTree,
    ) -> NotesResult<()> {
        self.ctx
            .engine
            .archive_directory(section, cluster, tree)
            .inspect_err(|e| {
                tracing::warn!(
                    "archival of directory {} aborted: {}",
                    tree.directory.external_id(),
                    e
                );
            })?;
        Ok(())
    }
}
