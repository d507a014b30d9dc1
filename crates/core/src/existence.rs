//! Applies the soft-deleted state across an entity subtree.
//!
//! Each method is one store commit: either the whole subtree flips or nothing does. Inside the
//! commit the committed subtree is compared with the caller's tree. If a directory or file was
//! created after the tree was loaded, nothing changes and [`Flip::Grown`] tells the caller to
//! record and archive the newcomers first.

use crate::model::{ClusterTree, CreatedFile, DirectoryTree, ExistenceState};
use crate::store::{EntityStore, StoreState};
use crate::NotesResult;
use std::sync::Arc;

/// Outcome of a subtree flip.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flip {
    /// Number of resources moved to soft-deleted.
    Applied(usize),
    /// The committed subtree holds active resources missing from the caller's tree.
    Grown,
}

#[derive(Clone, Debug)]
pub struct ExistenceStateChanger {
    store: Arc<EntityStore>,
}

impl ExistenceStateChanger {
    pub fn new(store: Arc<EntityStore>) -> Self {
        Self { store }
    }

    /// Soft-deletes the cluster, its active directories and their active files.
    pub fn change_cluster_existing_status(&self, tree: &ClusterTree) -> NotesResult<Flip> {
        let cluster_id = tree.cluster.external_id();
        let handled = tree.descendant_ids();
        self.store.commit(|s| {
            let current = s.active_cluster_tree(cluster_id)?;
            if !current.descendant_ids().is_subset(&handled) {
                return Ok(Flip::Grown);
            }

            s.cluster_mut(cluster_id)?
                .set_state(ExistenceState::SoftDeleted)?;
            let mut changed = 1;
            for directory in &current.directories {
                changed += soft_delete_directory(s, directory)?;
            }
            Ok(Flip::Applied(changed))
        })
    }

    /// Soft-deletes the directory and its active files.
    pub fn change_directory_existing_status(&self, tree: &DirectoryTree) -> NotesResult<Flip> {
        let directory_id = tree.directory.external_id();
        let handled = tree.file_ids();
        self.store.commit(|s| {
            let (_, current) = s.active_directory_tree(directory_id)?;
            if !current.file_ids().is_subset(&handled) {
                return Ok(Flip::Grown);
            }
            Ok(Flip::Applied(soft_delete_directory(s, &current)?))
        })
    }

    pub fn change_file_existing_status(&self, file: &CreatedFile) -> NotesResult<usize> {
        let file_id = file.external_id();
        self.store.commit(|s| {
            s.file_mut(file_id)?.set_state(ExistenceState::SoftDeleted)?;
            Ok(1)
        })
    }
}

fn soft_delete_directory(s: &mut StoreState, tree: &DirectoryTree) -> NotesResult<usize> {
    s.directory_mut(tree.directory.external_id())?
        .set_state(ExistenceState::SoftDeleted)?;
    for file in &tree.files {
        s.file_mut(file.external_id())?
            .set_state(ExistenceState::SoftDeleted)?;
    }
    Ok(1 + tree.files.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Cluster, Directory};
    use chrono::Utc;
    use notefs_files::LiveFileMetadata;
    use notefs_types::ResourceName;
    use notefs_uuid::ExternalId;

    fn name(s: &str) -> ResourceName {
        ResourceName::new(s).unwrap()
    }

    fn metadata() -> LiveFileMetadata {
        LiveFileMetadata {
            sha256: String::new(),
            size_bytes: 0,
            media_type: None,
            stored_at: Utc::now(),
        }
    }

    fn seeded() -> (Arc<EntityStore>, ExternalId) {
        let store = Arc::new(EntityStore::in_memory());
        let cluster_id = store
            .commit(|s| {
                let cluster = Cluster::new(name("Notes"), Utc::now());
                for dir_name in ["Drafts", "Final"] {
                    let directory =
                        Directory::new(cluster.external_id(), name(dir_name), Utc::now());
                    for file_name in ["a.txt", "b.txt"] {
                        s.save_file(CreatedFile::new(
                            directory.external_id(),
                            name(file_name),
                            metadata(),
                        ));
                    }
                    s.save_directory(directory);
                }
                let id = cluster.external_id();
                s.save_cluster(cluster);
                Ok(id)
            })
            .unwrap();
        (store, cluster_id)
    }

    #[test]
    fn cluster_flip_covers_whole_subtree() {
        let (store, cluster_id) = seeded();
        let changer = ExistenceStateChanger::new(store.clone());
        let tree = store.read(|s| s.active_cluster_tree(cluster_id)).unwrap();

        let changed = changer.change_cluster_existing_status(&tree).unwrap();

        assert_eq!(changed, Flip::Applied(7));
        let full = store.read(|s| s.full_cluster_tree(cluster_id)).unwrap();
        assert_eq!(full.cluster.state(), ExistenceState::SoftDeleted);
        assert!(full
            .directories
            .iter()
            .flat_map(|d| d.files.iter().map(CreatedFile::state).chain([d.directory.state()]))
            .all(|state| state == ExistenceState::SoftDeleted));
    }

    #[test]
    fn second_flip_is_rejected_without_changes() {
        let (store, cluster_id) = seeded();
        let changer = ExistenceStateChanger::new(store.clone());
        let tree = store.read(|s| s.active_cluster_tree(cluster_id)).unwrap();
        let directory = tree.directories[0].clone();

        changer.change_directory_existing_status(&directory).unwrap();
        let err = changer.change_directory_existing_status(&directory);

        assert!(err.is_err());
        let active = store.read(|s| s.active_cluster_tree(cluster_id)).unwrap();
        assert_eq!(active.directories.len(), 1);
        assert_eq!(active.file_count(), 2);
    }

    #[test]
    fn flip_refuses_subtree_that_grew() {
        let (store, cluster_id) = seeded();
        let changer = ExistenceStateChanger::new(store.clone());
        let tree = store.read(|s| s.active_cluster_tree(cluster_id)).unwrap();
        let directory_id = tree.directories[0].directory.external_id();
        store
            .commit(|s| {
                s.save_file(CreatedFile::new(directory_id, name("late.txt"), metadata()));
                Ok(())
            })
            .unwrap();

        assert_eq!(
            changer.change_cluster_existing_status(&tree).unwrap(),
            Flip::Grown
        );
        assert_eq!(
            changer
                .change_directory_existing_status(&tree.directories[0])
                .unwrap(),
            Flip::Grown
        );
        let active = store.read(|s| s.active_cluster_tree(cluster_id)).unwrap();
        assert_eq!(active.file_count(), 5);

        let current = store.read(|s| s.active_cluster_tree(cluster_id)).unwrap();
        assert_eq!(
            changer.change_cluster_existing_status(&current).unwrap(),
            Flip::Applied(8)
        );
    }

    #[test]
    fn file_flip_leaves_siblings_active() {
        let (store, cluster_id) = seeded();
        let changer = ExistenceStateChanger::new(store.clone());
        let tree = store.read(|s| s.active_cluster_tree(cluster_id)).unwrap();

        changer
            .change_file_existing_status(&tree.directories[0].files[0])
            .unwrap();

        let active = store.read(|s| s.active_cluster_tree(cluster_id)).unwrap();
        assert_eq!(active.file_count(), 3);
    }
}
