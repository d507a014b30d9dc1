//! Deletion plans and the history sink.
//!
//! A [`DeletionPlan`] is the flat list of resources a delete affects, built from a loaded tree
//! before anything is written. The plan is committed to history in one go, then the archival
//! pass runs over the same tree. Resources created under the target while the archival pass
//! runs get a follow-up plan built with [`DeletionPlan::for_cluster_additions`] or
//! [`DeletionPlan::for_directory_additions`].

use crate::archive::ArchiveKey;
use crate::model::{
    self, Cluster, ClusterTree, DeleteHistoryEntry, DirectoryTree, EventType, FileContext,
    ResourceKind,
};
use crate::store::EntityStore;
use crate::NotesResult;
use chrono::Utc;
use notefs_types::LogicalPath;
use notefs_uuid::{ExternalId, VersionMarker};
use std::collections::BTreeSet;
use std::sync::Arc;

/// One resource affected by a delete.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedEvent {
    pub event_type: EventType,
    pub resource_kind: ResourceKind,
    pub resource_id: ExternalId,
    pub logical_path: LogicalPath,
    pub archive_path: Option<String>,
}

/// Flat, ordered list of the history entries a delete will record.
#[derive(Clone, Debug)]
pub struct DeletionPlan {
    cluster_id: ExternalId,
    events: Vec<PlannedEvent>,
}

impl DeletionPlan {
    /// Cluster first, then each directory followed by its files.
    pub fn for_cluster(tree: &ClusterTree) -> NotesResult<Self> {
        let mut events = vec![PlannedEvent {
            event_type: EventType::Deleted,
            resource_kind: ResourceKind::Cluster,
            resource_id: tree.cluster.external_id(),
            logical_path: tree.cluster.logical_path(),
            archive_path: None,
        }];
        for directory in &tree.directories {
            push_directory(&mut events, &tree.cluster, directory, &BTreeSet::new())?;
        }
        Ok(Self {
            cluster_id: tree.cluster.external_id(),
            events,
        })
    }

    /// Events for the directories and files of `current` that `handled` does not hold.
    pub fn for_cluster_additions(handled: &ClusterTree, current: &ClusterTree) -> NotesResult<Self> {
        let known = handled.descendant_ids();
        let mut events = Vec::new();
        for directory in &current.directories {
            push_directory(&mut events, &current.cluster, directory, &known)?;
        }
        Ok(Self {
            cluster_id: current.cluster.external_id(),
            events,
        })
    }

    pub fn for_directory(cluster: &Cluster, tree: &DirectoryTree) -> NotesResult<Self> {
        let mut events = Vec::with_capacity(tree.files.len() + 1);
        push_directory(&mut events, cluster, tree, &BTreeSet::new())?;
        Ok(Self {
            cluster_id: cluster.external_id(),
            events,
        })
    }

    /// Events for the files of `current` that `handled` does not hold.
    pub fn for_directory_additions(
        cluster: &Cluster,
        handled: &DirectoryTree,
        current: &DirectoryTree,
    ) -> NotesResult<Self> {
        let mut known = handled.file_ids();
        known.insert(handled.directory.external_id());
        let mut events = Vec::new();
        push_directory(&mut events, cluster, current, &known)?;
        Ok(Self {
            cluster_id: cluster.external_id(),
            events,
        })
    }

    pub fn for_file(ctx: &FileContext) -> NotesResult<Self> {
        let path = ctx.logical_path();
        Ok(Self {
            cluster_id: ctx.cluster.external_id(),
            events: vec![PlannedEvent {
                event_type: EventType::Deleted,
                resource_kind: ResourceKind::File,
                resource_id: ctx.file.external_id(),
                archive_path: Some(ArchiveKey::terminal(&path)?.relative_path()),
                logical_path: path,
            }],
        })
    }

    pub fn cluster_id(&self) -> ExternalId {
        self.cluster_id
    }

    pub fn events(&self) -> &[PlannedEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Pushes the directory and its files, skipping ids in `known`.
fn push_directory(
    events: &mut Vec<PlannedEvent>,
    cluster: &Cluster,
    tree: &DirectoryTree,
    known: &BTreeSet<ExternalId>,
) -> NotesResult<()> {
    let directory_path = model::directory_path(cluster, &tree.directory);
    if !known.contains(&tree.directory.external_id()) {
        events.push(PlannedEvent {
            event_type: EventType::Deleted,
            resource_kind: ResourceKind::Directory,
            resource_id: tree.directory.external_id(),
            archive_path: Some(ArchiveKey::directory_marker(&directory_path)?.relative_path()),
            logical_path: directory_path,
        });
    }
    for file in tree.files.iter().filter(|f| !known.contains(&f.external_id())) {
        let path = model::file_path(cluster, &tree.directory, file);
        events.push(PlannedEvent {
            event_type: EventType::Deleted,
            resource_kind: ResourceKind::File,
            resource_id: file.external_id(),
            archive_path: Some(ArchiveKey::terminal(&path)?.relative_path()),
            logical_path: path,
        });
    }
    Ok(())
}

/// Append-only writer and reader of [`DeleteHistoryEntry`] rows.
#[derive(Clone, Debug)]
pub struct DeleteHistoryService {
    store: Arc<EntityStore>,
}

impl DeleteHistoryService {
    pub fn new(store: Arc<EntityStore>) -> Self {
        Self { store }
    }

    /// Commits every planned entry and touches the owning cluster, all in one commit.
    pub fn record_plan(&self, plan: &DeletionPlan) -> NotesResult<Vec<DeleteHistoryEntry>> {
        if plan.is_empty() {
            return Ok(Vec::new());
        }
        let now = Utc::now();
        let entries: Vec<DeleteHistoryEntry> = plan
            .events()
            .iter()
            .map(|event| DeleteHistoryEntry {
                id: ExternalId::new(),
                event_type: event.event_type,
                resource_kind: event.resource_kind,
                resource_id: event.resource_id,
                cluster_id: plan.cluster_id(),
                logical_path: event.logical_path.to_string(),
                archive_path: event.archive_path.clone(),
                version: None,
                occurred_at: now,
            })
            .collect();

        self.store.commit(|s| {
            s.cluster_mut(plan.cluster_id())?.touch(now);
            s.append_history(entries.iter().cloned());
            Ok(())
        })?;

        tracing::debug!(
            "recorded {} history entries for cluster {}",
            entries.len(),
            plan.cluster_id()
        );
        Ok(entries)
    }

    /// Builds the UPDATED entry for a content update. Committed by the caller together with
    /// the row change.
    pub fn update_entry(
        ctx: &FileContext,
        version: VersionMarker,
        archive_path: String,
    ) -> DeleteHistoryEntry {
        DeleteHistoryEntry {
            id: ExternalId::new(),
            event_type: EventType::Updated,
            resource_kind: ResourceKind::File,
            resource_id: ctx.file.external_id(),
            cluster_id: ctx.cluster.external_id(),
            logical_path: ctx.logical_path().to_string(),
            archive_path: Some(archive_path),
            version: Some(version),
            occurred_at: Utc::now(),
        }
    }

    /// History of a cluster in any non-purged state, oldest first. Touches the cluster.
    pub fn get_cluster_delete_history(
        &self,
        cluster_id: ExternalId,
    ) -> NotesResult<Vec<DeleteHistoryEntry>> {
        self.store.commit(|s| {
            s.cluster_mut(cluster_id)?.touch(Utc::now());
            Ok(s.history_for_cluster(cluster_id))
        })
    }
}
