//! Entity model for clusters, directories, files and their deletion history.
//!
//! Entities are plain data with private fields. Mutation happens through a few narrow methods
//! (`touch`, `set_state`, `replace_content`) so the store is the only place where rows change
//! and the existence state machine cannot be bypassed.

use crate::{NotesError, NotesResult};
use chrono::{DateTime, Utc};
use notefs_files::LiveFileMetadata;
use notefs_types::{LogicalPath, ResourceName};
use notefs_uuid::{ExternalId, VersionMarker};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ============================================================================
// ENUMS
// ============================================================================

/// Kind of resource a history entry or error refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Cluster,
    Directory,
    File,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cluster => "cluster",
            Self::Directory => "directory",
            Self::File => "file",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event recorded in the deletion history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Deleted,
    Updated,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Deleted => "DELETED",
            Self::Updated => "UPDATED",
        })
    }
}

/// Existence state of a resource.
///
/// Transitions only move forward: `Active -> SoftDeleted -> Purged`. `Purged` rows are removed
/// from the store, so the variant mostly appears in transition errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistenceState {
    Active,
    SoftDeleted,
    Purged,
}

impl ExistenceState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns the next state if `to` is a legal forward step from `self`.
    fn step(self, to: ExistenceState) -> Option<ExistenceState> {
        match (self, to) {
            (Self::Active, Self::SoftDeleted) | (Self::SoftDeleted, Self::Purged) => Some(to),
            _ => None,
        }
    }
}

impl fmt::Display for ExistenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Active => "active",
            Self::SoftDeleted => "soft_deleted",
            Self::Purged => "purged",
        })
    }
}

fn transition(
    resource: ResourceKind,
    id: ExternalId,
    from: ExistenceState,
    to: ExistenceState,
) -> NotesResult<ExistenceState> {
    from.step(to).ok_or(NotesError::InvalidStateTransition {
        resource,
        id: id.to_string(),
        from,
        to,
    })
}

// ============================================================================
// ENTITIES
// ============================================================================

/// Top-level container owning directories.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    external_id: ExternalId,
    title: ResourceName,
    created_at: DateTime<Utc>,
    last_request_at: DateTime<Utc>,
    state: ExistenceState,
}

impl Cluster {
    pub(crate) fn new(title: ResourceName, now: DateTime<Utc>) -> Self {
        Self {
            external_id: ExternalId::new(),
            title,
            created_at: now,
            last_request_at: now,
            state: ExistenceState::Active,
        }
    }

    pub fn external_id(&self) -> ExternalId {
        self.external_id
    }

    pub fn title(&self) -> &ResourceName {
        &self.title
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_request_at(&self) -> DateTime<Utc> {
        self.last_request_at
    }

    pub fn state(&self) -> ExistenceState {
        self.state
    }

    pub fn logical_path(&self) -> LogicalPath {
        LogicalPath::cluster(self.title.clone())
    }

    /// Moves the last-request timestamp forward. Earlier instants are ignored.
    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_request_at {
            self.last_request_at = now;
        }
    }

    pub(crate) fn set_state(&mut self, to: ExistenceState) -> NotesResult<()> {
        self.state = transition(ResourceKind::Cluster, self.external_id, self.state, to)?;
        Ok(())
    }
}

/// Named folder inside a cluster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    external_id: ExternalId,
    cluster_id: ExternalId,
    name: ResourceName,
    created_at: DateTime<Utc>,
    state: ExistenceState,
}

impl Directory {
    pub(crate) fn new(cluster_id: ExternalId, name: ResourceName, now: DateTime<Utc>) -> Self {
        Self {
            external_id: ExternalId::new(),
            cluster_id,
            name,
            created_at: now,
            state: ExistenceState::Active,
        }
    }

    pub fn external_id(&self) -> ExternalId {
        self.external_id
    }

    pub fn cluster_id(&self) -> ExternalId {
        self.cluster_id
    }

    pub fn name(&self) -> &ResourceName {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> ExistenceState {
        self.state
    }

    pub(crate) fn set_state(&mut self, to: ExistenceState) -> NotesResult<()> {
        self.state = transition(ResourceKind::Directory, self.external_id, self.state, to)?;
        Ok(())
    }
}

/// A user file. Its bytes live behind the content gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedFile {
    external_id: ExternalId,
    directory_id: ExternalId,
    name: ResourceName,
    version: VersionMarker,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    size_bytes: u64,
    sha256: String,
    media_type: Option<String>,
    state: ExistenceState,
}

impl CreatedFile {
    pub(crate) fn new(
        directory_id: ExternalId,
        name: ResourceName,
        metadata: LiveFileMetadata,
    ) -> Self {
        Self {
            external_id: ExternalId::new(),
            directory_id,
            name,
            version: VersionMarker::new(),
            created_at: metadata.stored_at,
            updated_at: metadata.stored_at,
            size_bytes: metadata.size_bytes,
            sha256: metadata.sha256,
            media_type: metadata.media_type,
            state: ExistenceState::Active,
        }
    }

    pub fn external_id(&self) -> ExternalId {
        self.external_id
    }

    pub fn directory_id(&self) -> ExternalId {
        self.directory_id
    }

    pub fn name(&self) -> &ResourceName {
        &self.name
    }

    pub fn version(&self) -> VersionMarker {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    pub fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }

    pub fn state(&self) -> ExistenceState {
        self.state
    }

    /// Records new live content under a fresh version marker.
    pub(crate) fn replace_content(&mut self, version: VersionMarker, metadata: LiveFileMetadata) {
        self.version = version;
        self.updated_at = metadata.stored_at;
        self.size_bytes = metadata.size_bytes;
        self.sha256 = metadata.sha256;
        self.media_type = metadata.media_type;
    }

    pub(crate) fn set_state(&mut self, to: ExistenceState) -> NotesResult<()> {
        self.state = transition(ResourceKind::File, self.external_id, self.state, to)?;
        Ok(())
    }
}

/// One row of the append-only deletion history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteHistoryEntry {
    pub id: ExternalId,
    pub event_type: EventType,
    pub resource_kind: ResourceKind,
    pub resource_id: ExternalId,
    pub cluster_id: ExternalId,
    /// Logical path of the affected resource, e.g. `Notes/Drafts/a.txt`.
    pub logical_path: String,
    /// Archive path (relative to the archive root) when a snapshot was taken.
    pub archive_path: Option<String>,
    /// Version marker the snapshot was stored under, for UPDATED entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionMarker>,
    pub occurred_at: DateTime<Utc>,
}

// ============================================================================
// AGGREGATES
// ============================================================================

/// A cluster together with its directories and their files.
///
/// Built by the store from a single consistent read. Which descendants are included depends on
/// the query; the orchestrator works on trees holding only active descendants.
#[derive(Clone, Debug)]
pub struct ClusterTree {
    pub cluster: Cluster,
    pub directories: Vec<DirectoryTree>,
}

impl ClusterTree {
    pub fn file_count(&self) -> usize {
        self.directories.iter().map(|d| d.files.len()).sum()
    }

    /// Ids of every directory and file in the tree.
    pub fn descendant_ids(&self) -> BTreeSet<ExternalId> {
        self.directories
            .iter()
            .flat_map(|d| d.file_ids().into_iter().chain([d.directory.external_id()]))
            .collect()
    }
}

/// A directory together with its files.
#[derive(Clone, Debug)]
pub struct DirectoryTree {
    pub directory: Directory,
    pub files: Vec<CreatedFile>,
}

impl DirectoryTree {
    pub fn file_ids(&self) -> BTreeSet<ExternalId> {
        self.files.iter().map(CreatedFile::external_id).collect()
    }
}

/// A file with the names of its owners, enough to derive live and archive paths.
#[derive(Clone, Debug)]
pub struct FileContext {
    pub cluster: Cluster,
    pub directory: Directory,
    pub file: CreatedFile,
}

impl FileContext {
    pub fn logical_path(&self) -> LogicalPath {
        file_path(&self.cluster, &self.directory, &self.file)
    }
}

pub(crate) fn directory_path(cluster: &Cluster, directory: &Directory) -> LogicalPath {
    cluster.logical_path().with_directory(directory.name().clone())
}

pub(crate) fn file_path(cluster: &Cluster, directory: &Directory, file: &CreatedFile) -> LogicalPath {
    LogicalPath::file(
        cluster.title().clone(),
        directory.name().clone(),
        file.name().clone(),
    )
}

// ============================================================================
// READ VIEWS
// ============================================================================

/// Read view of a file returned by cluster reads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileView {
    pub external_id: ExternalId,
    pub name: String,
    pub version: VersionMarker,
    pub size_bytes: u64,
    pub updated_at: DateTime<Utc>,
}

/// Read view of a directory and its active files.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DirectoryView {
    pub external_id: ExternalId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub files: Vec<FileView>,
}

/// Read view of an active cluster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ClusterView {
    pub external_id: ExternalId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub last_request_at: DateTime<Utc>,
    pub directories: Vec<DirectoryView>,
}

impl From<&CreatedFile> for FileView {
    fn from(file: &CreatedFile) -> Self {
        Self {
            external_id: file.external_id(),
            name: file.name().to_string(),
            version: file.version(),
            size_bytes: file.size_bytes(),
            updated_at: file.updated_at(),
        }
    }
}

impl From<&DirectoryTree> for DirectoryView {
    fn from(tree: &DirectoryTree) -> Self {
        Self {
            external_id: tree.directory.external_id(),
            name: tree.directory.name().to_string(),
            created_at: tree.directory.created_at(),
            files: tree.files.iter().map(FileView::from).collect(),
        }
    }
}

impl From<&ClusterTree> for ClusterView {
    fn from(tree: &ClusterTree) -> Self {
        Self {
            external_id: tree.cluster.external_id(),
            title: tree.cluster.title().to_string(),
            created_at: tree.cluster.created_at(),
            last_request_at: tree.cluster.last_request_at(),
            directories: tree.directories.iter().map(DirectoryView::from).collect(),
        }
    }
}

/// Content of a file as returned by `read_file`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileContent {
    pub name: String,
    pub version: VersionMarker,
    pub content: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn name(s: &str) -> ResourceName {
        ResourceName::new(s).unwrap()
    }

    #[test]
    fn existence_only_moves_forward() {
        let mut cluster = Cluster::new(name("Notes"), Utc::now());

        cluster.set_state(ExistenceState::SoftDeleted).unwrap();
        let err = cluster.set_state(ExistenceState::Active).unwrap_err();
        assert!(matches!(
            err,
            NotesError::InvalidStateTransition {
                from: ExistenceState::SoftDeleted,
                to: ExistenceState::Active,
                ..
            }
        ));

        cluster.set_state(ExistenceState::Purged).unwrap();
        assert_eq!(cluster.state(), ExistenceState::Purged);
    }

    #[test]
    fn soft_delete_twice_is_rejected() {
        let mut directory = Directory::new(ExternalId::new(), name("Drafts"), Utc::now());

        directory.set_state(ExistenceState::SoftDeleted).unwrap();

        assert!(directory.set_state(ExistenceState::SoftDeleted).is_err());
    }

    #[test]
    fn active_cannot_skip_to_purged() {
        let mut cluster = Cluster::new(name("Notes"), Utc::now());

        assert!(cluster.set_state(ExistenceState::Purged).is_err());
        assert_eq!(cluster.state(), ExistenceState::Active);
    }

    #[test]
    fn touch_is_monotonic() {
        let now = Utc::now();
        let mut cluster = Cluster::new(name("Notes"), now);

        cluster.touch(now + Duration::seconds(10));
        cluster.touch(now + Duration::seconds(5));

        assert_eq!(cluster.last_request_at(), now + Duration::seconds(10));
    }

    #[test]
    fn file_context_builds_full_path() {
        let now = Utc::now();
        let cluster = Cluster::new(name("Notes"), now);
        let directory = Directory::new(cluster.external_id(), name("Drafts"), now);
        let metadata = LiveFileMetadata {
            sha256: String::new(),
            size_bytes: 5,
            media_type: None,
            stored_at: now,
        };
        let file = CreatedFile::new(directory.external_id(), name("a.txt"), metadata);

        let ctx = FileContext {
            cluster,
            directory,
            file,
        };

        assert_eq!(ctx.logical_path().to_string(), "Notes/Drafts/a.txt");
    }

    #[test]
    fn event_type_serializes_upper_case() {
        assert_eq!(
            serde_json::to_string(&EventType::Deleted).unwrap(),
            "\"DELETED\""
        );
        assert_eq!(EventType::Updated.to_string(), "UPDATED");
    }
}
