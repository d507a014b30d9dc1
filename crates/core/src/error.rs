use crate::model::{ExistenceState, ResourceKind};
use std::path::PathBuf;

/// Coarse classification of every [`NotesError`].
///
/// Callers branch on this rather than on individual variants: `NotFound` and
/// `ValidationFailure` mean nothing was changed, `StorageFault` means an I/O failure aborted
/// the operation part-way and may need operator attention.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    ValidationFailure,
    StorageFault,
}

#[derive(Debug, thiserror::Error)]
pub enum NotesError {
    #[error("{resource} not found: {id}")]
    ResourceNotFound { resource: ResourceKind, id: String },
    #[error("live content not found: {0}")]
    ContentNotFound(String),
    #[error("archive snapshot not found: {}", .0.display())]
    SnapshotNotFound(PathBuf),

    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid name: {0}")]
    InvalidName(#[from] notefs_types::TextError),
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] notefs_uuid::UuidError),
    #[error("{resource} named '{name}' already exists")]
    AlreadyExists { resource: ResourceKind, name: String },
    #[error("{resource} {id} cannot move from {from} to {to}")]
    InvalidStateTransition {
        resource: ResourceKind,
        id: String,
        from: ExistenceState,
        to: ExistenceState,
    },

    #[error("content access failed: {0}")]
    Content(#[source] notefs_files::FilesError),
    #[error("version snapshot already exists: {}", .0.display())]
    SnapshotCollision(PathBuf),
    #[error("failed to write archive snapshot {}: {source}", .path.display())]
    ArchiveWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read archive snapshot {}: {source}", .path.display())]
    ArchiveRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to delete archive snapshot {}: {source}", .path.display())]
    ArchiveDelete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("zip error for {}: {source}", .path.display())]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("failed to serialize directory manifest: {0}")]
    ManifestSerialization(serde_json::Error),
    #[error("failed to read store file: {0}")]
    StoreRead(std::io::Error),
    #[error("failed to write store file: {0}")]
    StoreWrite(std::io::Error),
    #[error("failed to serialize store: {0}")]
    StoreSerialization(serde_json::Error),
    #[error("failed to deserialize store: {0}")]
    StoreDeserialization(serde_json::Error),
}

impl NotesError {
    pub(crate) fn not_found(resource: ResourceKind, id: impl ToString) -> Self {
        Self::ResourceNotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ResourceNotFound { .. } | Self::ContentNotFound(_) | Self::SnapshotNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::InvalidInput(_)
            | Self::InvalidName(_)
            | Self::InvalidId(_)
            | Self::AlreadyExists { .. }
            | Self::InvalidStateTransition { .. } => ErrorKind::ValidationFailure,
            Self::Content(_)
            | Self::SnapshotCollision(_)
            | Self::ArchiveWrite { .. }
            | Self::ArchiveRead { .. }
            | Self::ArchiveDelete { .. }
            | Self::Zip { .. }
            | Self::ManifestSerialization(_)
            | Self::StoreRead(_)
            | Self::StoreWrite(_)
            | Self::StoreSerialization(_)
            | Self::StoreDeserialization(_) => ErrorKind::StorageFault,
        }
    }
}

impl From<notefs_files::FilesError> for NotesError {
    fn from(err: notefs_files::FilesError) -> Self {
        match err {
            notefs_files::FilesError::NotFound(path) => Self::ContentNotFound(path),
            other => Self::Content(other),
        }
    }
}

pub type NotesResult<T> = std::result::Result<T, NotesError>;
