//! Input validation utilities.
//!
//! Shape checks (name syntax) happen when a [`ResourceName`] is built. The checks here need
//! the store: owner existence and name uniqueness. They run inside the same commit as the
//! insert they guard, so two concurrent creates cannot both pass.

use crate::constants::MAX_FILE_BYTES;
use crate::model::ResourceKind;
use crate::store::StoreState;
use crate::{NotesError, NotesResult};
use notefs_types::ResourceName;
use notefs_uuid::ExternalId;

/// Validates that no active cluster already uses `title`.
pub fn validate_cluster_creation(s: &StoreState, title: &ResourceName) -> NotesResult<()> {
    if s.active_cluster_by_title(title).is_some() {
        return Err(NotesError::AlreadyExists {
            resource: ResourceKind::Cluster,
            name: title.to_string(),
        });
    }
    Ok(())
}

/// Validates that the cluster is active and has no active directory called `name`.
///
/// # Errors
///
/// `ResourceNotFound` when the cluster is absent or deleted, `AlreadyExists` on a name clash.
pub fn validate_directory_creation(
    s: &StoreState,
    cluster_id: ExternalId,
    name: &ResourceName,
) -> NotesResult<()> {
    s.active_cluster(cluster_id)?;

    if s.active_directory_by_name(cluster_id, name).is_some() {
        return Err(NotesError::AlreadyExists {
            resource: ResourceKind::Directory,
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Validates that the directory (and its cluster) is active, the name is free and the content
/// is within the size limit.
pub fn validate_file_creation(
    s: &StoreState,
    directory_id: ExternalId,
    name: &ResourceName,
    content: &[u8],
) -> NotesResult<()> {
    s.active_directory(directory_id)?;

    if s.active_file_by_name(directory_id, name).is_some() {
        return Err(NotesError::AlreadyExists {
            resource: ResourceKind::File,
            name: name.to_string(),
        });
    }
    validate_content_size(content)
}

pub fn validate_content_size(content: &[u8]) -> NotesResult<()> {
    if content.len() > MAX_FILE_BYTES {
        return Err(NotesError::InvalidInput(format!(
            "content exceeds maximum size of {MAX_FILE_BYTES} bytes"
        )));
    }
    Ok(())
}
