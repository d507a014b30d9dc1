//! # notefs core
//!
//! Storage engine for a hierarchy of user content (clusters → directories → files) with
//! soft-delete, deletion history and zip archival of deleted or superseded content.
//!
//! - [`store`]: durable entity store with atomic commits
//! - [`archive`]: zip snapshots keyed by resource path
//! - [`archival`]: archival engine and the process-wide archival section
//! - [`history`]: deletion plans and the history sink
//! - [`existence`]: soft-delete state flips across a subtree
//! - [`services`]: cluster, directory and file operations tying the above together
//!
//! **No transport concerns**: HTTP routing and payload mapping belong in a caller.
//!
//! ```no_run
//! use notefs_core::{CompressionConfig, CoreConfig, NotesContext};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = CoreConfig::under(Path::new("notefs_data"), CompressionConfig::default())?;
//! let ctx = NotesContext::open(Arc::new(cfg))?;
//!
//! let cluster = ctx.clusters().create_cluster("Notes")?;
//! let drafts = ctx.directories().create_directory(cluster.external_id(), "Drafts")?;
//! ctx.files().add_file(drafts.external_id(), "a.txt", b"hello")?;
//!
//! ctx.clusters().delete_cluster(cluster.external_id())?;
//! # Ok(())
//! # }
//! ```

pub mod archival;
pub mod archive;
pub mod config;
pub mod constants;
pub mod error;
pub mod existence;
pub mod history;
pub mod model;
pub mod services;
pub mod store;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use archival::{ArchivalEngine, ArchivalSection, DirectoryManifest};
pub use archive::{ArchiveKey, ArchiveRef, ArchiveStore, SnapshotKind, ZipArchiveStore};
pub use config::{
    compression_from_env_values, compression_level_from_env_value, CompressionConfig,
    CompressionMethod, CoreConfig,
};
pub use error::{ErrorKind, NotesError, NotesResult};
pub use model::{
    Cluster, ClusterView, CreatedFile, DeleteHistoryEntry, Directory, DirectoryView,
    EventType, ExistenceState, FileContent, FileView, ResourceKind,
};
pub use services::{
    ClusterService, DeletionReport, DirectoryService, EraseReport, FileService, NotesContext,
};
pub use store::EntityStore;

pub use notefs_types::{LogicalPath, ResourceName};
pub use notefs_uuid::{ExternalId, VersionMarker};
