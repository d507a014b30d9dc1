//! notefs live content access
//!
//! This crate owns the byte content of live (non-archived) files. Relational state (which
//! clusters, directories and files exist, and whether they are deleted) lives elsewhere; this
//! crate only maps a [`LogicalPath`] onto the backing filesystem and moves bytes.
//!
//! ## Live Layout
//!
//! ```text
//! <content_root>/
//! └── <cluster title>/
//!     └── <directory name>/
//!         └── <file name>
//! ```
//!
//! Every segment comes from a validated [`notefs_types::ResourceName`], so derived paths never
//! escape the content root.
//!
//! ## Example Usage
//!
//! ```no_run
//! use notefs_files::{ContentGateway, FilesService};
//! use notefs_types::{LogicalPath, ResourceName};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let service = FilesService::new(Path::new("notefs_data/content"))?;
//! let cluster = LogicalPath::cluster(ResourceName::new("Notes")?);
//! service.create_cluster_root(&cluster)?;
//! # Ok(())
//! # }
//! ```

mod files;

pub use files::{ContentGateway, FilesService, LiveFileMetadata};
pub use notefs_types::LogicalPath;

/// Errors that can occur during live content operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// Root directory does not exist or is not a directory
    #[error("Invalid root directory: {0}")]
    InvalidRootDirectory(String),

    /// The live artifact for a logical path does not exist
    #[error("Live content not found: {0}")]
    NotFound(String),

    /// The logical path does not address the expected kind of resource
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
