use crate::archive::ZipArchiveStore;
use crate::config::CompressionConfig;
use crate::services::NotesContext;
use crate::store::EntityStore;
use notefs_files::FilesService;
use std::sync::Arc;
use tempfile::TempDir;

/// Context with an in-memory store and real content/archive roots in a temp dir.
pub(crate) fn memory_context() -> (TempDir, NotesContext) {
    let temp = TempDir::new().unwrap();
    let content = Arc::new(FilesService::new(&temp.path().join("content")).unwrap());
    let archive = Arc::new(
        ZipArchiveStore::new(&temp.path().join("archive"), CompressionConfig::default()).unwrap(),
    );
    let ctx = NotesContext::with_parts(Arc::new(EntityStore::in_memory()), content, archive);
    (temp, ctx)
}
