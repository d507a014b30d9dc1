use super::{DeletionReport, NotesContext};
use crate::archival::ArchivalSection;
use crate::history::{DeleteHistoryService, DeletionPlan};
use crate::model::{CreatedFile, FileContent, FileContext};
use crate::validation::{validate_content_size, validate_file_creation};
use crate::NotesResult;
use chrono::Utc;
use notefs_files::LiveFileMetadata;
use notefs_types::ResourceName;
use notefs_uuid::{ExternalId, VersionMarker};

#[derive(Clone, Debug)]
pub struct FileService {
    ctx: NotesContext,
}

impl FileService {
    pub(crate) fn new(ctx: NotesContext) -> Self {
        Self { ctx }
    }

    /// Adds a file to an active directory and writes its live content.
    ///
    /// The live write happens inside the commit that inserts the row, so no other commit sees
    /// the row without its bytes. A concurrent add of the same name fails validation instead of
    /// overwriting live content, and a failed write leaves no row behind.
    pub fn add_file(
        &self,
        directory_id: ExternalId,
        name: &str,
        content: &[u8],
    ) -> NotesResult<CreatedFile> {
        let name = ResourceName::new(name)?;
        let metadata = LiveFileMetadata::describe(content);

        let ctx = self.ctx.store.commit(|s| {
            validate_file_creation(s, directory_id, &name, content)?;
            let file = CreatedFile::new(directory_id, name.clone(), metadata);
            let file_id = file.external_id();
            s.save_file(file);
            let ctx = s.active_file_context(file_id)?;

            let path = ctx.logical_path();
            self.ctx
                .content
                .write_bytes(&path, content)
                .inspect_err(|e| {
                    tracing::warn!("failed to write live content for {}: {}", path, e);
                })?;

            s.cluster_mut(ctx.cluster.external_id())?.touch(Utc::now());
            Ok(ctx)
        })?;

        tracing::info!(
            "added file {} ({})",
            ctx.logical_path(),
            ctx.file.external_id()
        );
        Ok(ctx.file)
    }

    /// An active file whose directory and cluster are active too.
    pub fn find_file(&self, id: ExternalId) -> NotesResult<CreatedFile> {
        self.ctx
            .store
            .read(|s| s.active_file_context(id).map(|ctx| ctx.file))
    }

    /// Returns the file's name, version and live content. Touches the owning cluster.
    pub fn read_file(&self, id: ExternalId) -> NotesResult<FileContent> {
        let ctx = self.resolve_and_touch(id)?;
        let content = self.ctx.content.read_bytes(&ctx.logical_path())?;

        Ok(FileContent {
            name: ctx.file.name().to_string(),
            version: ctx.file.version(),
            content,
        })
    }

    /// Replaces the content of a file.
    ///
    /// Under the archival section: the current content is archived under a fresh version
    /// marker, the live content is overwritten, then the row (new marker) and an UPDATED
    /// history entry are committed together. A fault before the final commit leaves at most an
    /// orphan version snapshot and, if the live write went through, new bytes under the old
    /// marker.
    pub fn update_file(&self, id: ExternalId, content: &[u8]) -> NotesResult<CreatedFile> {
        validate_content_size(content)?;
        let section = ArchivalSection::enter();

        let ctx = self.ctx.store.read(|s| s.active_file_context(id))?;
        let path = ctx.logical_path();
        let version = VersionMarker::new();

        let archived = self
            .ctx
            .engine
            .archive_file_version(&section, &path, version)
            .inspect_err(|e| {
                tracing::warn!("failed to archive {} before update: {}", path, e);
            })?;
        let metadata = self.ctx.content.write_bytes(&path, content)?;
        let entry = DeleteHistoryService::update_entry(&ctx, version, archived.relative_path);

        let updated = self.ctx.store.commit(|s| {
            let file = s.file_mut(id)?;
            file.replace_content(version, metadata);
            let updated = file.clone();
            s.cluster_mut(ctx.cluster.external_id())?.touch(Utc::now());
            s.append_history([entry]);
            Ok(updated)
        })?;

        tracing::info!("updated file {} to version {}", path, version);
        Ok(updated)
    }

    /// Soft-deletes a single file after archiving its content.
    pub fn delete_file(&self, id: ExternalId) -> NotesResult<DeletionReport> {
        let section = ArchivalSection::enter();

        let ctx = self.ctx.store.read(|s| s.active_file_context(id))?;
        let plan = DeletionPlan::for_file(&ctx)?;
        self.ctx.history.record_plan(&plan)?;

        self.ctx
            .engine
            .archive_single_file(&section, &ctx)
            .inspect_err(|e| {
                tracing::warn!("archival of file {} aborted: {}", id, e);
            })?;

        let soft_deleted = self.ctx.existence.change_file_existing_status(&ctx.file)?;

        tracing::info!("soft-deleted file {}", ctx.logical_path());
        Ok(DeletionReport {
            cluster_id: ctx.cluster.external_id(),
            history_entries: plan.len(),
            archived_files: 1,
            archived_directories: 0,
            soft_deleted,
        })
    }

    fn resolve_and_touch(&self, id: ExternalId) -> NotesResult<FileContext> {
        self.ctx.store.commit(|s| {
            let ctx = s.active_file_context(id)?;
            s.cluster_mut(ctx.cluster.external_id())?.touch(Utc::now());
            Ok(ctx)
        })
    }
}
