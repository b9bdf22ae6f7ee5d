use crate::error::Result;
use crate::fs::RallyFs;
use crate::rally::RallyFolder;
use crate::retry::{with_retry, RetryPolicy};
use rally_annotations::{
    export_annotations, export_file_path, import_ball_files, AnnotationStore, BallImportFile,
    CanvasSize, TRACKLET_DETAIL_HEADER,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Outcome of the most recent save
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum SaveStatus {
    Idle,
    Saving,
    Saved,
    Error(String),
}

/// A loaded rally: its folder, its record store and the file collaborator used to persist it.
///
/// Saves take `&mut self`, so at most one save runs per session.
pub struct AnnotationSession {
    fs: Arc<dyn RallyFs>,
    retry: RetryPolicy,
    rally: RallyFolder,
    store: AnnotationStore,
    status: SaveStatus,
}

impl std::fmt::Debug for AnnotationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationSession")
            .field("rally", &self.rally.name)
            .field("records", &self.store.len())
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl AnnotationSession {
    /// Load the annotation file and its detail side file, when present
    pub async fn open(fs: Arc<dyn RallyFs>, rally: RallyFolder, retry: RetryPolicy) -> Result<Self> {
        let frame_text = if fs.exists(&rally.annotation_file).await {
            let path = &rally.annotation_file;
            with_retry(&retry, "read annotations", || fs.read_text(path)).await?
        } else {
            log::info!("No annotation file for {}, starting empty", rally.name);
            String::new()
        };

        let detail_path = rally.detail_file();
        let detail_text = if fs.exists(&detail_path).await {
            let path = &detail_path;
            Some(with_retry(&retry, "read tracklet details", || fs.read_text(path)).await?)
        } else {
            None
        };

        let mut store = AnnotationStore::new();
        store.load(&frame_text, detail_text.as_deref());

        Ok(Self {
            fs,
            retry,
            rally,
            store,
            status: SaveStatus::Idle,
        })
    }

    #[must_use]
    pub fn rally(&self) -> &RallyFolder {
        &self.rally
    }

    #[must_use]
    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut AnnotationStore {
        &mut self.store
    }

    #[must_use]
    pub fn status(&self) -> &SaveStatus {
        &self.status
    }

    #[must_use]
    pub fn detail_file(&self) -> PathBuf {
        self.rally.detail_file()
    }

    /// Write the detail file, then the frame file.
    ///
    /// On failure the status carries the error message and the store keeps its edits (and its
    /// dirty flag) so the save can be retried.
    pub async fn save(&mut self) -> Result<()> {
        self.status = SaveStatus::Saving;
        match self.write_snapshot().await {
            Ok(()) => {
                self.store.mark_saved();
                self.status = SaveStatus::Saved;
                log::info!("Saved {} records for {}", self.store.len(), self.rally.name);
                Ok(())
            }
            Err(err) => {
                log::error!("Save failed for {}: {err}", self.rally.name);
                self.status = SaveStatus::Error(err.to_string());
                Err(err)
            }
        }
    }

    async fn write_snapshot(&self) -> Result<()> {
        let saved = self.store.save();

        // Detail file first: the frame file written after it has its metadata columns blanked.
        // Without metadata, an existing detail file is cut back to its header.
        let detail_path = self.rally.detail_file();
        let detail_text = match saved.detail_text {
            Some(text) => Some(text),
            None => self
                .fs
                .exists(&detail_path)
                .await
                .then(|| TRACKLET_DETAIL_HEADER.to_string()),
        };
        if let Some(text) = detail_text {
            let path = detail_path.as_path();
            let text = text.as_str();
            with_retry(&self.retry, "write tracklet details", || {
                self.fs.write_text(path, text)
            })
            .await?;
        }

        let frame_path = &self.rally.annotation_file;
        let frame_text = saved.frame_text.as_str();
        with_retry(&self.retry, "write annotations", || {
            self.fs.write_text(frame_path, frame_text)
        })
        .await?;
        Ok(())
    }

    /// Read interchange JSON files and merge their ball points into the store.
    ///
    /// Unreadable or unparsable files are skipped with a warning. Returns the number of ball
    /// points merged.
    pub async fn import_ball_json(&mut self, paths: &[PathBuf], canvas: CanvasSize) -> Result<usize> {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            match self.fs.read_text(path).await {
                Ok(text) => files.push(BallImportFile::new(path.display().to_string(), text)),
                Err(err) => log::warn!("Skipping {}: {err}", path.display()),
            }
        }

        let records = import_ball_files(&files, &self.rally.name, canvas);
        let merged = self.store.merge_ball_points(records);
        log::info!("Merged {merged} ball points into {}", self.rally.name);
        Ok(merged)
    }

    /// Export the store as interchange JSON into `out_dir`; returns the written path
    pub async fn export_json(&self, out_dir: &Path, canvas: CanvasSize) -> Result<PathBuf> {
        let records = self.store.records();
        let video_source = self.rally.path.to_string_lossy();
        let json = export_annotations(&records, &video_source, canvas)?;
        let path = export_file_path(out_dir, &self.rally.name);
        let target = path.as_path();
        let json = json.as_str();
        with_retry(&self.retry, "write export", || self.fs.write_text(target, json)).await?;
        log::info!("Exported {} records to {}", records.len(), path.display());
        Ok(path)
    }
}
