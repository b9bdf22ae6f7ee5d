use crate::error::{Result, StorageError};
use crate::fs::RallyFs;
use rally_annotations::{frame_file_name, frame_number_from_name};
use serde::Serialize;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];
const ANNOTATION_EXTENSION: &str = "txt";

/// One folder of sequential frame images plus its annotation file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RallyFolder {
    pub name: String,
    pub path: PathBuf,
    /// `<path>/<name>.txt`, whether or not it exists yet
    pub annotation_file: PathBuf,
    /// Sorted by embedded frame number
    pub image_files: Vec<PathBuf>,
}

impl RallyFolder {
    /// Path of the tracklet detail side file
    #[must_use]
    pub fn detail_file(&self) -> PathBuf {
        PathBuf::from(rally_annotations::derive_detail_file_path(
            &self.annotation_file.to_string_lossy(),
        ))
    }

    #[must_use]
    pub fn frame_numbers(&self) -> Vec<i64> {
        self.image_files
            .iter()
            .filter_map(|path| path.file_name().and_then(|n| n.to_str()))
            .map(frame_number_from_name)
            .collect()
    }
}

/// Conventional image path for a frame: `<rally>/<6-digit frame>.jpg`
#[must_use]
pub fn frame_image_path(rally_path: &Path, frame: i64) -> PathBuf {
    rally_path.join(frame_file_name(frame))
}

fn is_image_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|candidate| ext.eq_ignore_ascii_case(candidate))
        })
}

/// Read a single rally folder; fails when it holds no images
pub async fn open_rally_folder(fs: &dyn RallyFs, path: &Path) -> Result<RallyFolder> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StorageError::InvalidPath(path.display().to_string()))?
        .to_string();

    let mut images: Vec<(i64, String)> = fs
        .list_dir(path)
        .await?
        .into_iter()
        .filter(|entry| !entry.is_dir && is_image_name(&entry.name))
        .map(|entry| (frame_number_from_name(&entry.name), entry.name))
        .collect();
    if images.is_empty() {
        return Err(StorageError::NotARally(path.to_path_buf()));
    }
    images.sort();

    Ok(RallyFolder {
        annotation_file: path.join(format!("{name}.{ANNOTATION_EXTENSION}")),
        image_files: images.into_iter().map(|(_, n)| path.join(n)).collect(),
        path: path.to_path_buf(),
        name,
    })
}

/// Every direct sub-directory of `root` that holds frame images, sorted by name
pub async fn discover_rallies(fs: &dyn RallyFs, root: &Path) -> Result<Vec<RallyFolder>> {
    let mut rallies = Vec::new();
    for entry in fs.list_dir(root).await?.into_iter().filter(|e| e.is_dir) {
        let dir = root.join(&entry.name);
        match open_rally_folder(fs, &dir).await {
            Ok(rally) => rallies.push(rally),
            Err(StorageError::NotARally(_)) => {
                log::debug!("Skipping {}: no frame images", dir.display());
            }
            Err(err) => log::warn!("Skipping {}: {err}", dir.display()),
        }
    }
    log::info!("Found {} rallies under {}", rallies.len(), root.display());
    Ok(rallies)
}
