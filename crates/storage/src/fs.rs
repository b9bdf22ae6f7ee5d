use crate::error::Result;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntryInfo {
    pub name: String,
    pub is_dir: bool,
}

/// File operations the annotation core needs from its host
#[async_trait]
pub trait RallyFs: Send + Sync {
    async fn read_text(&self, path: &Path) -> Result<String>;

    /// Replace the file contents in one step; readers never observe a partial write
    async fn write_text(&self, path: &Path, content: &str) -> Result<()>;

    async fn exists(&self, path: &Path) -> bool;

    /// Entries sorted by name
    async fn list_dir(&self, path: &Path) -> Result<Vec<DirEntryInfo>>;

    /// `data:<mime>;base64,<payload>` for an image file
    async fn read_image_as_data_url(&self, path: &Path) -> Result<String>;
}

/// [`RallyFs`] backed by the local disk
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

#[async_trait]
impl RallyFs for LocalFs {
    async fn read_text(&self, path: &Path) -> Result<String> {
        Ok(tokio::fs::read_to_string(path).await?)
    }

    async fn write_text(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = tmp_path_for(path);
        tokio::fs::write(&tmp, content).await?;
        if let Err(err) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        log::debug!("Wrote {} ({} bytes)", path.display(), content.len());
        Ok(())
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn list_dir(&self, path: &Path) -> Result<Vec<DirEntryInfo>> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(path).await?;
        while let Some(entry) = dir.next_entry().await? {
            let is_dir = entry.file_type().await?.is_dir();
            entries.push(DirEntryInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn read_image_as_data_url(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path).await?;
        Ok(format!(
            "data:{};base64,{}",
            image_mime_type(path),
            STANDARD.encode(bytes)
        ))
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// MIME type for an image path, by extension
#[must_use]
pub fn image_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[tokio::test]
    async fn write_then_read_round_trips_and_leaves_no_tmp() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/rally.txt");
        let fs = LocalFs;

        fs.write_text(&path, "1, 1, 0, 0, 5, 5, 1").await.unwrap();
        fs.write_text(&path, "2, 1, 0, 0, 5, 5, 1").await.unwrap();

        assert_eq!(fs.read_text(&path).await.unwrap(), "2, 1, 0, 0, 5, 5, 1");
        assert!(!fs.exists(&tmp_path_for(&path)).await);
    }

    #[tokio::test]
    async fn list_dir_is_sorted_and_typed() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("b_rally")).unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();

        let entries = LocalFs.list_dir(dir.path()).await.unwrap();
        assert_eq!(
            entries,
            vec![
                DirEntryInfo { name: "a.txt".to_string(), is_dir: false },
                DirEntryInfo { name: "b_rally".to_string(), is_dir: true },
            ]
        );
    }

    #[tokio::test]
    async fn image_is_read_as_data_url() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("000001.JPG");
        std::fs::write(&path, [0xff, 0xd8, 0xff]).unwrap();

        let url = LocalFs.read_image_as_data_url(&path).await.unwrap();
        assert_eq!(url, "data:image/jpeg;base64,/9j/");
    }

    #[tokio::test]
    async fn missing_file_is_not_transient() {
        let dir = tempdir().unwrap();
        let err = LocalFs.read_text(&dir.path().join("nope.txt")).await.unwrap_err();
        assert!(!err.is_transient());
    }
}
