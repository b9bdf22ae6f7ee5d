use async_trait::async_trait;
use pretty_assertions::assert_eq;
use rally_annotations::{AnnotationRecord, CanvasSize, TrackletDetail, BALL_TRACKLET_ID};
use rally_storage::{
    discover_rallies, open_rally_folder, AnnotationSession, DirEntryInfo, LocalFs, RallyFs,
    RetryPolicy, SaveStatus, StorageError,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tempfile::tempdir;

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay_ms: 1,
        backoff_factor: 1,
    }
}

fn make_rally(root: &Path, name: &str, frames: &[i64]) -> PathBuf {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    for frame in frames {
        std::fs::write(dir.join(format!("{frame:06}.jpg")), b"").unwrap();
    }
    dir
}

/// Fails the first `failures` writes with a transient error, then delegates to [`LocalFs`]
struct FlakyFs {
    failures: AtomicU32,
    writes: AtomicU32,
}

impl FlakyFs {
    fn new(failures: u32) -> Self {
        Self {
            failures: AtomicU32::new(failures),
            writes: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl RallyFs for FlakyFs {
    async fn read_text(&self, path: &Path) -> rally_storage::Result<String> {
        LocalFs.read_text(path).await
    }

    async fn write_text(&self, path: &Path, content: &str) -> rally_storage::Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StorageError::IoError(io::Error::new(
                io::ErrorKind::Other,
                "device busy",
            )));
        }
        LocalFs.write_text(path, content).await
    }

    async fn exists(&self, path: &Path) -> bool {
        LocalFs.exists(path).await
    }

    async fn list_dir(&self, path: &Path) -> rally_storage::Result<Vec<DirEntryInfo>> {
        LocalFs.list_dir(path).await
    }

    async fn read_image_as_data_url(&self, path: &Path) -> rally_storage::Result<String> {
        LocalFs.read_image_as_data_url(path).await
    }
}

/// Rejects every write to a tracklet detail file
struct DetailWriteFails;

#[async_trait]
impl RallyFs for DetailWriteFails {
    async fn read_text(&self, path: &Path) -> rally_storage::Result<String> {
        LocalFs.read_text(path).await
    }

    async fn write_text(&self, path: &Path, content: &str) -> rally_storage::Result<()> {
        if path.to_string_lossy().ends_with("_tracklets.txt") {
            return Err(StorageError::IoError(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "read-only detail file",
            )));
        }
        LocalFs.write_text(path, content).await
    }

    async fn exists(&self, path: &Path) -> bool {
        LocalFs.exists(path).await
    }

    async fn list_dir(&self, path: &Path) -> rally_storage::Result<Vec<DirEntryInfo>> {
        LocalFs.list_dir(path).await
    }

    async fn read_image_as_data_url(&self, path: &Path) -> rally_storage::Result<String> {
        LocalFs.read_image_as_data_url(path).await
    }
}

#[tokio::test]
async fn test_open_edit_save_reload() {
    let root = tempdir().unwrap();
    let dir = make_rally(root.path(), "rally001", &[1, 2, 3]);
    std::fs::write(
        dir.join("rally001.txt"),
        "1, 7, 10, 20, 30, 40, 0.9, player, 12, red, A, \n\
         2, 7, 12, 20, 30, 40, 0.9, player, 12, red, A, serve\n",
    )
    .unwrap();

    let fs: Arc<dyn RallyFs> = Arc::new(LocalFs);
    let rally = open_rally_folder(fs.as_ref(), &dir).await.unwrap();
    let mut session = AnnotationSession::open(fs.clone(), rally, RetryPolicy::default())
        .await
        .unwrap();
    assert_eq!(session.store().len(), 2);
    assert_eq!(session.status(), &SaveStatus::Idle);

    session
        .store_mut()
        .upsert(AnnotationRecord::new(3, 7, 14.0, 20.0, 30.0, 40.0));
    assert!(session.store().is_dirty());
    session.save().await.unwrap();
    assert_eq!(session.status(), &SaveStatus::Saved);
    assert!(!session.store().is_dirty());

    let frame_text = std::fs::read_to_string(dir.join("rally001.txt")).unwrap();
    assert_eq!(
        frame_text,
        "1, 7, 10, 20, 30, 40, 0.9, , , , , \n\
         2, 7, 12, 20, 30, 40, 0.9, , , , , serve\n\
         3, 7, 14, 20, 30, 40, 1, , , , , "
    );
    let detail_text = std::fs::read_to_string(session.detail_file()).unwrap();
    assert_eq!(
        detail_text,
        "tracklet_id, role, jersey_number, jersey_color, team\n7, player, 12, red, A"
    );

    let rally = open_rally_folder(fs.as_ref(), &dir).await.unwrap();
    let reopened = AnnotationSession::open(fs, rally, RetryPolicy::default())
        .await
        .unwrap();
    let record = reopened.store().get(3, 7).unwrap();
    assert_eq!(record.team, "A");
    assert_eq!(record.jersey_number, "12");
}

#[tokio::test]
async fn test_transient_write_failures_are_retried() {
    let root = tempdir().unwrap();
    let dir = make_rally(root.path(), "rally002", &[1]);
    let flaky = Arc::new(FlakyFs::new(2));
    let fs: Arc<dyn RallyFs> = flaky.clone();

    let rally = open_rally_folder(fs.as_ref(), &dir).await.unwrap();
    let mut session = AnnotationSession::open(fs, rally, fast_retry()).await.unwrap();
    session
        .store_mut()
        .upsert(AnnotationRecord::new(1, 4, 0.0, 0.0, 10.0, 10.0));
    session.save().await.unwrap();

    assert_eq!(session.status(), &SaveStatus::Saved);
    assert_eq!(flaky.writes.load(Ordering::SeqCst), 3);
    assert!(dir.join("rally002.txt").exists());
}

#[tokio::test]
async fn test_failed_save_keeps_edits() {
    let root = tempdir().unwrap();
    let dir = make_rally(root.path(), "rally003", &[1]);
    let fs: Arc<dyn RallyFs> = Arc::new(FlakyFs::new(10));

    let rally = open_rally_folder(fs.as_ref(), &dir).await.unwrap();
    let mut session = AnnotationSession::open(fs, rally, fast_retry()).await.unwrap();
    session
        .store_mut()
        .upsert(AnnotationRecord::new(1, 4, 0.0, 0.0, 10.0, 10.0));

    assert!(session.save().await.is_err());
    assert!(matches!(session.status(), SaveStatus::Error(msg) if msg.contains("device busy")));
    assert!(session.store().is_dirty());
    assert_eq!(session.store().len(), 1);
    assert!(!dir.join("rally003.txt").exists());
}

#[tokio::test]
async fn test_cleared_metadata_truncates_detail_file() {
    let root = tempdir().unwrap();
    let dir = make_rally(root.path(), "rally004", &[1]);
    std::fs::write(dir.join("rally004.txt"), "1, 5, 0, 0, 10, 10, 1").unwrap();
    std::fs::write(
        dir.join("rally004_tracklets.txt"),
        "tracklet_id, role, jersey_number, jersey_color, team\n5, player, 9, blue, B",
    )
    .unwrap();

    let fs: Arc<dyn RallyFs> = Arc::new(LocalFs);
    let rally = open_rally_folder(fs.as_ref(), &dir).await.unwrap();
    let mut session = AnnotationSession::open(fs, rally, RetryPolicy::default())
        .await
        .unwrap();
    assert_eq!(session.store().get(1, 5).unwrap().jersey_number, "9");

    session.store_mut().delete_all_for_tracklet(5);
    session.store_mut().set_tracklet_attributes(TrackletDetail::new(5));
    session.save().await.unwrap();

    let detail_text = std::fs::read_to_string(dir.join("rally004_tracklets.txt")).unwrap();
    assert_eq!(detail_text, "tracklet_id, role, jersey_number, jersey_color, team");
}

#[tokio::test]
async fn test_import_and_export_ball_points() {
    let root = tempdir().unwrap();
    let dir = make_rally(root.path(), "rally005", &[1, 2]);
    let json_dir = root.path().join("json");
    std::fs::create_dir_all(&json_dir).unwrap();
    std::fs::write(
        json_dir.join("ball.json"),
        r#"{
            "video_source": "/videos/rally005",
            "annotations": [
                {"frame": "000002.jpg", "tracks": [
                    {"track_id": 0, "attributes": {"role": "ball"}, "bbox": {"x": 112, "y": 112}}
                ]}
            ]
        }"#,
    )
    .unwrap();
    std::fs::write(
        json_dir.join("other.json"),
        r#"{"video_source": "/videos/rally999", "annotations": [
            {"frame": "000001.jpg", "tracks": [
                {"track_id": 0, "attributes": {"role": "ball"}, "bbox": {"x": 1, "y": 1}}
            ]}
        ]}"#,
    )
    .unwrap();

    let fs: Arc<dyn RallyFs> = Arc::new(LocalFs);
    let rally = open_rally_folder(fs.as_ref(), &dir).await.unwrap();
    let mut session = AnnotationSession::open(fs, rally, RetryPolicy::default())
        .await
        .unwrap();

    let canvas = CanvasSize::new(448.0, 224.0);
    let merged = session
        .import_ball_json(
            &[
                json_dir.join("ball.json"),
                json_dir.join("other.json"),
                json_dir.join("missing.json"),
            ],
            canvas,
        )
        .await
        .unwrap();
    assert_eq!(merged, 1);
    let ball = session.store().get(2, BALL_TRACKLET_ID).unwrap();
    assert_eq!((ball.x, ball.y), (224.0, 112.0));

    let out = root.path().join("exports");
    let path = session.export_json(&out, canvas).await.unwrap();
    assert_eq!(path, out.join("rally005_export.json"));
    let exported: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let track = &exported["annotations"][0]["tracks"][0];
    assert_eq!(track["track_id"], 0);
    assert_eq!(track["bbox"]["x"], 112);
    assert!(track["bbox"]["w"].is_null());
}

#[tokio::test]
async fn test_discover_rallies_lists_sorted_folders() {
    let root = tempdir().unwrap();
    make_rally(root.path(), "rally_b", &[1]);
    make_rally(root.path(), "rally_a", &[2, 1]);
    std::fs::create_dir_all(root.path().join("notes")).unwrap();

    let rallies = discover_rallies(&LocalFs, root.path()).await.unwrap();
    let names: Vec<&str> = rallies.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["rally_a", "rally_b"]);
    assert_eq!(rallies[0].frame_numbers(), vec![1, 2]);
}

#[tokio::test]
async fn test_failed_detail_write_keeps_inline_metadata() {
    let root = tempdir().unwrap();
    let dir = make_rally(root.path(), "rally006", &[1]);
    let legacy = "1, 7, 10, 20, 30, 40, 0.9, player, 12, red, A";
    std::fs::write(dir.join("rally006.txt"), legacy).unwrap();

    let fs: Arc<dyn RallyFs> = Arc::new(DetailWriteFails);
    let rally = open_rally_folder(fs.as_ref(), &dir).await.unwrap();
    let mut session = AnnotationSession::open(fs, rally, RetryPolicy::none())
        .await
        .unwrap();
    session.store_mut().set_event(1, 7, "serve");

    assert!(session.save().await.is_err());
    assert!(matches!(session.status(), SaveStatus::Error(_)));
    assert_eq!(
        std::fs::read_to_string(dir.join("rally006.txt")).unwrap(),
        legacy
    );
    assert!(!dir.join("rally006_tracklets.txt").exists());

    let fs: Arc<dyn RallyFs> = Arc::new(LocalFs);
    let rally = open_rally_folder(fs.as_ref(), &dir).await.unwrap();
    let reopened = AnnotationSession::open(fs, rally, RetryPolicy::default())
        .await
        .unwrap();
    let record = reopened.store().get(1, 7).unwrap();
    assert_eq!(record.team, "A");
    assert_eq!(record.jersey_number, "12");
    assert_eq!(record.role, "player");
}
