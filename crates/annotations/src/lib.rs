//! # Rally Annotations
//!
//! Data model and round-trip engine for tracklet annotations over rally frame folders.
//!
//! ## Architecture
//!
//! ```text
//! <rally>.txt ──────────────┐
//!                           ├──> CSV Codec ──> AnnotationStore ──> CSV Codec ──> <rally>.txt
//! <rally>_tracklets.txt ────┘     (parse)      (dedup by key,      (serialize)   <rally>_tracklets.txt
//!                                               detail overlay)
//!
//! ball JSON ──> Interchange (224x224 → canvas) ──> AnnotationStore
//! AnnotationStore ──> Interchange (canvas → 224x224) ──> <rally>_export.json
//! ```
//!
//! ## Example
//!
//! ```rust
//! use rally_annotations::AnnotationStore;
//!
//! let mut store = AnnotationStore::new();
//! store.load("1, 7, 10, 20, 30, 40, 0.9\n1, 7, 12, 20, 30, 40, 0.8", None);
//! assert_eq!(store.len(), 1);
//!
//! let saved = store.save();
//! assert!(saved.frame_text.starts_with("1, 7, 12, 20, 30, 40, 0.8"));
//! ```

mod csv_codec;
mod error;
mod interchange;
mod paths;
mod store;
mod types;

pub use csv_codec::{
    extract_details_from_records, parse_frame_records, parse_tracklet_details,
    serialize_frame_records, serialize_tracklet_details, TRACKLET_DETAIL_HEADER,
};
pub use error::{AnnotationError, Result};
pub use interchange::{
    build_document, export_annotations, import_ball_annotations, import_ball_files,
    video_source_matches, BallImportFile, CanvasSize, FrameAnnotation, InterchangeDocument, Track,
    TrackAttributes, TrackBox, NORMALIZED_SPACE,
};
pub use paths::{
    derive_detail_file_path, embedded_frame_number, export_file_path, frame_file_name,
    frame_number_from_name, sanitize_file_stem,
};
pub use store::{AnnotationStore, SavedText, StoreStats};
pub use types::{
    normalize_event, AnnotationRecord, BoundingBox, RecordKey, TrackletDetail, BALL_BOX_SIZE,
    BALL_TRACKLET_ID, DEFAULT_SCORE, NO_EVENT,
};
