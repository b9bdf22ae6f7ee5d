//! JSON interchange with the external annotation pipeline.
//!
//! Ball points travel in a fixed 224x224 normalized space; the live canvas resolution is
//! supplied by the caller on both import and export.

use crate::error::{AnnotationError, Result};
use crate::paths::{embedded_frame_number, frame_file_name};
use crate::types::{AnnotationRecord, BALL_TRACKLET_ID};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// Side length of the normalized coordinate space used by the pipeline
pub const NORMALIZED_SPACE: f64 = 224.0;

const BALL_ROLE: &str = "ball";
const PLAYER_ROLE: &str = "player";
const EXPORT_INDENT: &[u8] = b"    ";

/// Resolution coordinates are rescaled to on import and from on export
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CanvasSize {
    pub width: f64,
    pub height: f64,
}

impl CanvasSize {
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Normalized → canvas
    #[must_use]
    pub fn from_normalized(&self, x: f64, y: f64) -> (f64, f64) {
        (
            x / NORMALIZED_SPACE * self.width,
            y / NORMALIZED_SPACE * self.height,
        )
    }

    /// Canvas → normalized
    #[must_use]
    pub fn to_normalized(&self, x: f64, y: f64) -> (f64, f64) {
        (
            x / self.width * NORMALIZED_SPACE,
            y / self.height * NORMALIZED_SPACE,
        )
    }
}

impl Default for CanvasSize {
    fn default() -> Self {
        Self::new(1920.0, 1080.0)
    }
}

/// Only `annotations` must have the right shape. Other fields of an unexpected type read as
/// empty, so an odd track is skipped instead of failing the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterchangeDocument {
    #[serde(default, deserialize_with = "lenient_string")]
    pub video_source: String,
    pub annotations: Vec<FrameAnnotation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameAnnotation {
    /// Image filename, e.g. `000012.jpg`
    #[serde(default, deserialize_with = "lenient_string")]
    pub frame: String,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub track_id: i64,
    #[serde(default, deserialize_with = "lenient_attributes")]
    pub attributes: TrackAttributes,
    #[serde(default, deserialize_with = "lenient_bbox")]
    pub bbox: TrackBox,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub event: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackAttributes {
    #[serde(default, deserialize_with = "lenient_string")]
    pub role: String,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub jersey_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub team: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackBox {
    #[serde(default, serialize_with = "serialize_number", deserialize_with = "lenient_opt_f64")]
    pub x: Option<f64>,
    #[serde(default, serialize_with = "serialize_number", deserialize_with = "lenient_opt_f64")]
    pub y: Option<f64>,
    #[serde(default, serialize_with = "serialize_number", deserialize_with = "lenient_opt_f64")]
    pub w: Option<f64>,
    #[serde(default, serialize_with = "serialize_number", deserialize_with = "lenient_opt_f64")]
    pub h: Option<f64>,
}

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<String, D::Error> {
    Ok(value_to_string(Value::deserialize(deserializer)?).unwrap_or_default())
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    Ok(value_to_string(Value::deserialize(deserializer)?))
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match &value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|v| v.fract() == 0.0).map(|v| v as i64)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
    .unwrap_or_default())
}

fn lenient_opt_f64<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<f64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match &value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
    .filter(|v: &f64| v.is_finite()))
}

fn lenient_attributes<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<TrackAttributes, D::Error> {
    Ok(serde_json::from_value(Value::deserialize(deserializer)?).unwrap_or_default())
}

fn lenient_bbox<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<TrackBox, D::Error> {
    Ok(serde_json::from_value(Value::deserialize(deserializer)?).unwrap_or_default())
}

/// Integral values are written without a fractional part (`10`, not `10.0`), matching what
/// the pipeline's own writer emits.
fn serialize_number<S: Serializer>(
    value: &Option<f64>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match value {
        None => serializer.serialize_none(),
        Some(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 9.007_199_254_740_992e15 => {
            serializer.serialize_i64(*v as i64)
        }
        Some(v) => serializer.serialize_f64(*v),
    }
}

/// One JSON file offered to a multi-file import
#[derive(Debug, Clone)]
pub struct BallImportFile {
    /// Used in diagnostics only
    pub name: String,
    pub text: String,
}

impl BallImportFile {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// Import ball points from one interchange document, rescaled onto `canvas`.
///
/// Only tracks with role `ball` and both coordinates present are taken. A frame that
/// reappears later in the document is ignored (first occurrence wins).
pub fn import_ball_annotations(json_text: &str, canvas: CanvasSize) -> Result<Vec<AnnotationRecord>> {
    let document: InterchangeDocument = serde_json::from_str(json_text)?;
    let mut seen = HashSet::new();
    let mut records = Vec::new();
    collect_ball_points(&document, canvas, &mut seen, &mut records);
    Ok(records)
}

/// Import ball points from several documents, keeping only those whose `video_source` names
/// the current rally.
///
/// A file that fails to parse is logged and contributes nothing; the remaining files are
/// still imported. First occurrence of a frame wins across the whole pass.
#[must_use]
pub fn import_ball_files(
    files: &[BallImportFile],
    rally_name: &str,
    canvas: CanvasSize,
) -> Vec<AnnotationRecord> {
    let mut seen = HashSet::new();
    let mut records = Vec::new();
    for file in files {
        let document: InterchangeDocument = match serde_json::from_str(&file.text) {
            Ok(document) => document,
            Err(err) => {
                log::warn!("Skipping {}: {err}", file.name);
                continue;
            }
        };
        if !video_source_matches(&document.video_source, rally_name) {
            log::info!(
                "Skipping {}: video_source {:?} does not match rally {rally_name:?}",
                file.name,
                document.video_source
            );
            continue;
        }
        let before = records.len();
        collect_ball_points(&document, canvas, &mut seen, &mut records);
        log::info!(
            "Imported {} ball points from {}",
            records.len() - before,
            file.name
        );
    }
    records
}

/// Case-sensitive compare of the last path segment of `video_source` with the rally name
#[must_use]
pub fn video_source_matches(video_source: &str, rally_name: &str) -> bool {
    video_source
        .trim_end_matches(&['/', '\\'][..])
        .rsplit(&['/', '\\'][..])
        .next()
        .is_some_and(|segment| segment == rally_name)
}

fn collect_ball_points(
    document: &InterchangeDocument,
    canvas: CanvasSize,
    seen: &mut HashSet<i64>,
    out: &mut Vec<AnnotationRecord>,
) {
    for annotation in &document.annotations {
        for track in &annotation.tracks {
            if track.attributes.role != BALL_ROLE {
                continue;
            }
            let (Some(x), Some(y)) = (track.bbox.x, track.bbox.y) else {
                continue;
            };
            let Some(frame) = embedded_frame_number(&annotation.frame) else {
                log::warn!("Skipping ball point: no frame number in {:?}", annotation.frame);
                continue;
            };
            if !seen.insert(frame) {
                log::debug!("Ignoring repeated ball point for frame {frame}");
                continue;
            }
            let (scaled_x, scaled_y) = canvas.from_normalized(x, y);
            out.push(AnnotationRecord::ball(frame, scaled_x, scaled_y));
        }
    }
}

/// Build the interchange document for a record set.
///
/// Records are grouped per frame (ascending). Ball points are rescaled back into the
/// normalized space, exported with `track_id` 0 and no extent; boxes pass through unscaled.
#[must_use]
pub fn build_document(
    records: &[AnnotationRecord],
    video_source: &str,
    canvas: CanvasSize,
) -> InterchangeDocument {
    let mut by_frame: BTreeMap<i64, Vec<Track>> = BTreeMap::new();
    for record in records {
        by_frame
            .entry(record.frame)
            .or_default()
            .push(track_from_record(record, canvas));
    }

    InterchangeDocument {
        video_source: video_source.to_string(),
        annotations: by_frame
            .into_iter()
            .map(|(frame, tracks)| FrameAnnotation {
                frame: frame_file_name(frame),
                tracks,
            })
            .collect(),
    }
}

/// Export records as pretty-printed (4-space) interchange JSON
pub fn export_annotations(
    records: &[AnnotationRecord],
    video_source: &str,
    canvas: CanvasSize,
) -> Result<String> {
    let document = build_document(records, video_source, canvas);
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(EXPORT_INDENT);
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    document.serialize(&mut serializer)?;
    String::from_utf8(out).map_err(|err| AnnotationError::Other(err.to_string()))
}

fn track_from_record(record: &AnnotationRecord, canvas: CanvasSize) -> Track {
    let non_empty = |value: &str| (!value.is_empty()).then(|| value.to_string());
    let is_ball = record.tracklet_id == BALL_TRACKLET_ID;

    let role = if !record.role.is_empty() {
        record.role.clone()
    } else if is_ball {
        BALL_ROLE.to_string()
    } else {
        PLAYER_ROLE.to_string()
    };

    let bbox = if is_ball {
        let (x, y) = canvas.to_normalized(record.x, record.y);
        TrackBox {
            x: Some(x),
            y: Some(y),
            w: None,
            h: None,
        }
    } else {
        TrackBox {
            x: Some(record.x),
            y: Some(record.y),
            w: Some(record.w),
            h: Some(record.h),
        }
    };

    Track {
        track_id: if is_ball { 0 } else { record.tracklet_id },
        attributes: TrackAttributes {
            role,
            jersey_number: non_empty(&record.jersey_number),
            team: non_empty(&record.team),
        },
        bbox,
        event: record.event.as_deref().and_then(non_empty),
    }
}
