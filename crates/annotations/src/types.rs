use crate::error::{AnnotationError, Result};
use serde::{Deserialize, Serialize};

/// Reserved tracklet id for ball point annotations
pub const BALL_TRACKLET_ID: i64 = 99;

/// Fixed box extent given to ball points
pub const BALL_BOX_SIZE: f64 = 8.0;

/// Confidence assigned to manually drawn boxes
pub const DEFAULT_SCORE: f64 = 1.0;

/// Raw event value that means "no event"
pub const NO_EVENT: &str = "no_event";

/// Identity of a record inside a rally: `(frame, tracklet_id)`.
///
/// Ordering is frame first, then tracklet id, which is the on-disk sort order.
pub type RecordKey = (i64, i64);

/// One object's location in one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    /// Frame number decoded from the image filename (not a list index)
    pub frame: i64,

    /// Tracked object identity; [`BALL_TRACKLET_ID`] marks a ball point
    pub tracklet_id: i64,

    /// Box origin and extent in source image pixels
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,

    /// Detection confidence
    pub score: f64,

    /// Per-tracklet metadata carried inline (may be empty)
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub jersey_number: String,
    #[serde(default)]
    pub jersey_color: String,
    #[serde(default)]
    pub team: String,

    /// Event tag for this object in this frame; `None` means no event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

impl AnnotationRecord {
    /// Create a manually drawn box with default score and no metadata
    #[must_use]
    pub fn new(frame: i64, tracklet_id: i64, x: f64, y: f64, w: f64, h: f64) -> Self {
        Self {
            frame,
            tracklet_id,
            x,
            y,
            w,
            h,
            score: DEFAULT_SCORE,
            role: String::new(),
            jersey_number: String::new(),
            jersey_color: String::new(),
            team: String::new(),
            event: None,
        }
    }

    /// Create a ball point; `(x, y)` is the clicked position, the extent is fixed
    #[must_use]
    pub fn ball(frame: i64, x: f64, y: f64) -> Self {
        Self {
            role: "ball".to_string(),
            ..Self::new(frame, BALL_TRACKLET_ID, x, y, BALL_BOX_SIZE, BALL_BOX_SIZE)
        }
    }

    /// Builder: set score
    #[must_use]
    pub const fn with_score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    /// Builder: set event (empty and `no_event` clear it)
    #[must_use]
    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = normalize_event(&event.into());
        self
    }

    /// Builder: copy metadata from a tracklet detail
    #[must_use]
    pub fn with_detail(mut self, detail: &TrackletDetail) -> Self {
        self.apply_detail(detail);
        self
    }

    #[must_use]
    pub const fn key(&self) -> RecordKey {
        (self.frame, self.tracklet_id)
    }

    #[must_use]
    pub const fn is_ball(&self) -> bool {
        self.tracklet_id == BALL_TRACKLET_ID
    }

    #[must_use]
    pub const fn bbox(&self) -> BoundingBox {
        BoundingBox {
            x: self.x,
            y: self.y,
            w: self.w,
            h: self.h,
        }
    }

    /// True when any metadata field carries a value
    #[must_use]
    pub fn has_attributes(&self) -> bool {
        !(self.role.is_empty()
            && self.jersey_number.is_empty()
            && self.jersey_color.is_empty()
            && self.team.is_empty())
    }

    /// Overwrite metadata fields with the detail's values
    pub fn apply_detail(&mut self, detail: &TrackletDetail) {
        self.role.clone_from(&detail.role);
        self.jersey_number.clone_from(&detail.jersey_number);
        self.jersey_color.clone_from(&detail.jersey_color);
        self.team.clone_from(&detail.team);
    }

    /// Blank metadata fields (they live in the detail side file)
    pub fn clear_attributes(&mut self) {
        self.role.clear();
        self.jersey_number.clear();
        self.jersey_color.clear();
        self.team.clear();
    }
}

/// One object's static metadata, independent of frame
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackletDetail {
    pub tracklet_id: i64,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub jersey_number: String,
    #[serde(default)]
    pub jersey_color: String,
    #[serde(default)]
    pub team: String,
}

impl TrackletDetail {
    #[must_use]
    pub fn new(tracklet_id: i64) -> Self {
        Self {
            tracklet_id,
            ..Default::default()
        }
    }

    /// Builder: set role
    #[must_use]
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    /// Builder: set jersey number
    #[must_use]
    pub fn jersey_number(mut self, number: impl Into<String>) -> Self {
        self.jersey_number = number.into();
        self
    }

    /// Builder: set jersey color
    #[must_use]
    pub fn jersey_color(mut self, color: impl Into<String>) -> Self {
        self.jersey_color = color.into();
        self
    }

    /// Builder: set team
    #[must_use]
    pub fn team(mut self, team: impl Into<String>) -> Self {
        self.team = team.into();
        self
    }

    /// Metadata as carried by a record
    #[must_use]
    pub fn from_record(record: &AnnotationRecord) -> Self {
        Self {
            tracklet_id: record.tracklet_id,
            role: record.role.clone(),
            jersey_number: record.jersey_number.clone(),
            jersey_color: record.jersey_color.clone(),
            team: record.team.clone(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.role.is_empty()
            && self.jersey_number.is_empty()
            && self.jersey_color.is_empty()
            && self.team.is_empty()
    }
}

/// Axis-aligned box in source image pixels (top-left origin + extent)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl BoundingBox {
    #[must_use]
    pub const fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Geometry checks a caller runs before handing a drawn box to the store.
    ///
    /// Rejects non-finite values, non-positive extent, an origin outside the image and a box
    /// running past the right or bottom edge.
    pub fn validate(&self, image_width: f64, image_height: f64) -> Result<()> {
        if ![self.x, self.y, self.w, self.h].iter().all(|v| v.is_finite()) {
            return Err(AnnotationError::invalid_box("coordinates must be finite"));
        }
        if self.w <= 0.0 || self.h <= 0.0 {
            return Err(AnnotationError::invalid_box(format!(
                "extent must be positive (w={}, h={})",
                self.w, self.h
            )));
        }
        if self.x < 0.0 || self.y < 0.0 || self.x >= image_width || self.y >= image_height {
            return Err(AnnotationError::invalid_box(format!(
                "origin ({}, {}) outside {}x{} image",
                self.x, self.y, image_width, image_height
            )));
        }
        if self.x + self.w > image_width || self.y + self.h > image_height {
            return Err(AnnotationError::invalid_box(format!(
                "box ({}, {}, {}, {}) extends past {}x{} image",
                self.x, self.y, self.w, self.h, image_width, image_height
            )));
        }
        Ok(())
    }
}

/// Normalize a raw event value: empty and `no_event` both mean "no event"
#[must_use]
pub fn normalize_event(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == NO_EVENT {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ball_record_shape() {
        let ball = AnnotationRecord::ball(12, 100.0, 50.0);
        assert!(ball.is_ball());
        assert_eq!(ball.key(), (12, BALL_TRACKLET_ID));
        assert_eq!(ball.w, BALL_BOX_SIZE);
        assert_eq!(ball.h, BALL_BOX_SIZE);
        assert_eq!(ball.score, DEFAULT_SCORE);
        assert_eq!(ball.role, "ball");
    }

    #[test]
    fn test_event_normalization() {
        assert_eq!(normalize_event("no_event"), None);
        assert_eq!(normalize_event("  "), None);
        assert_eq!(normalize_event(" serve "), Some("serve".to_string()));

        let record = AnnotationRecord::new(1, 2, 0.0, 0.0, 1.0, 1.0).with_event("no_event");
        assert_eq!(record.event, None);
    }

    #[test]
    fn test_detail_apply_and_clear() {
        let detail = TrackletDetail::new(4).role("player").team("A").jersey_number("7");
        let mut record = AnnotationRecord::new(1, 4, 0.0, 0.0, 1.0, 1.0).with_detail(&detail);
        assert!(record.has_attributes());
        assert_eq!(TrackletDetail::from_record(&record), detail);

        record.clear_attributes();
        assert!(!record.has_attributes());
    }

    #[test]
    fn test_bbox_validation() {
        assert!(BoundingBox::new(10.0, 10.0, 20.0, 20.0)
            .validate(100.0, 100.0)
            .is_ok());
        assert!(BoundingBox::new(10.0, 10.0, 0.0, 20.0)
            .validate(100.0, 100.0)
            .is_err());
        assert!(BoundingBox::new(10.0, 10.0, 20.0, -1.0)
            .validate(100.0, 100.0)
            .is_err());
        assert!(BoundingBox::new(-1.0, 10.0, 20.0, 20.0)
            .validate(100.0, 100.0)
            .is_err());
        assert!(BoundingBox::new(90.0, 10.0, 20.0, 20.0)
            .validate(100.0, 100.0)
            .is_err());
        assert!(BoundingBox::new(f64::NAN, 10.0, 20.0, 20.0)
            .validate(100.0, 100.0)
            .is_err());
    }
}
