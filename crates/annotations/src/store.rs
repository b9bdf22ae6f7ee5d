use crate::csv_codec::{
    extract_details_from_records, parse_frame_records, parse_tracklet_details,
    serialize_frame_records, serialize_tracklet_details,
};
use crate::types::{normalize_event, AnnotationRecord, RecordKey, TrackletDetail};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Authoritative record set for the active rally.
///
/// Records are keyed by `(frame, tracklet_id)`, so at most one record exists per key and
/// iteration is always in on-disk order. Every mutation replaces on conflict.
#[derive(Debug, Clone, Default)]
pub struct AnnotationStore {
    records: BTreeMap<RecordKey, AnnotationRecord>,
    details: BTreeMap<i64, TrackletDetail>,
    dirty: bool,
}

/// Serialized store contents, ready to be written by the file collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedText {
    pub frame_text: String,
    /// `None` when no tracklet carries metadata
    pub detail_text: Option<String>,
}

/// Summary counters for a loaded rally
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub records: usize,
    pub tracklets: usize,
    pub ball_points: usize,
    pub events: usize,
    pub first_frame: Option<i64>,
    pub last_frame: Option<i64>,
}

impl AnnotationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the store contents with a freshly loaded rally.
    ///
    /// With a detail file, its entries overlay the inline metadata. Tracklets the detail file
    /// does not cover (or every tracklet, without a detail file) get details extracted from the
    /// inline columns so the next save can split them out. Duplicate keys keep the last line.
    pub fn load(&mut self, frame_text: &str, detail_text: Option<&str>) {
        let parsed_details = detail_text.map(parse_tracklet_details).unwrap_or_default();
        let records = parse_frame_records(frame_text, Some(&parsed_details));

        self.details = parsed_details
            .into_iter()
            .map(|detail| (detail.tracklet_id, detail))
            .collect();
        for detail in extract_details_from_records(&records) {
            self.details.entry(detail.tracklet_id).or_insert(detail);
        }

        let parsed = records.len();
        self.records.clear();
        self.insert_all(records);
        self.dirty = false;

        log::info!(
            "Loaded {} records ({} duplicates dropped), {} tracklet details",
            self.records.len(),
            parsed - self.records.len(),
            self.details.len()
        );
    }

    /// Wholesale replace of the record set; duplicate keys keep the last record.
    /// Tracklet details are kept.
    pub fn replace(&mut self, records: Vec<AnnotationRecord>) {
        self.records.clear();
        self.insert_all(records);
        self.dirty = true;
    }

    /// Insert a record or replace the one stored under the same key
    pub fn upsert(&mut self, record: AnnotationRecord) -> Option<AnnotationRecord> {
        self.dirty = true;
        self.records.insert(record.key(), record)
    }

    /// Upsert imported ball points; returns how many were applied
    pub fn merge_ball_points(&mut self, records: Vec<AnnotationRecord>) -> usize {
        let mut applied = 0;
        for record in records.into_iter().filter(AnnotationRecord::is_ball) {
            self.upsert(record);
            applied += 1;
        }
        applied
    }

    pub fn delete_by_key(&mut self, frame: i64, tracklet_id: i64) -> Option<AnnotationRecord> {
        let removed = self.records.remove(&(frame, tracklet_id));
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Remove every record of a tracklet; returns the number removed
    pub fn delete_all_for_tracklet(&mut self, tracklet_id: i64) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| record.tracklet_id != tracklet_id);
        let removed = before - self.records.len();
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }

    /// Remove every ball point
    pub fn delete_all_ball(&mut self) -> usize {
        self.delete_all_for_tracklet(crate::types::BALL_TRACKLET_ID)
    }

    /// Rename every record of `source_id` to `target_id`.
    ///
    /// Where both ids have a record in the same frame, the renamed record replaces the
    /// target's. Renamed records take on the target's metadata when the target has a detail.
    /// Returns the number of renamed records.
    pub fn merge_tracklets(&mut self, source_id: i64, target_id: i64) -> usize {
        if source_id == target_id {
            return 0;
        }
        let keys: Vec<RecordKey> = self
            .records
            .keys()
            .filter(|(_, id)| *id == source_id)
            .copied()
            .collect();
        let target_detail = self.details.get(&target_id).filter(|d| !d.is_empty());
        for key in &keys {
            if let Some(mut record) = self.records.remove(key) {
                record.tracklet_id = target_id;
                if let Some(detail) = target_detail {
                    record.apply_detail(detail);
                }
                self.records.insert(record.key(), record);
            }
        }
        if !keys.is_empty() {
            self.dirty = true;
            log::info!(
                "Merged tracklet {source_id} into {target_id} ({} records)",
                keys.len()
            );
        }
        keys.len()
    }

    /// Swap the ids of two tracklets within `frames`.
    ///
    /// An empty frame set means every frame where either id has a record. Both records of a
    /// frame are taken out before either is reinserted, so the swap never collides.
    /// Returns the number of frames touched.
    pub fn switch_tracklets(&mut self, id_a: i64, id_b: i64, frames: &[i64]) -> usize {
        if id_a == id_b {
            return 0;
        }
        let frames: BTreeSet<i64> = if frames.is_empty() {
            self.records
                .keys()
                .filter(|(_, id)| *id == id_a || *id == id_b)
                .map(|(frame, _)| *frame)
                .collect()
        } else {
            frames.iter().copied().collect()
        };

        let mut touched = 0;
        for frame in frames {
            let rec_a = self.records.remove(&(frame, id_a));
            let rec_b = self.records.remove(&(frame, id_b));
            if rec_a.is_none() && rec_b.is_none() {
                continue;
            }
            touched += 1;
            if let Some(mut record) = rec_a {
                record.tracklet_id = id_b;
                self.records.insert(record.key(), record);
            }
            if let Some(mut record) = rec_b {
                record.tracklet_id = id_a;
                self.records.insert(record.key(), record);
            }
        }
        if touched > 0 {
            self.dirty = true;
        }
        touched
    }

    /// Tag (or clear, with empty / `no_event`) the event of one record.
    /// Returns false when no record exists under the key.
    pub fn set_event(&mut self, frame: i64, tracklet_id: i64, event: &str) -> bool {
        match self.records.get_mut(&(frame, tracklet_id)) {
            Some(record) => {
                record.event = normalize_event(event);
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Apply metadata to every frame of a tracklet and remember it as the tracklet's detail.
    /// Returns the number of records updated.
    pub fn set_tracklet_attributes(&mut self, detail: TrackletDetail) -> usize {
        let mut updated = 0;
        for record in self
            .records
            .values_mut()
            .filter(|r| r.tracklet_id == detail.tracklet_id)
        {
            record.apply_detail(&detail);
            updated += 1;
        }
        self.details.insert(detail.tracklet_id, detail);
        self.dirty = true;
        updated
    }

    /// Serialize the store: frame-level text with metadata blanked plus the detail text.
    ///
    /// Metadata carried only inline (records added after load) is folded into the detail
    /// text so nothing is lost when the frame file drops those columns.
    #[must_use]
    pub fn save(&self) -> SavedText {
        let records: Vec<AnnotationRecord> = self.records.values().cloned().collect();
        let details = self.details_for_save(&records);
        SavedText {
            frame_text: serialize_frame_records(&records),
            detail_text: (!details.is_empty()).then(|| serialize_tracklet_details(&details)),
        }
    }

    fn details_for_save(&self, records: &[AnnotationRecord]) -> Vec<TrackletDetail> {
        let mut details = self.details.clone();
        for detail in extract_details_from_records(records) {
            details.entry(detail.tracklet_id).or_insert(detail);
        }
        details.into_values().filter(|d| !d.is_empty()).collect()
    }

    /// Clear the dirty flag after the caller persisted [`Self::save`] output
    pub fn mark_saved(&mut self) {
        self.dirty = false;
    }

    /// True when the store changed since the last load or [`Self::mark_saved`]
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Snapshot of all records sorted by `(frame, tracklet_id)`
    #[must_use]
    pub fn records(&self) -> Vec<AnnotationRecord> {
        self.records.values().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnnotationRecord> {
        self.records.values()
    }

    #[must_use]
    pub fn get(&self, frame: i64, tracklet_id: i64) -> Option<&AnnotationRecord> {
        self.records.get(&(frame, tracklet_id))
    }

    #[must_use]
    pub fn records_in_frame(&self, frame: i64) -> Vec<&AnnotationRecord> {
        self.records
            .range((frame, i64::MIN)..=(frame, i64::MAX))
            .map(|(_, record)| record)
            .collect()
    }

    /// Distinct tracklet ids, ascending
    #[must_use]
    pub fn tracklet_ids(&self) -> Vec<i64> {
        self.records
            .keys()
            .map(|(_, id)| *id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Frames in which a tracklet has a record, ascending
    #[must_use]
    pub fn frames_for_tracklet(&self, tracklet_id: i64) -> Vec<i64> {
        self.records
            .keys()
            .filter(|(_, id)| *id == tracklet_id)
            .map(|(frame, _)| *frame)
            .collect()
    }

    #[must_use]
    pub fn detail(&self, tracklet_id: i64) -> Option<&TrackletDetail> {
        self.details.get(&tracklet_id)
    }

    /// Known tracklet details sorted by id
    #[must_use]
    pub fn details(&self) -> Vec<TrackletDetail> {
        self.details.values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            records: self.records.len(),
            tracklets: self.tracklet_ids().len(),
            ball_points: self.iter().filter(|r| r.is_ball()).count(),
            events: self.iter().filter(|r| r.event.is_some()).count(),
            first_frame: self.records.keys().next().map(|(frame, _)| *frame),
            last_frame: self.records.keys().next_back().map(|(frame, _)| *frame),
        }
    }

    fn insert_all(&mut self, records: Vec<AnnotationRecord>) {
        for record in records {
            self.records.insert(record.key(), record);
        }
    }
}
