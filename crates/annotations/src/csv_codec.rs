//! Delimited text codec for the frame-level annotation file and the tracklet detail side file.
//!
//! Frame-level lines carry 7 to 12 columns:
//!
//! ```text
//! frame, tracklet_id, x, y, w, h, score[, role, jersey_number, jersey_color, team[, event]]
//! ```
//!
//! Parsing is best effort: a malformed line is logged and dropped, never fatal.

use crate::types::{normalize_event, AnnotationRecord, TrackletDetail};
use std::collections::{BTreeMap, HashMap};

/// Header written at the top of the tracklet detail file
pub const TRACKLET_DETAIL_HEADER: &str = "tracklet_id, role, jersey_number, jersey_color, team";

const FIELD_SEPARATOR: &str = ", ";
const MIN_FRAME_COLUMNS: usize = 7;
const DETAIL_COLUMNS: usize = 5;

/// Parse frame-level records in file order.
///
/// When `details` carries an entry for a record's tracklet id, its metadata wins over the
/// inline columns.
#[must_use]
pub fn parse_frame_records(
    text: &str,
    details: Option<&[TrackletDetail]>,
) -> Vec<AnnotationRecord> {
    let overlay: HashMap<i64, &TrackletDetail> = details
        .unwrap_or_default()
        .iter()
        .map(|detail| (detail.tracklet_id, detail))
        .collect();

    let mut records = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let line_no = idx + 1;
        let columns: Vec<&str> = line.split(',').map(str::trim).collect();
        if columns.len() < MIN_FRAME_COLUMNS {
            log::warn!(
                "Skipping line {line_no}: expected at least {MIN_FRAME_COLUMNS} columns, got {}",
                columns.len()
            );
            continue;
        }

        let Some(mut record) = parse_frame_columns(&columns) else {
            log::warn!("Skipping line {line_no}: invalid numeric field in {line:?}");
            continue;
        };

        if let Some(detail) = overlay.get(&record.tracklet_id) {
            record.apply_detail(detail);
        }
        records.push(record);
    }

    log::debug!("Parsed {} frame records", records.len());
    records
}

fn parse_frame_columns(columns: &[&str]) -> Option<AnnotationRecord> {
    let text_at = |idx: usize| columns.get(idx).map_or_else(String::new, |s| (*s).to_string());

    Some(AnnotationRecord {
        frame: parse_int(columns[0])?,
        tracklet_id: parse_int(columns[1])?,
        x: parse_float(columns[2])?,
        y: parse_float(columns[3])?,
        w: parse_float(columns[4])?,
        h: parse_float(columns[5])?,
        score: parse_float(columns[6])?,
        role: text_at(7),
        jersey_number: text_at(8),
        jersey_color: text_at(9),
        team: text_at(10),
        event: columns.get(11).and_then(|raw| normalize_event(raw)),
    })
}

/// Integer column; integral float spellings such as `5.0` are accepted.
fn parse_int(raw: &str) -> Option<i64> {
    if let Ok(value) = raw.parse::<i64>() {
        return Some(value);
    }
    let value = raw.parse::<f64>().ok()?;
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}

fn parse_float(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Serialize frame-level records, one `", "`-joined line each, in the given order.
///
/// Metadata columns are always written empty; they live in the detail file.
#[must_use]
pub fn serialize_frame_records(records: &[AnnotationRecord]) -> String {
    records
        .iter()
        .map(|record| {
            [
                record.frame.to_string(),
                record.tracklet_id.to_string(),
                record.x.to_string(),
                record.y.to_string(),
                record.w.to_string(),
                record.h.to_string(),
                record.score.to_string(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                record.event.clone().unwrap_or_default(),
            ]
            .join(FIELD_SEPARATOR)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse the 5-column tracklet detail file; the header line is skipped
#[must_use]
pub fn parse_tracklet_details(text: &str) -> Vec<TrackletDetail> {
    let mut details = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let line_no = idx + 1;
        let columns: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        if columns.first() == Some(&"tracklet_id") {
            continue;
        }
        if columns.len() < DETAIL_COLUMNS {
            log::warn!(
                "Skipping detail line {line_no}: expected {DETAIL_COLUMNS} columns, got {}",
                columns.len()
            );
            continue;
        }
        let Some(tracklet_id) = parse_int(columns[0]) else {
            log::warn!("Skipping detail line {line_no}: invalid tracklet id {:?}", columns[0]);
            continue;
        };
        details.push(TrackletDetail {
            tracklet_id,
            role: columns[1].to_string(),
            jersey_number: columns[2].to_string(),
            jersey_color: columns[3].to_string(),
            team: columns[4].to_string(),
        });
    }

    log::debug!("Parsed {} tracklet details", details.len());
    details
}

/// Serialize tracklet details with the header line first
#[must_use]
pub fn serialize_tracklet_details(details: &[TrackletDetail]) -> String {
    std::iter::once(TRACKLET_DETAIL_HEADER.to_string())
        .chain(details.iter().map(|detail| {
            [
                detail.tracklet_id.to_string(),
                detail.role.clone(),
                detail.jersey_number.clone(),
                detail.jersey_color.clone(),
                detail.team.clone(),
            ]
            .join(FIELD_SEPARATOR)
        }))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build tracklet details from metadata carried inline on frame records.
///
/// Each field takes the first non-empty value seen for the tracklet; tracklets without any
/// metadata are omitted. Sorted by tracklet id.
#[must_use]
pub fn extract_details_from_records(records: &[AnnotationRecord]) -> Vec<TrackletDetail> {
    let mut by_id: BTreeMap<i64, TrackletDetail> = BTreeMap::new();
    for record in records.iter().filter(|r| r.has_attributes()) {
        let detail = by_id
            .entry(record.tracklet_id)
            .or_insert_with(|| TrackletDetail::new(record.tracklet_id));
        fill_if_empty(&mut detail.role, &record.role);
        fill_if_empty(&mut detail.jersey_number, &record.jersey_number);
        fill_if_empty(&mut detail.jersey_color, &record.jersey_color);
        fill_if_empty(&mut detail.team, &record.team);
    }
    by_id.into_values().collect()
}

fn fill_if_empty(slot: &mut String, value: &str) {
    if slot.is_empty() && !value.is_empty() {
        *slot = value.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_seven_columns() {
        let records = parse_frame_records("5,7,10,20,30,40,0.9", None);
        assert_eq!(records.len(), 1);
        let expected = AnnotationRecord {
            score: 0.9,
            ..AnnotationRecord::new(5, 7, 10.0, 20.0, 30.0, 40.0)
        };
        assert_eq!(records[0], expected);
        assert_eq!(records[0].event, None);
    }

    #[test]
    fn test_parse_full_width_with_padding() {
        let text = " 3 , 2 , 1.5, 2.5, 10, 12, 0.75, player, 10, red, A, serve \n";
        let records = parse_frame_records(text, None);
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.key(), (3, 2));
        assert_eq!(record.x, 1.5);
        assert_eq!(record.role, "player");
        assert_eq!(record.jersey_number, "10");
        assert_eq!(record.jersey_color, "red");
        assert_eq!(record.team, "A");
        assert_eq!(record.event.as_deref(), Some("serve"));
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let text = "1,2,3\n\
                    x,2,10,20,30,40,1\n\
                    4,2,10,abc,30,40,1\n\
                    \n\
                    6,2,10,20,30,40,1";
        let records = parse_frame_records(text, None);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].frame, 6);
    }

    #[test]
    fn test_no_event_is_normalized() {
        let records = parse_frame_records("1, 1, 0, 0, 5, 5, 1, , , , , no_event", None);
        assert_eq!(records[0].event, None);
        let text = serialize_frame_records(&records);
        assert_eq!(text, "1, 1, 0, 0, 5, 5, 1, , , , , ");
        assert!(!text.contains("no_event"));
    }

    #[test]
    fn test_detail_overlay_wins_over_inline() {
        let details = vec![TrackletDetail::new(7).role("player").team("B")];
        let text = "1, 7, 0, 0, 5, 5, 1, referee, 3, blue, A\n1, 8, 0, 0, 5, 5, 1, player, 9, red, A";
        let records = parse_frame_records(text, Some(&details));
        assert_eq!(records[0].role, "player");
        assert_eq!(records[0].team, "B");
        assert_eq!(records[0].jersey_number, "");
        assert_eq!(records[1].role, "player");
        assert_eq!(records[1].jersey_number, "9");
    }

    #[test]
    fn test_serialize_blanks_attributes() {
        let record = AnnotationRecord::new(2, 3, 1.5, 2.0, 10.0, 20.0)
            .with_score(0.5)
            .with_detail(&TrackletDetail::new(3).role("player"))
            .with_event("block");
        assert_eq!(
            serialize_frame_records(&[record]),
            "2, 3, 1.5, 2, 10, 20, 0.5, , , , , block"
        );
    }

    #[test]
    fn test_round_trip_keeps_geometry_and_events() {
        let records = vec![
            AnnotationRecord::new(1, 1, 10.25, 20.5, 30.0, 40.0).with_score(0.93),
            AnnotationRecord::new(1, 2, 0.1, 0.2, 0.3, 0.4).with_event("spike"),
            AnnotationRecord::ball(2, 512.125, 300.0),
        ];
        let parsed = parse_frame_records(&serialize_frame_records(&records), None);
        assert_eq!(parsed.len(), records.len());
        for (original, back) in records.iter().zip(&parsed) {
            assert_eq!(back.key(), original.key());
            assert_eq!(back.bbox(), original.bbox());
            assert_eq!(back.score, original.score);
            assert_eq!(back.event, original.event);
            assert!(!back.has_attributes());
        }
    }

    #[test]
    fn test_detail_file_round_trip_with_header() {
        let details = vec![
            TrackletDetail::new(1).role("player").jersey_number("4").team("A"),
            TrackletDetail::new(2).role("referee"),
        ];
        let text = serialize_tracklet_details(&details);
        assert!(text.starts_with(TRACKLET_DETAIL_HEADER));
        assert_eq!(parse_tracklet_details(&text), details);
    }

    #[test]
    fn test_detail_parse_skips_bad_lines() {
        let text = "tracklet_id, role, jersey_number, jersey_color, team\n\
                    1, player, 4\n\
                    abc, player, 4, red, A\n\
                    2, player, 5, red, B";
        let details = parse_tracklet_details(text);
        assert_eq!(details, vec![TrackletDetail::new(2)
            .role("player")
            .jersey_number("5")
            .jersey_color("red")
            .team("B")]);
    }

    #[test]
    fn test_extract_details_first_non_empty_per_field() {
        let text = "1, 3, 0, 0, 1, 1, 1, , , , \n\
                    2, 3, 0, 0, 1, 1, 1, player, , , A\n\
                    3, 3, 0, 0, 1, 1, 1, referee, 12, red, B\n\
                    1, 1, 0, 0, 1, 1, 1, , 8, , \n\
                    1, 5, 0, 0, 1, 1, 1\n";
        let records = parse_frame_records(text, None);
        let details = extract_details_from_records(&records);
        assert_eq!(
            details,
            vec![
                TrackletDetail::new(1).jersey_number("8"),
                TrackletDetail::new(3)
                    .role("player")
                    .jersey_number("12")
                    .jersey_color("red")
                    .team("A"),
            ]
        );
    }
}
