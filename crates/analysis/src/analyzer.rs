use crate::color::{color_consistency, ColorSample, ColorSampler, Rgb};
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, Result};
use rally_annotations::{frame_file_name, AnnotationRecord};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Longest missing-frame list a report spells out; larger spans only carry the count
pub const MAX_LISTED_MISSING_FRAMES: u64 = 100_000;

/// Why a tracklet is suspected of carrying more than one identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchReason {
    LowColorConsistency,
    SparseCoverage,
    TeamChanged,
    JerseyChanged,
}

impl SwitchReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LowColorConsistency => "low color consistency",
            Self::SparseCoverage => "too many missing frames",
            Self::TeamChanged => "team changes",
            Self::JerseyChanged => "jersey number changes",
        }
    }
}

/// Color sampled at one frame of a tracklet
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameColorSample {
    pub frame: i64,
    pub color: Rgb,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackletReport {
    pub tracklet_id: i64,
    pub first_frame: i64,
    pub last_frame: i64,
    /// Span length, `last_frame - first_frame + 1` (saturating)
    pub total_frames: u64,
    pub missing_frame_count: u64,
    /// Empty when `missing_frame_count` exceeds [`MAX_LISTED_MISSING_FRAMES`]
    pub missing_frames: Vec<i64>,
    /// Maximal runs of consecutive missing frames
    pub continuity_gaps: usize,
    pub color_samples: Vec<FrameColorSample>,
    pub color_consistency: f64,
    pub suspected_switching: bool,
    pub switch_reasons: Vec<SwitchReason>,
}

impl TrackletReport {
    /// Tracklet needs review: a suspected switch, any gap, or mediocre color stability
    #[must_use]
    pub fn is_problematic(&self, config: &AnalysisConfig) -> bool {
        self.suspected_switching
            || self.missing_frame_count > 0
            || self.color_consistency < config.problematic_color_threshold
    }

    fn score(&self, config: &AnalysisConfig) -> f64 {
        let bonus = if self.missing_frame_count == 0 {
            config.continuity_bonus
        } else {
            0.0
        };
        config.color_weight * self.color_consistency + bonus
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub tracklets: Vec<TrackletReport>,
    pub total_tracklets: usize,
    pub problematic_tracklets: usize,
    pub overall_score: f64,
}

/// Groups a rally's records by tracklet and scores each tracklet's continuity
pub struct ContinuityAnalyzer<S> {
    config: AnalysisConfig,
    sampler: S,
}

impl<S: ColorSampler> ContinuityAnalyzer<S> {
    pub fn new(config: AnalysisConfig, sampler: S) -> Result<Self> {
        config.validate().map_err(AnalysisError::InvalidConfig)?;
        Ok(Self { config, sampler })
    }

    #[must_use]
    pub const fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyze every tracklet in `records`; images are looked up under `rally_path`
    pub fn analyze(&self, rally_path: &Path, records: &[AnnotationRecord]) -> AnalysisResult {
        let mut groups: BTreeMap<i64, Vec<&AnnotationRecord>> = BTreeMap::new();
        for record in records {
            groups.entry(record.tracklet_id).or_default().push(record);
        }

        let tracklets: Vec<TrackletReport> = groups
            .into_iter()
            .map(|(tracklet_id, group)| self.analyze_tracklet(rally_path, tracklet_id, group))
            .collect();

        let problematic_tracklets = tracklets
            .iter()
            .filter(|t| t.is_problematic(&self.config))
            .count();
        let overall_score = if tracklets.is_empty() {
            1.0
        } else {
            tracklets.iter().map(|t| t.score(&self.config)).sum::<f64>() / tracklets.len() as f64
        };

        log::info!(
            "Analyzed {} tracklets: {problematic_tracklets} problematic, score {overall_score:.3}",
            tracklets.len()
        );

        AnalysisResult {
            total_tracklets: tracklets.len(),
            tracklets,
            problematic_tracklets,
            overall_score,
        }
    }

    fn analyze_tracklet(
        &self,
        rally_path: &Path,
        tracklet_id: i64,
        mut records: Vec<&AnnotationRecord>,
    ) -> TrackletReport {
        records.sort_by_key(|record| record.frame);
        let first_frame = records.first().map_or(0, |r| r.frame);
        let last_frame = records.last().map_or(0, |r| r.frame);
        let total_frames = span_length(first_frame, last_frame);

        let present: BTreeSet<i64> = records.iter().map(|r| r.frame).collect();
        let (missing_frame_count, continuity_gaps) = gap_summary(&present);
        let missing_frames = if missing_frame_count <= MAX_LISTED_MISSING_FRAMES {
            missing_frames(&present, first_frame, last_frame)
        } else {
            log::warn!(
                "Tracklet {tracklet_id} spans frames {first_frame}-{last_frame} with \
                 {missing_frame_count} missing; not listing them"
            );
            Vec::new()
        };

        let color_samples = self.sample_colors(rally_path, &records);
        let colors: Vec<Rgb> = color_samples.iter().map(|s| s.color).collect();
        let color_consistency = color_consistency(
            &colors,
            self.config.color_distance_normalizer,
            self.config.neutral_consistency,
        );

        let mut switch_reasons = Vec::new();
        if color_consistency < self.config.switch_color_threshold {
            switch_reasons.push(SwitchReason::LowColorConsistency);
        }
        if missing_frame_count as f64 > self.config.missing_ratio_threshold * total_frames as f64 {
            switch_reasons.push(SwitchReason::SparseCoverage);
        }
        if distinct_non_empty(records.iter().map(|r| r.team.as_str())) > 1 {
            switch_reasons.push(SwitchReason::TeamChanged);
        }
        if distinct_non_empty(records.iter().map(|r| r.jersey_number.as_str())) > 1 {
            switch_reasons.push(SwitchReason::JerseyChanged);
        }

        if !switch_reasons.is_empty() {
            log::debug!("Tracklet {tracklet_id} suspected of switching: {switch_reasons:?}");
        }

        TrackletReport {
            tracklet_id,
            first_frame,
            last_frame,
            total_frames,
            missing_frame_count,
            missing_frames,
            continuity_gaps,
            color_samples,
            color_consistency,
            suspected_switching: !switch_reasons.is_empty(),
            switch_reasons,
        }
    }

    /// Sample every `max(1, n / max_color_samples)`-th record; a failed sample becomes gray
    fn sample_colors(
        &self,
        rally_path: &Path,
        records: &[&AnnotationRecord],
    ) -> Vec<FrameColorSample> {
        let step = (records.len() / self.config.max_color_samples).max(1);
        records
            .iter()
            .step_by(step)
            .map(|record| {
                let image_path = rally_path.join(frame_file_name(record.frame));
                let sample = self
                    .sampler
                    .sample(&image_path, &record.bbox())
                    .unwrap_or_else(|err| {
                        log::warn!("Falling back to neutral color: {err}");
                        ColorSample::new(Rgb::NEUTRAL_GRAY, self.config.fallback_confidence)
                    });
                FrameColorSample {
                    frame: record.frame,
                    color: sample.color,
                    confidence: sample.confidence,
                }
            })
            .collect()
    }
}

/// Frames in `[first, last]` that have no record
#[must_use]
pub fn missing_frames(present: &BTreeSet<i64>, first: i64, last: i64) -> Vec<i64> {
    (first..=last).filter(|frame| !present.contains(frame)).collect()
}

/// `last - first + 1` without overflow, saturating at `u64::MAX`
#[must_use]
pub fn span_length(first: i64, last: i64) -> u64 {
    let span = i128::from(last) - i128::from(first) + 1;
    u64::try_from(span.max(0)).unwrap_or(u64::MAX)
}

/// Missing-frame count and number of gaps between consecutive present frames, without
/// enumerating the span
#[must_use]
pub fn gap_summary(present: &BTreeSet<i64>) -> (u64, usize) {
    let mut missing: u64 = 0;
    let mut gaps = 0;
    let mut frames = present.iter();
    let Some(mut previous) = frames.next() else {
        return (0, 0);
    };
    for frame in frames {
        let between = span_length(*previous, *frame).saturating_sub(2);
        if between > 0 {
            missing = missing.saturating_add(between);
            gaps += 1;
        }
        previous = frame;
    }
    (missing, gaps)
}

/// Number of maximal runs of consecutive frames in a sorted list
#[must_use]
pub fn count_gaps(missing: &[i64]) -> usize {
    missing
        .iter()
        .enumerate()
        .filter(|(idx, frame)| *idx == 0 || missing[idx - 1] + 1 != **frame)
        .count()
}

fn distinct_non_empty<'a>(values: impl Iterator<Item = &'a str>) -> usize {
    values
        .filter(|value| !value.is_empty())
        .collect::<BTreeSet<_>>()
        .len()
}
