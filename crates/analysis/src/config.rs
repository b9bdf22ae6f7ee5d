use serde::{Deserialize, Serialize};

/// Thresholds and weights for continuity analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Upper bound used to derive the sampling stride (`max(1, n / max_color_samples)`)
    pub max_color_samples: usize,

    /// Consistency below this flags a suspected identity switch
    pub switch_color_threshold: f64,

    /// Missing-frame share of the tracklet span above this flags a suspected switch
    pub missing_ratio_threshold: f64,

    /// Consistency below this counts the tracklet as problematic
    pub problematic_color_threshold: f64,

    /// Divisor turning raw RGB distance into [0, 1] (≈ sqrt(3 * 255²))
    pub color_distance_normalizer: f64,

    /// Consistency reported when fewer than two samples exist
    pub neutral_consistency: f64,

    /// Confidence attached to the gray fallback when sampling fails
    pub fallback_confidence: f64,

    /// Weight of color consistency in the per-tracklet score
    pub color_weight: f64,

    /// Score bonus for a tracklet without missing frames
    pub continuity_bonus: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_color_samples: 10,
            switch_color_threshold: 0.6,
            missing_ratio_threshold: 0.3,
            problematic_color_threshold: 0.7,
            color_distance_normalizer: 441.0,
            neutral_consistency: 0.5,
            fallback_confidence: 0.1,
            color_weight: 0.7,
            continuity_bonus: 0.3,
        }
    }
}

impl AnalysisConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_color_samples == 0 {
            return Err("max_color_samples must be > 0".to_string());
        }

        if !(self.color_distance_normalizer > 0.0) {
            return Err(format!(
                "color_distance_normalizer must be > 0 (got {})",
                self.color_distance_normalizer
            ));
        }

        for (name, value) in [
            ("switch_color_threshold", self.switch_color_threshold),
            ("missing_ratio_threshold", self.missing_ratio_threshold),
            ("problematic_color_threshold", self.problematic_color_threshold),
            ("neutral_consistency", self.neutral_consistency),
            ("fallback_confidence", self.fallback_confidence),
            ("color_weight", self.color_weight),
            ("continuity_bonus", self.continuity_bonus),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(format!("{name} must be within [0, 1] (got {value})"));
            }
        }

        Ok(())
    }
}
