use crate::error::Result;
use rally_annotations::BoundingBox;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const NEUTRAL_GRAY: Self = Self::new(128, 128, 128);

    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Euclidean distance in RGB space (0 ..= ~441.67)
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        let dr = f64::from(self.r) - f64::from(other.r);
        let dg = f64::from(self.g) - f64::from(other.g);
        let db = f64::from(self.b) - f64::from(other.b);
        (dr * dr + dg * dg + db * db).sqrt()
    }
}

/// Dominant color of a region together with the sampler's confidence in it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorSample {
    pub color: Rgb,
    pub confidence: f64,
}

impl ColorSample {
    #[must_use]
    pub const fn new(color: Rgb, confidence: f64) -> Self {
        Self { color, confidence }
    }
}

/// Source of per-frame region colors for the continuity analyzer
pub trait ColorSampler {
    fn sample(&self, image_path: &Path, region: &BoundingBox) -> Result<ColorSample>;
}

impl<F> ColorSampler for F
where
    F: Fn(&Path, &BoundingBox) -> Result<ColorSample>,
{
    fn sample(&self, image_path: &Path, region: &BoundingBox) -> Result<ColorSample> {
        self(image_path, region)
    }
}

/// Deterministic placeholder sampler.
///
/// This does not look at pixels: the "color" is an FNV-1a hash of the image path and the
/// region, so the same inputs always give the same sample. Swap in a real sampler when
/// image decoding is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashColorSampler;

impl ColorSampler for HashColorSampler {
    fn sample(&self, image_path: &Path, region: &BoundingBox) -> Result<ColorSample> {
        let mut hash = fnv1a_64(image_path.to_string_lossy().as_bytes(), FNV_OFFSET_BASIS);
        for value in [region.x, region.y, region.w, region.h] {
            hash = fnv1a_64(&value.to_bits().to_le_bytes(), hash);
        }

        let [r, g, b, conf, ..] = hash.to_le_bytes();
        Ok(ColorSample {
            color: Rgb::new(r, g, b),
            // 0.5 ..= 1.0
            confidence: 0.5 + f64::from(conf) / 510.0,
        })
    }
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;

fn fnv1a_64(bytes: &[u8], seed: u64) -> u64 {
    let mut hash = seed;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// `1 - mean(normalized distance of consecutive samples)`, clamped to [0, 1].
///
/// Fewer than two samples carry no evidence either way and yield `neutral`.
#[must_use]
pub fn color_consistency(colors: &[Rgb], normalizer: f64, neutral: f64) -> f64 {
    if colors.len() < 2 {
        return neutral;
    }
    let total: f64 = colors
        .windows(2)
        .map(|pair| pair[0].distance(pair[1]) / normalizer)
        .sum();
    let mean = total / (colors.len() - 1) as f64;
    (1.0 - mean).clamp(0.0, 1.0)
}
