//! # Rally Analysis
//!
//! Continuity and identity-switch heuristics over a rally's tracklets.
//!
//! ## Pipeline
//!
//! ```text
//! AnnotationRecord[]
//!     │
//!     ├──> Group by tracklet_id, sort by frame
//!     │
//!     ├──> Missing frames + continuity gaps
//!     │
//!     ├──> Color samples (≤ ~10 per tracklet, via ColorSampler)
//!     │      └─> Consecutive RGB distance → consistency
//!     │
//!     └──> Switch suspicion + rally score
//! ```
//!
//! The bundled [`HashColorSampler`] is a deterministic stand-in, not an image analyzer.

mod analyzer;
mod color;
mod config;
mod error;

pub use analyzer::{
    count_gaps, gap_summary, missing_frames, span_length, AnalysisResult, ContinuityAnalyzer,
    FrameColorSample, SwitchReason, TrackletReport, MAX_LISTED_MISSING_FRAMES,
};
pub use color::{color_consistency, ColorSample, ColorSampler, HashColorSampler, Rgb};
pub use config::AnalysisConfig;
pub use error::{AnalysisError, Result};
