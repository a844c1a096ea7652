//! Output size prediction, callable before committing to a capture run.
//!
//! The per-frame costs are empirical. They live in a [`CostTable`] that hosts can replace
//! (for example with numbers measured on their own content) instead of constants.

use crate::{
    core::AnimationStyle,
    encode::{EncoderSettings, QualityTier, ResolutionTier},
};

/// Width the GIF costs in [`CostTable`] are measured at.
pub const DEFAULT_TARGET_WIDTH: u32 = 480;

/// Frames the estimator assumes a style produces for `unit_count` units. Saturates at
/// `u64::MAX`.
pub fn estimated_frame_count(unit_count: usize, style: AnimationStyle) -> u64 {
    let n = u64::try_from(unit_count).unwrap_or(u64::MAX);
    match style {
        AnimationStyle::None => 1,
        AnimationStyle::Reveal => n.saturating_add(3),
        AnimationStyle::Typing => n.saturating_mul(5).saturating_add(2),
        AnimationStyle::Scroll => 11,
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CostTable {
    /// Width at which `gif_frame_bytes` was measured; costs scale with area.
    pub gif_reference_width: u32,
    pub gif_frame_bytes: TierCosts,
    pub gif_overhead_bytes: u64,
    pub video_frame_bytes: ResolutionCosts,
    pub video_overhead_bytes: u64,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TierCosts {
    pub low: u64,
    pub medium: u64,
    pub high: u64,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResolutionCosts {
    #[serde(rename = "480p")]
    pub sd480: u64,
    #[serde(rename = "720p")]
    pub hd720: u64,
    #[serde(rename = "1080p")]
    pub hd1080: u64,
}

impl Default for CostTable {
    fn default() -> Self {
        Self {
            gif_reference_width: DEFAULT_TARGET_WIDTH,
            gif_frame_bytes: TierCosts {
                low: 12_000,
                medium: 20_000,
                high: 32_000,
            },
            gif_overhead_bytes: 1_024,
            video_frame_bytes: ResolutionCosts {
                sd480: 4_000,
                hd720: 9_000,
                hd1080: 18_000,
            },
            video_overhead_bytes: 4_096,
        }
    }
}

impl CostTable {
    pub fn gif_frame_bytes(&self, tier: QualityTier, target_width: u32) -> u64 {
        let base = match tier {
            QualityTier::Low => self.gif_frame_bytes.low,
            QualityTier::Medium => self.gif_frame_bytes.medium,
            QualityTier::High => self.gif_frame_bytes.high,
        };
        let scale = f64::from(target_width) / f64::from(self.gif_reference_width.max(1));
        (base as f64 * scale * scale).round() as u64
    }

    pub fn video_frame_bytes(&self, tier: ResolutionTier) -> u64 {
        match tier {
            ResolutionTier::Sd480 => self.video_frame_bytes.sd480,
            ResolutionTier::Hd720 => self.video_frame_bytes.hd720,
            ResolutionTier::Hd1080 => self.video_frame_bytes.hd1080,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SizeEstimator {
    pub table: CostTable,
    pub target_width: u32,
}

impl SizeEstimator {
    pub fn new(table: CostTable, target_width: u32) -> Self {
        Self {
            table,
            target_width,
        }
    }

    /// Predicted artifact size in bytes, saturating at `u64::MAX`. Pure; runs nothing.
    pub fn estimate(
        &self,
        unit_count: usize,
        style: AnimationStyle,
        settings: &EncoderSettings,
    ) -> u64 {
        let frames = estimated_frame_count(unit_count, style);
        match settings {
            EncoderSettings::ImageSequence(s) => {
                let width = if self.target_width == 0 {
                    DEFAULT_TARGET_WIDTH
                } else {
                    self.target_width
                };
                frames
                    .saturating_mul(self.table.gif_frame_bytes(s.quality, width))
                    .saturating_add(self.table.gif_overhead_bytes)
            }
            EncoderSettings::Video(s) => {
                frames
                    .saturating_mul(self.table.video_frame_bytes(s.resolution))
                    .saturating_add(self.table.video_overhead_bytes)
            }
        }
    }
}

/// [`SizeEstimator::estimate`] with the default table and target width.
pub fn estimate(unit_count: usize, style: AnimationStyle, settings: &EncoderSettings) -> u64 {
    SizeEstimator::new(CostTable::default(), DEFAULT_TARGET_WIDTH).estimate(
        unit_count, style, settings,
    )
}

#[cfg(test)]
#[path = "../tests/unit/estimate.rs"]
mod tests;
