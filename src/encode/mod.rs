//! Encoders: compress a [`FrameBuffer`] into an [`EncodedArtifact`].
//!
//! Two strategies sit behind one entry point, selected by the [`EncoderSettings`] tag:
//! an image-sequence (GIF) encoder and an ffmpeg-backed video encoder. Both run through an
//! [`EncoderPool`] so concurrent exports share a bounded number of encode slots.

use std::{sync::Arc, time::Duration};

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use crate::{
    core::FrameBuffer,
    error::{EncodeError, EncodeResult},
    progress::ProgressReporter,
};

/// GIF89a image-sequence encoder.
pub mod gif;
/// Pixel preparation shared by both encoders.
pub mod pixels;
/// Bounded encoder pool.
pub mod pool;
/// ffmpeg-backed video encoder with a real-time pacing pump.
pub mod video;

pub use pool::EncoderPool;

/// Minimum number of progress updates an encode run emits.
pub const MIN_PROGRESS_UPDATES: usize = 10;

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    #[default]
    Medium,
    High,
}

/// What a [`QualityTier`] means for the image-sequence encoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QualityProfile {
    /// Colours in each frame's local colour table (a power of two, at most 256).
    pub palette_size: usize,
    /// Whether error-diffusion dithering is permitted at this tier.
    pub dithering: bool,
    /// Frames quantized in parallel.
    pub workers: usize,
    /// NeuQuant sampling factor; 1 samples every pixel, 30 is fastest.
    pub sample_factor: i32,
}

impl QualityTier {
    pub fn profile(self) -> QualityProfile {
        match self {
            Self::Low => QualityProfile {
                palette_size: 64,
                dithering: false,
                workers: 4,
                sample_factor: 20,
            },
            Self::Medium => QualityProfile {
                palette_size: 128,
                dithering: true,
                workers: 2,
                sample_factor: 10,
            },
            Self::High => QualityProfile {
                palette_size: 256,
                dithering: true,
                workers: 1,
                sample_factor: 1,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ImageSequenceSettings {
    pub quality: QualityTier,
    /// Request dithering; honoured only when the tier permits it.
    pub dither: bool,
    /// Loop forever instead of playing once.
    pub looping: bool,
    /// Display time of each frame. The final frame is shown for twice as long.
    pub frame_delay_ms: u32,
}

impl Default for ImageSequenceSettings {
    fn default() -> Self {
        Self {
            quality: QualityTier::Medium,
            dither: true,
            looping: true,
            frame_delay_ms: 100,
        }
    }
}

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum ResolutionTier {
    #[serde(rename = "480p")]
    Sd480,
    #[default]
    #[serde(rename = "720p")]
    Hd720,
    #[serde(rename = "1080p")]
    Hd1080,
}

impl ResolutionTier {
    /// Output pixel dimensions (width, height); both even for yuv420p.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Self::Sd480 => (854, 480),
            Self::Hd720 => (1280, 720),
            Self::Hd1080 => (1920, 1080),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    #[default]
    H264,
    Vp8,
    Vp9,
}

impl VideoCodec {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::Vp8 => "vp8",
            Self::Vp9 => "vp9",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoContainer {
    #[default]
    Mp4,
    Webm,
}

impl VideoContainer {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
        }
    }

    pub fn format(self) -> MediaFormat {
        match self {
            Self::Mp4 => MediaFormat::Mp4,
            Self::Webm => MediaFormat::Webm,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    pub fps: u32,
    pub resolution: ResolutionTier,
    pub codec: VideoCodec,
    pub container: VideoContainer,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            fps: 30,
            resolution: ResolutionTier::Hd720,
            codec: VideoCodec::H264,
            container: VideoContainer::Mp4,
        }
    }
}

impl VideoSettings {
    /// Play time of `frames` frames at the configured rate.
    pub fn nominal_duration(&self, frames: usize) -> Duration {
        Duration::from_secs_f64(frames as f64 / f64::from(self.fps.max(1)))
    }
}

/// Settings of one encode run; the tag selects the encoder.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EncoderSettings {
    ImageSequence(ImageSequenceSettings),
    Video(VideoSettings),
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self::ImageSequence(ImageSequenceSettings::default())
    }
}

impl EncoderSettings {
    pub fn format(&self) -> MediaFormat {
        match self {
            Self::ImageSequence(_) => MediaFormat::Gif,
            Self::Video(v) => v.container.format(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaFormat {
    Gif,
    Mp4,
    Webm,
}

impl MediaFormat {
    pub fn media_type(self) -> &'static str {
        match self {
            Self::Gif => "image/gif",
            Self::Mp4 => "video/mp4",
            Self::Webm => "video/webm",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Gif => "gif",
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
        }
    }

    /// `mockup-{YYYY-MM-DD}.{ext}`
    pub fn suggested_filename(self, date: NaiveDate) -> String {
        format!("mockup-{}.{}", date.format("%Y-%m-%d"), self.extension())
    }
}

/// Encoded bytes plus what a host needs to offer them for download or upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedArtifact {
    pub bytes: Vec<u8>,
    pub media_type: String,
    pub suggested_filename: String,
}

impl EncodedArtifact {
    pub fn new(bytes: Vec<u8>, format: MediaFormat, date: NaiveDate) -> Self {
        Self {
            bytes,
            media_type: format.media_type().to_string(),
            suggested_filename: format.suggested_filename(date),
        }
    }

    /// Artifact named after today's local date.
    pub fn dated_today(bytes: Vec<u8>, format: MediaFormat) -> Self {
        Self::new(bytes, format, chrono::Local::now().date_naive())
    }
}

/// Per-run inputs shared by both encoders besides the frames and settings.
#[derive(Clone, Debug)]
pub struct EncodeContext {
    /// Colour that alpha is flattened over (straight RGBA8).
    pub background_rgba: [u8; 4],
    /// Pacing wall-clock budget as a multiple of the nominal duration.
    pub video_budget_factor: f64,
    /// Time the sink gets to finalize once every frame was pushed.
    pub video_finalize_grace: Duration,
    /// Frames buffered between the pacing task and the encode task.
    pub pump_capacity: usize,
    pub cancel: CancellationToken,
}

impl Default for EncodeContext {
    fn default() -> Self {
        Self {
            background_rgba: [255, 255, 255, 255],
            video_budget_factor: video::DEFAULT_BUDGET_FACTOR,
            video_finalize_grace: video::DEFAULT_FINALIZE_GRACE,
            pump_capacity: video::DEFAULT_PUMP_CAPACITY,
            cancel: CancellationToken::new(),
        }
    }
}

/// Encode `frames` with the strategy selected by `settings`.
///
/// Video runs use the system ffmpeg through [`video::FfmpegHost`]. Callers wanting a shared
/// concurrency bound go through [`EncoderPool::encode`] instead.
pub async fn encode(
    frames: FrameBuffer,
    settings: &EncoderSettings,
    ctx: &EncodeContext,
    progress: &ProgressReporter,
) -> EncodeResult<EncodedArtifact> {
    encode_with_host(frames, settings, ctx, progress, Arc::new(video::FfmpegHost::new())).await
}

pub(crate) async fn encode_with_host(
    frames: FrameBuffer,
    settings: &EncoderSettings,
    ctx: &EncodeContext,
    progress: &ProgressReporter,
    host: Arc<dyn video::VideoHost>,
) -> EncodeResult<EncodedArtifact> {
    if ctx.cancel.is_cancelled() {
        return Err(EncodeError::Cancelled);
    }
    match settings {
        EncoderSettings::ImageSequence(s) => gif::encode_gif(frames, s, ctx, progress).await,
        EncoderSettings::Video(s) => {
            video::VideoEncoder::new(host)
                .encode(frames, s, ctx, progress)
                .await
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/settings.rs"]
mod tests;
