#![forbid(unsafe_code)]

pub mod capture;
pub mod config;
pub mod core;
pub mod encode;
pub mod error;
pub mod estimate;
pub mod export;
pub mod progress;
pub mod sequence;
pub mod surface;

pub use capture::{CaptureOptions, CaptureSummary, CapturedFrames, FailurePolicy, SkippedFrame, capture};
pub use config::{ExportConfig, LoggingConfig};
pub use core::{
    AnimationPlan, AnimationStyle, ContentUnit, FrameBuffer, FrameMutation, RasterFrame,
    ScrollOffset, UnitId, Visibility,
};
pub use encode::{
    EncodeContext, EncodedArtifact, EncoderPool, EncoderSettings, ImageSequenceSettings,
    MediaFormat, QualityTier, ResolutionTier, VideoCodec, VideoContainer, VideoSettings, encode,
};
pub use error::{
    CaptureError, CaptureResult, EncodeError, EncodeResult, ExportError, ExportResult,
    VideoStage,
};
pub use estimate::{CostTable, SizeEstimator, estimate};
pub use export::{ExportReport, Exporter, export};
pub use progress::{ProgressEvent, ProgressReporter, ProgressSink, ProgressUpdate};
pub use sequence::{plan, scroll_ease};
pub use surface::{RenderSurface, SurfaceLease, SyntheticChat};
pub use tokio_util::sync::CancellationToken;
