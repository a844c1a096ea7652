use std::{fs::File, io::BufReader, path::Path, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::{
    capture::{CaptureOptions, FailurePolicy},
    encode::{
        EncodeContext,
        video::{DEFAULT_BUDGET_FACTOR, DEFAULT_FINALIZE_GRACE, DEFAULT_PUMP_CAPACITY},
    },
    error::{ExportError, ExportResult},
    estimate::DEFAULT_TARGET_WIDTH,
};

/// Widest frame a capture may request.
pub const MAX_TARGET_WIDTH: u32 = 4096;

/// Host-side settings of an export run. Every field has a default, so a partial (or empty)
/// JSON object is a valid config.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub frame_budget: u32,
    pub target_width: u32,
    pub failure_policy: FailurePolicy,
    /// Concurrent encodes allowed by the shared pool.
    pub encoder_workers: usize,
    /// Pacing budget as a multiple of the video's play time (floored at one second).
    pub video_budget_factor: f64,
    /// Time ffmpeg gets to flush the container after the last frame.
    pub video_finalize_grace_ms: u64,
    pub pump_capacity: usize,
    /// Straight RGBA8 colour that transparent pixels are flattened over.
    pub background_rgba: [u8; 4],
    pub logging: LoggingConfig,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            frame_budget: 60,
            target_width: DEFAULT_TARGET_WIDTH,
            failure_policy: FailurePolicy::default(),
            encoder_workers: 2,
            video_budget_factor: DEFAULT_BUDGET_FACTOR,
            video_finalize_grace_ms: DEFAULT_FINALIZE_GRACE.as_millis() as u64,
            pump_capacity: DEFAULT_PUMP_CAPACITY,
            background_rgba: [255, 255, 255, 255],
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl ExportConfig {
    pub fn from_json_str(s: &str) -> ExportResult<Self> {
        let cfg: Self = serde_json::from_str(s)
            .map_err(|e| ExportError::config(format!("parse config JSON: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> ExportResult<Self> {
        let f = File::open(path).map_err(|e| {
            ExportError::config(format!("open config '{}': {e}", path.display()))
        })?;
        let cfg: Self = serde_json::from_reader(BufReader::new(f)).map_err(|e| {
            ExportError::config(format!("parse config '{}': {e}", path.display()))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> ExportResult<()> {
        if self.frame_budget == 0 {
            return Err(ExportError::config("frame_budget must be > 0"));
        }
        if self.target_width == 0 || self.target_width > MAX_TARGET_WIDTH {
            return Err(ExportError::config(format!(
                "target_width must be in 1..={MAX_TARGET_WIDTH}"
            )));
        }
        if self.encoder_workers == 0 {
            return Err(ExportError::config("encoder_workers must be > 0"));
        }
        // Pacing alone takes the nominal duration, so anything below 1 can never succeed.
        if !self.video_budget_factor.is_finite() || self.video_budget_factor < 1.0 {
            return Err(ExportError::config(
                "video_budget_factor must be a finite number >= 1",
            ));
        }
        if self.video_finalize_grace_ms == 0 {
            return Err(ExportError::config("video_finalize_grace_ms must be > 0"));
        }
        if self.pump_capacity == 0 {
            return Err(ExportError::config("pump_capacity must be > 0"));
        }
        if self.logging.level.trim().is_empty() {
            return Err(ExportError::config("logging.level must be non-empty"));
        }
        Ok(())
    }

    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            target_width: self.target_width,
            failure_policy: self.failure_policy,
        }
    }

    pub fn encode_context(&self, cancel: CancellationToken) -> EncodeContext {
        EncodeContext {
            background_rgba: self.background_rgba,
            video_budget_factor: self.video_budget_factor,
            video_finalize_grace: Duration::from_millis(self.video_finalize_grace_ms),
            pump_capacity: self.pump_capacity,
            cancel,
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
