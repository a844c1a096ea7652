use std::{path::PathBuf, process::Stdio, sync::Arc, time::Duration};

use rayon::prelude::*;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    process::{Child, ChildStdin, Command},
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    core::FrameBuffer,
    encode::{
        EncodeContext, EncodedArtifact, MIN_PROGRESS_UPDATES, VideoCodec, VideoContainer,
        VideoSettings, pixels::letterbox,
    },
    error::{EncodeError, EncodeResult, VideoStage},
    progress::{ProgressReporter, Ticker},
};

/// Pacing budget as a multiple of the nominal duration.
pub const DEFAULT_BUDGET_FACTOR: f64 = 1.5;
/// Frames buffered between the pacing task and the encode task.
pub const DEFAULT_PUMP_CAPACITY: usize = 4;
/// Time a sink gets to flush its container after the last frame.
pub const DEFAULT_FINALIZE_GRACE: Duration = Duration::from_secs(10);
/// Shortest pacing budget, so one-frame runs still cover encoder start-up.
pub const MIN_PACING_BUDGET: Duration = Duration::from_secs(1);
/// Accepted frame rates.
pub const FPS_RANGE: std::ops::RangeInclusive<u32> = 1..=240;

const PREPARE_SHARE: f64 = 0.1;
const PUMP_SHARE: f64 = 0.95;

/// Wall-clock limit for pacing `frames` frames at `fps`: `factor` times their play time, but
/// never less than [`MIN_PACING_BUDGET`].
pub fn pacing_budget(frames: usize, fps: u32, factor: f64) -> Duration {
    let nominal = frames as f64 / f64::from(fps.max(1));
    Duration::try_from_secs_f64(nominal * factor)
        .unwrap_or(Duration::MAX)
        .max(MIN_PACING_BUDGET)
}

/// Codec/container pairings this encoder will attempt at all.
pub fn is_supported(codec: VideoCodec, container: VideoContainer) -> bool {
    matches!(
        (codec, container),
        (VideoCodec::H264, VideoContainer::Mp4)
            | (VideoCodec::Vp8 | VideoCodec::Vp9, VideoContainer::Webm)
    )
}

/// ffmpeg encoder implementing `codec`.
pub fn ffmpeg_encoder(codec: VideoCodec) -> &'static str {
    match codec {
        VideoCodec::H264 => "libx264",
        VideoCodec::Vp8 => "libvpx",
        VideoCodec::Vp9 => "libvpx-vp9",
    }
}

/// What a sink is opened for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SinkSpec {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: VideoCodec,
    pub container: VideoContainer,
}

/// Host capability behind the video encoder: a codec check plus a way to open sinks.
#[async_trait::async_trait]
pub trait VideoHost: Send + Sync {
    /// `Ok` when the host can encode `codec` into `container`, otherwise
    /// [`EncodeError::UnsupportedFormat`].
    async fn probe(&self, codec: VideoCodec, container: VideoContainer) -> EncodeResult<()>;

    async fn open(&self, spec: &SinkSpec) -> EncodeResult<Box<dyn VideoSink>>;
}

/// Consumes opaque RGBA8 frames of the size it was opened with.
#[async_trait::async_trait]
pub trait VideoSink: Send {
    async fn push_frame(&mut self, rgba: &[u8]) -> EncodeResult<()>;

    /// Flush and return the encoded container bytes.
    async fn finish(self: Box<Self>) -> EncodeResult<Vec<u8>>;

    /// Stop encoding and discard any output.
    async fn abort(self: Box<Self>);
}

/// Video encoder feeding frames through a real-time pacing pump.
pub struct VideoEncoder {
    host: Arc<dyn VideoHost>,
}

impl VideoEncoder {
    pub fn new(host: Arc<dyn VideoHost>) -> Self {
        Self { host }
    }

    /// Encode `frames` at `settings.fps`, letterboxed to the resolution tier.
    ///
    /// Pacing fails with [`EncodeError::EncodingTimedOut`] once it exceeds
    /// [`pacing_budget`], measured from the moment the sink is open. Finalizing gets
    /// `ctx.video_finalize_grace` on top.
    #[tracing::instrument(
        skip_all,
        fields(
            frames = frames.len(),
            codec = settings.codec.as_str(),
            container = settings.container.as_str(),
            fps = settings.fps
        )
    )]
    pub async fn encode(
        &self,
        frames: FrameBuffer,
        settings: &VideoSettings,
        ctx: &EncodeContext,
        progress: &ProgressReporter,
    ) -> EncodeResult<EncodedArtifact> {
        let (codec, container) = (settings.codec, settings.container);
        if !is_supported(codec, container) {
            return Err(EncodeError::unsupported(
                codec.as_str(),
                container.as_str(),
                "codec cannot be stored in this container",
            ));
        }
        if !FPS_RANGE.contains(&settings.fps) {
            return Err(EncodeError::invalid(format!(
                "fps {} outside {}..={}",
                settings.fps,
                FPS_RANGE.start(),
                FPS_RANGE.end()
            )));
        }
        if !(ctx.video_budget_factor.is_finite() && ctx.video_budget_factor > 0.0) {
            return Err(EncodeError::invalid("video budget factor must be positive"));
        }
        if ctx.video_finalize_grace.is_zero() {
            return Err(EncodeError::invalid("video finalize grace must be non-zero"));
        }

        self.host.probe(codec, container).await?;
        progress.report(0.0, "Preparing video frames");

        let (width, height) = settings.resolution.dimensions();
        let bg = ctx.background_rgba;
        let count = frames.len();
        let prepared = tokio::task::spawn_blocking(move || {
            frames
                .frames()
                .par_iter()
                .map(|f| letterbox(f, width, height, bg))
                .collect::<EncodeResult<Vec<_>>>()
        })
        .await
        .map_err(|e| EncodeError::failed(format!("frame preparation did not complete: {e}")))??;
        progress.scope(0.0, PREPARE_SHARE).complete("Frames prepared");

        let spec = SinkSpec {
            width,
            height,
            fps: settings.fps,
            codec,
            container,
        };
        let sink = self.host.open(&spec).await?;

        let budget = pacing_budget(count, settings.fps, ctx.video_budget_factor);
        let started = Instant::now();
        tracing::info!(?budget, width, height, "video pump started");

        let pump = Pump {
            interval: Duration::from_secs_f64(1.0 / f64::from(settings.fps)),
            capacity: ctx.pump_capacity.max(1),
            cancel: ctx.cancel.clone(),
            progress: progress.scope(PREPARE_SHARE, PUMP_SHARE),
        };
        let sink = match tokio::time::timeout(budget, pump.run(sink, prepared)).await {
            Ok(res) => res?,
            Err(_) => return Err(timed_out(VideoStage::Pacing, budget, started)),
        };

        progress
            .scope(PREPARE_SHARE, PUMP_SHARE)
            .complete("Finalizing video");
        let grace = ctx.video_finalize_grace;
        let finalizing = Instant::now();
        let bytes = match tokio::time::timeout(grace, sink.finish()).await {
            Ok(res) => res?,
            Err(_) => return Err(timed_out(VideoStage::Finalizing, grace, finalizing)),
        };

        tracing::info!(bytes = bytes.len(), elapsed = ?started.elapsed(), "video encoded");
        progress.complete("Video ready");
        Ok(EncodedArtifact::dated_today(bytes, container.format()))
    }
}

fn timed_out(stage: VideoStage, budget: Duration, started: Instant) -> EncodeError {
    let elapsed = started.elapsed();
    tracing::warn!(%stage, ?budget, ?elapsed, "video encode exceeded its budget");
    EncodeError::EncodingTimedOut {
        stage,
        budget,
        elapsed,
    }
}

struct Pump {
    interval: Duration,
    capacity: usize,
    cancel: CancellationToken,
    progress: ProgressReporter,
}

impl Pump {
    /// The pacer releases one frame per tick into a bounded channel; the encoder drains it
    /// into the sink. An early stop on either side aborts the sink. Hands the sink back once
    /// every frame was pushed.
    async fn run(
        self,
        sink: Box<dyn VideoSink>,
        frames: Vec<Vec<u8>>,
    ) -> EncodeResult<Box<dyn VideoSink>> {
        let total = frames.len();
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(self.capacity);

        let cancel = self.cancel.clone();
        let interval = self.interval;
        let pacer = async move {
            let mut ticks = tokio::time::interval(interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            for frame in frames {
                ticks.tick().await;
                if cancel.is_cancelled() {
                    return Err(EncodeError::Cancelled);
                }
                if tx.send(frame).await.is_err() {
                    // The encoder stopped; its error is the one reported.
                    break;
                }
            }
            Ok(())
        };

        let progress = self.progress;
        let encoder = async move {
            let mut sink = sink;
            let mut ticker = Ticker::new(total, MIN_PROGRESS_UPDATES);
            let mut pushed = 0usize;
            while let Some(frame) = rx.recv().await {
                if let Err(e) = sink.push_frame(&frame).await {
                    tracing::error!(frame_index = pushed, error = %e, "sink rejected frame");
                    sink.abort().await;
                    return Err(e);
                }
                pushed += 1;
                for f in ticker.advance(pushed) {
                    progress.report(f, &format!("Encoded frame {pushed}/{total}"));
                }
            }
            if pushed < total {
                sink.abort().await;
                return Err(EncodeError::Cancelled);
            }
            Ok(sink)
        };

        let (paced, encoded) = tokio::join!(pacer, encoder);
        paced?;
        encoded
    }
}

/// [`VideoHost`] backed by the system `ffmpeg`.
#[derive(Clone, Debug)]
pub struct FfmpegHost {
    program: PathBuf,
}

impl Default for FfmpegHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegHost {
    /// Uses `ffmpeg` from `PATH`.
    pub fn new() -> Self {
        Self::with_program("ffmpeg")
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn query(&self, flag: &str) -> Result<String, String> {
        let out = Command::new(&self.program)
            .args(["-hide_banner", flag])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| format!("failed to run {}: {e}", self.program.display()))?;
        if !out.status.success() {
            return Err(format!(
                "{} {flag} exited with {}",
                self.program.display(),
                out.status
            ));
        }
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }
}

#[async_trait::async_trait]
impl VideoHost for FfmpegHost {
    async fn probe(&self, codec: VideoCodec, container: VideoContainer) -> EncodeResult<()> {
        let unsupported = |reason: String| {
            tracing::warn!(
                codec = codec.as_str(),
                container = container.as_str(),
                %reason,
                "video format unavailable"
            );
            EncodeError::unsupported(codec.as_str(), container.as_str(), reason)
        };

        let encoder = ffmpeg_encoder(codec);
        let encoders = self.query("-encoders").await.map_err(unsupported)?;
        if !lists_encoder(&encoders, encoder) {
            return Err(unsupported(format!("ffmpeg has no '{encoder}' encoder")));
        }
        let muxers = self.query("-muxers").await.map_err(unsupported)?;
        if !lists_muxer(&muxers, container.as_str()) {
            return Err(unsupported(format!(
                "ffmpeg has no '{}' muxer",
                container.as_str()
            )));
        }
        Ok(())
    }

    async fn open(&self, spec: &SinkSpec) -> EncodeResult<Box<dyn VideoSink>> {
        if !spec.width.is_multiple_of(2) || !spec.height.is_multiple_of(2) {
            return Err(EncodeError::invalid(
                "video width/height must be even (required for yuv420p output)",
            ));
        }
        let dir = tempfile::tempdir()
            .map_err(|e| EncodeError::failed(format!("failed to create scratch dir: {e}")))?;
        let out_path = dir.path().join(format!("out.{}", spec.container.as_str()));

        let size = format!("{}x{}", spec.width, spec.height);
        let rate = spec.fps.to_string();
        let mut cmd = Command::new(&self.program);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd.args([
            "-hide_banner",
            "-loglevel",
            "error",
            "-y",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            size.as_str(),
            "-r",
            rate.as_str(),
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            ffmpeg_encoder(spec.codec),
            "-pix_fmt",
            "yuv420p",
        ]);
        cmd.args(codec_args(spec.codec));
        cmd.args(["-f", spec.container.as_str()]).arg(&out_path);
        tracing::debug!(?out_path, "spawning ffmpeg");

        let mut child = cmd
            .spawn()
            .map_err(|e| EncodeError::failed(format!("failed to spawn ffmpeg: {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EncodeError::failed("failed to open ffmpeg stdin"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| EncodeError::failed("failed to open ffmpeg stderr"))?;
        // Drain stderr so ffmpeg never blocks on a full pipe.
        let stderr_drain = tokio::spawn(async move {
            let mut buf = String::new();
            match stderr.read_to_string(&mut buf).await {
                Ok(_) => buf,
                Err(e) => format!("<failed to read ffmpeg stderr: {e}>"),
            }
        });

        Ok(Box::new(FfmpegSink {
            frame_len: spec.width as usize * spec.height as usize * 4,
            child,
            stdin: Some(stdin),
            stderr_drain,
            out_path,
            _dir: dir,
        }))
    }
}

fn codec_args(codec: VideoCodec) -> &'static [&'static str] {
    match codec {
        VideoCodec::H264 => &["-preset", "veryfast", "-movflags", "+faststart"],
        VideoCodec::Vp8 => &["-deadline", "realtime", "-cpu-used", "8", "-b:v", "2M"],
        VideoCodec::Vp9 => &[
            "-deadline", "realtime", "-cpu-used", "8", "-row-mt", "1", "-crf", "32", "-b:v", "0",
        ],
    }
}

/// Whether `ffmpeg -encoders` output lists `name`.
pub fn lists_encoder(output: &str, name: &str) -> bool {
    output.lines().any(|line| {
        let mut cols = line.split_whitespace();
        matches!(
            (cols.next(), cols.next()),
            (Some(flags), Some(n)) if flags.len() == 6 && flags.starts_with('V') && n == name
        )
    })
}

/// Whether `ffmpeg -muxers` output lists a muxer called `name`.
pub fn lists_muxer(output: &str, name: &str) -> bool {
    output.lines().any(|line| {
        let mut cols = line.split_whitespace();
        matches!(
            (cols.next(), cols.next()),
            (Some(flags), Some(names))
                if flags.contains('E') && flags.len() <= 3 && names.split(',').any(|n| n == name)
        )
    })
}

/// A running ffmpeg process writing into a scratch directory owned by the sink.
struct FfmpegSink {
    frame_len: usize,
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_drain: JoinHandle<String>,
    out_path: PathBuf,
    _dir: tempfile::TempDir,
}

#[async_trait::async_trait]
impl VideoSink for FfmpegSink {
    async fn push_frame(&mut self, rgba: &[u8]) -> EncodeResult<()> {
        if rgba.len() != self.frame_len {
            return Err(EncodeError::invalid(format!(
                "frame is {} bytes, sink expects {}",
                rgba.len(),
                self.frame_len
            )));
        }
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(EncodeError::failed("ffmpeg sink is already finalized"));
        };
        stdin
            .write_all(rgba)
            .await
            .map_err(|e| EncodeError::failed(format!("failed to write frame to ffmpeg: {e}")))
    }

    async fn finish(mut self: Box<Self>) -> EncodeResult<Vec<u8>> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin
                .shutdown()
                .await
                .map_err(|e| EncodeError::failed(format!("failed to close ffmpeg stdin: {e}")))?;
        }
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| EncodeError::failed(format!("failed to wait for ffmpeg: {e}")))?;
        let stderr = (&mut self.stderr_drain).await.unwrap_or_default();
        if !status.success() {
            return Err(EncodeError::failed(format!(
                "ffmpeg exited with status {status}: {}",
                stderr.trim()
            )));
        }

        let bytes = tokio::fs::read(&self.out_path)
            .await
            .map_err(|e| EncodeError::failed(format!("failed to read ffmpeg output: {e}")))?;
        if bytes.is_empty() {
            return Err(EncodeError::failed("ffmpeg produced an empty file"));
        }
        Ok(bytes)
    }

    async fn abort(mut self: Box<Self>) {
        drop(self.stdin.take());
        if let Err(e) = self.child.start_kill() {
            tracing::debug!(error = %e, "ffmpeg already exited");
        }
        let _ = self.child.wait().await;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/video.rs"]
mod tests;
