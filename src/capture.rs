//! Frame capture orchestration: drive an [`AnimationPlan`] against a [`RenderSurface`] and
//! collect the resulting [`FrameBuffer`].

use tokio_util::sync::CancellationToken;

use crate::{
    core::{AnimationPlan, FrameBuffer, RasterFrame},
    error::{CaptureError, CaptureResult},
    progress::ProgressReporter,
    surface::{RenderSurface, SurfaceLease},
};

/// Which capture failures end the run.
///
/// Later-frame failures are otherwise absorbed: the frame is skipped and recorded in the
/// [`CaptureSummary`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// A failure on plan frame 0 is fatal; later failures are skipped.
    #[default]
    FirstFrameFatal,
    /// Any failure is fatal.
    AnyFrameFatal,
    /// Every failure is skipped. A run that captures nothing still fails.
    SkipFailed,
}

impl FailurePolicy {
    fn is_fatal(self, frame_index: usize) -> bool {
        match self {
            Self::FirstFrameFatal => frame_index == 0,
            Self::AnyFrameFatal => true,
            Self::SkipFailed => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureOptions {
    pub target_width: u32,
    pub failure_policy: FailurePolicy,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            target_width: 480,
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// A frame that failed to capture and was left out of the buffer.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct SkippedFrame {
    pub frame_index: usize,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct CaptureSummary {
    pub planned: usize,
    pub captured: usize,
    pub skipped: Vec<SkippedFrame>,
}

/// Result of a successful capture run.
#[derive(Debug)]
pub struct CapturedFrames {
    pub buffer: FrameBuffer,
    pub summary: CaptureSummary,
}

/// State of one capture run. Dropping it discards the frames and restores the surface.
struct CaptureRun<'s, S: RenderSurface + ?Sized> {
    surface: SurfaceLease<'s, S>,
    policy: FailurePolicy,
    buffer: Option<FrameBuffer>,
    summary: CaptureSummary,
}

impl<'s, S: RenderSurface + ?Sized> CaptureRun<'s, S> {
    fn begin(surface: &'s mut S, planned: usize, policy: FailurePolicy) -> Self {
        Self {
            surface: SurfaceLease::acquire(surface),
            policy,
            buffer: None,
            summary: CaptureSummary {
                planned,
                ..CaptureSummary::default()
            },
        }
    }

    fn accept(&mut self, frame: RasterFrame) -> CaptureResult<()> {
        let index = frame.index;
        let Some(buffer) = self.buffer.as_mut() else {
            self.buffer = Some(FrameBuffer::first(frame));
            self.summary.captured += 1;
            return Ok(());
        };
        let (w, h) = (buffer.width(), buffer.height());
        match buffer.push(frame) {
            Ok(()) => {
                self.summary.captured += 1;
                Ok(())
            }
            Err(frame) => self.reject(
                index,
                anyhow::anyhow!(
                    "frame is {}x{}, run is {}x{}",
                    frame.width,
                    frame.height,
                    w,
                    h
                ),
            ),
        }
    }

    fn reject(&mut self, frame_index: usize, err: anyhow::Error) -> CaptureResult<()> {
        if self.policy.is_fatal(frame_index) {
            tracing::error!(frame_index, error = %err, "fatal capture failure");
            return Err(CaptureError::CaptureFailed {
                frame_index,
                source: err,
            });
        }
        tracing::warn!(frame_index, error = %err, "skipping frame that failed to capture");
        self.summary.skipped.push(SkippedFrame {
            frame_index,
            reason: format!("{err:#}"),
        });
        Ok(())
    }

    fn finish(self) -> CaptureResult<CapturedFrames> {
        let Self {
            surface,
            buffer,
            summary,
            ..
        } = self;
        drop(surface);

        match buffer {
            Some(buffer) => Ok(CapturedFrames { buffer, summary }),
            None => Err(CaptureError::CaptureFailed {
                frame_index: summary.skipped.last().map_or(0, |s| s.frame_index),
                source: anyhow::anyhow!(
                    "no frame captured out of {} planned",
                    summary.planned
                ),
            }),
        }
    }
}

/// Capture every frame of `plan` from `surface`.
///
/// Mutation and capture alternate strictly: the next mutation is applied only after the
/// previous capture resolved. Cancellation is checked once per frame. The surface is
/// restored exactly once before this returns, on every path.
#[tracing::instrument(skip_all, fields(frames = plan.len(), target_width = options.target_width))]
pub async fn capture<S: RenderSurface + ?Sized>(
    plan: &AnimationPlan,
    surface: &mut S,
    options: &CaptureOptions,
    cancel: &CancellationToken,
    progress: &ProgressReporter,
) -> CaptureResult<CapturedFrames> {
    let total = plan.len();
    let mut run = CaptureRun::begin(surface, total, options.failure_policy);
    progress.report(0.0, "Capturing frames");

    for (i, mutation) in plan.frames().iter().enumerate() {
        if cancel.is_cancelled() {
            tracing::info!(frame_index = i, "capture cancelled");
            return Err(CaptureError::Cancelled);
        }

        run.surface.apply_mutation(mutation);
        let captured = run
            .surface
            .capture_frame(options.target_width)
            .await
            .and_then(|img| RasterFrame::from_image(i, img));

        match captured {
            Ok(frame) => {
                tracing::debug!(frame_index = i, "captured frame");
                run.accept(frame)?;
            }
            Err(err) => run.reject(i, err)?,
        }

        progress.report(
            (i + 1) as f64 / total as f64,
            &format!("Captured frame {}/{}", i + 1, total),
        );
    }

    let out = run.finish()?;
    tracing::info!(
        captured = out.summary.captured,
        skipped = out.summary.skipped.len(),
        "capture finished"
    );
    Ok(out)
}

#[cfg(test)]
#[path = "../tests/unit/capture.rs"]
mod tests;
