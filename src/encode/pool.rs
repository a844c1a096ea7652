use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::{
    core::FrameBuffer,
    encode::{
        EncodeContext, EncodedArtifact, EncoderSettings, encode_with_host,
        video::{FfmpegHost, VideoHost},
    },
    error::{EncodeError, EncodeResult},
    progress::ProgressReporter,
};

/// Bounded set of encode slots shared by concurrent runs.
///
/// Slots are handed out first come, first served; a request that finds the pool saturated
/// waits in line instead of starting another encoder.
#[derive(Clone)]
pub struct EncoderPool {
    slots: Arc<Semaphore>,
    workers: usize,
    host: Arc<dyn VideoHost>,
}

impl std::fmt::Debug for EncoderPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncoderPool")
            .field("workers", &self.workers)
            .field("available", &self.available())
            .finish_non_exhaustive()
    }
}

impl EncoderPool {
    /// Pool of `workers` slots (at least one) whose video runs use the system ffmpeg.
    pub fn new(workers: usize) -> Self {
        Self::with_host(workers, Arc::new(FfmpegHost::new()))
    }

    pub fn with_host(workers: usize, host: Arc<dyn VideoHost>) -> Self {
        let workers = workers.max(1);
        Self {
            slots: Arc::new(Semaphore::new(workers)),
            workers,
            host,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Slots not currently held by a run.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Wait for a slot, then encode. Cancellation is honoured while queued.
    pub async fn encode(
        &self,
        frames: FrameBuffer,
        settings: &EncoderSettings,
        ctx: &EncodeContext,
        progress: &ProgressReporter,
    ) -> EncodeResult<EncodedArtifact> {
        if self.slots.available_permits() == 0 {
            tracing::debug!(workers = self.workers, "encoder pool saturated, queueing");
            progress.report(0.0, "Waiting for a free encoder");
        }
        let _slot = tokio::select! {
            slot = self.slots.acquire() => {
                slot.map_err(|_| EncodeError::failed("encoder pool is closed"))?
            }
            _ = ctx.cancel.cancelled() => return Err(EncodeError::Cancelled),
        };
        encode_with_host(frames, settings, ctx, progress, Arc::clone(&self.host)).await
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/pool.rs"]
mod tests;
