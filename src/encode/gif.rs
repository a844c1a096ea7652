use std::{borrow::Cow, sync::Mutex};

use color_quant::NeuQuant;
use image::{Rgba, RgbaImage, imageops::ColorMap};
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;

use crate::{
    core::FrameBuffer,
    encode::{
        EncodeContext, EncodedArtifact, ImageSequenceSettings, MIN_PROGRESS_UPDATES, MediaFormat,
        QualityProfile, pixels::opaque_pixels,
    },
    error::{EncodeError, EncodeResult},
    progress::{ProgressReporter, Ticker},
};

/// Share of the encode progress spent on palette building and quantization.
const QUANTIZE_SHARE: f64 = 0.8;

/// GIF delays are in hundredths of a second.
pub fn delay_centis(frame_delay_ms: u32) -> u16 {
    let cs = (u64::from(frame_delay_ms) + 5) / 10;
    cs.clamp(1, u64::from(u16::MAX / 2)) as u16
}

/// One frame reduced to its local colour table.
struct IndexedFrame {
    palette: Vec<u8>,
    indices: Vec<u8>,
}

struct NeuQuantMap(NeuQuant);

impl ColorMap for NeuQuantMap {
    type Color = Rgba<u8>;

    fn index_of(&self, color: &Rgba<u8>) -> usize {
        self.0.index_of(&color.0)
    }

    fn map_color(&self, color: &mut Rgba<u8>) {
        self.0.map_pixel(&mut color.0);
    }
}

/// Encode `frames` as an animated GIF89a.
///
/// Each frame gets its own colour table sized by the quality tier. Every frame is shown for
/// `frame_delay_ms`; the last one for twice that so the final state lingers.
#[tracing::instrument(skip_all, fields(frames = frames.len(), quality = ?settings.quality))]
pub async fn encode_gif(
    frames: FrameBuffer,
    settings: &ImageSequenceSettings,
    ctx: &EncodeContext,
    progress: &ProgressReporter,
) -> EncodeResult<EncodedArtifact> {
    let width = u16::try_from(frames.width())
        .map_err(|_| EncodeError::invalid(format!("gif width {} exceeds 65535", frames.width())))?;
    let height = u16::try_from(frames.height()).map_err(|_| {
        EncodeError::invalid(format!("gif height {} exceeds 65535", frames.height()))
    })?;

    let profile = settings.quality.profile();
    let job = GifJob {
        width,
        height,
        profile,
        dither: settings.dither && profile.dithering,
        looping: settings.looping,
        delay: delay_centis(settings.frame_delay_ms),
        background_rgba: ctx.background_rgba,
        cancel: ctx.cancel.clone(),
        progress: progress.clone(),
    };
    tracing::debug!(
        palette = profile.palette_size,
        dither = job.dither,
        workers = profile.workers,
        "encoding gif"
    );
    progress.report(0.0, "Encoding GIF");

    let bytes = tokio::task::spawn_blocking(move || job.run(frames))
        .await
        .map_err(|e| EncodeError::failed(format!("gif worker did not complete: {e}")))??;

    tracing::info!(bytes = bytes.len(), "gif encoded");
    progress.complete("GIF ready");
    Ok(EncodedArtifact::dated_today(bytes, MediaFormat::Gif))
}

struct GifJob {
    width: u16,
    height: u16,
    profile: QualityProfile,
    dither: bool,
    looping: bool,
    delay: u16,
    background_rgba: [u8; 4],
    cancel: CancellationToken,
    progress: ProgressReporter,
}

impl GifJob {
    fn run(self, frames: FrameBuffer) -> EncodeResult<Vec<u8>> {
        let indexed = self.quantize_all(&frames)?;
        drop(frames);
        self.write(&indexed)
    }

    fn quantize_all(&self, frames: &FrameBuffer) -> EncodeResult<Vec<IndexedFrame>> {
        let pool = build_thread_pool(self.profile.workers)?;
        let quantize = self.progress.scope(0.0, QUANTIZE_SHARE);
        let ticker = Mutex::new((0usize, Ticker::new(frames.len(), MIN_PROGRESS_UPDATES)));

        pool.install(|| {
            frames
                .frames()
                .par_iter()
                .map(|frame| {
                    if self.cancel.is_cancelled() {
                        return Err(EncodeError::Cancelled);
                    }
                    let rgba = opaque_pixels(frame, self.background_rgba)?;
                    let out = self.quantize(frame.width, frame.height, rgba)?;

                    let mut guard = ticker.lock().unwrap_or_else(|p| p.into_inner());
                    let (done, ticker) = &mut *guard;
                    *done += 1;
                    for f in ticker.advance(*done) {
                        quantize.report(f, "Building colour tables");
                    }
                    Ok(out)
                })
                .collect()
        })
    }

    fn quantize(&self, width: u32, height: u32, rgba: Vec<u8>) -> EncodeResult<IndexedFrame> {
        let nq = NeuQuant::new(self.profile.sample_factor, self.profile.palette_size, &rgba);
        let palette = nq.color_map_rgb();
        let map = NeuQuantMap(nq);

        let mut img = RgbaImage::from_raw(width, height, rgba)
            .ok_or_else(|| EncodeError::invalid("frame buffer shorter than its dimensions"))?;
        if self.dither {
            image::imageops::dither(&mut img, &map);
        }
        let indices = image::imageops::index_colors(&img, &map).into_raw();
        Ok(IndexedFrame { palette, indices })
    }

    fn write(&self, indexed: &[IndexedFrame]) -> EncodeResult<Vec<u8>> {
        let write = self.progress.scope(QUANTIZE_SHARE, 1.0);
        let mut ticker = Ticker::new(indexed.len(), MIN_PROGRESS_UPDATES);
        let mut out = Vec::new();
        {
            let mut encoder = gif::Encoder::new(&mut out, self.width, self.height, &[])
                .map_err(|e| EncodeError::failed(format!("failed to create gif encoder: {e}")))?;
            // Without the loop extension a GIF plays once; a loop count of 0 would mean forever.
            if self.looping {
                encoder
                    .set_repeat(gif::Repeat::Infinite)
                    .map_err(|e| EncodeError::failed(format!("failed to set gif loop: {e}")))?;
            }

            let last = indexed.len() - 1;
            for (i, f) in indexed.iter().enumerate() {
                if self.cancel.is_cancelled() {
                    return Err(EncodeError::Cancelled);
                }
                let delay = if i == last {
                    self.delay.saturating_mul(2)
                } else {
                    self.delay
                };
                let frame = gif::Frame {
                    width: self.width,
                    height: self.height,
                    delay,
                    dispose: gif::DisposalMethod::Keep,
                    palette: Some(f.palette.clone()),
                    buffer: Cow::Borrowed(f.indices.as_slice()),
                    ..gif::Frame::default()
                };
                encoder
                    .write_frame(&frame)
                    .map_err(|e| EncodeError::failed(format!("failed to write gif frame {i}: {e}")))?;
                for fraction in ticker.advance(i + 1) {
                    write.report(fraction, "Writing GIF frames");
                }
            }
            encoder
                .into_inner()
                .map_err(|e| EncodeError::failed(format!("failed to finish gif stream: {e}")))?;
        }
        Ok(out)
    }
}

fn build_thread_pool(threads: usize) -> EncodeResult<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(|i| format!("mockreel-gif-{i}"))
        .build()
        .map_err(|e| EncodeError::failed(format!("failed to build gif worker pool: {e}")))
}

#[cfg(test)]
#[path = "../../tests/unit/encode/gif.rs"]
mod tests;
