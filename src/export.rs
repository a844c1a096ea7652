//! One call from content units to an encoded artifact.

use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::{
    capture::{CaptureSummary, capture},
    config::ExportConfig,
    core::{AnimationStyle, ContentUnit},
    encode::{EncodedArtifact, EncoderPool, EncoderSettings},
    error::ExportResult,
    progress::ProgressReporter,
    sequence::plan,
    surface::RenderSurface,
};

/// Share of the run's progress given to capture; encode gets the rest.
const CAPTURE_SHARE: f64 = 0.5;

#[derive(Debug)]
pub struct ExportReport {
    pub artifact: EncodedArtifact,
    pub summary: CaptureSummary,
}

/// Runs exports with one configuration and a shared [`EncoderPool`].
///
/// Clones share the pool, so exports against different surfaces can run concurrently while
/// encodes queue for free slots.
#[derive(Clone, Debug)]
pub struct Exporter {
    config: ExportConfig,
    pool: EncoderPool,
}

impl Exporter {
    pub fn new(config: ExportConfig) -> ExportResult<Self> {
        let pool = EncoderPool::new(config.encoder_workers);
        Self::with_pool(config, pool)
    }

    pub fn with_pool(config: ExportConfig, pool: EncoderPool) -> ExportResult<Self> {
        config.validate()?;
        Ok(Self { config, pool })
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn pool(&self) -> &EncoderPool {
        &self.pool
    }

    /// Plan, capture and encode. Progress runs 0..50 for capture and 50..100 for encode and
    /// reaches 100 only on success; any failure is reported to the sink before returning.
    #[tracing::instrument(
        skip_all,
        fields(units = units.len(), style = style.as_str(), format = ?settings.format())
    )]
    pub async fn export<S: RenderSurface + ?Sized>(
        &self,
        units: &[ContentUnit],
        style: AnimationStyle,
        surface: &mut S,
        settings: &EncoderSettings,
        cancel: &CancellationToken,
        progress: &ProgressReporter,
    ) -> ExportResult<ExportReport> {
        let started = Instant::now();
        let result = self
            .run(units, style, surface, settings, cancel, progress)
            .await;
        match &result {
            Ok(report) => tracing::info!(
                bytes = report.artifact.bytes.len(),
                skipped = report.summary.skipped.len(),
                elapsed = ?started.elapsed(),
                "export finished"
            ),
            Err(e) if e.is_cancelled() => {
                tracing::info!("export cancelled");
                progress.fail("Export cancelled");
            }
            Err(e) => {
                tracing::error!(error = %e, "export failed");
                progress.fail(&e.to_string());
            }
        }
        result
    }

    async fn run<S: RenderSurface + ?Sized>(
        &self,
        units: &[ContentUnit],
        style: AnimationStyle,
        surface: &mut S,
        settings: &EncoderSettings,
        cancel: &CancellationToken,
        progress: &ProgressReporter,
    ) -> ExportResult<ExportReport> {
        let plan = plan(style, units, self.config.frame_budget);
        tracing::info!(frames = plan.len(), "export started");

        let captured = capture(
            &plan,
            surface,
            &self.config.capture_options(),
            cancel,
            &progress.scope(0.0, CAPTURE_SHARE),
        )
        .await?;

        let ctx = self.config.encode_context(cancel.clone());
        let artifact = self
            .pool
            .encode(
                captured.buffer,
                settings,
                &ctx,
                &progress.scope(CAPTURE_SHARE, 1.0),
            )
            .await?;

        Ok(ExportReport {
            artifact,
            summary: captured.summary,
        })
    }
}

/// Export with a one-off pool sized by `config`.
pub async fn export<S: RenderSurface + ?Sized>(
    units: &[ContentUnit],
    style: AnimationStyle,
    surface: &mut S,
    settings: &EncoderSettings,
    config: &ExportConfig,
    cancel: &CancellationToken,
    progress: &ProgressReporter,
) -> ExportResult<ExportReport> {
    Exporter::new(config.clone())?
        .export(units, style, surface, settings, cancel, progress)
        .await
}
