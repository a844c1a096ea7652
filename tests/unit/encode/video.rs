use super::*;
use crate::{
    core::RasterFrame,
    encode::{MediaFormat, ResolutionTier},
    progress::ProgressUpdate,
};
use std::sync::{
    Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

#[derive(Default)]
struct Record {
    probes: AtomicUsize,
    opened: Mutex<Option<SinkSpec>>,
    pushed: Mutex<Vec<usize>>,
    finished: AtomicBool,
    aborted: AtomicBool,
}

#[derive(Default)]
struct FakeHost {
    record: Arc<Record>,
    reject_probe: bool,
    fail_push_at: Option<usize>,
    cancel_on_push: Option<(usize, CancellationToken)>,
    push_delay: Duration,
    finish_delay: Duration,
}

struct FakeSink {
    record: Arc<Record>,
    fail_push_at: Option<usize>,
    cancel_on_push: Option<(usize, CancellationToken)>,
    push_delay: Duration,
    finish_delay: Duration,
}

#[async_trait::async_trait]
impl VideoHost for FakeHost {
    async fn probe(&self, codec: VideoCodec, container: VideoContainer) -> EncodeResult<()> {
        self.record.probes.fetch_add(1, Ordering::SeqCst);
        if self.reject_probe {
            return Err(EncodeError::unsupported(
                codec.as_str(),
                container.as_str(),
                "no encoder on this host",
            ));
        }
        Ok(())
    }

    async fn open(&self, spec: &SinkSpec) -> EncodeResult<Box<dyn VideoSink>> {
        *self.record.opened.lock().unwrap() = Some(*spec);
        Ok(Box::new(FakeSink {
            record: Arc::clone(&self.record),
            fail_push_at: self.fail_push_at,
            cancel_on_push: self.cancel_on_push.clone(),
            push_delay: self.push_delay,
            finish_delay: self.finish_delay,
        }))
    }
}

#[async_trait::async_trait]
impl VideoSink for FakeSink {
    async fn push_frame(&mut self, rgba: &[u8]) -> EncodeResult<()> {
        tokio::time::sleep(self.push_delay).await;
        let mut pushed = self.record.pushed.lock().unwrap();
        let i = pushed.len();
        if self.fail_push_at == Some(i) {
            return Err(EncodeError::failed("codec exploded"));
        }
        pushed.push(rgba.len());
        if let Some((at, token)) = &self.cancel_on_push
            && *at == i
        {
            token.cancel();
        }
        Ok(())
    }

    async fn finish(self: Box<Self>) -> EncodeResult<Vec<u8>> {
        tokio::time::sleep(self.finish_delay).await;
        self.record.finished.store(true, Ordering::SeqCst);
        Ok(b"fake-video".to_vec())
    }

    async fn abort(self: Box<Self>) {
        self.record.aborted.store(true, Ordering::SeqCst);
    }
}

fn frames(n: usize) -> FrameBuffer {
    let frames = (0..n)
        .map(|i| RasterFrame::new(i, 4, 6, vec![90; 4 * 6 * 4]).unwrap())
        .collect();
    FrameBuffer::from_frames(frames).unwrap()
}

fn sd(codec: VideoCodec, container: VideoContainer) -> VideoSettings {
    VideoSettings {
        fps: 30,
        resolution: ResolutionTier::Sd480,
        codec,
        container,
    }
}

#[test]
fn supported_matrix() {
    assert!(is_supported(VideoCodec::H264, VideoContainer::Mp4));
    assert!(is_supported(VideoCodec::Vp8, VideoContainer::Webm));
    assert!(is_supported(VideoCodec::Vp9, VideoContainer::Webm));
    assert!(!is_supported(VideoCodec::H264, VideoContainer::Webm));
    assert!(!is_supported(VideoCodec::Vp9, VideoContainer::Mp4));
}

#[test]
fn parses_ffmpeg_listings() {
    let encoders = "Encoders:\n V..... = Video\n ------\n V....D libx264              libx264 H.264 / AVC\n V....D libvpx-vp9           libvpx VP9\n A....D aac                  AAC\n";
    assert!(lists_encoder(encoders, "libx264"));
    assert!(lists_encoder(encoders, "libvpx-vp9"));
    assert!(!lists_encoder(encoders, "libvpx"));
    assert!(!lists_encoder(encoders, "aac"));

    let muxers = "File formats:\n D. = Demuxing supported\n .E = Muxing supported\n --\n  E mp4             MP4 (MPEG-4 Part 14)\n  E matroska,webm   Matroska\n  E gif             CompuServe GIF\n";
    assert!(lists_muxer(muxers, "mp4"));
    assert!(lists_muxer(muxers, "webm"));
    assert!(!lists_muxer(muxers, "ogg"));
}

#[tokio::test]
async fn pairing_outside_the_matrix_fails_before_touching_the_host() {
    let host = Arc::new(FakeHost::default());
    let record = Arc::clone(&host.record);
    let err = VideoEncoder::new(host)
        .encode(
            frames(2),
            &sd(VideoCodec::H264, VideoContainer::Webm),
            &EncodeContext::default(),
            &ProgressReporter::discard(),
        )
        .await
        .unwrap_err();

    match err {
        EncodeError::UnsupportedFormat {
            codec, container, ..
        } => {
            assert_eq!(codec, "h264");
            assert_eq!(container, "webm");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(record.probes.load(Ordering::SeqCst), 0);
    assert!(record.opened.lock().unwrap().is_none());
}

#[tokio::test]
async fn host_without_the_codec_yields_unsupported_and_no_bytes() {
    let host = Arc::new(FakeHost {
        reject_probe: true,
        ..FakeHost::default()
    });
    let record = Arc::clone(&host.record);
    let err = VideoEncoder::new(host)
        .encode(
            frames(2),
            &sd(VideoCodec::Vp9, VideoContainer::Webm),
            &EncodeContext::default(),
            &ProgressReporter::discard(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, EncodeError::UnsupportedFormat { .. }));
    assert_eq!(record.probes.load(Ordering::SeqCst), 1);
    assert!(record.opened.lock().unwrap().is_none());
    assert!(record.pushed.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn pumps_letterboxed_frames_and_reports_progress() {
    let host = Arc::new(FakeHost::default());
    let record = Arc::clone(&host.record);
    let (reporter, mut rx) = ProgressReporter::channel();
    let out = VideoEncoder::new(host)
        .encode(
            frames(3),
            &sd(VideoCodec::H264, VideoContainer::Mp4),
            &EncodeContext::default(),
            &reporter,
        )
        .await
        .unwrap();
    drop(reporter);

    assert_eq!(out.bytes, b"fake-video");
    assert_eq!(out.media_type, MediaFormat::Mp4.media_type());
    assert!(out.suggested_filename.ends_with(".mp4"));

    let spec = record.opened.lock().unwrap().unwrap();
    assert_eq!((spec.width, spec.height, spec.fps), (854, 480, 30));
    assert_eq!(*record.pushed.lock().unwrap(), vec![854 * 480 * 4; 3]);
    assert!(record.finished.load(Ordering::SeqCst));
    assert!(!record.aborted.load(Ordering::SeqCst));

    let mut pcts = Vec::new();
    while let Some(u) = rx.recv().await {
        if let ProgressUpdate::Progress(ev) = u {
            pcts.push(ev.percent);
        }
    }
    assert!(pcts.len() >= 10, "only {} updates", pcts.len());
    assert!(pcts.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(pcts.last().copied(), Some(100.0));
}

#[test]
fn pacing_budget_scales_with_play_time_above_a_floor() {
    assert_eq!(pacing_budget(1, 30, 1.5), MIN_PACING_BUDGET);
    assert_eq!(pacing_budget(60, 30, 1.5), Duration::from_secs(3));
    assert_eq!(pacing_budget(30, 30, 1e300), Duration::MAX);
}

#[tokio::test(start_paused = true)]
async fn single_frame_static_video_has_time_to_finalize() {
    let host = Arc::new(FakeHost {
        finish_delay: Duration::from_millis(100),
        ..FakeHost::default()
    });
    let record = Arc::clone(&host.record);
    let out = VideoEncoder::new(host)
        .encode(
            frames(1),
            &sd(VideoCodec::H264, VideoContainer::Mp4),
            &EncodeContext::default(),
            &ProgressReporter::discard(),
        )
        .await
        .unwrap();

    assert_eq!(out.bytes, b"fake-video");
    assert_eq!(record.pushed.lock().unwrap().len(), 1);
    assert!(record.finished.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn stalled_sink_exceeds_the_pacing_budget() {
    let host = Arc::new(FakeHost {
        push_delay: Duration::from_secs(5),
        ..FakeHost::default()
    });
    let record = Arc::clone(&host.record);
    let err = VideoEncoder::new(host)
        .encode(
            frames(3),
            &sd(VideoCodec::Vp8, VideoContainer::Webm),
            &EncodeContext::default(),
            &ProgressReporter::discard(),
        )
        .await
        .unwrap_err();

    match err {
        EncodeError::EncodingTimedOut { stage, budget, .. } => {
            assert_eq!(stage, VideoStage::Pacing);
            assert_eq!(budget, MIN_PACING_BUDGET);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(!record.finished.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn slow_finalize_exceeds_the_grace() {
    let host = Arc::new(FakeHost {
        finish_delay: Duration::from_secs(60),
        ..FakeHost::default()
    });
    let record = Arc::clone(&host.record);
    let ctx = EncodeContext {
        video_finalize_grace: Duration::from_secs(2),
        ..EncodeContext::default()
    };
    let err = VideoEncoder::new(host)
        .encode(
            frames(3),
            &sd(VideoCodec::Vp8, VideoContainer::Webm),
            &ctx,
            &ProgressReporter::discard(),
        )
        .await
        .unwrap_err();

    match err {
        EncodeError::EncodingTimedOut { stage, budget, .. } => {
            assert_eq!(stage, VideoStage::Finalizing);
            assert_eq!(budget, Duration::from_secs(2));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(record.pushed.lock().unwrap().len(), 3);
    assert!(!record.finished.load(Ordering::SeqCst));
}

#[tokio::test]
async fn frame_rate_outside_the_accepted_range_is_invalid_input() {
    for fps in [0, 241, u32::MAX] {
        let host = Arc::new(FakeHost::default());
        let record = Arc::clone(&host.record);
        let settings = VideoSettings {
            fps,
            ..sd(VideoCodec::H264, VideoContainer::Mp4)
        };
        let err = VideoEncoder::new(host)
            .encode(
                frames(2),
                &settings,
                &EncodeContext::default(),
                &ProgressReporter::discard(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, EncodeError::InvalidInput(_)), "fps {fps}: {err:?}");
        assert_eq!(record.probes.load(Ordering::SeqCst), 0);
    }
}

#[tokio::test(start_paused = true)]
async fn sink_failure_aborts_and_surfaces_encoding_failed() {
    let host = Arc::new(FakeHost {
        fail_push_at: Some(1),
        ..FakeHost::default()
    });
    let record = Arc::clone(&host.record);
    let err = VideoEncoder::new(host)
        .encode(
            frames(4),
            &sd(VideoCodec::H264, VideoContainer::Mp4),
            &EncodeContext::default(),
            &ProgressReporter::discard(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, EncodeError::EncodingFailed(ref m) if m.contains("exploded")));
    assert!(record.aborted.load(Ordering::SeqCst));
    assert!(!record.finished.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_the_pacer_and_aborts_the_sink() {
    let ctx = EncodeContext {
        video_budget_factor: 100.0,
        ..EncodeContext::default()
    };
    let host = Arc::new(FakeHost {
        cancel_on_push: Some((0, ctx.cancel.clone())),
        ..FakeHost::default()
    });
    let record = Arc::clone(&host.record);
    let err = VideoEncoder::new(host)
        .encode(
            frames(5),
            &sd(VideoCodec::H264, VideoContainer::Mp4),
            &ctx,
            &ProgressReporter::discard(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, EncodeError::Cancelled));
    assert!(record.aborted.load(Ordering::SeqCst));
    assert!(!record.finished.load(Ordering::SeqCst));
    assert!(record.pushed.lock().unwrap().len() < 5);
}
