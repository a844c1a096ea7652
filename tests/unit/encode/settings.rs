use super::*;

#[test]
fn settings_json_is_tagged_by_kind() {
    let gif: EncoderSettings =
        serde_json::from_str(r#"{"kind":"image_sequence","quality":"high","looping":false}"#)
            .unwrap();
    assert_eq!(
        gif,
        EncoderSettings::ImageSequence(ImageSequenceSettings {
            quality: QualityTier::High,
            looping: false,
            ..ImageSequenceSettings::default()
        })
    );
    assert_eq!(gif.format(), MediaFormat::Gif);

    let video: EncoderSettings = serde_json::from_str(
        r#"{"kind":"video","resolution":"1080p","codec":"vp9","container":"webm"}"#,
    )
    .unwrap();
    let EncoderSettings::Video(v) = &video else {
        panic!("expected video settings");
    };
    assert_eq!(v.fps, 30);
    assert_eq!(v.resolution.dimensions(), (1920, 1080));
    assert_eq!(video.format(), MediaFormat::Webm);
}

#[test]
fn unknown_kind_is_rejected() {
    assert!(serde_json::from_str::<EncoderSettings>(r#"{"kind":"apng"}"#).is_err());
}

#[test]
fn tiers_scale_palette_and_parallelism() {
    let low = QualityTier::Low.profile();
    let high = QualityTier::High.profile();
    assert!(low.palette_size < QualityTier::Medium.profile().palette_size);
    assert_eq!(high.palette_size, 256);
    assert!(!low.dithering);
    assert!(low.workers > high.workers);
}

#[test]
fn resolution_dimensions_are_even() {
    for tier in [ResolutionTier::Sd480, ResolutionTier::Hd720, ResolutionTier::Hd1080] {
        let (w, h) = tier.dimensions();
        assert!(w % 2 == 0 && h % 2 == 0, "{tier:?}");
    }
}

#[test]
fn filenames_carry_the_date_and_extension() {
    let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
    let a = EncodedArtifact::new(vec![1], MediaFormat::Webm, date);
    assert_eq!(a.suggested_filename, "mockup-2024-03-09.webm");
    assert_eq!(a.media_type, "video/webm");
    assert_eq!(MediaFormat::Gif.suggested_filename(date), "mockup-2024-03-09.gif");
}

#[test]
fn nominal_duration_follows_fps() {
    let v = VideoSettings {
        fps: 20,
        ..VideoSettings::default()
    };
    assert_eq!(v.nominal_duration(40), Duration::from_secs(2));
}

#[tokio::test]
async fn cancelled_context_short_circuits_dispatch() {
    let frames = FrameBuffer::from_frames(vec![
        crate::core::RasterFrame::new(0, 1, 1, vec![0, 0, 0, 255]).unwrap(),
    ])
    .unwrap();
    let ctx = EncodeContext::default();
    ctx.cancel.cancel();
    let err = encode(
        frames,
        &EncoderSettings::default(),
        &ctx,
        &ProgressReporter::discard(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, EncodeError::Cancelled));
}
