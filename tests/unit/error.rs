use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        EncodeError::failed("x")
            .to_string()
            .contains("encoding failed:")
    );
    assert!(
        EncodeError::invalid("x")
            .to_string()
            .contains("invalid encoder input:")
    );
    assert!(
        ExportError::config("x")
            .to_string()
            .contains("configuration error:")
    );
}

#[test]
fn unsupported_format_names_codec_and_container() {
    let msg = EncodeError::unsupported("vp9", "mp4", "no such pairing").to_string();
    assert!(msg.contains("'vp9'"));
    assert!(msg.contains("'mp4'"));
    assert!(msg.contains("no such pairing"));
}

#[test]
fn capture_failed_reports_frame_index_and_source() {
    let err = CaptureError::CaptureFailed {
        frame_index: 0,
        source: anyhow::anyhow!("surface detached"),
    };
    let msg = err.to_string();
    assert!(msg.contains("frame 0"));
    assert!(msg.contains("surface detached"));
}

#[test]
fn cancellation_is_recognised_in_both_phases() {
    assert!(ExportError::from(CaptureError::Cancelled).is_cancelled());
    assert!(ExportError::from(EncodeError::Cancelled).is_cancelled());
    assert!(!ExportError::from(EncodeError::failed("boom")).is_cancelled());
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = ExportError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}
