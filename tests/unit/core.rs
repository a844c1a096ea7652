use super::*;

fn solid(index: usize, w: u32, h: u32) -> RasterFrame {
    RasterFrame::new(index, w, h, vec![255; (w * h * 4) as usize]).unwrap()
}

#[test]
fn raster_frame_rejects_wrong_data_len() {
    assert!(RasterFrame::new(0, 2, 2, vec![0; 15]).is_err());
    assert!(RasterFrame::new(0, 0, 2, vec![]).is_err());
}

#[test]
fn frame_buffer_rejects_empty_and_mixed_sizes() {
    assert!(FrameBuffer::from_frames(vec![]).is_err());
    let mixed = vec![solid(0, 4, 4), solid(1, 4, 2)];
    assert!(FrameBuffer::from_frames(mixed).is_err());

    let ok = FrameBuffer::from_frames(vec![solid(0, 4, 4), solid(1, 4, 4)]).unwrap();
    assert_eq!(ok.len(), 2);
    assert_eq!((ok.width(), ok.height()), (4, 4));
}

#[test]
fn push_hands_back_mismatched_frames() {
    let mut buf = FrameBuffer::first(solid(0, 4, 4));
    let rejected = buf.push(solid(1, 8, 4)).unwrap_err();
    assert_eq!(rejected.index, 1);
    assert!(buf.push(solid(2, 4, 4)).is_ok());
    assert_eq!(buf.len(), 2);
}

#[test]
fn prefix_mutation_shows_leading_units() {
    let m = FrameMutation::prefix(4, 2);
    assert!(m.is_visible(0));
    assert!(m.is_visible(1));
    assert!(!m.is_visible(2));
    assert_eq!(m.visible_count(), 2);
    assert!(!m.is_visible(10));
}

#[test]
fn empty_plan_is_rejected() {
    assert!(AnimationPlan::new(AnimationStyle::Reveal, vec![]).is_none());
}

#[test]
fn scroll_offset_resolves_to_pixels() {
    assert_eq!(ScrollOffset::TOP.to_pixels(300), 0);
    assert_eq!(ScrollOffset::BOTTOM.to_pixels(300), 300);
    assert_eq!(ScrollOffset(0.5).to_pixels(300), 150);
    assert_eq!(ScrollOffset(3.0).to_pixels(300), 300);
}

#[test]
fn style_serializes_lowercase() {
    let s = serde_json::to_string(&AnimationStyle::Typing).unwrap();
    assert_eq!(s, "\"typing\"");
    let back: AnimationStyle = serde_json::from_str("\"scroll\"").unwrap();
    assert_eq!(back, AnimationStyle::Scroll);
}
