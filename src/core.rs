use std::fmt;

use crate::error::{EncodeError, EncodeResult};

/// Stable identifier of a [`ContentUnit`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct UnitId(pub String);

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One independently revealable piece of content (typically one chat message).
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ContentUnit {
    pub id: UnitId,
    /// Position of the unit on the surface, 0-based.
    pub ordinal: usize,
    pub text: String,
}

impl ContentUnit {
    pub fn new(id: impl Into<String>, ordinal: usize, text: impl Into<String>) -> Self {
        Self {
            id: UnitId(id.into()),
            ordinal,
            text: text.into(),
        }
    }

    /// Length of the text in characters (not bytes).
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimationStyle {
    /// A single still frame of the complete surface.
    #[default]
    None,
    Reveal,
    Typing,
    Scroll,
}

impl AnimationStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Reveal => "reveal",
            Self::Typing => "typing",
            Self::Scroll => "scroll",
        }
    }
}

/// Per-unit visibility requested by a [`FrameMutation`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum Visibility {
    Hidden,
    /// First `chars` characters shown; `cursor` draws the typing marker after them.
    Partial { chars: usize, cursor: bool },
    Full,
}

impl Visibility {
    pub fn is_visible(self) -> bool {
        !matches!(self, Self::Hidden)
    }
}

/// Scroll position as a fraction of the surface's maximum scroll offset.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, serde::Serialize, serde::Deserialize)]
pub struct ScrollOffset(pub f64);

impl ScrollOffset {
    pub const TOP: Self = Self(0.0);
    pub const BOTTOM: Self = Self(1.0);

    /// Resolve to pixels given the surface's maximum offset.
    pub fn to_pixels(self, max_offset_px: u32) -> u32 {
        (self.0.clamp(0.0, 1.0) * f64::from(max_offset_px)).round() as u32
    }
}

/// Complete surface state to apply before the next capture.
///
/// Mutations are absolute, not deltas: applying one never depends on which
/// mutation was applied before it.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FrameMutation {
    /// One entry per content unit, in unit order.
    pub visibility: Vec<Visibility>,
    pub scroll: ScrollOffset,
}

impl FrameMutation {
    pub fn all(units: usize, visibility: Visibility) -> Self {
        Self {
            visibility: vec![visibility; units],
            scroll: ScrollOffset::TOP,
        }
    }

    /// Units `0..visible` fully shown, the rest hidden.
    pub fn prefix(units: usize, visible: usize) -> Self {
        let visibility = (0..units)
            .map(|i| {
                if i < visible {
                    Visibility::Full
                } else {
                    Visibility::Hidden
                }
            })
            .collect();
        Self {
            visibility,
            scroll: ScrollOffset::TOP,
        }
    }

    pub fn with_scroll(mut self, scroll: ScrollOffset) -> Self {
        self.scroll = scroll;
        self
    }

    pub fn visible_count(&self) -> usize {
        self.visibility.iter().filter(|v| v.is_visible()).count()
    }

    pub fn is_visible(&self, unit: usize) -> bool {
        self.visibility.get(unit).is_some_and(|v| v.is_visible())
    }
}

/// Ordered, non-empty list of per-frame mutations.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct AnimationPlan {
    style: AnimationStyle,
    frames: Vec<FrameMutation>,
}

impl AnimationPlan {
    /// Returns `None` for an empty frame list; a plan always has at least one frame.
    pub fn new(style: AnimationStyle, frames: Vec<FrameMutation>) -> Option<Self> {
        if frames.is_empty() {
            return None;
        }
        Some(Self { style, frames })
    }

    /// One frame with all `units` fully visible.
    pub fn still(style: AnimationStyle, units: usize) -> Self {
        Self {
            style,
            frames: vec![FrameMutation::all(units, Visibility::Full)],
        }
    }

    pub fn style(&self) -> AnimationStyle {
        self.style
    }

    pub fn frames(&self) -> &[FrameMutation] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always `false`; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn last(&self) -> &FrameMutation {
        // Non-empty by construction.
        &self.frames[self.frames.len() - 1]
    }
}

/// Straight-alpha RGBA8 bitmap of one captured frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RasterFrame {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RasterFrame {
    pub fn new(index: usize, width: u32, height: u32, data: Vec<u8>) -> anyhow::Result<Self> {
        anyhow::ensure!(width > 0 && height > 0, "frame dimensions must be non-zero");
        let expected = width as usize * height as usize * 4;
        anyhow::ensure!(
            data.len() == expected,
            "frame data is {} bytes, expected {} for {}x{} rgba8",
            data.len(),
            expected,
            width,
            height
        );
        Ok(Self {
            index,
            width,
            height,
            data,
        })
    }

    pub fn from_image(index: usize, img: image::RgbaImage) -> anyhow::Result<Self> {
        let (width, height) = img.dimensions();
        Self::new(index, width, height, img.into_raw())
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Frames of one run: non-empty, ordered, all of identical dimensions.
#[derive(Clone, Debug)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    frames: Vec<RasterFrame>,
}

impl FrameBuffer {
    pub fn from_frames(frames: Vec<RasterFrame>) -> EncodeResult<Self> {
        let Some(first) = frames.first() else {
            return Err(EncodeError::invalid("frame buffer must not be empty"));
        };
        let (width, height) = first.dimensions();
        if let Some(bad) = frames.iter().find(|f| f.dimensions() != (width, height)) {
            return Err(EncodeError::invalid(format!(
                "frame {} is {}x{}, expected {}x{}",
                bad.index, bad.width, bad.height, width, height
            )));
        }
        Ok(Self {
            width,
            height,
            frames,
        })
    }

    pub(crate) fn first(frame: RasterFrame) -> Self {
        Self {
            width: frame.width,
            height: frame.height,
            frames: vec![frame],
        }
    }

    /// Append a frame, handing it back when its dimensions differ from the buffer.
    pub(crate) fn push(&mut self, frame: RasterFrame) -> Result<(), RasterFrame> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(frame);
        }
        self.frames.push(frame);
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn frames(&self) -> &[RasterFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always `false`; a buffer holds at least one frame.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn into_frames(self) -> Vec<RasterFrame> {
        self.frames
    }
}

#[cfg(test)]
#[path = "../tests/unit/core.rs"]
mod tests;
