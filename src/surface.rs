//! The renderer capability the capture orchestrator drives, and a software implementation
//! of it.
//!
//! The core never draws anything itself: it applies [`FrameMutation`]s to a
//! [`RenderSurface`] and asks it for bitmaps. [`SyntheticChat`] is a small rasterizer that
//! draws chat bubbles with blocks for glyphs; it backs the demo host and the tests.

use anyhow::Context as _;
use image::{Rgba, RgbaImage, imageops::FilterType};

use crate::core::{ContentUnit, FrameMutation, ScrollOffset, Visibility};

/// A render surface the orchestrator can mutate and capture.
///
/// Mutation is in place, so a surface serves one capture run at a time; the orchestrator
/// holds it by `&mut` for the whole run.
#[async_trait::async_trait]
pub trait RenderSurface: Send {
    /// Apply the visibility/scroll state for the next capture.
    fn apply_mutation(&mut self, mutation: &FrameMutation);

    /// Render the current state scaled to `target_width`, preserving aspect ratio.
    async fn capture_frame(&mut self, target_width: u32) -> anyhow::Result<RgbaImage>;

    /// Undo every mutation applied since the surface was acquired.
    fn restore_original_state(&mut self);
}

/// Scoped acquisition of a surface: restores it exactly once when dropped, however the run
/// ends (including the run's future being dropped mid-await).
pub struct SurfaceLease<'s, S: RenderSurface + ?Sized> {
    surface: &'s mut S,
}

impl<'s, S: RenderSurface + ?Sized> SurfaceLease<'s, S> {
    pub fn acquire(surface: &'s mut S) -> Self {
        Self { surface }
    }
}

impl<S: RenderSurface + ?Sized> std::ops::Deref for SurfaceLease<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.surface
    }
}

impl<S: RenderSurface + ?Sized> std::ops::DerefMut for SurfaceLease<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.surface
    }
}

impl<S: RenderSurface + ?Sized> Drop for SurfaceLease<'_, S> {
    fn drop(&mut self) {
        tracing::debug!("restoring render surface");
        self.surface.restore_original_state();
    }
}

const CHARS_PER_LINE: usize = 28;
const GLYPH_ADVANCE: u32 = 9;
const LINE_HEIGHT: u32 = 16;
const BUBBLE_PAD: u32 = 8;
const BUBBLE_GAP: u32 = 10;
const EDGE_MARGIN: u32 = 12;

const BACKGROUND: Rgba<u8> = Rgba([245, 246, 248, 255]);
const INCOMING_FILL: Rgba<u8> = Rgba([229, 229, 234, 255]);
const OUTGOING_FILL: Rgba<u8> = Rgba([10, 132, 255, 255]);
const INCOMING_INK: Rgba<u8> = Rgba([28, 28, 30, 255]);
const OUTGOING_INK: Rgba<u8> = Rgba([255, 255, 255, 255]);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct BubbleBox {
    unit: usize,
    x: u32,
    y: u32,
    w: u32,
    h: u32,
    chars: usize,
    cursor: bool,
}

/// Software-rasterized chat transcript: even ordinals are incoming (left, grey), odd are
/// outgoing (right, blue).
#[derive(Clone, Debug)]
pub struct SyntheticChat {
    units: Vec<ContentUnit>,
    width: u32,
    viewport_height: u32,
    state: FrameMutation,
}

impl SyntheticChat {
    pub fn new(units: Vec<ContentUnit>) -> Self {
        let state = FrameMutation::all(units.len(), Visibility::Full);
        Self {
            units,
            width: 360,
            viewport_height: 640,
            state,
        }
    }

    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        self.width = width.max(2 * EDGE_MARGIN + 4 * GLYPH_ADVANCE);
        self.viewport_height = height.max(1);
        self
    }

    pub fn units(&self) -> &[ContentUnit] {
        &self.units
    }

    /// The state the next capture will show.
    pub fn state(&self) -> &FrameMutation {
        &self.state
    }

    /// Scroll range in logical pixels when every unit is fully visible.
    pub fn max_scroll(&self) -> u32 {
        let everything = FrameMutation::all(self.units.len(), Visibility::Full);
        self.content_height(&self.layout(&everything))
            .saturating_sub(self.viewport_height)
    }

    /// Rasterize the current state at the surface's logical size.
    pub fn render(&self) -> RgbaImage {
        let mut img = RgbaImage::from_pixel(self.width, self.viewport_height, BACKGROUND);
        let scroll = i64::from(self.scroll_px(self.state.scroll));

        for b in self.layout(&self.state) {
            let outgoing = self.units[b.unit].ordinal % 2 == 1;
            let (fill, ink) = if outgoing {
                (OUTGOING_FILL, OUTGOING_INK)
            } else {
                (INCOMING_FILL, INCOMING_INK)
            };
            let top = i64::from(b.y) - scroll;
            fill_rect(&mut img, i64::from(b.x), top, b.w, b.h, fill);

            let text_x = i64::from(b.x + BUBBLE_PAD);
            let text_y = top + i64::from(BUBBLE_PAD);
            let shown = self.units[b.unit].text.chars().take(b.chars);
            for (k, ch) in shown.enumerate() {
                if ch.is_whitespace() {
                    continue;
                }
                let (col, row) = glyph_cell(k);
                fill_rect(
                    &mut img,
                    text_x + i64::from(col * GLYPH_ADVANCE),
                    text_y + i64::from(row * LINE_HEIGHT + 3),
                    GLYPH_ADVANCE - 2,
                    LINE_HEIGHT - 6,
                    ink,
                );
            }
            if b.cursor {
                let (col, row) = glyph_cell(b.chars);
                fill_rect(
                    &mut img,
                    text_x + i64::from(col * GLYPH_ADVANCE),
                    text_y + i64::from(row * LINE_HEIGHT + 1),
                    2,
                    LINE_HEIGHT - 2,
                    ink,
                );
            }
        }
        img
    }

    fn scroll_px(&self, offset: ScrollOffset) -> u32 {
        offset.to_pixels(self.max_scroll())
    }

    fn layout(&self, state: &FrameMutation) -> Vec<BubbleBox> {
        let mut y = EDGE_MARGIN;
        let mut out = Vec::new();
        for (i, unit) in self.units.iter().enumerate() {
            let (chars, cursor) = match state.visibility.get(i).copied() {
                None | Some(Visibility::Hidden) => continue,
                Some(Visibility::Partial { chars, cursor }) => (chars.min(unit.char_len()), cursor),
                Some(Visibility::Full) => (unit.char_len(), false),
            };
            let slots = chars + usize::from(cursor);
            let lines = slots.div_ceil(CHARS_PER_LINE).max(1) as u32;
            let cols = slots.clamp(1, CHARS_PER_LINE) as u32;
            let max_w = self.width - 2 * EDGE_MARGIN;
            let w = (cols * GLYPH_ADVANCE + 2 * BUBBLE_PAD).min(max_w);
            let h = lines * LINE_HEIGHT + 2 * BUBBLE_PAD;
            let x = if unit.ordinal % 2 == 1 {
                self.width - EDGE_MARGIN - w
            } else {
                EDGE_MARGIN
            };
            out.push(BubbleBox {
                unit: i,
                x,
                y,
                w,
                h,
                chars,
                cursor,
            });
            y += h + BUBBLE_GAP;
        }
        out
    }

    fn content_height(&self, layout: &[BubbleBox]) -> u32 {
        layout
            .last()
            .map_or(0, |b| b.y + b.h + EDGE_MARGIN)
    }
}

#[async_trait::async_trait]
impl RenderSurface for SyntheticChat {
    fn apply_mutation(&mut self, mutation: &FrameMutation) {
        self.state = mutation.clone();
    }

    async fn capture_frame(&mut self, target_width: u32) -> anyhow::Result<RgbaImage> {
        anyhow::ensure!(target_width > 0, "target width must be non-zero");
        let img = self.render();
        if target_width == img.width() {
            return Ok(img);
        }
        let height = scaled_height(img.width(), img.height(), target_width)
            .context("scaling synthetic chat frame")?;
        Ok(image::imageops::resize(
            &img,
            target_width,
            height,
            FilterType::Triangle,
        ))
    }

    fn restore_original_state(&mut self) {
        self.state = FrameMutation::all(self.units.len(), Visibility::Full);
    }
}

/// Height that keeps the `w:h` aspect ratio at `target_width` (at least 1 px).
pub fn scaled_height(w: u32, h: u32, target_width: u32) -> anyhow::Result<u32> {
    anyhow::ensure!(w > 0 && h > 0, "source dimensions must be non-zero");
    let scaled = (u64::from(h) * u64::from(target_width) + u64::from(w) / 2) / u64::from(w);
    u32::try_from(scaled.max(1)).context("scaled height overflows u32")
}

fn glyph_cell(k: usize) -> (u32, u32) {
    ((k % CHARS_PER_LINE) as u32, (k / CHARS_PER_LINE) as u32)
}

fn fill_rect(img: &mut RgbaImage, x: i64, y: i64, w: u32, h: u32, color: Rgba<u8>) {
    let x0 = x.max(0);
    let y0 = y.max(0);
    let x1 = (x + i64::from(w)).min(i64::from(img.width()));
    let y1 = (y + i64::from(h)).min(i64::from(img.height()));
    for py in y0..y1 {
        for px in x0..x1 {
            img.put_pixel(px as u32, py as u32, color);
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/surface.rs"]
mod tests;
