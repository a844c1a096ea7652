use image::{Rgba, RgbaImage, imageops::FilterType};

use crate::{
    core::RasterFrame,
    error::{EncodeError, EncodeResult},
};

/// Composite straight-alpha RGBA8 over an opaque background, in place. Output alpha is 255.
pub fn flatten_to_opaque_rgba8(pixels: &mut [u8], bg_rgba: [u8; 4]) -> EncodeResult<()> {
    if !pixels.len().is_multiple_of(4) {
        return Err(EncodeError::invalid(
            "flatten_to_opaque_rgba8 expects an rgba8 buffer",
        ));
    }

    let bg_r = bg_rgba[0] as u16;
    let bg_g = bg_rgba[1] as u16;
    let bg_b = bg_rgba[2] as u16;

    for px in pixels.chunks_exact_mut(4) {
        let a = px[3] as u16;
        if a == 255 {
            continue;
        }
        let inv = 255u16 - a;
        px[0] = (mul_div255(px[0] as u16, a) + mul_div255(bg_r, inv)).min(255) as u8;
        px[1] = (mul_div255(px[1] as u16, a) + mul_div255(bg_g, inv)).min(255) as u8;
        px[2] = (mul_div255(px[2] as u16, a) + mul_div255(bg_b, inv)).min(255) as u8;
        px[3] = 255;
    }

    Ok(())
}

fn mul_div255(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

/// Opaque copy of a frame's pixels.
pub fn opaque_pixels(frame: &RasterFrame, bg_rgba: [u8; 4]) -> EncodeResult<Vec<u8>> {
    let mut data = frame.data.clone();
    flatten_to_opaque_rgba8(&mut data, bg_rgba)?;
    Ok(data)
}

/// Scale `frame` to fit inside `width`x`height` preserving aspect ratio, centred on an opaque
/// `bg_rgba` canvas. Returns tightly packed RGBA8.
pub fn letterbox(
    frame: &RasterFrame,
    width: u32,
    height: u32,
    bg_rgba: [u8; 4],
) -> EncodeResult<Vec<u8>> {
    if width == 0 || height == 0 {
        return Err(EncodeError::invalid("letterbox target must be non-zero"));
    }
    let src = RgbaImage::from_raw(frame.width, frame.height, opaque_pixels(frame, bg_rgba)?)
        .ok_or_else(|| EncodeError::invalid(format!("frame {} has a short buffer", frame.index)))?;

    let (fit_w, fit_h) = fit_within(frame.width, frame.height, width, height);
    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([bg_rgba[0], bg_rgba[1], bg_rgba[2], 255]));
    let scaled = if (fit_w, fit_h) == (frame.width, frame.height) {
        src
    } else {
        image::imageops::resize(&src, fit_w, fit_h, FilterType::Triangle)
    };
    let x = i64::from((width - fit_w) / 2);
    let y = i64::from((height - fit_h) / 2);
    image::imageops::overlay(&mut canvas, &scaled, x, y);
    Ok(canvas.into_raw())
}

/// Largest size with the `w:h` aspect ratio that fits in `max_w`x`max_h` (each side >= 1).
pub fn fit_within(w: u32, h: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    let scale = (f64::from(max_w) / f64::from(w.max(1))).min(f64::from(max_h) / f64::from(h.max(1)));
    let fw = ((f64::from(w) * scale).round() as u32).clamp(1, max_w);
    let fh = ((f64::from(h) * scale).round() as u32).clamp(1, max_h);
    (fw, fh)
}

#[cfg(test)]
#[path = "../../tests/unit/encode/pixels.rs"]
mod tests;
