//! Render a quantization result back into an image.

use std::path::Path;

use image::{Rgb as PixelRgb, RgbImage};

use crate::palette::Rgb;
use crate::quantize::QuantizationResult;
use crate::{plog_debug, Error, Result};

/// Outline color for grid previews.
pub const GRID_COLOR: Rgb = Rgb::new(0xCC, 0xCC, 0xCC);

fn pixel(color: Rgb) -> PixelRgb<u8> {
    PixelRgb(color.channels())
}

fn blank_canvas(result: &QuantizationResult, scale: u32) -> Result<RgbImage> {
    if scale == 0 {
        return Err(Error::Validation("scale must be at least 1".to_string()));
    }
    let width = result.width.checked_mul(scale);
    let height = result.height.checked_mul(scale);
    match (width, height) {
        (Some(w), Some(h)) => Ok(RgbImage::from_pixel(w, h, pixel(Rgb::WHITE))),
        _ => Err(Error::Validation(format!(
            "{}x{} at scale {} is too large",
            result.width, result.height, scale
        ))),
    }
}

fn fill_block(canvas: &mut RgbImage, x0: u32, y0: u32, size: u32, color: Rgb) {
    for y in y0..y0 + size {
        for x in x0..x0 + size {
            canvas.put_pixel(x, y, pixel(color));
        }
    }
}

fn job_origin(x: i32, y: i32, result: &QuantizationResult) -> Option<(u32, u32)> {
    let (x, y) = (u32::try_from(x).ok()?, u32::try_from(y).ok()?);
    (x < result.width && y < result.height).then_some((x, y))
}

/// Draw every job as a `pixel_size` square; background stays white.
pub fn render_processed(result: &QuantizationResult, pixel_size: u32) -> Result<RgbImage> {
    let mut canvas = blank_canvas(result, pixel_size)?;
    for job in &result.jobs {
        if let Some((x, y)) = job_origin(job.x, job.y, result) {
            fill_block(&mut canvas, x * pixel_size, y * pixel_size, pixel_size, job.color);
        }
    }
    Ok(canvas)
}

/// Smallest cell that keeps an interior pixel inside its outline.
pub const MIN_OUTLINED_CELL: u32 = 3;

/// Like [`render_processed`], with every cell outlined in [`GRID_COLOR`].
///
/// Cells smaller than [`MIN_OUTLINED_CELL`] are left without outlines.
pub fn render_grid(result: &QuantizationResult, cell: u32) -> Result<RgbImage> {
    let mut canvas = render_processed(result, cell)?;
    if cell < MIN_OUTLINED_CELL {
        return Ok(canvas);
    }
    let (width, height) = canvas.dimensions();
    for y in 0..height {
        for x in 0..width {
            let (cx, cy) = (x % cell, y % cell);
            if cx == 0 || cy == 0 || cx == cell - 1 || cy == cell - 1 {
                canvas.put_pixel(x, y, pixel(GRID_COLOR));
            }
        }
    }
    Ok(canvas)
}

/// Save a rendered preview as PNG.
pub fn save_png(image: &RgbImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    image.save_with_format(path, image::ImageFormat::Png)?;
    plog_debug!(
        "Saved {}x{} preview to {}",
        image.width(),
        image.height(),
        path.display()
    );
    Ok(())
}
