//! Image → placement job quantization.
//!
//! The [`Quantizer`] resizes an image to fit a bounding box, drops background
//! pixels (transparent, or pure white after compositing), and maps every
//! remaining pixel onto the nearest palette color. Jobs are emitted in
//! row-major order; downstream consumers rely on that order.

use std::collections::BTreeMap;
use std::path::Path;

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::palette::{Palette, Rgb, Subset, Tier};
use crate::{plog, plog_debug, Error, Result};

/// Default bounding box, in pixels.
pub const DEFAULT_MAX_WIDTH: u32 = 128;
pub const DEFAULT_MAX_HEIGHT: u32 = 128;

/// Pixels with alpha below this are treated as transparent background.
pub const DEFAULT_ALPHA_THRESHOLD: u8 = 128;

/// One unit of work: paint `color` at `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlacementJob {
    pub x: i32,
    pub y: i32,
    pub color: Rgb,
    /// Composited source color the job was derived from.
    pub source_rgb: [u8; 3],
}

impl PlacementJob {
    /// Shift the job by a canvas offset.
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
            ..self
        }
    }
}

/// Aggregate color usage of a job list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorStats {
    /// Jobs per palette color.
    pub histogram: BTreeMap<Rgb, usize>,
    pub unrestricted_count: usize,
    pub restricted_count: usize,
}

impl ColorStats {
    fn record(&mut self, color: Rgb, tier: Option<Tier>) {
        *self.histogram.entry(color).or_insert(0) += 1;
        match tier {
            Some(Tier::Unrestricted) => self.unrestricted_count += 1,
            Some(Tier::Restricted) => self.restricted_count += 1,
            None => {}
        }
    }

    pub fn unique_colors(&self) -> usize {
        self.histogram.len()
    }

    pub fn total(&self) -> usize {
        self.histogram.values().sum()
    }
}

/// Output of quantizing one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantizationResult {
    /// Dimensions after resizing.
    pub width: u32,
    pub height: u32,
    pub source_width: u32,
    pub source_height: u32,
    pub subset: Subset,
    pub jobs: Vec<PlacementJob>,
    pub stats: ColorStats,
}

/// Tunable quantization policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantizeOptions {
    pub max_width: u32,
    pub max_height: u32,
    pub subset: Subset,
    /// Alpha below this drops the pixel.
    pub alpha_threshold: u8,
    /// Drop pixels that are exactly `#FFFFFF` after compositing.
    pub skip_white: bool,
}

impl Default for QuantizeOptions {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
            max_height: DEFAULT_MAX_HEIGHT,
            subset: Subset::Full,
            alpha_threshold: DEFAULT_ALPHA_THRESHOLD,
            skip_white: true,
        }
    }
}

impl QuantizeOptions {
    pub fn with_bounds(max_width: u32, max_height: u32) -> Self {
        Self {
            max_width,
            max_height,
            ..Default::default()
        }
    }

    pub fn with_subset(mut self, subset: Subset) -> Self {
        self.subset = subset;
        self
    }
}

/// Target size for `(width, height)` within `(max_width, max_height)`.
///
/// The dimension that overshoots its bound by the larger ratio is clamped to
/// that bound; the other is scaled by the same factor with truncation. Images
/// already inside the box are returned unchanged.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }
    let (w, h) = (width as u64, height as u64);
    let (mw, mh) = (max_width as u64, max_height as u64);
    // w/mw >= h/mh  <=>  w*mh >= h*mw
    if w * mh >= h * mw {
        let new_h = (h * mw / w).max(1);
        (max_width, new_h as u32)
    } else {
        let new_w = (w * mh / h).max(1);
        (new_w as u32, max_height)
    }
}

/// Composite a straight-alpha channel over white, rounding to nearest.
fn over_white(channel: u8, alpha: u8) -> u8 {
    let c = channel as u32 * alpha as u32 + 255 * (255 - alpha as u32);
    ((c + 127) / 255) as u8
}

/// Composite every pixel's color over white, keeping its alpha.
///
/// Resampling then blends only opaque colors, so transparent regions cannot
/// bleed their hidden RGB into neighbouring pixels. The alpha channel is
/// resampled alongside and only consulted for the background threshold.
fn flatten_over_white(mut rgba: RgbaImage) -> RgbaImage {
    for pixel in rgba.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        pixel.0 = [over_white(r, a), over_white(g, a), over_white(b, a), a];
    }
    rgba
}

/// Maps images onto a palette.
#[derive(Debug, Clone)]
pub struct Quantizer {
    palette: Palette,
    options: QuantizeOptions,
}

impl Quantizer {
    pub fn new(palette: Palette, options: QuantizeOptions) -> Self {
        Self { palette, options }
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn options(&self) -> &QuantizeOptions {
        &self.options
    }

    /// Read, decode and quantize an image file.
    ///
    /// # Errors
    ///
    /// `Error::Io` if the file cannot be read, `Error::Image` if it cannot be
    /// decoded. No partial result is produced.
    pub fn quantize_path(&self, path: &Path) -> Result<QuantizationResult> {
        plog_debug!("Quantizer::quantize_path {}", path.display());
        let bytes = std::fs::read(path)?;
        let image = image::load_from_memory(&bytes)?;
        self.quantize_image(&image)
    }

    /// Quantize an already decoded image.
    pub fn quantize_image(&self, image: &DynamicImage) -> Result<QuantizationResult> {
        let QuantizeOptions {
            max_width,
            max_height,
            ..
        } = self.options;
        if max_width == 0 || max_height == 0 {
            return Err(Error::Validation(format!(
                "bounds must be positive, got {}x{}",
                max_width, max_height
            )));
        }

        let rgba = flatten_over_white(image.to_rgba8());
        let (source_width, source_height) = rgba.dimensions();
        let (width, height) = fit_within(source_width, source_height, max_width, max_height);
        let rgba = if (width, height) == (source_width, source_height) {
            rgba
        } else {
            plog_debug!(
                "Resizing {}x{} -> {}x{}",
                source_width,
                source_height,
                width,
                height
            );
            imageops::resize(&rgba, width, height, FilterType::Lanczos3)
        };

        let (jobs, stats) = self.map_pixels(&rgba);
        plog!(
            "Quantized {}x{} image into {} jobs ({} colors, {} restricted)",
            width,
            height,
            jobs.len(),
            stats.unique_colors(),
            stats.restricted_count
        );

        Ok(QuantizationResult {
            width,
            height,
            source_width,
            source_height,
            subset: self.options.subset,
            jobs,
            stats,
        })
    }

    fn map_pixels(&self, rgba: &RgbaImage) -> (Vec<PlacementJob>, ColorStats) {
        let mut jobs = Vec::new();
        let mut stats = ColorStats::default();

        // Row-major: enumerate_pixels walks rows top to bottom, left to right.
        for (x, y, pixel) in rgba.enumerate_pixels() {
            let [r, g, b, a] = pixel.0;
            if a < self.options.alpha_threshold {
                continue;
            }
            let source = Rgb::new(r, g, b);
            if self.options.skip_white && source == Rgb::WHITE {
                continue;
            }

            let color = self.palette.nearest(source, self.options.subset);
            stats.record(color, self.palette.tier_of(color));
            jobs.push(PlacementJob {
                x: x as i32,
                y: y as i32,
                color,
                source_rgb: source.channels(),
            });
        }

        (jobs, stats)
    }
}

impl Default for Quantizer {
    fn default() -> Self {
        Self::new(Palette::standard(), QuantizeOptions::default())
    }
}
