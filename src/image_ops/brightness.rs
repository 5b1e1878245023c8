//! Brightness analysis and theme-aware color inversion
//!
//! Analysis downscales large images before the pixel pass, averages
//! luminance over opaque pixels only, and derives the two inversion
//! flags from a single lightness classification: light logos invert in
//! light themes, dark logos invert in dark themes.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgb, Rgba};

use crate::errors::ImageAnalysisError;
use crate::models::BrightnessAnalysis;

use super::describe;

/// Images larger than this on either edge are downscaled before the
/// pixel pass; small images are analyzed as-is, never enlarged
pub const MAX_ANALYSIS_DIMENSION: u32 = 256;

/// Average luminance at or above this counts as light-colored
pub const LIGHT_BRIGHTNESS_THRESHOLD: u8 = 128;

/// Analyze luminance and transparency of an encoded image.
///
/// Fully transparent pixels are excluded from the average; an image with
/// no opaque pixels reports an average of zero and classifies as dark.
pub fn analyze(bytes: &[u8]) -> Result<BrightnessAnalysis, ImageAnalysisError> {
    let descriptor = describe(bytes)?;
    descriptor.validate()?;

    let img = image::load_from_memory(bytes).map_err(ImageAnalysisError::codec)?;
    let img = bound_for_analysis(img);

    let rgba = img.to_rgba8();
    let luma = img.to_luma8();

    let mut sum: u64 = 0;
    let mut opaque: u64 = 0;
    let mut has_transparency = false;

    for (rgba_px, luma_px) in rgba.pixels().zip(luma.pixels()) {
        let alpha = rgba_px[3];
        if alpha < 255 {
            has_transparency = true;
        }
        if alpha > 0 {
            sum += luma_px[0] as u64;
            opaque += 1;
        }
    }

    let average_brightness = if opaque > 0 { (sum / opaque) as u8 } else { 0 };
    let is_light_colored = average_brightness >= LIGHT_BRIGHTNESS_THRESHOLD;

    Ok(BrightnessAnalysis {
        average_brightness,
        is_light_colored,
        needs_inversion_in_light_theme: is_light_colored,
        needs_inversion_in_dark_theme: !is_light_colored,
        has_transparency,
        format: descriptor.format,
        width: descriptor.width as u32,
        height: descriptor.height as u32,
    })
}

/// Invert the colors of an encoded image and re-encode as PNG.
///
/// With `preserve_transparency` set, alpha values pass through
/// untouched; otherwise every channel the image carries is inverted.
/// Images without an alpha channel stay alpha-free in the output.
pub fn invert(bytes: &[u8], preserve_transparency: bool) -> Result<Vec<u8>, ImageAnalysisError> {
    let descriptor = describe(bytes)?;
    descriptor.validate()?;

    let img = image::load_from_memory(bytes).map_err(ImageAnalysisError::codec)?;

    let inverted: DynamicImage = if img.color().has_alpha() {
        let mut rgba = img.to_rgba8();
        for Rgba([r, g, b, a]) in rgba.pixels_mut() {
            *r = 255 - *r;
            *g = 255 - *g;
            *b = 255 - *b;
            if !preserve_transparency {
                *a = 255 - *a;
            }
        }
        DynamicImage::ImageRgba8(rgba)
    } else {
        let mut rgb = img.to_rgb8();
        for Rgb([r, g, b]) in rgb.pixels_mut() {
            *r = 255 - *r;
            *g = 255 - *g;
            *b = 255 - *b;
        }
        DynamicImage::ImageRgb8(rgb)
    };

    let mut out = Vec::new();
    inverted
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .map_err(ImageAnalysisError::codec)?;
    Ok(out)
}

fn bound_for_analysis(img: DynamicImage) -> DynamicImage {
    if img.width() > MAX_ANALYSIS_DIMENSION || img.height() > MAX_ANALYSIS_DIMENSION {
        img.resize(
            MAX_ANALYSIS_DIMENSION,
            MAX_ANALYSIS_DIMENSION,
            FilterType::Triangle,
        )
    } else {
        img
    }
}
