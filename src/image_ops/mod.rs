//! Image introspection, perceptual hashing, and brightness analysis
//!
//! All operations take raw encoded bytes and share one validation path:
//! [`describe`] introspects the container format and dimensions, and
//! [`ImageDescriptor::validate`] rejects unsupported formats and
//! non-positive dimensions before any pixel work happens.

use std::io::Cursor;

use image::ImageFormat;

use crate::errors::ImageAnalysisError;

pub mod brightness;
pub mod phash;

/// Formats the pipeline will decode and analyze
pub const SUPPORTED_FORMATS: [&str; 4] = ["png", "jpeg", "gif", "webp"];

/// Container format and dimensions of an encoded image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDescriptor {
    pub format: String,
    pub width: i64,
    pub height: i64,
}

impl ImageDescriptor {
    pub fn new(format: impl Into<String>, width: i64, height: i64) -> Self {
        Self {
            format: format.into(),
            width,
            height,
        }
    }

    /// Reject descriptors the pipeline cannot analyze: a format outside
    /// the supported set, or non-positive dimensions.
    pub fn validate(&self) -> Result<(), ImageAnalysisError> {
        if !SUPPORTED_FORMATS.contains(&self.format.as_str()) {
            return Err(ImageAnalysisError::UnsupportedFormat {
                format: self.format.clone(),
                supported: SUPPORTED_FORMATS.join(", "),
            });
        }
        if self.width <= 0 || self.height <= 0 {
            return Err(ImageAnalysisError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}

/// Introspect encoded bytes without a full decode.
///
/// An unrecognizable container is reported as an unsupported format so
/// callers get the same error shape as for known-but-unsupported ones.
pub fn describe(bytes: &[u8]) -> Result<ImageDescriptor, ImageAnalysisError> {
    let format = image::guess_format(bytes).map_err(|_| ImageAnalysisError::UnsupportedFormat {
        format: "unknown".to_string(),
        supported: SUPPORTED_FORMATS.join(", "),
    })?;

    let name = format_name(format);
    if !SUPPORTED_FORMATS.contains(&name) {
        return Err(ImageAnalysisError::UnsupportedFormat {
            format: name.to_string(),
            supported: SUPPORTED_FORMATS.join(", "),
        });
    }

    let reader = image::ImageReader::with_format(Cursor::new(bytes), format);
    let (width, height) = reader
        .into_dimensions()
        .map_err(ImageAnalysisError::codec)?;

    Ok(ImageDescriptor::new(name, width as i64, height as i64))
}

fn format_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "png",
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Gif => "gif",
        ImageFormat::WebP => "webp",
        other => other.extensions_str().first().copied().unwrap_or("unknown"),
    }
}

#[cfg(test)]
pub(crate) mod test_images {
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    /// Encode a solid-color RGB PNG in memory
    pub fn solid_png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb(color));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("encode test png");
        bytes
    }

    /// Encode a solid-color RGBA PNG with a uniform alpha value
    pub fn solid_rgba_png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba(color));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("encode test png");
        bytes
    }
}
