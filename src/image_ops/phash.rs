//! Perceptual and content hashing for placeholder detection
//!
//! The perceptual hash is deliberately coarse: decode, resize to a
//! 16x16 grayscale thumbnail, and SHA-256 the pixel buffer. Two images
//! compare equal only when their thumbnails are byte-identical, which
//! is exactly what placeholder detection needs (the same generic icon
//! re-encoded or re-scaled by different services).

use image::imageops::FilterType;
use sha2::{Digest, Sha256};

use crate::errors::ImageAnalysisError;

use super::describe;

/// Thumbnail edge length for the perceptual hash
pub const HASH_DIMENSION: u32 = 16;

/// Images smaller than this on either edge carry too little signal to
/// hash meaningfully
pub const MIN_ICON_DIMENSION: u32 = 16;

/// SHA-256 of the raw encoded bytes, hex-encoded. Used as the cache key
/// for verdicts and analyses so identical images share entries.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Perceptual hash of an encoded image.
///
/// Fails on unsupported formats, undecodable bytes, and images smaller
/// than [`MIN_ICON_DIMENSION`] on either edge.
pub fn hash(bytes: &[u8]) -> Result<String, ImageAnalysisError> {
    let descriptor = describe(bytes)?;
    descriptor.validate()?;

    if (descriptor.width as u32) < MIN_ICON_DIMENSION
        || (descriptor.height as u32) < MIN_ICON_DIMENSION
    {
        return Err(ImageAnalysisError::InvalidDimensions {
            width: descriptor.width,
            height: descriptor.height,
        });
    }

    let img = image::load_from_memory(bytes).map_err(ImageAnalysisError::codec)?;
    let thumbnail = img
        .resize_exact(HASH_DIMENSION, HASH_DIMENSION, FilterType::Lanczos3)
        .to_luma8();

    let mut hasher = Sha256::new();
    hasher.update(thumbnail.as_raw());
    Ok(hex::encode(hasher.finalize()))
}

/// Whether two encoded images are perceptually identical.
///
/// Never fails: if either side cannot be hashed the answer is `false`.
pub fn are_similar(a: &[u8], b: &[u8]) -> bool {
    match (hash(a), hash(b)) {
        (Ok(hash_a), Ok(hash_b)) => hash_a == hash_b,
        _ => false,
    }
}
