//! Upload-side helpers: format sniffing, size caps and downscaling.

use std::path::Path;

use image::imageops::FilterType;
use image::{ImageFormat, RgbaImage};
use tracing::debug;

use crate::error::{Error, Result};

/// Largest accepted encoded image, in bytes.
pub const MAX_UPLOAD_BYTES: u64 = 20 * 1024 * 1024;
/// Logos are downscaled so neither side exceeds this.
pub const MAX_LOGO_DIMENSION: u32 = 2048;

/// Check if a file has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp"
        ),
        None => false,
    }
}

/// Decode an encoded image, identifying the format from its content rather
/// than any file name.
///
/// # Errors
///
/// Returns [`Error::FileTooLarge`] above [`MAX_UPLOAD_BYTES`],
/// [`Error::UnsupportedFormat`] for anything but PNG, JPEG, WebP and BMP, and
/// [`Error::Image`] if decoding fails.
pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage> {
    let size = bytes.len() as u64;
    if size > MAX_UPLOAD_BYTES {
        return Err(Error::FileTooLarge {
            size,
            limit: MAX_UPLOAD_BYTES,
        });
    }
    let format =
        image::guess_format(bytes).map_err(|e| Error::UnsupportedFormat(e.to_string()))?;
    if !matches!(
        format,
        ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP | ImageFormat::Bmp
    ) {
        return Err(Error::UnsupportedFormat(format!("{format:?}")));
    }
    let decoded = image::load_from_memory_with_format(bytes, format)?;
    debug!(
        ?format,
        width = decoded.width(),
        height = decoded.height(),
        "decoded image"
    );
    Ok(decoded.to_rgba8())
}

/// Read and decode an image file.
///
/// # Errors
///
/// As [`decode_image`], plus [`Error::Io`] if the file cannot be read. The
/// size cap is checked before the file is read.
pub fn load_image(path: &Path) -> Result<RgbaImage> {
    let size = std::fs::metadata(path)?.len();
    if size > MAX_UPLOAD_BYTES {
        return Err(Error::FileTooLarge {
            size,
            limit: MAX_UPLOAD_BYTES,
        });
    }
    decode_image(&std::fs::read(path)?)
}

/// Downscale so neither side exceeds `max_dim`, keeping the aspect ratio.
/// Images already small enough are returned untouched.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn fit_within(image: RgbaImage, max_dim: u32) -> RgbaImage {
    let (w, h) = image.dimensions();
    let longest = w.max(h);
    if longest <= max_dim || max_dim == 0 {
        return image;
    }
    let ratio = f64::from(max_dim) / f64::from(longest);
    let new_w = ((f64::from(w) * ratio).round() as u32).clamp(1, max_dim);
    let new_h = ((f64::from(h) * ratio).round() as u32).clamp(1, max_dim);
    debug!(from_w = w, from_h = h, new_w, new_h, "downscaling image");
    image::imageops::resize(&image, new_w, new_h, FilterType::Triangle)
}
