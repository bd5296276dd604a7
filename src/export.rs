//! Writing finished images to disk.

use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat, RgbaImage};
use tracing::debug;

use crate::error::{Error, Result};

/// JPEG quality used for exports.
pub const JPEG_QUALITY: u8 = 92;

/// Save a composited image, picking the format from the file extension.
///
/// JPEG and BMP have no alpha channel worth keeping here, so they are written
/// as RGB; PNG and WebP keep transparency.
///
/// # Errors
///
/// Returns an error if the format is unsupported or writing fails.
pub fn save_image(img: &RgbaImage, path: &Path) -> Result<()> {
    let format =
        ImageFormat::from_path(path).map_err(|e| Error::UnsupportedFormat(e.to_string()))?;

    match format {
        ImageFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(img.clone()).to_rgb8();
            let file = std::io::BufWriter::new(std::fs::File::create(path)?);
            let mut encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(file, JPEG_QUALITY);
            encoder.encode_image(&rgb)?;
        }
        ImageFormat::Bmp => {
            DynamicImage::ImageRgba8(img.clone()).to_rgb8().save(path)?;
        }
        ImageFormat::Png | ImageFormat::WebP => {
            img.save(path)?;
        }
        _ => {
            return Err(Error::UnsupportedFormat(format!("{format:?}")));
        }
    }

    debug!(path = %path.display(), ?format, "exported image");
    Ok(())
}

/// Generate a default output path from an input path.
///
/// Example: `"photo.jpg"` becomes `"photo_watermarked.jpg"`.
#[must_use]
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let ext = input.extension().unwrap_or_default().to_string_lossy();
    let parent = input.parent().unwrap_or(Path::new("."));
    parent.join(format!("{stem}_watermarked.{ext}"))
}
