//! Error types for the watermark-compositor crate.

use crate::watermark::WatermarkId;

/// Errors that can occur while editing, rendering or exporting a scene.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The pixel buffer for a render pass could not be allocated.
    #[error("rendering surface unavailable for {width}x{height} canvas")]
    ContextUnavailable {
        /// Requested width in pixels.
        width: u32,
        /// Requested height in pixels.
        height: u32,
    },

    /// An operation needs a base image but none has been loaded.
    #[error("no base image loaded")]
    NoBaseImage,

    /// The scene already holds the maximum number of watermarks.
    #[error("watermark limit reached ({max} watermarks)")]
    TooManyWatermarks {
        /// The hard cap that was hit.
        max: usize,
    },

    /// No watermark with the given id exists in the scene.
    #[error("unknown watermark {0}")]
    UnknownWatermark(WatermarkId),

    /// The operation only applies to the other watermark variant.
    #[error("watermark {0} is not a {1} watermark")]
    WrongKind(WatermarkId, &'static str),

    /// A color string did not match `#RRGGBB`.
    #[error("invalid color {0:?}, expected #RRGGBB")]
    InvalidColor(String),

    /// A numeric edit fell outside its allowed range.
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        /// Name of the edited field.
        field: &'static str,
        /// The rejected value.
        value: f32,
        /// Inclusive lower bound.
        min: f32,
        /// Inclusive upper bound.
        max: f32,
    },

    /// An uploaded file exceeds the accepted size.
    #[error("file too large ({size} bytes, limit {limit})")]
    FileTooLarge {
        /// Actual size in bytes.
        size: u64,
        /// Accepted maximum in bytes.
        limit: u64,
    },

    /// A font file could not be parsed or located.
    #[error("font unavailable: {0}")]
    Font(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The image format is not supported.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// An error occurred during image processing (load, save, encode).
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// A scene description file could not be parsed.
    #[error("invalid scene file: {0}")]
    Scene(#[from] serde_json::Error),
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let io_err = Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(io_err.to_string().contains("gone"));

        let unsupported = Error::UnsupportedFormat("tiff".to_string());
        assert!(unsupported.to_string().contains("tiff"));

        let ctx = Error::ContextUnavailable {
            width: 10,
            height: 20,
        };
        assert!(ctx.to_string().contains("10x20"));

        let range = Error::OutOfRange {
            field: "scale",
            value: 4.0,
            min: 0.2,
            max: 3.0,
        };
        let msg = range.to_string();
        assert!(msg.contains("scale"));
        assert!(msg.contains("0.2"));
        assert!(msg.contains('4'));
    }

    #[test]
    fn color_error_quotes_input() {
        let err = Error::InvalidColor("red".to_string());
        assert!(err.to_string().contains("\"red\""));
    }
}
