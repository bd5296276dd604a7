//! Text measurement and rasterization.
//!
//! The renderer and geometry engine only see the [`Typeface`] trait, so the
//! font source can be swapped (a bundled font, a system font, or a stub in tests).

use std::path::Path;

use ab_glyph::{point, Font, FontArc, GlyphId, ScaleFont};
use image::GrayImage;
use tracing::debug;

use crate::error::{Error, Result};

/// Bold fonts commonly installed on Linux, macOS and Windows, tried in order.
const SYSTEM_BOLD_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/liberation-sans/LiberationSans-Bold.ttf",
    "/usr/share/fonts/noto/NotoSans-Bold.ttf",
    "/usr/share/fonts/truetype/noto/NotoSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "/Library/Fonts/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
    "C:\\Windows\\Fonts\\segoeuib.ttf",
];

/// A font that can measure and rasterize a single line of text.
pub trait Typeface: Send + Sync {
    /// Horizontal advance of `text` at `px` pixels per em.
    fn advance_width(&self, text: &str, px: f32) -> f32;

    /// Coverage mask of `text` at `px`, with the baseline at the ascent and
    /// the width equal to the advance. `None` when nothing would be drawn.
    fn coverage(&self, text: &str, px: f32) -> Option<GrayImage>;
}

/// A [`Typeface`] backed by a TrueType/OpenType font.
#[derive(Clone)]
pub struct GlyphTypeface {
    font: FontArc,
}

impl GlyphTypeface {
    /// Parse a font from raw file bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Font`] if the bytes are not a usable font.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let font = FontArc::try_from_vec(bytes).map_err(|e| Error::Font(e.to_string()))?;
        Ok(Self { font })
    }

    /// Load a font file from disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and [`Error::Font`] if
    /// it cannot be parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_bytes(std::fs::read(path)?)
    }

    /// Load the first bold sans-serif font found at a well-known system path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Font`] if none of the candidates exist or parse.
    pub fn system_bold() -> Result<Self> {
        for candidate in SYSTEM_BOLD_FONTS {
            let path = Path::new(candidate);
            if !path.is_file() {
                continue;
            }
            match Self::from_file(path) {
                Ok(face) => {
                    debug!(font = %path.display(), "loaded system font");
                    return Ok(face);
                }
                Err(e) => debug!(font = %path.display(), error = %e, "skipping system font"),
            }
        }
        Err(Error::Font("no bold system font found".to_string()))
    }

    /// Lay out one line left-aligned at x = 0, returning glyph offsets and
    /// the total advance.
    fn layout(&self, text: &str, px: f32) -> (Vec<(GlyphId, f32)>, f32) {
        let scaled = self.font.as_scaled(px);
        let mut glyphs = Vec::with_capacity(text.len());
        let mut cursor_x = 0.0f32;
        let mut last: Option<GlyphId> = None;
        for ch in text.chars() {
            let id = self.font.glyph_id(ch);
            if let Some(prev) = last {
                cursor_x += scaled.kern(prev, id);
            }
            glyphs.push((id, cursor_x));
            cursor_x += scaled.h_advance(id);
            last = Some(id);
        }
        (glyphs, cursor_x)
    }
}

impl Typeface for GlyphTypeface {
    fn advance_width(&self, text: &str, px: f32) -> f32 {
        self.layout(text, px).1
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap,
        clippy::cast_precision_loss
    )]
    fn coverage(&self, text: &str, px: f32) -> Option<GrayImage> {
        let (glyphs, advance) = self.layout(text, px);
        let scaled = self.font.as_scaled(px);
        let ascent = scaled.ascent();
        let height = (ascent - scaled.descent()).ceil();
        let width = advance.ceil();
        if glyphs.is_empty() || width < 1.0 || height < 1.0 {
            return None;
        }

        let (w, h) = (width as u32, height as u32);
        let mut mask = GrayImage::new(w, h);
        for (id, x) in glyphs {
            let glyph = id.with_scale_and_position(px, point(x, ascent));
            let Some(outlined) = self.font.outline_glyph(glyph) else {
                continue;
            };
            let bounds = outlined.px_bounds();
            outlined.draw(|gx, gy, cov| {
                let mx = bounds.min.x as i32 + gx as i32;
                let my = bounds.min.y as i32 + gy as i32;
                if mx < 0 || my < 0 || mx >= w as i32 || my >= h as i32 {
                    return;
                }
                let value = (cov.clamp(0.0, 1.0) * 255.0).round() as u8;
                let cell = mask.get_pixel_mut(mx as u32, my as u32);
                cell[0] = cell[0].max(value);
            });
        }
        Some(mask)
    }
}
