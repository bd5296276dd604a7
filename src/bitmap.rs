//! Decoded bitmaps: the base image and the logo lookup table.
//!
//! Logo watermarks never own pixels. They carry a [`BitmapId`] that is looked
//! up in the [`BitmapStore`], so duplicating a logo shares the decoded data and
//! deleting one cannot free pixels another layer still uses.

use std::collections::HashMap;
use std::sync::Arc;

use image::RgbaImage;
use tiny_skia::{ColorU8, Pixmap};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::geometry::Size;
use crate::load;

/// Largest internal dimension of the base image; larger uploads are downscaled.
pub const MAX_SAFE_DIMENSION: u32 = 8192;

/// Key of a decoded logo in the [`BitmapStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BitmapId(Uuid);

impl BitmapId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BitmapId {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable premultiplied pixels, cheap to clone.
#[derive(Debug, Clone)]
pub struct Bitmap {
    pixmap: Arc<Pixmap>,
}

impl Bitmap {
    /// Convert straight-alpha RGBA pixels into a premultiplied bitmap.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContextUnavailable`] if the image has a zero dimension
    /// or the pixel buffer cannot be allocated.
    pub fn from_rgba(image: &RgbaImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        let mut pixmap =
            Pixmap::new(width, height).ok_or(Error::ContextUnavailable { width, height })?;
        for (dst, src) in pixmap.pixels_mut().iter_mut().zip(image.pixels()) {
            *dst = ColorU8::from_rgba(src[0], src[1], src[2], src[3]).premultiply();
        }
        Ok(Self {
            pixmap: Arc::new(pixmap),
        })
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// The premultiplied pixels.
    #[must_use]
    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }
}

/// Lookup table from [`BitmapId`] to decoded logo.
///
/// An id can be reserved before its pixels arrive; until then lookups return
/// `None` and the logo measures as the default square and is not drawn.
#[derive(Debug, Default)]
pub struct BitmapStore {
    entries: HashMap<BitmapId, Option<Bitmap>>,
}

impl BitmapStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve an id whose bitmap will be attached later.
    pub fn reserve(&mut self) -> BitmapId {
        let id = BitmapId::new();
        self.entries.insert(id, None);
        id
    }

    /// Store a bitmap under a fresh id.
    pub fn register(&mut self, bitmap: Bitmap) -> BitmapId {
        let id = BitmapId::new();
        self.entries.insert(id, Some(bitmap));
        id
    }

    /// Attach pixels to a reserved id. Returns `false` (and drops the bitmap)
    /// if the reservation was already released.
    pub fn attach(&mut self, id: BitmapId, bitmap: Bitmap) -> bool {
        match self.entries.get_mut(&id) {
            Some(slot) => {
                *slot = Some(bitmap);
                true
            }
            None => false,
        }
    }

    /// The bitmap for `id`, if it is known and decoded.
    #[must_use]
    pub fn get(&self, id: BitmapId) -> Option<&Bitmap> {
        self.entries.get(&id).and_then(Option::as_ref)
    }

    /// Pixel dimensions of a decoded bitmap.
    #[must_use]
    pub fn dimensions(&self, id: BitmapId) -> Option<(u32, u32)> {
        self.get(id).map(|b| (b.width(), b.height()))
    }

    /// Whether `id` is reserved or decoded.
    #[must_use]
    pub fn contains(&self, id: BitmapId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of reserved or decoded entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Release every entry not in `referenced`. Returns how many were released.
    pub fn retain_referenced(&mut self, referenced: impl IntoIterator<Item = BitmapId>) -> usize {
        let keep: std::collections::HashSet<BitmapId> = referenced.into_iter().collect();
        let before = self.entries.len();
        self.entries.retain(|id, _| keep.contains(id));
        let released = before - self.entries.len();
        if released > 0 {
            debug!(released, remaining = self.entries.len(), "released bitmaps");
        }
        released
    }
}

/// The background raster watermarks are composited onto.
///
/// Its pixel size defines the coordinate space of every watermark position.
#[derive(Debug, Clone)]
pub struct BaseImage {
    bitmap: Bitmap,
}

impl BaseImage {
    /// Take ownership of decoded pixels, downscaling so neither side exceeds
    /// [`MAX_SAFE_DIMENSION`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContextUnavailable`] for empty images.
    pub fn new(image: RgbaImage) -> Result<Self> {
        let image = load::fit_within(image, MAX_SAFE_DIMENSION);
        Ok(Self {
            bitmap: Bitmap::from_rgba(&image)?,
        })
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.bitmap.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.bitmap.height()
    }

    /// Size as floating-point bounds for geometry.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn bounds(&self) -> Size {
        Size::new(self.width() as f32, self.height() as f32)
    }

    /// The premultiplied pixels.
    #[must_use]
    pub fn pixmap(&self) -> &Pixmap {
        self.bitmap.pixmap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn bitmap_premultiplies_alpha() {
        let img = RgbaImage::from_pixel(2, 2, Rgba([200, 100, 50, 128]));
        let bmp = Bitmap::from_rgba(&img).unwrap();
        let px = bmp.pixmap().pixels()[0];
        assert_eq!(px.alpha(), 128);
        assert!(px.red() < 200);
        let back = px.demultiply();
        assert!((i32::from(back.red()) - 200).abs() <= 2);
    }

    #[test]
    fn empty_image_is_rejected() {
        let err = Bitmap::from_rgba(&RgbaImage::new(0, 10)).err();
        assert!(matches!(err, Some(Error::ContextUnavailable { .. })));
    }

    #[test]
    fn reserved_ids_have_no_pixels_until_attached() {
        let mut store = BitmapStore::new();
        let id = store.reserve();
        assert!(store.contains(id));
        assert!(store.get(id).is_none());
        assert!(store.dimensions(id).is_none());

        let bmp = Bitmap::from_rgba(&RgbaImage::new(4, 3)).unwrap();
        assert!(store.attach(id, bmp));
        assert_eq!(store.dimensions(id), Some((4, 3)));
    }

    #[test]
    fn attaching_to_released_id_drops_bitmap() {
        let mut store = BitmapStore::new();
        let id = store.reserve();
        assert_eq!(store.retain_referenced([]), 1);
        let bmp = Bitmap::from_rgba(&RgbaImage::new(1, 1)).unwrap();
        assert!(!store.attach(id, bmp));
        assert!(store.is_empty());
    }

    #[test]
    fn retain_keeps_only_referenced() {
        let mut store = BitmapStore::new();
        let a = store.register(Bitmap::from_rgba(&RgbaImage::new(1, 1)).unwrap());
        let b = store.register(Bitmap::from_rgba(&RgbaImage::new(1, 1)).unwrap());
        assert_eq!(store.retain_referenced([a, a]), 1);
        assert!(store.contains(a));
        assert!(!store.contains(b));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn base_image_is_capped_at_safe_dimension() {
        let base = BaseImage::new(RgbaImage::new(MAX_SAFE_DIMENSION * 2, 16)).unwrap();
        assert_eq!(base.width(), MAX_SAFE_DIMENSION);
        assert_eq!(base.height(), 8);
    }
}
