//! The editing session: one base image, its watermark layers and the
//! resources needed to measure and draw them.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use image::{ImageFormat, RgbaImage};
use tiny_skia::Pixmap;
use tracing::{debug, warn};

use crate::bitmap::{BaseImage, Bitmap, BitmapId, BitmapStore};
use crate::error::{Error, Result};
use crate::export;
use crate::geometry::{MeasureContext, Point};
use crate::interaction::InteractionController;
use crate::load::{self, MAX_LOGO_DIMENSION};
use crate::render;
use crate::scene::Scene;
use crate::text::Typeface;
use crate::watermark::{Watermark, WatermarkId, DEFAULT_TEXT};

/// Offset applied to duplicates so they do not hide the original.
pub const DUPLICATE_OFFSET: f32 = 20.0;

/// Measurement resources, kept apart from the scene so both can be borrowed
/// at once.
#[derive(Default)]
struct Assets {
    typeface: Option<Arc<dyn Typeface>>,
    bitmaps: BitmapStore,
}

impl Assets {
    fn measure(&self) -> MeasureContext<'_> {
        MeasureContext::new(self.typeface.as_deref(), &self.bitmaps)
    }
}

/// An editing session.
///
/// Every mutation goes through a method here, which validates the input,
/// applies it and re-clamps the affected layers so each stays inside the
/// canvas. Rejected edits leave the session unchanged.
#[derive(Default)]
pub struct Compositor {
    base: Option<BaseImage>,
    scene: Scene,
    assets: Assets,
    controller: InteractionController,
}

impl Compositor {
    /// A session with no base image and no typeface.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A session that measures and draws text with `typeface`.
    #[must_use]
    pub fn with_typeface(typeface: Arc<dyn Typeface>) -> Self {
        let mut compositor = Self::new();
        compositor.assets.typeface = Some(typeface);
        compositor
    }

    /// Swap the typeface. Text extents change, so every layer is re-clamped.
    pub fn set_typeface(&mut self, typeface: Option<Arc<dyn Typeface>>) {
        self.assets.typeface = typeface;
        let ctx = self.assets.measure();
        self.scene.clamp_all(&ctx);
    }

    /// The current base image.
    #[must_use]
    pub fn base_image(&self) -> Option<&BaseImage> {
        self.base.as_ref()
    }

    /// Layers and selection.
    #[must_use]
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Decoded logos.
    #[must_use]
    pub fn bitmaps(&self) -> &BitmapStore {
        &self.assets.bitmaps
    }

    /// Pointer gesture state.
    #[must_use]
    pub fn controller(&self) -> &InteractionController {
        &self.controller
    }

    /// Look up a layer.
    #[must_use]
    pub fn watermark(&self, id: WatermarkId) -> Option<&Watermark> {
        self.scene.get(id)
    }

    /// Measurement context over this session's typeface and bitmaps.
    #[must_use]
    pub fn measure_context(&self) -> MeasureContext<'_> {
        self.assets.measure()
    }

    /// Replace the base image. The old one is released; layers are kept and
    /// re-clamped to the new bounds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContextUnavailable`] for an empty image.
    pub fn set_base_image(&mut self, image: RgbaImage) -> Result<()> {
        let base = BaseImage::new(image)?;
        debug!(
            width = base.width(),
            height = base.height(),
            "base image replaced"
        );
        let ctx = self.assets.measure();
        self.scene.set_bounds(base.bounds(), &ctx);
        self.base = Some(base);
        Ok(())
    }

    fn require_base(&self) -> Result<&BaseImage> {
        self.base.as_ref().ok_or(Error::NoBaseImage)
    }

    fn insert(&mut self, watermark: Watermark) -> Result<WatermarkId> {
        let ctx = self.assets.measure();
        self.scene.push(watermark, &ctx).inspect_err(|e| {
            warn!(error = %e, "watermark not added");
        })
    }

    /// Add a text layer with the default text, centred. It becomes active.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoBaseImage`] or [`Error::TooManyWatermarks`].
    pub fn add_text(&mut self) -> Result<WatermarkId> {
        self.add_text_with(DEFAULT_TEXT)
    }

    /// Add a centred text layer showing `text` (sanitized). It becomes active.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoBaseImage`] or [`Error::TooManyWatermarks`].
    pub fn add_text_with(&mut self, text: &str) -> Result<WatermarkId> {
        self.require_base()?;
        self.insert(Watermark::text(text, self.scene.center()))
    }

    /// Add a centred logo layer from decoded pixels. It becomes active.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoBaseImage`], [`Error::TooManyWatermarks`], or
    /// [`Error::ContextUnavailable`] for an empty image.
    pub fn add_logo(&mut self, image: RgbaImage) -> Result<WatermarkId> {
        self.require_base()?;
        self.scene.ensure_capacity()?;
        let bitmap = Bitmap::from_rgba(&load::fit_within(image, MAX_LOGO_DIMENSION))?;
        let id = self.assets.bitmaps.register(bitmap);
        self.insert(Watermark::image(id, self.scene.center()))
    }

    /// Add a logo layer whose pixels are still being decoded. It measures as
    /// the default square and is not drawn until
    /// [`attach_logo_bitmap`](Self::attach_logo_bitmap) supplies them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoBaseImage`] or [`Error::TooManyWatermarks`].
    pub fn add_pending_logo(&mut self) -> Result<(WatermarkId, BitmapId)> {
        self.require_base()?;
        self.scene.ensure_capacity()?;
        let bitmap = self.assets.bitmaps.reserve();
        let id = self.insert(Watermark::image(bitmap, self.scene.center()))?;
        Ok((id, bitmap))
    }

    /// Supply the pixels for a pending logo and re-clamp the layers using it.
    ///
    /// Returns `false` if every layer using `bitmap` was deleted meanwhile;
    /// the pixels are dropped in that case.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContextUnavailable`] for an empty image.
    pub fn attach_logo_bitmap(&mut self, bitmap: BitmapId, image: RgbaImage) -> Result<bool> {
        let decoded = Bitmap::from_rgba(&load::fit_within(image, MAX_LOGO_DIMENSION))?;
        if !self.assets.bitmaps.attach(bitmap, decoded) {
            debug!("logo arrived after its layer was removed");
            return Ok(false);
        }
        let ctx = self.assets.measure();
        self.scene.clamp_all(&ctx);
        Ok(true)
    }

    /// Copy a layer under a fresh id, slightly offset. Logos share the
    /// original's bitmap. The copy becomes active.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownWatermark`] or [`Error::TooManyWatermarks`].
    pub fn duplicate(&mut self, id: WatermarkId) -> Result<WatermarkId> {
        let source = self.scene.get(id).ok_or(Error::UnknownWatermark(id))?;
        let mut copy = source.duplicate();
        copy.set_position(source.position() + Point::new(DUPLICATE_OFFSET, DUPLICATE_OFFSET));
        self.insert(copy)
    }

    /// Remove a layer and release its bitmap if nothing else uses it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownWatermark`].
    pub fn delete(&mut self, id: WatermarkId) -> Result<()> {
        self.scene.remove(id)?;
        self.release_unused_bitmaps();
        Ok(())
    }

    /// Remove every layer and release all logos.
    pub fn remove_all(&mut self) {
        self.scene.clear();
        self.release_unused_bitmaps();
    }

    fn release_unused_bitmaps(&mut self) {
        let referenced: Vec<BitmapId> = self.scene.bitmap_refs().collect();
        self.assets.bitmaps.retain_referenced(referenced);
    }

    /// Change or clear the selection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownWatermark`].
    pub fn select(&mut self, id: Option<WatermarkId>) -> Result<()> {
        self.scene.select(id)
    }

    fn edit(
        &mut self,
        id: WatermarkId,
        apply: impl FnOnce(&mut Watermark) -> Result<()>,
    ) -> Result<()> {
        let ctx = self.assets.measure();
        let watermark = self
            .scene
            .get_mut(id)
            .ok_or(Error::UnknownWatermark(id))?;
        apply(watermark).inspect_err(|e| warn!(%id, error = %e, "edit rejected"))?;
        self.scene.clamp(id, &ctx);
        Ok(())
    }

    /// Replace a text layer's content (sanitized).
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownWatermark`] or [`Error::WrongKind`].
    pub fn set_text(&mut self, id: WatermarkId, text: &str) -> Result<()> {
        self.edit(id, |w| w.set_text(text))
    }

    /// Set a text layer's color from `#RRGGBB`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownWatermark`], [`Error::InvalidColor`] or
    /// [`Error::WrongKind`].
    pub fn set_color(&mut self, id: WatermarkId, color: &str) -> Result<()> {
        self.edit(id, |w| w.set_color(color))
    }

    /// Set a layer's scale factor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownWatermark`] or [`Error::OutOfRange`].
    pub fn set_scale(&mut self, id: WatermarkId, scale: f32) -> Result<()> {
        self.edit(id, |w| w.set_scale(scale))
    }

    /// Set a layer's rotation in degrees.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownWatermark`] or [`Error::OutOfRange`].
    pub fn set_rotation(&mut self, id: WatermarkId, degrees: f32) -> Result<()> {
        self.edit(id, |w| w.set_rotation(degrees))
    }

    /// Set a layer's opacity percentage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownWatermark`] or [`Error::OutOfRange`].
    pub fn set_opacity(&mut self, id: WatermarkId, percent: u8) -> Result<()> {
        self.edit(id, |w| w.set_opacity(percent))
    }

    /// Move a layer's centre; the result is clamped into the canvas.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownWatermark`].
    pub fn set_position(&mut self, id: WatermarkId, position: Point) -> Result<()> {
        self.edit(id, |w| {
            w.set_position(position);
            Ok(())
        })
    }

    /// Set the ratio of displayed size to internal pixel size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] for non-positive or non-finite values.
    pub fn set_display_scale(&mut self, scale: f32) -> Result<()> {
        self.controller.set_display_scale(scale)
    }

    /// Forward a pointer press in display pixels. Returns the hit layer.
    pub fn pointer_down(&mut self, screen: Point) -> Option<WatermarkId> {
        let ctx = self.assets.measure();
        self.controller.pointer_down(screen, &mut self.scene, &ctx)
    }

    /// Forward a pointer move. Returns `true` when a frame must be scheduled.
    pub fn pointer_move(&mut self, screen: Point) -> bool {
        self.controller.pointer_move(screen)
    }

    /// Run the per-frame update. Returns whether a redraw is needed.
    pub fn on_frame(&mut self) -> bool {
        let ctx = self.assets.measure();
        self.controller.on_frame(&mut self.scene, &ctx)
    }

    /// Forward a pointer release. Returns whether a drag ended.
    pub fn pointer_up(&mut self) -> bool {
        let ctx = self.assets.measure();
        self.controller.pointer_up(&mut self.scene, &ctx)
    }

    /// Forward a pointer cancellation. Returns whether a drag ended.
    pub fn pointer_cancel(&mut self) -> bool {
        let ctx = self.assets.measure();
        self.controller.pointer_cancel(&mut self.scene, &ctx)
    }

    /// Render the scene, with the selection outline if requested.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoBaseImage`] or [`Error::ContextUnavailable`].
    pub fn render(&self, show_outline: bool) -> Result<Pixmap> {
        let base = self.require_base()?;
        render::render_scene(base, &self.scene, &self.assets.measure(), show_outline)
    }

    /// The finished image: rendered without the selection outline.
    ///
    /// # Errors
    ///
    /// As [`render`](Self::render).
    pub fn export_image(&self) -> Result<RgbaImage> {
        Ok(render::to_rgba_image(&self.render(false)?))
    }

    /// Export to a file whose extension picks the format.
    ///
    /// # Errors
    ///
    /// As [`render`](Self::render), plus encoding and I/O errors.
    pub fn export_to_path(&self, path: &Path) -> Result<()> {
        export::save_image(&self.export_image()?, path)
    }

    /// Export as PNG bytes, ready to offer as a download.
    ///
    /// # Errors
    ///
    /// As [`render`](Self::render), plus encoding errors.
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        self.export_image()?.write_to(&mut buf, ImageFormat::Png)?;
        Ok(buf.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry;
    use crate::scene::MAX_WATERMARKS;
    use crate::text::testing::FixedAdvance;
    use image::Rgba;

    fn session(w: u32, h: u32) -> Compositor {
        let mut c = Compositor::with_typeface(Arc::new(FixedAdvance::new(10.0)));
        c.set_base_image(RgbaImage::from_pixel(w, h, Rgba([0, 0, 0, 255])))
            .unwrap();
        c
    }

    #[test]
    fn edits_need_a_base_image() {
        let mut c = Compositor::new();
        assert!(matches!(c.add_text(), Err(Error::NoBaseImage)));
        assert!(matches!(c.add_pending_logo(), Err(Error::NoBaseImage)));
        assert!(matches!(c.render(false), Err(Error::NoBaseImage)));
    }

    #[test]
    fn new_text_is_centred_and_active() {
        let mut c = session(800, 600);
        let id = c.add_text().unwrap();
        let wm = c.watermark(id).unwrap();
        assert_eq!(wm.position(), Point::new(400.0, 300.0));
        assert_eq!(wm.text_content(), Some(DEFAULT_TEXT));
        assert_eq!(c.scene().active(), Some(id));
    }

    #[test]
    fn cap_rejects_logo_without_leaking_bitmap() {
        let mut c = session(400, 400);
        for _ in 0..MAX_WATERMARKS {
            c.add_text().unwrap();
        }
        let err = c.add_logo(RgbaImage::new(4, 4));
        assert!(matches!(err, Err(Error::TooManyWatermarks { .. })));
        assert!(c.bitmaps().is_empty());
    }

    #[test]
    fn duplicate_offsets_and_shares_bitmap() {
        let mut c = session(800, 600);
        let logo = c.add_logo(RgbaImage::new(20, 10)).unwrap();
        let copy = c.duplicate(logo).unwrap();

        let (a, b) = (c.watermark(logo).unwrap(), c.watermark(copy).unwrap());
        assert_ne!(a.id(), b.id());
        assert_eq!(a.bitmap(), b.bitmap());
        assert_eq!(b.position(), Point::new(420.0, 320.0));
        assert_eq!(c.bitmaps().len(), 1);
        assert_eq!(c.scene().active(), Some(copy));
    }

    #[test]
    fn bitmap_released_only_when_last_reference_goes() {
        let mut c = session(800, 600);
        let logo = c.add_logo(RgbaImage::new(20, 10)).unwrap();
        let copy = c.duplicate(logo).unwrap();

        c.delete(logo).unwrap();
        assert_eq!(c.bitmaps().len(), 1);
        c.delete(copy).unwrap();
        assert!(c.bitmaps().is_empty());
    }

    #[test]
    fn remove_all_clears_layers_and_bitmaps() {
        let mut c = session(800, 600);
        c.add_text().unwrap();
        c.add_logo(RgbaImage::new(3, 3)).unwrap();
        c.add_pending_logo().unwrap();
        c.remove_all();
        assert!(c.scene().is_empty());
        assert_eq!(c.scene().active(), None);
        assert!(c.bitmaps().is_empty());
    }

    #[test]
    fn pending_logo_reclamps_when_pixels_arrive() {
        let mut c = session(400, 400);
        let (id, bitmap) = c.add_pending_logo().unwrap();
        c.set_position(id, Point::new(0.0, 0.0)).unwrap();
        assert_eq!(c.watermark(id).unwrap().position(), Point::new(75.0, 75.0));

        assert!(c.attach_logo_bitmap(bitmap, RgbaImage::new(300, 100)).unwrap());
        // Now 150x50: the vertical half-extent shrank to 25.
        c.set_position(id, Point::new(0.0, 0.0)).unwrap();
        assert_eq!(c.watermark(id).unwrap().position(), Point::new(75.0, 25.0));
    }

    #[test]
    fn late_logo_for_deleted_layer_is_dropped() {
        let mut c = session(400, 400);
        let (id, bitmap) = c.add_pending_logo().unwrap();
        c.delete(id).unwrap();
        assert!(!c.attach_logo_bitmap(bitmap, RgbaImage::new(5, 5)).unwrap());
        assert!(c.bitmaps().is_empty());
    }

    #[test]
    fn rejected_color_leaves_layer_untouched() {
        let mut c = session(800, 600);
        let id = c.add_text().unwrap();
        let before = c.watermark(id).unwrap().clone();
        assert!(matches!(
            c.set_color(id, "#12345"),
            Err(Error::InvalidColor(_))
        ));
        assert_eq!(c.watermark(id).unwrap(), &before);
    }

    #[test]
    fn scaling_up_near_edge_reclamps() {
        let mut c = session(800, 600);
        let id = c.add_text_with("edge").unwrap();
        c.set_position(id, Point::new(800.0, 600.0)).unwrap();
        c.set_scale(id, 3.0).unwrap();

        let ctx = c.measure_context();
        let wm = c.watermark(id).unwrap();
        let half = geometry::measure_rotated_half_extent(wm, &ctx);
        assert!((wm.position().x - (800.0 - half.width)).abs() < 1e-3);
        assert!((wm.position().y - (600.0 - half.height)).abs() < 1e-3);
    }

    #[test]
    fn dragging_rotated_layer_into_corner_uses_rotated_extent() {
        let mut c = session(800, 600);
        let id = c.add_text().unwrap();
        c.set_rotation(id, 45.0).unwrap();

        assert_eq!(c.pointer_down(Point::new(400.0, 300.0)), Some(id));
        assert!(c.pointer_move(Point::new(0.0, 0.0)));
        assert!(c.on_frame());
        assert!(c.pointer_up());

        let ctx = c.measure_context();
        let wm = c.watermark(id).unwrap();
        let half = geometry::measure_rotated_half_extent(wm, &ctx);
        let logical = geometry::measure_logical_half_extent(wm, &ctx);
        assert!(half.width > logical.width);
        assert!((wm.position().x - half.width).abs() < 1e-3);
        assert!((wm.position().y - half.height).abs() < 1e-3);
    }

    #[test]
    fn replacing_base_reclamps_layers() {
        let mut c = session(800, 600);
        let id = c.add_text().unwrap();
        c.set_position(id, Point::new(700.0, 500.0)).unwrap();
        c.set_base_image(RgbaImage::new(200, 100)).unwrap();
        let pos = c.watermark(id).unwrap().position();
        assert!(pos.x <= 200.0 && pos.y <= 100.0);
        assert_eq!(c.base_image().unwrap().width(), 200);
    }

    #[test]
    fn encode_png_round_trips_dimensions() {
        let mut c = session(64, 48);
        c.add_text().unwrap();
        let png = c.encode_png().unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }
}
