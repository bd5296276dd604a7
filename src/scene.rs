//! The editing session's mutable state: ordered watermarks, selection and
//! canvas bounds.

use tracing::debug;

use crate::bitmap::BitmapId;
use crate::error::{Error, Result};
use crate::geometry::{self, MeasureContext, Point, Size};
use crate::watermark::{Watermark, WatermarkId};

/// Hard cap on the number of watermarks in one scene.
pub const MAX_WATERMARKS: usize = 20;

/// Ordered watermark layers plus the active selection.
///
/// Later entries paint on top and are hit-tested first. The active id, when
/// set, always refers to a watermark in the list.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    watermarks: Vec<Watermark>,
    active: Option<WatermarkId>,
    bounds: Size,
}

impl Scene {
    /// An empty scene over a canvas of `bounds`.
    #[must_use]
    pub fn new(bounds: Size) -> Self {
        Self {
            watermarks: Vec::new(),
            active: None,
            bounds,
        }
    }

    /// Canvas size in base-image pixels.
    #[must_use]
    pub fn bounds(&self) -> Size {
        self.bounds
    }

    /// Canvas midpoint, where new watermarks are placed.
    #[must_use]
    pub fn center(&self) -> Point {
        self.bounds.center()
    }

    /// Layers in paint order.
    #[must_use]
    pub fn watermarks(&self) -> &[Watermark] {
        &self.watermarks
    }

    /// Number of layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.watermarks.len()
    }

    /// Whether the scene has no layers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.watermarks.is_empty()
    }

    /// Look up a layer.
    #[must_use]
    pub fn get(&self, id: WatermarkId) -> Option<&Watermark> {
        self.watermarks.iter().find(|w| w.id() == id)
    }

    pub(crate) fn get_mut(&mut self, id: WatermarkId) -> Option<&mut Watermark> {
        self.watermarks.iter_mut().find(|w| w.id() == id)
    }

    /// The selected layer's id.
    #[must_use]
    pub fn active(&self) -> Option<WatermarkId> {
        self.active
    }

    /// The selected layer.
    #[must_use]
    pub fn active_watermark(&self) -> Option<&Watermark> {
        self.active.and_then(|id| self.get(id))
    }

    /// Change or clear the selection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownWatermark`] if `id` is not in the scene.
    pub fn select(&mut self, id: Option<WatermarkId>) -> Result<()> {
        if let Some(id) = id {
            if self.get(id).is_none() {
                return Err(Error::UnknownWatermark(id));
            }
        }
        self.active = id;
        Ok(())
    }

    /// Every bitmap still referenced by a logo layer.
    pub fn bitmap_refs(&self) -> impl Iterator<Item = BitmapId> + '_ {
        self.watermarks.iter().filter_map(Watermark::bitmap)
    }

    /// Fail if another layer would exceed [`MAX_WATERMARKS`].
    pub(crate) fn ensure_capacity(&self) -> Result<()> {
        if self.watermarks.len() >= MAX_WATERMARKS {
            return Err(Error::TooManyWatermarks {
                max: MAX_WATERMARKS,
            });
        }
        Ok(())
    }

    /// Clamp, append on top and select a new layer.
    pub(crate) fn push(
        &mut self,
        mut watermark: Watermark,
        ctx: &MeasureContext<'_>,
    ) -> Result<WatermarkId> {
        self.ensure_capacity()?;
        geometry::clamp_watermark(&mut watermark, self.bounds, ctx);
        let id = watermark.id();
        debug!(%id, kind = watermark.kind().label(), "added watermark");
        self.watermarks.push(watermark);
        self.active = Some(id);
        Ok(id)
    }

    /// Remove a layer, clearing the selection if it was active.
    pub(crate) fn remove(&mut self, id: WatermarkId) -> Result<Watermark> {
        let index = self
            .watermarks
            .iter()
            .position(|w| w.id() == id)
            .ok_or(Error::UnknownWatermark(id))?;
        if self.active == Some(id) {
            self.active = None;
        }
        debug!(%id, "deleted watermark");
        Ok(self.watermarks.remove(index))
    }

    /// Remove every layer.
    pub(crate) fn clear(&mut self) {
        self.watermarks.clear();
        self.active = None;
    }

    /// Re-clamp one layer against the current bounds.
    pub(crate) fn clamp(&mut self, id: WatermarkId, ctx: &MeasureContext<'_>) {
        let bounds = self.bounds;
        if let Some(wm) = self.get_mut(id) {
            geometry::clamp_watermark(wm, bounds, ctx);
        }
    }

    /// Replace the bounds and re-clamp every layer.
    pub(crate) fn set_bounds(&mut self, bounds: Size, ctx: &MeasureContext<'_>) {
        self.bounds = bounds;
        self.clamp_all(ctx);
    }

    /// Re-clamp every layer, after anything that changes extents globally.
    pub(crate) fn clamp_all(&mut self, ctx: &MeasureContext<'_>) {
        for wm in &mut self.watermarks {
            geometry::clamp_watermark(wm, self.bounds, ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::BitmapStore;

    #[test]
    fn push_selects_and_clamps() {
        let store = BitmapStore::new();
        let ctx = MeasureContext::new(None, &store);
        let mut scene = Scene::new(Size::new(800.0, 600.0));
        let id = scene
            .push(Watermark::text("x", Point::new(-100.0, 900.0)), &ctx)
            .unwrap();
        assert_eq!(scene.active(), Some(id));
        let pos = scene.get(id).unwrap().position();
        assert!(pos.x > 0.0 && pos.y < 600.0);
    }

    #[test]
    fn cap_is_enforced_without_mutation() {
        let store = BitmapStore::new();
        let ctx = MeasureContext::new(None, &store);
        let mut scene = Scene::new(Size::new(800.0, 600.0));
        for _ in 0..MAX_WATERMARKS {
            scene
                .push(Watermark::text("x", scene.center()), &ctx)
                .unwrap();
        }
        let err = scene.push(Watermark::text("x", scene.center()), &ctx);
        assert!(matches!(err, Err(Error::TooManyWatermarks { max }) if max == MAX_WATERMARKS));
        assert_eq!(scene.len(), MAX_WATERMARKS);
    }

    #[test]
    fn removing_active_clears_selection() {
        let store = BitmapStore::new();
        let ctx = MeasureContext::new(None, &store);
        let mut scene = Scene::new(Size::new(100.0, 100.0));
        let a = scene.push(Watermark::text("a", scene.center()), &ctx).unwrap();
        let b = scene.push(Watermark::text("b", scene.center()), &ctx).unwrap();

        scene.remove(a).unwrap();
        assert_eq!(scene.active(), Some(b));
        scene.remove(b).unwrap();
        assert_eq!(scene.active(), None);
        assert!(matches!(scene.remove(b), Err(Error::UnknownWatermark(_))));
    }

    #[test]
    fn selecting_unknown_id_is_rejected() {
        let mut scene = Scene::new(Size::new(10.0, 10.0));
        assert!(scene.select(Some(WatermarkId::new())).is_err());
        assert!(scene.select(None).is_ok());
    }
}
