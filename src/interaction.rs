//! Pointer gestures: selection, dragging and per-frame coalescing.
//!
//! Pointer coordinates arrive in display pixels and are divided by the
//! display scale before they touch geometry. Moves are cached and applied at
//! most once per animation frame by [`InteractionController::on_frame`].

use tracing::debug;

use crate::error::{Error, Result};
use crate::geometry::{self, MeasureContext, Point};
use crate::scene::Scene;
use crate::watermark::WatermarkId;

/// Where a gesture is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragState {
    /// No gesture in progress.
    Idle,
    /// A watermark is being dragged.
    Dragging {
        /// The dragged watermark.
        target: WatermarkId,
        /// Last applied pointer position, in display pixels.
        last_pointer: Point,
    },
}

/// Turns pointer events into selection changes and position updates.
#[derive(Debug, Clone)]
pub struct InteractionController {
    state: DragState,
    pending: Option<Point>,
    display_scale: f32,
}

impl Default for InteractionController {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionController {
    /// An idle controller with a 1:1 display scale.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: DragState::Idle,
            pending: None,
            display_scale: 1.0,
        }
    }

    /// Current gesture state.
    #[must_use]
    pub fn state(&self) -> DragState {
        self.state
    }

    /// Whether a drag is in progress.
    #[must_use]
    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    /// Whether a move is waiting for the next frame.
    #[must_use]
    pub fn has_pending_frame(&self) -> bool {
        self.pending.is_some()
    }

    /// Displayed size divided by internal size.
    #[must_use]
    pub fn display_scale(&self) -> f32 {
        self.display_scale
    }

    /// Update the display scale after the view is resized.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] for zero, negative or non-finite values.
    pub fn set_display_scale(&mut self, scale: f32) -> Result<()> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(Error::OutOfRange {
                field: "display scale",
                value: scale,
                min: f32::MIN_POSITIVE,
                max: f32::MAX,
            });
        }
        self.display_scale = scale;
        Ok(())
    }

    /// Convert a display-pixel point to base-image pixels.
    #[must_use]
    pub fn to_image_space(&self, screen: Point) -> Point {
        screen.scaled_down(self.display_scale)
    }

    /// Select the topmost watermark under the pointer and start dragging it,
    /// or clear the selection on a miss. Ignored while a drag is in progress.
    ///
    /// Returns the hit watermark.
    pub fn pointer_down(
        &mut self,
        screen: Point,
        scene: &mut Scene,
        ctx: &MeasureContext<'_>,
    ) -> Option<WatermarkId> {
        if self.is_dragging() {
            return None;
        }
        let point = self.to_image_space(screen);
        let hit = geometry::topmost_hit(point, scene.watermarks(), ctx);
        if let Err(e) = scene.select(hit) {
            debug!(error = %e, "selection not changed");
        }
        if let Some(target) = hit {
            debug!(%target, x = point.x, y = point.y, "drag started");
            self.state = DragState::Dragging {
                target,
                last_pointer: screen,
            };
        }
        hit
    }

    /// Record the latest pointer position during a drag.
    ///
    /// Returns `true` when the caller must schedule a frame callback; further
    /// moves before that frame only replace the cached position.
    pub fn pointer_move(&mut self, screen: Point) -> bool {
        if !self.is_dragging() {
            return false;
        }
        let schedule = self.pending.is_none();
        self.pending = Some(screen);
        schedule
    }

    /// Apply the cached move, if any. Returns whether the scene changed.
    pub fn on_frame(&mut self, scene: &mut Scene, ctx: &MeasureContext<'_>) -> bool {
        let Some(latest) = self.pending.take() else {
            return false;
        };
        let DragState::Dragging {
            target,
            last_pointer,
        } = self.state
        else {
            return false;
        };

        let bounds = scene.bounds();
        let Some(watermark) = scene.get_mut(target) else {
            debug!(%target, "dragged watermark disappeared");
            self.state = DragState::Idle;
            return false;
        };

        let delta = (latest - last_pointer).scaled_down(self.display_scale);
        let half = geometry::measure_rotated_half_extent(watermark, ctx);
        let moved = geometry::clamp_center(watermark.position() + delta, half, bounds);
        let changed = moved != watermark.position();
        watermark.set_position(moved);
        self.state = DragState::Dragging {
            target,
            last_pointer: latest,
        };
        changed
    }

    /// End the drag. Any move still waiting for a frame is dropped, and the
    /// dragged watermark is clamped once more. Returns whether a drag ended.
    pub fn pointer_up(&mut self, scene: &mut Scene, ctx: &MeasureContext<'_>) -> bool {
        self.pending = None;
        let DragState::Dragging { target, .. } = self.state else {
            return false;
        };
        self.state = DragState::Idle;
        scene.clamp(target, ctx);
        debug!(%target, "drag ended");
        true
    }

    /// Abort the drag (e.g. a touch interruption). Follows the pointer-up path.
    pub fn pointer_cancel(&mut self, scene: &mut Scene, ctx: &MeasureContext<'_>) -> bool {
        self.pointer_up(scene, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::BitmapStore;
    use crate::geometry::Size;
    use crate::text::testing::FixedAdvance;
    use crate::watermark::Watermark;

    fn setup(face: &FixedAdvance, store: &BitmapStore) -> (Scene, WatermarkId) {
        let ctx = MeasureContext::new(Some(face), store);
        let mut scene = Scene::new(Size::new(800.0, 600.0));
        let id = scene
            .push(Watermark::text("label", Point::new(400.0, 300.0)), &ctx)
            .unwrap();
        scene.select(None).unwrap();
        (scene, id)
    }

    #[test]
    fn miss_clears_selection_and_stays_idle() {
        let store = BitmapStore::new();
        let face = FixedAdvance::new(10.0);
        let ctx = MeasureContext::new(Some(&face), &store);
        let (mut scene, id) = setup(&face, &store);
        scene.select(Some(id)).unwrap();

        let mut ctl = InteractionController::new();
        assert_eq!(ctl.pointer_down(Point::new(5.0, 5.0), &mut scene, &ctx), None);
        assert_eq!(scene.active(), None);
        assert_eq!(ctl.state(), DragState::Idle);
        assert!(!ctl.pointer_move(Point::new(6.0, 6.0)));
    }

    #[test]
    fn hit_selects_and_starts_drag() {
        let store = BitmapStore::new();
        let face = FixedAdvance::new(10.0);
        let ctx = MeasureContext::new(Some(&face), &store);
        let (mut scene, id) = setup(&face, &store);

        let mut ctl = InteractionController::new();
        assert_eq!(ctl.pointer_down(Point::new(400.0, 300.0), &mut scene, &ctx), Some(id));
        assert_eq!(scene.active(), Some(id));
        assert!(ctl.is_dragging());
    }

    #[test]
    fn moves_coalesce_into_one_update_per_frame() {
        let store = BitmapStore::new();
        let face = FixedAdvance::new(10.0);
        let ctx = MeasureContext::new(Some(&face), &store);
        let (mut scene, id) = setup(&face, &store);
        let mut ctl = InteractionController::new();
        ctl.pointer_down(Point::new(400.0, 300.0), &mut scene, &ctx);

        assert!(ctl.pointer_move(Point::new(410.0, 300.0)));
        assert!(!ctl.pointer_move(Point::new(420.0, 305.0)));
        assert!(!ctl.pointer_move(Point::new(430.0, 310.0)));
        assert!(ctl.has_pending_frame());

        assert!(ctl.on_frame(&mut scene, &ctx));
        assert_eq!(scene.get(id).unwrap().position(), Point::new(430.0, 310.0));
        assert!(!ctl.on_frame(&mut scene, &ctx));
        assert!(ctl.pointer_move(Point::new(440.0, 310.0)));
    }

    #[test]
    fn screen_deltas_are_divided_by_display_scale() {
        let store = BitmapStore::new();
        let face = FixedAdvance::new(10.0);
        let ctx = MeasureContext::new(Some(&face), &store);
        let (mut scene, id) = setup(&face, &store);
        let mut ctl = InteractionController::new();
        ctl.set_display_scale(0.5).unwrap();

        // (200, 150) on screen is the watermark centre (400, 300) in the image.
        assert_eq!(ctl.pointer_down(Point::new(200.0, 150.0), &mut scene, &ctx), Some(id));
        ctl.pointer_move(Point::new(210.0, 140.0));
        ctl.on_frame(&mut scene, &ctx);
        assert_eq!(scene.get(id).unwrap().position(), Point::new(420.0, 280.0));
    }

    #[test]
    fn release_drops_pending_move_and_returns_idle() {
        let store = BitmapStore::new();
        let face = FixedAdvance::new(10.0);
        let ctx = MeasureContext::new(Some(&face), &store);
        let (mut scene, id) = setup(&face, &store);
        let mut ctl = InteractionController::new();
        ctl.pointer_down(Point::new(400.0, 300.0), &mut scene, &ctx);
        ctl.pointer_move(Point::new(500.0, 300.0));

        assert!(ctl.pointer_cancel(&mut scene, &ctx));
        assert_eq!(ctl.state(), DragState::Idle);
        assert!(!ctl.has_pending_frame());
        assert!(!ctl.on_frame(&mut scene, &ctx));
        assert_eq!(scene.get(id).unwrap().position(), Point::new(400.0, 300.0));
        assert!(!ctl.pointer_up(&mut scene, &ctx));
    }

    #[test]
    fn second_pointer_down_is_ignored_while_dragging() {
        let store = BitmapStore::new();
        let face = FixedAdvance::new(10.0);
        let ctx = MeasureContext::new(Some(&face), &store);
        let (mut scene, id) = setup(&face, &store);
        let mut ctl = InteractionController::new();
        ctl.pointer_down(Point::new(400.0, 300.0), &mut scene, &ctx);
        assert_eq!(ctl.pointer_down(Point::new(1.0, 1.0), &mut scene, &ctx), None);
        assert_eq!(scene.active(), Some(id));
    }

    #[test]
    fn drag_stops_when_target_is_deleted() {
        let store = BitmapStore::new();
        let face = FixedAdvance::new(10.0);
        let ctx = MeasureContext::new(Some(&face), &store);
        let (mut scene, id) = setup(&face, &store);
        let mut ctl = InteractionController::new();
        ctl.pointer_down(Point::new(400.0, 300.0), &mut scene, &ctx);
        scene.remove(id).unwrap();
        ctl.pointer_move(Point::new(420.0, 300.0));
        assert!(!ctl.on_frame(&mut scene, &ctx));
        assert_eq!(ctl.state(), DragState::Idle);
    }

    #[test]
    fn display_scale_must_be_positive() {
        let mut ctl = InteractionController::new();
        assert!(ctl.set_display_scale(0.0).is_err());
        assert!(ctl.set_display_scale(f32::NAN).is_err());
        assert!((ctl.display_scale() - 1.0).abs() < f32::EPSILON);
    }
}
