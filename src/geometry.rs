//! Geometry for watermark layers: extents, rotated bounding boxes, clamping
//! and hit-testing.
//!
//! All coordinates are base-image pixels. Rotation is clockwise-positive in
//! the y-down image frame, matching the renderer's transforms.

use std::ops::{Add, Sub};

use crate::bitmap::BitmapStore;
use crate::text::Typeface;
use crate::watermark::{Watermark, WatermarkId, WatermarkKind};

/// Font size text watermarks are measured and drawn at before scaling.
pub const BASE_FONT_SIZE: f32 = 50.0;
/// Text box height as a multiple of [`BASE_FONT_SIZE`].
pub const TEXT_HEIGHT_FACTOR: f32 = 1.2;
/// Width used when text measures narrower than this (or not at all).
pub const MIN_TEXT_WIDTH: f32 = 40.0;
/// Side of the square a logo's natural aspect ratio is fitted into.
pub const LOGO_BOX: f32 = 150.0;

/// A point or offset in base-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: f32,
    /// Vertical coordinate, growing downwards.
    pub y: f32,
}

impl Point {
    /// Construct a point.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Divide both coordinates by `factor`.
    #[must_use]
    pub fn scaled_down(self, factor: f32) -> Self {
        Self::new(self.x / factor, self.y / factor)
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    /// Horizontal extent.
    pub width: f32,
    /// Vertical extent.
    pub height: f32,
}

impl Size {
    /// Construct a size.
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// The centre of a box of this size anchored at the origin.
    #[must_use]
    pub fn center(self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }

    /// Half of each dimension.
    #[must_use]
    pub fn half(self) -> HalfExtent {
        HalfExtent::new(self.width / 2.0, self.height / 2.0)
    }
}

/// Half-width and half-height of a box centred on a watermark.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HalfExtent {
    /// Half of the full width.
    pub width: f32,
    /// Half of the full height.
    pub height: f32,
}

impl HalfExtent {
    /// Construct a half-extent.
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// What measurement needs besides the watermark itself: a typeface for text
/// and the bitmap table for logos.
#[derive(Clone, Copy)]
pub struct MeasureContext<'a> {
    /// Typeface used to measure text; `None` measures every text as empty.
    pub typeface: Option<&'a dyn Typeface>,
    /// Decoded logo bitmaps.
    pub bitmaps: &'a BitmapStore,
}

impl<'a> MeasureContext<'a> {
    /// Bundle a typeface and bitmap table.
    #[must_use]
    pub fn new(typeface: Option<&'a dyn Typeface>, bitmaps: &'a BitmapStore) -> Self {
        Self { typeface, bitmaps }
    }
}

/// Degrees to radians; the only angle conversion used in the crate.
#[must_use]
pub fn degrees_to_radians(degrees: f32) -> f32 {
    degrees * std::f32::consts::PI / 180.0
}

/// Unscaled size of a watermark's content.
///
/// Text is as wide as its measured advance (at least [`MIN_TEXT_WIDTH`]) and
/// [`TEXT_HEIGHT_FACTOR`] font sizes tall. Logos fit their aspect ratio into a
/// [`LOGO_BOX`] square, or fill the square while the bitmap is unavailable.
#[must_use]
pub fn natural_size(watermark: &Watermark, ctx: &MeasureContext<'_>) -> Size {
    match watermark.kind() {
        WatermarkKind::Text { text, .. } => {
            let measured = ctx
                .typeface
                .map_or(0.0, |face| face.advance_width(text, BASE_FONT_SIZE));
            let width = if measured.is_finite() {
                measured.max(MIN_TEXT_WIDTH)
            } else {
                MIN_TEXT_WIDTH
            };
            Size::new(width, BASE_FONT_SIZE * TEXT_HEIGHT_FACTOR)
        }
        WatermarkKind::Image { bitmap } => match ctx.bitmaps.dimensions(*bitmap) {
            Some((w, h)) if w > 0 && h > 0 => fit_into_box(w, h, LOGO_BOX),
            _ => Size::new(LOGO_BOX, LOGO_BOX),
        },
    }
}

#[allow(clippy::cast_precision_loss)]
fn fit_into_box(width: u32, height: u32, side: f32) -> Size {
    let (w, h) = (width as f32, height as f32);
    if w >= h {
        Size::new(side, side * h / w)
    } else {
        Size::new(side * w / h, side)
    }
}

/// Half-extent of the unrotated, scaled watermark.
#[must_use]
pub fn measure_logical_half_extent(watermark: &Watermark, ctx: &MeasureContext<'_>) -> HalfExtent {
    let natural = natural_size(watermark, ctx);
    let scale = watermark.scale();
    HalfExtent::new(natural.width * scale / 2.0, natural.height * scale / 2.0)
}

/// Half-extent of the axis-aligned box around `logical` rotated by `degrees`.
#[must_use]
pub fn rotated_half_extent(logical: HalfExtent, degrees: f32) -> HalfExtent {
    let (sin, cos) = degrees_to_radians(degrees).sin_cos();
    let w = logical.width * 2.0;
    let h = logical.height * 2.0;
    let rotated_w = (w * cos).abs() + (h * sin).abs();
    let rotated_h = (w * sin).abs() + (h * cos).abs();
    HalfExtent::new(rotated_w / 2.0, rotated_h / 2.0)
}

/// Half-extent of the watermark's rotated bounding box. Used for clamping and
/// for the selection outline.
#[must_use]
pub fn measure_rotated_half_extent(watermark: &Watermark, ctx: &MeasureContext<'_>) -> HalfExtent {
    rotated_half_extent(
        measure_logical_half_extent(watermark, ctx),
        watermark.rotation_degrees(),
    )
}

/// Keep a box of `half` extent centred at `position` inside `bounds`.
///
/// An axis on which the box is larger than the canvas pins to the canvas
/// midpoint.
#[must_use]
pub fn clamp_center(position: Point, half: HalfExtent, bounds: Size) -> Point {
    Point::new(
        clamp_axis(position.x, half.width, bounds.width),
        clamp_axis(position.y, half.height, bounds.height),
    )
}

fn clamp_axis(value: f32, half: f32, bound: f32) -> f32 {
    if !half.is_finite() || half * 2.0 > bound {
        return bound / 2.0;
    }
    if !value.is_finite() {
        return bound / 2.0;
    }
    value.min(bound - half).max(half)
}

/// Clamp a watermark's position using its current rotated bounding box.
pub fn clamp_watermark(watermark: &mut Watermark, bounds: Size, ctx: &MeasureContext<'_>) {
    let half = measure_rotated_half_extent(watermark, ctx);
    let clamped = clamp_center(watermark.position(), half, bounds);
    watermark.set_position(clamped);
}

/// Whether `point` lies inside a box of `half` extent centred at `center` and
/// rotated by `degrees`. Edges count as inside.
#[must_use]
pub fn hit_test_local(point: Point, center: Point, degrees: f32, half: HalfExtent) -> bool {
    let d = point - center;
    let (sin, cos) = degrees_to_radians(degrees).sin_cos();
    let local_x = d.x * cos + d.y * sin;
    let local_y = -d.x * sin + d.y * cos;
    local_x.abs() <= half.width && local_y.abs() <= half.height
}

/// Whether `point` hits the watermark's actual (rotated) shape rather than its
/// bounding box.
#[must_use]
pub fn hit_test(point: Point, watermark: &Watermark, ctx: &MeasureContext<'_>) -> bool {
    hit_test_local(
        point,
        watermark.position(),
        watermark.rotation_degrees(),
        measure_logical_half_extent(watermark, ctx),
    )
}

/// The topmost watermark under `point`: the last in paint order that hits.
#[must_use]
pub fn topmost_hit(
    point: Point,
    watermarks: &[Watermark],
    ctx: &MeasureContext<'_>,
) -> Option<WatermarkId> {
    watermarks
        .iter()
        .rev()
        .find(|wm| hit_test(point, wm, ctx))
        .map(Watermark::id)
}
