//! Compositing a scene into a pixel buffer.
//!
//! Rendering never mutates the scene and is deterministic: the same inputs
//! always give the same bytes. The selection outline is an editing aid only;
//! exports render with `show_outline = false`.

use image::{GrayImage, Rgba, RgbaImage};
use tiny_skia::{
    BlendMode, ColorU8, FilterQuality, Paint, PathBuilder, Pixmap, PixmapPaint, Rect, Stroke,
    StrokeDash, Transform,
};
use tracing::warn;

use crate::bitmap::BaseImage;
use crate::error::{Error, Result};
use crate::geometry::{self, MeasureContext, BASE_FONT_SIZE};
use crate::scene::Scene;
use crate::watermark::{Rgb, Watermark, WatermarkKind};

/// Stroke width of the selection outline, in image pixels.
pub const OUTLINE_WIDTH: f32 = 2.0;
/// Dash pattern (on, off) of the selection outline.
pub const OUTLINE_DASH: [f32; 2] = [6.0, 4.0];
/// Selection outline color, semi-transparent blue.
pub const OUTLINE_COLOR: [u8; 4] = [59, 130, 246, 204];

/// Composite `base` and every layer of `scene`, optionally outlining the
/// active layer.
///
/// Layers that cannot be drawn yet (text without a typeface, logos whose
/// bitmap has not arrived) are skipped without affecting the others.
///
/// # Errors
///
/// Returns [`Error::ContextUnavailable`] if the output buffer cannot be
/// allocated. Nothing is drawn in that case.
pub fn render_scene(
    base: &BaseImage,
    scene: &Scene,
    ctx: &MeasureContext<'_>,
    show_outline: bool,
) -> Result<Pixmap> {
    let (width, height) = (base.width(), base.height());
    let Some(mut canvas) = Pixmap::new(width, height) else {
        warn!(width, height, "could not allocate render surface");
        return Err(Error::ContextUnavailable { width, height });
    };

    draw_base(&mut canvas, base);
    for watermark in scene.watermarks() {
        draw_watermark(&mut canvas, watermark, ctx);
    }
    if show_outline {
        if let Some(active) = scene.active_watermark() {
            draw_outline(&mut canvas, active, ctx);
        }
    }
    Ok(canvas)
}

/// Demultiply a rendered buffer into straight-alpha RGBA for encoding.
#[must_use]
pub fn to_rgba_image(pixmap: &Pixmap) -> RgbaImage {
    let mut out = RgbaImage::new(pixmap.width(), pixmap.height());
    for (dst, src) in out.pixels_mut().zip(pixmap.pixels()) {
        let c = src.demultiply();
        *dst = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
    }
    out
}

#[allow(clippy::cast_precision_loss)]
fn draw_base(canvas: &mut Pixmap, base: &BaseImage) {
    let sx = canvas.width() as f32 / base.width() as f32;
    let sy = canvas.height() as f32 / base.height() as f32;
    canvas.draw_pixmap(
        0,
        0,
        base.pixmap().as_ref(),
        &PixmapPaint::default(),
        Transform::from_scale(sx, sy),
        None,
    );
}

/// Translate to the centre, rotate, then scale: the local frame of a layer.
fn layer_transform(watermark: &Watermark) -> Transform {
    let p = watermark.position();
    let s = watermark.scale();
    Transform::from_translate(p.x, p.y)
        .pre_concat(Transform::from_rotate(watermark.rotation_degrees()))
        .pre_scale(s, s)
}

fn draw_watermark(canvas: &mut Pixmap, watermark: &Watermark, ctx: &MeasureContext<'_>) {
    let paint = PixmapPaint {
        opacity: f32::from(watermark.opacity_percent()) / 100.0,
        blend_mode: BlendMode::SourceOver,
        quality: FilterQuality::Bilinear,
    };

    match watermark.kind() {
        WatermarkKind::Text { text, color } => {
            let Some(face) = ctx.typeface else {
                return;
            };
            let Some(layer) = face
                .coverage(text, BASE_FONT_SIZE)
                .and_then(|mask| tint(&mask, *color))
            else {
                return;
            };
            #[allow(clippy::cast_precision_loss)]
            let (w, h) = (layer.width() as f32, layer.height() as f32);
            let transform = layer_transform(watermark).pre_translate(-w / 2.0, -h / 2.0);
            canvas.draw_pixmap(0, 0, layer.as_ref(), &paint, transform, None);
        }
        WatermarkKind::Image { bitmap } => {
            let Some(bitmap) = ctx.bitmaps.get(*bitmap) else {
                return;
            };
            if bitmap.width() == 0 || bitmap.height() == 0 {
                return;
            }
            let size = geometry::natural_size(watermark, ctx);
            #[allow(clippy::cast_precision_loss)]
            let (sx, sy) = (
                size.width / bitmap.width() as f32,
                size.height / bitmap.height() as f32,
            );
            let transform = layer_transform(watermark)
                .pre_translate(-size.width / 2.0, -size.height / 2.0)
                .pre_scale(sx, sy);
            canvas.draw_pixmap(0, 0, bitmap.pixmap().as_ref(), &paint, transform, None);
        }
    }
}

/// Fill a coverage mask with a solid color.
fn tint(mask: &GrayImage, color: Rgb) -> Option<Pixmap> {
    let mut layer = Pixmap::new(mask.width(), mask.height())?;
    for (dst, cov) in layer.pixels_mut().iter_mut().zip(mask.pixels()) {
        *dst = ColorU8::from_rgba(color.r(), color.g(), color.b(), cov[0]).premultiply();
    }
    Some(layer)
}

/// Dashed box at the rotated bounding box. The extent already includes the
/// layer's scale, so the transform only translates and rotates.
fn draw_outline(canvas: &mut Pixmap, watermark: &Watermark, ctx: &MeasureContext<'_>) {
    let half = geometry::measure_rotated_half_extent(watermark, ctx);
    let Some(rect) = Rect::from_xywh(
        -half.width,
        -half.height,
        half.width * 2.0,
        half.height * 2.0,
    ) else {
        return;
    };
    let path = PathBuilder::from_rect(rect);

    let mut paint = Paint::default();
    let [r, g, b, a] = OUTLINE_COLOR;
    paint.set_color_rgba8(r, g, b, a);
    paint.anti_alias = true;

    let stroke = Stroke {
        width: OUTLINE_WIDTH,
        dash: StrokeDash::new(OUTLINE_DASH.to_vec(), 0.0),
        ..Stroke::default()
    };

    let p = watermark.position();
    let transform = Transform::from_translate(p.x, p.y)
        .pre_concat(Transform::from_rotate(watermark.rotation_degrees()));
    canvas.stroke_path(&path, &paint, &stroke, transform, None);
}
