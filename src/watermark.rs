//! Watermark layers: identifiers, colors and validated per-layer settings.
//!
//! A [`Watermark`] is either a text label or a logo. Every externally tunable
//! field is validated on write; a rejected edit leaves the watermark unchanged.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::bitmap::BitmapId;
use crate::error::{Error, Result};
use crate::geometry::Point;

/// Longest accepted watermark text, in characters, after sanitizing.
pub const MAX_TEXT_CHARS: usize = 200;
/// Smallest accepted uniform scale factor.
pub const MIN_SCALE: f32 = 0.2;
/// Largest accepted uniform scale factor.
pub const MAX_SCALE: f32 = 3.0;
/// Rotation limit in degrees, applied symmetrically.
pub const MAX_ROTATION_DEGREES: f32 = 180.0;
/// Lowest accepted opacity percentage.
pub const MIN_OPACITY: u8 = 10;
/// Highest accepted opacity percentage.
pub const MAX_OPACITY: u8 = 100;
/// Opacity given to newly added watermarks.
pub const DEFAULT_OPACITY: u8 = 80;
/// Text given to newly added text watermarks.
pub const DEFAULT_TEXT: &str = "Watermark";

/// Stable identifier of a watermark for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatermarkId(Uuid);

impl WatermarkId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WatermarkId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WatermarkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An opaque RGB color, written as `#RRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    /// Pure white, the default text color.
    pub const WHITE: Rgb = Rgb([0xFF, 0xFF, 0xFF]);

    /// Parse a `#RRGGBB` string (hex digits in either case).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidColor`] for anything else, including the
    /// three-digit shorthand.
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = || Error::InvalidColor(input.to_string());
        let hex = input.strip_prefix('#').ok_or_else(invalid)?;
        if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
        Ok(Self([channel(0)?, channel(2)?, channel(4)?]))
    }

    /// Red channel.
    #[must_use]
    pub fn r(self) -> u8 {
        self.0[0]
    }

    /// Green channel.
    #[must_use]
    pub fn g(self) -> u8 {
        self.0[1]
    }

    /// Blue channel.
    #[must_use]
    pub fn b(self) -> u8 {
        self.0[2]
    }
}

impl FromStr for Rgb {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.0[0], self.0[1], self.0[2])
    }
}

/// Strip markup and control characters from user text and cap its length.
///
/// A `<...>` span is dropped only once its `>` arrives; a `<` that never
/// closes is kept as literal text. Leading and trailing whitespace is trimmed.
#[must_use]
pub fn sanitize_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len().min(MAX_TEXT_CHARS * 4));
    let mut tag: Option<String> = None;
    for ch in input.chars().filter(|c| !c.is_control()) {
        match (ch, tag.as_mut()) {
            ('<', Some(pending)) => {
                out.push_str(pending);
                pending.clear();
                pending.push('<');
            }
            ('<', None) => tag = Some(String::from('<')),
            ('>', Some(_)) => tag = None,
            (_, Some(pending)) => pending.push(ch),
            (_, None) => out.push(ch),
        }
    }
    if let Some(pending) = tag {
        out.push_str(&pending);
    }
    out.trim().chars().take(MAX_TEXT_CHARS).collect()
}

/// What a watermark draws.
#[derive(Debug, Clone, PartialEq)]
pub enum WatermarkKind {
    /// A single line of text.
    Text {
        /// Sanitized text content.
        text: String,
        /// Fill color.
        color: Rgb,
    },
    /// A logo whose decoded pixels live in the bitmap store.
    Image {
        /// Key into the [`BitmapStore`](crate::bitmap::BitmapStore).
        bitmap: BitmapId,
    },
}

impl WatermarkKind {
    /// Short name of the variant, used in error messages.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            WatermarkKind::Text { .. } => "text",
            WatermarkKind::Image { .. } => "image",
        }
    }
}

/// One overlay layer placed on the base image.
///
/// `position` is the layer's centre in base-image pixels, never display pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Watermark {
    id: WatermarkId,
    kind: WatermarkKind,
    position: Point,
    scale: f32,
    rotation_degrees: f32,
    opacity_percent: u8,
}

impl Watermark {
    /// A text watermark with default settings, centred at `position`.
    #[must_use]
    pub fn text(text: &str, position: Point) -> Self {
        Self::with_kind(
            WatermarkKind::Text {
                text: sanitize_text(text),
                color: Rgb::WHITE,
            },
            position,
        )
    }

    /// A logo watermark with default settings, centred at `position`.
    #[must_use]
    pub fn image(bitmap: BitmapId, position: Point) -> Self {
        Self::with_kind(WatermarkKind::Image { bitmap }, position)
    }

    fn with_kind(kind: WatermarkKind, position: Point) -> Self {
        Self {
            id: WatermarkId::new(),
            kind,
            position,
            scale: 1.0,
            rotation_degrees: 0.0,
            opacity_percent: DEFAULT_OPACITY,
        }
    }

    /// Copy every field under a fresh id. Logos keep pointing at the same bitmap.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        Self {
            id: WatermarkId::new(),
            ..self.clone()
        }
    }

    /// The watermark's id.
    #[must_use]
    pub fn id(&self) -> WatermarkId {
        self.id
    }

    /// What the watermark draws.
    #[must_use]
    pub fn kind(&self) -> &WatermarkKind {
        &self.kind
    }

    /// Centre in base-image pixels.
    #[must_use]
    pub fn position(&self) -> Point {
        self.position
    }

    /// Uniform scale factor.
    #[must_use]
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Clockwise rotation about the centre, in degrees.
    #[must_use]
    pub fn rotation_degrees(&self) -> f32 {
        self.rotation_degrees
    }

    /// Opacity percentage in `[10, 100]`.
    #[must_use]
    pub fn opacity_percent(&self) -> u8 {
        self.opacity_percent
    }

    /// Text content, for text watermarks.
    #[must_use]
    pub fn text_content(&self) -> Option<&str> {
        match &self.kind {
            WatermarkKind::Text { text, .. } => Some(text),
            WatermarkKind::Image { .. } => None,
        }
    }

    /// Bitmap key, for logo watermarks.
    #[must_use]
    pub fn bitmap(&self) -> Option<BitmapId> {
        match self.kind {
            WatermarkKind::Image { bitmap } => Some(bitmap),
            WatermarkKind::Text { .. } => None,
        }
    }

    /// Move the centre. Callers are responsible for clamping afterwards.
    pub fn set_position(&mut self, position: Point) {
        self.position = position;
    }

    /// Replace the text of a text watermark; the input is sanitized first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WrongKind`] for logo watermarks.
    pub fn set_text(&mut self, input: &str) -> Result<()> {
        match &mut self.kind {
            WatermarkKind::Text { text, .. } => {
                *text = sanitize_text(input);
                Ok(())
            }
            WatermarkKind::Image { .. } => Err(Error::WrongKind(self.id, "text")),
        }
    }

    /// Set the fill color of a text watermark from a `#RRGGBB` string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidColor`] for malformed input and
    /// [`Error::WrongKind`] for logo watermarks.
    pub fn set_color(&mut self, input: &str) -> Result<()> {
        let parsed = Rgb::parse(input)?;
        match &mut self.kind {
            WatermarkKind::Text { color, .. } => {
                *color = parsed;
                Ok(())
            }
            WatermarkKind::Image { .. } => Err(Error::WrongKind(self.id, "text")),
        }
    }

    /// Set the scale factor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] outside `[0.2, 3.0]` or for non-finite input.
    pub fn set_scale(&mut self, scale: f32) -> Result<()> {
        self.scale = check_scale(scale)?;
        Ok(())
    }

    /// Set the clockwise rotation in degrees.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] outside `[-180, 180]` or for non-finite input.
    pub fn set_rotation(&mut self, degrees: f32) -> Result<()> {
        self.rotation_degrees = check_rotation(degrees)?;
        Ok(())
    }

    /// Set the opacity percentage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] outside `[10, 100]`.
    pub fn set_opacity(&mut self, percent: u8) -> Result<()> {
        self.opacity_percent = check_opacity(percent)?;
        Ok(())
    }
}

pub(crate) fn check_scale(scale: f32) -> Result<f32> {
    check_range("scale", scale, MIN_SCALE, MAX_SCALE)
}

pub(crate) fn check_rotation(degrees: f32) -> Result<f32> {
    check_range(
        "rotation",
        degrees,
        -MAX_ROTATION_DEGREES,
        MAX_ROTATION_DEGREES,
    )
}

pub(crate) fn check_opacity(percent: u8) -> Result<u8> {
    if (MIN_OPACITY..=MAX_OPACITY).contains(&percent) {
        Ok(percent)
    } else {
        Err(Error::OutOfRange {
            field: "opacity",
            value: f32::from(percent),
            min: f32::from(MIN_OPACITY),
            max: f32::from(MAX_OPACITY),
        })
    }
}

fn check_range(field: &'static str, value: f32, min: f32, max: f32) -> Result<f32> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(Error::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_parses_six_digit_hex_in_any_case() {
        assert_eq!(Rgb::parse("#ff8000").unwrap(), Rgb([255, 128, 0]));
        assert_eq!(Rgb::parse("#FF8000").unwrap(), Rgb([255, 128, 0]));
        assert_eq!(Rgb::parse("#00aAbB").unwrap().to_string(), "#00AABB");
    }

    #[test]
    fn rgb_rejects_malformed_input() {
        for bad in ["ff8000", "#fff", "#ff80001", "#gg0000", "", "#", "#ff 800"] {
            assert!(
                matches!(Rgb::parse(bad), Err(Error::InvalidColor(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn sanitize_strips_tags_and_control_characters() {
        assert_eq!(sanitize_text("<b>Hello</b>\u{7}\tworld"), "Helloworld");
        assert_eq!(sanitize_text("  (c) 2024 <script>x</script>"), "(c) 2024 x");
        assert_eq!(sanitize_text("a > b"), "a > b");
        assert_eq!(sanitize_text("<p>x</p><br/>y"), "xy");
    }

    #[test]
    fn sanitize_keeps_unclosed_angle_brackets() {
        assert_eq!(sanitize_text("a < b"), "a < b");
        assert_eq!(sanitize_text("Price < 10 EUR"), "Price < 10 EUR");
        assert_eq!(sanitize_text("open <tag never closed"), "open <tag never closed");
        assert_eq!(sanitize_text("1 < 2 <b>bold</b>"), "1 < 2 bold");
    }

    #[test]
    fn sanitize_caps_length_in_characters() {
        let long = "é".repeat(MAX_TEXT_CHARS + 50);
        let cleaned = sanitize_text(&long);
        assert_eq!(cleaned.chars().count(), MAX_TEXT_CHARS);
    }

    #[test]
    fn new_text_watermark_has_defaults() {
        let wm = Watermark::text("<i>Hi</i>", Point::new(10.0, 20.0));
        assert_eq!(wm.text_content(), Some("Hi"));
        assert_eq!(wm.position(), Point::new(10.0, 20.0));
        assert!((wm.scale() - 1.0).abs() < f32::EPSILON);
        assert!(wm.rotation_degrees().abs() < f32::EPSILON);
        assert_eq!(wm.opacity_percent(), DEFAULT_OPACITY);
    }

    #[test]
    fn rejected_edits_leave_state_untouched() {
        let mut wm = Watermark::text("x", Point::default());
        assert!(wm.set_scale(3.5).is_err());
        assert!(wm.set_scale(f32::NAN).is_err());
        assert!(wm.set_rotation(181.0).is_err());
        assert!(wm.set_opacity(5).is_err());
        assert!(wm.set_color("blue").is_err());
        assert_eq!(wm, {
            let mut fresh = Watermark::text("x", Point::default());
            fresh.id = wm.id();
            fresh
        });

        wm.set_scale(0.2).unwrap();
        wm.set_rotation(-180.0).unwrap();
        wm.set_opacity(100).unwrap();
        assert!((wm.scale() - 0.2).abs() < f32::EPSILON);
        assert!((wm.rotation_degrees() + 180.0).abs() < f32::EPSILON);
        assert_eq!(wm.opacity_percent(), 100);
    }

    #[test]
    fn text_edits_are_rejected_on_logos() {
        let mut logo = Watermark::image(BitmapId::new(), Point::default());
        assert!(matches!(logo.set_text("x"), Err(Error::WrongKind(_, "text"))));
        assert!(matches!(
            logo.set_color("#000000"),
            Err(Error::WrongKind(_, "text"))
        ));
    }

    #[test]
    fn duplicate_gets_fresh_id_and_shares_bitmap() {
        let bitmap = BitmapId::new();
        let original = Watermark::image(bitmap, Point::new(5.0, 5.0));
        let copy = original.duplicate();
        assert_ne!(copy.id(), original.id());
        assert_eq!(copy.bitmap(), Some(bitmap));
        assert_eq!(copy.position(), original.position());
    }
}
