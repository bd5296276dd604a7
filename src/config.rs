//! Scene description files: a JSON list of layers applied to a base image.
//!
//! ```json
//! {
//!   "layers": [
//!     { "kind": "text", "text": "(c) Studio", "color": "#FFFFFF", "y": 560, "opacity": 60 },
//!     { "kind": "image", "path": "logo.png", "scale": 0.5, "rotation": -15 }
//!   ]
//! }
//! ```
//!
//! Omitted placement fields keep the defaults of a freshly added layer;
//! `x`/`y` default to the canvas centre independently.

use std::path::{Path, PathBuf};

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::compositor::Compositor;
use crate::error::{Error, Result};
use crate::geometry::Point;
use crate::load;
use crate::scene::MAX_WATERMARKS;
use crate::watermark::{check_opacity, check_rotation, check_scale, Rgb, WatermarkId};

/// A list of layers, in paint order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneFile {
    /// Layers, bottom first.
    #[serde(default)]
    pub layers: Vec<LayerSpec>,
}

/// One layer of a scene file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LayerSpec {
    /// A text layer.
    Text {
        /// Text content; sanitized when applied.
        text: String,
        /// `#RRGGBB` fill color.
        #[serde(default = "default_color")]
        color: String,
        /// Position and appearance.
        #[serde(flatten)]
        placement: Placement,
    },
    /// A logo layer loaded from an image file.
    Image {
        /// Image path, relative to the scene file's directory.
        path: PathBuf,
        /// Position and appearance.
        #[serde(flatten)]
        placement: Placement,
    },
}

/// Optional position and appearance overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    /// Centre x in base-image pixels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    /// Centre y in base-image pixels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    /// Uniform scale factor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f32>,
    /// Clockwise rotation in degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f32>,
    /// Opacity percentage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<u8>,
}

fn default_color() -> String {
    "#FFFFFF".to_string()
}

impl SceneFile {
    /// Parse a scene from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Scene`](crate::Error::Scene) for malformed JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a scene file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) or [`Error::Scene`](crate::Error::Scene).
    pub fn from_path(path: &Path) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Add every layer to `compositor`, resolving logo paths against
    /// `asset_dir`. The selection is cleared afterwards.
    ///
    /// All-or-nothing: every layer is validated and every logo loaded before
    /// the first one is added, so a failure leaves the session as it was.
    ///
    /// # Errors
    ///
    /// [`Error::NoBaseImage`], [`Error::TooManyWatermarks`], any error from
    /// loading a logo, or the first invalid color or placement value.
    pub fn apply(&self, compositor: &mut Compositor, asset_dir: &Path) -> Result<Vec<WatermarkId>> {
        if compositor.base_image().is_none() {
            return Err(Error::NoBaseImage);
        }
        let resolved = self
            .layers
            .iter()
            .map(|layer| layer.resolve(asset_dir))
            .collect::<Result<Vec<_>>>()?;
        if compositor.scene().len() + resolved.len() > MAX_WATERMARKS {
            return Err(Error::TooManyWatermarks {
                max: MAX_WATERMARKS,
            });
        }

        let previous = compositor.scene().active();
        let mut added = Vec::with_capacity(resolved.len());
        for layer in resolved {
            if let Err(e) = layer.add_to(compositor, &mut added) {
                rollback(compositor, &added, previous);
                return Err(e);
            }
        }
        compositor.select(None)?;
        debug!(layers = added.len(), "scene applied");
        Ok(added)
    }
}

/// A layer whose values are known to be valid and whose pixels are loaded.
enum Resolved<'a> {
    Text {
        text: &'a str,
        color: &'a str,
        placement: &'a Placement,
    },
    Image {
        image: RgbaImage,
        placement: &'a Placement,
    },
}

impl LayerSpec {
    fn resolve(&self, asset_dir: &Path) -> Result<Resolved<'_>> {
        match self {
            Self::Text {
                text,
                color,
                placement,
            } => {
                Rgb::parse(color)?;
                placement.validate()?;
                Ok(Resolved::Text {
                    text,
                    color,
                    placement,
                })
            }
            Self::Image { path, placement } => {
                placement.validate()?;
                let image = load::load_image(&asset_dir.join(path))?;
                Ok(Resolved::Image { image, placement })
            }
        }
    }
}

impl Resolved<'_> {
    /// Add the layer, recording its id in `added` as soon as it exists.
    fn add_to(self, compositor: &mut Compositor, added: &mut Vec<WatermarkId>) -> Result<()> {
        let (id, placement) = match self {
            Self::Text {
                text,
                color,
                placement,
            } => {
                let id = compositor.add_text_with(text)?;
                added.push(id);
                compositor.set_color(id, color)?;
                (id, placement)
            }
            Self::Image { image, placement } => {
                let id = compositor.add_logo(image)?;
                added.push(id);
                (id, placement)
            }
        };
        placement.apply(compositor, id)
    }
}

fn rollback(compositor: &mut Compositor, added: &[WatermarkId], previous: Option<WatermarkId>) {
    for &id in added {
        if let Err(e) = compositor.delete(id) {
            debug!(%id, error = %e, "rollback skipped layer");
        }
    }
    if let Err(e) = compositor.select(previous) {
        debug!(error = %e, "previous selection not restored");
    }
}

impl Placement {
    fn validate(&self) -> Result<()> {
        if let Some(scale) = self.scale {
            check_scale(scale)?;
        }
        if let Some(rotation) = self.rotation {
            check_rotation(rotation)?;
        }
        if let Some(opacity) = self.opacity {
            check_opacity(opacity)?;
        }
        Ok(())
    }

    fn apply(&self, compositor: &mut Compositor, id: WatermarkId) -> Result<()> {
        if let Some(scale) = self.scale {
            compositor.set_scale(id, scale)?;
        }
        if let Some(rotation) = self.rotation {
            compositor.set_rotation(id, rotation)?;
        }
        if let Some(opacity) = self.opacity {
            compositor.set_opacity(id, opacity)?;
        }
        if self.x.is_some() || self.y.is_some() {
            let center = compositor.scene().center();
            let target = Point::new(self.x.unwrap_or(center.x), self.y.unwrap_or(center.y));
            compositor.set_position(id, target)?;
        }
        Ok(())
    }
}
