//! Composite movable, rotatable text and logo watermarks onto a base image.
//!
//! A [`Compositor`] holds one base image and an ordered list of watermark
//! layers. Every edit is validated and every layer is kept inside the canvas,
//! taking its rotated bounding box into account. Pointer events drive a
//! hit-test and drag loop that coalesces moves into one update per frame.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use watermark_compositor::{Compositor, GlyphTypeface};
//!
//! let font = GlyphTypeface::system_bold().expect("no bold font found");
//! let mut session = Compositor::with_typeface(Arc::new(font));
//! session
//!     .set_base_image(image::open("photo.jpg").unwrap().to_rgba8())
//!     .unwrap();
//!
//! let id = session.add_text_with("(c) Studio").unwrap();
//! session.set_rotation(id, -15.0).unwrap();
//! session.set_opacity(id, 60).unwrap();
//! session.export_to_path("photo_watermarked.jpg".as_ref()).unwrap();
//! ```
//!
//! # Scene files
//!
//! The same layers can be described in JSON and applied to many images.
//!
//! ```no_run
//! use std::path::Path;
//! use watermark_compositor::{Batch, SceneFile};
//!
//! let scene = SceneFile::from_path(Path::new("scene.json")).unwrap();
//! let batch = Batch::new(scene, ".".into());
//! for result in batch.process_directory(Path::new("in"), Path::new("out")) {
//!     println!("{}: {}", result.path.display(), result.message);
//! }
//! ```

#![deny(missing_docs)]

pub mod batch;
pub mod bitmap;
pub mod compositor;
pub mod config;
pub mod error;
pub mod export;
pub mod geometry;
pub mod interaction;
pub mod load;
pub mod render;
pub mod scene;
pub mod text;
pub mod watermark;

pub use batch::{Batch, ProcessOptions, ProcessResult};
pub use bitmap::{BaseImage, BitmapId, BitmapStore};
pub use compositor::Compositor;
pub use config::{LayerSpec, Placement, SceneFile};
pub use error::{Error, Result};
pub use export::{default_output_path, save_image};
pub use geometry::{HalfExtent, MeasureContext, Point, Size};
pub use interaction::{DragState, InteractionController};
pub use load::is_supported_image;
pub use scene::Scene;
pub use text::{GlyphTypeface, Typeface};
pub use watermark::{Rgb, Watermark, WatermarkId, WatermarkKind};
