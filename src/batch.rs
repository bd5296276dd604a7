//! Applying one scene file to many images.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::compositor::Compositor;
use crate::config::SceneFile;
use crate::load::{self, is_supported_image};
use crate::text::Typeface;

/// Options controlling batch processing behavior.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    /// Enable verbose logging.
    pub verbose: bool,
    /// Suppress non-error output.
    pub quiet: bool,
}

/// Result of processing a single image file.
#[derive(Debug)]
pub struct ProcessResult {
    /// Path of the processed file.
    pub path: PathBuf,
    /// Whether processing succeeded.
    pub success: bool,
    /// Number of layers composited.
    pub layers: usize,
    /// Human-readable status message.
    pub message: String,
}

impl ProcessResult {
    fn failed(path: &Path, message: String) -> Self {
        Self {
            path: path.to_path_buf(),
            success: false,
            layers: 0,
            message,
        }
    }
}

/// A scene plus everything needed to apply it to image files.
///
/// Create once and reuse for every input.
pub struct Batch {
    scene: SceneFile,
    asset_dir: PathBuf,
    typeface: Option<Arc<dyn Typeface>>,
    options: ProcessOptions,
}

impl Batch {
    /// Apply `scene`, resolving logo paths against `asset_dir`.
    #[must_use]
    pub fn new(scene: SceneFile, asset_dir: PathBuf) -> Self {
        Self {
            scene,
            asset_dir,
            typeface: None,
            options: ProcessOptions::default(),
        }
    }

    /// Use `typeface` for text layers. Without one, text layers are skipped.
    #[must_use]
    pub fn with_typeface(mut self, typeface: Arc<dyn Typeface>) -> Self {
        self.typeface = Some(typeface);
        self
    }

    /// Replace the processing options.
    #[must_use]
    pub fn with_options(mut self, options: ProcessOptions) -> Self {
        self.options = options;
        self
    }

    /// The processing options in use, for reporting results.
    #[must_use]
    pub fn options(&self) -> &ProcessOptions {
        &self.options
    }

    /// Process a single image file: load, apply the scene, render, save.
    #[must_use]
    pub fn process_file(&self, input: &Path, output: &Path) -> ProcessResult {
        let image = match load::load_image(input) {
            Ok(img) => img,
            Err(e) => return ProcessResult::failed(input, format!("Failed to load: {e}")),
        };

        let mut compositor = Compositor::new();
        compositor.set_typeface(self.typeface.clone());
        if let Err(e) = compositor.set_base_image(image) {
            return ProcessResult::failed(input, format!("Unusable image: {e}"));
        }

        let ids = match self.scene.apply(&mut compositor, &self.asset_dir) {
            Ok(ids) => ids,
            Err(e) => return ProcessResult::failed(input, format!("Invalid scene: {e}")),
        };

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    return ProcessResult::failed(
                        input,
                        format!("Failed to create output directory: {e}"),
                    );
                }
            }
        }

        match compositor.export_to_path(output) {
            Ok(()) => {
                info!(input = %input.display(), output = %output.display(), layers = ids.len(), "composited");
                ProcessResult {
                    path: input.to_path_buf(),
                    success: true,
                    layers: ids.len(),
                    message: format!("Applied {} layer(s)", ids.len()),
                }
            }
            Err(e) => {
                warn!(input = %input.display(), error = %e, "export failed");
                ProcessResult::failed(input, format!("Failed to save: {e}"))
            }
        }
    }

    /// Process all supported images in a directory.
    ///
    /// Uses parallel iteration when the `cli` feature is enabled (via rayon).
    /// Returns a [`ProcessResult`] for each image found.
    #[must_use]
    pub fn process_directory(&self, input_dir: &Path, output_dir: &Path) -> Vec<ProcessResult> {
        let entries: Vec<PathBuf> = match std::fs::read_dir(input_dir) {
            Ok(rd) => rd
                .filter_map(std::result::Result::ok)
                .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
                .map(|e| e.path())
                .filter(|p| is_supported_image(p))
                .collect(),
            Err(e) => {
                return vec![ProcessResult::failed(
                    input_dir,
                    format!("Failed to read directory: {e}"),
                )];
            }
        };

        if !output_dir.exists() {
            if let Err(e) = std::fs::create_dir_all(output_dir) {
                return vec![ProcessResult::failed(
                    output_dir,
                    format!("Failed to create output directory: {e}"),
                )];
            }
        }

        let run = |input: &PathBuf| match input.file_name() {
            Some(name) => self.process_file(input, &output_dir.join(name)),
            None => ProcessResult::failed(input, "Not a file".to_string()),
        };

        #[cfg(feature = "cli")]
        {
            use rayon::prelude::*;
            entries.par_iter().map(run).collect()
        }

        #[cfg(not(feature = "cli"))]
        {
            entries.iter().map(run).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::testing::FixedAdvance;
    use image::{Rgba, RgbaImage};

    fn scene() -> SceneFile {
        SceneFile::from_json(r#"{"layers": [{"kind": "text", "text": "batch"}]}"#).unwrap()
    }

    #[test]
    fn process_file_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        RgbaImage::from_pixel(120, 90, Rgba([5, 5, 5, 255]))
            .save(&input)
            .unwrap();
        let output = dir.path().join("nested").join("out.png");

        let result = Batch::new(scene(), dir.path().to_path_buf()).process_file(&input, &output);
        assert!(result.success, "{}", result.message);
        assert_eq!(result.layers, 1);
        assert_eq!(image::open(&output).unwrap().width(), 120);
    }

    #[test]
    fn written_file_matches_export_without_outline() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        let base = RgbaImage::from_pixel(300, 200, Rgba([5, 5, 5, 255]));
        base.save(&input).unwrap();
        let output = dir.path().join("out.png");
        let face: Arc<dyn Typeface> = Arc::new(FixedAdvance::new(10.0));

        let result = Batch::new(scene(), dir.path().to_path_buf())
            .with_typeface(Arc::clone(&face))
            .process_file(&input, &output);
        assert!(result.success, "{}", result.message);

        let mut expected = Compositor::with_typeface(face);
        expected.set_base_image(base).unwrap();
        scene().apply(&mut expected, dir.path()).unwrap();
        assert_eq!(
            image::open(&output).unwrap().to_rgba8(),
            expected.export_image().unwrap()
        );
    }

    #[test]
    fn process_file_reports_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let result = Batch::new(scene(), dir.path().to_path_buf())
            .process_file(&dir.path().join("nope.png"), &dir.path().join("out.png"));
        assert!(!result.success);
        assert!(result.message.starts_with("Failed to load"));
    }

    #[test]
    fn process_directory_handles_every_supported_file() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        for name in ["a.png", "b.bmp"] {
            RgbaImage::from_pixel(40, 40, Rgba([9, 9, 9, 255]))
                .save(input.path().join(name))
                .unwrap();
        }
        std::fs::write(input.path().join("notes.txt"), "skip me").unwrap();

        let batch = Batch::new(scene(), input.path().to_path_buf());
        let results = batch.process_directory(input.path(), output.path());
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success));
        assert!(output.path().join("a.png").exists());
        assert!(output.path().join("b.bmp").exists());
    }
}
