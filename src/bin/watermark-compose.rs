use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use watermark_compositor::{
    default_output_path, Batch, GlyphTypeface, ProcessOptions, ProcessResult, SceneFile, Typeface,
};

#[derive(Parser)]
#[command(
    name = "watermark-compose",
    about = "Composite text and logo watermarks onto images",
    version,
    after_help = "Simple usage: watermark-compose <image> --scene scene.json\n\n\
                  Logo paths in the scene file are resolved relative to the scene file."
)]
struct Cli {
    /// Input image file or directory
    input: String,

    /// Scene file (JSON list of layers)
    #[arg(short, long)]
    scene: String,

    /// Output file or directory (default: {name}_watermarked.{ext})
    #[arg(short, long)]
    output: Option<String>,

    /// Font for text layers (default: a bold system font)
    #[arg(long)]
    font: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long)]
    quiet: bool,
}

fn init_tracing(opts: &ProcessOptions) {
    let fallback = if opts.quiet {
        "error"
    } else if opts.verbose {
        "watermark_compositor=debug,info"
    } else {
        "warn"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_typeface(font: Option<&str>) -> Option<Arc<dyn Typeface>> {
    let loaded = match font {
        Some(path) => GlyphTypeface::from_file(Path::new(path)),
        None => GlyphTypeface::system_bold(),
    };
    match loaded {
        Ok(face) => Some(Arc::new(face)),
        Err(e) => {
            tracing::warn!(error = %e, "no usable font, text layers will be skipped");
            None
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let opts = ProcessOptions {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };
    init_tracing(&opts);

    let scene_path = Path::new(&cli.scene);
    let scene = match SceneFile::from_path(scene_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Fatal: Failed to read scene {}: {e}", cli.scene);
            process::exit(1);
        }
    };
    let asset_dir = scene_path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    let input_path = Path::new(&cli.input);
    if !input_path.exists() {
        eprintln!("Error: Input path does not exist: {}", cli.input);
        process::exit(1);
    }

    let mut batch = Batch::new(scene, asset_dir).with_options(opts);
    if let Some(face) = load_typeface(cli.font.as_deref()) {
        batch = batch.with_typeface(face);
    }

    let opts = batch.options();
    let results = if input_path.is_dir() {
        let output_dir = if let Some(o) = &cli.output {
            PathBuf::from(o)
        } else {
            eprintln!("Error: Output directory is required for batch processing");
            eprintln!("Usage: watermark-compose <input_dir> --scene <file> -o <output_dir>");
            process::exit(1);
        };
        batch.process_directory(input_path, &output_dir)
    } else {
        let output_path = match &cli.output {
            Some(o) => PathBuf::from(o),
            None => default_output_path(input_path),
        };
        vec![batch.process_file(input_path, &output_path)]
    };

    let mut success_count = 0u32;
    let mut fail_count = 0u32;

    for r in &results {
        print_result(r, opts);
        if r.success {
            success_count += 1;
        } else {
            fail_count += 1;
        }
    }

    if results.len() > 1 && !opts.quiet {
        eprintln!();
        eprint!("[Summary] Processed: {success_count}");
        if fail_count > 0 {
            eprint!(", Failed: {fail_count}");
        }
        eprintln!(" (Total: {})", results.len());
    }

    if fail_count > 0 {
        process::exit(1);
    }
}

fn print_result(result: &ProcessResult, opts: &ProcessOptions) {
    if opts.quiet && result.success {
        return;
    }

    let filename = result.path.file_name().map_or_else(
        || result.path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    );

    if result.success {
        eprintln!("[OK] {filename} ({} layers)", result.layers);
    } else {
        eprintln!("[FAIL] {filename}: {}", result.message);
    }

    if opts.verbose && !result.message.is_empty() {
        eprintln!("  -> {}", result.message);
    }
}
