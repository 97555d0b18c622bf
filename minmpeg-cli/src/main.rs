//! minmpeg CLI Tool
//!
//! Command-line interface for building slideshows from still images and
//! side-by-side comparisons of two videos.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use minmpeg::{Codec, Color, Container, EncodeSpec, Pipeline, SlideEntry};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "minmpeg")]
#[command(about = "Minimal video generation: slideshows and side-by-side videos")]
#[command(version)]
struct Cli {
    /// Log backend selection and progress
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct EncodeArgs {
    /// Output video file path
    #[arg(short, long)]
    output: PathBuf,

    /// Container format (mp4, webm)
    #[arg(long, default_value = "mp4")]
    container: Container,

    /// Video codec (av1, h264)
    #[arg(long, default_value = "av1")]
    codec: Codec,

    /// Quality (0-100, where 100 is highest quality)
    #[arg(long, default_value = "80")]
    quality: u8,

    /// Path to the ffmpeg executable (default: search PATH)
    #[arg(long)]
    ffmpeg: Option<PathBuf>,
}

impl EncodeArgs {
    fn spec(&self) -> EncodeSpec {
        let spec = EncodeSpec::new(self.container, self.codec, self.quality);
        match &self.ffmpeg {
            Some(path) => spec.with_backend_path(path),
            None => spec,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create a video from a sequence of images
    Slideshow {
        /// Slide as PATH:MILLISECONDS, repeatable, in display order
        #[arg(long = "slide", value_parser = parse_slide, required_unless_present = "manifest")]
        slides: Vec<SlideEntry>,

        /// JSON file with [{"path": ..., "duration_ms": ...}, ...]
        #[arg(long, conflicts_with = "slides")]
        manifest: Option<PathBuf>,

        #[command(flatten)]
        encode: EncodeArgs,
    },

    /// Combine two videos side by side
    Juxtapose {
        /// Left video file path
        left: PathBuf,

        /// Right video file path
        right: PathBuf,

        /// Background color for padding (#rrggbb)
        #[arg(long, default_value = "#ffffff")]
        background: Color,

        #[command(flatten)]
        encode: EncodeArgs,
    },

    /// Check whether a codec can be encoded on this system
    Available {
        /// Codec to check (av1, h264)
        codec: Codec,

        /// Path to the ffmpeg executable (default: search PATH)
        #[arg(long)]
        ffmpeg: Option<PathBuf>,
    },

    /// Print the library version
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Exit status: the numeric error kind, or 1 for failures outside the library
fn exit_code(error: &anyhow::Error) -> u8 {
    error
        .chain()
        .find_map(|cause| {
            cause
                .downcast_ref::<minmpeg::Error>()
                .map(|e| e.kind())
                .or_else(|| cause.downcast_ref::<minmpeg_core::Error>().map(|e| e.kind()))
        })
        .map(|kind| kind.code() as u8)
        .unwrap_or(1)
}

fn run(command: Commands) -> Result<()> {
    let pipeline = Pipeline::from_env();

    match command {
        Commands::Slideshow {
            slides,
            manifest,
            encode,
        } => {
            let slides = match manifest {
                Some(path) => read_manifest(&path)?,
                None => slides,
            };
            let summary = pipeline
                .slideshow(&slides, &encode.output, &encode.spec())
                .context("Failed to create slideshow")?;
            println!(
                "Wrote {} frames ({} bytes) to {}",
                summary.frames,
                summary.bytes,
                summary.path.display()
            );
        }

        Commands::Juxtapose {
            left,
            right,
            background,
            encode,
        } => {
            let summary = pipeline
                .juxtapose(&left, &right, &encode.output, &encode.spec(), background)
                .context("Failed to juxtapose videos")?;
            println!(
                "Wrote {} frames ({} bytes) to {}",
                summary.frames,
                summary.bytes,
                summary.path.display()
            );
        }

        Commands::Available { codec, ffmpeg } => {
            let backend = pipeline.availability(codec, ffmpeg.as_deref())?;
            println!("{codec}: available ({backend})");
        }

        Commands::Version => println!("minmpeg {}", minmpeg::version()),
    }

    Ok(())
}

fn read_manifest(path: &std::path::Path) -> Result<Vec<SlideEntry>> {
    tracing::debug!(manifest = %path.display(), "reading slide manifest");
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    let entries = SlideEntry::parse_manifest(&json)
        .with_context(|| format!("Invalid manifest {}", path.display()))?;
    Ok(entries)
}

/// Parses `PATH:MILLISECONDS`; the last colon separates the duration so
/// drive letters survive
fn parse_slide(arg: &str) -> std::result::Result<SlideEntry, String> {
    let (path, duration) = arg
        .rsplit_once(':')
        .ok_or_else(|| format!("expected PATH:MILLISECONDS, got '{arg}'"))?;
    if path.is_empty() {
        return Err(format!("missing image path in '{arg}'"));
    }
    let duration_ms = duration
        .parse::<u32>()
        .map_err(|e| format!("invalid duration '{duration}': {e}"))?;
    Ok(SlideEntry::new(path, duration_ms))
}
