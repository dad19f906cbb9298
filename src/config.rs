//! Command-line and environment configuration.
//!
//! This module provides a configuration system that supports:
//! - Command-line arguments via clap, one subcommand per tool
//! - Environment variables with `WSI_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use openslide_bind::config::{Cli, Command};
//!
//! let cli = Cli::parse();
//! if let Command::Serve(config) = cli.command {
//!     println!("Listening on {}", config.bind_address());
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `WSI_OPENSLIDE_LIB` - Path to the OpenSlide shared library
//! - `WSI_HOST` - Server bind address (default: 0.0.0.0)
//! - `WSI_PORT` - Server port (default: 3000)
//! - `WSI_SLIDES_DIR` - Directory served by `serve` (default: .)
//! - `WSI_TILE_SIZE` - DeepZoom tile size (default: 254)
//! - `WSI_OVERLAP` - DeepZoom tile overlap (default: 1)
//! - `WSI_LIMIT_BOUNDS` - Restrict tiles to the slide bounds (default: true)
//! - `WSI_CACHE_SLIDES` - Max slides to cache (default: 100)
//! - `WSI_CACHE_TILES` - Tile cache size, e.g. `100MB` (default: 100MB)
//! - `WSI_JPEG_QUALITY` - Default JPEG quality (default: 80)
//! - `WSI_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)
//! - `WSI_CORS_ORIGINS` - Allowed CORS origins, comma-separated

use std::path::{Path, PathBuf};

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::deepzoom::{DeepZoomOptions, TileFormat, DEFAULT_OVERLAP, DEFAULT_TILE_SIZE};
use crate::slide::DEFAULT_SLIDE_CACHE_CAPACITY;
use crate::tile::{DEFAULT_JPEG_QUALITY, DEFAULT_TILE_CACHE_CAPACITY};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default HTTP cache max-age in seconds (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

/// Default thumbnail edge in pixels.
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 512;

// =============================================================================
// CLI Arguments
// =============================================================================

/// openslide-bind - OpenSlide tools and a DeepZoom tile server.
#[derive(Parser, Debug, Clone)]
#[command(name = "openslide-bind")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the OpenSlide shared library.
    ///
    /// If not specified, the platform's default library names are tried.
    #[arg(long, global = true, env = "WSI_OPENSLIDE_LIB")]
    pub openslide_lib: Option<PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve a directory of slides over HTTP as DeepZoom images.
    Serve(ServeConfig),

    /// Print slide geometry and properties.
    Info(InfoConfig),

    /// Print the vendor detected for a file.
    Vendor(VendorConfig),

    /// Print the DZI descriptor of a slide.
    Dzi(DziConfig),

    /// Render a single DeepZoom tile to a file.
    Tile(TileConfig),

    /// Render a slide thumbnail to a file.
    Thumbnail(ThumbnailConfig),
}

/// DeepZoom pyramid parameters shared by several subcommands.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct DeepZoomArgs {
    /// Tile edge in pixels, excluding overlap.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "WSI_TILE_SIZE")]
    pub tile_size: u32,

    /// Pixels of overlap between adjacent tiles.
    #[arg(long, default_value_t = DEFAULT_OVERLAP, env = "WSI_OVERLAP")]
    pub overlap: u32,

    /// Restrict the pyramid to the slide's non-empty bounds.
    #[arg(
        long,
        default_value_t = true,
        action = ArgAction::Set,
        env = "WSI_LIMIT_BOUNDS"
    )]
    pub limit_bounds: bool,
}

impl Default for DeepZoomArgs {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            overlap: DEFAULT_OVERLAP,
            limit_bounds: true,
        }
    }
}

impl DeepZoomArgs {
    /// Validate the DeepZoom parameters.
    pub fn validate(&self) -> Result<(), String> {
        if self.tile_size == 0 {
            return Err("tile_size must be greater than 0".to_string());
        }
        if self.overlap >= self.tile_size {
            return Err("overlap must be smaller than tile_size".to_string());
        }
        Ok(())
    }

    /// Convert into generator options.
    pub fn options(&self) -> DeepZoomOptions {
        DeepZoomOptions {
            tile_size: self.tile_size,
            overlap: self.overlap,
            limit_bounds: self.limit_bounds,
        }
    }
}

// =============================================================================
// Serve Configuration
// =============================================================================

/// Configuration for the `serve` subcommand.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "WSI_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "WSI_PORT")]
    pub port: u16,

    /// Directory containing the slide files.
    #[arg(long, default_value = ".", env = "WSI_SLIDES_DIR")]
    pub slides_dir: PathBuf,

    // =========================================================================
    // DeepZoom Configuration
    // =========================================================================
    #[command(flatten)]
    pub deepzoom: DeepZoomArgs,

    /// Tile format advertised in DZI descriptors (jpeg or png).
    #[arg(long, default_value = "jpeg", value_parser = parse_tile_format)]
    pub format: TileFormat,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Maximum number of slides to keep open.
    #[arg(long, default_value_t = DEFAULT_SLIDE_CACHE_CAPACITY, env = "WSI_CACHE_SLIDES")]
    pub cache_slides: usize,

    /// Tile cache size in bytes; accepts suffixes such as `512KB`, `100MB`, `1GB`.
    #[arg(
        long,
        default_value_t = DEFAULT_TILE_CACHE_CAPACITY,
        value_parser = parse_size,
        env = "WSI_CACHE_TILES"
    )]
    pub cache_tiles: usize,

    // =========================================================================
    // HTTP Configuration
    // =========================================================================
    /// Default JPEG quality for tile encoding (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "WSI_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "WSI_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "WSI_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.deepzoom.validate()?;

        if !self.slides_dir.is_dir() {
            return Err(format!(
                "Slides directory '{}' does not exist. Set --slides-dir or WSI_SLIDES_DIR",
                self.slides_dir.display()
            ));
        }

        if self.cache_slides == 0 {
            return Err("cache_slides must be greater than 0".to_string());
        }
        if self.cache_tiles == 0 {
            return Err("cache_tiles must be greater than 0".to_string());
        }

        validate_quality(self.jpeg_quality)
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// Slide Tool Configuration
// =============================================================================

/// Configuration for the `info` subcommand.
#[derive(Args, Debug, Clone)]
pub struct InfoConfig {
    /// Slide file to inspect.
    pub path: PathBuf,

    /// Print machine-readable JSON instead of text.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

/// Configuration for the `vendor` subcommand.
#[derive(Args, Debug, Clone)]
pub struct VendorConfig {
    /// File to check.
    pub path: PathBuf,
}

/// Configuration for the `dzi` subcommand.
#[derive(Args, Debug, Clone)]
pub struct DziConfig {
    /// Slide file.
    pub path: PathBuf,

    #[command(flatten)]
    pub deepzoom: DeepZoomArgs,

    /// Tile format advertised in the descriptor (jpeg or png).
    #[arg(long, default_value = "jpeg", value_parser = parse_tile_format)]
    pub format: TileFormat,
}

/// Configuration for the `tile` subcommand.
#[derive(Args, Debug, Clone)]
pub struct TileConfig {
    /// Slide file.
    pub path: PathBuf,

    /// DeepZoom level (0 = 1x1 image).
    pub level: usize,

    /// Tile column.
    pub col: u64,

    /// Tile row.
    pub row: u64,

    /// Output file; the format follows its extension (.jpeg, .jpg or .png).
    #[arg(short, long)]
    pub output: PathBuf,

    /// Image plane.
    #[arg(long, default_value_t = 0)]
    pub plane: usize,

    /// JPEG quality (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "WSI_JPEG_QUALITY")]
    pub quality: u8,

    #[command(flatten)]
    pub deepzoom: DeepZoomArgs,
}

impl TileConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.deepzoom.validate()?;
        validate_quality(self.quality)?;
        output_format(&self.output).map(|_| ())
    }

    /// Output format, taken from the output file extension.
    pub fn format(&self) -> Result<TileFormat, String> {
        output_format(&self.output)
    }
}

/// Configuration for the `thumbnail` subcommand.
#[derive(Args, Debug, Clone)]
pub struct ThumbnailConfig {
    /// Slide file.
    pub path: PathBuf,

    /// Output file; the format follows its extension (.jpeg, .jpg or .png).
    #[arg(short, long)]
    pub output: PathBuf,

    /// Maximum width or height of the thumbnail.
    #[arg(long, default_value_t = DEFAULT_THUMBNAIL_SIZE)]
    pub max_size: u32,

    /// JPEG quality (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "WSI_JPEG_QUALITY")]
    pub quality: u8,
}

impl ThumbnailConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_size == 0 {
            return Err("max_size must be greater than 0".to_string());
        }
        validate_quality(self.quality)?;
        output_format(&self.output).map(|_| ())
    }

    /// Output format, taken from the output file extension.
    pub fn format(&self) -> Result<TileFormat, String> {
        output_format(&self.output)
    }
}

// =============================================================================
// Parsers
// =============================================================================

fn validate_quality(quality: u8) -> Result<(), String> {
    if quality == 0 || quality > 100 {
        return Err("jpeg_quality must be between 1 and 100".to_string());
    }
    Ok(())
}

fn output_format(path: &Path) -> Result<TileFormat, String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(TileFormat::from_extension)
        .ok_or_else(|| {
            format!(
                "Cannot infer image format from '{}'; use a .jpeg, .jpg or .png extension",
                path.display()
            )
        })
}

/// Parse a tile format name (`jpeg`, `jpg` or `png`).
pub fn parse_tile_format(value: &str) -> Result<TileFormat, String> {
    TileFormat::from_extension(value)
        .ok_or_else(|| format!("unknown tile format '{}' (expected jpeg or png)", value))
}

/// Parse a byte size such as `1048576`, `512KB`, `100MB` or `2GB`.
///
/// Suffixes are binary multiples and case-insensitive.
pub fn parse_size(value: &str) -> Result<usize, String> {
    let trimmed = value.trim();
    let upper = trimmed.to_ascii_uppercase();

    let (digits, multiplier) = if let Some(n) = upper.strip_suffix("GB") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = upper.strip_suffix("MB") {
        (n, 1024 * 1024)
    } else if let Some(n) = upper.strip_suffix("KB") {
        (n, 1024)
    } else if let Some(n) = upper.strip_suffix('B') {
        (n, 1)
    } else {
        (upper.as_str(), 1)
    };

    let count: usize = digits
        .trim()
        .parse()
        .map_err(|_| format!("invalid size '{}'", trimmed))?;

    count
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size '{}' is too large", trimmed))
}

// =============================================================================
// Tests
// =============================================================================
