//! openslide-bind - OpenSlide tools and DeepZoom tile server.
//!
//! This binary loads the OpenSlide library, then either runs a one-shot
//! slide tool or starts the HTTP server.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use openslide_bind::{
    config::{
        Cli, Command, DeepZoomArgs, DziConfig, InfoConfig, ServeConfig, ThumbnailConfig,
        TileConfig, VendorConfig,
    },
    deepzoom::DeepZoomGenerator,
    openslide::init_library,
    server::{create_router, RouterConfig},
    slide::{LocalSlideSource, SlideRegistry, SlideSource},
    tile::{TileEncoder, TileService},
    Openslide, VERSION,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let library = cli.openslide_lib.as_deref();

    match cli.command {
        Command::Serve(config) => run_serve(config, library).await,
        Command::Info(config) => report(load_library(library).and_then(|_| run_info(&config))),
        Command::Vendor(config) => report(load_library(library).and_then(|_| run_vendor(&config))),
        Command::Dzi(config) => report(load_library(library).and_then(|_| run_dzi(&config))),
        Command::Tile(config) => report(load_library(library).and_then(|_| run_tile(&config))),
        Command::Thumbnail(config) => {
            report(load_library(library).and_then(|_| run_thumbnail(&config)))
        }
    }
}

/// Initialize the tracing/logging subsystem.
///
/// Logs go to stderr so tool output on stdout stays machine-readable.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "openslide_bind=debug,tower_http=debug"
    } else {
        "openslide_bind=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig, library: Option<&Path>) -> ExitCode {
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    print_banner();

    info!("Configuration:");
    info!("  Slides directory: {}", config.slides_dir.display());
    info!(
        "  DeepZoom: tile size {}, overlap {}, limit bounds {}",
        config.deepzoom.tile_size, config.deepzoom.overlap, config.deepzoom.limit_bounds
    );
    info!(
        "  Cache: {} slides, {}MB tiles",
        config.cache_slides,
        config.cache_tiles / (1024 * 1024)
    );

    match init_library(library) {
        Ok(lib) => info!(
            "  OpenSlide: {} ({}, planes {})",
            lib.version(),
            lib.source(),
            if lib.supports_planes() { "supported" } else { "unsupported" }
        ),
        Err(e) => {
            warn!("  OpenSlide: unavailable - {}", e);
            warn!("        Slide endpoints will answer 503 Service Unavailable");
            warn!("        Point --openslide-lib or WSI_OPENSLIDE_LIB at libopenslide");
        }
    }

    let source = LocalSlideSource::new(&config.slides_dir);

    info!("");
    info!("Scanning slides...");
    match source.list_slides(1000, None, None).await {
        Ok(result) => {
            let more = if result.next_cursor.is_some() { "+" } else { "" };
            info!("  Found {}{} slide(s)", result.slides.len(), more);
        }
        Err(e) => {
            error!("  Failed to scan {}: {}", config.slides_dir.display(), e);
            return ExitCode::FAILURE;
        }
    }

    let registry =
        SlideRegistry::with_capacity(source, config.cache_slides, config.deepzoom.options());
    let tile_service = TileService::with_cache_capacity(registry, config.cache_tiles);

    let router = create_router(tile_service, build_router_config(&config));

    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!("    curl http://{}/slides", addr);
    info!("    curl http://{}/slides/<slide_id>/dzi", addr);
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Print the startup banner.
fn print_banner() {
    info!("");
    info!("┌─┐┌─┐┌─┐┌┐┌┌─┐┬  ┬┌┬┐┌─┐   ┌┐ ┬┌┐┌┌┬┐");
    info!("│ │├─┘├┤ │││└─┐│  │ ││├┤ ───├┴┐││││ ││");
    info!("└─┘┴  └─┘┘└┘└─┘┴─┘┴─┴┘└─┘   └─┘┴┘└┘─┴┘");
    info!("                                  v{}", VERSION);
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_tile_format(config.format)
        .with_default_quality(config.jpeg_quality)
        .with_tracing(!config.no_tracing);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}

// =============================================================================
// Slide Tools
// =============================================================================

fn report(result: Result<(), String>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_library(path: Option<&Path>) -> Result<(), String> {
    let lib = init_library(path).map_err(|e| e.to_string())?;
    info!(
        version = %lib.version(),
        source = lib.source(),
        planes = lib.supports_planes(),
        "Loaded OpenSlide"
    );
    Ok(())
}

fn open_slide(path: &Path) -> Result<Openslide, String> {
    Openslide::open(path).map_err(|e| e.to_string())
}

fn run_info(config: &InfoConfig) -> Result<(), String> {
    let slide = open_slide(&config.path)?;

    let levels: Vec<_> = slide
        .all_level_dimensions()
        .into_iter()
        .zip(slide.level_downsamples())
        .collect();
    let associated: Vec<_> = slide
        .associated_image_names()
        .into_iter()
        .map(|name| {
            let dims = slide.associated_image_dimensions(&name).ok();
            (name, dims)
        })
        .collect();

    if config.json {
        let json = serde_json::json!({
            "path": config.path.display().to_string(),
            "vendor": slide.vendor(),
            "dimensions": slide.dimensions(),
            "plane_count": slide.plane_count(),
            "mpp": slide.mpp(),
            "levels": levels
                .iter()
                .map(|&((width, height), downsample)| serde_json::json!({
                    "width": width,
                    "height": height,
                    "downsample": downsample,
                }))
                .collect::<Vec<_>>(),
            "associated_images": associated
                .iter()
                .map(|(name, dims)| serde_json::json!({ "name": name, "dimensions": dims }))
                .collect::<Vec<_>>(),
            "properties": slide.properties(),
        });
        let text = serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?;
        println!("{}", text);
        return Ok(());
    }

    let (width, height) = slide.dimensions();
    println!("{}", config.path.display());
    println!("═════════════════════════════════");
    println!("Vendor:     {}", slide.vendor().as_deref().unwrap_or("unknown"));
    println!("Dimensions: {} x {}", width, height);
    println!("Planes:     {}", slide.plane_count());
    if let Some((mpp_x, mpp_y)) = slide.mpp() {
        println!("MPP:        {} x {}", mpp_x, mpp_y);
    }
    let bounds = slide.bounds();
    if bounds.is_declared() {
        println!(
            "Bounds:     x={} y={} w={} h={}",
            bounds.x.unwrap_or(0),
            bounds.y.unwrap_or(0),
            bounds.width.unwrap_or(width),
            bounds.height.unwrap_or(height)
        );
    }

    println!();
    println!("Levels:");
    for (level, ((w, h), downsample)) in levels.iter().enumerate() {
        println!("  {:>2}: {:>7} x {:<7} downsample {:.3}", level, w, h, downsample);
    }

    if !associated.is_empty() {
        println!();
        println!("Associated images:");
        for (name, dims) in &associated {
            match dims {
                Some((w, h)) => println!("  {}: {} x {}", name, w, h),
                None => println!("  {}", name),
            }
        }
    }

    println!();
    println!("Properties:");
    for (name, value) in slide.properties() {
        println!("  {} = {}", name, value);
    }

    Ok(())
}

fn run_vendor(config: &VendorConfig) -> Result<(), String> {
    match Openslide::detect_vendor(&config.path).map_err(|e| e.to_string())? {
        Some(vendor) => {
            println!("{}", vendor);
            Ok(())
        }
        None => Err(format!(
            "'{}' is not a recognized slide format",
            config.path.display()
        )),
    }
}

fn open_generator(path: &Path, deepzoom: &DeepZoomArgs) -> Result<DeepZoomGenerator, String> {
    deepzoom.validate()?;
    let slide = Arc::new(open_slide(path)?);
    DeepZoomGenerator::with_options(slide, deepzoom.options()).map_err(|e| e.to_string())
}

fn run_dzi(config: &DziConfig) -> Result<(), String> {
    let generator = open_generator(&config.path, &config.deepzoom)?;
    print!("{}", generator.get_dzi(config.format));
    Ok(())
}

fn run_tile(config: &TileConfig) -> Result<(), String> {
    config.validate()?;
    let format = config.format()?;

    let generator = open_generator(&config.path, &config.deepzoom)?;
    let tile = generator
        .get_tile_plane(config.plane, config.level, (config.col, config.row))
        .map_err(|e| e.to_string())?;

    let data = TileEncoder::new()
        .encode(&tile, format, config.quality)
        .map_err(|e| e.to_string())?;
    std::fs::write(&config.output, &data)
        .map_err(|e| format!("Failed to write {}: {}", config.output.display(), e))?;

    info!(
        level = config.level,
        col = config.col,
        row = config.row,
        width = tile.width(),
        height = tile.height(),
        "Wrote tile to {}",
        config.output.display()
    );
    Ok(())
}

fn run_thumbnail(config: &ThumbnailConfig) -> Result<(), String> {
    config.validate()?;
    let format = config.format()?;

    let slide = open_slide(&config.path)?;
    let thumbnail = slide
        .get_thumbnail((config.max_size, config.max_size))
        .map_err(|e| e.to_string())?;

    let data = TileEncoder::new()
        .encode(&thumbnail, format, config.quality)
        .map_err(|e| e.to_string())?;
    std::fs::write(&config.output, &data)
        .map_err(|e| format!("Failed to write {}: {}", config.output.display(), e))?;

    info!(
        width = thumbnail.width(),
        height = thumbnail.height(),
        "Wrote thumbnail to {}",
        config.output.display()
    );
    Ok(())
}
