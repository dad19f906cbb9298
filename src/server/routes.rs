//! Router configuration for the DeepZoom tile server.
//!
//! # Route Structure
//!
//! ```text
//! /health                                             - Health check
//! /slides                                             - List slides
//! /slides/{slide_id}                                  - Slide metadata
//! /slides/{slide_id}/properties                       - Slide properties
//! /slides/{slide_id}/dzi                              - DZI descriptor
//! /slides/{slide_id}/dzi_files/{level}/{col}_{row}.{format}
//!                                                     - Tiles, viewer layout
//! /slides/{slide_id}/thumbnail                        - Thumbnail
//! /tiles/{slide_id}/{level}/{col}_{row}.{format}      - Tiles
//! ```
//!
//! # Example
//!
//! ```ignore
//! use openslide_bind::server::{create_router, RouterConfig};
//! use openslide_bind::slide::{LocalSlideSource, SlideRegistry};
//! use openslide_bind::tile::TileService;
//!
//! let registry = SlideRegistry::new(LocalSlideSource::new("/data/slides"));
//! let tile_service = TileService::new(registry);
//!
//! let config = RouterConfig::new()
//!     .with_cors_origins(vec!["https://example.com".to_string()]);
//!
//! let router = create_router(tile_service, config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{routing::get, Router};
use http::header::CONTENT_TYPE;
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    dzi_descriptor_handler, health_handler, properties_handler, slide_metadata_handler,
    slides_handler, thumbnail_handler, tile_handler, AppState,
};
use crate::deepzoom::TileFormat;
use crate::slide::SlideSource;
use crate::tile::{TileService, DEFAULT_JPEG_QUALITY};

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,

    /// Whether to enable request tracing
    pub enable_tracing: bool,

    /// Tile format advertised in DZI descriptors
    pub tile_format: TileFormat,

    /// JPEG quality used when a request does not give one
    pub default_quality: u8,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterConfig {
    /// Create a new router configuration.
    ///
    /// By default:
    /// - CORS allows any origin
    /// - Cache max-age is 1 hour (3600 seconds)
    /// - Tracing is enabled
    /// - DZI descriptors advertise JPEG tiles
    /// - Default JPEG quality is 80
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            cache_max_age: 3600,
            enable_tracing: true,
            tile_format: TileFormat::Jpeg,
            default_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Allow any CORS origin.
    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    /// Set the Cache-Control max-age in seconds.
    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    /// Set the tile format advertised in DZI descriptors.
    pub fn with_tile_format(mut self, format: TileFormat) -> Self {
        self.tile_format = format;
        self
    }

    /// Set the JPEG quality used when a request does not give one.
    pub fn with_default_quality(mut self, quality: u8) -> Self {
        self.default_quality = quality;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
///
/// This function builds the complete Axum router with:
/// - Slide and tile routes
/// - CORS configuration
/// - Request tracing (optional)
pub fn create_router<S>(tile_service: TileService<S>, config: RouterConfig) -> Router
where
    S: SlideSource + 'static,
{
    let app_state = AppState::with_cache_max_age(tile_service, config.cache_max_age)
        .with_tile_format(config.tile_format)
        .with_default_quality(config.default_quality);

    let cors = build_cors_layer(&config);

    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/slides", get(slides_handler::<S>))
        .route("/slides/{slide_id}", get(slide_metadata_handler::<S>))
        .route("/slides/{slide_id}/properties", get(properties_handler::<S>))
        .route("/slides/{slide_id}/dzi", get(dzi_descriptor_handler::<S>))
        .route(
            "/slides/{slide_id}/dzi_files/{level}/{filename}",
            get(tile_handler::<S>),
        )
        .route("/slides/{slide_id}/thumbnail", get(thumbnail_handler::<S>))
        .route("/tiles/{slide_id}/{level}/{filename}", get(tile_handler::<S>))
        .with_state(app_state)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        // No origins allowed
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

/// Create a router with default settings and tracing disabled.
///
/// Intended for tests and local tooling.
pub fn create_dev_router<S>(tile_service: TileService<S>) -> Router
where
    S: SlideSource + 'static,
{
    create_router(tile_service, RouterConfig::new().with_tracing(false))
}

// =============================================================================
// Tests
// =============================================================================
