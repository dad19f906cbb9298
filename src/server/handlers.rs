//! HTTP request handlers for the DeepZoom tile API.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /slides` - List slides
//! - `GET /slides/{slide_id}` - Slide metadata
//! - `GET /slides/{slide_id}/properties` - All slide properties
//! - `GET /slides/{slide_id}/dzi` - DZI descriptor
//! - `GET /slides/{slide_id}/thumbnail` - Thumbnail image
//! - `GET /tiles/{slide_id}/{level}/{col}_{row}.{format}` - Serve a tile

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::deepzoom::{parse_tile_name, TileFormat};
use crate::error::{DeepZoomError, OpenslideError, TileError};
use crate::slide::SlideSource;
use crate::tile::{TileRequest, TileService, DEFAULT_JPEG_QUALITY};

const X_TILE_CACHE_HIT: HeaderName = HeaderName::from_static("x-tile-cache-hit");
const X_TILE_QUALITY: HeaderName = HeaderName::from_static("x-tile-quality");

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the tile service.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<S: SlideSource> {
    /// The tile service for processing tile requests
    pub tile_service: Arc<TileService<S>>,

    /// Cache-Control max-age in seconds (defaults to 1 hour)
    pub cache_max_age: u32,

    /// Tile format advertised in DZI descriptors
    pub tile_format: TileFormat,

    /// JPEG quality used when a request does not give one
    pub default_quality: u8,
}

impl<S: SlideSource> AppState<S> {
    /// Create a new application state with the given tile service.
    pub fn new(tile_service: TileService<S>) -> Self {
        Self::with_cache_max_age(tile_service, 3600)
    }

    /// Create a new application state with custom cache max-age.
    pub fn with_cache_max_age(tile_service: TileService<S>, cache_max_age: u32) -> Self {
        Self {
            tile_service: Arc::new(tile_service),
            cache_max_age,
            tile_format: TileFormat::Jpeg,
            default_quality: DEFAULT_JPEG_QUALITY,
        }
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

    fn cache_control(&self) -> String {
        format!("public, max-age={}", self.cache_max_age)
    }
}

impl<S: SlideSource> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            tile_service: Arc::clone(&self.tile_service),
            cache_max_age: self.cache_max_age,
            tile_format: self.tile_format,
            default_quality: self.default_quality,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Path parameters for tile requests.
///
/// Extracted from: `/tiles/{slide_id}/{level}/{filename}`
/// where filename is `{col}_{row}.{format}`
#[derive(Debug, Deserialize)]
pub struct TilePathParams {
    /// Slide identifier (URL-encoded if it contains `/`)
    pub slide_id: String,

    /// DeepZoom level (0 = 1x1 image)
    pub level: usize,

    /// Tile file name, e.g. `3_5.jpeg`
    pub filename: String,
}

/// Query parameters for tile requests.
#[derive(Debug, Deserialize)]
pub struct TileQueryParams {
    /// JPEG quality (1-100, defaults to the server setting)
    #[serde(default)]
    pub quality: Option<u8>,

    /// Image plane (defaults to 0)
    #[serde(default)]
    pub plane: usize,
}

/// Query parameters for the slides list endpoint.
#[derive(Debug, Deserialize)]
pub struct SlidesQueryParams {
    /// Maximum number of slides to return (default: 100, max: 1000)
    #[serde(default = "default_limit")]
    pub limit: u32,

    /// Continuation token for pagination (from previous response)
    #[serde(default)]
    pub cursor: Option<String>,

    /// Filter by path prefix (e.g., "folder/subfolder/")
    #[serde(default)]
    pub prefix: Option<String>,

    /// Search string to filter slide names (case-insensitive substring match)
    #[serde(default)]
    pub search: Option<String>,
}

fn default_limit() -> u32 {
    100
}

/// Query parameters for DZI descriptor requests.
#[derive(Debug, Deserialize)]
pub struct DziQueryParams {
    /// Tile format to advertise (`jpeg`, `jpg` or `png`)
    #[serde(default)]
    pub format: Option<String>,
}

/// Query parameters for thumbnail requests.
#[derive(Debug, Deserialize)]
pub struct ThumbnailQueryParams {
    /// Maximum width or height for the thumbnail (default: 512, max: 2048)
    #[serde(default = "default_thumbnail_size")]
    pub max_size: u32,

    /// JPEG quality (1-100, defaults to the server setting)
    #[serde(default)]
    pub quality: Option<u8>,
}

fn default_thumbnail_size() -> u32 {
    512
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_level")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Create a new error response with status code.
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Package version
    pub version: String,
}

/// Response from the slides list endpoint.
#[derive(Debug, Serialize)]
pub struct SlidesResponse {
    /// List of slide IDs
    pub slides: Vec<String>,

    /// Continuation token for next page (None if no more pages)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Metadata for a single slide pyramid level.
#[derive(Debug, Serialize)]
pub struct LevelMetadataResponse {
    /// Slide level index (0 = highest resolution)
    pub level: usize,

    /// Width of this level in pixels
    pub width: u64,

    /// Height of this level in pixels
    pub height: u64,

    /// Downsample factor relative to level 0
    pub downsample: f64,
}

/// DeepZoom pyramid parameters of a slide.
#[derive(Debug, Serialize)]
pub struct DeepZoomMetadataResponse {
    /// Width of the DeepZoom image (bounded when limit_bounds is on)
    pub width: u64,

    /// Height of the DeepZoom image
    pub height: u64,

    /// Tile edge in pixels, excluding overlap
    pub tile_size: u32,

    /// Overlap between adjacent tiles
    pub overlap: u32,

    /// Number of DeepZoom levels
    pub level_count: usize,

    /// Total number of tiles across levels
    pub tile_count: u64,

    /// URL of the DZI descriptor
    pub dzi_url: String,
}

/// Response from the slide metadata endpoint.
#[derive(Debug, Serialize)]
pub struct SlideMetadataResponse {
    /// Slide identifier
    pub slide_id: String,

    /// Vendor reported by OpenSlide (e.g., "aperio", "hamamatsu")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,

    /// Width of the full-resolution image in pixels
    pub width: u64,

    /// Height of the full-resolution image in pixels
    pub height: u64,

    /// Number of slide pyramid levels
    pub level_count: usize,

    /// Number of image planes
    pub plane_count: usize,

    /// Microns per pixel `[x, y]`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mpp: Option<[f64; 2]>,

    /// Metadata for each slide level
    pub levels: Vec<LevelMetadataResponse>,

    /// Names of associated images (label, macro, ...)
    pub associated_images: Vec<String>,

    /// DeepZoom pyramid served for this slide
    pub deepzoom: DeepZoomMetadataResponse,
}

// =============================================================================
// Error Mapping
// =============================================================================

fn openslide_status(err: &OpenslideError) -> (StatusCode, &'static str) {
    match err {
        OpenslideError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        OpenslideError::AssociatedImageNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        OpenslideError::UnsupportedFormat { .. } => {
            (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_format")
        }
        OpenslideError::InvalidLevel { .. } => (StatusCode::BAD_REQUEST, "invalid_level"),
        OpenslideError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "invalid_argument"),
        OpenslideError::LibraryUnavailable { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, "library_unavailable")
        }
        OpenslideError::Slide(_) => (StatusCode::INTERNAL_SERVER_ERROR, "slide_error"),
    }
}

fn deepzoom_status(err: &DeepZoomError) -> (StatusCode, &'static str) {
    match err {
        DeepZoomError::Slide(inner) => openslide_status(inner),
        DeepZoomError::InvalidLevel { .. } => (StatusCode::BAD_REQUEST, "invalid_level"),
        DeepZoomError::TileOutOfBounds { .. } => (StatusCode::BAD_REQUEST, "tile_out_of_bounds"),
        DeepZoomError::InvalidParameters(_) => {
            (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_format")
        }
    }
}

fn tile_status(err: &TileError) -> (StatusCode, &'static str) {
    match err {
        TileError::SlideNotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        TileError::InvalidTileName { .. } => (StatusCode::BAD_REQUEST, "invalid_tile_name"),
        TileError::InvalidQuality { .. } => (StatusCode::BAD_REQUEST, "invalid_quality"),
        TileError::DeepZoom(inner) => deepzoom_status(inner),
        TileError::Slide(inner) => openslide_status(inner),
        TileError::EncodeError { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "encode_error"),
        TileError::Task { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    }
}

/// Build a JSON error response, logging by severity:
/// - 5xx at ERROR
/// - 404 at DEBUG (common and expected)
/// - other 4xx at WARN
fn error_response(status: StatusCode, error_type: &'static str, message: String) -> Response {
    if status.is_server_error() {
        error!(
            error_type = error_type,
            status = status.as_u16(),
            "Server error: {}",
            message
        );
    } else if status == StatusCode::NOT_FOUND {
        debug!(
            error_type = error_type,
            status = status.as_u16(),
            "Resource not found: {}",
            message
        );
    } else {
        warn!(
            error_type = error_type,
            status = status.as_u16(),
            "Client error: {}",
            message
        );
    }

    let body = ErrorResponse::with_status(error_type, message, status);
    (status, Json(body)).into_response()
}

impl IntoResponse for TileError {
    fn into_response(self) -> Response {
        let (status, error_type) = tile_status(&self);
        error_response(status, error_type, self.to_string())
    }
}

impl IntoResponse for OpenslideError {
    fn into_response(self) -> Response {
        let (status, error_type) = openslide_status(&self);
        error_response(status, error_type, self.to_string())
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle tile requests.
///
/// # Endpoint
///
/// `GET /tiles/{slide_id}/{level}/{col}_{row}.{format}`
///
/// Also mounted at `/slides/{slide_id}/dzi_files/{level}/{col}_{row}.{format}`,
/// the path Deep Zoom viewers derive from the descriptor URL.
///
/// # Query Parameters
///
/// - `quality`: JPEG quality 1-100 (default: server setting)
/// - `plane`: image plane (default: 0)
///
/// # Response
///
/// - `200 OK`: Encoded tile with `Content-Type: image/jpeg` or `image/png`
/// - `400 Bad Request`: Invalid level, address, plane, quality or file name
/// - `404 Not Found`: Slide not found
/// - `415 Unsupported Media Type`: Slide format not supported
/// - `500 Internal Server Error`: Read or encode error
/// - `503 Service Unavailable`: OpenSlide library not loaded
///
/// # Headers
///
/// - `Cache-Control: public, max-age={cache_max_age}`
/// - `X-Tile-Cache-Hit: true|false`
/// - `X-Tile-Quality: {quality}`
pub async fn tile_handler<S: SlideSource>(
    State(state): State<AppState<S>>,
    Path(params): Path<TilePathParams>,
    Query(query): Query<TileQueryParams>,
) -> Result<Response, TileError> {
    let (col, row, format) =
        parse_tile_name(&params.filename).ok_or_else(|| TileError::InvalidTileName {
            name: params.filename.clone(),
        })?;

    let request = TileRequest::new(&params.slide_id, params.level, col, row)
        .with_format(format)
        .with_quality(query.quality.unwrap_or(state.default_quality))
        .with_plane(query.plane);

    let response = state.tile_service.get_tile(request).await?;

    Ok((
        [
            (header::CONTENT_TYPE, response.format.content_type().to_string()),
            (header::CACHE_CONTROL, state.cache_control()),
            (X_TILE_CACHE_HIT, response.cache_hit.to_string()),
            (X_TILE_QUALITY, response.quality.to_string()),
        ],
        response.data,
    )
        .into_response())
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: crate::VERSION.to_string(),
    })
}

/// Handle slides list requests.
///
/// # Endpoint
///
/// `GET /slides`
///
/// # Query Parameters
///
/// - `limit`: Maximum number of slides to return (default: 100, max: 1000)
/// - `cursor`: Continuation token for pagination (from previous response)
/// - `prefix`: Only list slides whose ID starts with this prefix
/// - `search`: Case-insensitive substring filter applied to the page
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "slides": ["case1/slide1.svs", "case2/slide2.ndpi"],
///   "next_cursor": "case2/slide2.ndpi"
/// }
/// ```
pub async fn slides_handler<S: SlideSource>(
    State(state): State<AppState<S>>,
    Query(query): Query<SlidesQueryParams>,
) -> Result<Json<SlidesResponse>, OpenslideError> {
    let limit = query.limit.clamp(1, 1000);

    let result = state
        .tile_service
        .registry()
        .source()
        .list_slides(limit, query.cursor.as_deref(), query.prefix.as_deref())
        .await?;

    let slides = match query.search {
        Some(ref search) => {
            let search_lower = search.to_lowercase();
            result
                .slides
                .into_iter()
                .filter(|s| s.to_lowercase().contains(&search_lower))
                .collect()
        }
        None => result.slides,
    };

    Ok(Json(SlidesResponse {
        slides,
        next_cursor: result.next_cursor,
    }))
}

/// Handle slide metadata requests.
///
/// # Endpoint
///
/// `GET /slides/{slide_id}`
///
/// # Response
///
/// `200 OK` with JSON body containing slide and DeepZoom metadata:
/// ```json
/// {
///   "slide_id": "CMU-1.svs",
///   "vendor": "aperio",
///   "width": 46000,
///   "height": 32914,
///   "level_count": 3,
///   "plane_count": 1,
///   "mpp": [0.499, 0.499],
///   "levels": [{ "level": 0, "width": 46000, "height": 32914, "downsample": 1.0 }],
///   "associated_images": ["label", "macro", "thumbnail"],
///   "deepzoom": {
///     "width": 46000, "height": 32914, "tile_size": 254, "overlap": 1,
///     "level_count": 17, "tile_count": 31399, "dzi_url": "/slides/CMU-1.svs/dzi"
///   }
/// }
/// ```
pub async fn slide_metadata_handler<S: SlideSource>(
    State(state): State<AppState<S>>,
    Path(slide_id): Path<String>,
) -> Result<Json<SlideMetadataResponse>, TileError> {
    let generator = state.tile_service.generator(&slide_id).await?;
    let slide = generator.slide();

    let (width, height) = slide.dimensions();
    let levels = slide
        .all_level_dimensions()
        .into_iter()
        .zip(slide.level_downsamples())
        .enumerate()
        .map(|(level, ((width, height), downsample))| LevelMetadataResponse {
            level,
            width,
            height,
            downsample,
        })
        .collect();

    let (dz_width, dz_height) = generator.l0_dimensions();
    let deepzoom = DeepZoomMetadataResponse {
        width: dz_width,
        height: dz_height,
        tile_size: generator.tile_size(),
        overlap: generator.overlap(),
        level_count: generator.level_count(),
        tile_count: generator.tile_count(),
        dzi_url: format!("/slides/{}/dzi", urlencoding::encode(&slide_id)),
    };

    Ok(Json(SlideMetadataResponse {
        vendor: slide.vendor(),
        width,
        height,
        level_count: slide.level_count(),
        plane_count: slide.plane_count(),
        mpp: slide.mpp().map(|(x, y)| [x, y]),
        levels,
        associated_images: slide.associated_image_names(),
        deepzoom,
        slide_id,
    }))
}

/// Handle slide property requests.
///
/// # Endpoint
///
/// `GET /slides/{slide_id}/properties`
///
/// # Response
///
/// `200 OK` with a JSON object of every property, sorted by name.
pub async fn properties_handler<S: SlideSource>(
    State(state): State<AppState<S>>,
    Path(slide_id): Path<String>,
) -> Result<Json<BTreeMap<String, String>>, TileError> {
    let generator = state.tile_service.generator(&slide_id).await?;
    Ok(Json(generator.slide().properties()))
}

/// Handle DZI descriptor requests.
///
/// # Endpoint
///
/// `GET /slides/{slide_id}/dzi`
///
/// # Query Parameters
///
/// - `format`: tile format to advertise (default: server setting)
///
/// # Response
///
/// `200 OK` with XML body:
///
/// ```xml
/// <?xml version="1.0" encoding="UTF-8"?>
/// <Image xmlns="http://schemas.microsoft.com/deepzoom/2008"
///        TileSize="254"
///        Overlap="1"
///        Format="jpeg">
///   <Size Width="46000" Height="32914" />
/// </Image>
/// ```
pub async fn dzi_descriptor_handler<S: SlideSource>(
    State(state): State<AppState<S>>,
    Path(slide_id): Path<String>,
    Query(query): Query<DziQueryParams>,
) -> Result<Response, TileError> {
    let format = match query.format.as_deref() {
        None => state.tile_format,
        Some(ext) => TileFormat::from_extension(ext).ok_or_else(|| TileError::InvalidTileName {
            name: format!("format={}", ext),
        })?,
    };

    let generator = state.tile_service.generator(&slide_id).await?;
    let xml = generator.get_dzi(format);

    Ok((
        [
            (header::CONTENT_TYPE, "application/xml".to_string()),
            (header::CACHE_CONTROL, state.cache_control()),
        ],
        xml,
    )
        .into_response())
}

/// Handle thumbnail requests.
///
/// # Endpoint
///
/// `GET /slides/{slide_id}/thumbnail`
///
/// # Query Parameters
///
/// - `max_size`: Maximum width or height (default: 512, clamped to 64-2048)
/// - `quality`: JPEG quality 1-100 (default: server setting)
///
/// # Response
///
/// `200 OK` with a JPEG thumbnail flattened onto the slide background.
/// When `max_size` was clamped, `X-Thumbnail-Size-Clamped: true` is set.
pub async fn thumbnail_handler<S: SlideSource>(
    State(state): State<AppState<S>>,
    Path(slide_id): Path<String>,
    Query(query): Query<ThumbnailQueryParams>,
) -> Result<Response, TileError> {
    let requested_size = query.max_size;
    let max_size = requested_size.clamp(64, 2048);

    let response = state
        .tile_service
        .generate_thumbnail(
            &slide_id,
            max_size,
            query.quality.unwrap_or(state.default_quality),
        )
        .await?;

    let mut http_response = (
        [
            (header::CONTENT_TYPE, response.format.content_type().to_string()),
            (header::CACHE_CONTROL, state.cache_control()),
            (X_TILE_QUALITY, response.quality.to_string()),
        ],
        response.data,
    )
        .into_response();

    if max_size != requested_size {
        let headers = http_response.headers_mut();
        headers.insert(
            HeaderName::from_static("x-thumbnail-size-clamped"),
            header::HeaderValue::from_static("true"),
        );
        headers.insert(
            HeaderName::from_static("x-thumbnail-actual-size"),
            header::HeaderValue::from(max_size),
        );
    }

    Ok(http_response)
}

// =============================================================================
// Tests
// =============================================================================
