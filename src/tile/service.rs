//! Tile Service for orchestrating tile generation.
//!
//! The TileService is the main entry point for tile requests. It orchestrates:
//! - Request validation
//! - Cache lookups
//! - Slide access via registry
//! - Rendering through the DeepZoom generator
//! - Encoding and result caching
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         TileService                              │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                    get_tile()                           │    │
//! │  │  1. Validate params   4. Render tile (blocking thread)  │    │
//! │  │  2. Check cache       5. Encode JPEG / PNG              │    │
//! │  │  3. Get generator     6. Cache & return                 │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │           │                    │                    │            │
//! │           ▼                    ▼                    ▼            │
//! │    ┌───────────┐      ┌──────────────┐    ┌──────────────────┐  │
//! │    │ TileCache │      │ SlideRegistry│    │   TileEncoder    │  │
//! │    └───────────┘      └──────────────┘    └──────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::deepzoom::{DeepZoomGenerator, TileFormat};
use crate::error::{DeepZoomError, OpenslideError, TileError};
use crate::slide::{SlideRegistry, SlideSource};

use super::cache::{TileCache, TileCacheKey};
use super::encoder::{is_valid_quality, TileEncoder, DEFAULT_JPEG_QUALITY};

// =============================================================================
// Tile Request
// =============================================================================

/// A request for a DeepZoom tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRequest {
    /// Slide identifier
    pub slide_id: String,

    /// DeepZoom level (0 = 1x1 image)
    pub level: usize,

    /// Tile column (0-indexed from left)
    pub col: u64,

    /// Tile row (0-indexed from top)
    pub row: u64,

    /// Image plane (0 for brightfield slides)
    pub plane: usize,

    /// Output format
    pub format: TileFormat,

    /// JPEG quality (1-100, defaults to 80)
    pub quality: u8,
}

impl TileRequest {
    /// Create a request for a plane-0 JPEG tile at the default quality.
    pub fn new(slide_id: impl Into<String>, level: usize, col: u64, row: u64) -> Self {
        Self {
            slide_id: slide_id.into(),
            level,
            col,
            row,
            plane: 0,
            format: TileFormat::Jpeg,
            quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_format(mut self, format: TileFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_plane(mut self, plane: usize) -> Self {
        self.plane = plane;
        self
    }
}

// =============================================================================
// Tile Response
// =============================================================================

/// Response from the tile service.
#[derive(Debug, Clone)]
pub struct TileResponse {
    /// The encoded image data
    pub data: Bytes,

    /// Format of `data`
    pub format: TileFormat,

    /// Whether this tile was served from cache
    pub cache_hit: bool,

    /// The JPEG quality used for encoding
    pub quality: u8,
}

// =============================================================================
// Tile Service
// =============================================================================

/// Service for generating and caching tiles.
///
/// # Example
///
/// ```ignore
/// use openslide_bind::slide::{LocalSlideSource, SlideRegistry};
/// use openslide_bind::tile::{TileRequest, TileService};
///
/// let registry = SlideRegistry::new(LocalSlideSource::new("/data/slides"));
/// let service = TileService::new(registry);
///
/// let request = TileRequest::new("case1/slide.svs", 12, 1, 2);
/// let response = service.get_tile(request).await?;
///
/// println!("Tile size: {} bytes, cache hit: {}", response.data.len(), response.cache_hit);
/// ```
pub struct TileService<S: SlideSource> {
    /// The slide registry for accessing slides
    registry: Arc<SlideRegistry<S>>,

    /// Cache for encoded tiles
    cache: TileCache,

    encoder: TileEncoder,
}

impl<S: SlideSource> TileService<S> {
    /// Create a new tile service with default cache settings (100MB).
    pub fn new(registry: SlideRegistry<S>) -> Self {
        Self::with_shared_registry(Arc::new(registry))
    }

    /// Create a new tile service with a shared registry.
    pub fn with_shared_registry(registry: Arc<SlideRegistry<S>>) -> Self {
        Self {
            registry,
            cache: TileCache::new(),
            encoder: TileEncoder::new(),
        }
    }

    /// Create a new tile service with custom cache capacity in bytes.
    pub fn with_cache_capacity(registry: SlideRegistry<S>, cache_capacity: usize) -> Self {
        Self {
            registry: Arc::new(registry),
            cache: TileCache::with_capacity(cache_capacity),
            encoder: TileEncoder::new(),
        }
    }

    /// Get a tile, using cache when available.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The quality is outside 1-100
    /// - The slide cannot be found or opened
    /// - The level, address or plane is out of range
    /// - The slide read or the encode fails
    pub async fn get_tile(&self, request: TileRequest) -> Result<TileResponse, TileError> {
        if !is_valid_quality(request.quality) {
            return Err(TileError::InvalidQuality {
                quality: request.quality,
            });
        }

        let cache_key = TileCacheKey::from(&request);

        if let Some(cached_data) = self.cache.get(&cache_key).await {
            return Ok(TileResponse {
                data: cached_data,
                format: request.format,
                cache_hit: true,
                quality: request.quality,
            });
        }

        let tile_data = self.generate_tile(&request).await?;
        self.cache.put(cache_key, tile_data.clone()).await;

        Ok(TileResponse {
            data: tile_data,
            format: request.format,
            cache_hit: false,
            quality: request.quality,
        })
    }

    /// Render and encode a tile without touching the cache.
    pub async fn generate_tile(&self, request: &TileRequest) -> Result<Bytes, TileError> {
        let generator = self.generator(&request.slide_id).await?;

        let encoder = self.encoder;
        let TileRequest {
            level,
            col,
            row,
            plane,
            format,
            quality,
            ..
        } = *request;

        debug!(
            slide_id = %request.slide_id,
            level, col, row, plane,
            "Rendering tile"
        );

        tokio::task::spawn_blocking(move || {
            let tile = generator.get_tile_plane(plane, level, (col, row))?;
            encoder.encode(&tile, format, quality)
        })
        .await?
    }

    /// Render a thumbnail that fits in `max_size` x `max_size`, as JPEG.
    pub async fn generate_thumbnail(
        &self,
        slide_id: &str,
        max_size: u32,
        quality: u8,
    ) -> Result<TileResponse, TileError> {
        if !is_valid_quality(quality) {
            return Err(TileError::InvalidQuality { quality });
        }

        let generator = self.generator(slide_id).await?;
        let encoder = self.encoder;

        let data = tokio::task::spawn_blocking(move || {
            let thumbnail = generator.slide().get_thumbnail((max_size, max_size))?;
            encoder.encode(&thumbnail, TileFormat::Jpeg, quality)
        })
        .await??;

        Ok(TileResponse {
            data,
            format: TileFormat::Jpeg,
            cache_hit: false,
            quality,
        })
    }

    /// Look up a slide's generator, mapping a missing slide to
    /// [`TileError::SlideNotFound`].
    pub async fn generator(&self, slide_id: &str) -> Result<Arc<DeepZoomGenerator>, TileError> {
        self.registry
            .get_slide(slide_id)
            .await
            .map_err(|err| match err {
                DeepZoomError::Slide(OpenslideError::NotFound { .. }) => TileError::SlideNotFound {
                    slide_id: slide_id.to_string(),
                },
                other => TileError::DeepZoom(other),
            })
    }

    /// Get tile cache statistics.
    ///
    /// Returns `(current_size, capacity, entry_count)`.
    pub async fn cache_stats(&self) -> (usize, usize, usize) {
        let size = self.cache.size().await;
        let capacity = self.cache.capacity();
        let count = self.cache.len().await;
        (size, capacity, count)
    }

    /// Clear the tile cache.
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    /// Drop a slide from the registry and its tiles from the cache.
    pub async fn invalidate_slide(&self, slide_id: &str) {
        self.registry.invalidate(slide_id).await;
        let removed = self.cache.remove_slide(slide_id).await;
        debug!(slide_id = slide_id, removed, "Invalidated slide tiles");
    }

    /// Get a reference to the underlying registry.
    pub fn registry(&self) -> &Arc<SlideRegistry<S>> {
        &self.registry
    }
}

// =============================================================================
// Tests
// =============================================================================
