//! Tile cache for encoded DeepZoom tiles.
//!
//! This module provides an LRU cache for encoded tiles, so that repeated
//! requests skip the slide read and the encode.
//!
//! # Cache Key
//!
//! Tiles are cached by a composite key including:
//! - Slide identifier
//! - DeepZoom level, column and row
//! - Image plane
//! - Output format, and quality for JPEG tiles
//!
//! # Size-Based Eviction
//!
//! The cache tracks the total size of cached tiles in bytes and evicts
//! least-recently-used entries when the capacity is exceeded.

use std::num::NonZeroUsize;
use std::sync::Arc;

use bytes::Bytes;
use lru::LruCache;
use tokio::sync::RwLock;

use crate::deepzoom::TileFormat;

use super::service::TileRequest;

/// Default cache capacity: 100MB
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 100 * 1024 * 1024;

/// Default maximum number of entries (to bound LRU overhead)
const DEFAULT_MAX_ENTRIES: usize = 10_000;

// =============================================================================
// Cache Key
// =============================================================================

/// Cache key for encoded tiles.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileCacheKey {
    /// Slide identifier
    pub slide_id: Arc<str>,

    /// DeepZoom level (0 = 1x1 image)
    pub level: usize,

    /// Tile column
    pub col: u64,

    /// Tile row
    pub row: u64,

    /// Image plane
    pub plane: usize,

    /// Output format
    pub format: TileFormat,

    /// JPEG quality (1-100), always 0 for PNG
    pub quality: u8,
}

impl TileCacheKey {
    /// Create a key for a plane-0 JPEG tile.
    pub fn new(slide_id: impl Into<Arc<str>>, level: usize, col: u64, row: u64, quality: u8) -> Self {
        Self {
            slide_id: slide_id.into(),
            level,
            col,
            row,
            plane: 0,
            format: TileFormat::Jpeg,
            quality,
        }
    }

    /// Set the plane.
    pub fn with_plane(mut self, plane: usize) -> Self {
        self.plane = plane;
        self
    }

    /// Set the output format.
    ///
    /// PNG output ignores quality, so PNG keys drop it.
    pub fn with_format(mut self, format: TileFormat) -> Self {
        self.format = format;
        if format == TileFormat::Png {
            self.quality = 0;
        }
        self
    }
}

impl From<&TileRequest> for TileCacheKey {
    fn from(request: &TileRequest) -> Self {
        Self::new(
            request.slide_id.as_str(),
            request.level,
            request.col,
            request.row,
            request.quality,
        )
        .with_plane(request.plane)
        .with_format(request.format)
    }
}

// =============================================================================
// Tile Cache
// =============================================================================

/// LRU cache for encoded tiles with size-based capacity.
///
/// The cache is thread-safe and can be shared across async tasks via `Arc`.
///
/// # Example
///
/// ```
/// use openslide_bind::tile::{TileCache, TileCacheKey};
/// use bytes::Bytes;
///
/// #[tokio::main]
/// async fn main() {
///     let cache = TileCache::new();
///
///     let key = TileCacheKey::new("case1/slide.svs", 12, 1, 2, 80);
///     let tile_data = Bytes::from(vec![0xFF, 0xD8, 0xFF, 0xE0]);
///
///     cache.put(key.clone(), tile_data.clone()).await;
///     assert_eq!(cache.get(&key).await, Some(tile_data));
/// }
/// ```
pub struct TileCache {
    /// The underlying LRU cache
    cache: RwLock<LruCache<TileCacheKey, Bytes>>,

    /// Maximum total size in bytes
    max_size: usize,

    /// Current total size in bytes
    current_size: RwLock<usize>,
}

impl TileCache {
    /// Create a new tile cache with default capacity (100MB).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TILE_CACHE_CAPACITY)
    }

    /// Create a new tile cache with the specified capacity in bytes.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, DEFAULT_MAX_ENTRIES)
    }

    /// Create a new tile cache with specified capacity and maximum entries.
    ///
    /// A `max_entries` of zero is treated as one.
    pub fn with_capacity_and_entries(max_size: usize, max_entries: usize) -> Self {
        let entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: RwLock::new(LruCache::new(entries)),
            max_size,
            current_size: RwLock::new(0),
        }
    }

    /// Get a tile from the cache, marking it as recently used.
    pub async fn get(&self, key: &TileCacheKey) -> Option<Bytes> {
        let mut cache = self.cache.write().await;
        cache.get(key).cloned()
    }

    /// Check if a tile is in the cache without updating LRU order.
    pub async fn contains(&self, key: &TileCacheKey) -> bool {
        let cache = self.cache.read().await;
        cache.contains(key)
    }

    /// Store a tile in the cache.
    ///
    /// If the cache is over capacity after insertion, least-recently-used
    /// entries are evicted until the cache is within capacity.
    pub async fn put(&self, key: TileCacheKey, data: Bytes) {
        let data_size = data.len();
        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;

        // push returns the replaced entry or the one evicted by entry count
        if let Some((_, old)) = cache.push(key, data) {
            *current_size = current_size.saturating_sub(old.len());
        }
        *current_size += data_size;

        while *current_size > self.max_size {
            match cache.pop_lru() {
                Some((_, evicted)) => *current_size = current_size.saturating_sub(evicted.len()),
                None => break,
            }
        }
    }

    /// Remove a tile from the cache.
    pub async fn remove(&self, key: &TileCacheKey) -> Option<Bytes> {
        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;

        let data = cache.pop(key)?;
        *current_size = current_size.saturating_sub(data.len());
        Some(data)
    }

    /// Remove every cached tile of one slide.
    ///
    /// Returns the number of tiles removed.
    pub async fn remove_slide(&self, slide_id: &str) -> usize {
        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;

        let keys: Vec<TileCacheKey> = cache
            .iter()
            .filter(|(key, _)| &*key.slide_id == slide_id)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &keys {
            if let Some(data) = cache.pop(key) {
                *current_size = current_size.saturating_sub(data.len());
            }
        }
        keys.len()
    }

    /// Clear all entries from the cache.
    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;
        cache.clear();
        *current_size = 0;
    }

    /// Get the current number of cached tiles.
    pub async fn len(&self) -> usize {
        let cache = self.cache.read().await;
        cache.len()
    }

    /// Check if the cache is empty.
    pub async fn is_empty(&self) -> bool {
        let cache = self.cache.read().await;
        cache.is_empty()
    }

    /// Get the current total size of cached tiles in bytes.
    pub async fn size(&self) -> usize {
        *self.current_size.read().await
    }

    /// Get the maximum capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
