//! Tile service layer.
//!
//! This module renders, encodes and caches DeepZoom tiles for the HTTP
//! server.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HTTP Handlers              │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              Tile Service               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  TileCache   │  │  TileEncoder    │  │
//! │  │  (encoded    │  │  (RGB →         │  │
//! │  │   tiles)     │  │   JPEG / PNG)   │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │            SlideRegistry                │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileService`]: Main entry point for tile requests
//! - [`TileCache`]: LRU cache for encoded tiles with size-based eviction
//! - [`TileCacheKey`]: Composite key (slide, level, address, plane, format, quality)
//! - [`TileEncoder`]: Encodes rendered tiles as JPEG or PNG
//! - [`TileRequest`] / [`TileResponse`]: Service input and output

mod cache;
mod encoder;
mod service;

pub use cache::{TileCache, TileCacheKey, DEFAULT_TILE_CACHE_CAPACITY};
pub use encoder::{
    clamp_quality, is_valid_quality, TileEncoder, DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY,
    MIN_JPEG_QUALITY,
};
pub use service::{TileRequest, TileResponse, TileService};
