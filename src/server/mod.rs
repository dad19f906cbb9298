//! HTTP server layer.
//!
//! Serves slide metadata, DZI descriptors and DeepZoom tiles over HTTP so
//! that viewers such as OpenSeadragon can browse slides directly.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │       GET /tiles/{slide_id}/{level}/{col}_{row}.{format}        │
//! │                                                                 │
//! │  ┌──────────────────────────┐  ┌─────────────────────────────┐  │
//! │  │        handlers          │  │           routes            │  │
//! │  │ (requests, error JSON)   │  │  (router config, CORS)      │  │
//! │  └──────────────────────────┘  └─────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    dzi_descriptor_handler, health_handler, properties_handler, slide_metadata_handler,
    slides_handler, thumbnail_handler, tile_handler, AppState, DeepZoomMetadataResponse,
    DziQueryParams, ErrorResponse, HealthResponse, LevelMetadataResponse, SlideMetadataResponse,
    SlidesQueryParams, SlidesResponse, ThumbnailQueryParams, TilePathParams, TileQueryParams,
};
pub use routes::{create_dev_router, create_router, RouterConfig};
