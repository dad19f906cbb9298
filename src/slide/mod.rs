//! Slide access layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              Tile Service               │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │            SlideRegistry                │
//! │  (caches DeepZoom generators,           │
//! │   singleflight opening)                 │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           SlideSource Trait             │
//! │  (slide id -> Openslide)                │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │          LocalSlideSource               │
//! │  (directory of slide files)             │
//! └─────────────────────────────────────────┘
//! ```

mod registry;
mod source;

pub use registry::{SlideRegistry, DEFAULT_SLIDE_CACHE_CAPACITY};
pub use source::{is_slide_file, LocalSlideSource, SlideListResult, SlideSource, SLIDE_EXTENSIONS};
