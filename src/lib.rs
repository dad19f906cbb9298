//! # openslide-bind
//!
//! Rust bindings for the OpenSlide whole-slide image library.
//!
//! The crate root is a small facade: it exposes the package version, the
//! slide handle and the error type. Everything else is reached through its
//! module path.
//!
//! - [`VERSION`] - version of this package
//! - [`Openslide`] - an open whole-slide image
//! - [`OpenslideError`] - errors reported by the binding
//!
//! ## Architecture
//!
//! - [`openslide`] - runtime-loaded `libopenslide` and the slide handle
//! - [`deepzoom`] - DeepZoom tile geometry over a slide
//! - [`slide`] - slide sources and the generator registry
//! - [`tile`] - tile rendering, encoding and caching
//! - [`server`] - Axum-based DeepZoom tile server
//! - [`config`] - CLI and configuration types
//! - [`error`] - error types
//!
//! ## Example
//!
//! ```rust,no_run
//! use openslide_bind::{Openslide, OpenslideError, VERSION};
//!
//! fn main() -> Result<(), OpenslideError> {
//!     println!("openslide-bind {}", VERSION);
//!
//!     let slide = Openslide::open("CMU-1.svs")?;
//!     println!("levels: {}", slide.level_count());
//!
//!     let thumbnail = slide.get_thumbnail((256, 256))?;
//!     println!("thumbnail: {:?}", thumbnail.dimensions());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod deepzoom;
pub mod error;
pub mod openslide;
pub mod server;
pub mod slide;
pub mod tile;

/// Version of this package, as declared at build time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use openslide::{Openslide, OpenslideError};
