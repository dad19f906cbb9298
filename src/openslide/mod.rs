//! Wrapper around the native OpenSlide library.
//!
//! - [`ffi`] loads `libopenslide` at runtime and resolves its symbols
//! - [`backend`] defines the [`SlideBackend`] seam and the native implementation
//! - [`slide`] provides the safe [`Openslide`] handle
//! - [`pixel`] converts premultiplied ARGB output to straight RGBA
//! - [`properties`] names the well-known `openslide.*` properties

pub mod backend;
pub mod ffi;
pub mod pixel;
pub mod properties;
pub mod slide;

pub use crate::error::OpenslideError;
pub use backend::{NativeBackend, SlideBackend};
pub use ffi::{init_library, NativeLibrary, LIBRARY_ENV};
pub use properties::SlideBounds;
pub use slide::Openslide;
