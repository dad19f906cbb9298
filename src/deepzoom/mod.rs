//! DeepZoom pyramids over whole-slide images.
//!
//! [`DeepZoomGenerator`] maps the DeepZoom level/column/row address space
//! onto `read_region` calls against an [`Openslide`](crate::Openslide)
//! handle. [`dzi`] builds the XML descriptor viewers such as OpenSeadragon
//! load first.

pub mod dzi;
pub mod generator;

pub use dzi::{generate_dzi_xml, parse_tile_name, TileFormat};
pub use generator::{
    DeepZoomGenerator, DeepZoomOptions, TileInfo, DEFAULT_OVERLAP, DEFAULT_TILE_SIZE,
};
