//! DeepZoom generator integration tests.
//!
//! Tests verify, through the public API only:
//! - Pyramid geometry and tile addressing
//! - Tile rendering from the closest slide level
//! - Bounds limiting and plane selection
//! - Error reporting for bad levels, addresses and planes

use std::sync::Arc;

use image::Rgb;

use openslide_bind::deepzoom::{
    generate_dzi_xml, parse_tile_name, DeepZoomGenerator, DeepZoomOptions, TileFormat,
};
use openslide_bind::error::DeepZoomError;
use openslide_bind::OpenslideError;

use super::test_utils::{slide_from, standard_backend, MockBackend, LEVEL_COLORS};

fn generator(backend: MockBackend, limit_bounds: bool) -> DeepZoomGenerator {
    DeepZoomGenerator::new(slide_from(backend), 254, 1, limit_bounds).unwrap()
}

// =============================================================================
// Geometry
// =============================================================================

#[test]
fn test_pyramid_geometry() {
    let dz = generator(standard_backend(), false);

    assert_eq!(dz.level_count(), 11);
    assert_eq!(dz.level_dimensions()[10], (1000, 800));
    assert_eq!(dz.level_dimensions()[9], (500, 400));
    assert_eq!(dz.level_dimensions()[0], (1, 1));
    assert_eq!(dz.level_tiles()[10], (4, 4));
    assert_eq!(dz.level_tiles()[0], (1, 1));
    assert_eq!(dz.tile_count(), 29);
    assert_eq!(dz.mpp(), Some((0.25, 0.5)));
}

#[test]
fn test_dzi_descriptor_matches_generator() {
    let dz = generator(standard_backend(), false);

    assert_eq!(
        dz.get_dzi(TileFormat::Jpeg),
        generate_dzi_xml(1000, 800, 254, 1, TileFormat::Jpeg)
    );

    let xml = dz.get_dzi(TileFormat::Png);
    assert!(xml.starts_with("<?xml"));
    assert!(xml.contains("http://schemas.microsoft.com/deepzoom/2008"));
    assert!(xml.contains("Format=\"png\""));
    assert!(xml.contains("<Size Width=\"1000\" Height=\"800\" />"));
}

#[test]
fn test_tile_names() {
    assert_eq!(parse_tile_name("3_5.jpeg"), Some((3, 5, TileFormat::Jpeg)));
    assert_eq!(parse_tile_name("0_0.jpg"), Some((0, 0, TileFormat::Jpeg)));
    assert_eq!(parse_tile_name("12_7.png"), Some((12, 7, TileFormat::Png)));
    assert_eq!(parse_tile_name("3_5.gif"), None);
    assert_eq!(parse_tile_name("3-5.jpeg"), None);
    assert_eq!(parse_tile_name("a_5.jpeg"), None);
    assert_eq!(parse_tile_name("35"), None);
}

// =============================================================================
// Tile Rendering
// =============================================================================

#[test]
fn test_full_resolution_tile() {
    let dz = generator(standard_backend(), false);

    let tile = dz.get_tile(10, (0, 0)).unwrap();
    assert_eq!(tile.dimensions(), (255, 255));
    assert_eq!(tile.get_pixel(0, 0), &Rgb(LEVEL_COLORS[0]));
    assert_eq!(tile.get_pixel(254, 254), &Rgb(LEVEL_COLORS[0]));

    let edge = dz.get_tile(10, (3, 3)).unwrap();
    assert_eq!(edge.dimensions(), (239, 39));
}

#[test]
fn test_tile_from_lower_slide_level() {
    let dz = generator(standard_backend(), false);

    let info = dz.get_tile_info(8, (0, 0)).unwrap();
    assert_eq!(info.slide_level, 1);

    let tile = dz.get_tile(8, (0, 0)).unwrap();
    assert_eq!(tile.dimensions(), (250, 200));
    assert_eq!(tile.get_pixel(125, 100), &Rgb(LEVEL_COLORS[1]));
}

#[test]
fn test_downscaled_tile() {
    let dz = generator(standard_backend(), false);

    let info = dz.get_tile_info(9, (1, 0)).unwrap();
    assert_eq!(info.l0_location, (506, 0));
    assert_eq!(info.l_size, (494, 510));

    let tile = dz.get_tile(9, (1, 0)).unwrap();
    assert_eq!(tile.dimensions(), (247, 255));
}

#[test]
fn test_smallest_level_is_one_pixel() {
    let dz = generator(standard_backend(), false);
    let tile = dz.get_tile(0, (0, 0)).unwrap();
    assert_eq!(tile.dimensions(), (1, 1));
}

// =============================================================================
// Options
// =============================================================================

#[test]
fn test_limit_bounds_restricts_pyramid() {
    let backend = standard_backend()
        .with_property("openslide.bounds-x", "100")
        .with_property("openslide.bounds-y", "50")
        .with_property("openslide.bounds-width", "500")
        .with_property("openslide.bounds-height", "400");

    let bounded = generator(backend.clone(), true);
    assert_eq!(bounded.l0_dimensions(), (500, 400));
    assert_eq!(bounded.level_count(), 10);
    assert_eq!(bounded.get_tile_info(9, (0, 0)).unwrap().l0_location, (100, 50));

    let unbounded = generator(backend, false);
    assert_eq!(unbounded.l0_dimensions(), (1000, 800));
}

#[test]
fn test_with_options() {
    let options = DeepZoomOptions {
        tile_size: 510,
        overlap: 2,
        limit_bounds: false,
    };
    let dz = DeepZoomGenerator::with_options(slide_from(standard_backend()), options).unwrap();

    assert_eq!(dz.tile_size(), 510);
    assert_eq!(dz.overlap(), 2);
    assert_eq!(dz.level_tiles()[10], (2, 2));
    assert!(dz.get_dzi(TileFormat::Jpeg).contains("TileSize=\"510\""));
}

#[test]
fn test_generators_share_one_slide() {
    let slide = slide_from(standard_backend());
    let a = DeepZoomGenerator::new(Arc::clone(&slide), 254, 1, false).unwrap();
    let b = DeepZoomGenerator::new(Arc::clone(&slide), 510, 0, false).unwrap();

    assert!(Arc::ptr_eq(a.slide(), b.slide()));
    assert_eq!(a.get_tile(10, (0, 0)).unwrap().dimensions(), (255, 255));
    assert_eq!(b.get_tile(10, (0, 0)).unwrap().dimensions(), (510, 510));
}

#[test]
fn test_plane_selection() {
    let dz = generator(standard_backend().with_planes(2), false);
    assert_eq!(dz.plane_count(), 2);

    assert!(dz.get_tile_plane(1, 10, (0, 0)).is_ok());

    let err = dz.get_tile_plane(2, 10, (0, 0)).unwrap_err();
    assert!(matches!(
        err,
        DeepZoomError::Slide(OpenslideError::InvalidArgument(_))
    ));
}

// =============================================================================
// Errors
// =============================================================================

#[test]
fn test_invalid_level_and_address() {
    let dz = generator(standard_backend(), false);

    assert!(matches!(
        dz.get_tile(11, (0, 0)),
        Err(DeepZoomError::InvalidLevel {
            level: 11,
            level_count: 11
        })
    ));
    assert!(matches!(
        dz.get_tile(10, (4, 0)),
        Err(DeepZoomError::TileOutOfBounds { .. })
    ));
    assert!(matches!(
        dz.get_tile(10, (0, 4)),
        Err(DeepZoomError::TileOutOfBounds { .. })
    ));
}

#[test]
fn test_read_failure_propagates() {
    let dz = generator(standard_backend().failing("disk on fire"), false);

    let err = dz.get_tile(10, (0, 0)).unwrap_err();
    assert_eq!(
        err,
        DeepZoomError::Slide(OpenslideError::Slide("disk on fire".to_string()))
    );
}

#[test]
fn test_invalid_parameters() {
    let slide = slide_from(standard_backend());
    assert!(matches!(
        DeepZoomGenerator::new(slide, 0, 1, false),
        Err(DeepZoomError::InvalidParameters(_))
    ));

    let empty = slide_from(MockBackend::new(vec![], vec![]));
    assert!(matches!(
        DeepZoomGenerator::new(empty, 254, 1, false),
        Err(DeepZoomError::InvalidParameters(_))
    ));
}
