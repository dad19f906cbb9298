//! API integration tests for the DeepZoom HTTP endpoints.
//!
//! Tests verify:
//! - Slide listing, metadata, properties and DZI descriptors
//! - Tile and thumbnail retrieval with their headers
//! - Error cases and their HTTP status codes and JSON bodies

use axum::http::StatusCode;

use openslide_bind::server::{create_router, RouterConfig};
use openslide_bind::OpenslideError;

use super::test_utils::{
    get, get_json, image_dimensions, is_valid_jpeg, is_valid_png, router, standard_backend,
    tile_service, MockSlideSource,
};

fn standard_source() -> MockSlideSource {
    MockSlideSource::new()
        .with_slide("slide.svs", standard_backend())
        .with_slide("case1/deep.ndpi", standard_backend())
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health() {
    let router = router(MockSlideSource::new());

    let (status, json) = get_json(&router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], openslide_bind::VERSION);
}

// =============================================================================
// Slides Listing
// =============================================================================

#[tokio::test]
async fn test_list_slides() {
    let router = router(standard_source());

    let (status, json) = get_json(&router, "/slides").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json["slides"],
        serde_json::json!(["case1/deep.ndpi", "slide.svs"])
    );
    assert!(json.get("next_cursor").is_none());
}

#[tokio::test]
async fn test_list_slides_pagination() {
    let source = MockSlideSource::new()
        .with_slide("a.svs", standard_backend())
        .with_slide("b.svs", standard_backend())
        .with_slide("c.svs", standard_backend());
    let router = router(source);

    let (_, page1) = get_json(&router, "/slides?limit=2").await;
    assert_eq!(page1["slides"], serde_json::json!(["a.svs", "b.svs"]));
    assert_eq!(page1["next_cursor"], "b.svs");

    let (_, page2) = get_json(&router, "/slides?limit=2&cursor=b.svs").await;
    assert_eq!(page2["slides"], serde_json::json!(["c.svs"]));
    assert!(page2.get("next_cursor").is_none());
}

#[tokio::test]
async fn test_list_slides_prefix_and_search() {
    let router = router(standard_source());

    let (_, json) = get_json(&router, "/slides?prefix=case1/").await;
    assert_eq!(json["slides"], serde_json::json!(["case1/deep.ndpi"]));

    let (_, json) = get_json(&router, "/slides?search=SLIDE").await;
    assert_eq!(json["slides"], serde_json::json!(["slide.svs"]));
}

// =============================================================================
// Slide Metadata
// =============================================================================

#[tokio::test]
async fn test_slide_metadata() {
    let router = router(standard_source());

    let (status, json) = get_json(&router, "/slides/slide.svs").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["slide_id"], "slide.svs");
    assert_eq!(json["vendor"], "mock");
    assert_eq!(json["width"], 1000);
    assert_eq!(json["height"], 800);
    assert_eq!(json["level_count"], 2);
    assert_eq!(json["plane_count"], 1);
    assert_eq!(json["mpp"], serde_json::json!([0.25, 0.5]));
    assert_eq!(json["levels"][1]["width"], 250);
    assert_eq!(json["levels"][1]["downsample"], 4.0);
    assert_eq!(json["associated_images"], serde_json::json!(["label"]));
    assert_eq!(json["deepzoom"]["level_count"], 11);
    assert_eq!(json["deepzoom"]["tile_size"], 254);
    assert_eq!(json["deepzoom"]["overlap"], 1);
    assert_eq!(json["deepzoom"]["tile_count"], 29);
    assert_eq!(json["deepzoom"]["dzi_url"], "/slides/slide.svs/dzi");
}

#[tokio::test]
async fn test_slide_metadata_encoded_id() {
    let router = router(standard_source());

    let (status, json) = get_json(&router, "/slides/case1%2Fdeep.ndpi").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["slide_id"], "case1/deep.ndpi");
    assert_eq!(json["deepzoom"]["dzi_url"], "/slides/case1%2Fdeep.ndpi/dzi");
}

#[tokio::test]
async fn test_slide_properties() {
    let router = router(standard_source());

    let (status, json) = get_json(&router, "/slides/slide.svs/properties").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["openslide.vendor"], "mock");
    assert_eq!(json["mock.scanner"], "bench-1");
}

// =============================================================================
// DZI Descriptor
// =============================================================================

#[tokio::test]
async fn test_dzi_descriptor() {
    let router = router(standard_source());

    let (status, headers, body) = get(&router, "/slides/slide.svs/dzi").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("content-type").unwrap(), "application/xml");
    assert!(headers.contains_key("cache-control"));

    let xml = String::from_utf8(body.to_vec()).unwrap();
    assert!(xml.contains("TileSize=\"254\""));
    assert!(xml.contains("Overlap=\"1\""));
    assert!(xml.contains("Format=\"jpeg\""));
    assert!(xml.contains("Width=\"1000\""));
    assert!(xml.contains("Height=\"800\""));
}

#[tokio::test]
async fn test_dzi_descriptor_format() {
    let router = router(standard_source());

    let (status, _, body) = get(&router, "/slides/slide.svs/dzi?format=png").await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8_lossy(&body).contains("Format=\"png\""));

    let (status, _, _) = get(&router, "/slides/slide.svs/dzi?format=webp").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_dzi_descriptor_default_format_from_config() {
    let config = RouterConfig::new()
        .with_tracing(false)
        .with_tile_format(openslide_bind::deepzoom::TileFormat::Png);
    let router = create_router(tile_service(standard_source()), config);

    let (_, _, body) = get(&router, "/slides/slide.svs/dzi").await;
    assert!(String::from_utf8_lossy(&body).contains("Format=\"png\""));
}

// =============================================================================
// Tiles
// =============================================================================

#[tokio::test]
async fn test_tile_jpeg() {
    let router = router(standard_source());

    let (status, headers, body) = get(&router, "/tiles/slide.svs/10/0_0.jpeg").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("content-type").unwrap(), "image/jpeg");
    assert_eq!(
        headers.get("cache-control").unwrap(),
        "public, max-age=3600"
    );
    assert_eq!(headers.get("x-tile-cache-hit").unwrap(), "false");
    assert_eq!(headers.get("x-tile-quality").unwrap(), "80");
    assert!(is_valid_jpeg(&body));
    assert_eq!(image_dimensions(&body), (255, 255));
}

#[tokio::test]
async fn test_tile_png_and_jpg_extension() {
    let router = router(standard_source());

    let (status, headers, body) = get(&router, "/tiles/slide.svs/10/3_3.png").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("content-type").unwrap(), "image/png");
    assert!(is_valid_png(&body));
    assert_eq!(image_dimensions(&body), (239, 39));

    let (status, headers, _) = get(&router, "/tiles/slide.svs/10/3_3.jpg").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("content-type").unwrap(), "image/jpeg");
}

#[tokio::test]
async fn test_tile_viewer_layout() {
    let router = router(standard_source());

    let (status, headers, body) = get(&router, "/slides/slide.svs/dzi_files/9/1_0.jpeg").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("content-type").unwrap(), "image/jpeg");
    assert_eq!(image_dimensions(&body), (247, 255));
}

#[tokio::test]
async fn test_tile_quality_parameter() {
    let router = router(standard_source());

    let (status, headers, body) = get(&router, "/tiles/slide.svs/10/0_0.jpeg?quality=40").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("x-tile-quality").unwrap(), "40");
    assert!(is_valid_jpeg(&body));
}

#[tokio::test]
async fn test_tile_default_quality_from_config() {
    let config = RouterConfig::new()
        .with_tracing(false)
        .with_default_quality(65)
        .with_cache_max_age(60);
    let router = create_router(tile_service(standard_source()), config);

    let (status, headers, _) = get(&router, "/tiles/slide.svs/10/0_0.jpeg").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("x-tile-quality").unwrap(), "65");
    assert_eq!(headers.get("cache-control").unwrap(), "public, max-age=60");
}

#[tokio::test]
async fn test_tile_plane_parameter() {
    let source =
        MockSlideSource::new().with_slide("fluor.svs", standard_backend().with_planes(3));
    let router = router(source);

    let (status, _, _) = get(&router, "/tiles/fluor.svs/10/0_0.png?plane=2").await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = get_json(&router, "/tiles/fluor.svs/10/0_0.png?plane=3").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_argument");
}

// =============================================================================
// Thumbnails
// =============================================================================

#[tokio::test]
async fn test_thumbnail() {
    let router = router(standard_source());

    let (status, headers, body) = get(&router, "/slides/slide.svs/thumbnail?max_size=100").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("content-type").unwrap(), "image/jpeg");
    assert!(!headers.contains_key("x-thumbnail-size-clamped"));
    assert!(is_valid_jpeg(&body));
    assert_eq!(image_dimensions(&body), (100, 80));
}

#[tokio::test]
async fn test_thumbnail_size_clamped() {
    let router = router(standard_source());

    let (status, headers, _) = get(&router, "/slides/slide.svs/thumbnail?max_size=8").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("x-thumbnail-size-clamped").unwrap(), "true");
    assert_eq!(headers.get("x-thumbnail-actual-size").unwrap(), "64");
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_missing_slide() {
    let router = router(standard_source());

    for uri in [
        "/slides/missing.svs",
        "/slides/missing.svs/dzi",
        "/slides/missing.svs/properties",
        "/slides/missing.svs/thumbnail",
        "/tiles/missing.svs/0/0_0.jpeg",
    ] {
        let (status, json) = get_json(&router, uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
        assert_eq!(json["error"], "not_found");
        assert_eq!(json["status"], 404);
    }
}

#[tokio::test]
async fn test_invalid_level() {
    let router = router(standard_source());

    let (status, json) = get_json(&router, "/tiles/slide.svs/11/0_0.jpeg").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_level");
}

#[tokio::test]
async fn test_tile_out_of_bounds() {
    let router = router(standard_source());

    let (status, json) = get_json(&router, "/tiles/slide.svs/10/4_0.jpeg").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "tile_out_of_bounds");
}

#[tokio::test]
async fn test_invalid_tile_name() {
    let router = router(standard_source());

    for uri in [
        "/tiles/slide.svs/10/0_0.gif",
        "/tiles/slide.svs/10/0-0.jpeg",
        "/tiles/slide.svs/10/x_0.jpeg",
    ] {
        let (status, json) = get_json(&router, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(json["error"], "invalid_tile_name");
    }
}

#[tokio::test]
async fn test_invalid_quality() {
    let router = router(standard_source());

    let (status, json) = get_json(&router, "/tiles/slide.svs/10/0_0.jpeg?quality=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_quality");
}

#[tokio::test]
async fn test_unsupported_format() {
    let source = MockSlideSource::new().with_error(
        "notes.txt",
        OpenslideError::UnsupportedFormat {
            path: "notes.txt".to_string(),
        },
    );
    let router = router(source);

    let (status, json) = get_json(&router, "/tiles/notes.txt/0/0_0.jpeg").await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(json["error"], "unsupported_format");
}

#[tokio::test]
async fn test_library_unavailable() {
    let source = MockSlideSource::new().with_error(
        "slide.svs",
        OpenslideError::LibraryUnavailable {
            reason: "libopenslide.so.1 not found".to_string(),
        },
    );
    let router = router(source);

    let (status, json) = get_json(&router, "/slides/slide.svs").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"], "library_unavailable");
    assert!(json["message"]
        .as_str()
        .unwrap()
        .contains("libopenslide.so.1 not found"));
}

#[tokio::test]
async fn test_read_failure() {
    let source =
        MockSlideSource::new().with_slide("broken.svs", standard_backend().failing("bad block"));
    let router = router(source);

    let (status, json) = get_json(&router, "/tiles/broken.svs/10/0_0.jpeg").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "slide_error");
    assert_eq!(json["status"], 500);
}
