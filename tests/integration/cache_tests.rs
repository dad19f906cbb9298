//! Cache effectiveness integration tests.
//!
//! Tests verify:
//! - The tile cache serves repeated requests without re-rendering
//! - Cache keys separate quality, format and plane
//! - Concurrent requests for one slide open it only once
//! - Invalidation drops both the slide and its tiles

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::http::StatusCode;
use bytes::Bytes;

use openslide_bind::deepzoom::{DeepZoomOptions, TileFormat};
use openslide_bind::error::{DeepZoomError, TileError};
use openslide_bind::server::create_dev_router;
use openslide_bind::slide::SlideRegistry;
use openslide_bind::tile::{TileCache, TileCacheKey, TileRequest, TileService};

use super::test_utils::{get, standard_backend, tile_service, MockSlideSource};

// =============================================================================
// Tile Cache Effectiveness
// =============================================================================

#[tokio::test]
async fn test_repeated_tile_is_cache_hit() {
    let backend = standard_backend();
    let source = MockSlideSource::new().with_slide("slide.svs", backend.clone());
    let router = create_dev_router(tile_service(source));

    let (status, headers, first) = get(&router, "/tiles/slide.svs/10/1_1.jpeg").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("x-tile-cache-hit").unwrap(), "false");
    let reads_after_first = backend.read_count();
    assert_eq!(reads_after_first, 1);

    let (status, headers, second) = get(&router, "/tiles/slide.svs/10/1_1.jpeg").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("x-tile-cache-hit").unwrap(), "true");
    assert_eq!(first, second);
    assert_eq!(backend.read_count(), reads_after_first);
}

#[tokio::test]
async fn test_cache_key_variants_are_distinct() {
    let backend = standard_backend().with_planes(2);
    let source = MockSlideSource::new().with_slide("slide.svs", backend.clone());
    let service = tile_service(source);

    let base = TileRequest::new("slide.svs", 10, 0, 0);
    let variants = [
        base.clone(),
        base.clone().with_quality(50),
        base.clone().with_format(TileFormat::Png),
        base.clone().with_plane(1),
    ];

    for request in variants.iter().cloned() {
        let response = service.get_tile(request).await.unwrap();
        assert!(!response.cache_hit);
    }
    for request in variants.iter().cloned() {
        let response = service.get_tile(request).await.unwrap();
        assert!(response.cache_hit);
    }

    let (_, _, count) = service.cache_stats().await;
    assert_eq!(count, 4);
    assert_eq!(backend.read_count(), 4);
}

#[tokio::test]
async fn test_png_tiles_share_cache_across_quality() {
    let backend = standard_backend();
    let source = MockSlideSource::new().with_slide("slide.svs", backend.clone());
    let service = tile_service(source);

    let png = TileRequest::new("slide.svs", 10, 0, 0).with_format(TileFormat::Png);
    let first = service.get_tile(png.clone().with_quality(20)).await.unwrap();
    let second = service.get_tile(png.with_quality(95)).await.unwrap();

    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(first.data, second.data);
    assert_eq!(backend.read_count(), 1);
}

#[tokio::test]
#[cfg(target_pointer_width = "64")]
async fn test_out_of_range_level_never_hits_cache() {
    let source = MockSlideSource::new().with_slide("slide.svs", standard_backend().with_planes(2));
    let service = tile_service(source);

    service
        .get_tile(TileRequest::new("slide.svs", 10, 0, 0))
        .await
        .unwrap();

    let wide_level = service
        .get_tile(TileRequest::new("slide.svs", (1usize << 32) + 10, 0, 0))
        .await;
    assert!(matches!(
        wide_level,
        Err(TileError::DeepZoom(DeepZoomError::InvalidLevel { .. }))
    ));

    let wide_plane = service
        .get_tile(TileRequest::new("slide.svs", 10, 0, 0).with_plane(1 << 32))
        .await;
    assert!(wide_plane.is_err());
}

#[tokio::test]
async fn test_tile_cache_size_eviction() {
    let cache = TileCache::with_capacity(1000);

    for col in 0..5 {
        let key = TileCacheKey::new("slide.svs", 10, col, 0, 80);
        cache.put(key, Bytes::from(vec![0u8; 400])).await;
    }

    assert!(cache.size().await <= 1000);
    assert_eq!(cache.len().await, 2);
    assert!(
        cache
            .contains(&TileCacheKey::new("slide.svs", 10, 4, 0, 80))
            .await
    );
    assert!(
        !cache
            .contains(&TileCacheKey::new("slide.svs", 10, 0, 0, 80))
            .await
    );
}

// =============================================================================
// Slide Registry
// =============================================================================

#[tokio::test]
async fn test_concurrent_requests_open_slide_once() {
    let source = MockSlideSource::new().with_slide("slide.svs", standard_backend());
    let opens = source.open_counter();
    let service = Arc::new(tile_service(source));

    let mut handles = Vec::new();
    for col in 0..4u64 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service
                .get_tile(TileRequest::new("slide.svs", 10, col, 0))
                .await
        }));
    }

    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    assert_eq!(opens.load(Ordering::SeqCst), 1);
    assert_eq!(service.registry().cached_count().await, 1);
}

#[tokio::test]
async fn test_registry_capacity_evicts_slides() {
    let source = MockSlideSource::new()
        .with_slide("a.svs", standard_backend())
        .with_slide("b.svs", standard_backend())
        .with_slide("c.svs", standard_backend());
    let opens = source.open_counter();
    let registry = SlideRegistry::with_capacity(source, 2, DeepZoomOptions::default());

    registry.get_slide("a.svs").await.unwrap();
    registry.get_slide("b.svs").await.unwrap();
    registry.get_slide("c.svs").await.unwrap();
    assert_eq!(registry.cached_count().await, 2);
    assert_eq!(opens.load(Ordering::SeqCst), 3);

    // "a.svs" was evicted and must be reopened
    registry.get_slide("a.svs").await.unwrap();
    assert_eq!(opens.load(Ordering::SeqCst), 4);

    // "a.svs" is now cached
    registry.get_slide("a.svs").await.unwrap();
    assert_eq!(opens.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_registry_applies_options() {
    let source = MockSlideSource::new().with_slide("slide.svs", standard_backend());
    let options = DeepZoomOptions {
        tile_size: 510,
        overlap: 0,
        limit_bounds: false,
    };
    let registry = SlideRegistry::with_capacity(source, 4, options);

    let generator = registry.get_slide("slide.svs").await.unwrap();
    assert_eq!(generator.tile_size(), 510);
    assert_eq!(generator.overlap(), 0);
    assert_eq!(registry.options(), options);
}

#[tokio::test]
async fn test_invalidate_slide_drops_tiles() {
    let backend = standard_backend();
    let source = MockSlideSource::new().with_slide("slide.svs", backend.clone());
    let opens = source.open_counter();
    let service = TileService::new(SlideRegistry::new(source));

    let request = TileRequest::new("slide.svs", 10, 0, 0);
    service.get_tile(request.clone()).await.unwrap();
    assert_eq!(service.cache_stats().await.2, 1);

    service.invalidate_slide("slide.svs").await;
    assert_eq!(service.cache_stats().await.2, 0);
    assert_eq!(service.registry().cached_count().await, 0);

    let response = service.get_tile(request).await.unwrap();
    assert!(!response.cache_hit);
    assert_eq!(opens.load(Ordering::SeqCst), 2);
    assert_eq!(backend.read_count(), 2);
}
