//! Test utilities for integration tests.
//!
//! This module provides an in-memory slide backend, a mock slide source and
//! helpers for driving the router.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use openslide_bind::deepzoom::DeepZoomOptions;
use openslide_bind::openslide::SlideBackend;
use openslide_bind::server::create_dev_router;
use openslide_bind::slide::{SlideListResult, SlideRegistry, SlideSource};
use openslide_bind::tile::TileService;
use openslide_bind::{Openslide, OpenslideError};

// =============================================================================
// Mock Backend
// =============================================================================

/// Opaque color of each pyramid level, as `[r, g, b]`.
pub const LEVEL_COLORS: [[u8; 3]; 3] = [[210, 30, 60], [30, 180, 90], [20, 60, 220]];

/// An in-memory slide whose levels are painted in solid colors.
///
/// Pixels outside a level are transparent, as OpenSlide reports them.
#[derive(Clone)]
pub struct MockBackend {
    dimensions: Vec<(u64, u64)>,
    downsamples: Vec<f64>,
    planes: usize,
    properties: BTreeMap<String, String>,
    associated: BTreeMap<String, (u64, u64)>,
    failure: Option<String>,
    reads: Arc<AtomicUsize>,
}

impl MockBackend {
    pub fn new(dimensions: Vec<(u64, u64)>, downsamples: Vec<f64>) -> Self {
        Self {
            dimensions,
            downsamples,
            planes: 1,
            properties: BTreeMap::new(),
            associated: BTreeMap::new(),
            failure: None,
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_planes(mut self, planes: usize) -> Self {
        self.planes = planes;
        self
    }

    pub fn with_property(mut self, name: &str, value: &str) -> Self {
        self.properties.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_associated(mut self, name: &str, size: (u64, u64)) -> Self {
        self.associated.insert(name.to_string(), size);
        self
    }

    /// Make every region read fail with `message`.
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// Number of region reads served so far, shared across clones.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn level_word(level: usize) -> u32 {
        let [r, g, b] = LEVEL_COLORS[level % LEVEL_COLORS.len()];
        u32::from_be_bytes([0xFF, r, g, b])
    }
}

impl SlideBackend for MockBackend {
    fn level_count(&self) -> usize {
        self.dimensions.len()
    }

    fn level_dimensions(&self, level: usize) -> Option<(u64, u64)> {
        self.dimensions.get(level).copied()
    }

    fn level_downsample(&self, level: usize) -> Option<f64> {
        self.downsamples.get(level).copied()
    }

    fn plane_count(&self) -> usize {
        self.planes
    }

    fn property_names(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    fn property_value(&self, name: &str) -> Option<String> {
        self.properties.get(name).cloned()
    }

    fn associated_image_names(&self) -> Vec<String> {
        self.associated.keys().cloned().collect()
    }

    fn associated_image_dimensions(&self, name: &str) -> Option<(u64, u64)> {
        self.associated.get(name).copied()
    }

    fn read_associated_image(&self, name: &str) -> Result<Vec<u32>, OpenslideError> {
        let (w, h) = self
            .associated_image_dimensions(name)
            .ok_or_else(|| OpenslideError::AssociatedImageNotFound(name.to_string()))?;
        Ok(vec![0xFF40_4040; (w * h) as usize])
    }

    fn read_region(
        &self,
        x: i64,
        y: i64,
        _plane: usize,
        level: usize,
        width: u64,
        height: u64,
    ) -> Result<Vec<u32>, OpenslideError> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = &self.failure {
            return Err(OpenslideError::Slide(message.clone()));
        }

        let (level_w, level_h) = self.dimensions[level];
        let ds = self.downsamples[level];
        let origin_x = (x as f64 / ds).floor() as i64;
        let origin_y = (y as f64 / ds).floor() as i64;
        let color = Self::level_word(level);

        let mut pixels = vec![0u32; (width * height) as usize];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            let col = origin_x + (i as u64 % width) as i64;
            let row = origin_y + (i as u64 / width) as i64;
            if col >= 0 && row >= 0 && (col as u64) < level_w && (row as u64) < level_h {
                *pixel = color;
            }
        }
        Ok(pixels)
    }
}

/// A two-level 1000x800 slide with typical metadata.
pub fn standard_backend() -> MockBackend {
    MockBackend::new(vec![(1000, 800), (250, 200)], vec![1.0, 4.0])
        .with_property("openslide.vendor", "mock")
        .with_property("openslide.mpp-x", "0.25")
        .with_property("openslide.mpp-y", "0.5")
        .with_property("mock.scanner", "bench-1")
        .with_associated("label", (64, 32))
}

/// Wrap a backend as a slide handle.
pub fn slide_from(backend: MockBackend) -> Arc<Openslide> {
    Arc::new(Openslide::from_backend(backend))
}

// =============================================================================
// Mock Slide Source
// =============================================================================

enum MockEntry {
    Slide(MockBackend),
    Error(OpenslideError),
}

/// A mock slide source that serves pre-configured in-memory slides.
pub struct MockSlideSource {
    entries: BTreeMap<String, MockEntry>,
    opens: Arc<AtomicUsize>,
}

impl MockSlideSource {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Serve `backend` under `slide_id`.
    pub fn with_slide(mut self, slide_id: &str, backend: MockBackend) -> Self {
        self.entries
            .insert(slide_id.to_string(), MockEntry::Slide(backend));
        self
    }

    /// Fail to open `slide_id` with `error`.
    pub fn with_error(mut self, slide_id: &str, error: OpenslideError) -> Self {
        self.entries
            .insert(slide_id.to_string(), MockEntry::Error(error));
        self
    }

    /// Shared counter of successful opens.
    pub fn open_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.opens)
    }
}

impl Default for MockSlideSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SlideSource for MockSlideSource {
    async fn open_slide(&self, slide_id: &str) -> Result<Openslide, OpenslideError> {
        match self.entries.get(slide_id) {
            Some(MockEntry::Slide(backend)) => {
                self.opens.fetch_add(1, Ordering::SeqCst);
                // Give concurrent callers a chance to pile up
                tokio::task::yield_now().await;
                Ok(Openslide::from_backend(backend.clone()))
            }
            Some(MockEntry::Error(err)) => Err(err.clone()),
            None => Err(OpenslideError::NotFound {
                path: slide_id.to_string(),
            }),
        }
    }

    async fn list_slides(
        &self,
        limit: u32,
        cursor: Option<&str>,
        prefix: Option<&str>,
    ) -> Result<SlideListResult, OpenslideError> {
        let mut matching = self
            .entries
            .keys()
            .filter(|id| prefix.map_or(true, |p| id.starts_with(p)))
            .filter(|id| cursor.map_or(true, |c| id.as_str() > c));

        let slides: Vec<String> = matching.by_ref().take(limit.max(1) as usize).cloned().collect();
        let next_cursor = if matching.next().is_some() {
            slides.last().cloned()
        } else {
            None
        };

        Ok(SlideListResult {
            slides,
            next_cursor,
        })
    }
}

// =============================================================================
// Router Helpers
// =============================================================================

/// Build a tile service with the default DeepZoom options.
pub fn tile_service(source: MockSlideSource) -> TileService<MockSlideSource> {
    TileService::new(SlideRegistry::with_capacity(
        source,
        10,
        DeepZoomOptions::default(),
    ))
}

/// Build a router over `source` with tracing disabled.
pub fn router(source: MockSlideSource) -> Router {
    create_dev_router(tile_service(source))
}

/// Issue a GET request and collect the response.
pub async fn get(router: &Router, uri: &str) -> (StatusCode, HeaderMap, Bytes) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body)
}

/// Issue a GET request and parse the body as JSON.
pub async fn get_json(router: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let (status, _, body) = get(router, uri).await;
    let json = serde_json::from_slice(&body).unwrap();
    (status, json)
}

// =============================================================================
// Image Checks
// =============================================================================

/// Check that data starts with a JPEG SOI marker and ends with EOI.
pub fn is_valid_jpeg(data: &[u8]) -> bool {
    data.len() >= 4 && data[..2] == [0xFF, 0xD8] && data[data.len() - 2..] == [0xFF, 0xD9]
}

/// Check that data starts with the PNG signature.
pub fn is_valid_png(data: &[u8]) -> bool {
    data.starts_with(b"\x89PNG\r\n\x1a\n")
}

/// Decode an encoded tile and return its dimensions.
pub fn image_dimensions(data: &[u8]) -> (u32, u32) {
    let image = image::load_from_memory(data).unwrap();
    (image.width(), image.height())
}
