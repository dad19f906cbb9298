//! Slide Registry for managing slide lifecycle and caching.
//!
//! The registry provides:
//! - LRU caching of DeepZoom generators so each slide is opened once
//! - Singleflight pattern to prevent duplicate opens for the same slide
//!
//! # Example
//!
//! ```ignore
//! use openslide_bind::slide::{LocalSlideSource, SlideRegistry};
//!
//! let registry = SlideRegistry::new(LocalSlideSource::new("/data/slides"));
//!
//! // Opens and caches on first access
//! let generator = registry.get_slide("case1/slide.svs").await?;
//! let tile = generator.get_tile(generator.level_count() - 1, (0, 0))?;
//! ```

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, MutexGuard, PoisonError};

use lru::LruCache;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{debug, info};

use crate::deepzoom::{DeepZoomGenerator, DeepZoomOptions};
use crate::error::{DeepZoomError, OpenslideError};

use super::source::SlideSource;

/// Default capacity for slide cache (number of slides).
pub const DEFAULT_SLIDE_CACHE_CAPACITY: usize = 100;

type OpenResult = Result<Arc<DeepZoomGenerator>, DeepZoomError>;

// =============================================================================
// SlideRegistry
// =============================================================================

/// Registry for managing slide lifecycle and caching.
///
/// The registry:
/// - Caches opened slides, wrapped in DeepZoom generators, with LRU eviction
/// - Opens slides on demand through its [`SlideSource`]
/// - Uses singleflight to prevent duplicate opens for the same slide
///
/// Evicted slides are closed once the last in-flight request drops its
/// `Arc`.
pub struct SlideRegistry<S: SlideSource> {
    /// The source slides are opened from
    source: S,

    /// Tiling parameters for every generator
    options: DeepZoomOptions,

    /// Cached generators indexed by slide ID
    cache: RwLock<LruCache<String, Arc<DeepZoomGenerator>>>,

    /// In-flight opens for singleflight pattern
    in_flight: InFlightMap,
}

/// State for an in-flight slide open operation.
struct InFlightState {
    /// Notification for waiters
    notify: Notify,
    /// Result of the open operation (set when complete)
    result: Mutex<Option<OpenResult>>,
}

type InFlightMap = std::sync::Mutex<HashMap<String, Arc<InFlightState>>>;

/// Removes the leader's in-flight entry and wakes its waiters on drop.
struct InFlightGuard<'a> {
    in_flight: &'a InFlightMap,
    slide_id: &'a str,
    state: Arc<InFlightState>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = lock_in_flight(self.in_flight);
        if in_flight
            .get(self.slide_id)
            .is_some_and(|current| Arc::ptr_eq(current, &self.state))
        {
            in_flight.remove(self.slide_id);
        }
        drop(in_flight);
        self.state.notify.notify_waiters();
    }
}

/// The map is never held across an await, so a poisoned lock still holds
/// consistent data.
fn lock_in_flight(
    in_flight: &InFlightMap,
) -> MutexGuard<'_, HashMap<String, Arc<InFlightState>>> {
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S: SlideSource> SlideRegistry<S> {
    /// Create a registry with the default capacity and tiling options.
    pub fn new(source: S) -> Self {
        Self::with_capacity(
            source,
            DEFAULT_SLIDE_CACHE_CAPACITY,
            DeepZoomOptions::default(),
        )
    }

    /// Create a registry with a custom capacity and tiling options.
    ///
    /// A capacity of zero is treated as one.
    pub fn with_capacity(source: S, slide_cache_capacity: usize, options: DeepZoomOptions) -> Self {
        let capacity = NonZeroUsize::new(slide_cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            source,
            options,
            cache: RwLock::new(LruCache::new(capacity)),
            in_flight: InFlightMap::default(),
        }
    }

    /// The slide source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Tiling options used for every slide.
    pub fn options(&self) -> DeepZoomOptions {
        self.options
    }

    /// Get a slide's generator, opening the slide if not already cached.
    ///
    /// Concurrent requests for the same uncached slide share one open. If
    /// the caller leading an open is cancelled, a waiting caller takes over.
    pub async fn get_slide(&self, slide_id: &str) -> OpenResult {
        loop {
            // Fast path: check cache
            {
                let mut cache = self.cache.write().await;
                if let Some(generator) = cache.get(slide_id) {
                    return Ok(Arc::clone(generator));
                }
            }

            let (state, is_leader) = {
                let mut in_flight = lock_in_flight(&self.in_flight);

                match in_flight.get(slide_id) {
                    Some(state) => (Arc::clone(state), false),
                    None => {
                        // We're the leader for opening this slide
                        let state = Arc::new(InFlightState {
                            notify: Notify::new(),
                            result: Mutex::new(None),
                        });
                        in_flight.insert(slide_id.to_string(), Arc::clone(&state));
                        (state, true)
                    }
                }
            };

            if is_leader {
                return self.lead_open(slide_id, state).await;
            }

            // Register interest before checking the result so a completion
            // between the check and the await is not missed
            let notified = state.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(result) = state.result.lock().await.clone() {
                return result;
            }

            notified.await;

            if let Some(result) = state.result.lock().await.clone() {
                return result;
            }

            // The leader was cancelled before finishing; retry, possibly
            // as the new leader
            debug!(slide_id = slide_id, "Slide open abandoned, retrying");
        }
    }

    async fn lead_open(&self, slide_id: &str, state: Arc<InFlightState>) -> OpenResult {
        // Releases waiters even if this future is dropped mid-open
        let _guard = InFlightGuard {
            in_flight: &self.in_flight,
            slide_id,
            state: Arc::clone(&state),
        };

        let result = self.open_slide_internal(slide_id).await;

        if let Ok(ref generator) = result {
            let mut cache = self.cache.write().await;
            cache.put(slide_id.to_string(), Arc::clone(generator));
        }

        *state.result.lock().await = Some(result.clone());

        result
    }

    /// Open a slide without caching (internal implementation).
    async fn open_slide_internal(&self, slide_id: &str) -> OpenResult {
        let slide = self.source.open_slide(slide_id).await?;
        let options = self.options;

        // Building the pyramid queries the native library
        let generator = tokio::task::spawn_blocking(move || {
            DeepZoomGenerator::with_options(Arc::new(slide), options)
        })
        .await
        .map_err(|e| OpenslideError::Slide(format!("open task failed: {}", e)))??;

        info!(
            slide_id = slide_id,
            dz_levels = generator.level_count(),
            "Opened slide"
        );
        Ok(Arc::new(generator))
    }

    /// Remove a slide from the cache.
    pub async fn invalidate(&self, slide_id: &str) {
        let mut cache = self.cache.write().await;
        if cache.pop(slide_id).is_some() {
            debug!(slide_id = slide_id, "Invalidated slide");
        }
    }

    /// Clear all cached slides.
    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        cache.clear();
    }

    /// Get the number of cached slides.
    pub async fn cached_count(&self) -> usize {
        let cache = self.cache.read().await;
        cache.len()
    }
}

// =============================================================================
// Tests
// =============================================================================
