//! The `Openslide` slide handle.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage, RgbaImage};
use tracing::debug;

use crate::error::OpenslideError;

use super::backend::{NativeBackend, SlideBackend};
use super::ffi;
use super::pixel::{argb_pixels_to_rgba, composite_on};
use super::properties::{
    parse_f64, parse_hex_color, parse_i64, SlideBounds, DEFAULT_BACKGROUND,
    PROPERTY_BACKGROUND_COLOR, PROPERTY_BOUNDS_HEIGHT, PROPERTY_BOUNDS_WIDTH, PROPERTY_BOUNDS_X,
    PROPERTY_BOUNDS_Y, PROPERTY_MPP_X, PROPERTY_MPP_Y, PROPERTY_VENDOR,
};

/// An open whole-slide image.
///
/// Reads are delegated to a [`SlideBackend`]; [`Openslide::open`] uses the
/// native library. The underlying slide is closed when the handle is
/// dropped. All methods take `&self`, so a handle can be shared across
/// threads behind an `Arc`.
///
/// # Example
///
/// ```no_run
/// use openslide_bind::Openslide;
///
/// let slide = Openslide::open("CMU-1.svs")?;
/// let (width, height) = slide.dimensions();
/// let region = slide.read_region((0, 0), 0, (512, 512))?;
/// assert_eq!(region.dimensions(), (512, 512));
/// # let _ = (width, height);
/// # Ok::<(), openslide_bind::OpenslideError>(())
/// ```
pub struct Openslide {
    backend: Box<dyn SlideBackend>,
    path: Option<PathBuf>,
}

impl fmt::Debug for Openslide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Openslide")
            .field("path", &self.path)
            .field("level_count", &self.level_count())
            .finish()
    }
}

impl Openslide {
    /// Open a slide file with the native library.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, OpenslideError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(OpenslideError::NotFound {
                path: path.display().to_string(),
            });
        }

        let backend = NativeBackend::open(path)?;
        Ok(Self {
            backend: Box::new(backend),
            path: Some(path.to_path_buf()),
        })
    }

    /// Wrap a custom backend.
    pub fn from_backend(backend: impl SlideBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            path: None,
        }
    }

    /// Identify the vendor of a slide file without opening it.
    ///
    /// Returns `Ok(None)` when the format is not recognised.
    pub fn detect_vendor(path: impl AsRef<Path>) -> Result<Option<String>, OpenslideError> {
        let path = path.as_ref();
        let library = ffi::library()?;
        let c_path = ffi::path_to_cstring(path)?;
        Ok(library.detect_vendor(&c_path))
    }

    /// Version string of the loaded native library.
    pub fn library_version() -> Result<String, OpenslideError> {
        Ok(ffi::library()?.version())
    }

    /// Path the slide was opened from, if it came from a file.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Sticky error reported by the native library, if any.
    pub fn error(&self) -> Option<String> {
        self.backend.error()
    }

    // =========================================================================
    // Geometry
    // =========================================================================

    /// Number of pyramid levels.
    pub fn level_count(&self) -> usize {
        self.backend.level_count()
    }

    /// Level-0 `(width, height)`.
    pub fn dimensions(&self) -> (u64, u64) {
        self.backend.level_dimensions(0).unwrap_or((0, 0))
    }

    /// `(width, height)` of `level`.
    pub fn level_dimensions(&self, level: usize) -> Result<(u64, u64), OpenslideError> {
        self.check_level(level)?;
        self.backend
            .level_dimensions(level)
            .ok_or_else(|| self.invalid_level(level))
    }

    /// `(width, height)` of every level, in level order.
    pub fn all_level_dimensions(&self) -> Vec<(u64, u64)> {
        (0..self.level_count())
            .filter_map(|level| self.backend.level_dimensions(level))
            .collect()
    }

    /// Downsample factor of `level` relative to level 0.
    pub fn level_downsample(&self, level: usize) -> Result<f64, OpenslideError> {
        self.check_level(level)?;
        self.backend
            .level_downsample(level)
            .ok_or_else(|| self.invalid_level(level))
    }

    /// Downsample factors of every level, in level order.
    pub fn level_downsamples(&self) -> Vec<f64> {
        (0..self.level_count())
            .filter_map(|level| self.backend.level_downsample(level))
            .collect()
    }

    /// Best level for reading at `downsample`.
    pub fn best_level_for_downsample(&self, downsample: f64) -> usize {
        self.backend.best_level_for_downsample(downsample)
    }

    /// Number of image planes.
    pub fn plane_count(&self) -> usize {
        self.backend.plane_count()
    }

    fn check_level(&self, level: usize) -> Result<(), OpenslideError> {
        if level < self.level_count() {
            Ok(())
        } else {
            Err(self.invalid_level(level))
        }
    }

    fn invalid_level(&self, level: usize) -> OpenslideError {
        OpenslideError::InvalidLevel {
            level,
            level_count: self.level_count(),
        }
    }

    // =========================================================================
    // Properties
    // =========================================================================

    /// All properties, sorted by name.
    pub fn properties(&self) -> BTreeMap<String, String> {
        self.backend
            .property_names()
            .into_iter()
            .filter_map(|name| {
                let value = self.backend.property_value(&name)?;
                Some((name, value))
            })
            .collect()
    }

    /// Value of a single property.
    pub fn property(&self, name: &str) -> Option<String> {
        self.backend.property_value(name)
    }

    /// Vendor reported by the slide.
    pub fn vendor(&self) -> Option<String> {
        self.property(PROPERTY_VENDOR)
    }

    /// Microns per pixel `(x, y)`, when both are declared.
    pub fn mpp(&self) -> Option<(f64, f64)> {
        let x = parse_f64(self.property(PROPERTY_MPP_X).as_deref())?;
        let y = parse_f64(self.property(PROPERTY_MPP_Y).as_deref())?;
        Some((x, y))
    }

    /// Non-empty region declared by the slide.
    pub fn bounds(&self) -> SlideBounds {
        let int = |name: &str| parse_i64(self.property(name).as_deref());
        SlideBounds {
            x: int(PROPERTY_BOUNDS_X),
            y: int(PROPERTY_BOUNDS_Y),
            width: int(PROPERTY_BOUNDS_WIDTH).and_then(|v| u64::try_from(v).ok()),
            height: int(PROPERTY_BOUNDS_HEIGHT).and_then(|v| u64::try_from(v).ok()),
        }
    }

    /// Background color, white unless the slide declares a valid one.
    pub fn background_color(&self) -> Rgb<u8> {
        self.property(PROPERTY_BACKGROUND_COLOR)
            .as_deref()
            .and_then(parse_hex_color)
            .unwrap_or(DEFAULT_BACKGROUND)
    }

    // =========================================================================
    // Associated Images
    // =========================================================================

    /// Names of associated images.
    pub fn associated_image_names(&self) -> Vec<String> {
        self.backend.associated_image_names()
    }

    /// `(width, height)` of an associated image.
    pub fn associated_image_dimensions(&self, name: &str) -> Result<(u64, u64), OpenslideError> {
        self.backend
            .associated_image_dimensions(name)
            .ok_or_else(|| OpenslideError::AssociatedImageNotFound(name.to_string()))
    }

    /// Read an associated image as straight RGBA.
    pub fn read_associated_image(&self, name: &str) -> Result<RgbaImage, OpenslideError> {
        let (width, height) = self.associated_image_dimensions(name)?;
        let pixels = self.backend.read_associated_image(name)?;
        to_rgba_image(width, height, &pixels)
    }

    // =========================================================================
    // Regions
    // =========================================================================

    /// Read a region of plane 0 as straight RGBA.
    ///
    /// `location` is the top-left corner in level-0 coordinates; `size` is
    /// in the coordinates of `level`.
    pub fn read_region(
        &self,
        location: (i64, i64),
        level: usize,
        size: (u32, u32),
    ) -> Result<RgbaImage, OpenslideError> {
        self.read_region_plane(location, 0, level, size)
    }

    /// Read a region of a given plane as straight RGBA.
    pub fn read_region_plane(
        &self,
        location: (i64, i64),
        plane: usize,
        level: usize,
        size: (u32, u32),
    ) -> Result<RgbaImage, OpenslideError> {
        self.check_level(level)?;

        let planes = self.plane_count();
        if plane >= planes {
            return Err(OpenslideError::InvalidArgument(format!(
                "plane {} out of range (slide has {} planes)",
                plane, planes
            )));
        }

        let (width, height) = size;
        if width == 0 || height == 0 {
            return Ok(RgbaImage::new(width, height));
        }

        let pixels = self.backend.read_region(
            location.0,
            location.1,
            plane,
            level,
            u64::from(width),
            u64::from(height),
        )?;
        to_rgba_image(u64::from(width), u64::from(height), &pixels)
    }

    /// Render a thumbnail fitting in `max_size`, flattened onto the
    /// background color.
    pub fn get_thumbnail(&self, max_size: (u32, u32)) -> Result<RgbImage, OpenslideError> {
        let (max_w, max_h) = max_size;
        if max_w == 0 || max_h == 0 {
            return Err(OpenslideError::InvalidArgument(
                "thumbnail size must be non-zero".to_string(),
            ));
        }

        let (width, height) = self.dimensions();
        if width == 0 || height == 0 {
            return Err(OpenslideError::InvalidArgument(
                "slide has no pixels".to_string(),
            ));
        }

        let downsample = (width as f64 / max_w as f64).max(height as f64 / max_h as f64);
        let level = self.best_level_for_downsample(downsample);
        let (level_w, level_h) = self.level_dimensions(level)?;
        let read_size = (
            u32::try_from(level_w).map_err(|_| too_large(level_w, level_h))?,
            u32::try_from(level_h).map_err(|_| too_large(level_w, level_h))?,
        );

        debug!(level, downsample, ?read_size, "Rendering thumbnail");

        let region = self.read_region((0, 0), level, read_size)?;
        let flat = composite_on(&region, self.background_color());

        let (thumb_w, thumb_h) = fit_within(read_size, max_size);
        if (thumb_w, thumb_h) == read_size {
            Ok(flat)
        } else {
            Ok(imageops::resize(&flat, thumb_w, thumb_h, FilterType::Lanczos3))
        }
    }
}

fn too_large(width: u64, height: u64) -> OpenslideError {
    OpenslideError::InvalidArgument(format!(
        "region of {}x{} pixels is too large",
        width, height
    ))
}

/// Scale `size` down to fit in `bounds`, preserving the aspect ratio.
fn fit_within(size: (u32, u32), bounds: (u32, u32)) -> (u32, u32) {
    let (w, h) = size;
    let (max_w, max_h) = bounds;
    if w <= max_w && h <= max_h {
        return size;
    }

    let scale = (max_w as f64 / w as f64).min(max_h as f64 / h as f64);
    let fitted_w = ((w as f64 * scale).round() as u32).clamp(1, max_w);
    let fitted_h = ((h as f64 * scale).round() as u32).clamp(1, max_h);
    (fitted_w, fitted_h)
}

fn to_rgba_image(width: u64, height: u64, pixels: &[u32]) -> Result<RgbaImage, OpenslideError> {
    let (w, h) = match (u32::try_from(width), u32::try_from(height)) {
        (Ok(w), Ok(h)) => (w, h),
        _ => return Err(too_large(width, height)),
    };

    RgbaImage::from_raw(w, h, argb_pixels_to_rgba(pixels)).ok_or_else(|| {
        OpenslideError::Slide(format!(
            "backend returned {} pixels for a {}x{} region",
            pixels.len(),
            width,
            height
        ))
    })
}

// =============================================================================
// Tests
// =============================================================================
