//! SlideBackend trait for access to an open slide.
//!
//! [`Openslide`](super::Openslide) delegates every read to a `SlideBackend`.
//! [`NativeBackend`] implements it on top of `libopenslide`; tests and
//! embedders can supply their own implementation.

use std::ptr::NonNull;

use tracing::debug;

use crate::error::OpenslideError;

use super::ffi::{
    self, name_to_cstring, string_from_ptr, strings_from_array, NativeLibrary, OpenslideT,
    ReadRegionFn,
};

// =============================================================================
// SlideBackend Trait
// =============================================================================

/// Low-level access to one open whole-slide image.
///
/// Pixel data is returned as premultiplied ARGB words, row-major, exactly as
/// OpenSlide produces it. Level and plane indices have already been
/// validated by the caller.
pub trait SlideBackend: Send + Sync {
    /// Number of pyramid levels. Level 0 is the highest resolution.
    fn level_count(&self) -> usize;

    /// `(width, height)` of a level, or `None` if out of range.
    fn level_dimensions(&self, level: usize) -> Option<(u64, u64)>;

    /// Downsample factor of a level relative to level 0.
    fn level_downsample(&self, level: usize) -> Option<f64>;

    /// Best level for reading at `downsample`.
    ///
    /// Returns 0 when `downsample` is below level 0's factor, otherwise the
    /// last level whose factor does not exceed it.
    fn best_level_for_downsample(&self, downsample: f64) -> usize {
        let count = self.level_count();
        if count == 0 {
            return 0;
        }

        let level0 = self.level_downsample(0).unwrap_or(1.0);
        if downsample < level0 {
            return 0;
        }

        for level in 1..count {
            match self.level_downsample(level) {
                Some(ds) if downsample < ds => return level - 1,
                Some(_) => {}
                None => return level - 1,
            }
        }

        count - 1
    }

    /// Number of image planes. Brightfield slides have one.
    fn plane_count(&self) -> usize {
        1
    }

    /// Names of all slide properties.
    fn property_names(&self) -> Vec<String>;

    /// Value of a single property.
    fn property_value(&self, name: &str) -> Option<String>;

    /// Names of associated images (label, macro, thumbnail, ...).
    fn associated_image_names(&self) -> Vec<String>;

    /// `(width, height)` of an associated image.
    fn associated_image_dimensions(&self, name: &str) -> Option<(u64, u64)>;

    /// Read a complete associated image as premultiplied ARGB.
    fn read_associated_image(&self, name: &str) -> Result<Vec<u32>, OpenslideError>;

    /// Read a region as premultiplied ARGB.
    ///
    /// `(x, y)` is in level-0 coordinates; `(width, height)` in the
    /// coordinates of `level`. Pixels outside the slide are transparent.
    fn read_region(
        &self,
        x: i64,
        y: i64,
        plane: usize,
        level: usize,
        width: u64,
        height: u64,
    ) -> Result<Vec<u32>, OpenslideError>;

    /// Sticky error message, if the slide is in error state.
    fn error(&self) -> Option<String> {
        None
    }
}

// =============================================================================
// Native Backend
// =============================================================================

/// `SlideBackend` backed by an `openslide_t` from the native library.
pub struct NativeBackend {
    library: &'static NativeLibrary,
    osr: NonNull<OpenslideT>,
}

// SAFETY: libopenslide is thread-safe for every call except
// openslide_close, which only runs from `Drop` with exclusive access.
unsafe impl Send for NativeBackend {}
unsafe impl Sync for NativeBackend {}

impl NativeBackend {
    /// Open a slide through the native library.
    ///
    /// The caller has already checked that `path` exists.
    pub fn open(path: &std::path::Path) -> Result<Self, OpenslideError> {
        let library = ffi::library()?;
        let c_path = ffi::path_to_cstring(path)?;

        // SAFETY: c_path is a valid NUL-terminated string.
        let raw = unsafe { (library.open)(c_path.as_ptr()) };
        let osr = NonNull::new(raw).ok_or_else(|| OpenslideError::UnsupportedFormat {
            path: path.display().to_string(),
        })?;

        let backend = Self { library, osr };
        if let Some(message) = backend.error() {
            // Dropping the backend closes the failed handle.
            return Err(OpenslideError::Slide(message));
        }

        debug!(path = %path.display(), "Opened native slide");
        Ok(backend)
    }

    fn ptr(&self) -> *mut OpenslideT {
        self.osr.as_ptr()
    }

    fn check_error(&self) -> Result<(), OpenslideError> {
        match self.error() {
            Some(message) => Err(OpenslideError::Slide(message)),
            None => Ok(()),
        }
    }
}

/// Allocate a pixel buffer, rejecting sizes that do not fit in memory.
pub(crate) fn pixel_buffer(width: u64, height: u64) -> Result<Vec<u32>, OpenslideError> {
    let len = width
        .checked_mul(height)
        .and_then(|n| usize::try_from(n).ok())
        .filter(|n| n.checked_mul(4).is_some())
        .ok_or_else(|| {
            OpenslideError::InvalidArgument(format!(
                "region of {}x{} pixels is too large",
                width, height
            ))
        })?;
    Ok(vec![0u32; len])
}

impl SlideBackend for NativeBackend {
    fn level_count(&self) -> usize {
        // SAFETY: osr is a live handle for the lifetime of self.
        let count = unsafe { (self.library.get_level_count)(self.ptr()) };
        usize::try_from(count).unwrap_or(0)
    }

    fn level_dimensions(&self, level: usize) -> Option<(u64, u64)> {
        let level = i32::try_from(level).ok()?;
        let (mut w, mut h) = (-1i64, -1i64);
        // SAFETY: w and h are valid out pointers.
        unsafe { (self.library.get_level_dimensions)(self.ptr(), level, &mut w, &mut h) };
        if w < 0 || h < 0 {
            None
        } else {
            Some((w as u64, h as u64))
        }
    }

    fn level_downsample(&self, level: usize) -> Option<f64> {
        let level = i32::try_from(level).ok()?;
        // SAFETY: osr is live.
        let ds = unsafe { (self.library.get_level_downsample)(self.ptr(), level) };
        (ds > 0.0).then_some(ds)
    }

    fn best_level_for_downsample(&self, downsample: f64) -> usize {
        // SAFETY: osr is live.
        let level = unsafe { (self.library.get_best_level_for_downsample)(self.ptr(), downsample) };
        usize::try_from(level).unwrap_or(0)
    }

    fn plane_count(&self) -> usize {
        match self.library.get_plane_count {
            // SAFETY: osr is live.
            Some(f) => usize::try_from(unsafe { f(self.ptr()) }).unwrap_or(0).max(1),
            None => 1,
        }
    }

    fn property_names(&self) -> Vec<String> {
        // SAFETY: the array is owned by osr and outlives this call.
        unsafe { strings_from_array((self.library.get_property_names)(self.ptr())) }
    }

    fn property_value(&self, name: &str) -> Option<String> {
        let c_name = name_to_cstring(name).ok()?;
        // SAFETY: c_name is NUL terminated; the value is owned by osr.
        unsafe { string_from_ptr((self.library.get_property_value)(self.ptr(), c_name.as_ptr())) }
    }

    fn associated_image_names(&self) -> Vec<String> {
        // SAFETY: the array is owned by osr.
        unsafe { strings_from_array((self.library.get_associated_image_names)(self.ptr())) }
    }

    fn associated_image_dimensions(&self, name: &str) -> Option<(u64, u64)> {
        let c_name = name_to_cstring(name).ok()?;
        let (mut w, mut h) = (-1i64, -1i64);
        // SAFETY: valid name and out pointers.
        unsafe {
            (self.library.get_associated_image_dimensions)(
                self.ptr(),
                c_name.as_ptr(),
                &mut w,
                &mut h,
            )
        };
        if w < 0 || h < 0 {
            None
        } else {
            Some((w as u64, h as u64))
        }
    }

    fn read_associated_image(&self, name: &str) -> Result<Vec<u32>, OpenslideError> {
        let (w, h) = self
            .associated_image_dimensions(name)
            .ok_or_else(|| OpenslideError::AssociatedImageNotFound(name.to_string()))?;
        let c_name = name_to_cstring(name)?;
        let mut dest = pixel_buffer(w, h)?;

        // SAFETY: dest holds exactly w * h words as the API requires.
        unsafe {
            (self.library.read_associated_image)(self.ptr(), c_name.as_ptr(), dest.as_mut_ptr())
        };
        self.check_error()?;
        Ok(dest)
    }

    fn read_region(
        &self,
        x: i64,
        y: i64,
        plane: usize,
        level: usize,
        width: u64,
        height: u64,
    ) -> Result<Vec<u32>, OpenslideError> {
        let level = i32::try_from(level)
            .map_err(|_| OpenslideError::InvalidArgument(format!("level {} too large", level)))?;
        let (w, h) = match (i64::try_from(width), i64::try_from(height)) {
            (Ok(w), Ok(h)) => (w, h),
            _ => {
                return Err(OpenslideError::InvalidArgument(format!(
                    "region of {}x{} pixels is too large",
                    width, height
                )))
            }
        };
        let mut dest = pixel_buffer(width, height)?;

        // SAFETY: dest holds exactly width * height words.
        unsafe {
            match self.library.read_region {
                ReadRegionFn::Flat(f) => f(self.ptr(), dest.as_mut_ptr(), x, y, level, w, h),
                ReadRegionFn::Planar(f) => {
                    f(self.ptr(), dest.as_mut_ptr(), x, y, plane as i64, level, w, h)
                }
            }
        }
        self.check_error()?;
        Ok(dest)
    }

    fn error(&self) -> Option<String> {
        // SAFETY: osr is live; the message is owned by osr.
        unsafe { string_from_ptr((self.library.get_error)(self.ptr())) }
    }
}

impl Drop for NativeBackend {
    fn drop(&mut self) {
        // SAFETY: &mut self guarantees no other thread is using the handle.
        unsafe { (self.library.close)(self.ptr()) };
    }
}

// =============================================================================
// Tests
// =============================================================================
