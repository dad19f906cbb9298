//! Runtime binding to the OpenSlide C library.
//!
//! `libopenslide` is resolved once per process with `libloading`. Building
//! and testing the crate does not require the library; only operations that
//! actually touch a native slide do.
//!
//! # Lookup Order
//!
//! 1. The path passed to [`init_library`]
//! 2. The `WSI_OPENSLIDE_LIB` environment variable
//! 3. Platform default names (`libopenslide.so.1`, `libopenslide.dylib`, ...)
//!
//! The outcome of the first lookup is cached, including failures.

use std::ffi::{c_char, CStr, CString, OsString};
use std::path::Path;
use std::sync::OnceLock;

use libloading::Library;
use tracing::{debug, warn};

use crate::error::OpenslideError;

/// Environment variable naming an explicit library path.
pub const LIBRARY_ENV: &str = "WSI_OPENSLIDE_LIB";

#[cfg(target_os = "linux")]
const DEFAULT_LIBRARY_NAMES: &[&str] = &["libopenslide.so.1", "libopenslide.so.0", "libopenslide.so"];

#[cfg(target_os = "macos")]
const DEFAULT_LIBRARY_NAMES: &[&str] = &["libopenslide.1.dylib", "libopenslide.dylib"];

#[cfg(target_os = "windows")]
const DEFAULT_LIBRARY_NAMES: &[&str] = &["libopenslide-1.dll", "libopenslide-0.dll"];

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
const DEFAULT_LIBRARY_NAMES: &[&str] = &["libopenslide.so"];

/// Opaque `openslide_t`.
#[repr(C)]
pub(crate) struct OpenslideT {
    _private: [u8; 0],
}

type OpenFn = unsafe extern "C" fn(*const c_char) -> *mut OpenslideT;
type CloseFn = unsafe extern "C" fn(*mut OpenslideT);
type GetErrorFn = unsafe extern "C" fn(*mut OpenslideT) -> *const c_char;
type LevelCountFn = unsafe extern "C" fn(*mut OpenslideT) -> i32;
type LevelDimensionsFn = unsafe extern "C" fn(*mut OpenslideT, i32, *mut i64, *mut i64);
type LevelDownsampleFn = unsafe extern "C" fn(*mut OpenslideT, i32) -> f64;
type BestLevelFn = unsafe extern "C" fn(*mut OpenslideT, f64) -> i32;
type PlaneCountFn = unsafe extern "C" fn(*mut OpenslideT) -> i32;
type ReadRegionFlatFn = unsafe extern "C" fn(*mut OpenslideT, *mut u32, i64, i64, i32, i64, i64);
type ReadRegionPlanarFn =
    unsafe extern "C" fn(*mut OpenslideT, *mut u32, i64, i64, i64, i32, i64, i64);
type StringArrayFn = unsafe extern "C" fn(*mut OpenslideT) -> *const *const c_char;
type PropertyValueFn = unsafe extern "C" fn(*mut OpenslideT, *const c_char) -> *const c_char;
type AssociatedDimensionsFn =
    unsafe extern "C" fn(*mut OpenslideT, *const c_char, *mut i64, *mut i64);
type ReadAssociatedFn = unsafe extern "C" fn(*mut OpenslideT, *const c_char, *mut u32);
type DetectVendorFn = unsafe extern "C" fn(*const c_char) -> *const c_char;
type VersionFn = unsafe extern "C" fn() -> *const c_char;

/// `openslide_read_region` has an extra `plane` argument in plane-aware
/// builds, which are recognised by exporting `openslide_get_plane_count`.
#[derive(Clone, Copy)]
pub(crate) enum ReadRegionFn {
    Flat(ReadRegionFlatFn),
    Planar(ReadRegionPlanarFn),
}

/// Function table resolved from a loaded `libopenslide`.
pub struct NativeLibrary {
    pub(crate) open: OpenFn,
    pub(crate) close: CloseFn,
    pub(crate) get_error: GetErrorFn,
    pub(crate) get_level_count: LevelCountFn,
    pub(crate) get_level_dimensions: LevelDimensionsFn,
    pub(crate) get_level_downsample: LevelDownsampleFn,
    pub(crate) get_best_level_for_downsample: BestLevelFn,
    pub(crate) get_plane_count: Option<PlaneCountFn>,
    pub(crate) read_region: ReadRegionFn,
    pub(crate) get_property_names: StringArrayFn,
    pub(crate) get_property_value: PropertyValueFn,
    pub(crate) get_associated_image_names: StringArrayFn,
    pub(crate) get_associated_image_dimensions: AssociatedDimensionsFn,
    pub(crate) read_associated_image: ReadAssociatedFn,
    detect_vendor: DetectVendorFn,
    get_version: VersionFn,
    source: String,
    // Keeps every function pointer above valid.
    _library: Library,
}

static LIBRARY: OnceLock<Result<NativeLibrary, String>> = OnceLock::new();

/// Load `libopenslide`, optionally from an explicit path.
///
/// Only the first call performs a lookup. Later calls return the cached
/// library (or the cached failure) regardless of `path`.
pub fn init_library(path: Option<&Path>) -> Result<&'static NativeLibrary, OpenslideError> {
    let result = LIBRARY.get_or_init(|| load(path));

    if let (Some(requested), Ok(lib)) = (path, result) {
        if Path::new(&lib.source) != requested {
            warn!(
                requested = %requested.display(),
                loaded = %lib.source,
                "OpenSlide library already loaded from a different path"
            );
        }
    }

    result
        .as_ref()
        .map_err(|reason| OpenslideError::LibraryUnavailable {
            reason: reason.clone(),
        })
}

/// Get the process-wide library, loading it with the default lookup if needed.
pub(crate) fn library() -> Result<&'static NativeLibrary, OpenslideError> {
    init_library(None)
}

fn load(explicit: Option<&Path>) -> Result<NativeLibrary, String> {
    let candidates: Vec<OsString> = match explicit {
        Some(path) => vec![path.as_os_str().to_owned()],
        None => match std::env::var_os(LIBRARY_ENV) {
            Some(path) => vec![path],
            None => DEFAULT_LIBRARY_NAMES.iter().map(OsString::from).collect(),
        },
    };

    let mut failures = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let name = candidate.to_string_lossy().into_owned();
        // SAFETY: loading libopenslide runs its initialisers, which have no
        // preconditions beyond a working dynamic loader.
        match unsafe { Library::new(&candidate) } {
            Ok(library) => {
                debug!(library = %name, "Loaded OpenSlide library");
                return NativeLibrary::bind(library, name);
            }
            Err(e) => failures.push(format!("{}: {}", name, e)),
        }
    }

    Err(format!(
        "could not load libopenslide ({})",
        failures.join("; ")
    ))
}

/// Copy a function pointer out of the library.
///
/// # Safety
///
/// `T` must match the C signature of `name`.
unsafe fn symbol<T: Copy>(library: &Library, name: &str) -> Result<T, String> {
    let mut bytes = Vec::with_capacity(name.len() + 1);
    bytes.extend_from_slice(name.as_bytes());
    bytes.push(0);

    library
        .get::<T>(&bytes)
        .map(|sym| *sym)
        .map_err(|e| format!("missing symbol {}: {}", name, e))
}

impl NativeLibrary {
    fn bind(library: Library, source: String) -> Result<Self, String> {
        // SAFETY: every type alias above mirrors the declaration in openslide.h.
        unsafe {
            let get_plane_count = symbol::<PlaneCountFn>(&library, "openslide_get_plane_count").ok();
            let read_region = if get_plane_count.is_some() {
                ReadRegionFn::Planar(symbol(&library, "openslide_read_region")?)
            } else {
                ReadRegionFn::Flat(symbol(&library, "openslide_read_region")?)
            };

            Ok(Self {
                open: symbol(&library, "openslide_open")?,
                close: symbol(&library, "openslide_close")?,
                get_error: symbol(&library, "openslide_get_error")?,
                get_level_count: symbol(&library, "openslide_get_level_count")?,
                get_level_dimensions: symbol(&library, "openslide_get_level_dimensions")?,
                get_level_downsample: symbol(&library, "openslide_get_level_downsample")?,
                get_best_level_for_downsample: symbol(
                    &library,
                    "openslide_get_best_level_for_downsample",
                )?,
                get_plane_count,
                read_region,
                get_property_names: symbol(&library, "openslide_get_property_names")?,
                get_property_value: symbol(&library, "openslide_get_property_value")?,
                get_associated_image_names: symbol(
                    &library,
                    "openslide_get_associated_image_names",
                )?,
                get_associated_image_dimensions: symbol(
                    &library,
                    "openslide_get_associated_image_dimensions",
                )?,
                read_associated_image: symbol(&library, "openslide_read_associated_image")?,
                detect_vendor: symbol(&library, "openslide_detect_vendor")?,
                get_version: symbol(&library, "openslide_get_version")?,
                source,
                _library: library,
            })
        }
    }

    /// Path or file name the library was loaded from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether this build reads multi-plane (fluorescence) slides.
    pub fn supports_planes(&self) -> bool {
        self.get_plane_count.is_some()
    }

    /// Version string reported by the native library.
    pub fn version(&self) -> String {
        // SAFETY: openslide_get_version returns a static string.
        unsafe { string_from_ptr((self.get_version)()) }.unwrap_or_default()
    }

    /// Quickly identify the vendor of a slide file without opening it.
    pub fn detect_vendor(&self, path: &CStr) -> Option<String> {
        // SAFETY: `path` is NUL terminated; the result is a static string or NULL.
        unsafe { string_from_ptr((self.detect_vendor)(path.as_ptr())) }
    }
}

/// Copy a C string owned by the library.
///
/// # Safety
///
/// `ptr` must be NULL or point to a NUL-terminated string.
pub(crate) unsafe fn string_from_ptr(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
    }
}

/// Copy a NULL-terminated array of C strings owned by the library.
///
/// # Safety
///
/// `ptr` must be NULL or point to a NULL-terminated array of valid C strings.
pub(crate) unsafe fn strings_from_array(ptr: *const *const c_char) -> Vec<String> {
    let mut strings = Vec::new();
    if ptr.is_null() {
        return strings;
    }

    let mut cursor = ptr;
    while !(*cursor).is_null() {
        if let Some(s) = string_from_ptr(*cursor) {
            strings.push(s);
        }
        cursor = cursor.add(1);
    }
    strings
}

/// Convert a path for the C API (UTF-8 on Windows, raw bytes elsewhere).
pub(crate) fn path_to_cstring(path: &Path) -> Result<CString, OpenslideError> {
    #[cfg(unix)]
    let bytes = {
        use std::os::unix::ffi::OsStrExt;
        path.as_os_str().as_bytes().to_vec()
    };

    #[cfg(not(unix))]
    let bytes = path
        .to_str()
        .ok_or_else(|| {
            OpenslideError::InvalidArgument(format!(
                "path is not valid UTF-8: {}",
                path.display()
            ))
        })?
        .as_bytes()
        .to_vec();

    CString::new(bytes).map_err(|_| {
        OpenslideError::InvalidArgument(format!(
            "path contains an interior NUL byte: {}",
            path.display()
        ))
    })
}

/// Convert a property or image name for the C API.
pub(crate) fn name_to_cstring(name: &str) -> Result<CString, OpenslideError> {
    CString::new(name).map_err(|_| {
        OpenslideError::InvalidArgument(format!("name contains an interior NUL byte: {:?}", name))
    })
}
