//! DeepZoom tile generator over an open slide.

use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use tracing::debug;

use crate::error::{DeepZoomError, OpenslideError};
use crate::openslide::pixel::composite_on;
use crate::openslide::Openslide;

use super::dzi::{generate_dzi_xml, tiles_for, TileFormat};

/// Default DeepZoom tile edge, chosen so that tile plus overlap is 256.
pub const DEFAULT_TILE_SIZE: u32 = 254;

/// Default overlap between adjacent tiles.
pub const DEFAULT_OVERLAP: u32 = 1;

/// Parameters for building a [`DeepZoomGenerator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeepZoomOptions {
    /// Tile edge in pixels, excluding overlap
    pub tile_size: u32,
    /// Pixels shared with each interior neighbour
    pub overlap: u32,
    /// Restrict the pyramid to the slide's declared non-empty bounds
    pub limit_bounds: bool,
}

impl Default for DeepZoomOptions {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            overlap: DEFAULT_OVERLAP,
            limit_bounds: false,
        }
    }
}

/// Arguments for the `read_region` call backing one DeepZoom tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileInfo {
    /// Top-left corner in level-0 coordinates
    pub l0_location: (i64, i64),
    /// Slide level to read from
    pub slide_level: usize,
    /// Size of the region in slide-level pixels
    pub l_size: (u32, u32),
    /// Final size of the tile in DeepZoom pixels
    pub z_size: (u32, u32),
}

/// Computes DeepZoom pyramid geometry for a slide and renders its tiles.
///
/// DeepZoom level `levels - 1` is full resolution; each lower level halves
/// the dimensions (rounding up) down to a 1x1 image at level 0. Each
/// DeepZoom level reads from the slide level with the closest downsample
/// and scales the remainder.
#[derive(Debug)]
pub struct DeepZoomGenerator {
    slide: Arc<Openslide>,
    tile_size: u32,
    overlap: u32,
    limit_bounds: bool,

    /// Level-0 offset of the active area
    l0_offset: (i64, i64),
    /// Slide level dimensions, clipped to the active area
    l_dimensions: Vec<(u64, u64)>,
    /// DeepZoom level dimensions
    z_dimensions: Vec<(u64, u64)>,
    /// Tiles per DeepZoom level
    t_dimensions: Vec<(u64, u64)>,
    /// Slide level read for each DeepZoom level
    slide_from_dz_level: Vec<usize>,
    /// Slide level downsamples relative to level 0
    l0_l_downsamples: Vec<f64>,
    /// Remaining downsample from the slide level to each DeepZoom level
    l_z_downsamples: Vec<f64>,
    background: Rgb<u8>,
}

impl DeepZoomGenerator {
    /// Build a generator over `slide`.
    pub fn new(
        slide: Arc<Openslide>,
        tile_size: u32,
        overlap: u32,
        limit_bounds: bool,
    ) -> Result<Self, DeepZoomError> {
        if tile_size == 0 {
            return Err(DeepZoomError::InvalidParameters(
                "tile size must be greater than zero".to_string(),
            ));
        }

        let level_count = slide.level_count();
        let slide_dimensions = slide.all_level_dimensions();
        let l0_l_downsamples = slide.level_downsamples();
        if level_count == 0
            || slide_dimensions.len() != level_count
            || l0_l_downsamples.len() != level_count
        {
            return Err(DeepZoomError::InvalidParameters(
                "slide has no readable levels".to_string(),
            ));
        }

        let (l0_offset, l_dimensions) = if limit_bounds {
            let bounds = slide.bounds();
            let (l0_w, l0_h) = slide_dimensions[0];
            let offset = (bounds.x.unwrap_or(0), bounds.y.unwrap_or(0));
            let scale_x = bounds.width.map_or(1.0, |w| w as f64 / l0_w.max(1) as f64);
            let scale_y = bounds.height.map_or(1.0, |h| h as f64 / l0_h.max(1) as f64);
            let dims = slide_dimensions
                .iter()
                .map(|&(w, h)| {
                    (
                        (w as f64 * scale_x).ceil() as u64,
                        (h as f64 * scale_y).ceil() as u64,
                    )
                })
                .collect();
            (offset, dims)
        } else {
            ((0, 0), slide_dimensions)
        };

        let (l0_w, l0_h) = l_dimensions[0];
        if l0_w == 0 || l0_h == 0 {
            return Err(DeepZoomError::InvalidParameters(format!(
                "slide area is empty ({}x{})",
                l0_w, l0_h
            )));
        }

        // DeepZoom levels, built from full resolution down to 1x1
        let mut z_size = (l0_w, l0_h);
        let mut z_dimensions = vec![z_size];
        while z_size.0 > 1 || z_size.1 > 1 {
            z_size = (z_size.0.div_ceil(2).max(1), z_size.1.div_ceil(2).max(1));
            z_dimensions.push(z_size);
        }
        z_dimensions.reverse();

        let t_dimensions = z_dimensions
            .iter()
            .map(|&(w, h)| (tiles_for(w, tile_size), tiles_for(h, tile_size)))
            .collect();

        let dz_levels = z_dimensions.len();
        let l0_z_downsamples: Vec<f64> = (0..dz_levels)
            .map(|z| 2f64.powi((dz_levels - z - 1) as i32))
            .collect();

        let slide_from_dz_level: Vec<usize> = l0_z_downsamples
            .iter()
            .map(|&ds| slide.best_level_for_downsample(ds).min(level_count - 1))
            .collect();

        let l_z_downsamples = l0_z_downsamples
            .iter()
            .zip(&slide_from_dz_level)
            .map(|(&ds, &level)| ds / l0_l_downsamples[level])
            .collect();

        let background = slide.background_color();

        debug!(
            levels = dz_levels,
            tile_size, overlap, limit_bounds, "Built DeepZoom generator"
        );

        Ok(Self {
            slide,
            tile_size,
            overlap,
            limit_bounds,
            l0_offset,
            l_dimensions,
            z_dimensions,
            t_dimensions,
            slide_from_dz_level,
            l0_l_downsamples,
            l_z_downsamples,
            background,
        })
    }

    /// Build a generator from a set of options.
    pub fn with_options(
        slide: Arc<Openslide>,
        options: DeepZoomOptions,
    ) -> Result<Self, DeepZoomError> {
        Self::new(
            slide,
            options.tile_size,
            options.overlap,
            options.limit_bounds,
        )
    }

    // =========================================================================
    // Geometry
    // =========================================================================

    /// The slide this generator reads from.
    pub fn slide(&self) -> &Arc<Openslide> {
        &self.slide
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn overlap(&self) -> u32 {
        self.overlap
    }

    pub fn limit_bounds(&self) -> bool {
        self.limit_bounds
    }

    /// Number of DeepZoom levels.
    pub fn level_count(&self) -> usize {
        self.z_dimensions.len()
    }

    /// `(columns, rows)` of tiles for each DeepZoom level.
    pub fn level_tiles(&self) -> &[(u64, u64)] {
        &self.t_dimensions
    }

    /// `(width, height)` of each DeepZoom level.
    pub fn level_dimensions(&self) -> &[(u64, u64)] {
        &self.z_dimensions
    }

    /// Total number of tiles over all levels.
    pub fn tile_count(&self) -> u64 {
        self.t_dimensions.iter().map(|&(c, r)| c * r).sum()
    }

    /// Number of image planes in the slide.
    pub fn plane_count(&self) -> usize {
        self.slide.plane_count()
    }

    /// Dimensions of the (possibly bounded) full-resolution image.
    pub fn l0_dimensions(&self) -> (u64, u64) {
        self.l_dimensions[0]
    }

    /// Microns per pixel of the full-resolution image.
    pub fn mpp(&self) -> Option<(f64, f64)> {
        self.slide.mpp()
    }

    /// Background color tiles are flattened onto.
    pub fn background_color(&self) -> Rgb<u8> {
        self.background
    }

    /// Slide level read for a DeepZoom level.
    pub fn slide_level_for(&self, level: usize) -> Option<usize> {
        self.slide_from_dz_level.get(level).copied()
    }

    // =========================================================================
    // Tiles
    // =========================================================================

    /// Compute the `read_region` arguments and final size of a tile.
    ///
    /// Interior edges carry `overlap` extra pixels; edges on the border of
    /// the image do not.
    pub fn get_tile_info(
        &self,
        level: usize,
        address: (u64, u64),
    ) -> Result<TileInfo, DeepZoomError> {
        if level >= self.level_count() {
            return Err(DeepZoomError::InvalidLevel {
                level,
                level_count: self.level_count(),
            });
        }

        let (col, row) = address;
        let (max_col, max_row) = self.t_dimensions[level];
        if col >= max_col || row >= max_row {
            return Err(DeepZoomError::TileOutOfBounds {
                level,
                col,
                row,
                max_col,
                max_row,
            });
        }

        let slide_level = self.slide_from_dz_level[level];
        let (z_w, z_h) = self.z_dimensions[level];
        let (l_w, l_h) = self.l_dimensions[slide_level];

        let x = self.tile_axis(level, slide_level, col, max_col, z_w, l_w, self.l0_offset.0);
        let y = self.tile_axis(level, slide_level, row, max_row, z_h, l_h, self.l0_offset.1);

        Ok(TileInfo {
            l0_location: (x.l0_location, y.l0_location),
            slide_level,
            l_size: (to_u32(x.l_size)?, to_u32(y.l_size)?),
            z_size: (to_u32(x.z_size)?, to_u32(y.z_size)?),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn tile_axis(
        &self,
        level: usize,
        slide_level: usize,
        t: u64,
        t_lim: u64,
        z_lim: u64,
        l_lim: u64,
        l0_offset: i64,
    ) -> AxisInfo {
        let tile_size = u64::from(self.tile_size);
        let overlap = u64::from(self.overlap);
        let l_z_downsample = self.l_z_downsamples[level];

        let overlap_tl = if t != 0 { overlap } else { 0 };
        let overlap_br = if t + 1 != t_lim { overlap } else { 0 };

        let z_size = tile_size.min(z_lim - tile_size * t) + overlap_tl + overlap_br;

        // Overlap may exceed the tile size, so the read can start left of
        // or above the slide
        let z_location = (tile_size * t) as i64 - overlap_tl as i64;
        let l_location = l_z_downsample * z_location as f64;
        let l0_location =
            (self.l0_l_downsamples[slide_level] * l_location) as i64 + l0_offset;

        let wanted = (l_z_downsample * z_size as f64).ceil();
        let remaining = l_lim as f64 - l_location.ceil();
        let l_size = wanted.min(remaining).max(0.0) as u64;

        AxisInfo {
            l0_location,
            l_size,
            z_size,
        }
    }

    /// Render a tile of plane 0.
    pub fn get_tile(&self, level: usize, address: (u64, u64)) -> Result<RgbImage, DeepZoomError> {
        self.get_tile_plane(0, level, address)
    }

    /// Render a tile of the given plane, flattened onto the background.
    pub fn get_tile_plane(
        &self,
        plane: usize,
        level: usize,
        address: (u64, u64),
    ) -> Result<RgbImage, DeepZoomError> {
        let info = self.get_tile_info(level, address)?;
        let (z_w, z_h) = info.z_size;

        if info.l_size.0 == 0 || info.l_size.1 == 0 {
            return Ok(RgbImage::from_pixel(z_w, z_h, self.background));
        }

        let region =
            self.slide
                .read_region_plane(info.l0_location, plane, info.slide_level, info.l_size)?;
        let tile = composite_on(&region, self.background);

        if tile.dimensions() == info.z_size {
            Ok(tile)
        } else {
            Ok(imageops::resize(&tile, z_w, z_h, FilterType::Lanczos3))
        }
    }

    /// DZI descriptor for this pyramid.
    pub fn get_dzi(&self, format: TileFormat) -> String {
        let (width, height) = self.l0_dimensions();
        generate_dzi_xml(width, height, self.tile_size, self.overlap, format)
    }
}

struct AxisInfo {
    l0_location: i64,
    l_size: u64,
    z_size: u64,
}

fn to_u32(value: u64) -> Result<u32, DeepZoomError> {
    u32::try_from(value).map_err(|_| {
        DeepZoomError::Slide(OpenslideError::InvalidArgument(format!(
            "tile dimension {} is too large",
            value
        )))
    })
}

// =============================================================================
// Tests
// =============================================================================
