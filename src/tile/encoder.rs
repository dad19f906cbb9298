//! Tile encoder.
//!
//! Rendered DeepZoom tiles are RGB images; this module turns them into
//! JPEG or PNG bytes for HTTP responses.
//!
//! # Design Decisions
//!
//! - **Quality control**: JPEG quality is configurable per request, allowing
//!   clients to trade off file size vs image quality.
//! - **PNG ignores quality**: PNG output is lossless and always encoded with
//!   the default compression.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};

use crate::deepzoom::TileFormat;
use crate::error::TileError;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

// =============================================================================
// Tile Encoder
// =============================================================================

/// Encoder for rendered tiles.
///
/// # Example
///
/// ```
/// use image::RgbImage;
/// use openslide_bind::deepzoom::TileFormat;
/// use openslide_bind::tile::TileEncoder;
///
/// let encoder = TileEncoder::new();
/// let tile = RgbImage::new(16, 16);
///
/// let jpeg = encoder.encode(&tile, TileFormat::Jpeg, 85).unwrap();
/// assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TileEncoder {}

impl TileEncoder {
    /// Create a new tile encoder.
    pub fn new() -> Self {
        Self {}
    }

    /// Encode a tile in the given format.
    ///
    /// `quality` is clamped to 1-100 and only affects JPEG output.
    pub fn encode(
        &self,
        tile: &RgbImage,
        format: TileFormat,
        quality: u8,
    ) -> Result<Bytes, TileError> {
        let mut output = Vec::new();

        match format {
            TileFormat::Jpeg => {
                let mut encoder = JpegEncoder::new_with_quality(&mut output, clamp_quality(quality));
                encoder.encode_image(tile).map_err(encode_error)?;
            }
            TileFormat::Png => {
                PngEncoder::new(&mut output)
                    .write_image(
                        tile.as_raw(),
                        tile.width(),
                        tile.height(),
                        ExtendedColorType::Rgb8,
                    )
                    .map_err(encode_error)?;
            }
        }

        Ok(Bytes::from(output))
    }

    /// Encode a tile as JPEG at the default quality.
    pub fn encode_default(&self, tile: &RgbImage) -> Result<Bytes, TileError> {
        self.encode(tile, TileFormat::Jpeg, DEFAULT_JPEG_QUALITY)
    }
}

fn encode_error(err: image::ImageError) -> TileError {
    TileError::EncodeError {
        message: err.to_string(),
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Validate JPEG quality parameter.
///
/// Returns `true` if quality is in the valid range (1-100).
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp quality to valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

// =============================================================================
// Tests
// =============================================================================
