//! Well-known OpenSlide property names and typed accessors.

use image::Rgb;

/// Comment embedded in the slide
pub const PROPERTY_COMMENT: &str = "openslide.comment";
/// Vendor that produced the slide
pub const PROPERTY_VENDOR: &str = "openslide.vendor";
/// Quickhash of the slide contents
pub const PROPERTY_QUICKHASH1: &str = "openslide.quickhash-1";
/// Background color as `RRGGBB` hex
pub const PROPERTY_BACKGROUND_COLOR: &str = "openslide.background-color";
/// Objective power of the scanner
pub const PROPERTY_OBJECTIVE_POWER: &str = "openslide.objective-power";
/// Microns per pixel along X
pub const PROPERTY_MPP_X: &str = "openslide.mpp-x";
/// Microns per pixel along Y
pub const PROPERTY_MPP_Y: &str = "openslide.mpp-y";
/// Level-0 X of the non-empty region
pub const PROPERTY_BOUNDS_X: &str = "openslide.bounds-x";
/// Level-0 Y of the non-empty region
pub const PROPERTY_BOUNDS_Y: &str = "openslide.bounds-y";
/// Level-0 width of the non-empty region
pub const PROPERTY_BOUNDS_WIDTH: &str = "openslide.bounds-width";
/// Level-0 height of the non-empty region
pub const PROPERTY_BOUNDS_HEIGHT: &str = "openslide.bounds-height";

/// Background used when the slide does not declare one.
pub const DEFAULT_BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// Non-empty region of a slide in level-0 coordinates.
///
/// Each field is `None` when the slide does not declare it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlideBounds {
    pub x: Option<i64>,
    pub y: Option<i64>,
    pub width: Option<u64>,
    pub height: Option<u64>,
}

impl SlideBounds {
    /// Whether any bound is declared.
    pub fn is_declared(&self) -> bool {
        self.x.is_some() || self.y.is_some() || self.width.is_some() || self.height.is_some()
    }
}

/// Parse a property as a float, ignoring surrounding whitespace.
pub fn parse_f64(value: Option<&str>) -> Option<f64> {
    value?.trim().parse().ok().filter(|v: &f64| v.is_finite())
}

/// Parse a property as an integer, accepting integral float spellings.
pub fn parse_i64(value: Option<&str>) -> Option<i64> {
    let value = value?.trim();
    value
        .parse::<i64>()
        .ok()
        .or_else(|| parse_f64(Some(value)).map(|v| v as i64))
}

/// Parse an `RRGGBB` hex color, with or without a leading `#`.
pub fn parse_hex_color(value: &str) -> Option<Rgb<u8>> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }

    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some(Rgb([channel(0)?, channel(2)?, channel(4)?]))
}
