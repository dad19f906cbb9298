//! Deep Zoom Image (DZI) descriptors and tile names.
//!
//! Deep Zoom numbers its levels from the 1x1 image (level 0) up to full
//! resolution, the inverse of a slide pyramid. Tiles are addressed by
//! file name `{col}_{row}.{format}` inside a level directory.

use std::fmt;

/// Image format of DeepZoom tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TileFormat {
    #[default]
    Jpeg,
    Png,
}

impl TileFormat {
    /// Parse a file extension (`jpeg`, `jpg` or `png`, case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Some(TileFormat::Jpeg),
            "png" => Some(TileFormat::Png),
            _ => None,
        }
    }

    /// Value of the DZI `Format` attribute.
    pub fn extension(&self) -> &'static str {
        match self {
            TileFormat::Jpeg => "jpeg",
            TileFormat::Png => "png",
        }
    }

    /// HTTP content type of encoded tiles.
    pub fn content_type(&self) -> &'static str {
        match self {
            TileFormat::Jpeg => "image/jpeg",
            TileFormat::Png => "image/png",
        }
    }
}

impl fmt::Display for TileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Generate the DZI XML descriptor for an image.
///
/// # Example Output
///
/// ```xml
/// <?xml version="1.0" encoding="UTF-8"?>
/// <Image xmlns="http://schemas.microsoft.com/deepzoom/2008"
///        TileSize="254"
///        Overlap="1"
///        Format="jpeg">
///   <Size Width="46920" Height="33600" />
/// </Image>
/// ```
pub fn generate_dzi_xml(
    width: u64,
    height: u64,
    tile_size: u32,
    overlap: u32,
    format: TileFormat,
) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Image xmlns="http://schemas.microsoft.com/deepzoom/2008"
       TileSize="{tile_size}"
       Overlap="{overlap}"
       Format="{format}">
  <Size Width="{width}" Height="{height}" />
</Image>"#
    )
}

/// Parse a tile file name like `"3_5.jpeg"` into `(col, row, format)`.
pub fn parse_tile_name(filename: &str) -> Option<(u64, u64, TileFormat)> {
    let (name, ext) = filename.rsplit_once('.')?;
    let format = TileFormat::from_extension(ext)?;

    let (col, row) = name.split_once('_')?;
    let col: u64 = col.parse().ok()?;
    let row: u64 = row.parse().ok()?;

    Some((col, row, format))
}

/// Number of tiles needed to cover `length` pixels.
pub fn tiles_for(length: u64, tile_size: u32) -> u64 {
    length.div_ceil(u64::from(tile_size))
}
