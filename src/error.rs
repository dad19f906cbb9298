use thiserror::Error;

/// Errors raised at the OpenSlide library boundary.
///
/// Messages reported by the native library are carried through unchanged in
/// [`OpenslideError::Slide`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OpenslideError {
    /// The native library could not be loaded or is missing a required symbol
    #[error("OpenSlide library unavailable: {reason}")]
    LibraryUnavailable { reason: String },

    /// The slide file does not exist
    #[error("Slide not found: {path}")]
    NotFound { path: String },

    /// The file exists but is not recognised by OpenSlide
    #[error("Unsupported or missing image file: {path}")]
    UnsupportedFormat { path: String },

    /// Error reported by the native library (the slide is now in error state)
    #[error("OpenSlide error: {0}")]
    Slide(String),

    /// Requested level does not exist in the slide
    #[error("Invalid level: {level} (slide has {level_count} levels)")]
    InvalidLevel { level: usize, level_count: usize },

    /// Argument rejected before reaching the native library
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Requested associated image does not exist
    #[error("Associated image not found: {0}")]
    AssociatedImageNotFound(String),
}

/// Errors produced by the DeepZoom generator
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeepZoomError {
    /// Error while reading from the underlying slide
    #[error(transparent)]
    Slide(#[from] OpenslideError),

    /// DeepZoom level out of range
    #[error("Invalid DeepZoom level: {level} (generator has {level_count} levels)")]
    InvalidLevel { level: usize, level_count: usize },

    /// Tile address out of range for the level
    #[error("Tile ({col}, {row}) at level {level} is out of bounds ({max_col} x {max_row} tiles)")]
    TileOutOfBounds {
        level: usize,
        col: u64,
        row: u64,
        max_col: u64,
        max_row: u64,
    },

    /// Generator could not be built with the given parameters
    #[error("Invalid DeepZoom parameters: {0}")]
    InvalidParameters(String),
}

/// Errors that can occur while serving tiles
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Slide identifier did not resolve to a slide
    #[error("Slide not found: {slide_id}")]
    SlideNotFound { slide_id: String },

    /// Tile file name is not `{col}_{row}.{format}`
    #[error("Invalid tile name: {name}")]
    InvalidTileName { name: String },

    /// JPEG quality outside 1-100
    #[error("Invalid quality: {quality} (must be 1-100)")]
    InvalidQuality { quality: u8 },

    /// Tile geometry or rendering error
    #[error(transparent)]
    DeepZoom(#[from] DeepZoomError),

    /// Error opening or reading the slide
    #[error(transparent)]
    Slide(#[from] OpenslideError),

    /// Failed to encode the rendered tile
    #[error("Failed to encode tile: {message}")]
    EncodeError { message: String },

    /// Blocking render task did not complete
    #[error("Tile task failed: {message}")]
    Task { message: String },
}

impl From<tokio::task::JoinError> for TileError {
    fn from(err: tokio::task::JoinError) -> Self {
        TileError::Task {
            message: err.to_string(),
        }
    }
}
