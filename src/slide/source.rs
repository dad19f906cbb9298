//! Slide sources: where slide identifiers resolve to openable files.

use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::OpenslideError;
use crate::openslide::Openslide;

/// File extensions recognised as whole-slide images.
pub const SLIDE_EXTENSIONS: &[&str] = &[
    "svs", "tif", "tiff", "ndpi", "vms", "vmu", "scn", "mrxs", "svslide", "bif", "vsi", "dcm",
];

/// One page of slide identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlideListResult {
    /// Slide identifiers in ascending order
    pub slides: Vec<String>,

    /// Pass as `cursor` to fetch the next page; `None` on the last page
    pub next_cursor: Option<String>,
}

// =============================================================================
// SlideSource Trait
// =============================================================================

/// Resolves slide identifiers to open slides.
///
/// The registry works against this trait so that slides can come from a
/// directory, a fixture, or any other store that can produce an
/// [`Openslide`].
#[async_trait]
pub trait SlideSource: Send + Sync + 'static {
    /// Open the slide with the given identifier.
    async fn open_slide(&self, slide_id: &str) -> Result<Openslide, OpenslideError>;

    /// List available slides in ascending identifier order.
    ///
    /// Identifiers after `cursor` are returned, at most `limit` of them,
    /// restricted to those starting with `prefix` when given. A `limit` of
    /// zero is treated as one, so every non-final page has a cursor.
    async fn list_slides(
        &self,
        limit: u32,
        cursor: Option<&str>,
        prefix: Option<&str>,
    ) -> Result<SlideListResult, OpenslideError>;
}

// =============================================================================
// LocalSlideSource
// =============================================================================

/// Slide source rooted at a local directory.
///
/// Slide identifiers are paths relative to the root, using `/` as the
/// separator. Identifiers that would escape the root are rejected.
#[derive(Debug, Clone)]
pub struct LocalSlideSource {
    root: PathBuf,
}

impl LocalSlideSource {
    /// Create a source serving slides under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a slide identifier to a path under the root.
    pub fn resolve(&self, slide_id: &str) -> Result<PathBuf, OpenslideError> {
        let relative = Path::new(slide_id);
        let is_plain = !slide_id.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));

        if !is_plain {
            return Err(OpenslideError::InvalidArgument(format!(
                "invalid slide id: {}",
                slide_id
            )));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl SlideSource for LocalSlideSource {
    async fn open_slide(&self, slide_id: &str) -> Result<Openslide, OpenslideError> {
        let path = self.resolve(slide_id)?;
        if !path.is_file() {
            return Err(OpenslideError::NotFound {
                path: slide_id.to_string(),
            });
        }

        debug!(slide_id = slide_id, path = %path.display(), "Opening slide");

        tokio::task::spawn_blocking(move || Openslide::open(&path))
            .await
            .map_err(|e| OpenslideError::Slide(format!("open task failed: {}", e)))?
    }

    async fn list_slides(
        &self,
        limit: u32,
        cursor: Option<&str>,
        prefix: Option<&str>,
    ) -> Result<SlideListResult, OpenslideError> {
        let root = self.root.clone();
        let mut slides = tokio::task::spawn_blocking(move || scan_slides(&root))
            .await
            .map_err(|e| OpenslideError::Slide(format!("listing task failed: {}", e)))??;

        if let Some(prefix) = prefix {
            slides.retain(|id| id.starts_with(prefix));
        }
        if let Some(cursor) = cursor {
            slides.retain(|id| id.as_str() > cursor);
        }

        let limit = limit.max(1) as usize;
        let next_cursor = if slides.len() > limit {
            slides.truncate(limit);
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

/// Whether `path` has a known whole-slide extension.
pub fn is_slide_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            SLIDE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Recursively collect slide identifiers under `root`, sorted.
fn scan_slides(root: &Path) -> Result<Vec<String>, OpenslideError> {
    let mut slides = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|e| io_error(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| io_error(&dir, e))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(|e| io_error(&path, e))?;

            if file_type.is_dir() {
                pending.push(path);
            } else if is_slide_file(&path) {
                if let Some(id) = slide_id_for(root, &path) {
                    slides.push(id);
                }
            }
        }
    }

    slides.sort();
    Ok(slides)
}

fn slide_id_for(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
    Some(parts?.join("/"))
}

fn io_error(path: &Path, err: io::Error) -> OpenslideError {
    if err.kind() == io::ErrorKind::NotFound {
        OpenslideError::NotFound {
            path: path.display().to_string(),
        }
    } else {
        OpenslideError::Slide(format!("cannot read {}: {}", path.display(), err))
    }
}

// =============================================================================
// Tests
// =============================================================================
