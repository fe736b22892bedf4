//! Error types for indexing and patching.
//!
//! Only conditions that abort a whole operation are represented here. Per-entry
//! problems (an orphaned original, a candidate image that fails to decode, a
//! file outside the `original`/`patched` layout) are logged with `tracing` and
//! skipped, so they never surface as an [`Error`].

use camino::Utf8PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while indexing mods or patching an asset.
#[derive(Error, Debug)]
pub enum Error {
    /// Filesystem I/O failed (scanning a mod, reading a cached asset, etc.).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse or serialize JSON (mod descriptor, cache index).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Encoding a composited image failed.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// The configured mod descriptor file does not exist.
    #[error("Mod descriptor not found: {0}")]
    DescriptorNotFound(Utf8PathBuf),

    /// A file inside a mod is neither under an `original`/`patched` directory
    /// nor prefixed with `original`/`patched`.
    #[error("Invalid override path: {0}")]
    InvalidOverridePath(Utf8PathBuf),

    /// An asset key that does not name a file below the cache root.
    #[error("Invalid asset key: {0}")]
    InvalidAssetKey(String),

    /// The requested asset itself could not be decoded as an image. Nothing
    /// is cached for the request.
    #[error("Failed to decode base image '{path}': {source}")]
    BaseImageDecode {
        path: String,
        #[source]
        source: image::ImageError,
    },

    /// The spritesheet metadata next to a cached image is malformed.
    #[error("Invalid spritesheet metadata '{path}': {source}")]
    SpritesheetMeta {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Catch-all for errors from collaborators and other sources.
    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}
