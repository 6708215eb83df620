//! Common error types for the xrootfs toolset.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`XrootfsError`].
pub type XrootfsResult<T> = Result<T, XrootfsError>;

/// Common errors across the xrootfs crates.
///
/// Best-effort operations (ownership, timestamps, device nodes) never reach
/// this type; their failures are counted by the callers instead.
#[derive(Error, Diagnostic, Debug)]
pub enum XrootfsError {
    /// Malformed or truncated archive.
    #[error("Corrupt archive: {archive}: {reason}")]
    #[diagnostic(code(xrootfs::archive::corrupt))]
    ArchiveCorrupt {
        /// The archive that failed to parse.
        archive: String,
        /// What went wrong while reading it.
        reason: String,
    },

    /// Archive matches neither supported image format.
    #[error("Unrecognized archive format: {archive}")]
    #[diagnostic(
        code(xrootfs::archive::unsupported),
        help("Expected a Docker save tarball (manifest.json) or an OCI image layout (oci-layout + index.json)")
    )]
    UnsupportedFormat {
        /// The archive whose format was not recognized.
        archive: String,
    },

    /// Filesystem traversal failure while processing a layer.
    #[error("Failed to walk layer tree: {path}: {reason}")]
    #[diagnostic(code(xrootfs::layer::walk_failed))]
    WalkFailed {
        /// The path that could not be traversed or deleted.
        path: String,
        /// The underlying failure.
        reason: String,
    },

    /// Copy failure while merging a layer into the rootfs.
    #[error("Failed to merge layer entry: {path}: {reason}")]
    #[diagnostic(code(xrootfs::layer::merge_failed))]
    MergeFailed {
        /// The destination path that could not be written.
        path: String,
        /// The underlying failure.
        reason: String,
    },

    /// Symlink target recomputation failed.
    #[error("Failed to relocate symlink {link} -> {target}")]
    #[diagnostic(
        code(xrootfs::link::relocation_failed),
        help("This is a bug: both paths should be rooted under the same rootfs")
    )]
    LinkRelocationFailed {
        /// The symlink's destination path in the rootfs.
        link: String,
        /// The target recorded in the layer.
        target: String,
    },

    /// Invalid configuration or flag value.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(xrootfs::config))]
    Config {
        /// The error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(xrootfs::io))]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    #[diagnostic(code(xrootfs::serialization))]
    Serialization(String),
}

impl From<serde_json::Error> for XrootfsError {
    fn from(err: serde_json::Error) -> Self {
        XrootfsError::Serialization(err.to_string())
    }
}
