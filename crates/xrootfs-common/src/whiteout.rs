//! Whiteout marker naming.
//!
//! Layers encode deletions as zero-length marker files: `.wh.<name>` deletes
//! `<name>` in the same directory, and `.wh..wh..opq` marks the containing
//! directory opaque (its pre-existing contents must be cleared).

/// Prefix of a per-entry whiteout marker file name.
pub const WHITEOUT_PREFIX: &str = ".wh.";

/// File name of an opaque-directory marker.
pub const OPAQUE_MARKER: &str = ".wh..wh..opq";

/// Check whether a file name is a whiteout marker of either kind.
#[must_use]
pub fn is_whiteout_name(name: &str) -> bool {
    name.starts_with(WHITEOUT_PREFIX)
}

/// Check whether a file name is the opaque-directory marker.
#[must_use]
pub fn is_opaque_name(name: &str) -> bool {
    name == OPAQUE_MARKER
}

/// The name a per-entry marker deletes.
///
/// Returns `None` for non-markers and for the opaque marker, which deletes
/// directory contents rather than a sibling.
#[must_use]
pub fn whiteout_target(name: &str) -> Option<&str> {
    if is_opaque_name(name) {
        return None;
    }
    name.strip_prefix(WHITEOUT_PREFIX)
}

/// The marker file name that deletes `name`.
#[must_use]
pub fn marker_name(name: &str) -> String {
    format!("{WHITEOUT_PREFIX}{name}")
}
