//! Symlink target relocation.
//!
//! When a layer's symlink is transplanted into the rootfs, its recorded
//! target still names a location in the *image's* namespace. An absolute
//! target like `/etc/foo` must not be followed to the host's `/etc/foo`, and
//! the rootfs must stay relocatable, so every target is re-expressed
//! relative to the link's own directory.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use xrootfs_common::{XrootfsError, XrootfsResult};

/// Compute the on-disk target for a symlink that will live at `link_path`
/// inside `rootfs`.
///
/// Absolute recorded targets are re-anchored under the rootfs root; relative
/// ones are resolved lexically against the link's directory, clamping `..`
/// at the rootfs root the way path walking clamps at `/`. The result is
/// relative to the link's containing directory, so the rootfs can be moved
/// or chrooted without the link breaking or escaping.
///
/// # Errors
///
/// Returns [`XrootfsError::LinkRelocationFailed`] when `link_path` is not
/// rooted under `rootfs`, an internal invariant violation rather than an
/// expected runtime failure.
pub fn relocate_target(rootfs: &Path, link_path: &Path, target: &Path) -> XrootfsResult<PathBuf> {
    let fail = || XrootfsError::LinkRelocationFailed {
        link: link_path.display().to_string(),
        target: target.display().to_string(),
    };
    let link_dir = link_path.parent().ok_or_else(fail)?;
    let link_rel = link_dir.strip_prefix(rootfs).map_err(|_| fail())?;

    // Where the author meant the link to point, relative to the image root.
    let resolved = if target.is_absolute() {
        normalize(Path::new(""), target)
    } else {
        normalize(link_rel, target)
    };

    Ok(diff(link_rel, &resolved))
}

/// Resolve `path` lexically against `base` (both relative to the image
/// root), clamping `..` at the root.
fn normalize(base: &Path, path: &Path) -> PathBuf {
    let mut parts: Vec<&OsStr> = base
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::ParentDir => {
                parts.pop();
            }
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
        }
    }
    parts.iter().collect()
}

/// The relative path from directory `from` to `to`, both relative to the
/// same root.
fn diff(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component<'_>> = from.components().collect();
    let to: Vec<Component<'_>> = to.components().collect();
    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..from.len() {
        out.push("..");
    }
    for component in &to[common..] {
        out.push(component);
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}
