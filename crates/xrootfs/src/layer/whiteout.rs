//! Whiteout resolution against the accumulated rootfs.

use std::fs;
use std::io;
use std::path::Path;

use walkdir::WalkDir;
use xrootfs_common::whiteout::{is_opaque_name, whiteout_target};
use xrootfs_common::{XrootfsError, XrootfsResult};

use super::meta::LayerStats;

/// Apply every deletion a scratch layer tree encodes against `rootfs`, then
/// strip the markers so they are never merged.
///
/// An opaque marker `d/.wh..wh..opq` removes every entry directly inside
/// `rootfs/d`; one level is sufficient, nested directories carry their own
/// markers. A per-entry marker `d/.wh.<name>` removes `rootfs/d/<name>`
/// recursively. Deleting an already-absent path is a no-op. The walk is in
/// lexical order, so resolution is deterministic.
///
/// # Errors
///
/// Returns [`XrootfsError::WalkFailed`] when the scratch tree cannot be read
/// or a recorded deletion cannot be honored.
pub fn resolve_whiteouts(scratch: &Path, rootfs: &Path) -> XrootfsResult<LayerStats> {
    let mut stats = LayerStats::default();

    for entry in WalkDir::new(scratch).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|err| walk_failed(scratch, &err))?;
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        let rel = entry
            .path()
            .strip_prefix(scratch)
            .map_err(|err| walk_failed(entry.path(), &err))?;
        let parent = rel.parent().unwrap_or_else(|| Path::new(""));

        if is_opaque_name(name) {
            let dir = rootfs.join(parent);
            clear_dir(&dir)?;
            fs::remove_file(entry.path()).map_err(|err| walk_failed(entry.path(), &err))?;
            stats.whiteouts += 1;
            tracing::debug!(dir = %dir.display(), "Cleared opaque directory");
        } else if let Some(target) = whiteout_target(name) {
            let victim = rootfs.join(parent).join(target);
            remove_any(&victim)?;
            fs::remove_file(entry.path()).map_err(|err| walk_failed(entry.path(), &err))?;
            stats.whiteouts += 1;
            tracing::debug!(path = %victim.display(), "Applied whiteout");
        }
    }

    Ok(stats)
}

/// Remove every entry directly inside `dir`; an absent directory is a no-op.
fn clear_dir(dir: &Path) -> XrootfsResult<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(walk_failed(dir, &err)),
    };
    for entry in entries {
        let entry = entry.map_err(|err| walk_failed(dir, &err))?;
        remove_any(&entry.path())?;
    }
    Ok(())
}

/// Remove a file or directory tree; absence is a no-op.
fn remove_any(path: &Path) -> XrootfsResult<()> {
    let existing = match fs::symlink_metadata(path) {
        Ok(existing) => existing,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(walk_failed(path, &err)),
    };
    let removed = if existing.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match removed {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(walk_failed(path, &err)),
    }
}

fn walk_failed(path: &Path, reason: &dyn std::fmt::Display) -> XrootfsError {
    XrootfsError::WalkFailed {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn whiteout_removes_file_and_marker() {
        let temp = tempdir().unwrap();
        let (scratch, rootfs) = (temp.path().join("scratch"), temp.path().join("rootfs"));
        touch(&scratch.join("a/.wh.b.txt"));
        touch(&rootfs.join("a/b.txt"));

        let stats = resolve_whiteouts(&scratch, &rootfs).unwrap();

        assert_eq!(stats.whiteouts, 1);
        assert!(!rootfs.join("a/b.txt").exists());
        assert!(!scratch.join("a/.wh.b.txt").exists());
    }

    #[test]
    fn whiteout_removes_directory_tree() {
        let temp = tempdir().unwrap();
        let (scratch, rootfs) = (temp.path().join("scratch"), temp.path().join("rootfs"));
        touch(&scratch.join(".wh.sub"));
        touch(&rootfs.join("sub/deep/file"));

        resolve_whiteouts(&scratch, &rootfs).unwrap();

        assert!(!rootfs.join("sub").exists());
    }

    #[test]
    fn whiteout_of_absent_path_is_noop() {
        let temp = tempdir().unwrap();
        let (scratch, rootfs) = (temp.path().join("scratch"), temp.path().join("rootfs"));
        touch(&scratch.join(".wh.ghost"));
        fs::create_dir_all(&rootfs).unwrap();

        let stats = resolve_whiteouts(&scratch, &rootfs).unwrap();

        assert_eq!(stats.whiteouts, 1);
        assert!(!scratch.join(".wh.ghost").exists());
    }

    #[test]
    fn opaque_clears_one_level() {
        let temp = tempdir().unwrap();
        let (scratch, rootfs) = (temp.path().join("scratch"), temp.path().join("rootfs"));
        touch(&scratch.join("d/.wh..wh..opq"));
        touch(&scratch.join("d/fresh.txt"));
        touch(&rootfs.join("d/old.txt"));
        touch(&rootfs.join("d/nested/old.txt"));

        resolve_whiteouts(&scratch, &rootfs).unwrap();

        assert!(rootfs.join("d").exists());
        assert!(!rootfs.join("d/old.txt").exists());
        assert!(!rootfs.join("d/nested").exists());
        // Only the marker is consumed; the layer's own additions stay put.
        assert!(scratch.join("d/fresh.txt").exists());
        assert!(!scratch.join("d/.wh..wh..opq").exists());
    }

    #[test]
    fn opaque_on_absent_directory_is_noop() {
        let temp = tempdir().unwrap();
        let (scratch, rootfs) = (temp.path().join("scratch"), temp.path().join("rootfs"));
        touch(&scratch.join("new/.wh..wh..opq"));
        fs::create_dir_all(&rootfs).unwrap();

        resolve_whiteouts(&scratch, &rootfs).unwrap();

        assert!(!scratch.join("new/.wh..wh..opq").exists());
    }
}
