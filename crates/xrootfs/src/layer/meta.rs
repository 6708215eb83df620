//! Best-effort metadata application.
//!
//! Ownership, timestamps, and special-node creation are expected to fail in
//! unprivileged runs. The helpers here never return errors; callers count
//! the skips in [`LayerStats`] so degraded runs stay observable without
//! being conflated with hard failures.

use std::path::Path;

use filetime::FileTime;
use rustix::fs::{makedev, mknodat, FileType, Mode, CWD};

/// Counters for one layer-processing step.
///
/// Fatal failures surface as errors; these only record work that was done,
/// plus best-effort operations the platform refused.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LayerStats {
    /// Filesystem nodes created or replaced.
    pub entries: u64,
    /// Whiteout deletions applied against the rootfs.
    pub whiteouts: u64,
    /// Ownership changes the platform refused.
    pub chown_skipped: u64,
    /// Timestamp changes the platform refused.
    pub times_skipped: u64,
    /// Device or FIFO nodes that could not be created.
    pub nodes_skipped: u64,
}

impl LayerStats {
    /// Fold another step's counters into this one.
    pub fn absorb(&mut self, other: Self) {
        self.entries += other.entries;
        self.whiteouts += other.whiteouts;
        self.chown_skipped += other.chown_skipped;
        self.times_skipped += other.times_skipped;
        self.nodes_skipped += other.nodes_skipped;
    }

    /// Whether any best-effort operation was skipped.
    #[must_use]
    pub const fn degraded(&self) -> bool {
        self.chown_skipped > 0 || self.times_skipped > 0 || self.nodes_skipped > 0
    }
}

/// Change ownership of `path` without following symlinks.
///
/// Returns `false` when the platform refuses (unprivileged run, unsupported
/// filesystem).
pub(crate) fn lchown(path: &Path, uid: u32, gid: u32) -> bool {
    match std::os::unix::fs::lchown(path, Some(uid), Some(gid)) {
        Ok(()) => true,
        Err(err) => {
            tracing::debug!(path = %path.display(), %err, "Ownership not applied");
            false
        }
    }
}

/// Set access and modification times on `path`.
pub(crate) fn set_times(path: &Path, atime: FileTime, mtime: FileTime, symlink: bool) -> bool {
    let result = if symlink {
        filetime::set_symlink_file_times(path, atime, mtime)
    } else {
        filetime::set_file_times(path, atime, mtime)
    };
    match result {
        Ok(()) => true,
        Err(err) => {
            tracing::debug!(path = %path.display(), %err, "Timestamps not applied");
            false
        }
    }
}

/// Create a device or FIFO node. Device nodes require CAP_MKNOD.
pub(crate) fn mknod(path: &Path, kind: FileType, mode: u32, major: u32, minor: u32) -> bool {
    match mknodat(
        CWD,
        path,
        kind,
        Mode::from_raw_mode(mode),
        makedev(major, minor),
    ) {
        Ok(()) => true,
        Err(err) => {
            tracing::debug!(path = %path.display(), %err, "Node not created");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_absorb_sums_counters() {
        let mut total = LayerStats {
            entries: 2,
            whiteouts: 1,
            ..Default::default()
        };
        total.absorb(LayerStats {
            entries: 3,
            chown_skipped: 4,
            ..Default::default()
        });

        assert_eq!(total.entries, 5);
        assert_eq!(total.whiteouts, 1);
        assert_eq!(total.chown_skipped, 4);
    }

    #[test]
    fn degraded_tracks_best_effort_skips() {
        assert!(!LayerStats::default().degraded());
        assert!(!LayerStats { entries: 10, ..Default::default() }.degraded());
        assert!(LayerStats { times_skipped: 1, ..Default::default() }.degraded());
        assert!(LayerStats { nodes_skipped: 2, ..Default::default() }.degraded());
    }

    #[test]
    fn fifo_creation_is_unprivileged() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("pipe");
        assert!(mknod(&path, FileType::Fifo, 0o644, 0, 0));
        assert!(path.exists());
    }

    #[test]
    fn mknod_on_missing_parent_reports_skip() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("absent").join("pipe");
        assert!(!mknod(&path, FileType::Fifo, 0o644, 0, 0));
    }
}
