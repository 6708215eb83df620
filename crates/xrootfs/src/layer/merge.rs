//! Layer merge into the accumulated rootfs.

use std::fs;
use std::io;
use std::os::unix::fs::{symlink, FileTypeExt, MetadataExt, PermissionsExt};
use std::path::Path;

use filetime::FileTime;
use rustix::fs::FileType;
use walkdir::WalkDir;
use xrootfs_common::{XrootfsError, XrootfsResult};

use super::meta::{self, LayerStats};
use super::relocate::relocate_target;

/// Copy every remaining entry of a whiteout-resolved scratch tree into
/// `rootfs`, overwriting any existing node at the same path.
///
/// Symlink targets are recomputed with [`relocate_target`] unless
/// `relocate_links` is false, in which case the recorded target is copied
/// verbatim (accepts dangling or escaping links). The walk is in lexical
/// order with directories preceding their contents, so repeated merges of
/// the same inputs produce identical trees.
///
/// # Errors
///
/// Returns [`XrootfsError::MergeFailed`] for any filesystem failure other
/// than the best-effort metadata operations. A failed merge aborts the run
/// and leaves the rootfs partially populated; there is no rollback.
pub fn merge_layer(
    scratch: &Path,
    rootfs: &Path,
    relocate_links: bool,
) -> XrootfsResult<LayerStats> {
    let mut stats = LayerStats::default();

    for entry in WalkDir::new(scratch).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|err| merge_failed(scratch, &err))?;
        let rel = entry
            .path()
            .strip_prefix(scratch)
            .map_err(|err| merge_failed(entry.path(), &err))?;
        let dst = rootfs.join(rel);
        let src_meta = entry.metadata().map_err(|err| merge_failed(entry.path(), &err))?;
        let file_type = src_meta.file_type();

        if file_type.is_dir() {
            merge_dir(&src_meta, &dst, &mut stats)?;
        } else if file_type.is_symlink() {
            merge_symlink(entry.path(), &src_meta, &dst, rootfs, relocate_links, &mut stats)?;
        } else if file_type.is_file() {
            merge_file(entry.path(), &src_meta, &dst, &mut stats)?;
        } else {
            merge_node(&src_meta, &dst, &mut stats);
        }
        stats.entries += 1;
    }

    Ok(stats)
}

fn merge_dir(src_meta: &fs::Metadata, dst: &Path, stats: &mut LayerStats) -> XrootfsResult<()> {
    match fs::symlink_metadata(dst) {
        Ok(existing) if existing.is_dir() => {}
        Ok(_) => {
            // A directory replaces whatever non-directory sat here before.
            fs::remove_file(dst).map_err(|err| merge_failed(dst, &err))?;
            fs::create_dir(dst).map_err(|err| merge_failed(dst, &err))?;
        }
        Err(_) => fs::create_dir_all(dst).map_err(|err| merge_failed(dst, &err))?,
    }
    fs::set_permissions(dst, fs::Permissions::from_mode(src_meta.mode() & 0o7777))
        .map_err(|err| merge_failed(dst, &err))?;
    if !meta::lchown(dst, src_meta.uid(), src_meta.gid()) {
        stats.chown_skipped += 1;
    }
    Ok(())
}

fn merge_symlink(
    src: &Path,
    src_meta: &fs::Metadata,
    dst: &Path,
    rootfs: &Path,
    relocate_links: bool,
    stats: &mut LayerStats,
) -> XrootfsResult<()> {
    let literal = fs::read_link(src).map_err(|err| merge_failed(src, &err))?;
    let target = if relocate_links {
        relocate_target(rootfs, dst, &literal)?
    } else {
        literal
    };

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|err| merge_failed(dst, &err))?;
    }
    remove_existing(dst)?;
    symlink(&target, dst).map_err(|err| merge_failed(dst, &err))?;

    let atime = FileTime::from_last_access_time(src_meta);
    let mtime = FileTime::from_last_modification_time(src_meta);
    if !meta::set_times(dst, atime, mtime, true) {
        stats.times_skipped += 1;
    }
    Ok(())
}

fn merge_file(
    src: &Path,
    src_meta: &fs::Metadata,
    dst: &Path,
    stats: &mut LayerStats,
) -> XrootfsResult<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|err| merge_failed(dst, &err))?;
    }
    // Replace the node itself; creating through a pre-existing symlink would
    // write to its target instead.
    remove_existing(dst)?;

    let mut input = fs::File::open(src).map_err(|err| merge_failed(src, &err))?;
    let mut out = fs::File::create(dst).map_err(|err| merge_failed(dst, &err))?;
    io::copy(&mut input, &mut out).map_err(|err| merge_failed(dst, &err))?;
    fs::set_permissions(dst, fs::Permissions::from_mode(src_meta.mode() & 0o7777))
        .map_err(|err| merge_failed(dst, &err))?;

    if !meta::lchown(dst, src_meta.uid(), src_meta.gid()) {
        stats.chown_skipped += 1;
    }
    let mtime = FileTime::from_last_modification_time(src_meta);
    if !meta::set_times(dst, FileTime::now(), mtime, false) {
        stats.times_skipped += 1;
    }
    Ok(())
}

/// FIFOs (and, under privilege, device nodes) are carried best-effort.
fn merge_node(src_meta: &fs::Metadata, dst: &Path, stats: &mut LayerStats) {
    let file_type = src_meta.file_type();
    let kind = if file_type.is_fifo() {
        FileType::Fifo
    } else if file_type.is_char_device() {
        FileType::CharacterDevice
    } else if file_type.is_block_device() {
        FileType::BlockDevice
    } else {
        tracing::debug!(path = %dst.display(), "Skipping unsupported node type");
        stats.nodes_skipped += 1;
        return;
    };

    let _ = remove_existing(dst);
    let rdev = src_meta.rdev();
    let (major, minor) = (rustix::fs::major(rdev), rustix::fs::minor(rdev));
    if !meta::mknod(dst, kind, src_meta.mode() & 0o7777, major, minor) {
        stats.nodes_skipped += 1;
    } else if !meta::lchown(dst, src_meta.uid(), src_meta.gid()) {
        stats.chown_skipped += 1;
    }
}

fn remove_existing(dst: &Path) -> XrootfsResult<()> {
    let existing = match fs::symlink_metadata(dst) {
        Ok(existing) => existing,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(merge_failed(dst, &err)),
    };
    let removed = if existing.is_dir() {
        fs::remove_dir_all(dst)
    } else {
        fs::remove_file(dst)
    };
    removed.map_err(|err| merge_failed(dst, &err))
}

fn merge_failed(path: &Path, reason: &dyn std::fmt::Display) -> XrootfsError {
    XrootfsError::MergeFailed {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn scratch_with(temp: &Path, build: impl FnOnce(&Path)) -> std::path::PathBuf {
        let scratch = temp.join("scratch");
        fs::create_dir_all(&scratch).unwrap();
        build(&scratch);
        scratch
    }

    #[test]
    fn copies_files_and_directories() {
        let temp = tempdir().unwrap();
        let scratch = scratch_with(temp.path(), |scratch| {
            fs::create_dir(scratch.join("a")).unwrap();
            fs::write(scratch.join("a/file.txt"), b"payload").unwrap();
        });
        let rootfs = temp.path().join("rootfs");
        fs::create_dir(&rootfs).unwrap();

        let stats = merge_layer(&scratch, &rootfs, true).unwrap();

        assert_eq!(stats.entries, 2);
        assert_eq!(fs::read(rootfs.join("a/file.txt")).unwrap(), b"payload");
    }

    #[test]
    fn overwrites_existing_file() {
        let temp = tempdir().unwrap();
        let scratch = scratch_with(temp.path(), |scratch| {
            fs::write(scratch.join("file.txt"), b"new").unwrap();
        });
        let rootfs = temp.path().join("rootfs");
        fs::create_dir(&rootfs).unwrap();
        fs::write(rootfs.join("file.txt"), b"old contents").unwrap();

        merge_layer(&scratch, &rootfs, true).unwrap();

        assert_eq!(fs::read(rootfs.join("file.txt")).unwrap(), b"new");
    }

    #[test]
    fn file_replaces_directory_and_vice_versa() {
        let temp = tempdir().unwrap();
        let scratch = scratch_with(temp.path(), |scratch| {
            fs::write(scratch.join("was-dir"), b"now a file").unwrap();
            fs::create_dir(scratch.join("was-file")).unwrap();
        });
        let rootfs = temp.path().join("rootfs");
        fs::create_dir_all(rootfs.join("was-dir/nested")).unwrap();
        fs::write(rootfs.join("was-file"), b"x").unwrap();

        merge_layer(&scratch, &rootfs, true).unwrap();

        assert!(rootfs.join("was-dir").is_file());
        assert!(rootfs.join("was-file").is_dir());
    }

    #[test]
    fn symlink_target_is_relocated() {
        let temp = tempdir().unwrap();
        let scratch = scratch_with(temp.path(), |scratch| {
            symlink("/etc/motd", scratch.join("link")).unwrap();
        });
        let rootfs = temp.path().join("rootfs");
        fs::create_dir(&rootfs).unwrap();

        merge_layer(&scratch, &rootfs, true).unwrap();

        assert_eq!(
            fs::read_link(rootfs.join("link")).unwrap(),
            std::path::PathBuf::from("etc/motd")
        );
    }

    #[test]
    fn symlink_target_verbatim_when_disabled() {
        let temp = tempdir().unwrap();
        let scratch = scratch_with(temp.path(), |scratch| {
            symlink("/etc/motd", scratch.join("link")).unwrap();
        });
        let rootfs = temp.path().join("rootfs");
        fs::create_dir(&rootfs).unwrap();

        merge_layer(&scratch, &rootfs, false).unwrap();

        assert_eq!(
            fs::read_link(rootfs.join("link")).unwrap(),
            std::path::PathBuf::from("/etc/motd")
        );
    }

    #[test]
    fn symlink_replaces_existing_node() {
        let temp = tempdir().unwrap();
        let scratch = scratch_with(temp.path(), |scratch| {
            symlink("elsewhere", scratch.join("node")).unwrap();
        });
        let rootfs = temp.path().join("rootfs");
        fs::create_dir_all(rootfs.join("node")).unwrap();
        fs::write(rootfs.join("node/stale"), b"x").unwrap();

        merge_layer(&scratch, &rootfs, true).unwrap();

        assert!(fs::symlink_metadata(rootfs.join("node")).unwrap().is_symlink());
    }

    #[test]
    fn file_replaces_existing_symlink_node() {
        let temp = tempdir().unwrap();
        let scratch = scratch_with(temp.path(), |scratch| {
            fs::write(scratch.join("cfg"), b"inline").unwrap();
        });
        let rootfs = temp.path().join("rootfs");
        fs::create_dir(&rootfs).unwrap();
        fs::write(rootfs.join("real"), b"orig").unwrap();
        symlink("real", rootfs.join("cfg")).unwrap();

        merge_layer(&scratch, &rootfs, true).unwrap();

        // The symlink node is replaced, not written through.
        assert!(fs::symlink_metadata(rootfs.join("cfg")).unwrap().is_file());
        assert_eq!(fs::read(rootfs.join("cfg")).unwrap(), b"inline");
        assert_eq!(fs::read(rootfs.join("real")).unwrap(), b"orig");
    }

    #[test]
    fn mode_bits_are_preserved() {
        let temp = tempdir().unwrap();
        let scratch = scratch_with(temp.path(), |scratch| {
            fs::write(scratch.join("tool"), b"#!/bin/sh\n").unwrap();
            fs::set_permissions(scratch.join("tool"), fs::Permissions::from_mode(0o755)).unwrap();
        });
        let rootfs = temp.path().join("rootfs");
        fs::create_dir(&rootfs).unwrap();

        merge_layer(&scratch, &rootfs, true).unwrap();

        let mode = fs::metadata(rootfs.join("tool")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
