//! Tar extraction with metadata fidelity.

use std::fs;
use std::io::{self, BufRead, BufReader, Read};
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Component, Path, PathBuf};

use filetime::FileTime;
use rustix::fs::FileType;
use tar::{Archive, EntryType};
use xrootfs_common::{XrootfsError, XrootfsResult};

use super::meta::{self, LayerStats};

/// Gzip stream magic bytes.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Zstandard stream magic bytes.
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

/// Unpack one tar archive into `dest`, reproducing entry type, mode,
/// ownership, timestamps, and link targets.
///
/// Layer blobs may be gzip- or zstd-compressed; compression is detected from
/// the stream's leading bytes. Symlink targets are created verbatim;
/// relocation is a property of the merge step, once the entry is
/// transplanted into the rootfs namespace. Hardlink targets must precede the
/// link in stream order. Device and FIFO nodes are created best-effort.
///
/// # Errors
///
/// Returns [`XrootfsError::ArchiveCorrupt`] for a truncated or malformed
/// stream, and plain I/O errors for failures on the destination side.
pub fn unpack_tar(archive: &Path, dest: &Path) -> XrootfsResult<LayerStats> {
    let file = fs::File::open(archive)?;
    let reader = decode(BufReader::new(file))?;
    unpack_stream(reader, archive, dest)
}

/// Wrap `reader` in the right decompressor based on its magic bytes.
fn decode(mut reader: BufReader<fs::File>) -> io::Result<Box<dyn Read>> {
    let head = reader.fill_buf()?;
    if head.starts_with(&GZIP_MAGIC) {
        Ok(Box::new(flate2::read::GzDecoder::new(reader)))
    } else if head.starts_with(&ZSTD_MAGIC) {
        Ok(Box::new(zstd::stream::read::Decoder::new(reader)?))
    } else {
        Ok(Box::new(reader))
    }
}

fn unpack_stream(reader: impl Read, archive: &Path, dest: &Path) -> XrootfsResult<LayerStats> {
    let mut stats = LayerStats::default();
    let mut tar = Archive::new(reader);

    for entry in tar.entries().map_err(|err| corrupt(archive, &err))? {
        let mut entry = entry.map_err(|err| corrupt(archive, &err))?;

        let rel = {
            let path = entry.path().map_err(|err| corrupt(archive, &err))?;
            match sanitize(&path) {
                Some(rel) => rel,
                None => {
                    tracing::warn!(
                        archive = %archive.display(),
                        path = %path.display(),
                        "Skipping entry escaping the destination"
                    );
                    continue;
                }
            }
        };
        let target = dest.join(&rel);

        let kind = entry.header().entry_type();
        let mode = entry.header().mode().unwrap_or(0o644);

        match kind {
            EntryType::Directory => {
                fs::create_dir_all(&target)?;
                fs::set_permissions(&target, fs::Permissions::from_mode(mode))?;
            }
            EntryType::Regular | EntryType::Continuous => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                let size = entry.header().size().map_err(|err| corrupt(archive, &err))?;
                let mut out = fs::File::create(&target)?;
                let written = io::copy(&mut entry, &mut out)
                    .map_err(|err| corrupt(archive, &err))?;
                if written != size {
                    return Err(corrupt(
                        archive,
                        &format!(
                            "short read for {}: {written} of {size} bytes",
                            rel.display()
                        ),
                    ));
                }
                fs::set_permissions(&target, fs::Permissions::from_mode(mode))?;
            }
            EntryType::Symlink => {
                let link = entry
                    .link_name()
                    .map_err(|err| corrupt(archive, &err))?
                    .ok_or_else(|| {
                        corrupt(archive, &format!("symlink {} has no target", rel.display()))
                    })?
                    .into_owned();
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                remove_existing(&target)?;
                symlink(&link, &target)?;
            }
            EntryType::Link => {
                let link = entry
                    .link_name()
                    .map_err(|err| corrupt(archive, &err))?
                    .ok_or_else(|| {
                        corrupt(archive, &format!("hardlink {} has no target", rel.display()))
                    })?
                    .into_owned();
                let Some(link_rel) = sanitize(&link) else {
                    tracing::warn!(
                        archive = %archive.display(),
                        path = %rel.display(),
                        "Skipping hardlink escaping the destination"
                    );
                    continue;
                };
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                remove_existing(&target)?;
                // Stream order is authoritative: the target was extracted by
                // an earlier entry or the archive is broken.
                fs::hard_link(dest.join(&link_rel), &target).map_err(|err| {
                    corrupt(
                        archive,
                        &format!(
                            "hardlink {} -> {}: {err}",
                            rel.display(),
                            link_rel.display()
                        ),
                    )
                })?;
            }
            EntryType::Char | EntryType::Block | EntryType::Fifo => {
                let file_type = match kind {
                    EntryType::Char => FileType::CharacterDevice,
                    EntryType::Block => FileType::BlockDevice,
                    _ => FileType::Fifo,
                };
                let major = entry.header().device_major().ok().flatten().unwrap_or(0);
                let minor = entry.header().device_minor().ok().flatten().unwrap_or(0);
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                remove_existing(&target)?;
                if !meta::mknod(&target, file_type, mode, major, minor) {
                    // Expected without CAP_MKNOD; nothing on disk to decorate.
                    stats.nodes_skipped += 1;
                    continue;
                }
            }
            other => {
                tracing::debug!(kind = ?other, path = %rel.display(), "Skipping entry type");
                continue;
            }
        }
        stats.entries += 1;

        let uid = u32::try_from(entry.header().uid().unwrap_or(0)).unwrap_or(0);
        let gid = u32::try_from(entry.header().gid().unwrap_or(0)).unwrap_or(0);
        if !meta::lchown(&target, uid, gid) {
            stats.chown_skipped += 1;
        }

        let mtime = unix_or_now(entry.header().mtime().unwrap_or(0));
        let atime = entry
            .header()
            .as_gnu()
            .and_then(|gnu| gnu.atime().ok())
            .map_or_else(FileTime::now, unix_or_now);
        if !meta::set_times(&target, atime, mtime, kind == EntryType::Symlink) {
            stats.times_skipped += 1;
        }
    }

    Ok(stats)
}

/// Re-root an archive path under the destination: absolute paths lose their
/// root, `..` components refuse the entry entirely.
fn sanitize(path: &Path) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::ParentDir => return None,
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
        }
    }
    Some(clean)
}

/// Missing or zero timestamps default to "now".
fn unix_or_now(secs: u64) -> FileTime {
    if secs == 0 {
        FileTime::now()
    } else {
        FileTime::from_unix_time(i64::try_from(secs).unwrap_or(i64::MAX), 0)
    }
}

fn remove_existing(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(existing) if existing.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

fn corrupt(archive: &Path, reason: &dyn std::fmt::Display) -> XrootfsError {
    XrootfsError::ArchiveCorrupt {
        archive: archive.display().to_string(),
        reason: reason.to_string(),
    }
}
