//! Shared helpers for building layer and image archives in tests.

#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tar::{Builder, EntryType, Header};
use xrootfs_image::LayerRef;

pub fn header(kind: EntryType, size: u64, mode: u32) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(kind);
    header.set_size(size);
    header.set_mode(mode);
    header.set_mtime(1_700_000_000);
    header
}

pub fn dir_entry(builder: &mut Builder<Vec<u8>>, path: &str) {
    let mut h = header(EntryType::Directory, 0, 0o755);
    builder.append_data(&mut h, path, &[][..]).unwrap();
}

pub fn file_entry(builder: &mut Builder<Vec<u8>>, path: &str, content: &[u8]) {
    let mut h = header(EntryType::Regular, content.len() as u64, 0o644);
    builder.append_data(&mut h, path, content).unwrap();
}

pub fn symlink_entry(builder: &mut Builder<Vec<u8>>, path: &str, target: &str) {
    let mut h = header(EntryType::Symlink, 0, 0o777);
    builder.append_link(&mut h, path, target).unwrap();
}

pub fn hardlink_entry(builder: &mut Builder<Vec<u8>>, path: &str, target: &str) {
    let mut h = header(EntryType::Link, 0, 0o644);
    builder.append_link(&mut h, path, target).unwrap();
}

pub fn fifo_entry(builder: &mut Builder<Vec<u8>>, path: &str) {
    let mut h = header(EntryType::Fifo, 0, 0o644);
    builder.append_data(&mut h, path, &[][..]).unwrap();
}

/// Build one layer tar in memory.
pub fn layer(build: impl FnOnce(&mut Builder<Vec<u8>>)) -> Vec<u8> {
    let mut builder = Builder::new(Vec::new());
    build(&mut builder);
    builder.into_inner().unwrap()
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// Write layer blobs next to each other and return ordered refs to them.
pub fn write_layers(dir: &Path, layers: &[&[u8]]) -> Vec<LayerRef> {
    layers
        .iter()
        .enumerate()
        .map(|(index, bytes)| {
            let name = format!("layer-{index}.tar");
            fs::write(dir.join(&name), bytes).unwrap();
            LayerRef {
                blob: PathBuf::from(name),
                digest: None,
            }
        })
        .collect()
}

/// Content snapshot of a tree: relative path plus a node descriptor, in
/// lexical order. Timestamps and ownership are deliberately excluded.
pub fn snapshot(root: &Path) -> Vec<(PathBuf, String)> {
    use std::os::unix::fs::PermissionsExt;

    let mut nodes = Vec::new();
    for entry in walkdir::WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.unwrap();
        let rel = entry.path().strip_prefix(root).unwrap().to_path_buf();
        let meta = entry.metadata().unwrap();
        let descriptor = if meta.is_dir() {
            format!("dir:{:o}", meta.permissions().mode() & 0o777)
        } else if meta.file_type().is_symlink() {
            format!("link:{}", fs::read_link(entry.path()).unwrap().display())
        } else {
            format!(
                "file:{:o}:{}",
                meta.permissions().mode() & 0o777,
                String::from_utf8_lossy(&fs::read(entry.path()).unwrap())
            )
        };
        nodes.push((rel, descriptor));
    }
    nodes
}
