//! Layer list resolution for unpacked image archives.

use std::fs;
use std::path::{Path, PathBuf};

use xrootfs_common::{XrootfsError, XrootfsResult};

use crate::manifest::{ImageIndex, ImageManifest, SaveManifest};

/// Name of the Docker save manifest within an archive.
const SAVE_MANIFEST: &str = "manifest.json";

/// Marker file identifying an OCI image layout.
const OCI_LAYOUT: &str = "oci-layout";

/// OCI image index file name.
const OCI_INDEX: &str = "index.json";

/// The shape of an unpacked image archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Docker save tarball with a top-level `manifest.json`.
    DockerSave,
    /// OCI image layout with `oci-layout` and `index.json`.
    OciLayout,
}

/// One resolved layer blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerRef {
    /// Blob path relative to the unpacked archive root.
    pub blob: PathBuf,
    /// Content digest, when the source format records one.
    pub digest: Option<String>,
}

/// Detect the format of an unpacked image archive.
#[must_use]
pub fn detect_format(archive_root: &Path) -> Option<ArchiveFormat> {
    if archive_root.join(SAVE_MANIFEST).is_file() {
        Some(ArchiveFormat::DockerSave)
    } else if archive_root.join(OCI_LAYOUT).exists() {
        Some(ArchiveFormat::OciLayout)
    } else {
        None
    }
}

/// Resolve an unpacked archive to its ordered layer list, bottom-most first.
///
/// # Errors
///
/// Returns [`XrootfsError::UnsupportedFormat`] when the archive matches
/// neither known shape, and [`XrootfsError::ArchiveCorrupt`] when a manifest
/// is present but unusable.
pub fn resolve_layers(archive_root: &Path) -> XrootfsResult<Vec<LayerRef>> {
    match detect_format(archive_root) {
        Some(ArchiveFormat::DockerSave) => resolve_save_layers(archive_root),
        Some(ArchiveFormat::OciLayout) => resolve_oci_layers(archive_root),
        None => Err(XrootfsError::UnsupportedFormat {
            archive: archive_root.display().to_string(),
        }),
    }
}

fn resolve_save_layers(root: &Path) -> XrootfsResult<Vec<LayerRef>> {
    let data = fs::read_to_string(root.join(SAVE_MANIFEST))?;
    let manifest: SaveManifest =
        serde_json::from_str(&data).map_err(|err| corrupt(root, &err))?;
    let entry = manifest
        .first()
        .ok_or_else(|| corrupt(root, &"manifest.json lists no images"))?;

    tracing::debug!(layers = entry.layers.len(), "Resolved Docker save manifest");

    Ok(entry
        .layers
        .iter()
        .map(|layer| LayerRef {
            blob: PathBuf::from(layer),
            digest: None,
        })
        .collect())
}

fn resolve_oci_layers(root: &Path) -> XrootfsResult<Vec<LayerRef>> {
    let index_data = fs::read_to_string(root.join(OCI_INDEX))?;
    let index: ImageIndex =
        serde_json::from_str(&index_data).map_err(|err| corrupt(root, &err))?;
    let descriptor = index
        .manifests
        .first()
        .ok_or_else(|| corrupt(root, &"index.json lists no manifests"))?;

    let manifest_blob = blob_path(&descriptor.digest)
        .ok_or_else(|| corrupt(root, &format!("malformed digest: {}", descriptor.digest)))?;
    let manifest_data = fs::read_to_string(root.join(&manifest_blob))?;
    let manifest: ImageManifest =
        serde_json::from_str(&manifest_data).map_err(|err| corrupt(root, &err))?;

    tracing::debug!(layers = manifest.layers.len(), "Resolved OCI image manifest");

    manifest
        .layers
        .iter()
        .map(|layer| {
            let blob = blob_path(&layer.digest)
                .ok_or_else(|| corrupt(root, &format!("malformed digest: {}", layer.digest)))?;
            Ok(LayerRef {
                blob,
                digest: Some(layer.digest.clone()),
            })
        })
        .collect()
}

/// Map `<algorithm>:<hex>` to the layout's `blobs/<algorithm>/<hex>` path.
fn blob_path(digest: &str) -> Option<PathBuf> {
    let (algorithm, hex) = digest.split_once(':')?;
    if algorithm.is_empty() || hex.is_empty() {
        return None;
    }
    Some(["blobs", algorithm, hex].iter().collect())
}

fn corrupt(root: &Path, reason: &dyn std::fmt::Display) -> XrootfsError {
    XrootfsError::ArchiveCorrupt {
        archive: root.display().to_string(),
        reason: reason.to_string(),
    }
}
