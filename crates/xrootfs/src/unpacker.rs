//! Image unpacking orchestration.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use xrootfs_common::XrootfsResult;
use xrootfs_image::{resolve_layers, LayerRef};

use crate::layer::{merge_layer, resolve_whiteouts, unpack_tar, LayerStats};

/// Aggregated outcome of a successful run.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnpackReport {
    /// Number of layers merged into the rootfs.
    pub layers: usize,
    /// Counters aggregated across every layer step.
    pub stats: LayerStats,
}

/// Drives the per-layer pipeline against one rootfs.
///
/// The unpacker owns the rootfs path for the duration of a run; the pipeline
/// steps mutate the tree but never outlive it. Layers are strictly
/// sequential: each layer's whiteout resolution must observe the state left
/// by all prior layers, and its merge must land after its own deletions.
/// Callers must serialize runs per rootfs.
#[derive(Debug, Clone)]
pub struct ImageUnpacker {
    rootfs: PathBuf,
    relocate_links: bool,
}

impl ImageUnpacker {
    /// Create an unpacker for `rootfs`. Link relocation defaults to on.
    pub fn new(rootfs: impl Into<PathBuf>) -> Self {
        Self {
            rootfs: rootfs.into(),
            relocate_links: true,
        }
    }

    /// Toggle symlink target relocation. When disabled, recorded targets are
    /// copied verbatim (accepts dangling or escaping links).
    #[must_use]
    pub const fn relocate_links(mut self, relocate: bool) -> Self {
        self.relocate_links = relocate;
        self
    }

    /// Unpack an image archive (Docker save or OCI layout) into the rootfs.
    ///
    /// The archive is unpacked to a scratch directory, its layer list
    /// resolved, and the layers applied in order. The rootfs directory is
    /// only created once the archive is recognized, so an unsupported
    /// archive leaves nothing behind.
    ///
    /// # Errors
    ///
    /// Fails fast on the first corrupt layer, unrecognized format, or
    /// filesystem error; remaining layers are not attempted.
    pub fn unpack_image(&self, image_tar: &Path) -> XrootfsResult<UnpackReport> {
        let scratch = TempDir::new()?;
        tracing::info!(archive = %image_tar.display(), "Unpacking image archive");
        unpack_tar(image_tar, scratch.path())?;

        let layers = resolve_layers(scratch.path())?;
        fs::create_dir_all(&self.rootfs)?;
        self.unpack_layers(scratch.path(), &layers)
    }

    /// Apply an ordered layer sequence, resolved against `base`, to the
    /// rootfs.
    ///
    /// Each layer gets a private scratch directory that is removed when its
    /// processing ends, on every exit path; peak disk usage is bounded by
    /// one layer plus the growing rootfs.
    ///
    /// # Errors
    ///
    /// Fails fast on the first layer whose unpack, whiteout resolution, or
    /// merge fails.
    pub fn unpack_layers(&self, base: &Path, layers: &[LayerRef]) -> XrootfsResult<UnpackReport> {
        let mut report = UnpackReport {
            layers: layers.len(),
            ..UnpackReport::default()
        };

        for (index, layer) in layers.iter().enumerate() {
            let blob = base.join(&layer.blob);
            tracing::info!(index, blob = %layer.blob.display(), "Applying layer");

            let scratch = TempDir::new()?;
            report.stats.absorb(unpack_tar(&blob, scratch.path())?);
            report
                .stats
                .absorb(resolve_whiteouts(scratch.path(), &self.rootfs)?);
            report
                .stats
                .absorb(merge_layer(scratch.path(), &self.rootfs, self.relocate_links)?);
        }

        if report.stats.degraded() {
            tracing::warn!(
                chown_skipped = report.stats.chown_skipped,
                times_skipped = report.stats.times_skipped,
                nodes_skipped = report.stats.nodes_skipped,
                "Some metadata was not applied (unprivileged run?)"
            );
        }

        Ok(report)
    }
}
