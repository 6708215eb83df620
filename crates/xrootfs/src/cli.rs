//! CLI definition and handler for the xrootfs binary.

use std::fs::File;
use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;

use crate::ImageUnpacker;

/// Extract a container image archive into a root filesystem.
#[derive(Debug, Parser)]
#[command(name = "xrootfs")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The tar archive of a saved container image (Docker save or OCI
    /// image layout)
    #[arg(long, value_name = "PATH")]
    pub image_tar: PathBuf,

    /// Directory to put the extracted rootfs in
    #[arg(long, value_name = "DIR")]
    pub rootfs_dir: PathBuf,

    /// Keep symlink targets verbatim instead of re-anchoring them under the
    /// rootfs
    #[arg(long)]
    pub no_relocate_links: bool,

    /// Create this zero-byte file once the rootfs is fully populated
    #[arg(long, value_name = "PATH")]
    pub success_marker: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Execute the extraction described by the parsed flags.
    ///
    /// # Errors
    ///
    /// Returns any fatal extraction error; best-effort metadata skips are
    /// only logged.
    pub fn execute(&self) -> Result<()> {
        let unpacker =
            ImageUnpacker::new(&self.rootfs_dir).relocate_links(!self.no_relocate_links);
        let report = unpacker.unpack_image(&self.image_tar)?;

        tracing::info!(
            layers = report.layers,
            entries = report.stats.entries,
            whiteouts = report.stats.whiteouts,
            "Rootfs populated"
        );

        if let Some(marker) = &self.success_marker {
            File::create(marker)?;
        }
        Ok(())
    }
}
