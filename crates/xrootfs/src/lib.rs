//! # xrootfs
//!
//! Extracts a layered container image archive (Docker save tarball or OCI
//! image layout) into a root filesystem on disk, reproducing union
//! filesystem semantics: later layers add, overwrite, or delete content
//! introduced by earlier layers, using the whiteout-file convention to
//! encode deletions inside an otherwise plain tar format.
//!
//! ## Usage
//!
//! ```no_run
//! use xrootfs::ImageUnpacker;
//!
//! # fn example() -> xrootfs_common::XrootfsResult<()> {
//! let report = ImageUnpacker::new("/var/lib/rootfs")
//!     .unpack_image("image.tar".as_ref())?;
//! println!("merged {} layers", report.layers);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod cli;
pub mod layer;
pub mod unpacker;

pub use unpacker::{ImageUnpacker, UnpackReport};
