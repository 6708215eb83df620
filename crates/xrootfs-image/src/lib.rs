//! # xrootfs-image
//!
//! Image-archive format support for xrootfs.
//!
//! Maps an unpacked image archive to an ordered list of layer blobs. Two
//! source shapes are supported:
//! - Docker save tarballs (top-level `manifest.json`)
//! - OCI image layouts (`oci-layout`, `index.json`, `blobs/`)
//!
//! The extraction engine is agnostic to how the layer list was derived; this
//! crate is the only place that knows about manifest formats.

#![warn(missing_docs)]

pub mod manifest;
pub mod source;

pub use source::{detect_format, resolve_layers, ArchiveFormat, LayerRef};
