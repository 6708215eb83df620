//! Per-layer processing steps.
//!
//! A layer moves through three strictly ordered steps: tar extraction into a
//! scratch directory, whiteout resolution against the accumulated rootfs,
//! and the merge of the remaining entries into the rootfs. Resolution must
//! see the state left by all prior layers, and the merge must run after the
//! layer's own deletions have landed.

mod merge;
mod meta;
mod relocate;
mod unpack;
mod whiteout;

pub use merge::merge_layer;
pub use meta::LayerStats;
pub use relocate::relocate_target;
pub use unpack::unpack_tar;
pub use whiteout::resolve_whiteouts;
