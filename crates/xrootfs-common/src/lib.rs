//! # xrootfs-common
//!
//! Shared types for the xrootfs toolset:
//! - Common error types used across all crates
//! - Whiteout marker naming shared by the extraction engine

#![warn(missing_docs)]

pub mod error;
pub mod whiteout;

pub use error::{XrootfsError, XrootfsResult};
