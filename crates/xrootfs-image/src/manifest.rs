//! Image manifest types.
//!
//! Docker save manifests follow the legacy `docker save` archive layout; OCI
//! types follow the OCI Image Specification v1.1.0:
//! <https://github.com/opencontainers/image-spec>

use serde::{Deserialize, Serialize};

/// One image entry in a Docker save `manifest.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SaveManifestEntry {
    /// Path of the image configuration blob within the archive.
    pub config: String,
    /// Tags the saved image was known by.
    #[serde(default)]
    pub repo_tags: Vec<String>,
    /// Ordered layer tar paths within the archive, bottom-most first.
    pub layers: Vec<String>,
}

/// A Docker save `manifest.json`: one entry per saved image.
pub type SaveManifest = Vec<SaveManifestEntry>;

/// OCI image index (`index.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    /// Schema version (must be 2).
    pub schema_version: u32,
    /// Media type of the index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// Referenced manifests, in priority order.
    pub manifests: Vec<Descriptor>,
}

/// OCI image manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    /// Schema version (must be 2).
    pub schema_version: u32,
    /// Media type of the manifest.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// Image configuration descriptor.
    pub config: Descriptor,
    /// Ordered layer descriptors, bottom-most first.
    pub layers: Vec<Descriptor>,
}

/// Content descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    /// Content digest, `<algorithm>:<hex>`.
    pub digest: String,
    /// Content size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}
