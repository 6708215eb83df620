//! # imagecfg
//!
//! Renders a rootfs-build configuration document from command-line values.
//! Companion tool to xrootfs; it shares no logic with the extraction engine.

#![warn(missing_docs)]

use serde::Serialize;
use xrootfs_common::{XrootfsError, XrootfsResult};

/// One package source: a repository URL and its channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    /// Repository base URL.
    pub url: String,
    /// Channels to enable, in the order given.
    pub channels: Vec<String>,
}

/// Values rendered into the configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RootfsValues {
    /// Target architectures.
    pub archs: Vec<String>,
    /// Package sources.
    pub sources: Vec<Source>,
    /// Packages to install.
    pub packages: Vec<String>,
}

impl RootfsValues {
    /// Assemble values from raw flag occurrences.
    ///
    /// Each source is given as `url=chan1,chan2,...`; repeating a URL
    /// appends channels to the existing source.
    ///
    /// # Errors
    ///
    /// Returns [`XrootfsError::Config`] for a source value without `=`.
    pub fn from_flags(
        archs: Vec<String>,
        sources: &[String],
        packages: Vec<String>,
    ) -> XrootfsResult<Self> {
        let mut values = Self {
            archs,
            packages,
            sources: Vec::new(),
        };
        for raw in sources {
            let Some((url, channels)) = raw.split_once('=') else {
                return Err(XrootfsError::Config {
                    message: format!("invalid source {raw:?}: expected url=channel,channel"),
                });
            };
            let channels = channels
                .split(',')
                .filter(|channel| !channel.is_empty())
                .map(str::to_string);
            match values.sources.iter_mut().find(|source| source.url == url) {
                Some(existing) => existing.channels.extend(channels),
                None => values.sources.push(Source {
                    url: url.to_string(),
                    channels: channels.collect(),
                }),
            }
        }
        Ok(values)
    }

    /// Render the document as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`XrootfsError::Serialization`] when serialization fails.
    pub fn to_yaml(&self) -> XrootfsResult<String> {
        serde_yaml::to_string(self).map_err(|err| XrootfsError::Serialization(err.to_string()))
    }
}
