//! Product and channel tags
//!
//! Exactly two products are distributable through this server, and every
//! release lives on one of three channels. Both tags are validated at the
//! URL boundary before any path under the release root is touched.

use serde::{Deserialize, Serialize};

/// Distributable artifact families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Product {
    /// Hypervisor-host OS updates
    QuantixOs,
    /// Control-plane appliance updates
    QuantixVdc,
}

impl Product {
    /// Parse from the URL path segment.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "quantix-os" => Some(Self::QuantixOs),
            "quantix-vdc" => Some(Self::QuantixVdc),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuantixOs => "quantix-os",
            Self::QuantixVdc => "quantix-vdc",
        }
    }

    pub fn all() -> [Self; 2] {
        [Self::QuantixOs, Self::QuantixVdc]
    }
}

/// Release tracks. Each channel is an independent namespace: the same
/// version string may exist in several channels with distinct artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Dev,
    Beta,
    Stable,
}

impl Channel {
    /// Parse from the `channel` query parameter (long names accepted).
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "dev" | "development" => Some(Self::Dev),
            "beta" => Some(Self::Beta),
            "stable" => Some(Self::Stable),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Beta => "beta",
            Self::Stable => "stable",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Dev => "Development builds, updated on every merge",
            Self::Beta => "Pre-release builds for fleet canaries",
            Self::Stable => "Production releases",
        }
    }

    pub fn all() -> [Self; 3] {
        [Self::Dev, Self::Beta, Self::Stable]
    }
}

/// Channel list entry for `GET /channels`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub name: String,
    pub description: String,
}

impl From<Channel> for ChannelInfo {
    fn from(channel: Channel) -> Self {
        Self {
            name: channel.as_str().to_string(),
            description: channel.description().to_string(),
        }
    }
}

/// Release list entry for `GET /{product}/releases`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub version: String,
    pub channel: String,
    pub release_date: String,
    pub update_type: String,
}
