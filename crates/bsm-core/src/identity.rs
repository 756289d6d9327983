//! Build identity supplied by callers.

use serde::{Deserialize, Serialize};

/// One immutable, versioned build of the game.
///
/// Supplied by the caller and never mutated by the acquisition engines. Each
/// store only needs its own identifier: Steam builds are addressed by depot
/// manifest id, Oculus builds by binary id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildIdentity {
    /// Game version string, e.g. `"1.29.1"`.
    pub version: String,
    /// Steam depot manifest id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_id: Option<String>,
    /// Oculus binary id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_id: Option<String>,
    /// Optional human-readable name (custom install name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl BuildIdentity {
    /// Create an identity carrying only a version.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            manifest_id: None,
            binary_id: None,
            name: None,
        }
    }

    /// Set the Steam depot manifest id.
    #[must_use]
    pub fn with_manifest_id(mut self, manifest_id: impl Into<String>) -> Self {
        self.manifest_id = Some(manifest_id.into());
        self
    }

    /// Set the Oculus binary id.
    #[must_use]
    pub fn with_binary_id(mut self, binary_id: impl Into<String>) -> Self {
        self.binary_id = Some(binary_id.into());
        self
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Name to show to users: the custom name if any, else the version.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.version)
    }
}
