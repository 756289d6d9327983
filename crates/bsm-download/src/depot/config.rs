//! Configuration for the Steam engine.

use std::path::{Path, PathBuf};

/// Beat Saber's Steam app id.
pub const DEFAULT_APP_ID: &str = "620980";
/// Beat Saber's content depot id.
pub const DEFAULT_DEPOT_ID: &str = "620981";

/// Configuration for [`DepotEngine`](super::DepotEngine).
///
/// # Example
///
/// ```
/// use bsm_download::depot::DepotConfig;
///
/// let config = DepotConfig::new()
///     .with_executable("/opt/bsm/DepotDownloader")
///     .with_env("DOTNET_CLI_TELEMETRY_OPTOUT", "1");
/// ```
#[derive(Debug, Clone)]
pub struct DepotConfig {
    pub(crate) executable: PathBuf,
    pub(crate) working_dir: Option<PathBuf>,
    pub(crate) envs: Vec<(String, String)>,
    pub(crate) app_id: String,
    pub(crate) depot_id: String,
}

impl Default for DepotConfig {
    fn default() -> Self {
        let executable = if cfg!(windows) {
            "DepotDownloader.exe"
        } else {
            "DepotDownloader"
        };
        Self {
            executable: PathBuf::from(executable),
            working_dir: None,
            envs: Vec::new(),
            app_id: DEFAULT_APP_ID.to_string(),
            depot_id: DEFAULT_DEPOT_ID.to_string(),
        }
    }
}

impl DepotConfig {
    /// Create a new configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Path of the downloader executable.
    ///
    /// A bare name is looked up on `PATH`; anything else must exist.
    #[must_use]
    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = path.into();
        self
    }

    /// Working directory of the spawned process.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add an environment variable for the spawned process.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = app_id.into();
        self
    }

    #[must_use]
    pub fn with_depot_id(mut self, depot_id: impl Into<String>) -> Self {
        self.depot_id = depot_id.into();
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_beat_saber() {
        let config = DepotConfig::default();
        assert_eq!(config.app_id, "620980");
        assert_eq!(config.depot_id, "620981");
        assert!(config.working_dir.is_none());
        assert!(
            config
                .executable()
                .to_string_lossy()
                .starts_with("DepotDownloader")
        );
    }

    #[test]
    fn builder_overrides() {
        let config = DepotConfig::new()
            .with_executable("/tmp/dd")
            .with_working_dir("/tmp")
            .with_env("A", "1")
            .with_env("B", "2")
            .with_depot_id("1");
        assert_eq!(config.executable(), Path::new("/tmp/dd"));
        assert_eq!(config.envs.len(), 2);
        assert_eq!(config.depot_id, "1");
    }
}
