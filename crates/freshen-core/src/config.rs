use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use freshen_platform::AppPaths;
use log::warn;

/// Settings shared by the fetcher, the installer, and logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdaterSettings {
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default)]
    pub user_agent: Option<String>,

    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,

    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,
}

fn default_http_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for UpdaterSettings {
    fn default() -> Self {
        Self {
            http_timeout_secs: default_http_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            user_agent: None,
            scratch_dir: None,
            debug_logging: false,
            max_log_size_bytes: default_max_log_size_bytes(),
        }
    }
}

impl UpdaterSettings {
    /// Load settings from the application's settings file, falling back to
    /// defaults when it is missing or unreadable.
    #[must_use]
    pub fn load(paths: &AppPaths) -> Self {
        Self::load_from(&paths.settings_file())
    }

    #[must_use]
    pub fn load_from(settings_path: &Path) -> Self {
        if !settings_path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(settings_path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|error| {
                warn!(
                    "Ignoring invalid updater settings in {}: {error}",
                    settings_path.display()
                );
                Self::default()
            }),
            Err(error) => {
                warn!(
                    "Failed to read updater settings {}: {error}",
                    settings_path.display()
                );
                Self::default()
            }
        }
    }

    /// Persist settings to the application's settings file.
    ///
    /// # Errors
    /// Returns an error if the config directory cannot be created or the file
    /// cannot be written.
    pub fn save(&self, paths: &AppPaths) -> Result<(), std::io::Error> {
        paths.ensure_dirs()?;

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.settings_file(), content)?;
        Ok(())
    }

    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| format!("freshen/{}", env!("CARGO_PKG_VERSION")))
    }

    #[must_use]
    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(AppPaths::scratch_dir)
    }
}

#[cfg(test)]
mod tests {
    use freshen_platform::AppPaths;

    use super::UpdaterSettings;

    #[test]
    fn updater_settings_defaults_match_expected_values() {
        let settings = UpdaterSettings::default();

        assert_eq!(settings.http_timeout_secs, 30);
        assert_eq!(settings.connect_timeout_secs, 10);
        assert_eq!(settings.max_log_size_bytes, 5 * 1024 * 1024);
        assert!(!settings.debug_logging);
        assert!(settings.user_agent().starts_with("freshen/"));
        assert_eq!(settings.scratch_dir(), std::env::temp_dir());
    }

    #[test]
    fn partial_settings_file_keeps_defaults_for_missing_fields() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("updater.json");
        std::fs::write(&path, r#"{"http_timeout_secs": 5, "user_agent": "host/1.0"}"#)
            .expect("settings should be written");

        let settings = UpdaterSettings::load_from(&path);
        assert_eq!(settings.http_timeout_secs, 5);
        assert_eq!(settings.connect_timeout_secs, 10);
        assert_eq!(settings.user_agent(), "host/1.0");
    }

    #[test]
    fn invalid_settings_file_falls_back_to_defaults() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("updater.json");
        std::fs::write(&path, "{ not json").expect("settings should be written");

        assert_eq!(UpdaterSettings::load_from(&path), UpdaterSettings::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let paths = AppPaths::rooted_at(temp.path());
        let settings = UpdaterSettings {
            scratch_dir: Some(temp.path().join("scratch")),
            debug_logging: true,
            ..UpdaterSettings::default()
        };

        settings.save(&paths).expect("settings should be saved");
        assert_eq!(UpdaterSettings::load(&paths), settings);
    }
}
