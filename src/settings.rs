use log::warn;
use pvflags_core::AppEnvironment;
use pvflags_core::environment::{BUILD_KEY, CHANNEL_KEY, VERSION_KEY};
use pvflags_core::overrides::{config_dir, default_overrides_path};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub channel: Option<String>,
    pub build_number: Option<String>,
    pub version: Option<String>,
    /// Path or URL of the flag document.
    pub config_location: Option<String>,
    pub overrides_path: Option<PathBuf>,
    pub options_dir: Option<PathBuf>,
}

impl Settings {
    /// Builds the evaluator environment the same way the app reads its
    /// packaging metadata, so unset fields get the same defaults.
    pub fn environment(&self) -> AppEnvironment {
        let mut info = HashMap::new();
        if let Some(channel) = &self.channel {
            info.insert(CHANNEL_KEY.to_string(), channel.clone());
        }
        if let Some(build) = &self.build_number {
            info.insert(BUILD_KEY.to_string(), build.clone());
        }
        if let Some(version) = &self.version {
            info.insert(VERSION_KEY.to_string(), version.clone());
        }
        AppEnvironment::from_info(&info)
    }

    pub fn overrides_path(&self) -> PathBuf {
        self.overrides_path
            .clone()
            .unwrap_or_else(default_overrides_path)
    }

    pub fn options_dir(&self) -> PathBuf {
        self.options_dir
            .clone()
            .unwrap_or_else(|| config_dir().join("options"))
    }
}

pub fn default_settings_path() -> PathBuf {
    config_dir().join("settings.toml")
}

pub fn load_from_file(path: &Path) -> Settings {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => return Settings::default(),
    };

    match toml::from_str::<Settings>(&text) {
        Ok(settings) => settings,
        Err(e) => {
            warn!(
                "Failed to parse settings {}: {e}; using defaults",
                path.display()
            );
            Settings::default()
        }
    }
}

pub fn save_to_file(path: &Path, settings: &Settings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let text = toml::to_string_pretty(settings).map_err(std::io::Error::other)?;
    std::fs::write(path, text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pvflags_core::Channel;
    use tempfile::tempdir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let settings = load_from_file(&dir.path().join("absent.toml"));
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.environment(), AppEnvironment::default());
    }

    #[test]
    fn malformed_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "channel = ").unwrap();
        assert_eq!(load_from_file(&path), Settings::default());
    }

    #[test]
    fn saved_settings_load_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cfg").join("settings.toml");
        let settings = Settings {
            channel: Some("lite.appstore".to_string()),
            build_number: Some("77".to_string()),
            version: Some("3.0.1".to_string()),
            config_location: Some("https://example.com/flags.json".to_string()),
            ..Settings::default()
        };

        save_to_file(&path, &settings).unwrap();
        let loaded = load_from_file(&path);
        assert_eq!(loaded, settings);

        let env = loaded.environment();
        assert_eq!(env.channel, Channel::LiteAppStore);
        assert_eq!(env.build_number.as_deref(), Some("77"));
        assert_eq!(env.version, "3.0.1");
    }
}
