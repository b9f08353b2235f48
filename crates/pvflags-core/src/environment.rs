use std::collections::HashMap;

use log::debug;

use crate::channel::Channel;

/// Metadata key holding the install channel.
pub const CHANNEL_KEY: &str = "PVAppType";
/// Metadata key holding the build number.
pub const BUILD_KEY: &str = "CFBundleVersion";
/// Metadata key holding the marketing version.
pub const VERSION_KEY: &str = "CFBundleShortVersionString";

pub const DEFAULT_VERSION: &str = "1.0.0";

/// What the gate evaluator knows about the running process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppEnvironment {
    pub channel: Channel,
    /// Unknown builds skip minimum-build checks.
    pub build_number: Option<String>,
    pub version: String,
}

impl Default for AppEnvironment {
    fn default() -> Self {
        Self {
            channel: Channel::Standard,
            build_number: None,
            version: DEFAULT_VERSION.to_string(),
        }
    }
}

impl AppEnvironment {
    pub fn new(channel: Channel, build_number: Option<String>, version: impl Into<String>) -> Self {
        Self {
            channel,
            build_number,
            version: version.into(),
        }
    }

    /// Builds the environment from the app's packaging metadata dictionary.
    pub fn from_info(info: &HashMap<String, String>) -> Self {
        let channel = info
            .get(CHANNEL_KEY)
            .map(|s| Channel::from(s.as_str()))
            .unwrap_or_default();
        let build_number = info.get(BUILD_KEY).cloned();
        let version = info
            .get(VERSION_KEY)
            .cloned()
            .unwrap_or_else(|| DEFAULT_VERSION.to_string());

        debug!("App environment: channel={channel} build={build_number:?} version={version}");

        Self {
            channel,
            build_number,
            version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_info_uses_defaults() {
        let env = AppEnvironment::from_info(&HashMap::new());
        assert_eq!(env, AppEnvironment::default());
    }

    #[test]
    fn reads_all_keys() {
        let info: HashMap<String, String> = [
            (CHANNEL_KEY, "lite.appstore"),
            (BUILD_KEY, "2042"),
            (VERSION_KEY, "3.1.0"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let env = AppEnvironment::from_info(&info);
        assert_eq!(env.channel, Channel::LiteAppStore);
        assert_eq!(env.build_number.as_deref(), Some("2042"));
        assert_eq!(env.version, "3.1.0");
    }
}
