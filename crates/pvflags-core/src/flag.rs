use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::LoadError;

/// A single feature toggle as described by the flag document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlag {
    /// Value used when no restriction applies.
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_build_number: Option<String>,
    /// Channels allowed to see the feature. `None` means every channel.
    #[serde(
        default,
        rename = "allowedAppTypes",
        skip_serializing_if = "Option::is_none"
    )]
    pub allowed_channels: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FeatureFlag {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            min_version: None,
            min_build_number: None,
            allowed_channels: None,
            description: None,
        }
    }

    pub fn with_min_version(mut self, version: impl Into<String>) -> Self {
        self.min_version = Some(version.into());
        self
    }

    pub fn with_min_build(mut self, build: impl Into<String>) -> Self {
        self.min_build_number = Some(build.into());
        self
    }

    pub fn with_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_channels = Some(channels.into_iter().map(Into::into).collect());
        self
    }
}

/// Root of the remote flag document: `{"features": {...}}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlagDocument {
    pub features: BTreeMap<String, FeatureFlag>,
}

/// Immutable set of flags keyed by feature key.
///
/// Replaced wholesale on reload; callers share it behind an `Arc`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagSet {
    flags: BTreeMap<String, FeatureFlag>,
}

impl FlagSet {
    pub fn new(flags: BTreeMap<String, FeatureFlag>) -> Self {
        Self { flags }
    }

    /// Parses a JSON flag document.
    pub fn from_json(bytes: &[u8]) -> Result<Self, LoadError> {
        let doc: FlagDocument = serde_json::from_slice(bytes)?;
        Ok(Self::from(doc))
    }

    pub fn get(&self, key: &str) -> Option<&FeatureFlag> {
        self.flags.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.flags.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureFlag)> {
        self.flags.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl From<FlagDocument> for FlagSet {
    fn from(doc: FlagDocument) -> Self {
        Self::new(doc.features)
    }
}

impl FromIterator<(String, FeatureFlag)> for FlagSet {
    fn from_iter<T: IntoIterator<Item = (String, FeatureFlag)>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_document() {
        let json = br#"{
            "features": {
                "inAppFreeROMs": {
                    "enabled": true,
                    "minVersion": "3.0.0",
                    "minBuildNumber": "120",
                    "allowedAppTypes": ["standard", "standard.appstore"],
                    "description": "Download free ROMs from inside the app"
                },
                "romPathMigrator": { "enabled": false }
            }
        }"#;

        let set = FlagSet::from_json(json).unwrap();
        assert_eq!(set.len(), 2);

        let free = set.get("inAppFreeROMs").unwrap();
        assert!(free.enabled);
        assert_eq!(free.min_version.as_deref(), Some("3.0.0"));
        assert_eq!(free.min_build_number.as_deref(), Some("120"));
        let channels = free.allowed_channels.as_ref().unwrap();
        assert!(channels.contains("standard.appstore"));
        assert_eq!(channels.len(), 2);

        let migrator = set.get("romPathMigrator").unwrap();
        assert_eq!(migrator, &FeatureFlag::new(false));
    }

    #[test]
    fn missing_enabled_is_a_parse_error() {
        let json = br#"{"features": {"x": {"minVersion": "1.0"}}}"#;
        assert!(matches!(FlagSet::from_json(json), Err(LoadError::Parse(_))));
    }

    #[test]
    fn missing_features_field_is_a_parse_error() {
        assert!(FlagSet::from_json(br#"{"flags": {}}"#).is_err());
        assert!(FlagSet::from_json(b"not json").is_err());
    }
}
