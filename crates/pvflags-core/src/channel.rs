use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// The install-distribution variant of the app.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Channel {
    /// Full build distributed outside the store.
    #[default]
    Standard,
    /// Lite build distributed outside the store.
    Lite,
    StandardAppStore,
    LiteAppStore,
    /// A channel string this build does not recognize. Never matches an
    /// allowed-channel list.
    Unknown(String),
}

impl Channel {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Standard => "standard",
            Self::Lite => "lite",
            Self::StandardAppStore => "standard.appstore",
            Self::LiteAppStore => "lite.appstore",
            Self::Unknown(raw) => raw,
        }
    }

    pub fn is_app_store(&self) -> bool {
        matches!(self, Self::StandardAppStore | Self::LiteAppStore)
    }

    pub fn is_lite(&self) -> bool {
        matches!(self, Self::Lite | Self::LiteAppStore)
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }

    /// Checks membership in an allowed-channel list. Unknown channels fail
    /// closed even if the list happens to contain their raw string.
    pub fn is_allowed_in<'a, I>(&self, allowed: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        if !self.is_known() {
            return false;
        }
        allowed.into_iter().any(|c| c == self.as_str())
    }
}

impl From<&str> for Channel {
    fn from(value: &str) -> Self {
        match value {
            "standard" => Self::Standard,
            "lite" => Self::Lite,
            "standard.appstore" => Self::StandardAppStore,
            "lite.appstore" => Self::LiteAppStore,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl FromStr for Channel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Channel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Channel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from(raw.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates_follow_variant() {
        assert!(Channel::LiteAppStore.is_app_store());
        assert!(Channel::LiteAppStore.is_lite());
        assert!(Channel::StandardAppStore.is_app_store());
        assert!(!Channel::StandardAppStore.is_lite());
        assert!(!Channel::Standard.is_app_store());
        assert!(Channel::Lite.is_lite());
    }

    #[test]
    fn parses_wire_names() {
        assert_eq!(Channel::from("standard.appstore"), Channel::StandardAppStore);
        assert_eq!(Channel::from("lite"), Channel::Lite);
        assert_eq!(
            Channel::from("beta"),
            Channel::Unknown("beta".to_string())
        );
    }

    #[test]
    fn unknown_channel_fails_closed() {
        let allowed = vec!["beta".to_string(), "standard".to_string()];
        assert!(!Channel::from("beta").is_allowed_in(&allowed));
        assert!(Channel::Standard.is_allowed_in(&allowed));
        assert!(!Channel::Lite.is_allowed_in(&allowed));
    }
}
