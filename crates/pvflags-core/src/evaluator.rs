use std::fmt;

use log::{trace, warn};

use crate::environment::AppEnvironment;
use crate::flag::{FeatureFlag, FlagSet};
use crate::version::is_below;

/// Reason a flag is gated off for the current environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Restriction {
    NotFound,
    ChannelNotAllowed { channel: String },
    BuildTooLow { current: String, minimum: String },
    VersionTooLow { current: String, minimum: String },
}

impl fmt::Display for Restriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "Feature not found"),
            Self::ChannelNotAllowed { channel } => write!(f, "App type {channel} not allowed"),
            Self::BuildTooLow { current, minimum } => {
                write!(f, "Build {current} below minimum {minimum}")
            }
            Self::VersionTooLow { current, minimum } => {
                write!(f, "Version {current} below minimum {minimum}")
            }
        }
    }
}

/// Decides whether flags are active for one environment.
///
/// Evaluation reads only its inputs; the only side effect is logging.
#[derive(Debug, Clone, Copy)]
pub struct GateEvaluator<'a> {
    flags: &'a FlagSet,
    env: &'a AppEnvironment,
}

impl<'a> GateEvaluator<'a> {
    pub fn new(flags: &'a FlagSet, env: &'a AppEnvironment) -> Self {
        Self { flags, env }
    }

    pub fn is_enabled(&self, key: &str) -> bool {
        let Some(flag) = self.flags.get(key) else {
            warn!("Feature key '{key}' not found");
            return false;
        };

        if let Some(restriction) = self.first_restriction(flag) {
            trace!("Feature '{key}' gated: {restriction}");
            return false;
        }

        trace!("Feature '{key}' unrestricted, default {}", flag.enabled);
        flag.enabled
    }

    /// Every failing check for `key`, in evaluation order.
    pub fn restrictions(&self, key: &str) -> Vec<Restriction> {
        match self.flags.get(key) {
            Some(flag) => self.collect_restrictions(flag),
            None => vec![Restriction::NotFound],
        }
    }

    fn first_restriction(&self, flag: &FeatureFlag) -> Option<Restriction> {
        self.channel_restriction(flag)
            .or_else(|| self.build_restriction(flag))
            .or_else(|| self.version_restriction(flag))
    }

    fn collect_restrictions(&self, flag: &FeatureFlag) -> Vec<Restriction> {
        [
            self.channel_restriction(flag),
            self.build_restriction(flag),
            self.version_restriction(flag),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn channel_restriction(&self, flag: &FeatureFlag) -> Option<Restriction> {
        let allowed = flag.allowed_channels.as_ref()?;
        if self.env.channel.is_allowed_in(allowed) {
            return None;
        }
        Some(Restriction::ChannelNotAllowed {
            channel: self.env.channel.to_string(),
        })
    }

    fn build_restriction(&self, flag: &FeatureFlag) -> Option<Restriction> {
        let minimum = flag.min_build_number.as_ref()?;
        let current = self.env.build_number.as_ref()?;
        if !is_below(current, minimum) {
            return None;
        }
        Some(Restriction::BuildTooLow {
            current: current.clone(),
            minimum: minimum.clone(),
        })
    }

    fn version_restriction(&self, flag: &FeatureFlag) -> Option<Restriction> {
        let minimum = flag.min_version.as_ref()?;
        if !is_below(&self.env.version, minimum) {
            return None;
        }
        Some(Restriction::VersionTooLow {
            current: self.env.version.clone(),
            minimum: minimum.clone(),
        })
    }
}
