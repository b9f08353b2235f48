//! Feature-flag gating and core-option bridging for the emulator frontend.
//!
//! The [`service::FeatureFlagService`] owns the loaded flag set, the persisted
//! debug overrides and the effective-state cache. Frontends construct one
//! service and pass it to whatever needs to query flags.

/// Install channel (standard/lite, direct/store) of the running app.
pub mod channel;

/// Per-core typed option descriptors and persisted values.
pub mod options;

/// Effective-state cache.
pub mod cache;

/// Host metadata consumed by the gate evaluator.
pub mod environment;

/// Error types shared across the crate.
pub mod error;

/// Restriction checks deciding whether a flag is active.
pub mod evaluator;

/// Flag descriptors and the wire document they are parsed from.
pub mod flag;

/// Persisted debug overrides.
pub mod overrides;

/// Document locations, fetchers and asynchronous load handles.
pub mod remote;

/// The coordinating service.
pub mod service;

/// Dot-separated version comparison.
pub mod version;

pub use channel::Channel;
pub use environment::AppEnvironment;
pub use error::{FetchError, LoadError, OptionError, OverrideError};
pub use flag::{FeatureFlag, FlagSet};
pub use service::{FeatureFlagService, FlagEvent, FlagStatus, KnownFeature};
