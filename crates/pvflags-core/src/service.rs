//! The flag service ties the loaded [`FlagSet`], the [`DebugOverrides`] and
//! the [`EffectiveCache`] together.
//!
//! Locking: overrides, cache and the applied-load ticket live behind one
//! mutex. The flag set is only replaced while that mutex is held, so a swap
//! and its cache invalidation are never observed separately. Readers that
//! only need the flags take an `Arc` snapshot and evaluate it lock-free.
//! Change events are sent before that mutex is released, so subscribers see
//! them in the order the changes were made. Lock order is state, then flags,
//! then listeners.

use crossbeam_channel as cb;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread;

use crate::cache::EffectiveCache;
use crate::environment::AppEnvironment;
use crate::error::{LoadError, OverrideError};
use crate::evaluator::{GateEvaluator, Restriction};
use crate::flag::{FeatureFlag, FlagSet};
use crate::overrides::{DebugOverrides, OverrideStore};
use crate::remote::{DefaultFetcher, DocumentFetcher, DocumentLocation, LoadHandle, LoadSummary};

/// Feature keys the frontend queries by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownFeature {
    InAppFreeRoms,
    RomPathMigrator,
}

impl KnownFeature {
    pub const ALL: [KnownFeature; 2] = [Self::InAppFreeRoms, Self::RomPathMigrator];

    pub fn key(self) -> &'static str {
        match self {
            Self::InAppFreeRoms => "inAppFreeROMs",
            Self::RomPathMigrator => "romPathMigrator",
        }
    }
}

/// Change notifications delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagEvent {
    ConfigurationLoaded { features: usize },
    LoadFailed { reason: String },
    OverrideChanged { key: String, value: Option<bool> },
    OverridesCleared,
}

/// Diagnostic view of one flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagStatus {
    pub key: String,
    pub flag: FeatureFlag,
    pub override_value: Option<bool>,
    pub restrictions: Vec<Restriction>,
    pub effective: bool,
}

struct ServiceState {
    overrides: DebugOverrides,
    cache: EffectiveCache,
    applied_ticket: u64,
}

pub struct FeatureFlagService {
    env: AppEnvironment,
    flags: RwLock<Arc<FlagSet>>,
    state: Mutex<ServiceState>,
    next_ticket: AtomicU64,
    fetcher: Arc<dyn DocumentFetcher>,
    listeners: Mutex<Vec<cb::Sender<FlagEvent>>>,
}

impl std::fmt::Debug for FeatureFlagService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureFlagService")
            .field("env", &self.env)
            .field("features", &self.snapshot().len())
            .finish_non_exhaustive()
    }
}

impl FeatureFlagService {
    /// Creates a service with an empty flag set and the overrides persisted
    /// in `store`.
    pub fn new(env: AppEnvironment, store: Box<dyn OverrideStore>) -> Self {
        Self::with_fetcher(env, store, Arc::new(DefaultFetcher))
    }

    pub fn with_fetcher(
        env: AppEnvironment,
        store: Box<dyn OverrideStore>,
        fetcher: Arc<dyn DocumentFetcher>,
    ) -> Self {
        Self {
            env,
            flags: RwLock::new(Arc::new(FlagSet::default())),
            state: Mutex::new(ServiceState {
                overrides: DebugOverrides::open(store),
                cache: EffectiveCache::default(),
                applied_ticket: 0,
            }),
            next_ticket: AtomicU64::new(0),
            fetcher,
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn environment(&self) -> &AppEnvironment {
        &self.env
    }

    /// The current flag set. Never a mix of two loads.
    pub fn snapshot(&self) -> Arc<FlagSet> {
        Arc::clone(&self.flags.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Effective state of `key`: override first, then the gate evaluator.
    pub fn is_enabled(&self, key: &str) -> bool {
        let mut state = self.lock_state();

        if let Some(forced) = state.overrides.get(key) {
            debug!("Debug override for '{key}': {forced}");
            return forced;
        }

        if let Some(cached) = state.cache.get(key) {
            return cached;
        }

        let flags = self.snapshot();
        let enabled = GateEvaluator::new(&flags, &self.env).is_enabled(key);
        state.cache.insert(key, enabled);
        enabled
    }

    pub fn is_feature_enabled(&self, feature: KnownFeature) -> bool {
        self.is_enabled(feature.key())
    }

    pub fn restrictions(&self, key: &str) -> Vec<Restriction> {
        let flags = self.snapshot();
        GateEvaluator::new(&flags, &self.env).restrictions(key)
    }

    /// Every known flag with its override, restrictions and effective value,
    /// sorted by key.
    pub fn all_flags(&self) -> Vec<FlagStatus> {
        let (flags, overrides) = {
            let state = self.lock_state();
            (self.snapshot(), state.overrides.all().clone())
        };
        let eval = GateEvaluator::new(&flags, &self.env);

        flags
            .iter()
            .map(|(key, flag)| {
                let restrictions = eval.restrictions(key);
                let override_value = overrides.get(key).copied();
                let effective =
                    override_value.unwrap_or(flag.enabled && restrictions.is_empty());
                FlagStatus {
                    key: key.to_string(),
                    flag: flag.clone(),
                    override_value,
                    restrictions,
                    effective,
                }
            })
            .collect()
    }

    pub fn get_override(&self, key: &str) -> Option<bool> {
        self.lock_state().overrides.get(key)
    }

    pub fn set_override(&self, key: &str, value: bool) -> Result<(), OverrideError> {
        let mut state = self.lock_state();
        state.overrides.set(key, value)?;
        state.cache.invalidate(key);
        info!("Debug override for '{key}' set to {value}");
        self.notify(FlagEvent::OverrideChanged {
            key: key.to_string(),
            value: Some(value),
        });
        Ok(())
    }

    pub fn clear_override(&self, key: &str) -> Result<(), OverrideError> {
        let mut state = self.lock_state();
        let removed = state.overrides.clear(key)?;
        state.cache.invalidate(key);
        if removed.is_some() {
            info!("Debug override for '{key}' cleared");
            self.notify(FlagEvent::OverrideChanged {
                key: key.to_string(),
                value: None,
            });
        }
        Ok(())
    }

    pub fn clear_all_overrides(&self) -> Result<(), OverrideError> {
        let mut state = self.lock_state();
        let cleared = state.overrides.clear_all()?;
        for key in &cleared {
            state.cache.invalidate(key);
        }
        info!("Cleared {} debug override(s)", cleared.len());
        self.notify(FlagEvent::OverridesCleared);
        Ok(())
    }

    /// Fetches and applies a flag document on a worker thread.
    ///
    /// Loads are ticketed in call order. A load that finishes after a newer
    /// one was applied is discarded with [`LoadError::Superseded`].
    pub fn load_configuration(self: &Arc<Self>, location: DocumentLocation) -> LoadHandle {
        let ticket = self.take_ticket();
        let (tx, rx) = cb::bounded(1);
        let service = Arc::clone(self);

        let spawned = thread::Builder::new()
            .name(format!("pvflags-load-{ticket}"))
            .spawn(move || {
                let result = service.fetch_and_apply(ticket, &location);
                let _ = tx.send(result);
            });
        if let Err(e) = spawned {
            warn!("Failed to spawn configuration loader: {e}");
        }

        LoadHandle::new(ticket, rx)
    }

    /// Parses and applies a flag document on the calling thread.
    pub fn apply_document(&self, bytes: &[u8]) -> Result<LoadSummary, LoadError> {
        let ticket = self.take_ticket();
        let result = FlagSet::from_json(bytes).and_then(|set| self.apply(ticket, set));
        if let Err(e) = &result {
            self.report_failure(e);
        }
        result
    }

    /// Replaces the flag set directly, bypassing any document.
    pub fn set_debug_configuration(&self, flags: FlagSet) -> Result<LoadSummary, LoadError> {
        let ticket = self.take_ticket();
        self.apply(ticket, flags)
    }

    pub fn subscribe(&self) -> cb::Receiver<FlagEvent> {
        let (tx, rx) = cb::unbounded();
        self.lock_listeners().push(tx);
        rx
    }

    fn fetch_and_apply(
        &self,
        ticket: u64,
        location: &DocumentLocation,
    ) -> Result<LoadSummary, LoadError> {
        debug!("Load #{ticket}: fetching {location}");
        let result = self
            .fetcher
            .fetch(location)
            .map_err(LoadError::from)
            .and_then(|bytes| FlagSet::from_json(&bytes))
            .and_then(|set| self.apply(ticket, set));

        match &result {
            Ok(summary) => info!(
                "Loaded {} feature(s) from {location} (load #{ticket})",
                summary.features
            ),
            Err(e) => self.report_failure(e),
        }
        result
    }

    fn apply(&self, ticket: u64, set: FlagSet) -> Result<LoadSummary, LoadError> {
        let features = set.len();
        let mut state = self.lock_state();
        if ticket <= state.applied_ticket {
            return Err(LoadError::Superseded {
                ticket,
                applied: state.applied_ticket,
            });
        }

        *self.flags.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(set);
        state.applied_ticket = ticket;
        let (hits, misses) = state.cache.stats();
        debug!("Load #{ticket}: dropping cached states ({hits} hit(s), {misses} miss(es) so far)");
        state.cache.invalidate_all();
        self.notify(FlagEvent::ConfigurationLoaded { features });
        Ok(LoadSummary { ticket, features })
    }

    fn report_failure(&self, err: &LoadError) {
        match err {
            LoadError::Superseded { .. } => info!("Discarding stale configuration: {err}"),
            _ => {
                warn!("Failed to load configuration: {err}");
                self.notify(FlagEvent::LoadFailed {
                    reason: err.to_string(),
                });
            }
        }
    }

    fn take_ticket(&self) -> u64 {
        self.next_ticket.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn notify(&self, event: FlagEvent) {
        self.lock_listeners()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn lock_state(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<cb::Sender<FlagEvent>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
