#![allow(dead_code)]

use crossbeam_channel as cb;
use pvflags_core::error::FetchError;
use pvflags_core::overrides::MemoryOverrideStore;
use pvflags_core::remote::{DocumentFetcher, DocumentLocation};
use pvflags_core::{AppEnvironment, Channel, FeatureFlagService};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub fn env(channel: Channel, build: Option<&str>, version: &str) -> AppEnvironment {
    AppEnvironment::new(channel, build.map(str::to_string), version)
}

pub fn memory_service(env: AppEnvironment) -> Arc<FeatureFlagService> {
    Arc::new(FeatureFlagService::new(
        env,
        Box::new(MemoryOverrideStore::new()),
    ))
}

/// Builds a flag document where every key has the same `enabled` value.
pub fn uniform_document(keys: &[String], enabled: bool) -> Vec<u8> {
    let features: Vec<String> = keys
        .iter()
        .map(|k| format!(r#""{k}": {{"enabled": {enabled}}}"#))
        .collect();
    format!(r#"{{"features": {{{}}}}}"#, features.join(",")).into_bytes()
}

/// Serves documents from memory. A location registered with `gate` blocks
/// until the returned sender fires, which lets tests control the order in
/// which concurrent loads finish.
#[derive(Default)]
pub struct ScriptedFetcher {
    docs: Mutex<HashMap<String, Vec<u8>>>,
    gates: Mutex<HashMap<String, cb::Receiver<()>>>,
}

impl ScriptedFetcher {
    pub fn serve(&self, url: &str, body: &[u8]) {
        self.docs
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_vec());
    }

    pub fn gate(&self, url: &str) -> cb::Sender<()> {
        let (tx, rx) = cb::bounded(1);
        self.gates.lock().unwrap().insert(url.to_string(), rx);
        tx
    }
}

impl DocumentFetcher for ScriptedFetcher {
    fn fetch(&self, location: &DocumentLocation) -> Result<Vec<u8>, FetchError> {
        let key = location.to_string();

        let gate = self.gates.lock().unwrap().remove(&key);
        if let Some(gate) = gate {
            let _ = gate.recv();
        }

        self.docs
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or(FetchError::Status {
                url: key,
                status: 404,
            })
    }
}
