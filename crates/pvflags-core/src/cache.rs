use std::collections::HashMap;

/// Last computed effective value per feature key.
///
/// Not synchronized on its own; the owner keeps it behind the same lock as
/// the state it is derived from.
#[derive(Debug, Default, Clone)]
pub struct EffectiveCache {
    entries: HashMap<String, bool>,
    hits: u64,
    misses: u64,
}

impl EffectiveCache {
    pub fn get(&mut self, key: &str) -> Option<bool> {
        let found = self.entries.get(key).copied();
        if found.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        found
    }

    pub fn insert(&mut self, key: &str, value: bool) {
        self.entries.insert(key.to_string(), value);
    }

    pub fn invalidate(&mut self, key: &str) {
        self.entries.remove(key);
    }

    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(hits, misses)` since creation.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}
