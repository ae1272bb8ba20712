//! Response cache keyed on a stable hash of `"<backend>:<tool>:<canonical
//! json(params)>"` (§3, §4.3, testable property 9).

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;

struct Entry {
    result: serde_json::Value,
    stored_at: DateTime<Utc>,
}

/// A TTL-bounded response cache. Capacity defaults to 1000 entries; once
/// exceeded, the oldest 100 entries (10% of the default cap) are evicted.
pub struct ResponseCache {
    entries: HashMap<String, Entry>,
    ttl: Duration,
    capacity: usize,
}

impl ResponseCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        ResponseCache {
            entries: HashMap::new(),
            ttl,
            capacity,
        }
    }

    /// Stable cache key: sorts `params`' object keys recursively so that
    /// differently-ordered-but-equal parameter maps hash identically.
    pub fn key(backend: &str, tool: &str, params: &serde_json::Value) -> String {
        let canonical = canonicalize(params);
        let raw = format!("{backend}:{tool}:{canonical}");
        let mut hasher = Sha256::new();
        hasher.update(raw.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Option<serde_json::Value> {
        let entry = self.entries.get(key)?;
        if now.signed_duration_since(entry.stored_at) < chrono::Duration::from_std(self.ttl).ok()? {
            Some(entry.result.clone())
        } else {
            None
        }
    }

    pub fn put(&mut self, key: String, result: serde_json::Value, now: DateTime<Utc>) {
        if self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        self.entries.insert(
            key,
            Entry {
                result,
                stored_at: now,
            },
        );
    }

    fn evict_oldest(&mut self) {
        let evict_count = (self.entries.len() / 10).max(1);
        let mut by_age: Vec<(String, DateTime<Utc>)> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.stored_at))
            .collect();
        by_age.sort_by_key(|(_, stored_at)| *stored_at);
        for (key, _) in by_age.into_iter().take(evict_count) {
            self.entries.remove(&key);
        }
    }

    pub fn clear(&mut self) -> usize {
        let cleared = self.entries.len();
        self.entries.clear();
        cleared
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Produces a JSON string with object keys sorted at every level, so
/// semantically identical parameter maps always hash to the same key.
fn canonicalize(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{:?}:{}", k, canonicalize(&map[k])))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        serde_json::Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonicalize).collect();
            format!("[{}]", parts.join(","))
        }
        other => other.to_string(),
    }
}
