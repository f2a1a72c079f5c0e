//! TTL cache for generated resource payloads
//!
//! Entries are keyed by the resource URI and its validated input. Expiry is
//! checked when an entry is looked up; nothing sweeps the cache in the
//! background.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;

/// Hex SHA-256 of `uri`, a NUL byte and the canonical form of `input`
pub fn cache_key(uri: &str, input: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(uri.as_bytes());
    hasher.update([0u8]);
    hasher.update(canonical_json(input).as_bytes());
    hex::encode(hasher.finalize())
}

/// JSON text with object keys sorted at every level
pub fn canonical_json(value: &serde_json::Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    use serde_json::Value;

    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Cache counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,

    /// Expired entries removed on lookup
    pub evictions: u64,

    /// Lookups per resource URI
    pub access_counts: BTreeMap<String, u64>,

    /// Live entries at snapshot time
    pub entries: usize,
}

struct CacheEntry {
    uri: String,
    payload: String,
    cached_at: Instant,
}

/// TTL cache. Not synchronized; the owning registry wraps it in a lock.
pub struct ResourceCache {
    ttl: Duration,
    entries: HashMap<String, CacheEntry>,
    stats: CacheStats,
}

impl ResourceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a live entry, counting the access as a hit or a miss.
    ///
    /// An entry older than the TTL is evicted and reported as a miss.
    pub fn lookup(&mut self, uri: &str, key: &str) -> Option<String> {
        *self.stats.access_counts.entry(uri.to_string()).or_insert(0) += 1;

        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if now.duration_since(entry.cached_at) > self.ttl => true,
            Some(entry) => {
                self.stats.hits += 1;
                return Some(entry.payload.clone());
            }
            None => false,
        };

        if expired {
            self.entries.remove(key);
            self.stats.evictions += 1;
        }
        self.stats.misses += 1;
        None
    }

    pub fn store(&mut self, uri: &str, key: String, payload: String) {
        self.entries.insert(
            key,
            CacheEntry {
                uri: uri.to_string(),
                payload,
                cached_at: Instant::now(),
            },
        );
    }

    /// Drop every entry for one resource. Returns how many were dropped.
    pub fn invalidate(&mut self, uri: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.uri != uri);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            ..self.stats.clone()
        }
    }
}
