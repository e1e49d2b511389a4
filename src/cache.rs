use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};

use crate::metrics::{TOOL_CACHE_HITS, TOOL_CACHE_MISSES, TOOL_CACHE_SIZE};

// Cache entry with timestamp
#[derive(Clone)]
pub struct CacheEntry {
    pub response: String,
    pub created_at: Instant,
}

// Create a cache key (hash of tool name + raw arguments)
pub fn make_cache_key(tool: &str, arguments: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tool);
    hasher.update([0u8]);
    hasher.update(arguments);
    format!("{:x}", hasher.finalize())
}

// Tool results keyed by call, so repeated questions don't hit GitHub again
pub struct ToolCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl ToolCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if self.ttl.is_zero() {
            return None;
        }
        match self.entries.get(key) {
            Some(entry) if entry.created_at.elapsed() < self.ttl => {
                TOOL_CACHE_HITS.inc();
                Some(entry.response.clone())
            }
            _ => {
                TOOL_CACHE_MISSES.inc();
                None
            }
        }
    }

    pub fn insert(&self, key: String, response: String) {
        if self.ttl.is_zero() {
            return;
        }
        self.entries.insert(
            key,
            CacheEntry {
                response,
                created_at: Instant::now(),
            },
        );
        TOOL_CACHE_SIZE.set(self.entries.len() as f64);
    }

    // Drop expired entries, returns how many were removed
    pub fn evict_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.created_at.elapsed() < self.ttl);
        TOOL_CACHE_SIZE.set(self.entries.len() as f64);
        before - self.entries.len()
    }
}
