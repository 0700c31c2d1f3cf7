//! Bangumi response cache
//!
//! A sequel walk re-reads the same subjects for every title in a franchise,
//! so decoded response bodies are kept for a few hours, keyed by request.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;

pub struct ResponseCache {
    entries: Mutex<HashMap<String, (Instant, Value)>>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Cache key for a request: method, path and its encoded parameters
    pub fn key(method: &str, path: &str, params: &str) -> String {
        format!("{method} {path} {params}")
    }

    /// A stored body younger than the TTL; a stale one is evicted
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((stored_at, value)) if stored_at.elapsed() < self.ttl => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: String, value: Value) {
        self.entries.lock().insert(key, (Instant::now(), value));
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_separates_method_and_params() {
        let get = ResponseCache::key("GET", "v0/subjects/1", "");
        let post = ResponseCache::key("POST", "v0/subjects/1", "");
        let paged = ResponseCache::key("GET", "v0/subjects/1", "offset=100");
        assert_ne!(get, post);
        assert_ne!(get, paged);
    }

    #[test]
    fn test_stale_body_evicted() {
        let cache = ResponseCache::new(Duration::from_millis(20));
        let key = ResponseCache::key("GET", "v0/subjects/1", "");
        cache.insert(key.clone(), json!({"id": 1}));
        assert_eq!(cache.get(&key), Some(json!({"id": 1})));

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get(&key), None);
        assert!(cache.entries.lock().is_empty());
    }

    #[test]
    fn test_clear() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        cache.insert("a".to_string(), json!(1));
        cache.clear();
        assert_eq!(cache.get("a"), None);
    }
}
