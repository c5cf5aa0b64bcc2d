use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::Mutex;

use crate::analyze::collab::AnalysisCache;
use crate::analyze::types::AnalysisResult;

const DEFAULT_CAPACITY: usize = 500;
const DEFAULT_TTL_SECS: u64 = 30 * 60;

struct CachedEntry {
    result: AnalysisResult,
    cached_at: Instant,
}

/// In-memory TTL'd LRU cache of analysis results, keyed by message id.
pub struct MemoryCache {
    entries: Mutex<LruCache<String, CachedEntry>>,
    ttl: Duration,
}

impl MemoryCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .unwrap_or_else(|| NonZeroUsize::new(DEFAULT_CAPACITY).unwrap());
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, Duration::from_secs(DEFAULT_TTL_SECS))
    }
}

#[async_trait]
impl AnalysisCache for MemoryCache {
    async fn get(&self, message_id: &str) -> Option<AnalysisResult> {
        let mut entries = self.entries.lock().await;
        let expired = entries
            .get(message_id)
            .map(|e| e.cached_at.elapsed() > self.ttl)?;
        if expired {
            entries.pop(message_id);
            return None;
        }
        entries.get(message_id).map(|e| e.result.clone())
    }

    async fn set(&self, message_id: &str, result: &AnalysisResult) {
        self.entries.lock().await.put(
            message_id.to_string(),
            CachedEntry {
                result: result.clone(),
                cached_at: Instant::now(),
            },
        );
    }
}
