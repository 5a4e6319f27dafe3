use common::errors::AppError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};
use tracing::{info, warn};

/// Builder for deterministic cache keys derived from a call signature.
///
/// The canonical form is a JSON array of the function name, the positional
/// arguments in order, and the keyword arguments as `[key, value]` pairs
/// sorted by key; the key is the SHA-256 hex digest of that array. Keyword
/// argument order therefore never changes the key, positional order does.
pub struct Fingerprint {
    function: String,
    args: Vec<Value>,
    kwargs: BTreeMap<String, Value>,
}

impl Fingerprint {
    pub fn new(function: &str) -> Self {
        Self {
            function: function.to_string(),
            args: Vec::new(),
            kwargs: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn kwarg(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.kwargs.insert(key.to_string(), value.into());
        self
    }

    pub fn finish(self) -> String {
        let mut parts = Vec::with_capacity(1 + self.args.len() + self.kwargs.len());
        parts.push(Value::String(self.function));
        parts.extend(self.args);
        for (key, value) in self.kwargs {
            parts.push(Value::Array(vec![Value::String(key), value]));
        }

        let mut hasher = Sha256::new();
        hasher.update(Value::Array(parts).to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

struct CacheEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// Process-local key-value cache with per-entry TTLs.
///
/// Values are opaque serialized bytes; expired entries are dropped lazily
/// when read.
pub struct ResultCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }

        // the entry looked expired under the read lock; a writer may have
        // replaced it before we acquired the write lock, so check again
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub async fn set(&self, key: String, value: Vec<u8>, ttl: Duration) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache-aside wrapper: serve `key` from `cache` when present, otherwise run
/// `compute` once, store its serialized result for `ttl`, and return it.
///
/// Errors from `compute` propagate and are never cached. A stored value that
/// no longer decodes is treated as a miss and recomputed.
pub async fn cached_call<T, F, Fut>(
    cache: &ResultCache,
    key: &str,
    ttl: Duration,
    compute: F,
) -> Result<T, AppError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    if let Some(bytes) = cache.get(key).await {
        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                info!(key = %key, "Cache hit");
                return Ok(value);
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding undecodable cache entry");
            }
        }
    }

    let value = compute().await?;
    let bytes = serde_json::to_vec(&value)?;
    cache.set(key.to_string(), bytes, ttl).await;

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn fingerprint_ignores_kwarg_order() {
        let a = Fingerprint::new("get_news")
            .kwarg("query", "storm")
            .kwarg("count", 6)
            .finish();
        let b = Fingerprint::new("get_news")
            .kwarg("count", 6)
            .kwarg("query", "storm")
            .finish();
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_depends_on_positional_order() {
        let a = Fingerprint::new("f").arg("x").arg("y").finish();
        let b = Fingerprint::new("f").arg("y").arg("x").finish();
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_separates_functions_and_args() {
        let a = Fingerprint::new("f").arg("x").finish();
        let b = Fingerprint::new("g").arg("x").finish();
        let c = Fingerprint::new("f").arg("z").finish();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let cache = ResultCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value: String = cached_call(&cache, "k", Duration::from_secs(60), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, AppError>("hello".to_string())
            })
            .await
            .unwrap();
            assert_eq!(value, "hello");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_results_are_still_cache_hits() {
        let cache = ResultCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value: Vec<String> = cached_call(&cache, "k", Duration::from_secs(60), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, AppError>(Vec::new())
            })
            .await
            .unwrap();
            assert!(value.is_empty());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let cache = ResultCache::new();

        let first: Result<u32, AppError> =
            cached_call(&cache, "k", Duration::from_secs(60), || async {
                Err(AppError::internal("boom"))
            })
            .await;
        assert!(first.is_err());

        let second: u32 = cached_call(&cache, "k", Duration::from_secs(60), || async {
            Ok::<_, AppError>(7)
        })
        .await
        .unwrap();
        assert_eq!(second, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = ResultCache::new();
        let calls = AtomicUsize::new(0);

        let compute = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, AppError>(1u32)
        };

        let _: u32 = cached_call(&cache, "k", Duration::from_secs(5), compute)
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        let _: u32 = cached_call(&cache, "k", Duration::from_secs(5), compute)
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn undecodable_entries_are_recomputed() {
        let cache = ResultCache::new();
        cache
            .set("k".to_string(), b"not json".to_vec(), Duration::from_secs(60))
            .await;

        let value: u32 = cached_call(&cache, "k", Duration::from_secs(60), || async {
            Ok::<_, AppError>(9)
        })
        .await
        .unwrap();
        assert_eq!(value, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn raw_backend_drops_expired_entries_on_read() {
        let cache = ResultCache::new();
        cache
            .set("k".to_string(), vec![1, 2, 3], Duration::from_secs(1))
            .await;
        assert_eq!(cache.get("k").await, Some(vec![1, 2, 3]));
        assert_eq!(cache.get("missing").await, None);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn expired_reads_do_not_evict_concurrent_rewrites() {
        let cache = Arc::new(ResultCache::new());

        for _ in 0..200 {
            // an already-expired entry forces every read onto the eviction path
            cache.set("k".to_string(), vec![0], Duration::ZERO).await;

            let reader = {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get("k").await })
            };
            let writer = {
                let cache = cache.clone();
                tokio::spawn(async move {
                    cache
                        .set("k".to_string(), vec![1], Duration::from_secs(60))
                        .await
                })
            };
            let _ = reader.await.unwrap();
            writer.await.unwrap();

            // however the read interleaved, the rewrite must survive it
            assert_eq!(cache.get("k").await, Some(vec![1]));
        }
    }
}
