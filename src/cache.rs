//! Bounded two-generation TTL cache (C1).
//!
//! Ported from `examples/original_source/cacheMap.go`'s `CacheMap`: two
//! generations, each holding up to `size` entries. Writes always land in the
//! younger generation; when it fills, the older generation is discarded
//! wholesale and the younger one takes its place. A read checks younger
//! then older and counts as a hit only if present and unexpired. There is no
//! per-entry LRU bookkeeping: entries are cheap to recompute, so a false
//! miss just costs a refresh.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs() as i64
}

#[derive(Clone)]
struct Entry<V> {
    data: V,
    valid_until: i64,
}

struct Inner<K, V> {
    younger: HashMap<K, Entry<V>>,
    older: HashMap<K, Entry<V>>,
}

/// A bounded `K -> V` mapping with per-entry expiry and generational
/// overflow. Many readers, single writer in practice (enforced by an
/// `RwLock`, not by any stronger guarantee).
pub struct CacheMap<K, V> {
    size: usize,
    inner: RwLock<Inner<K, V>>,
}

impl<K, V> CacheMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(size: usize) -> Self {
        Self {
            size,
            inner: RwLock::new(Inner {
                younger: HashMap::with_capacity(size),
                older: HashMap::with_capacity(size),
            }),
        }
    }

    /// Inserts `data`, valid until `valid_until` (unix seconds).
    pub fn put(&self, key: K, data: V, valid_until: i64) {
        let mut inner = self.inner.write().expect("cache lock poisoned");
        let entry = Entry { data, valid_until };
        if inner.younger.len() < self.size {
            inner.younger.insert(key, entry);
            return;
        }
        // Younger generation full: rotate. The older generation (frozen
        // since the last rotation) is discarded wholesale; the now-full
        // younger generation takes its place, and a fresh younger
        // generation starts out holding just this entry.
        inner.older = std::mem::replace(&mut inner.younger, HashMap::with_capacity(self.size));
        inner.younger.insert(key, entry);
    }

    /// Returns the cached value if present and not yet expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let inner = self.inner.read().expect("cache lock poisoned");
        let now = now_unix();
        if let Some(e) = inner.younger.get(key) {
            if now < e.valid_until {
                return Some(e.data.clone());
            }
        }
        if let Some(e) = inner.older.get(key) {
            if now < e.valid_until {
                return Some(e.data.clone());
            }
        }
        None
    }

    /// Number of entries currently held, across both generations. Bounded
    /// by `2 * size`.
    pub fn len(&self) -> usize {
        let inner = self.inner.read().expect("cache lock poisoned");
        inner.younger.len() + inner.older.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Returns a random unix timestamp in `[n-1, n+1]` days from now. Jitter
/// avoids every name-cache entry expiring at once and bursting the source
/// API with resolve calls. Ported from
/// `examples/original_source/helper_funcs.go`'s `approxNDaysFromNow`.
pub fn approx_n_days_from_now(n: i64) -> i64 {
    use rand::Rng;
    const SECS_IN_DAY: i64 = 24 * 60 * 60;
    let n_days_from_now = now_unix() + n * SECS_IN_DAY;
    let jitter = rand::thread_rng().gen_range(-SECS_IN_DAY..SECS_IN_DAY);
    n_days_from_now + jitter
}
