// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::debug;

type Pending<V> = Arc<OnceCell<Option<Arc<V>>>>;

struct Inner<K, V> {
    entries: HashMap<K, Arc<V>>,
    in_flight: HashMap<K, Pending<V>>,
}

/// An in-memory cache of loaded assets with request coalescing.
///
/// Concurrent loads of one key share a single pending cell, so only the
/// first caller runs its loader and everyone else awaits the same result.
/// Failed loads leave no entry behind and are retried on the next request.
pub struct AssetCache<K, V> {
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> Default for AssetCache<K, V> {
    fn default() -> Self {
        AssetCache {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
            }),
        }
    }
}

impl<K, V> AssetCache<K, V>
where
    K: Eq + Hash + Clone + Debug,
{
    pub fn new() -> AssetCache<K, V> {
        AssetCache::default()
    }

    /// Returns a cached entry without loading.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.inner.lock().entries.get(key).cloned()
    }

    /// Returns the cached entry for `key`, joining an in-flight load or
    /// running `load` if there is neither.
    pub async fn get_or_load<F, Fut>(&self, key: K, load: F) -> Option<Arc<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Option<V>>,
    {
        let pending = {
            let mut inner = self.inner.lock();
            if let Some(entry) = inner.entries.get(&key) {
                debug!(key = ?key, "Asset cache hit");
                return Some(entry.clone());
            }
            inner
                .in_flight
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let result = pending
            .get_or_init(|| async move { load().await.map(Arc::new) })
            .await
            .clone();

        let mut inner = self.inner.lock();
        if let Some(entry) = &result {
            inner
                .entries
                .entry(key.clone())
                .or_insert_with(|| entry.clone());
        }
        if inner
            .in_flight
            .get(&key)
            .is_some_and(|current| Arc::ptr_eq(current, &pending))
        {
            inner.in_flight.remove(&key);
        }
        result
    }

    /// Drops every cached entry. Loads already in flight still complete.
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of loads currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inner.lock().in_flight.len()
    }
}
