//! Bounded cache for server resources.
//!
//! App schemas and user/group stubs are fetched repeatedly during record work.
//! The cache bounds that traffic: least-recently-used entries fall out when
//! the capacity is reached, and each entry is addressable by its id plus any
//! secondary keys (app name, acronym, username).

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

/// LRU cache with secondary-key aliasing. A capacity of zero disables caching
/// entirely, turning every operation into a no-op miss.
pub struct ResourceCache<T> {
    entries: Option<LruCache<String, Arc<T>>>,
    aliases: HashMap<String, String>,
}

impl<T> ResourceCache<T> {
    /// Create a cache bounded to `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(LruCache::new),
            aliases: HashMap::new(),
        }
    }

    /// Insert a value under its primary id and any secondary keys.
    /// Returns the shared handle for immediate use.
    pub fn insert(
        &mut self,
        id: impl Into<String>,
        secondary_keys: impl IntoIterator<Item = String>,
        value: T,
    ) -> Arc<T> {
        let value = Arc::new(value);
        let Some(ref mut entries) = self.entries else {
            return value;
        };

        let id = id.into();
        if let Some((evicted_id, _)) = entries.push(id.clone(), Arc::clone(&value)) {
            if evicted_id != id {
                self.aliases.retain(|_, target| *target != evicted_id);
            }
        }
        for key in secondary_keys {
            self.aliases.insert(key, id.clone());
        }
        value
    }

    /// Look up by primary id or any secondary key, marking the entry as
    /// recently used.
    pub fn get(&mut self, key: &str) -> Option<Arc<T>> {
        let entries = self.entries.as_mut()?;
        if let Some(value) = entries.get(key) {
            return Some(Arc::clone(value));
        }
        let id = self.aliases.get(key)?.clone();
        entries.get(&id).map(Arc::clone)
    }

    /// Drop an entry and every alias pointing at it.
    pub fn remove(&mut self, key: &str) {
        let Some(ref mut entries) = self.entries else {
            return;
        };
        let id = self.aliases.get(key).cloned().unwrap_or_else(|| key.to_string());
        entries.pop(&id);
        self.aliases.retain(|_, target| *target != id);
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        if let Some(ref mut entries) = self.entries {
            entries.clear();
        }
        self.aliases.clear();
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, LruCache::len)
    }

    /// True when no entries are cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> std::fmt::Debug for ResourceCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCache")
            .field("len", &self.len())
            .field("aliases", &self.aliases.len())
            .finish()
    }
}
