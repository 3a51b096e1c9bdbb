//! Fingerprint-keyed result cache with file-watch invalidation.
//!
//! Entries are published through a [`Reservation`], which registers the
//! watchers *before* the sources are read. A change that lands while the
//! result is being computed marks the reservation stale and the result is
//! never published, so a reader can't observe content older than the files.
//!
//! Each entry owns its watch tokens: evicting or replacing an entry cancels
//! whatever tokens it still holds.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crossbeam::channel::{self, Receiver, Sender};
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::fingerprint::Fingerprint;
use crate::provider::FileProvider;
use crate::watch::WatchToken;

/// A materialized result and the files it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cached {
    pub content: Arc<str>,
    pub files: Arc<[PathBuf]>,
}

impl Cached {
    pub fn new(content: impl Into<Arc<str>>, files: impl Into<Arc<[PathBuf]>>) -> Self {
        Self {
            content: content.into(),
            files: files.into(),
        }
    }
}

struct CacheEntry {
    /// Distinguishes this entry from a later one under the same key
    id: u64,
    value: Cached,
    _tokens: Vec<WatchToken>,
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

/// Shared result cache.
pub struct ResultCache {
    entries: DashMap<Fingerprint, CacheEntry>,
    next_id: AtomicU64,
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    subscribers: Mutex<Vec<Sender<Fingerprint>>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::with_enabled(true)
    }

    /// A cache that never stores anything: every lookup misses.
    pub fn disabled() -> Self {
        Self::with_enabled(false)
    }

    fn with_enabled(enabled: bool) -> Self {
        Self {
            entries: DashMap::new(),
            next_id: AtomicU64::new(0),
            enabled,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Look up a result, counting the hit or miss.
    pub fn get(&self, key: &Fingerprint) -> Option<Cached> {
        let found = self.peek(key);
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Look up a result without touching the counters.
    pub fn peek(&self, key: &Fingerprint) -> Option<Cached> {
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn contains(&self, key: &Fingerprint) -> bool {
        self.entries.contains_key(key)
    }

    /// Store `value`, invalidated by a change to any of `value.files`.
    ///
    /// Returns whether the value was actually cached.
    pub fn set(self: &Arc<Self>, key: Fingerprint, value: Cached, provider: &dyn FileProvider) -> bool {
        let reservation = self.reserve(key, &value.files, provider);
        reservation.publish(value)
    }

    /// Start watching `targets` for a result about to be computed.
    pub fn reserve(
        self: &Arc<Self>,
        key: Fingerprint,
        targets: &[PathBuf],
        provider: &dyn FileProvider,
    ) -> Reservation {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let stale = Arc::new(AtomicBool::new(false));
        let mut reservation = Reservation {
            cache: Arc::downgrade(self),
            key,
            id,
            tokens: Vec::with_capacity(targets.len()),
            stale: Arc::clone(&stale),
            cacheable: self.enabled,
        };
        if !self.enabled {
            return reservation;
        }

        for target in targets {
            let weak = Arc::downgrade(self);
            let stale = Arc::clone(&stale);
            let on_change = Box::new(move || {
                stale.store(true, Ordering::SeqCst);
                if let Some(cache) = weak.upgrade() {
                    cache.evict(&key, id);
                }
            });
            match provider.watch(target, on_change) {
                Ok(token) => reservation.tokens.push(token),
                Err(e) => {
                    crate::debug!("cache"; "not caching {}: {}", key, e);
                    reservation.cacheable = false;
                    reservation.tokens.clear();
                    break;
                }
            }
        }
        reservation
    }

    /// Remove an entry regardless of its watchers.
    pub fn invalidate(&self, key: &Fingerprint) -> bool {
        match self.entries.remove(key) {
            Some((key, entry)) => {
                self.evicted(key);
                drop(entry);
                true
            }
            None => false,
        }
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let keys: Vec<Fingerprint> = self.entries.iter().map(|e| *e.key()).collect();
        for key in keys {
            self.invalidate(&key);
        }
    }

    /// Remove the entry only if it is still the one published under `id`.
    fn evict(&self, key: &Fingerprint, id: u64) {
        if let Some((key, entry)) = self.entries.remove_if(key, |_, e| e.id == id) {
            crate::debug!("cache"; "evicted {}", key);
            self.evicted(key);
            drop(entry);
        }
    }

    fn evicted(&self, key: Fingerprint) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().retain(|tx| tx.send(key).is_ok());
    }

    /// Receive the fingerprint of every entry evicted from now on.
    pub fn subscribe(&self) -> Receiver<Fingerprint> {
        let (tx, rx) = channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("enabled", &self.enabled)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Watchers registered ahead of a computation; see the module docs.
///
/// Dropping a reservation without publishing cancels its watchers.
pub struct Reservation {
    cache: Weak<ResultCache>,
    key: Fingerprint,
    id: u64,
    tokens: Vec<WatchToken>,
    stale: Arc<AtomicBool>,
    cacheable: bool,
}

impl Reservation {
    /// Whether a watched file changed since the reservation was made.
    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }

    /// Whether publishing can succeed at all.
    pub fn is_cacheable(&self) -> bool {
        self.cacheable
    }

    /// Publish `value` atomically. Returns whether it is now cached.
    pub fn publish(self, value: Cached) -> bool {
        if !self.cacheable || self.is_stale() {
            return false;
        }
        let Some(cache) = self.cache.upgrade() else {
            return false;
        };

        let entry = CacheEntry {
            id: self.id,
            value,
            _tokens: self.tokens,
        };
        let replaced = cache.entries.insert(self.key, entry);
        drop(replaced);

        // A watcher may have fired between the check above and the insert.
        if self.stale.load(Ordering::SeqCst) {
            cache.evict(&self.key, self.id);
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::raw_key;
    use crate::provider::MemoryFileProvider;
    use std::path::Path;

    fn value(content: &str, files: &[&str]) -> Cached {
        let files: Vec<PathBuf> = files.iter().map(PathBuf::from).collect();
        Cached::new(content, files)
    }

    fn setup() -> (Arc<ResultCache>, MemoryFileProvider) {
        let provider = MemoryFileProvider::new();
        provider.write("a.css", "a");
        provider.write("b.css", "b");
        (Arc::new(ResultCache::new()), provider)
    }

    #[test]
    fn test_get_set() {
        let (cache, provider) = setup();
        let key = raw_key("/a");
        assert_eq!(cache.get(&key), None);
        assert!(cache.set(key, value("A", &["a.css"]), &provider));
        assert_eq!(cache.get(&key).unwrap().content.as_ref(), "A");

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
    }

    #[test]
    fn test_change_evicts_only_that_entry() {
        let (cache, provider) = setup();
        let a = raw_key("/a");
        let ab = raw_key("/ab");
        let b = raw_key("/b");
        cache.set(a, value("A", &["a.css"]), &provider);
        cache.set(ab, value("AB", &["a.css", "b.css"]), &provider);
        cache.set(b, value("B", &["b.css"]), &provider);

        provider.write("a.css", "a2");

        assert!(!cache.contains(&a));
        assert!(!cache.contains(&ab));
        assert!(cache.contains(&b));
        assert_eq!(cache.stats().evictions, 2);
    }

    #[test]
    fn test_eviction_releases_watchers() {
        let (cache, provider) = setup();
        let key = raw_key("/ab");
        cache.set(key, value("AB", &["a.css", "b.css"]), &provider);
        assert_eq!(provider.watcher().len(), 2);

        provider.write("a.css", "a2");
        // b.css token belonged to the evicted entry
        assert_eq!(provider.watcher().len(), 0);
    }

    #[test]
    fn test_invalidate() {
        let (cache, provider) = setup();
        let key = raw_key("/a");
        cache.set(key, value("A", &["a.css"]), &provider);
        assert!(cache.invalidate(&key));
        assert!(!cache.invalidate(&key));
        assert_eq!(cache.get(&key), None);
        assert_eq!(provider.watcher().len(), 0);
    }

    #[test]
    fn test_replacement_ignores_old_watchers() {
        let (cache, provider) = setup();
        let key = raw_key("/x");
        cache.set(key, value("old", &["a.css"]), &provider);
        cache.set(key, value("new", &["b.css"]), &provider);

        // The old entry's token was cancelled with it.
        provider.write("a.css", "a2");
        assert_eq!(cache.peek(&key).unwrap().content.as_ref(), "new");
    }

    #[test]
    fn test_stale_reservation_is_not_published() {
        let (cache, provider) = setup();
        let key = raw_key("/a");
        let files = vec![PathBuf::from("a.css")];
        let reservation = cache.reserve(key, &files, &provider);

        provider.write("a.css", "changed while computing");
        assert!(reservation.is_stale());
        assert!(!reservation.publish(value("A", &["a.css"])));
        assert!(!cache.contains(&key));
    }

    #[test]
    fn test_dropped_reservation_cancels_watchers() {
        let (cache, provider) = setup();
        let files = vec![PathBuf::from("a.css"), PathBuf::from("b.css")];
        let reservation = cache.reserve(raw_key("/ab"), &files, &provider);
        assert_eq!(provider.watcher().len(), 2);
        drop(reservation);
        assert_eq!(provider.watcher().len(), 0);
    }

    #[test]
    fn test_disabled_always_misses() {
        let cache = Arc::new(ResultCache::disabled());
        let provider = MemoryFileProvider::new();
        let key = raw_key("/a");
        assert!(!cache.set(key, value("A", &["a.css"]), &provider));
        assert_eq!(cache.get(&key), None);
        assert_eq!(provider.watcher().len(), 0);
    }

    #[test]
    fn test_subscribe_receives_evictions() {
        let (cache, provider) = setup();
        let rx = cache.subscribe();
        let key = raw_key("/a");
        cache.set(key, value("A", &["a.css"]), &provider);

        provider.write("a.css", "a2");
        assert_eq!(rx.try_recv(), Ok(key));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unwatchable_target_degrades_to_miss() {
        use crate::provider::PhysicalFileProvider;
        use crate::watch::FileChangeWatcher;

        let dir = tempfile::TempDir::new().unwrap();
        let provider = PhysicalFileProvider::new(dir.path(), FileChangeWatcher::native().unwrap());
        let cache = Arc::new(ResultCache::new());
        let key = raw_key("/gone");

        let files = vec![Path::new("missing-dir/x.css").to_path_buf()];
        let reservation = cache.reserve(key, &files, &provider);
        assert!(!reservation.is_cacheable());
        assert!(!reservation.publish(value("X", &["missing-dir/x.css"])));
        assert_eq!(cache.get(&key), None);
    }
}
