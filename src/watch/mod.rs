//! File change watching with one-shot tokens.
//!
//! Architecture:
//! ```text
//! notify backend → channel → dispatcher thread → registry → callbacks
//! ```
//!
//! The backend's event handler only forwards into an unbounded channel, so it
//! never blocks on the registry lock while a `watch()` call is waiting for
//! the backend. Lock order is always registry, then backend.
//!
//! Each `watch()` call gets its own subscription. A subscription fires once
//! and is then gone; dropping its [`WatchToken`] cancels it. The parent
//! directory stays watched (non-recursively) only while some subscription
//! inside it is alive.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam::channel;
use notify::event::ModifyKind;
use notify::{EventKind, RecursiveMode, Watcher};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::utils::path::watch_target;

/// Callback run when a watched file changes.
pub type OnChange = Box<dyn FnOnce() + Send + 'static>;

/// A watch could not be established.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to watch `{}`", path.display())]
    Backend {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Watches files and fires one-shot callbacks.
///
/// Cloning is cheap; clones share registrations and backend.
#[derive(Clone)]
pub struct FileChangeWatcher {
    shared: Arc<Shared>,
}

struct Shared {
    registry: Mutex<Registry>,
    /// `None` for a manual watcher (changes are reported by the owner).
    backend: Mutex<Option<Box<dyn Watcher + Send>>>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    /// Normalized file path → live subscriptions
    subscriptions: FxHashMap<PathBuf, Vec<Subscription>>,
    /// Watched directory → number of live subscriptions inside it
    dirs: FxHashMap<PathBuf, usize>,
}

struct Subscription {
    id: u64,
    dir: PathBuf,
    on_change: OnChange,
}

impl FileChangeWatcher {
    /// Watcher backed by the platform's native notification facility.
    pub fn native() -> Result<Self, WatchError> {
        Self::with_backend(|handler| {
            notify::recommended_watcher(handler).map(|w| Box::new(w) as Box<dyn Watcher + Send>)
        })
    }

    /// Watcher that polls file metadata every `interval`.
    ///
    /// Fallback for network drives and containers without inotify.
    pub fn polling(interval: Duration) -> Result<Self, WatchError> {
        Self::with_backend(|handler| {
            // mtimes can be too coarse to tell two writes in one second apart
            let config = notify::Config::default()
                .with_poll_interval(interval)
                .with_compare_contents(true);
            notify::PollWatcher::new(handler, config).map(|w| Box::new(w) as Box<dyn Watcher + Send>)
        })
    }

    /// Watcher without a backend; changes are reported via [`Self::notify_changed`].
    pub fn manual() -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry::default()),
                backend: Mutex::new(None),
            }),
        }
    }

    fn with_backend<F>(make: F) -> Result<Self, WatchError>
    where
        F: FnOnce(
            Box<dyn FnMut(notify::Result<notify::Event>) + Send>,
        ) -> notify::Result<Box<dyn Watcher + Send>>,
    {
        let watcher = Self::manual();
        let (tx, rx) = channel::unbounded::<notify::Result<notify::Event>>();

        let backend = make(Box::new(move |res| {
            let _ = tx.send(res);
        }))
        .map_err(|source| WatchError::Backend {
            path: PathBuf::new(),
            source,
        })?;
        *watcher.shared.backend.lock() = Some(backend);

        // Holds only a weak reference: dropping the last watcher drops the
        // backend, which closes the channel and ends this thread.
        let weak = Arc::downgrade(&watcher.shared);
        std::thread::Builder::new()
            .name("tola-bundle-watch".into())
            .spawn(move || {
                while let Ok(result) = rx.recv() {
                    let Some(shared) = weak.upgrade() else { break };
                    shared.dispatch(result);
                }
            })
            .map_err(|e| WatchError::Backend {
                path: PathBuf::new(),
                source: notify::Error::io(e),
            })?;

        Ok(watcher)
    }

    /// Invoke `on_change` once when `path` changes, is renamed or deleted.
    pub fn watch(
        &self,
        path: &Path,
        on_change: impl FnOnce() + Send + 'static,
    ) -> Result<WatchToken, WatchError> {
        let (dir, key) = watch_target(path);

        let mut registry = self.shared.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;

        let count = registry.dirs.entry(dir.clone()).or_insert(0);
        *count += 1;
        if *count == 1
            && let Err(e) = self.shared.start_watching(&dir)
        {
            registry.dirs.remove(&dir);
            return Err(e);
        }

        registry
            .subscriptions
            .entry(key.clone())
            .or_default()
            .push(Subscription {
                id,
                dir,
                on_change: Box::new(on_change),
            });

        Ok(WatchToken {
            id,
            path: key,
            shared: Arc::downgrade(&self.shared),
        })
    }

    /// Report a change to `path`, firing every subscription on it.
    ///
    /// A directory path fires every subscription beneath it.
    pub fn notify_changed(&self, path: &Path) {
        let (_, key) = watch_target(path);
        self.shared.fire(|p| p.starts_with(&key));
    }

    /// Fire every live subscription (e.g. after events were lost).
    pub fn notify_all(&self) {
        self.shared.fire(|_| true);
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.shared
            .registry
            .lock()
            .subscriptions
            .values()
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of directories currently watched.
    pub fn watched_dirs(&self) -> usize {
        self.shared.registry.lock().dirs.len()
    }
}

impl std::fmt::Debug for FileChangeWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileChangeWatcher")
            .field("subscriptions", &self.len())
            .field("watched_dirs", &self.watched_dirs())
            .finish()
    }
}

impl Shared {
    fn start_watching(&self, dir: &Path) -> Result<(), WatchError> {
        if let Some(backend) = self.backend.lock().as_mut() {
            backend
                .watch(dir, RecursiveMode::NonRecursive)
                .map_err(|source| WatchError::Backend {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }
        Ok(())
    }

    fn stop_watching(&self, dir: &Path) {
        if let Some(backend) = self.backend.lock().as_mut()
            && let Err(e) = backend.unwatch(dir)
        {
            crate::debug!("watch"; "unwatch {}: {}", dir.display(), e);
        }
    }

    /// Drop one subscription's claim on its directory.
    fn release_dir(&self, registry: &mut Registry, dir: &Path) {
        if let Some(count) = registry.dirs.get_mut(dir) {
            *count -= 1;
            if *count == 0 {
                registry.dirs.remove(dir);
                self.stop_watching(dir);
            }
        }
    }

    fn dispatch(&self, result: notify::Result<notify::Event>) {
        match result {
            Ok(event) => {
                if event.need_rescan() {
                    crate::debug!("watch"; "backend lost events, invalidating everything");
                    self.fire(|_| true);
                    return;
                }
                if matches!(event.kind, EventKind::Access(_)) {
                    return;
                }
                crate::debug!("watch"; "{:?} {:?}", event.kind, event.paths);
                // A directory that moves or vanishes takes its files with it,
                // but the backend only reports the directory itself.
                let structural = matches!(
                    event.kind,
                    EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
                );
                for path in &event.paths {
                    let (_, key) = watch_target(path);
                    if structural {
                        self.fire(|p| p.starts_with(&key));
                    } else {
                        self.fire(|p| p == key.as_path());
                    }
                }
            }
            Err(e) => {
                crate::debug!("watch"; "notify error: {}", e);
                for path in &e.paths {
                    let (_, key) = watch_target(path);
                    self.fire(|p| p.starts_with(&key));
                }
            }
        }
    }

    /// Remove matching subscriptions, then run their callbacks unlocked.
    fn fire(&self, matches: impl Fn(&Path) -> bool) {
        let fired: Vec<Subscription> = {
            let mut registry = self.registry.lock();
            let keys: Vec<PathBuf> = registry
                .subscriptions
                .keys()
                .filter(|k| matches(k))
                .cloned()
                .collect();
            let mut fired = Vec::new();
            for key in keys {
                if let Some(subs) = registry.subscriptions.remove(&key) {
                    fired.extend(subs);
                }
            }
            for sub in &fired {
                self.release_dir(&mut registry, &sub.dir);
            }
            fired
        };

        for sub in fired {
            (sub.on_change)();
        }
    }

    fn cancel(&self, path: &Path, id: u64) {
        let cancelled = {
            let mut registry = self.registry.lock();
            let Some(subs) = registry.subscriptions.get_mut(path) else {
                return;
            };
            let Some(pos) = subs.iter().position(|s| s.id == id) else {
                return;
            };
            let sub = subs.swap_remove(pos);
            if subs.is_empty() {
                registry.subscriptions.remove(path);
            }
            self.release_dir(&mut registry, &sub.dir);
            sub
        };
        // Callback dropped outside the lock: it may own other tokens.
        drop(cancelled);
    }
}

/// Handle to one subscription. Dropping it cancels the subscription.
pub struct WatchToken {
    id: u64,
    path: PathBuf,
    shared: Weak<Shared>,
}

impl WatchToken {
    /// Normalized path being watched.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the subscription has neither fired nor been cancelled.
    pub fn is_active(&self) -> bool {
        self.shared.upgrade().is_some_and(|shared| {
            shared
                .registry
                .lock()
                .subscriptions
                .get(&self.path)
                .is_some_and(|subs| subs.iter().any(|s| s.id == self.id))
        })
    }
}

impl Drop for WatchToken {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.cancel(&self.path, self.id);
        }
    }
}

impl std::fmt::Debug for WatchToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchToken")
            .field("id", &self.id)
            .field("path", &self.path)
            .finish()
    }
}
