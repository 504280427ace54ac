//! Process-wide instance cache: one shared, refcounted engine per
//! `(root, readonly)` pair, regardless of how many times `open` is called.

use std::any::{Any, TypeId};
use std::cell::Cell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use log::debug;
use once_cell::sync::Lazy;

use crate::engine::EngineCore;
use crate::error::{Error, Result};
use crate::io::{self, IoBackend};
use crate::key::{Key, Value};

type CacheKey = (TypeId, PathBuf, bool);

static GLOBAL_CACHE: Lazy<Mutex<HashMap<CacheKey, Arc<dyn Any + Send + Sync>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Open-time configuration.
///
/// There is no default merge threshold: every caller must state how many
/// entries the log may hold before a write triggers a merge.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub(crate) fresh: bool,
    pub(crate) readonly: bool,
    pub(crate) log_size: u64,
}

impl OpenOptions {
    /// Starts from `log_size` (in entries, not bytes), with `fresh` and
    /// `readonly` both off.
    pub fn new(log_size: u64) -> Self {
        Self {
            fresh: false,
            readonly: false,
            log_size,
        }
    }

    /// Discards any existing log/index at `root` before opening.
    pub fn fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }

    /// Opens without acquiring the writer lock; reads stay in sync with a
    /// concurrent writer via the generation counter.
    pub fn readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }
}

struct Shared<K: Key, V: Value, IO: IoBackend> {
    core: Mutex<EngineCore<K, V, IO>>,
    refcount: AtomicUsize,
}

/// A handle to a shared, process-wide engine instance.
///
/// Every `open` for the same `(root, readonly)` returns a handle pointing at
/// the same underlying engine; the engine is only torn down once the last
/// handle closes. `close` is idempotent; dropping an unclosed handle closes
/// it.
pub struct Handle<K, V, IO = crate::io::FileIo>
where
    K: Key + Send + 'static,
    V: Value + Send + 'static,
    IO: IoBackend + Send + 'static,
{
    shared: Arc<Shared<K, V, IO>>,
    cache_key: CacheKey,
    closed: Cell<bool>,
}

impl<K, V, IO> Handle<K, V, IO>
where
    K: Key + Send + 'static,
    V: Value + Send + 'static,
    IO: IoBackend + Send + 'static,
{
    /// Opens (or attaches to an already-open, shared) engine at `root`.
    pub fn open(root: impl AsRef<Path>, opts: OpenOptions) -> Result<Self> {
        let root_ref = root.as_ref();
        let canonical = std::fs::canonicalize(root_ref).unwrap_or_else(|_| root_ref.to_path_buf());
        let type_key = TypeId::of::<(K, V, IO)>();
        let cache_key: CacheKey = (type_key, canonical.clone(), opts.readonly);

        let mut cache = GLOBAL_CACHE
            .lock()
            .map_err(|_| Error::InvariantViolation("instance cache mutex poisoned".into()))?;

        if !io::index_dir(&canonical).exists() {
            cache.remove(&(type_key, canonical.clone(), true));
            cache.remove(&(type_key, canonical.clone(), false));
        }

        if let Some(existing) = cache.get(&cache_key) {
            let shared = existing
                .clone()
                .downcast::<Shared<K, V, IO>>()
                .unwrap_or_else(|_| panic!("cache key must encode the concrete (K, V, IO) type"));
            shared.refcount.fetch_add(1, Ordering::AcqRel);
            drop(cache);
            debug!("attached to shared engine at {:?}", canonical);

            let handle = Handle {
                shared,
                cache_key,
                closed: Cell::new(false),
            };
            if opts.fresh {
                handle.clear()?;
            }
            return Ok(handle);
        }

        let core = EngineCore::<K, V, IO>::open(&canonical, &opts)?;
        let shared = Arc::new(Shared {
            core: Mutex::new(core),
            refcount: AtomicUsize::new(1),
        });
        cache.insert(cache_key.clone(), shared.clone());
        drop(cache);
        debug!("opened fresh engine at {:?}", canonical);

        Ok(Handle {
            shared,
            cache_key,
            closed: Cell::new(false),
        })
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, EngineCore<K, V, IO>>> {
        if self.closed.get() {
            return Err(Error::Closed);
        }
        self.shared
            .core
            .lock()
            .map_err(|_| Error::InvariantViolation("engine mutex poisoned".into()))
    }

    /// Looks up `key`, returning `Error::NotFound` if absent.
    pub fn find(&self, key: &K) -> Result<V> {
        self.guard()?.find(key)
    }

    /// Reports whether `key` is present, without decoding its value twice.
    pub fn mem(&self, key: &K) -> Result<bool> {
        self.guard()?.mem(key)
    }

    /// Appends a `(key, value)` pair, superseding any prior value for `key`.
    pub fn replace(&self, key: K, value: V) -> Result<()> {
        self.guard()?.replace(key, value)
    }

    /// Discards the log and index, resetting to an empty store.
    pub fn clear(&self) -> Result<()> {
        self.guard()?.clear()
    }

    /// Visits every live entry; `f` returning `false` stops iteration early.
    pub fn iter(&self, mut f: impl FnMut(&K, &V) -> bool) -> Result<()> {
        self.guard()?.iter_visit(&mut f)
    }

    /// Forces a merge of the current log into the index, even under budget.
    pub fn force_merge(&self) -> Result<()> {
        self.guard()?.force_merge()
    }

    /// Fsyncs the log file.
    pub fn flush(&self) -> Result<()> {
        self.guard()?.flush()
    }

    /// Current generation counter.
    pub fn generation(&self) -> Result<u64> {
        Ok(self.guard()?.generation())
    }

    /// Releases this handle's reference. Idempotent: a second call is a
    /// no-op. The underlying engine is torn down only once every handle
    /// sharing it has closed.
    pub fn close(&self) {
        if self.closed.replace(true) {
            return;
        }
        let prev = self.shared.refcount.fetch_sub(1, Ordering::AcqRel);
        if prev == 1 {
            if let Ok(mut cache) = GLOBAL_CACHE.lock() {
                cache.remove(&self.cache_key);
            }
            if let Ok(mut core) = self.shared.core.lock() {
                let _ = core.teardown();
            }
        }
    }
}

impl<K, V, IO> Drop for Handle<K, V, IO>
where
    K: Key + Send + 'static,
    V: Value + Send + 'static,
    IO: IoBackend + Send + 'static,
{
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::FileIo;
    use crate::key::FixedBytes;

    #[test]
    fn two_opens_share_one_instance_and_refcount_closes_on_last_drop() {
        let dir = tempfile::tempdir().unwrap();
        let opts = OpenOptions::new(1024);

        let a = Handle::<FixedBytes<8>, FixedBytes<8>, FileIo>::open(dir.path(), opts.clone())
            .unwrap();
        a.replace(FixedBytes([1; 8]), FixedBytes([2; 8])).unwrap();

        let b = Handle::<FixedBytes<8>, FixedBytes<8>, FileIo>::open(dir.path(), opts).unwrap();
        assert_eq!(b.find(&FixedBytes([1; 8])).unwrap(), FixedBytes([2; 8]));

        drop(a);
        assert_eq!(b.find(&FixedBytes([1; 8])).unwrap(), FixedBytes([2; 8]));
        drop(b);
    }
}
