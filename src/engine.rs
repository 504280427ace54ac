//! The engine: log + index pair, merge algorithm, and read-only sync.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use log::{debug, trace, warn};

use crate::array::FileArray;
use crate::cache::OpenOptions;
use crate::error::{Error, Result};
use crate::fanout::Fanout;
use crate::io::{self, IoBackend};
use crate::key::{Key, Value};
use crate::lock::FileLock;
use crate::search::interpolation_search;

fn entry_size<K: Key, V: Value>() -> usize {
    K::ENCODED_LEN + V::ENCODED_LEN
}

struct IndexState<IO> {
    io: IO,
    fanout: Fanout,
}

struct Config {
    log_size_bytes: u64,
    readonly: bool,
}

/// Owns the log + index pair for one `(root, mode)`. Shared across handles
/// via the instance cache; never constructed directly by callers.
pub struct EngineCore<K: Key, V: Value, IO: IoBackend> {
    root: PathBuf,
    config: Config,
    log: Option<IO>,
    mirror: HashMap<K, V>,
    index: Option<IndexState<IO>>,
    generation: u64,
    cached_log_offset: u64,
    _lock: Option<FileLock>,
}

impl<K: Key, V: Value, IO: IoBackend> EngineCore<K, V, IO> {
    pub(crate) fn open(root: &Path, opts: &OpenOptions) -> Result<Self> {
        let lock = if !opts.readonly {
            Some(FileLock::acquire(&io::lock_path(root))?)
        } else {
            None
        };

        let log_path = io::log_path(root);
        let data_path = io::data_path(root);

        if opts.fresh && !opts.readonly {
            let _ = std::fs::remove_file(&log_path);
            let _ = std::fs::remove_file(&data_path);
        }

        let mut mirror = HashMap::new();
        let mut generation = 0u64;
        let mut cached_log_offset = 0u64;

        let log = if opts.readonly && !IO::exists(&log_path) {
            None
        } else {
            let io_log = IO::open(&log_path, false, opts.readonly)?;
            generation = io_log.generation();
            cached_log_offset = io_log.payload_len();
            load_log_into_mirror::<K, V, IO>(&io_log, &mut mirror)?;
            Some(io_log)
        };

        let index = if IO::exists(&data_path) {
            let io_index = IO::open(&data_path, false, true)?;
            let fanout = Fanout::from_bytes(io_index.fanout_bytes())
                .ok_or_else(|| Error::Corrupt("malformed fan-out header".into()))?;
            Some(IndexState {
                io: io_index,
                fanout,
            })
        } else {
            None
        };

        debug!(
            "opened engine at {:?} (readonly={}, generation={})",
            root, opts.readonly, generation
        );

        Ok(Self {
            root: root.to_path_buf(),
            config: Config {
                log_size_bytes: opts.log_size * entry_size::<K, V>() as u64,
                readonly: opts.readonly,
            },
            log,
            mirror,
            index,
            generation,
            cached_log_offset,
            _lock: lock,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn find(&mut self, key: &K) -> Result<V> {
        if self.config.readonly {
            self.sync_log()?;
        }
        trace!("find {:?}", key);

        if self.log.is_none() {
            return Err(Error::NotFound);
        }
        if let Some(value) = self.mirror.get(key) {
            return Ok(value.clone());
        }
        if let Some(index) = &self.index {
            let array = FileArray::new(&index.io);
            return interpolation_search(&array, &index.fanout, key);
        }
        Err(Error::NotFound)
    }

    pub fn mem(&mut self, key: &K) -> Result<bool> {
        match self.find(key) {
            Ok(_) => Ok(true),
            Err(Error::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn replace(&mut self, key: K, value: V) -> Result<()> {
        if self.config.readonly {
            return Err(Error::ReadOnly);
        }

        let kb = key.encode();
        if kb.len() != K::ENCODED_LEN {
            return Err(Error::InvalidKeySize {
                expected: K::ENCODED_LEN,
                actual: kb.len(),
            });
        }
        let vb = value.encode();
        if vb.len() != V::ENCODED_LEN {
            return Err(Error::InvalidValueSize {
                expected: V::ENCODED_LEN,
                actual: vb.len(),
            });
        }

        let mut buf = Vec::with_capacity(kb.len() + vb.len());
        buf.extend_from_slice(&kb);
        buf.extend_from_slice(&vb);

        let log = self.log.as_mut().ok_or(Error::Closed)?;
        log.append(&buf)?;
        self.mirror.insert(key, value);

        let over_budget = self.log.as_ref().unwrap().payload_len() > self.config.log_size_bytes;
        if over_budget {
            debug!("log exceeded budget, triggering merge");
            self.merge()?;
        }
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        if self.config.readonly {
            return Err(Error::ReadOnly);
        }
        if let Some(log) = self.log.as_mut() {
            log.clear()?;
        }
        self.mirror.clear();
        if let Some(index) = self.index.take() {
            index.io.close()?;
        }
        let _ = std::fs::remove_file(io::data_path(&self.root));
        self.generation = 0;
        self.cached_log_offset = 0;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if self.config.readonly {
            return Err(Error::ReadOnly);
        }
        if let Some(log) = self.log.as_mut() {
            log.fsync()?;
        }
        Ok(())
    }

    pub fn iter_visit(&mut self, f: &mut dyn FnMut(&K, &V) -> bool) -> Result<()> {
        if self.config.readonly {
            self.sync_log()?;
        }
        for (k, v) in self.mirror.iter() {
            if !f(k, v) {
                return Ok(());
            }
        }
        if let Some(index) = &self.index {
            let array = FileArray::new(&index.io);
            for i in 0..array.len() {
                let entry = array.get(i)?;
                if !f(&entry.key, &entry.value) {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    pub fn force_merge(&mut self) -> Result<()> {
        if self.config.readonly {
            return Err(Error::ReadOnly);
        }
        let has_witness = !self.mirror.is_empty()
            || self
                .index
                .as_ref()
                .map(|idx| FileArray::<K, V, IO>::new(&idx.io).len() > 0)
                .unwrap_or(false);
        if !has_witness {
            return Ok(());
        }
        self.merge()
    }

    /// Folds the in-memory log snapshot into a fresh sorted index, atomically
    /// swapping it in and advancing the generation.
    fn merge(&mut self) -> Result<()> {
        let new_gen = self.generation + 1;

        let mut snapshot: Vec<(K, u64, V)> = self
            .mirror
            .iter()
            .map(|(k, v)| (k.clone(), k.hash(), v.clone()))
            .collect();
        snapshot.sort_by_key(|(_, h, _)| *h);

        let existing_count = self
            .index
            .as_ref()
            .map(|idx| FileArray::<K, V, IO>::new(&idx.io).len())
            .unwrap_or(0);
        let fan_size = (existing_count + snapshot.len() as u64).max(1);

        let merge_file_path = io::merge_path(&self.root);
        let reserved_len = Fanout::exported_size_for(fan_size);
        let mut merge_io = IO::create_reserved(&merge_file_path, new_gen, reserved_len)?;
        let mut fanout = Fanout::build(entry_size::<K, V>(), fan_size);

        let mut idx_pos = 0u64;
        let mut log_pos = 0usize;
        let log_len = snapshot.len();

        if let Some(index_state) = &self.index {
            let array = FileArray::<K, V, IO>::new(&index_state.io);
            let idx_len = existing_count;

            while idx_pos < idx_len {
                let index_entry = array.get(idx_pos)?;
                let h_i = index_entry.hash;

                while log_pos < log_len && snapshot[log_pos].1 < h_i {
                    let (k, h, v) = &snapshot[log_pos];
                    emit_entry(&mut merge_io, &mut fanout, k, v, *h)?;
                    log_pos += 1;
                }

                let run_start = log_pos;
                while log_pos < log_len && snapshot[log_pos].1 == h_i {
                    let (k, h, v) = &snapshot[log_pos];
                    emit_entry(&mut merge_io, &mut fanout, k, v, *h)?;
                    log_pos += 1;
                }
                let matched_keys: HashSet<&K> = snapshot[run_start..log_pos]
                    .iter()
                    .map(|(k, _, _)| k)
                    .collect();

                while idx_pos < idx_len {
                    let e = array.get(idx_pos)?;
                    if e.hash != h_i {
                        break;
                    }
                    if !matched_keys.contains(&e.key) {
                        emit_entry(&mut merge_io, &mut fanout, &e.key, &e.value, e.hash)?;
                    }
                    idx_pos += 1;
                }
            }
        }

        while log_pos < log_len {
            let (k, h, v) = &snapshot[log_pos];
            emit_entry(&mut merge_io, &mut fanout, k, v, *h)?;
            log_pos += 1;
        }

        fanout.finalize();
        merge_io.finalize_header(new_gen, &fanout.to_bytes())?;
        merge_io.fsync()?;

        let data_path = io::data_path(&self.root);
        IO::rename_over(&merge_file_path, &data_path)?;

        if let Some(old_index) = self.index.take() {
            old_index.io.close()?;
        }
        self.index = Some(IndexState {
            io: merge_io,
            fanout,
        });

        if let Some(log) = self.log.as_mut() {
            log.clear()?;
            log.set_generation(new_gen)?;
        }
        self.mirror.clear();
        self.generation = new_gen;
        self.cached_log_offset = 0;

        debug!("merged into generation {new_gen}");
        Ok(())
    }

    /// Brings a read-only engine's mirror and index up to date with the
    /// writer's latest generation. Called at the start of every read.
    fn sync_log(&mut self) -> Result<()> {
        if self.log.is_none() {
            let log_path = io::log_path(&self.root);
            if IO::exists(&log_path) {
                let io_log = IO::open(&log_path, false, true)?;
                load_log_into_mirror::<K, V, IO>(&io_log, &mut self.mirror)?;
                self.generation = io_log.generation();
                self.cached_log_offset = io_log.payload_len();
                self.log = Some(io_log);
            }
            return Ok(());
        }

        let log = self.log.as_mut().unwrap();
        let observed_gen = log.refresh_generation()?;
        let new_offset = log.refresh_payload_len()?;

        if observed_gen != self.generation {
            trace!("sync_log: generation {} -> {}", self.generation, observed_gen);
            self.mirror.clear();
            load_log_into_mirror::<K, V, IO>(self.log.as_ref().unwrap(), &mut self.mirror)?;

            if let Some(old_index) = self.index.take() {
                old_index.io.close()?;
            }
            if observed_gen == 0 {
                self.index = None;
            } else {
                let data_path = io::data_path(&self.root);
                let io_index = IO::open(&data_path, false, true)?;
                let fanout = Fanout::from_bytes(io_index.fanout_bytes())
                    .ok_or_else(|| Error::Corrupt("malformed fan-out header".into()))?;
                self.index = Some(IndexState {
                    io: io_index,
                    fanout,
                });
            }
            self.generation = observed_gen;
            self.cached_log_offset = new_offset;
        } else if new_offset > self.cached_log_offset {
            let suffix_len = (new_offset - self.cached_log_offset) as usize;
            let suffix = self
                .log
                .as_ref()
                .unwrap()
                .read_at(self.cached_log_offset, suffix_len)?;
            decode_entries_into_mirror::<K, V>(&suffix, entry_size::<K, V>(), &mut self.mirror)?;
            self.cached_log_offset = new_offset;
        } else if new_offset < self.cached_log_offset {
            warn!("log file shrank under a read-only observer");
            return Err(Error::InvariantViolation(
                "log file shrank under a read-only observer".into(),
            ));
        }

        Ok(())
    }

    /// Releases all resources: flushes (if writable), closes both files,
    /// drops the advisory lock. Called once, when the last handle closes.
    pub(crate) fn teardown(&mut self) -> Result<()> {
        if !self.config.readonly {
            if let Some(log) = self.log.as_mut() {
                let _ = log.fsync();
            }
        }
        if let Some(log) = self.log.take() {
            log.close()?;
        }
        if let Some(index) = self.index.take() {
            index.io.close()?;
        }
        self._lock = None;
        Ok(())
    }
}

fn emit_entry<K: Key, V: Value, IO: IoBackend>(
    io: &mut IO,
    fanout: &mut Fanout,
    key: &K,
    value: &V,
    hash: u64,
) -> Result<()> {
    let offset = io.payload_len() as u32;
    fanout.update(hash, offset);
    let kb = key.encode();
    let vb = value.encode();
    let mut buf = Vec::with_capacity(kb.len() + vb.len());
    buf.extend_from_slice(&kb);
    buf.extend_from_slice(&vb);
    io.append(&buf)?;
    Ok(())
}

fn load_log_into_mirror<K: Key, V: Value, IO: IoBackend>(
    log: &IO,
    mirror: &mut HashMap<K, V>,
) -> Result<()> {
    let len = log.payload_len();
    if len == 0 {
        return Ok(());
    }
    let bytes = log.read_at(0, len as usize)?;
    decode_entries_into_mirror::<K, V>(&bytes, entry_size::<K, V>(), mirror)
}

fn decode_entries_into_mirror<K: Key, V: Value>(
    bytes: &[u8],
    entry_size: usize,
    mirror: &mut HashMap<K, V>,
) -> Result<()> {
    let mut offset = 0;
    while offset + entry_size <= bytes.len() {
        let chunk = &bytes[offset..offset + entry_size];
        let key = K::decode(&chunk[..K::ENCODED_LEN])?;
        let value = V::decode(&chunk[K::ENCODED_LEN..])?;
        mirror.insert(key, value);
        offset += entry_size;
    }
    Ok(())
}
