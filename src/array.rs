//! Presents a sorted index file as a random-access array of entries.

use std::marker::PhantomData;

use crate::error::Result;
use crate::io::IoBackend;
use crate::key::{Key, Value};

/// A decoded `(key, key_hash, value)` triple read from the sorted index.
#[derive(Debug, Clone)]
pub struct Entry<K, V> {
    pub key: K,
    pub hash: u64,
    pub value: V,
}

/// Random-access view over a sorted index file's entries.
///
/// `get(i)` reads `K::ENCODED_LEN + V::ENCODED_LEN` bytes at `i * entry_size`
/// and decodes them. Out-of-bounds indices are a programmer error: callers
/// are expected to derive bounds from the fan-out table.
pub struct FileArray<'a, K, V, IO> {
    io: &'a IO,
    entry_size: usize,
    _marker: PhantomData<(K, V)>,
}

impl<'a, K: Key, V: Value, IO: IoBackend> FileArray<'a, K, V, IO> {
    pub fn new(io: &'a IO) -> Self {
        Self {
            io,
            entry_size: K::ENCODED_LEN + V::ENCODED_LEN,
            _marker: PhantomData,
        }
    }

    /// Number of entries in the backing file.
    pub fn len(&self) -> u64 {
        self.io.payload_len() / self.entry_size as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entry_size(&self) -> usize {
        self.entry_size
    }

    /// Reads and decodes the entry at array index `i`.
    pub fn get(&self, i: u64) -> Result<Entry<K, V>> {
        let offset = i * self.entry_size as u64;
        let bytes = self.io.read_at(offset, self.entry_size)?;
        let key = K::decode(&bytes[..K::ENCODED_LEN])?;
        let value = V::decode(&bytes[K::ENCODED_LEN..])?;
        let hash = key.hash();
        Ok(Entry { key, hash, value })
    }
}
