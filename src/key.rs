//! Fixed-size, hashable key and value types.
//!
//! The engine is generic over a key type and a value type supplied by the
//! caller. Both must encode to a fixed number of bytes known at compile
//! time; the key additionally supplies its own hash function, which drives
//! fan-out partitioning and interpolation search.
//!
//! `encode` returns an owned `Vec<u8>` rather than writing into a
//! caller-sized buffer so that a caller's buggy `ENCODED_LEN` constant
//! surfaces as `Error::InvalidKeySize`/`Error::InvalidValueSize` instead of
//! panicking.

use crate::error::{Error, Result};

/// A fixed-size, hashable key.
///
/// `hash` is recomputed from the decoded key on every access rather than
/// stored on disk — entries only ever carry `encode(key) ++ encode(value)`.
pub trait Key: Clone + Eq + std::hash::Hash + std::fmt::Debug {
    /// Encoded length in bytes (`K_size`).
    const ENCODED_LEN: usize;

    /// Hash used for fan-out partitioning and interpolation search.
    /// Domain is `[0, 2^64)`.
    fn hash(&self) -> u64;

    /// Encodes to exactly `ENCODED_LEN` bytes.
    fn encode(&self) -> Vec<u8>;

    /// Inverse of `encode`. `bytes.len() == ENCODED_LEN` is guaranteed by callers.
    fn decode(bytes: &[u8]) -> Result<Self>
    where
        Self: Sized;
}

/// A fixed-size value.
pub trait Value: Clone + std::fmt::Debug {
    /// Encoded length in bytes (`V_size`).
    const ENCODED_LEN: usize;

    /// Encodes to exactly `ENCODED_LEN` bytes.
    fn encode(&self) -> Vec<u8>;

    /// Inverse of `encode`. `bytes.len() == ENCODED_LEN` is guaranteed by callers.
    fn decode(bytes: &[u8]) -> Result<Self>
    where
        Self: Sized;
}

/// A plain fixed-size byte array, usable as both a `Key` and a `Value`.
///
/// Hashing uses `xxh64` (the non-cryptographic hasher already present in
/// the log-structured stores this crate draws from), seeded with 0.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedBytes<const N: usize>(pub [u8; N]);

impl<const N: usize> FixedBytes<N> {
    /// Returns `N` zero bytes.
    pub fn zero() -> Self {
        Self([0u8; N])
    }
}

impl<const N: usize> std::fmt::Debug for FixedBytes<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FixedBytes<{N}>(")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

impl<const N: usize> Key for FixedBytes<N> {
    const ENCODED_LEN: usize = N;

    fn hash(&self) -> u64 {
        xxhash_rust::xxh64::xxh64(&self.0, 0)
    }

    fn encode(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut arr = [0u8; N];
        if bytes.len() != N {
            return Err(Error::Corrupt(format!(
                "expected {N} bytes, got {}",
                bytes.len()
            )));
        }
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }
}

impl<const N: usize> Value for FixedBytes<N> {
    const ENCODED_LEN: usize = N;

    fn encode(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        <Self as Key>::decode(bytes)
    }
}
