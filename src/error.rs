use std::io;
use thiserror::Error;

/// Error type for `fidx` operations.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error from the storage backend.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Operation attempted on a handle whose engine has been closed.
    #[error("handle is closed")]
    Closed,

    /// Mutating operation attempted on a read-only handle.
    #[error("handle is read-only")]
    ReadOnly,

    /// Lookup for an absent key.
    #[error("key not found")]
    NotFound,

    /// Encoded key length did not match `Key::ENCODED_LEN`.
    #[error("invalid key size: expected {expected}, got {actual}")]
    InvalidKeySize {
        /// Expected encoded length.
        expected: usize,
        /// Actual encoded length produced.
        actual: usize,
    },

    /// Encoded value length did not match `Value::ENCODED_LEN`.
    #[error("invalid value size: expected {expected}, got {actual}")]
    InvalidValueSize {
        /// Expected encoded length.
        expected: usize,
        /// Actual encoded length produced.
        actual: usize,
    },

    /// Advisory lock on `root` is already held by another writer.
    #[error("root is locked by another writer")]
    Locked,

    /// An internal contract was violated (e.g. the log shrank under a
    /// read-only observer). Treated as fatal.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Malformed on-disk data (bad header, truncated entry, etc.).
    #[error("corrupt on-disk data: {0}")]
    Corrupt(String),
}

/// Result type alias for `fidx` operations.
pub type Result<T> = std::result::Result<T, Error>;
