#![deny(missing_docs)]

//! An embedded, persistent, append-only key/value index for fixed-size,
//! hashable keys and fixed-size values.
//!
//! Writes land in an unsorted append-only log, mirrored in memory for O(1)
//! reads of recent data. Once the log grows past budget it is folded into a
//! sorted, immutable index file addressed by fan-out-assisted interpolation
//! search. Read-only observers stay current with a concurrent writer by
//! polling a generation counter rather than re-scanning the whole store.
//!
//! ```no_run
//! use fidx::{Handle, OpenOptions, FixedBytes};
//!
//! # fn main() -> fidx::Result<()> {
//! let handle = Handle::<FixedBytes<32>, FixedBytes<32>>::open("/tmp/my-index", OpenOptions::new(1024))?;
//! handle.replace(FixedBytes::zero(), FixedBytes::zero())?;
//! assert!(handle.mem(&FixedBytes::zero())?);
//! # Ok(())
//! # }
//! ```

mod array;
mod cache;
mod engine;
mod error;
mod fanout;
mod io;
mod key;
mod lock;
mod search;

pub use cache::{Handle, OpenOptions};
pub use error::{Error, Result};
pub use io::{FileIo, IoBackend};
pub use key::{FixedBytes, Key, Value};
