//! Interpolation search over a fan-out-assisted, sorted file-backed array.

use crate::array::FileArray;
use crate::error::{Error, Result};
use crate::fanout::Fanout;
use crate::io::IoBackend;
use crate::key::{Key, Value};

/// Deterministic tie-breaking round: `⌈x − 0.5⌉ + 0.5`, truncated.
/// Biases toward the lower half on exact `.5` ties, avoiding
/// banker's-rounding inconsistencies.
fn round_bias_low(x: f64) -> i64 {
    (((x - 0.5).ceil()) + 0.5).trunc() as i64
}

/// Searches `array` (assisted by `fanout`) for `key`.
///
/// Returns the value on success, `Error::NotFound` if no entry with a
/// matching key exists. Correctness does not depend on the fan-out or the
/// interpolation heuristic being accurate — only on the sorted order of the
/// underlying array — so a pathological fan-out degrades performance, not
/// correctness.
pub fn interpolation_search<K, V, IO>(
    array: &FileArray<'_, K, V, IO>,
    fanout: &Fanout,
    key: &K,
) -> Result<V>
where
    K: Key,
    V: Value,
    IO: IoBackend,
{
    if array.is_empty() {
        return Err(Error::NotFound);
    }

    let h = key.hash();
    let entry_size = array.entry_size() as u32;
    let (lo_b, hi_b) = fanout.search(h);
    let mut lo = (lo_b / entry_size) as u64;
    let mut hi = (hi_b / entry_size) as u64;
    let last_index = array.len() - 1;
    hi = hi.min(last_index);

    while lo <= hi {
        let entry_lo = array.get(lo)?;
        let entry_hi = array.get(hi)?;

        if h < entry_lo.hash || h > entry_hi.hash {
            return Err(Error::NotFound);
        }

        if entry_lo.hash == entry_hi.hash {
            return linear_scan(array, lo, hi, key);
        }

        let p = (h - entry_lo.hash) as f64 / (entry_hi.hash - entry_lo.hash) as f64;
        let pivot_f = lo as f64 + p * (hi - lo) as f64;
        let mid = round_bias_low(pivot_f).clamp(lo as i64, hi as i64) as u64;

        let entry_mid = array.get(mid)?;
        match entry_mid.hash.cmp(&h) {
            std::cmp::Ordering::Less => {
                if mid == hi {
                    return Err(Error::NotFound);
                }
                lo = mid + 1;
            }
            std::cmp::Ordering::Greater => {
                if mid == lo {
                    return Err(Error::NotFound);
                }
                hi = mid - 1;
            }
            std::cmp::Ordering::Equal => {
                return scan_equal_hash_run(array, mid, lo, hi, key);
            }
        }
    }

    Err(Error::NotFound)
}

fn linear_scan<K, V, IO>(
    array: &FileArray<'_, K, V, IO>,
    lo: u64,
    hi: u64,
    key: &K,
) -> Result<V>
where
    K: Key,
    V: Value,
    IO: IoBackend,
{
    for i in lo..=hi {
        let entry = array.get(i)?;
        if &entry.key == key {
            return Ok(entry.value);
        }
    }
    Err(Error::NotFound)
}

/// Given that `array.get(mid).hash == key.hash()`, scans outward over the
/// contiguous run of entries sharing that hash, looking for key equality.
fn scan_equal_hash_run<K, V, IO>(
    array: &FileArray<'_, K, V, IO>,
    mid: u64,
    lo: u64,
    hi: u64,
    key: &K,
) -> Result<V>
where
    K: Key,
    V: Value,
    IO: IoBackend,
{
    let target_hash = key.hash();

    let mid_entry = array.get(mid)?;
    if &mid_entry.key == key {
        return Ok(mid_entry.value);
    }

    let mut i = mid;
    while i > lo {
        i -= 1;
        let entry = array.get(i)?;
        if entry.hash != target_hash {
            break;
        }
        if &entry.key == key {
            return Ok(entry.value);
        }
    }

    let mut j = mid;
    while j < hi {
        j += 1;
        let entry = array.get(j)?;
        if entry.hash != target_hash {
            break;
        }
        if &entry.key == key {
            return Ok(entry.value);
        }
    }

    Err(Error::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_bias_low_matches_spec_examples() {
        assert_eq!(round_bias_low(2.5), 2);
        assert_eq!(round_bias_low(2.4), 2);
        assert_eq!(round_bias_low(2.6), 3);
        assert_eq!(round_bias_low(0.5), 0);
        assert_eq!(round_bias_low(-0.5), 0);
    }
}
