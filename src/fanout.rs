//! Coarse partitioning of hash-prefix space into byte-offset buckets.
//!
//! The fan-out table is the thing that turns an O(log N) interpolation
//! search into something closer to O(log log N): instead of starting the
//! search over the whole sorted index, it narrows the starting bracket to
//! a handful of entries up front.

/// Target number of entries per bucket. Kept small and constant so lookups
/// inside a bucket (interpolation search's inner loop) stay cheap.
const TARGET_PER_BUCKET: u64 = 4;

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    low: Option<u32>,
    high: Option<u32>,
}

/// Hash-prefix → byte-interval lookup table over a sorted index file.
#[derive(Debug, Clone)]
pub struct Fanout {
    bucket_count: usize,
    buckets: Vec<Bucket>,
}

impl Fanout {
    /// Builds an empty fan-out sized from the expected number of entries.
    /// `entry_size` is unused in the sizing formula today but kept as a
    /// parameter because bucket granularity is naturally a function of
    /// both entry count and entry size for very large indexes.
    pub fn build(_entry_size: usize, expected_entries: u64) -> Self {
        let bucket_count = ((expected_entries / TARGET_PER_BUCKET).max(1)) as usize;
        Self {
            bucket_count,
            buckets: vec![Bucket::default(); bucket_count],
        }
    }

    fn bucket_index(&self, hash: u64) -> usize {
        let idx = ((hash as u128 * self.bucket_count as u128) >> 64) as usize;
        idx.min(self.bucket_count - 1)
    }

    /// Records that an entry with `hash` begins at `byte_offset`. Must be
    /// called for every emitted entry in ascending hash order.
    pub fn update(&mut self, hash: u64, byte_offset: u32) {
        let idx = self.bucket_index(hash);
        let bucket = &mut self.buckets[idx];
        if bucket.low.is_none() {
            bucket.low = Some(byte_offset);
        }
        bucket.high = Some(byte_offset);
    }

    /// Fills any empty buckets so `search` always returns a valid,
    /// monotone-in-`h` enclosing interval.
    pub fn finalize(&mut self) {
        let mut prev_high = 0u32;
        for bucket in &mut self.buckets {
            match bucket.high {
                Some(high) => prev_high = high,
                None => {
                    bucket.low = Some(prev_high);
                    bucket.high = Some(prev_high);
                }
            }
        }
    }

    /// Returns the half-open-in-hash-space, closed-in-byte-space interval
    /// `[low_byte, high_byte]` that encloses every entry with hash `h`.
    /// Both bounds are multiples of the entry size.
    pub fn search(&self, hash: u64) -> (u32, u32) {
        let idx = self.bucket_index(hash);
        let bucket = &self.buckets[idx];
        (bucket.low.unwrap_or(0), bucket.high.unwrap_or(0))
    }

    /// Serializes to a compact, size-prefixed byte buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.exported_size());
        out.extend_from_slice(&(self.bucket_count as u32).to_le_bytes());
        for bucket in &self.buckets {
            out.extend_from_slice(&bucket.low.unwrap_or(0).to_le_bytes());
            out.extend_from_slice(&bucket.high.unwrap_or(0).to_le_bytes());
        }
        out
    }

    /// Deserializes from bytes produced by `to_bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 4 {
            return None;
        }
        let bucket_count = u32::from_le_bytes(bytes[0..4].try_into().ok()?) as usize;
        let expected_len = 4 + bucket_count * 8;
        if bytes.len() != expected_len {
            return None;
        }
        let mut buckets = Vec::with_capacity(bucket_count);
        let mut offset = 4;
        for _ in 0..bucket_count {
            let low = u32::from_le_bytes(bytes[offset..offset + 4].try_into().ok()?);
            let high = u32::from_le_bytes(bytes[offset + 4..offset + 8].try_into().ok()?);
            buckets.push(Bucket {
                low: Some(low),
                high: Some(high),
            });
            offset += 8;
        }
        Some(Self {
            bucket_count,
            buckets,
        })
    }

    /// Byte size this fan-out will occupy once serialized. Known before any
    /// entry is written, since it depends only on `bucket_count`.
    pub fn exported_size(&self) -> usize {
        4 + self.bucket_count * 8
    }

    /// Byte size an empty fan-out built for `expected_entries` would occupy,
    /// without constructing it. Lets the merge reserve header room before
    /// the bucket count is finalized into an actual `Fanout`.
    pub fn exported_size_for(expected_entries: u64) -> usize {
        let bucket_count = (expected_entries / TARGET_PER_BUCKET).max(1) as usize;
        4 + bucket_count * 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buckets_get_filled_and_monotone() {
        let mut fan = Fanout::build(8, 100);
        fan.update(10, 0);
        fan.update(u64::MAX - 10, 400);
        fan.finalize();

        let (lo0, hi0) = fan.search(10);
        assert!(lo0 <= hi0);
        let (lo1, hi1) = fan.search(u64::MAX / 2);
        assert!(lo1 <= hi1);
        let (lo2, hi2) = fan.search(u64::MAX - 10);
        assert!(lo2 <= hi2);
        assert!(hi0 <= lo1 || lo1 == hi0);
        assert!(hi1 <= hi2);
    }

    #[test]
    fn roundtrip_serialization() {
        let mut fan = Fanout::build(8, 40);
        fan.update(0, 0);
        fan.update(1000, 80);
        fan.finalize();
        let bytes = fan.to_bytes();
        assert_eq!(bytes.len(), fan.exported_size());
        let restored = Fanout::from_bytes(&bytes).unwrap();
        assert_eq!(restored.search(0), fan.search(0));
        assert_eq!(restored.search(1000), fan.search(1000));
    }

    #[test]
    fn single_bucket_encloses_everything() {
        let mut fan = Fanout::build(8, 1);
        fan.update(5, 0);
        fan.finalize();
        let (lo, hi) = fan.search(5);
        assert_eq!((lo, hi), (0, 0));
    }
}
