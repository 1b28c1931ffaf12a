/// The probe engine: lookup, insert-slot selection, and the in-place
/// compaction that lookup performs opportunistically along the way.
///
/// Operates directly on a flat bucket byte array; every function here
/// is free of any notion of `num_entries` or load factor bookkeeping.
/// That lives one layer up in [`crate::Index`].
use crate::layout;

/// `hash(key) mod num_buckets`: the first 4 key bytes, little-endian,
/// modulo the bucket count. No further mixing; keys are assumed to
/// already be well distributed.
#[inline]
pub fn hash_index(key: &[u8], num_buckets: u32) -> usize {
    let h = u32::from_le_bytes(key[0..4].try_into().unwrap());
    (h % num_buckets) as usize
}

#[inline]
fn bucket_range(idx: usize, bucket_size: usize) -> std::ops::Range<usize> {
    let start = idx * bucket_size;
    start..start + bucket_size
}

/// Look up `key`, opportunistically compacting the probe chain.
///
/// If the key is found after passing through at least one tombstone,
/// the found bucket is moved to the first tombstone seen and the
/// vacated slot is marked Deleted; the returned index is then the
/// tombstone's former position.
pub fn lookup(
    buckets: &mut [u8],
    num_buckets: u32,
    bucket_size: usize,
    key_size: usize,
    key: &[u8],
) -> Option<usize> {
    let start = hash_index(key, num_buckets);
    let mut idx = start;
    let mut first_tombstone: Option<usize> = None;

    loop {
        let range = bucket_range(idx, bucket_size);
        let value = &buckets[range.clone()][key_size..];

        if layout::is_empty(value) {
            return None;
        }
        if layout::is_deleted(value) {
            if first_tombstone.is_none() {
                first_tombstone = Some(idx);
            }
        } else if &buckets[range.clone()][..key_size] == key {
            if let Some(tomb) = first_tombstone {
                let found = buckets[range.clone()].to_vec();
                buckets[tomb * bucket_size..tomb * bucket_size + bucket_size]
                    .copy_from_slice(&found);
                layout::write_sentinel(
                    &mut buckets[idx * bucket_size + key_size..idx * bucket_size + bucket_size],
                    layout::DELETED,
                );
                return Some(tomb);
            }
            return Some(idx);
        }

        idx = (idx + 1) % num_buckets as usize;
        if idx == start {
            return None;
        }
    }
}

/// Find the first Empty-or-Deleted slot along `key`'s probe chain,
/// for use by a fresh insert once `lookup` has confirmed the key is
/// absent. Stopping at tombstones (unlike lookup) is what makes them
/// reclaimable.
pub fn find_insert_slot(
    buckets: &[u8],
    num_buckets: u32,
    bucket_size: usize,
    key_size: usize,
    key: &[u8],
) -> usize {
    let mut idx = hash_index(key, num_buckets);
    loop {
        let range = bucket_range(idx, bucket_size);
        let value = &buckets[range][key_size..];
        if layout::is_empty(value) || layout::is_deleted(value) {
            return idx;
        }
        idx = (idx + 1) % num_buckets as usize;
    }
}
