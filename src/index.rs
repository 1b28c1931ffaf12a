/// The public `Index` type: owns the bucket array and ties together
/// the size policy, probe engine, and persistence into the
/// lookup, mutation, and aggregation operations.
use std::path::Path;

use log::debug;

use crate::config::IndexConfig;
use crate::error::{IndexError, Result};
use crate::layout;
use crate::probe;
use crate::sizing;

/// Six accumulators produced by [`Index::summarize`], over a value
/// layout of three little-endian int32 fields `[chunks, size, csize]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub total_unique_chunks: u64,
    pub total_chunks: i64,
    pub total_unique_size: i64,
    pub total_unique_csize: i64,
    pub total_size: i64,
    pub total_csize: i64,
}

/// A fixed-width, open-addressing hash index mapping `key_size`-byte
/// keys to `value_size`-byte values.
///
/// Single-threaded, linear probing with tombstones, opportunistic
/// in-place compaction on lookup, and a bit-exact on-disk format.
pub struct Index {
    key_size: u8,
    value_size: u8,
    bucket_size: usize,
    num_buckets: u32,
    num_entries: u32,
    buckets: Vec<u8>,
    lower_limit: u32,
    upper_limit: u32,
}

impl Index {
    /// Create a new, empty index with `fit_size(capacity)` buckets.
    pub fn init(capacity: u32, key_size: u8, value_size: u8) -> Result<Self> {
        IndexConfig::new(capacity, key_size, value_size).validate()?;

        let num_buckets = sizing::fit_size(capacity);
        let bucket_size = key_size as usize + value_size as usize;
        let mut buckets = vec![0u8; num_buckets as usize * bucket_size];

        for i in 0..num_buckets as usize {
            let value_start = i * bucket_size + key_size as usize;
            layout::write_sentinel(
                &mut buckets[value_start..value_start + value_size as usize],
                layout::EMPTY,
            );
        }

        Ok(Index {
            key_size,
            value_size,
            bucket_size,
            num_buckets,
            num_entries: 0,
            buckets,
            lower_limit: sizing::lower_limit(num_buckets),
            upper_limit: sizing::upper_limit(num_buckets),
        })
    }

    /// Load an index previously written by [`Index::write`].
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = crate::persistence::read(path)?;

        if let Err(IndexError::InvalidArgument { reason }) =
            IndexConfig::new(0, raw.key_size, raw.value_size).validate()
        {
            return Err(IndexError::Corrupt {
                path: path.to_path_buf(),
                reason,
            });
        }

        let num_buckets = raw.num_buckets;
        Ok(Index {
            key_size: raw.key_size,
            value_size: raw.value_size,
            bucket_size: raw.key_size as usize + raw.value_size as usize,
            num_buckets,
            num_entries: raw.num_entries,
            buckets: raw.buckets,
            lower_limit: sizing::lower_limit(num_buckets),
            upper_limit: sizing::upper_limit(num_buckets),
        })
    }

    /// Persist the full table verbatim: packed header, then the raw
    /// bucket blob. Crash-atomicity is the caller's responsibility.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        crate::persistence::write(
            path.as_ref(),
            self.num_entries,
            self.num_buckets,
            self.key_size,
            self.value_size,
            &self.buckets,
        )
    }

    pub fn key_size(&self) -> u8 {
        self.key_size
    }

    pub fn value_size(&self) -> u8 {
        self.value_size
    }

    pub fn num_buckets(&self) -> u32 {
        self.num_buckets
    }

    /// Number of occupied buckets.
    pub fn size(&self) -> u32 {
        self.num_entries
    }

    fn key_at(&self, idx: usize) -> &[u8] {
        let start = idx * self.bucket_size;
        &self.buckets[start..start + self.key_size as usize]
    }

    fn value_at(&self, idx: usize) -> &[u8] {
        let start = idx * self.bucket_size + self.key_size as usize;
        &self.buckets[start..start + self.value_size as usize]
    }

    fn value_at_mut(&mut self, idx: usize) -> &mut [u8] {
        let start = idx * self.bucket_size + self.key_size as usize;
        &mut self.buckets[start..start + self.value_size as usize]
    }

    /// Look up `key`, returning its value bytes if present.
    ///
    /// This may opportunistically compact the probe chain (moving the
    /// entry to an earlier tombstone it passed through), which is why
    /// this takes `&mut self` rather than `&self`.
    pub fn get(&mut self, key: &[u8]) -> Option<&[u8]> {
        debug_assert_eq!(key.len(), self.key_size as usize);
        let idx = probe::lookup(
            &mut self.buckets,
            self.num_buckets,
            self.bucket_size,
            self.key_size as usize,
            key,
        )?;
        Some(self.value_at(idx))
    }

    /// Insert or overwrite `key` with `value`.
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        debug_assert_eq!(key.len(), self.key_size as usize);
        debug_assert_eq!(value.len(), self.value_size as usize);

        if let Some(idx) = probe::lookup(
            &mut self.buckets,
            self.num_buckets,
            self.bucket_size,
            self.key_size as usize,
            key,
        ) {
            self.value_at_mut(idx).copy_from_slice(value);
            return Ok(());
        }

        if self.num_entries > self.upper_limit {
            let target = sizing::grow_size(self.num_buckets);
            if target != self.num_buckets {
                self.resize(target)?;
            }
        }

        // The ladder tops out at `sizing::max_buckets()`, where
        // `grow_size` saturates and can no longer make room. Once the
        // table is completely full there is no Empty slot left for
        // `find_insert_slot` to find, so refuse the insert instead of
        // looping forever.
        if self.num_entries >= self.num_buckets {
            return Err(IndexError::CapacityExceeded);
        }

        let idx = probe::find_insert_slot(
            &self.buckets,
            self.num_buckets,
            self.bucket_size,
            self.key_size as usize,
            key,
        );
        let start = idx * self.bucket_size;
        self.buckets[start..start + self.key_size as usize].copy_from_slice(key);
        self.buckets[start + self.key_size as usize..start + self.bucket_size]
            .copy_from_slice(value);
        self.num_entries += 1;
        Ok(())
    }

    /// Remove `key`. A no-op (not an error) if absent.
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        debug_assert_eq!(key.len(), self.key_size as usize);

        let idx = match probe::lookup(
            &mut self.buckets,
            self.num_buckets,
            self.bucket_size,
            self.key_size as usize,
            key,
        ) {
            Some(idx) => idx,
            None => return Ok(()),
        };

        layout::write_sentinel(self.value_at_mut(idx), layout::DELETED);
        self.num_entries -= 1;

        if self.num_entries < self.lower_limit {
            self.resize(sizing::shrink_size(self.num_buckets))?;
        }
        Ok(())
    }

    /// Add-or-insert: if `key` is absent, inserts `delta` verbatim;
    /// otherwise adds the first 4 bytes of `delta` (as a little-endian
    /// i32 counter) into the existing value's first 4 bytes in place.
    /// Higher-order value bytes are left untouched.
    pub fn add(&mut self, key: &[u8], delta: &[u8]) -> Result<()> {
        debug_assert_eq!(delta.len(), self.value_size as usize);

        match probe::lookup(
            &mut self.buckets,
            self.num_buckets,
            self.bucket_size,
            self.key_size as usize,
            key,
        ) {
            Some(idx) => {
                let existing = i32::from_le_bytes(
                    self.value_at(idx)[0..4].try_into().unwrap(),
                );
                let addend = i32::from_le_bytes(delta[0..4].try_into().unwrap());
                let sum = existing.wrapping_add(addend);
                self.value_at_mut(idx)[0..4].copy_from_slice(&sum.to_le_bytes());
                Ok(())
            }
            None => self.set(key, delta),
        }
    }

    /// For every occupied key in `other`, `add` it into `self`.
    /// Entries in `self` with no counterpart in `other` are untouched.
    pub fn merge(&mut self, other: &Index) -> Result<()> {
        let mut cursor = other.next_key(None);
        while let Some(idx) = cursor {
            let key = other.key_at(idx).to_vec();
            let value = other.value_at(idx).to_vec();
            self.add(&key, &value)?;
            cursor = other.next_key(Some(idx));
        }
        Ok(())
    }

    /// Returns the bucket index of the next occupied slot strictly
    /// after `prev` (or the first occupied slot if `prev` is `None`),
    /// or `None` once iteration is exhausted.
    ///
    /// Order is bucket-index order and is **not** stable across
    /// mutation of this index.
    pub fn next_key(&self, prev: Option<usize>) -> Option<usize> {
        let mut idx = match prev {
            Some(p) => p + 1,
            None => 0,
        };
        while idx < self.num_buckets as usize {
            if layout::is_occupied(self.value_at(idx)) {
                return Some(idx);
            }
            idx += 1;
        }
        None
    }

    /// Fetch the key bytes at a cursor previously returned by `next_key`.
    pub fn key_for_cursor(&self, idx: usize) -> &[u8] {
        self.key_at(idx)
    }

    /// Fetch the value bytes at a cursor previously returned by `next_key`.
    pub fn value_for_cursor(&self, idx: usize) -> &[u8] {
        self.value_at(idx)
    }

    /// Accumulate the six domain summary statistics over a value
    /// layout of three little-endian int32 fields `[chunks, size, csize]`.
    pub fn summarize(&self) -> Summary {
        let mut summary = Summary::default();
        let mut cursor = self.next_key(None);
        while let Some(idx) = cursor {
            let value = self.value_at(idx);
            let chunks = i32::from_le_bytes(value[0..4].try_into().unwrap());
            let size = i32::from_le_bytes(value[4..8].try_into().unwrap());
            let csize = i32::from_le_bytes(value[8..12].try_into().unwrap());

            summary.total_unique_chunks += 1;
            summary.total_chunks += chunks as i64;
            summary.total_unique_size += size as i64;
            summary.total_unique_csize += csize as i64;
            summary.total_size += chunks as i64 * size as i64;
            summary.total_csize += chunks as i64 * csize as i64;

            cursor = self.next_key(Some(idx));
        }
        summary
    }

    /// Rebuild the table at `new_num_buckets`, re-inserting every
    /// occupied entry. Leaves `self` untouched on failure.
    fn resize(&mut self, new_num_buckets: u32) -> Result<()> {
        debug!(
            "hashindex: resizing {} -> {} buckets ({} entries)",
            self.num_buckets, new_num_buckets, self.num_entries
        );

        let mut fresh = Index::init(new_num_buckets, self.key_size, self.value_size)?;

        let mut cursor = self.next_key(None);
        while let Some(idx) = cursor {
            let key = self.key_at(idx).to_vec();
            let value = self.value_at(idx).to_vec();
            fresh.set(&key, &value)?;
            cursor = self.next_key(Some(idx));
        }

        self.buckets = fresh.buckets;
        self.num_buckets = fresh.num_buckets;
        self.num_entries = fresh.num_entries;
        self.lower_limit = fresh.lower_limit;
        self.upper_limit = fresh.upper_limit;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u32) -> [u8; 8] {
        let mut k = [0u8; 8];
        k[0..4].copy_from_slice(&n.to_le_bytes());
        k
    }

    #[test]
    fn rejects_invalid_sizes_at_init() {
        assert!(Index::init(0, 3, 4).is_err());
        assert!(Index::init(0, 8, 3).is_err());
    }

    #[test]
    fn get_returns_none_for_absent_key() {
        let mut index = Index::init(0, 8, 4).unwrap();
        assert!(index.get(&key(1)).is_none());
    }

    #[test]
    fn set_rejects_insert_into_a_completely_full_table() {
        // Builds a table by hand rather than via `Index::init` so the
        // ladder-exhaustion guard can be exercised without actually
        // growing onto the real ladder's top rung.
        let key_size = 8usize;
        let value_size = 4usize;
        let num_buckets = 4u32;
        let bucket_size = key_size + value_size;
        let mut buckets = vec![0u8; num_buckets as usize * bucket_size];
        for i in 0..num_buckets {
            let start = i as usize * bucket_size;
            buckets[start..start + key_size].copy_from_slice(&key(i));
            // value bytes stay zero, which is a valid non-sentinel (occupied) value
        }

        let mut index = Index {
            key_size: key_size as u8,
            value_size: value_size as u8,
            bucket_size,
            num_buckets,
            num_entries: num_buckets,
            buckets,
            lower_limit: 0,
            upper_limit: num_buckets,
        };

        let err = index.set(&key(99), &1i32.to_le_bytes()).unwrap_err();
        assert!(matches!(err, IndexError::CapacityExceeded));
    }

    #[test]
    fn set_overwrites_existing_value() {
        let mut index = Index::init(0, 8, 4).unwrap();
        index.set(&key(1), &1u32.to_le_bytes()).unwrap();
        index.set(&key(1), &2u32.to_le_bytes()).unwrap();
        assert_eq!(index.size(), 1);
        assert_eq!(index.get(&key(1)), Some(2u32.to_le_bytes().as_slice()));
    }

    #[test]
    fn add_inserts_when_absent_and_sums_when_present() {
        let mut index = Index::init(0, 8, 4).unwrap();
        index.add(&key(1), &5i32.to_le_bytes()).unwrap();
        assert_eq!(index.get(&key(1)), Some(5i32.to_le_bytes().as_slice()));

        index.add(&key(1), &3i32.to_le_bytes()).unwrap();
        assert_eq!(index.get(&key(1)), Some(8i32.to_le_bytes().as_slice()));
    }

    #[test]
    fn merge_is_associative_and_commutative_for_disjoint_keys() {
        let build = |entries: &[(u32, i32)]| {
            let mut idx = Index::init(0, 8, 4).unwrap();
            for (k, v) in entries {
                idx.add(&key(*k), &v.to_le_bytes()).unwrap();
            }
            idx
        };

        let a = build(&[(1, 10), (2, 20)]);
        let b = build(&[(3, 30)]);
        let c = build(&[(4, 40)]);

        let mut left_assoc = Index::init(0, 8, 4).unwrap();
        left_assoc.merge(&a).unwrap();
        left_assoc.merge(&b).unwrap();
        left_assoc.merge(&c).unwrap();

        let mut right_assoc = Index::init(0, 8, 4).unwrap();
        right_assoc.merge(&c).unwrap();
        right_assoc.merge(&b).unwrap();
        right_assoc.merge(&a).unwrap();

        for k in [1u32, 2, 3, 4] {
            assert_eq!(left_assoc.get(&key(k)), right_assoc.get(&key(k)));
        }
    }

    #[test]
    fn compaction_never_increases_probe_distance() {
        let mut index = Index::init(0, 8, 4).unwrap();
        // Force collisions: num_buckets is 1031 at this size, so every
        // multiple of 1031 hashes to bucket 0 and piles into one chain.
        let keys: Vec<[u8; 8]> = (0..20u32).map(|i| key(i * 1031)).collect();
        for k in &keys {
            index.set(k, &1i32.to_le_bytes()).unwrap();
        }

        // Delete every other key to create tombstones, then re-probe
        // the survivors; their distance from the home bucket should
        // never grow across repeated `get` calls.
        for (i, k) in keys.iter().enumerate() {
            if i % 2 == 0 {
                index.delete(k).unwrap();
            }
        }

        for k in keys.iter().enumerate().filter(|(i, _)| i % 2 == 1).map(|(_, k)| k) {
            let before = probe_distance(&index, k);
            index.get(k).unwrap();
            let after = probe_distance(&index, k);
            assert!(after <= before);
        }
    }

    fn probe_distance(index: &Index, k: &[u8]) -> usize {
        let start = crate::probe::hash_index(k, index.num_buckets);
        for offset in 0..index.num_buckets as usize {
            let idx = (start + offset) % index.num_buckets as usize;
            if index.key_at(idx) == k && layout::is_occupied(index.value_at(idx)) {
                return offset;
            }
        }
        panic!("key not found while measuring probe distance");
    }

    #[test]
    fn resize_grows_and_shrinks_across_the_ladder() {
        let mut index = Index::init(0, 8, 4).unwrap();
        assert_eq!(index.num_buckets(), 1031);

        let keys: Vec<[u8; 8]> = (0..900).map(key).collect();
        for k in &keys {
            index.set(k, &1i32.to_le_bytes()).unwrap();
        }
        assert_eq!(index.num_buckets(), 2053);

        for k in keys.iter().take(850) {
            index.delete(k).unwrap();
        }
        assert_eq!(index.num_buckets(), 1031);
    }
}
