// SPDX-License-Identifier: MIT
//! The bucketed in-memory index (`spec.md` §4.3).

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::bloom::BloomFilter;
use crate::hash::{FuzzyHash, Record};
use crate::similarity::is_match;

/// Fixed bucket count (`spec.md` §3).
pub const NUM_BUCKETS: usize = 1024;

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_secs()
}

/// One insertion-ordered bucket of records, most-recent-first.
pub type Bucket = VecDeque<Record>;

/// The process-global fuzzy index: a fixed array of buckets guarded by a
/// Bloom filter, plus the modification counter that gates snapshotting.
pub struct Index {
    buckets: Vec<Bucket>,
    bloom: BloomFilter,
    mods: u64,
}

impl Index {
    pub fn new(bloom: BloomFilter) -> Self {
        Self {
            buckets: (0..NUM_BUCKETS).map(|_| VecDeque::new()).collect(),
            bloom,
            mods: 0,
        }
    }

    pub fn mods(&self) -> u64 {
        self.mods
    }

    pub fn reset_mods(&mut self) {
        self.mods = 0;
    }

    /// Force the modification counter above any rewrite threshold, used by
    /// the shutdown path to guarantee an unconditional snapshot.
    pub fn force_mods(&mut self, at_least: u64) {
        self.mods = self.mods.max(at_least);
    }

    fn bucket_for(&self, block_size: u32) -> usize {
        block_size as usize % NUM_BUCKETS
    }

    /// `spec.md` §4.3 `check`: no mutation, true on first similarity match.
    pub fn check(&self, h: &FuzzyHash) -> bool {
        if !self.bloom.maybe_contains(&h.pipe) {
            return false;
        }
        let bucket = &self.buckets[self.bucket_for(h.block_size)];
        bucket.iter().any(|rec| is_match(&rec.hash, h))
    }

    /// `spec.md` §4.3 `write`: bloom-guarded unconditional insert.
    pub fn write(&mut self, h: FuzzyHash) -> bool {
        if self.bloom.maybe_contains(&h.pipe) {
            return false;
        }
        let idx = self.bucket_for(h.block_size);
        let record = Record::new(h, now_secs());
        self.buckets[idx].push_front(record);
        self.bloom.add(&h.pipe);
        self.mods += 1;
        debug!(block_size = h.block_size, bucket = idx, "write inserted record");
        true
    }

    /// `spec.md` §4.3 `delete`: remove every similarity match in the target
    /// bucket, de-registering each from the Bloom filter.
    pub fn delete(&mut self, h: &FuzzyHash) -> bool {
        if !self.bloom.maybe_contains(&h.pipe) {
            return false;
        }
        let idx = self.bucket_for(h.block_size);
        let bucket = &mut self.buckets[idx];

        let before = bucket.len();
        let bloom = &mut self.bloom;
        bucket.retain(|rec| {
            let matched = is_match(&rec.hash, h);
            if matched {
                bloom.del(&rec.hash.pipe);
            }
            !matched
        });
        let removed = before - bucket.len();

        if removed > 0 {
            self.mods += 1;
            debug!(removed, bucket = idx, "delete removed records");
            true
        } else {
            false
        }
    }

    /// Direct bucket access for snapshot I/O.
    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub fn buckets_mut(&mut self) -> &mut [Bucket] {
        &mut self.buckets
    }

    pub fn bloom_mut(&mut self) -> &mut BloomFilter {
        &mut self.bloom
    }

    /// Insert a record loaded from the snapshot file at startup: head of the
    /// target bucket, registered with the Bloom filter, no `mods` bump.
    pub fn load_record(&mut self, record: Record) {
        let idx = record.bucket_index(NUM_BUCKETS);
        self.bloom.add(&record.hash.pipe);
        self.buckets[idx].push_front(record);
    }

    pub fn record_count(&self) -> usize {
        self.buckets.iter().map(|b| b.len()).sum()
    }
}
