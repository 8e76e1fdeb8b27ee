// SPDX-License-Identifier: MIT
//! Probabilistic membership filter guarding the bucketed index (`spec.md` §4.1).
//!
//! A counting Bloom filter with 4-bit saturating counters, two-per-byte
//! packed. Counting lets `del` decrement the exact bits `add` set instead of
//! clearing them outright, at the cost of 4x the memory of a plain bit
//! array — still a few tens of MB at the mandated floor size.

const MAX_COUNTER: u8 = 15;

/// Bit-array size floor from `spec.md` §4.1.
pub const DEFAULT_BLOOM_BITS: usize = 20_000_000;

/// Number of double-hashing rounds.
pub const DEFAULT_BLOOM_HASHES: u32 = 5;

pub struct BloomFilter {
    /// 4-bit counters, two packed per byte.
    counters: Vec<u8>,
    bits: usize,
    hashes: u32,
}

impl BloomFilter {
    pub fn new(bits: usize, hashes: u32) -> Self {
        let bits = bits.max(1);
        Self {
            counters: vec![0u8; bits.div_ceil(2)],
            bits,
            hashes: hashes.max(1),
        }
    }

    /// Set k bits derived from k distinct hash functions of `pipe`.
    pub fn add(&mut self, pipe: &[u8]) {
        for pos in self.positions(pipe) {
            self.increment(pos);
        }
    }

    /// Decrement the k counters for `pipe`. Safe to call even if `pipe` was
    /// never added (counters floor at zero, never underflow).
    pub fn del(&mut self, pipe: &[u8]) {
        for pos in self.positions(pipe) {
            self.decrement(pos);
        }
    }

    /// `false` => `pipe` is definitely absent. `true` => possibly present.
    pub fn maybe_contains(&self, pipe: &[u8]) -> bool {
        self.positions(pipe).into_iter().all(|pos| self.counter(pos) > 0)
    }

    fn positions(&self, pipe: &[u8]) -> Vec<usize> {
        let (h1, h2) = Self::double_hash(pipe);
        (0..self.hashes)
            .map(|i| {
                let combined = h1.wrapping_add((i as u64).wrapping_mul(h2));
                (combined % self.bits as u64) as usize
            })
            .collect()
    }

    /// Two independent 64-bit hashes of `data`, via a fast multiply-rotate
    /// mix seeded with distinct constants (fxhash-style).
    fn double_hash(data: &[u8]) -> (u64, u64) {
        (Self::mix(data, 0x517c_c1b7_2722_0a95), Self::mix(data, 0x9e37_79b9_7f4a_7c15))
    }

    fn mix(data: &[u8], seed: u64) -> u64 {
        const K: u64 = 0xff51_afd7_ed55_8ccd;
        let mut hash = seed;
        for &byte in data {
            hash = hash.rotate_left(5).wrapping_add(byte as u64).wrapping_mul(K);
        }
        hash ^ (hash >> 32)
    }

    fn counter(&self, pos: usize) -> u8 {
        let byte = self.counters[pos / 2];
        if pos % 2 == 0 {
            byte >> 4
        } else {
            byte & 0x0F
        }
    }

    fn increment(&mut self, pos: usize) {
        let current = self.counter(pos);
        if current >= MAX_COUNTER {
            return;
        }
        let idx = pos / 2;
        if pos % 2 == 0 {
            self.counters[idx] = (self.counters[idx] & 0x0F) | ((current + 1) << 4);
        } else {
            self.counters[idx] = (self.counters[idx] & 0xF0) | (current + 1);
        }
    }

    fn decrement(&mut self, pos: usize) {
        let current = self.counter(pos);
        if current == 0 {
            return;
        }
        let idx = pos / 2;
        if pos % 2 == 0 {
            self.counters[idx] = (self.counters[idx] & 0x0F) | ((current - 1) << 4);
        } else {
            self.counters[idx] = (self.counters[idx] & 0xF0) | (current - 1);
        }
    }
}

impl Default for BloomFilter {
    fn default() -> Self {
        Self::new(DEFAULT_BLOOM_BITS, DEFAULT_BLOOM_HASHES)
    }
}
