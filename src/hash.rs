// SPDX-License-Identifier: MIT
//! The `FuzzyHash` and `Record` data model (`spec.md` §3) and their
//! fixed-width, host-endian on-disk/wire layout (`spec.md` §6).

/// Length in bytes of a fuzzy hash's payload ("pipe").
pub const PIPE_LEN: usize = 64;

/// Byte length of one serialized `Record`: pipe + block_size(u32) + time(u64).
pub const RECORD_LEN: usize = PIPE_LEN + 4 + 8;

/// An opaque fixed-width fuzzy hash: a payload plus a block-size classifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FuzzyHash {
    pub pipe: [u8; PIPE_LEN],
    pub block_size: u32,
}

impl FuzzyHash {
    pub fn new(pipe: [u8; PIPE_LEN], block_size: u32) -> Self {
        Self { pipe, block_size }
    }
}

/// A stored fuzzy hash plus the insertion timestamp used for TTL expiry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Record {
    pub hash: FuzzyHash,
    /// Seconds since the Unix epoch at insertion time.
    pub time: u64,
}

impl Record {
    pub fn new(hash: FuzzyHash, time: u64) -> Self {
        Self { hash, time }
    }

    /// Bucket index this record belongs to (`spec.md` §3).
    pub fn bucket_index(&self, num_buckets: usize) -> usize {
        (self.hash.block_size as usize) % num_buckets
    }

    /// Serialize to the fixed on-disk/native layout: pipe || block_size (NE) || time (NE).
    pub fn to_bytes(&self) -> [u8; RECORD_LEN] {
        let mut buf = [0u8; RECORD_LEN];
        buf[..PIPE_LEN].copy_from_slice(&self.hash.pipe);
        buf[PIPE_LEN..PIPE_LEN + 4].copy_from_slice(&self.hash.block_size.to_ne_bytes());
        buf[PIPE_LEN + 4..].copy_from_slice(&self.time.to_ne_bytes());
        buf
    }

    /// Deserialize a single record from an exact-length byte slice.
    ///
    /// Returns `None` if `bytes.len() != RECORD_LEN`; this is the "short
    /// read" / corrupt-tail condition callers treat as non-fatal.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != RECORD_LEN {
            return None;
        }
        let mut pipe = [0u8; PIPE_LEN];
        pipe.copy_from_slice(&bytes[..PIPE_LEN]);
        let block_size = u32::from_ne_bytes(bytes[PIPE_LEN..PIPE_LEN + 4].try_into().ok()?);
        let time = u64::from_ne_bytes(bytes[PIPE_LEN + 4..].try_into().ok()?);
        Some(Record::new(FuzzyHash::new(pipe, block_size), time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let mut pipe = [0u8; PIPE_LEN];
        for (i, b) in pipe.iter_mut().enumerate() {
            *b = i as u8;
        }
        let rec = Record::new(FuzzyHash::new(pipe, 4096), 1_700_000_000);
        let bytes = rec.to_bytes();
        assert_eq!(bytes.len(), RECORD_LEN);
        let back = Record::from_bytes(&bytes).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn rejects_short_tail() {
        let bytes = [0u8; RECORD_LEN - 1];
        assert!(Record::from_bytes(&bytes).is_none());
    }

    #[test]
    fn bucket_index_is_block_size_mod_num_buckets() {
        let rec = Record::new(FuzzyHash::new([0u8; PIPE_LEN], 2048 + 7), 0);
        assert_eq!(rec.bucket_index(1024), 7);
    }
}
