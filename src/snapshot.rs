// SPDX-License-Identifier: MIT
//! Snapshot I/O: load-at-startup and periodic rewrite-with-TTL-eviction
//! (`spec.md` §4.4). The on-disk format is a headerless concatenation of
//! fixed-width `Record` images (`spec.md` §6).
//!
//! Both operations use blocking `std::fs` calls from the single-threaded
//! event loop — acceptable because snapshots are infrequent and the dataset
//! is memory-resident (`spec.md` §5).

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{error, info, warn};

use crate::error::SnapshotError;
use crate::hash::{Record, RECORD_LEN};
use crate::index::Index;

/// `rw-r--r--`, explicit rather than umask-dependent (`spec.md` §4.4).
const SNAPSHOT_MODE: u32 = 0o644;

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_secs()
}

/// Load the snapshot file into `index` at startup.
///
/// Failure to open the file is non-fatal (the store begins empty); a short
/// trailing record is logged and discarded, retaining everything already
/// loaded (`spec.md` §4.4, `LoadCorruptTail`).
pub fn load(path: &str, index: &mut Index) {
    match load_inner(path, index) {
        Ok(loaded) => info!(path, loaded, "snapshot load complete"),
        Err(SnapshotError::Open { source, .. }) => {
            info!(path, %source, "no snapshot file to load, starting empty");
        }
        Err(err) => {
            warn!(path, %err, "error reading snapshot, keeping already-loaded records");
        }
    }
}

fn load_inner(path: &str, index: &mut Index) -> Result<usize, SnapshotError> {
    let mut file = File::open(path).map_err(|source| SnapshotError::Open { path: path.to_string(), source })?;

    let mut loaded = 0usize;
    let mut buf = [0u8; RECORD_LEN];
    loop {
        let n = read_full_or_partial(&mut file, &mut buf)?;
        match n {
            0 => break,
            n if n == RECORD_LEN => {
                if let Some(record) = Record::from_bytes(&buf) {
                    index.load_record(record);
                    loaded += 1;
                }
            }
            n => {
                warn!(path, bytes = n, "discarding short trailing record at snapshot load");
                break;
            }
        }
    }
    Ok(loaded)
}

/// Read up to `buf.len()` bytes, returning the number actually read (which
/// may be less than `buf.len()` on EOF mid-record).
fn read_full_or_partial(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match file.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// Rewrite the snapshot file from the current index, applying TTL eviction.
///
/// Errors opening/writing/closing the file are logged at error severity and
/// swallowed: the in-memory state is retained and `mods` is left untouched
/// so the next cycle retries (`spec.md` §7, `SnapshotIOError`). Returns
/// `true` on a successful rewrite.
pub fn rewrite(path: &str, index: &mut Index, ttl_seconds: u64) -> bool {
    match rewrite_inner(path, index, ttl_seconds) {
        Ok((written, evicted)) => {
            index.reset_mods();
            info!(path, written, evicted, "snapshot rewrite complete");
            true
        }
        Err(err) => {
            error!(path, %err, "snapshot rewrite failed, retaining in-memory state");
            false
        }
    }
}

fn rewrite_inner(path: &str, index: &mut Index, ttl_seconds: u64) -> Result<(usize, usize), SnapshotError> {
    let now = now_secs();

    // Evict expired records bucket-by-bucket, collecting the pipes of
    // evicted entries so the Bloom filter can be updated afterward without
    // holding two mutable borrows of `index` at once.
    let mut evicted_pipes: Vec<[u8; 64]> = Vec::new();
    for bucket in index.buckets_mut() {
        bucket.retain(|rec| {
            let age = now.saturating_sub(rec.time);
            if age > ttl_seconds {
                evicted_pipes.push(rec.hash.pipe);
                false
            } else {
                true
            }
        });
    }
    let evicted = evicted_pipes.len();
    for pipe in &evicted_pipes {
        index.bloom_mut().del(pipe);
    }

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(SNAPSHOT_MODE)
        .open(path)
        .map_err(|source| SnapshotError::Open { path: path.to_string(), source })?;

    let mut written = 0usize;
    for bucket in index.buckets() {
        for rec in bucket {
            file.write_all(&rec.to_bytes())?;
            written += 1;
        }
    }
    file.flush()?;

    Ok((written, evicted))
}
