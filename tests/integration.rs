//! End-to-end scenarios from `spec.md` §8 (S1-S6), driven over real TCP
//! sockets against the actual protocol/session/index stack.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::LocalSet;

use fuzzhash_store::bloom::BloomFilter;
use fuzzhash_store::hash::FuzzyHash;
use fuzzhash_store::index::Index;
use fuzzhash_store::protocol::{encode_frame, CMD_CHECK, CMD_DELETE, CMD_WRITE};
use fuzzhash_store::session;
use fuzzhash_store::snapshot;

const IO_TIMEOUT: Duration = Duration::from_secs(2);

/// Spin up a one-shot-per-connection server on an ephemeral port, backed by
/// `index`, serving exactly `count` connections before returning.
async fn serve_n(index: Rc<RefCell<Index>>, count: usize) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::task::spawn_local(async move {
        for _ in 0..count {
            if let Ok((stream, _)) = listener.accept().await {
                let idx = index.clone();
                tokio::task::spawn_local(async move {
                    session::handle_connection(stream, IO_TIMEOUT, idx).await;
                });
            }
        }
    });

    addr
}

async fn send_frame(addr: std::net::SocketAddr, frame: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(frame).await.unwrap();
    stream.shutdown().await.ok();
    let mut reply = Vec::new();
    let _ = tokio::time::timeout(IO_TIMEOUT, stream.read_to_end(&mut reply)).await;
    reply
}

fn new_index() -> Rc<RefCell<Index>> {
    Rc::new(RefCell::new(Index::new(BloomFilter::new(1 << 16, 4))))
}

#[tokio::test]
async fn s1_write_then_check() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let index = new_index();
            let addr = serve_n(index, 2).await;

            let h = FuzzyHash::new([b'a'; 64], 128);
            let reply = send_frame(addr, &encode_frame(CMD_WRITE, &h)).await;
            assert_eq!(reply, b"OK\r\n");

            let reply = send_frame(addr, &encode_frame(CMD_CHECK, &h)).await;
            assert_eq!(reply, b"OK\r\n");
        })
        .await;
}

#[tokio::test]
async fn s2_check_miss_on_empty_store() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let index = new_index();
            let addr = serve_n(index, 1).await;

            let h = FuzzyHash::new([b'z'; 64], 128);
            let reply = send_frame(addr, &encode_frame(CMD_CHECK, &h)).await;
            assert_eq!(reply, b"ERR\r\n");
        })
        .await;
}

#[tokio::test]
async fn s3_delete_then_check_misses() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let index = new_index();
            let addr = serve_n(index, 3).await;

            let h = FuzzyHash::new([b'd'; 64], 128);
            assert_eq!(send_frame(addr, &encode_frame(CMD_WRITE, &h)).await, b"OK\r\n");
            assert_eq!(send_frame(addr, &encode_frame(CMD_DELETE, &h)).await, b"OK\r\n");
            assert_eq!(send_frame(addr, &encode_frame(CMD_CHECK, &h)).await, b"ERR\r\n");
        })
        .await;
}

#[tokio::test]
async fn s4_unknown_command() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let index = new_index();
            let addr = serve_n(index, 1).await;

            let h = FuzzyHash::new([0u8; 64], 0);
            let mut frame = encode_frame(CMD_WRITE, &h);
            frame[0] = 0xFF; // unrecognised cmd byte
            let reply = send_frame(addr, &frame).await;
            assert_eq!(reply, b"ERR\r\n");
        })
        .await;
}

#[tokio::test]
async fn s5_snapshot_round_trip_at_scale() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snap.db");
    let path = path.to_str().unwrap().to_string();

    // Insert enough distinct hashes to force mods >= MOD_LIMIT, then
    // rewrite (standing in for the periodic timer firing) and "restart" by
    // loading into a brand-new Index, as a real process restart would.
    let mut idx = Index::new(BloomFilter::new(1 << 16, 4));
    let mut sample = Vec::new();
    for i in 0u32..20_000 {
        let mut pipe = [0u8; 64];
        pipe[..4].copy_from_slice(&i.to_ne_bytes());
        let h = FuzzyHash::new(pipe, i % 4096);
        assert!(idx.write(h));
        if i % 2000 == 0 {
            sample.push(h);
        }
    }
    assert!(idx.mods() >= 10_000);

    assert!(snapshot::rewrite(&path, &mut idx, 172_800));

    let mut reloaded = Index::new(BloomFilter::new(1 << 16, 4));
    snapshot::load(&path, &mut reloaded);

    for h in sample {
        assert!(reloaded.check(&h));
    }
}

#[tokio::test]
async fn s6_ttl_eviction_on_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snap.db");
    let path = path.to_str().unwrap().to_string();

    let mut idx = Index::new(BloomFilter::new(1 << 16, 4));
    let h = FuzzyHash::new([b'e'; 64], 7);
    idx.write(h);

    // Force the record's time into the past (now - (TTL + 1)).
    for bucket in idx.buckets_mut() {
        for rec in bucket.iter_mut() {
            rec.time = rec.time.saturating_sub(200_000);
        }
    }

    assert!(snapshot::rewrite(&path, &mut idx, 172_800));

    let mut reloaded = Index::new(BloomFilter::new(1 << 16, 4));
    snapshot::load(&path, &mut reloaded);
    assert!(!reloaded.check(&h));
}

#[tokio::test]
async fn frame_completeness_never_dispatches_on_short_frame() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let index = new_index();
            let addr = serve_n(index.clone(), 1).await;

            let mut stream = TcpStream::connect(addr).await.unwrap();
            // send fewer bytes than FRAME_SIZE, then drop the connection.
            stream.write_all(&[1, 2, 3]).await.unwrap();
            drop(stream);

            // give the server a moment to notice EOF and close the session.
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert_eq!(index.borrow().record_count(), 0);
        })
        .await;
}
