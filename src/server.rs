// SPDX-License-Identifier: MIT
//! Event loop, connection acceptor, and process lifecycle (`spec.md` §4.6,
//! §4.7). The process-wide index/bloom/mods state lives in one `Worker`
//! struct owned by the event loop (`spec.md` §9's redesign note), rather
//! than as module-level globals.

use std::cell::RefCell;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::Duration;

use rand::Rng;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};
use tokio::task::LocalSet;
use tracing::{error, info, warn};

use crate::bloom::{BloomFilter, DEFAULT_BLOOM_BITS, DEFAULT_BLOOM_HASHES};
use crate::config::{Config, ListenAddr};
use crate::error::FatalInitError;
use crate::index::Index;
use crate::session;
use crate::snapshot;

/// Either side of the TCP/Unix listener split, unified for `handle_connection`.
enum Conn {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl AsyncRead for Conn {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Conn::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            Conn::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Conn {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Conn::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            Conn::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }
    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Conn::Tcp(s) => Pin::new(s).poll_flush(cx),
            Conn::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }
    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Conn::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            Conn::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

enum Listener {
    Tcp(TcpListener),
    Unix(UnixListener),
}

impl Listener {
    async fn bind(addr: &ListenAddr) -> Result<Self, FatalInitError> {
        match addr {
            ListenAddr::Tcp(a) => TcpListener::bind(a)
                .await
                .map(Listener::Tcp)
                .map_err(|source| FatalInitError::Bind { addr: a.clone(), source }),
            ListenAddr::Unix(path) => {
                // Stale socket files from a previous run are a config error
                // in production but would otherwise make bind() fail
                // spuriously in tests that reuse a path; remove if present.
                let _ = std::fs::remove_file(path);
                UnixListener::bind(path)
                    .map(Listener::Unix)
                    .map_err(|source| FatalInitError::Bind { addr: path.clone(), source })
            }
        }
    }

    async fn accept(&self) -> std::io::Result<Conn> {
        match self {
            Listener::Tcp(l) => l.accept().await.map(|(s, _)| Conn::Tcp(s)),
            Listener::Unix(l) => l.accept().await.map(|(s, _)| Conn::Unix(s)),
        }
    }
}

/// Owns the index and drives the reactor. Constructed via `Worker::start`.
pub struct Worker {
    config: Config,
    index: Rc<RefCell<Index>>,
}

impl Worker {
    /// Initialization order from `spec.md` §4.7: allocate state, load the
    /// snapshot (non-fatal on error), and return ready to arm the timer and
    /// bind the listener.
    pub fn new(config: Config) -> Self {
        let mut index = Index::new(BloomFilter::new(DEFAULT_BLOOM_BITS, DEFAULT_BLOOM_HASHES));
        if let Some(path) = &config.hashfile {
            snapshot::load(path, &mut index);
        }
        Self { config, index: Rc::new(RefCell::new(index)) }
    }

    /// Run the event loop until a shutdown signal is handled. Binds the
    /// listener, arms the sync timer, and serves connections until SIGTERM
    /// or the reload signal's soft-shutdown timer fires.
    pub async fn run(self) -> Result<(), FatalInitError> {
        let listener = Listener::bind(&self.config.listen).await?;
        info!(listen = ?self.config.listen, "fuzzhashd listening");

        let local = LocalSet::new();
        local.run_until(self.serve(listener)).await
    }

    async fn serve(self, listener: Listener) -> Result<(), FatalInitError> {
        let io_timeout = Duration::from_secs(self.config.io_timeout_seconds);
        let mut sync_timer = next_sync_deadline(self.config.sync_timeout_seconds);

        #[cfg(unix)]
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .map_err(FatalInitError::Signal)?;
        #[cfg(unix)]
        let mut sigusr2 = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::user_defined2())
            .map_err(FatalInitError::Signal)?;
        // SIGINT is ignored per `spec.md` §4.7: we simply never register a
        // handler for it, so the default disposition (terminate) would
        // apply only if the supervisor sends it directly to this process,
        // which `spec.md` says it does not.

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok(conn) => {
                            let index = self.index.clone();
                            tokio::task::spawn_local(async move {
                                session::handle_connection(conn, io_timeout, index).await;
                            });
                        }
                        Err(err) => warn!(%err, "accept error"),
                    }
                }
                _ = tokio::time::sleep_until(sync_timer) => {
                    self.maybe_snapshot(false);
                    sync_timer = next_sync_deadline(self.config.sync_timeout_seconds);
                }
                #[cfg(unix)]
                _ = sigterm.recv() => {
                    info!("SIGTERM received, forcing snapshot and exiting");
                    self.maybe_snapshot(true);
                    return Ok(());
                }
                #[cfg(unix)]
                _ = sigusr2.recv() => {
                    info!(seconds = self.config.soft_shutdown_seconds, "reload signal received, draining");
                    tokio::time::sleep(Duration::from_secs(self.config.soft_shutdown_seconds)).await;
                    self.maybe_snapshot(true);
                    return Ok(());
                }
            }
        }
    }

    /// Snapshot if `mods >= MOD_LIMIT`, or unconditionally when `force` is
    /// set (shutdown path, `spec.md` §4.4/§4.7).
    fn maybe_snapshot(&self, force: bool) {
        let Some(path) = &self.config.hashfile else { return };

        let mut index = self.index.borrow_mut();
        if force {
            index.force_mods(self.config.mod_limit + 1);
        }
        if index.mods() >= self.config.mod_limit {
            if !snapshot::rewrite(path, &mut index, self.config.expire_seconds) {
                error!(path, "snapshot rewrite failed, retaining in-memory state");
            }
        }
    }
}

/// Sync timer deadline: `SYNC_TIMEOUT + SYNC_TIMEOUT * U[0,1)` (`spec.md` §4.6).
fn next_sync_deadline(base_seconds: u64) -> tokio::time::Instant {
    let jitter: f64 = rand::thread_rng().gen_range(0.0..1.0);
    let total = base_seconds as f64 * (1.0 + jitter);
    tokio::time::Instant::now() + Duration::from_secs_f64(total)
}
