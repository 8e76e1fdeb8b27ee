// SPDX-License-Identifier: MIT
//! Error taxonomy for the store.
//!
//! Mirrors the recovery policy of the daemon: protocol and index errors are
//! rendered back to the client as `ERR`, snapshot errors are logged and
//! swallowed so the daemon keeps running, and only init-time failures are
//! fatal.

use std::io;
use thiserror::Error;

/// Errors that can surface while driving a single client session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("client disconnected or errored before a full frame was read")]
    ShortFrame,

    #[error("read timed out")]
    Timeout,

    #[error("socket I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised while reading or rewriting the on-disk snapshot.
///
/// All variants are non-fatal: the caller logs at error severity and keeps
/// the in-memory index untouched.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("could not open snapshot file {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error while reading or writing snapshot: {0}")]
    Io(#[from] io::Error),
}

/// Fatal errors during process startup. Any occurrence here causes the
/// daemon to exit with a nonzero status.
#[derive(Debug, Error)]
pub enum FatalInitError {
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to install signal handler: {0}")]
    Signal(#[source] io::Error),
}
