// SPDX-License-Identifier: MIT
//! Configuration loader (`SPEC_FULL.md` §6). The supervisor/config-service
//! boundary named in `spec.md` §1 is out of scope; this module is the
//! minimal concrete stand-in so the daemon is runnable, in the teacher's
//! `std::env::var(...)`-with-defaults idiom
//! (`examples/PayRpc-Bitcoin_Sprint_Production_Final_2/secure/rust/src/bin/bitcoin_sprint_api.rs`).

use crate::error::FatalInitError;

/// Where the daemon listens for connections.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListenAddr {
    Tcp(String),
    Unix(String),
}

#[derive(Clone, Debug)]
pub struct Config {
    pub listen: ListenAddr,
    /// Snapshot file path; `None` means in-memory only.
    pub hashfile: Option<String>,
    pub expire_seconds: u64,
    pub sync_timeout_seconds: u64,
    pub mod_limit: u64,
    pub io_timeout_seconds: u64,
    pub soft_shutdown_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: ListenAddr::Tcp("127.0.0.1:11335".to_string()),
            hashfile: None,
            expire_seconds: 172_800,
            sync_timeout_seconds: 60,
            mod_limit: 10_000,
            io_timeout_seconds: 10,
            soft_shutdown_seconds: 30,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, FatalInitError> {
        let mut cfg = Config::default();

        if let Ok(listen) = std::env::var("FUZZHASHD_LISTEN") {
            cfg.listen = parse_listen(&listen)?;
        }
        if let Ok(path) = std::env::var("FUZZHASHD_HASHFILE") {
            cfg.hashfile = Some(path);
        }
        if let Ok(v) = std::env::var("FUZZHASHD_EXPIRE") {
            cfg.expire_seconds = parse_u64("FUZZHASHD_EXPIRE", &v)?;
        }
        if let Ok(v) = std::env::var("FUZZHASHD_SYNC_TIMEOUT") {
            cfg.sync_timeout_seconds = parse_u64("FUZZHASHD_SYNC_TIMEOUT", &v)?;
        }
        if let Ok(v) = std::env::var("FUZZHASHD_MOD_LIMIT") {
            cfg.mod_limit = parse_u64("FUZZHASHD_MOD_LIMIT", &v)?;
        }
        if let Ok(v) = std::env::var("FUZZHASHD_IO_TIMEOUT") {
            cfg.io_timeout_seconds = parse_u64("FUZZHASHD_IO_TIMEOUT", &v)?;
        }
        if let Ok(v) = std::env::var("FUZZHASHD_SOFT_SHUTDOWN") {
            cfg.soft_shutdown_seconds = parse_u64("FUZZHASHD_SOFT_SHUTDOWN", &v)?;
        }

        Ok(cfg)
    }
}

fn parse_u64(var: &str, raw: &str) -> Result<u64, FatalInitError> {
    raw.parse()
        .map_err(|_| FatalInitError::InvalidConfig(format!("{var}={raw:?} is not a valid u64")))
}

fn parse_listen(raw: &str) -> Result<ListenAddr, FatalInitError> {
    if let Some(rest) = raw.strip_prefix("tcp://") {
        Ok(ListenAddr::Tcp(rest.to_string()))
    } else if let Some(rest) = raw.strip_prefix("unix://") {
        Ok(ListenAddr::Unix(rest.to_string()))
    } else {
        Err(FatalInitError::InvalidConfig(format!(
            "FUZZHASHD_LISTEN={raw:?} must start with tcp:// or unix://"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.expire_seconds, 172_800);
        assert_eq!(cfg.mod_limit, 10_000);
    }

    #[test]
    fn parses_tcp_listen() {
        assert_eq!(parse_listen("tcp://0.0.0.0:9999").unwrap(), ListenAddr::Tcp("0.0.0.0:9999".into()));
    }

    #[test]
    fn parses_unix_listen() {
        assert_eq!(parse_listen("unix:///tmp/fuzzhash.sock").unwrap(), ListenAddr::Unix("/tmp/fuzzhash.sock".into()));
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(parse_listen("udp://localhost:1").is_err());
    }
}
