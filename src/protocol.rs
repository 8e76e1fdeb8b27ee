// SPDX-License-Identifier: MIT
//! The wire protocol (`spec.md` §4.5 / §6): a fixed-size binary request frame
//! and a textual `OK`/`ERR` reply line.

use crate::hash::{FuzzyHash, PIPE_LEN};

/// `cmd` byte values. Exact numeric values only need to match the shared
/// header clients build against; CHECK/WRITE/DELETE are the only defined
/// commands, anything else is `Command::Unknown`.
pub const CMD_CHECK: u8 = 0;
pub const CMD_WRITE: u8 = 1;
pub const CMD_DELETE: u8 = 2;

/// Total size of one `FuzzyCommand` wire frame: cmd(1) + block_size(4) + pipe(64).
pub const FRAME_SIZE: usize = 1 + 4 + PIPE_LEN;

pub const REPLY_OK: &[u8] = b"OK\r\n";
pub const REPLY_ERR: &[u8] = b"ERR\r\n";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Check(FuzzyHash),
    Write(FuzzyHash),
    Delete(FuzzyHash),
    Unknown,
}

/// Parse an exact `FRAME_SIZE`-byte frame into a `Command`.
///
/// Panics if `frame.len() != FRAME_SIZE`; callers only invoke this once a
/// full frame has been read (`spec.md` §4.5's state machine never dispatches
/// on a short frame).
pub fn parse_frame(frame: &[u8]) -> Command {
    assert_eq!(frame.len(), FRAME_SIZE, "parse_frame requires an exact frame");

    let cmd = frame[0];
    let block_size = u32::from_ne_bytes(frame[1..5].try_into().unwrap());
    let mut pipe = [0u8; PIPE_LEN];
    pipe.copy_from_slice(&frame[5..5 + PIPE_LEN]);
    let hash = FuzzyHash::new(pipe, block_size);

    match cmd {
        CMD_CHECK => Command::Check(hash),
        CMD_WRITE => Command::Write(hash),
        CMD_DELETE => Command::Delete(hash),
        _ => Command::Unknown,
    }
}

/// Serialize a `FuzzyCommand` frame (used by tests and any future
/// keep-alive client helper).
pub fn encode_frame(cmd: u8, hash: &FuzzyHash) -> [u8; FRAME_SIZE] {
    let mut buf = [0u8; FRAME_SIZE];
    buf[0] = cmd;
    buf[1..5].copy_from_slice(&hash.block_size.to_ne_bytes());
    buf[5..5 + PIPE_LEN].copy_from_slice(&hash.pipe);
    buf
}
