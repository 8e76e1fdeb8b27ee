// SPDX-License-Identifier: MIT
//! Per-connection state machine (`spec.md` §4.5): read exactly one fixed
//! frame, dispatch, reply, close. Single-shot — one command per connection.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::SessionError;
use crate::index::Index;
use crate::protocol::{self, Command, FRAME_SIZE, REPLY_ERR, REPLY_OK};

/// Drive one connection to completion: read the frame (or time out / get cut
/// off), dispatch against `index`, write the reply, and return.
///
/// Never propagates an error to the peer — `spec.md` §7 treats every session
/// failure as "close silently", logged at debug severity here.
pub async fn handle_connection<S>(mut stream: S, io_timeout: Duration, index: Rc<RefCell<Index>>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let buf = match read_frame(&mut stream, io_timeout).await {
        Ok(buf) => buf,
        Err(err) => {
            debug!(%err, "session closed without a complete frame");
            return;
        }
    };

    let command = protocol::parse_frame(&buf);
    let ok = dispatch(command, &index);

    let reply: &[u8] = if ok { REPLY_OK } else { REPLY_ERR };
    if let Err(err) = stream.write_all(reply).await {
        debug!(%err, "error writing reply, session closing");
    }
}

/// Read exactly `FRAME_SIZE` bytes within `io_timeout`, or fail with the
/// specific `SessionError` variant describing why.
async fn read_frame<S>(stream: &mut S, io_timeout: Duration) -> Result<[u8; FRAME_SIZE], SessionError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; FRAME_SIZE];
    let mut read_pos = 0usize;

    let outcome = tokio::time::timeout(io_timeout, async {
        while read_pos < FRAME_SIZE {
            let n = stream.read(&mut buf[read_pos..]).await?;
            if n == 0 {
                return Err(SessionError::ShortFrame);
            }
            read_pos += n;
        }
        Ok(())
    })
    .await;

    match outcome {
        Ok(Ok(())) => Ok(buf),
        Ok(Err(err)) => Err(err),
        Err(_) => Err(SessionError::Timeout),
    }
}

fn dispatch(command: Command, index: &Rc<RefCell<Index>>) -> bool {
    match command {
        Command::Check(h) => index.borrow().check(&h),
        Command::Write(h) => index.borrow_mut().write(h),
        Command::Delete(h) => index.borrow_mut().delete(&h),
        Command::Unknown => false,
    }
}
