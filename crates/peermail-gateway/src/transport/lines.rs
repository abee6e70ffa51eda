//! Line framing over a byte stream.
//!
//! Splits on `\n`, drops one trailing `\r`, and yields only complete lines;
//! a partial line at EOF is discarded. Shared by SMTP, POP3 and peer streams.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use peermail_core::error::{PeerMailError, Result};

/// Upper bound for a single line still waiting for its `\n`.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

pub struct LineReader<R> {
    inner: R,
    buf: BytesMut,
    max_line: usize,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_limit(inner, MAX_LINE_BYTES)
    }

    pub fn with_limit(inner: R, max_line: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(4096),
            max_line,
        }
    }

    /// Next complete line, `Ok(None)` at EOF.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
                let mut line = self.buf.split_to(pos + 1);
                line.truncate(pos);
                if line.last() == Some(&b'\r') {
                    line.truncate(pos - 1);
                }
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }

            if self.buf.len() > self.max_line {
                return Err(PeerMailError::BadRequest(format!(
                    "line exceeds {} bytes",
                    self.max_line
                )));
            }

            let n = self.inner.read_buf(&mut self.buf).await?;
            if n == 0 {
                return Ok(None);
            }
        }
    }
}
