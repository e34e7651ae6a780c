//! All-or-nothing reads and writes on a byte stream.
//!
//! A stream socket may accept or deliver fewer bytes than asked for in a
//! single call. These helpers keep going until the whole buffer has moved,
//! and report a zero-byte read as an orderly close by the peer rather than
//! as an I/O fault.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Write every byte of `buf` to `stream`.
///
/// Either the whole buffer is written or an error is returned. A write that
/// makes no progress fails with [`io::ErrorKind::WriteZero`].
pub async fn write_all<W>(stream: &mut W, buf: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut sent = 0;
    while sent < buf.len() {
        match stream.write(&buf[sent..]).await {
            Ok(0) => return Err(Error::Io(io::ErrorKind::WriteZero.into())),
            Ok(n) => sent += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(())
}

/// Fill `buf` completely from `stream`.
///
/// Returns [`Error::ConnectionClosed`] if the stream reaches end-of-file
/// before the buffer is full, and [`Error::Io`] on a read error.
pub async fn read_all<R>(stream: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut received = 0;
    while received < buf.len() {
        match stream.read(&mut buf[received..]).await {
            Ok(0) => {
                tracing::trace!(received, wanted = buf.len(), "stream ended mid-read");
                return Err(Error::ConnectionClosed);
            }
            Ok(n) => received += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(())
}
