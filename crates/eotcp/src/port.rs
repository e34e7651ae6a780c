//! Device ports.
//!
//! A device port is the local end of the tunnel: something that yields one
//! Ethernet frame per read and accepts one frame per write. The Linux TAP
//! device ([`TapDevice`](crate::tap::TapDevice)) is the production port;
//! [`ChannelPort`] keeps frames in memory.

use std::future::Future;
use std::io;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// A source and sink of discrete frames.
///
/// The port lives for the whole process and is lent to one pump at a time.
pub trait DevicePort: Send {
    /// Read one frame into `buf` and return its length.
    ///
    /// Frames longer than `buf` are truncated. Implementations must be
    /// cancel safe: if the returned future is dropped before it completes,
    /// no frame is consumed. The pump relies on this to race the device
    /// against the connection.
    fn read_frame(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<usize>> + Send;

    /// Write one whole frame.
    ///
    /// A frame that is only partially accepted is reported as an error.
    fn write_frame(&mut self, frame: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Name used in diagnostics.
    fn name(&self) -> &str;
}

/// In-memory device port.
///
/// Frames injected through the paired [`ChannelPortHandle`] are read by the
/// pump as if the host had sent them; frames the pump writes come out of
/// [`ChannelPortHandle::recv`]. Dropping the handle breaks the port, and the
/// next read fails with [`Error::Device`].
pub struct ChannelPort {
    name: String,
    inbound: mpsc::Receiver<Bytes>,
    outbound: mpsc::Sender<Bytes>,
}

/// The host side of a [`ChannelPort`].
pub struct ChannelPortHandle {
    inbound: mpsc::Sender<Bytes>,
    outbound: mpsc::Receiver<Bytes>,
}

impl ChannelPort {
    /// Create a port with room for `capacity` queued frames per direction.
    pub fn new(name: impl Into<String>, capacity: usize) -> (Self, ChannelPortHandle) {
        let (in_tx, in_rx) = mpsc::channel(capacity);
        let (out_tx, out_rx) = mpsc::channel(capacity);

        let port = ChannelPort {
            name: name.into(),
            inbound: in_rx,
            outbound: out_tx,
        };
        let handle = ChannelPortHandle {
            inbound: in_tx,
            outbound: out_rx,
        };
        (port, handle)
    }
}

impl DevicePort for ChannelPort {
    async fn read_frame(&mut self, buf: &mut [u8]) -> Result<usize> {
        let frame = self.inbound.recv().await.ok_or_else(|| {
            Error::device(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "channel port handle dropped",
            ))
        })?;

        let n = frame.len().min(buf.len());
        if n < frame.len() {
            tracing::debug!(len = frame.len(), kept = n, "truncating injected frame");
        }
        buf[..n].copy_from_slice(&frame[..n]);
        Ok(n)
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.outbound
            .send(Bytes::copy_from_slice(frame))
            .await
            .map_err(|_| {
                Error::device(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "channel port handle dropped",
                ))
            })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl ChannelPortHandle {
    /// Hand a frame to the port, as if the host had transmitted it.
    pub async fn inject(&self, frame: impl Into<Bytes>) -> Result<()> {
        self.inbound.send(frame.into()).await.map_err(|_| {
            Error::device(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "channel port dropped",
            ))
        })
    }

    /// Receive the next frame written to the port.
    ///
    /// Returns `None` once the port is dropped and drained.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.outbound.recv().await
    }

    /// Receive a frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.outbound.try_recv().ok()
    }
}
