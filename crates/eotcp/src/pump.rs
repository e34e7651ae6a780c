//! The frame pump.
//!
//! A [`Pump`] owns one connection and borrows the device port for the
//! lifetime of that connection. Each [`step`](Pump::step) waits until either
//! side has data (or shutdown is requested) and moves exactly one frame in
//! the corresponding direction:
//!
//! ```text
//!   device ──read_frame──► header + payload ──write_all──► connection
//!   device ◄─write_frame── payload ◄─read_all── header ◄── connection
//! ```
//!
//! A single task drives both directions, so there is never more than one
//! frame in flight per side and no locking between them. Any error ends the
//! pump; the caller decides whether to reconnect.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::frame::{self, HEADER_LEN, MAX_FRAME};
use crate::port::DevicePort;
use crate::stream::{read_all, write_all};

/// Outcome of a single pump step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A frame of the given length was read from the device and sent to the peer.
    ToPeer(usize),
    /// A frame of the given length was received from the peer and written to the device.
    ToDevice(usize),
    /// Shutdown was requested.
    Shutdown,
}

/// Per-connection traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    /// Frames sent to the peer.
    pub frames_to_peer: u64,
    /// Payload bytes sent to the peer.
    pub bytes_to_peer: u64,
    /// Frames written to the device.
    pub frames_to_device: u64,
    /// Payload bytes written to the device.
    pub bytes_to_device: u64,
}

impl PumpStats {
    fn record(&mut self, step: Step) {
        match step {
            Step::ToPeer(n) => {
                self.frames_to_peer += 1;
                self.bytes_to_peer += n as u64;
            }
            Step::ToDevice(n) => {
                self.frames_to_device += 1;
                self.bytes_to_device += n as u64;
            }
            Step::Shutdown => {}
        }
    }
}

/// Moves frames between a device port and a connection.
pub struct Pump<'d, D, S> {
    device: &'d mut D,
    conn: BufReader<S>,
    cancel: CancellationToken,
    to_peer: Box<[u8]>,
    to_device: Box<[u8]>,
    stats: PumpStats,
}

impl<'d, D, S> Pump<'d, D, S>
where
    D: DevicePort,
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Create a pump over `conn`, borrowing `device` until the pump is dropped.
    pub fn new(device: &'d mut D, conn: S, cancel: CancellationToken) -> Self {
        Self {
            device,
            conn: BufReader::new(conn),
            cancel,
            to_peer: vec![0u8; MAX_FRAME].into_boxed_slice(),
            to_device: vec![0u8; MAX_FRAME].into_boxed_slice(),
            stats: PumpStats::default(),
        }
    }

    /// Traffic moved so far.
    pub fn stats(&self) -> PumpStats {
        self.stats
    }

    /// Run until shutdown is requested or either side fails.
    ///
    /// Returns `Ok(())` on shutdown. Every other exit is an error: the
    /// connection is no longer usable, and a device error means the device
    /// stopped working.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            if self.step().await? == Step::Shutdown {
                return Ok(());
            }
        }
    }

    /// Wait for one readiness event and move one frame.
    pub async fn step(&mut self) -> Result<Step> {
        if self.cancel.is_cancelled() {
            return Ok(Step::Shutdown);
        }

        let conn = &mut self.conn;

        // `read_frame` is cancel safe by contract and `fill_buf` keeps whatever
        // it read buffered, so losing the race drops nothing.
        let step = tokio::select! {
            _ = self.cancel.cancelled() => Step::Shutdown,

            res = self.device.read_frame(&mut self.to_peer) => {
                let len = res?;
                send_frame(conn, &self.to_peer[..len]).await?;
                tracing::trace!(len, "device -> peer");
                Step::ToPeer(len)
            }

            res = async { conn.fill_buf().await.map(|b| b.is_empty()) } => {
                if res? {
                    return Err(Error::ConnectionClosed);
                }
                let len = recv_frame(conn, &mut self.to_device).await?;
                self.device.write_frame(&self.to_device[..len]).await?;
                tracing::trace!(len, "peer -> device");
                Step::ToDevice(len)
            }
        };

        self.stats.record(step);
        Ok(step)
    }
}

/// Send one frame to the peer.
async fn send_frame<W>(conn: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_all(conn, &frame::encode_header(payload.len() as u32)).await?;
    write_all(conn, payload).await?;
    conn.flush().await?;
    Ok(())
}

/// Receive one frame from the peer into `buf`, returning its length.
///
/// An oversized header is rejected before any payload byte is read.
async fn recv_frame<R>(conn: &mut R, buf: &mut [u8]) -> Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    read_all(conn, &mut header).await?;

    let len = frame::check_len(frame::decode_header(header))?;
    read_all(conn, &mut buf[..len]).await?;
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::ChannelPort;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, DuplexStream};

    async fn write_frame(peer: &mut DuplexStream, payload: &[u8]) {
        peer.write_all(&frame::encode_header(payload.len() as u32))
            .await
            .unwrap();
        peer.write_all(payload).await.unwrap();
    }

    async fn read_frame(peer: &mut DuplexStream) -> Vec<u8> {
        let mut header = [0u8; HEADER_LEN];
        peer.read_exact(&mut header).await.unwrap();
        let mut payload = vec![0u8; frame::decode_header(header) as usize];
        peer.read_exact(&mut payload).await.unwrap();
        payload
    }

    #[tokio::test]
    async fn test_device_frame_reaches_peer() {
        let (mut port, handle) = ChannelPort::new("mem0", 8);
        let (conn, mut peer) = tokio::io::duplex(64 * 1024);
        let mut pump = Pump::new(&mut port, conn, CancellationToken::new());

        handle.inject(vec![0xab; 60]).await.unwrap();
        assert_eq!(pump.step().await.unwrap(), Step::ToPeer(60));

        let mut header = [0u8; HEADER_LEN];
        peer.read_exact(&mut header).await.unwrap();
        assert_eq!(header, [0, 0, 0, 60]);
        let mut payload = [0u8; 60];
        peer.read_exact(&mut payload).await.unwrap();
        assert_eq!(payload, [0xab; 60]);
    }

    #[tokio::test]
    async fn test_peer_frame_reaches_device() {
        let (mut port, mut handle) = ChannelPort::new("mem0", 8);
        let (conn, mut peer) = tokio::io::duplex(64 * 1024);
        let mut pump = Pump::new(&mut port, conn, CancellationToken::new());

        write_frame(&mut peer, b"ethernet frame").await;
        assert_eq!(pump.step().await.unwrap(), Step::ToDevice(14));
        drop(pump);

        assert_eq!(&handle.recv().await.unwrap()[..], b"ethernet frame");
    }

    #[tokio::test]
    async fn test_round_trip_all_sizes() {
        let (mut port, mut handle) = ChannelPort::new("mem0", 4);
        let (conn, mut peer) = tokio::io::duplex(64 * 1024);
        let mut pump = Pump::new(&mut port, conn, CancellationToken::new());

        for len in [0, 1, 59, 64, 1500, 1514, MAX_FRAME] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();

            handle.inject(payload.clone()).await.unwrap();
            assert_eq!(pump.step().await.unwrap(), Step::ToPeer(len));
            let echoed = read_frame(&mut peer).await;
            assert_eq!(echoed, payload);

            write_frame(&mut peer, &echoed).await;
            assert_eq!(pump.step().await.unwrap(), Step::ToDevice(len));
            assert_eq!(&handle.recv().await.unwrap()[..], &payload[..]);
        }

        let stats = pump.stats();
        assert_eq!(stats.frames_to_peer, 7);
        assert_eq!(stats.frames_to_device, 7);
        assert_eq!(stats.bytes_to_peer, stats.bytes_to_device);
    }

    #[tokio::test]
    async fn test_oversized_header_ends_pump_without_payload_read() {
        let (mut port, mut handle) = ChannelPort::new("mem0", 8);
        let (conn, mut peer) = tokio::io::duplex(64 * 1024);
        let mut pump = Pump::new(&mut port, conn, CancellationToken::new());

        // Header only: if the pump tried to read 1601 bytes it would hang.
        peer.write_all(&frame::encode_header(MAX_FRAME as u32 + 1))
            .await
            .unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), pump.run())
            .await
            .expect("pump must not wait for the payload");
        assert!(matches!(
            result,
            Err(Error::FrameTooLarge { len: 1601, max: MAX_FRAME })
        ));
        drop(pump);
        assert!(handle.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_peer_close_ends_pump() {
        let (mut port, _handle) = ChannelPort::new("mem0", 8);
        let (conn, peer) = tokio::io::duplex(64);
        let mut pump = Pump::new(&mut port, conn, CancellationToken::new());

        drop(peer);
        assert!(matches!(pump.run().await, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_peer_close_mid_frame() {
        let (mut port, _handle) = ChannelPort::new("mem0", 8);
        let (conn, mut peer) = tokio::io::duplex(64);
        let mut pump = Pump::new(&mut port, conn, CancellationToken::new());

        peer.write_all(&frame::encode_header(100)).await.unwrap();
        peer.write_all(&[0u8; 10]).await.unwrap();
        drop(peer);

        assert!(matches!(pump.run().await, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_device_failure_ends_pump() {
        let (mut port, handle) = ChannelPort::new("mem0", 8);
        let (conn, _peer) = tokio::io::duplex(64);
        let mut pump = Pump::new(&mut port, conn, CancellationToken::new());

        drop(handle);
        assert!(matches!(pump.run().await, Err(Error::Device(_))));
    }

    #[tokio::test]
    async fn test_both_directions_progress() {
        const N: usize = 8;

        let (mut port, mut handle) = ChannelPort::new("mem0", N);
        let (conn, mut peer) = tokio::io::duplex(64 * 1024);

        for i in 0..N {
            handle.inject(vec![i as u8; 100]).await.unwrap();
            write_frame(&mut peer, &[0x80 | i as u8; 200]).await;
        }

        let mut pump = Pump::new(&mut port, conn, CancellationToken::new());
        let mut to_peer = 0;
        let mut to_device = 0;
        for _ in 0..2 * N {
            match pump.step().await.unwrap() {
                Step::ToPeer(100) => to_peer += 1,
                Step::ToDevice(200) => to_device += 1,
                other => panic!("unexpected step {:?}", other),
            }
        }
        assert_eq!((to_peer, to_device), (N, N));
        drop(pump);

        // Order is preserved within each direction.
        for i in 0..N {
            assert_eq!(read_frame(&mut peer).await, vec![i as u8; 100]);
            assert_eq!(&handle.recv().await.unwrap()[..], &[0x80 | i as u8; 200][..]);
        }
    }

    #[tokio::test]
    async fn test_busy_device_does_not_starve_connection() {
        const MAX_STEPS: usize = 40;

        let (mut port, mut handle) = ChannelPort::new("mem0", 4);
        let (conn, mut peer) = tokio::io::duplex(64 * 1024);
        write_frame(&mut peer, b"waiting").await;

        let mut pump = Pump::new(&mut port, conn, CancellationToken::new());
        let mut served = None;
        for n in 0..MAX_STEPS {
            // The device always has another frame ready.
            handle.inject(vec![n as u8; 60]).await.unwrap();
            match pump.step().await.unwrap() {
                Step::ToPeer(60) => {}
                Step::ToDevice(7) => {
                    served = Some(n);
                    break;
                }
                other => panic!("unexpected step {:?}", other),
            }
        }
        assert!(
            served.is_some(),
            "connection not served within {} steps",
            MAX_STEPS
        );
        drop(pump);

        let mut frames = Vec::new();
        while let Some(frame) = handle.try_recv() {
            frames.push(frame);
        }
        assert_eq!(frames, vec![bytes::Bytes::from_static(b"waiting")]);
    }

    #[tokio::test]
    async fn test_shutdown_while_idle() {
        let (mut port, _handle) = ChannelPort::new("mem0", 8);
        let (conn, _peer) = tokio::io::duplex(64);
        let cancel = CancellationToken::new();
        let mut pump = Pump::new(&mut port, conn, cancel.clone());

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        tokio::time::timeout(Duration::from_secs(5), pump.run())
            .await
            .expect("pump must observe shutdown")
            .unwrap();
        assert_eq!(pump.stats(), PumpStats::default());
    }

    #[tokio::test]
    async fn test_step_after_shutdown() {
        let (mut port, handle) = ChannelPort::new("mem0", 8);
        let (conn, _peer) = tokio::io::duplex(64);
        let cancel = CancellationToken::new();
        cancel.cancel();

        handle.inject(&b"pending"[..]).await.unwrap();
        let mut pump = Pump::new(&mut port, conn, cancel);
        assert_eq!(pump.step().await.unwrap(), Step::Shutdown);
    }
}
