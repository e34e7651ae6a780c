//! Client side: connect, pump, wait, reconnect.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use super::{DEFAULT_RETRY_DELAY, backoff, pump_connection};
use crate::error::Result;
use crate::port::DevicePort;

/// Connect loop with a flat retry delay.
///
/// ```text
/// Connecting ──ok──► Pumping ──connection ends──► Backoff ──► Connecting
///     └──failed──────────────────────────────────►┘
/// ```
///
/// There is no attempt limit and the delay never grows: the client waits
/// out a peer that is slow to come up.
#[derive(Debug, Clone)]
pub struct Client {
    addr: SocketAddr,
    retry_delay: Duration,
}

impl Client {
    /// Create a client for the resolved peer address.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Set the delay between attempts.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// The peer address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Connect and pump until `cancel` fires.
    pub async fn run<D: DevicePort>(&self, device: &mut D, cancel: CancellationToken) -> Result<()> {
        let mut attempts: u64 = 0;

        loop {
            attempts += 1;
            tracing::debug!(addr = %self.addr, attempts, "connecting");

            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                res = TcpStream::connect(self.addr) => res,
            };

            match connected {
                Ok(stream) => {
                    tracing::info!(addr = %self.addr, attempts, "connected");
                    attempts = 0;
                    pump_connection(device, stream, self.addr, &cancel).await;
                }
                Err(e) => {
                    tracing::warn!(addr = %self.addr, attempts, error = %e, "connect failed");
                }
            }

            if !backoff(self.retry_delay, &cancel).await {
                break;
            }
        }

        tracing::info!(addr = %self.addr, "client stopped");
        Ok(())
    }
}
