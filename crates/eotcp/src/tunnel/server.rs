//! Server side: accept one peer at a time.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket};
use tokio_util::sync::CancellationToken;

use super::{DEFAULT_RETRY_DELAY, backoff, pump_connection};
use crate::error::{Error, Result};
use crate::port::DevicePort;

/// Listen backlog. Peers beyond the one being served wait here.
const BACKLOG: u32 = 1;

/// Accept loop serving a single peer at a time.
///
/// ```text
/// Listening ──accept──► Pumping ──connection ends──► Listening
///     └──────────── shutdown ──────────► Stopped
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    retry_delay: Duration,
}

impl Server {
    /// Bind and listen on `addr`.
    ///
    /// A bind failure is returned as [`Error::Bind`] and is not retried.
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let bind_err = |source: std::io::Error| Error::Bind {
            address: addr.to_string(),
            source,
        };

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_err)?;

        socket.bind(addr).map_err(bind_err)?;
        let listener = socket.listen(BACKLOG).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        tracing::info!(addr = %local_addr, "listening");

        Ok(Self {
            listener,
            local_addr,
            retry_delay: DEFAULT_RETRY_DELAY,
        })
    }

    /// Set the pause after a failed accept.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve peers one after another until `cancel` fires.
    pub async fn run<D: DevicePort>(&self, device: &mut D, cancel: CancellationToken) -> Result<()> {
        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => break,
                res = self.listener.accept() => res,
            };

            let (stream, peer) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    if !backoff(self.retry_delay, &cancel).await {
                        break;
                    }
                    continue;
                }
            };

            tracing::info!(%peer, "peer connected");
            pump_connection(device, stream, peer, &cancel).await;

            if cancel.is_cancelled() {
                break;
            }
        }

        tracing::info!(addr = %self.local_addr, "server stopped");
        Ok(())
    }
}
