//! Connection lifecycle.
//!
//! The tunnel keeps a [`Pump`] fed with a live TCP connection. One side runs
//! a [`Server`], which accepts a single peer at a time; the other runs a
//! [`Client`], which connects and reconnects after a fixed delay whenever
//! the connection is lost.
//!
//! Only startup failures (address resolution, bind) are returned to the
//! caller. Everything that goes wrong on a connection is logged and answered
//! by accepting or connecting again.
//!
//! # Example
//!
//! ```ignore
//! use eotcp::tunnel::{self, Role, TunnelConfig};
//!
//! let config = TunnelConfig::new(Role::Server, "0.0.0.0").port(4242);
//! tunnel::run(&config, &mut device, cancel).await?;
//! ```

mod client;
mod server;

pub use client::Client;
pub use server::Server;

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::port::DevicePort;
use crate::pump::Pump;

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 4242;

/// Default delay between client connection attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Which end of the tunnel this process is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Connect to a listening peer, retrying until it is reachable.
    Client,
    /// Listen and serve one peer at a time.
    Server,
}

impl Role {
    /// Get the role name.
    pub fn name(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Server => "server",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tunnel endpoint configuration.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// Client or server.
    pub role: Role,
    /// Peer address (client) or bind address (server).
    pub address: String,
    /// TCP port.
    pub port: u16,
    /// Delay between client attempts, and after a failed accept.
    pub retry_delay: Duration,
}

impl TunnelConfig {
    /// Create a configuration with the default port and retry delay.
    pub fn new(role: Role, address: impl Into<String>) -> Self {
        Self {
            role,
            address: address.into(),
            port: DEFAULT_PORT,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Set the TCP port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the retry delay.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

/// Resolve `address` and `port` to a socket address.
///
/// IPv4 results are preferred; an IPv6 result is used only when nothing else
/// is available.
pub async fn resolve(address: &str, port: u16) -> Result<SocketAddr> {
    let resolve_err = |source: io::Error| Error::Resolve {
        address: format!("{}:{}", address, port),
        source,
    };

    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((address, port))
        .await
        .map_err(resolve_err)?
        .collect();

    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| resolve_err(io::Error::new(io::ErrorKind::NotFound, "no addresses")))
}

/// Run the tunnel described by `config` until `cancel` fires.
///
/// Returns an error only for startup failures.
pub async fn run<D: DevicePort>(
    config: &TunnelConfig,
    device: &mut D,
    cancel: CancellationToken,
) -> Result<()> {
    let addr = resolve(&config.address, config.port).await?;
    tracing::info!(role = %config.role, %addr, device = device.name(), "starting tunnel");

    match config.role {
        Role::Server => {
            Server::bind(addr)?
                .retry_delay(config.retry_delay)
                .run(device, cancel)
                .await
        }
        Role::Client => {
            Client::new(addr)
                .retry_delay(config.retry_delay)
                .run(device, cancel)
                .await
        }
    }
}

/// Pump frames over `stream` until it dies or shutdown is requested.
///
/// Errors end the connection and are only logged.
async fn pump_connection<D: DevicePort>(
    device: &mut D,
    stream: TcpStream,
    peer: SocketAddr,
    cancel: &CancellationToken,
) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(%peer, error = %e, "cannot set TCP_NODELAY");
    }

    let mut pump = Pump::new(device, stream, cancel.clone());
    let result = pump.run().await;
    let stats = pump.stats();

    match result {
        Ok(()) => tracing::info!(%peer, ?stats, "connection closed on shutdown"),
        Err(Error::ConnectionClosed) => tracing::info!(%peer, ?stats, "peer disconnected"),
        Err(e @ Error::Device(_)) => {
            tracing::error!(%peer, ?stats, error = %e, "device failed, dropping connection")
        }
        Err(e) => tracing::warn!(%peer, ?stats, error = %e, "connection lost"),
    }
}

/// Sleep for `delay` unless shutdown comes first.
///
/// Returns `false` if shutdown was requested.
async fn backoff(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
