//! Ethernet over TCP.
//!
//! This crate tunnels raw Ethernet frames read from a TAP interface across a
//! single TCP connection to a peer running the same software, which injects
//! them into its own TAP interface. The two hosts (or network namespaces)
//! then appear to share one Layer-2 segment.
//!
//! # Overview
//!
//! - [`frame`] - length-prefixed framing (4-byte big-endian header)
//! - [`stream`] - all-or-nothing reads and writes on a byte stream
//! - [`port`] - the [`DevicePort`] abstraction and an in-memory port
//! - [`tap`] - Linux TAP devices
//! - [`pump`] - the loop moving frames between a device and a connection
//! - [`tunnel`] - server (accept loop) and client (connect/retry loop)
//!
//! # Example
//!
//! ```ignore
//! use eotcp::tap::TapDevice;
//! use eotcp::tunnel::{self, Role, TunnelConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> eotcp::Result<()> {
//!     let mut tap = TapDevice::builder().name("tap0").create()?;
//!     let config = TunnelConfig::new(Role::Client, "192.0.2.1");
//!
//!     tunnel::run(&config, &mut tap, CancellationToken::new()).await
//! }
//! ```

pub mod error;
pub mod frame;
pub mod port;
pub mod pump;
pub mod stream;
pub mod tap;
pub mod tunnel;

pub use error::{Error, Result};
pub use frame::MAX_FRAME;
pub use port::DevicePort;
pub use pump::{Pump, PumpStats, Step};
