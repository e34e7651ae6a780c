//! Linux TAP devices.
//!
//! A TAP device is a virtual Ethernet interface whose "wire" is a file
//! descriptor: every `read` yields one Ethernet frame sent by the host, and
//! every `write` injects one frame into the host's network stack.
//!
//! ```ignore
//! use eotcp::tap::TapDevice;
//!
//! // Must be called from within a tokio runtime.
//! let tap = TapDevice::builder().name("tap0").create()?;
//! println!("Created device: {}", tap.name());
//! ```

mod device;
mod error;

pub use device::{TapDevice, TapDeviceBuilder};
pub use error::{Error, Result};

/// The path to the TUN/TAP clone device.
pub const TUN_DEVICE_PATH: &str = "/dev/net/tun";
