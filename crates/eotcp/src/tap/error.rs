//! Error types for TAP device creation.

use std::io;

/// Result type for TAP device creation.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while creating a TAP device.
///
/// All of them are fatal: without a device there is nothing to tunnel.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The clone device could not be opened (missing module, no permission).
    #[error("cannot open {path}: {source}")]
    Open {
        /// Path of the clone device.
        path: &'static str,
        /// The underlying error.
        source: io::Error,
    },

    /// Interface names are limited to `IFNAMSIZ - 1` bytes.
    #[error("device name too long: {name} ({len} > 15 characters)")]
    NameTooLong {
        /// The rejected name.
        name: String,
        /// Its length in bytes.
        len: usize,
    },

    /// Empty name, or one containing `/`, NUL or whitespace.
    #[error("invalid device name: {0:?}")]
    InvalidName(String),

    /// The kernel refused to configure the device.
    #[error("ioctl {name} failed: {source}")]
    Ioctl {
        /// The ioctl name.
        name: &'static str,
        /// The underlying error.
        source: io::Error,
    },

    /// The descriptor could not be registered with the async reactor.
    #[error("cannot register {device} with the reactor: {source}")]
    Register {
        /// Name of the created device.
        device: String,
        /// The underlying error.
        source: io::Error,
    },
}

impl Error {
    /// Create an ioctl error from the last OS error.
    pub(crate) fn last_ioctl(name: &'static str) -> Self {
        Error::Ioctl {
            name,
            source: io::Error::last_os_error(),
        }
    }
}
