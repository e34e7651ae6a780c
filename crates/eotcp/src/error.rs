//! Error types for tunnel operations.

use std::io;

use crate::tap;

/// Result type for tunnel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a tunnel.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The peer or bind address could not be resolved.
    #[error("cannot resolve {address}: {source}")]
    Resolve {
        /// The address as given by the caller.
        address: String,
        /// The underlying error.
        source: io::Error,
    },

    /// The listening socket could not be bound.
    #[error("cannot bind {address}: {source}")]
    Bind {
        /// The address we tried to bind.
        address: String,
        /// The underlying error.
        source: io::Error,
    },

    /// I/O error on the connection.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// The peer announced a frame larger than we accept.
    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge {
        /// The announced length.
        len: u32,
        /// The maximum accepted length.
        max: usize,
    },

    /// The device failed to deliver or accept a frame.
    #[error("device error: {0}")]
    Device(#[source] io::Error),

    /// The TAP device could not be created.
    #[error(transparent)]
    Tap(#[from] tap::Error),
}

impl Error {
    /// Create a device error.
    pub fn device(source: io::Error) -> Self {
        Error::Device(source)
    }

    /// Whether this error must stop the whole run rather than the current
    /// connection only.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Resolve { .. } | Error::Bind { .. } | Error::Tap(_)
        )
    }

    /// Whether this error is an orderly shutdown by the peer.
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, Error::ConnectionClosed)
    }
}
