//! TAP device implementation.

use super::TUN_DEVICE_PATH;
use super::error::{Error, Result};

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};

use tokio::io::unix::AsyncFd;

use crate::port::DevicePort;

// TUN/TAP ioctl constants
const TUNSETIFF: libc::c_ulong = 0x400454ca;
const TUNSETPERSIST: libc::c_ulong = 0x400454cb;

// TUN/TAP flags (from linux/if_tun.h)
/// TAP device (Layer 2).
const IFF_TAP: libc::c_short = 0x0002;
/// No protocol information.
const IFF_NO_PI: libc::c_short = 0x1000;

/// Builder for creating TAP devices.
#[derive(Debug, Clone, Default)]
pub struct TapDeviceBuilder {
    name: Option<String>,
    persistent: bool,
}

impl TapDeviceBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the device name.
    ///
    /// If not specified, the kernel will assign a name (tap0, tap1, etc.).
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the device name if one is given.
    pub fn name_opt(mut self, name: Option<impl Into<String>>) -> Self {
        self.name = name.map(Into::into);
        self
    }

    /// Keep the interface after the descriptor is closed.
    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    /// Create the TAP device.
    ///
    /// Frames are delivered without the packet-information prefix, exactly as
    /// they appear on the wire. The descriptor is registered with the tokio
    /// reactor, so this must run inside a runtime.
    pub fn create(self) -> Result<TapDevice> {
        if let Some(ref name) = self.name {
            validate_name(name)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(TUN_DEVICE_PATH)
            .map_err(|source| Error::Open {
                path: TUN_DEVICE_PATH,
                source,
            })?;

        let fd = file.as_raw_fd();

        // Build ifreq
        let mut ifr: libc::ifreq = unsafe { std::mem::zeroed() };
        ifr.ifr_ifru.ifru_flags = IFF_TAP | IFF_NO_PI;

        if let Some(ref name) = self.name {
            let name_bytes = name.as_bytes();
            // SAFETY: ifr_name is a fixed array of c_char, same layout as u8.
            let name_slice =
                unsafe { &mut *(&mut ifr.ifr_name as *mut [libc::c_char] as *mut [u8]) };
            name_slice[..name_bytes.len()].copy_from_slice(name_bytes);
        }

        // SAFETY: fd is an open /dev/net/tun descriptor and ifr outlives the
        // call. The kernel writes the assigned name back into ifr.
        let ret = unsafe { libc::ioctl(fd, TUNSETIFF, &mut ifr as *mut libc::ifreq) };
        if ret < 0 {
            return Err(Error::last_ioctl("TUNSETIFF"));
        }

        if self.persistent {
            let ret = unsafe { libc::ioctl(fd, TUNSETPERSIST, 1 as libc::c_int) };
            if ret < 0 {
                return Err(Error::last_ioctl("TUNSETPERSIST"));
            }
        }

        // The kernel fills in the name it picked.
        let name = unsafe {
            let name_slice = &*(&ifr.ifr_name as *const [libc::c_char] as *const [u8]);
            let len = name_slice
                .iter()
                .position(|&c| c == 0)
                .unwrap_or(name_slice.len());
            String::from_utf8_lossy(&name_slice[..len]).to_string()
        };

        let fd = AsyncFd::new(file).map_err(|source| Error::Register {
            device: name.clone(),
            source,
        })?;

        tracing::info!(device = %name, persistent = self.persistent, "TAP device ready");

        Ok(TapDevice {
            fd,
            name,
            persistent: self.persistent,
        })
    }
}

/// A TAP device.
///
/// Implements [`DevicePort`]: every read returns one Ethernet frame and every
/// write injects one.
pub struct TapDevice {
    fd: AsyncFd<File>,
    name: String,
    persistent: bool,
}

impl TapDevice {
    /// Create a new builder.
    pub fn builder() -> TapDeviceBuilder {
        TapDeviceBuilder::new()
    }

    /// Get the device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if the device is persistent.
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }
}

impl AsRawFd for TapDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl DevicePort for TapDevice {
    async fn read_frame(&mut self, buf: &mut [u8]) -> crate::Result<usize> {
        loop {
            let mut guard = self.fd.readable().await.map_err(crate::Error::device)?;
            match guard.try_io(|inner| inner.get_ref().read(buf)) {
                Ok(result) => return result.map_err(crate::Error::device),
                Err(_would_block) => continue,
            }
        }
    }

    async fn write_frame(&mut self, frame: &[u8]) -> crate::Result<()> {
        loop {
            let mut guard = self.fd.writable().await.map_err(crate::Error::device)?;
            match guard.try_io(|inner| inner.get_ref().write(frame)) {
                Ok(Ok(n)) if n == frame.len() => return Ok(()),
                Ok(Ok(n)) => {
                    return Err(crate::Error::device(io::Error::new(
                        io::ErrorKind::WriteZero,
                        format!("short write to {}: {} of {} bytes", self.name, n, frame.len()),
                    )));
                }
                Ok(Err(e)) => return Err(crate::Error::device(e)),
                Err(_would_block) => continue,
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Check that `name` is usable as an interface name.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidName("empty name".to_string()));
    }

    if name.len() > libc::IFNAMSIZ - 1 {
        return Err(Error::NameTooLong {
            name: name.to_string(),
            len: name.len(),
        });
    }

    if name.contains('/') || name.contains('\0') || name.chars().any(char::is_whitespace) {
        return Err(Error::InvalidName(name.to_string()));
    }

    Ok(())
}
