//! Raw bus transport.
//!
//! [`RawBus`] is the byte-exact seam between the engine and the wire.
//! Production uses [`DevI2cBus`] over a `/dev/i2c-*` character device;
//! tests substitute the software chip in [`crate::sim`].
//!
//! Transfers are never retried here. A short transfer is a hard
//! [`UpdateError::Bus`] — the paged layer above has no way to know what
//! state a partial write left the chip in.

use std::fs::{File, OpenOptions};
use std::os::fd::AsFd;
use std::path::Path;

use rustix::io::{read, write};

use crate::error::{Result, UpdateError};

/// Byte-exact transfer primitives against one bus.
///
/// `addr` is the 7-bit slave address of the target chip; implementations
/// serving a single chip may ignore it.
pub trait RawBus: Send {
    /// Write `data` to the slave in one transaction.
    fn bus_write(&mut self, addr: u8, data: &[u8]) -> Result<()>;

    /// Write `out` then read exactly `buf.len()` bytes back.
    fn bus_write_read(&mut self, addr: u8, out: &[u8], buf: &mut [u8]) -> Result<()>;
}

/// Linux `i2c-dev` transport.
///
/// The slave address is bound with the `I2C_SLAVE` ioctl before each
/// transfer that targets a different chip than the previous one.
pub struct DevI2cBus {
    file: File,
    path: String,
    bound: Option<u8>,
}

impl DevI2cBus {
    /// Open the given `/dev/i2c-*` device.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| UpdateError::bus(format!("open {}: {e}", path.display())))?;
        Ok(Self {
            file,
            path: path.display().to_string(),
            bound: None,
        })
    }

    fn bind(&mut self, addr: u8) -> Result<()> {
        if self.bound == Some(addr) {
            return Ok(());
        }
        // SAFETY: I2C_SLAVE takes a plain integer argument; the fd is a
        // valid open i2c-dev device for the lifetime of self.
        let rc = unsafe {
            libc::ioctl(
                std::os::fd::AsRawFd::as_raw_fd(&self.file),
                I2C_SLAVE,
                libc::c_ulong::from(addr),
            )
        };
        if rc < 0 {
            return Err(UpdateError::bus(format!(
                "{}: bind slave {addr:#04x}: {}",
                self.path,
                std::io::Error::last_os_error()
            )));
        }
        self.bound = Some(addr);
        Ok(())
    }
}

const I2C_SLAVE: libc::c_ulong = 0x0703;

impl RawBus for DevI2cBus {
    fn bus_write(&mut self, addr: u8, data: &[u8]) -> Result<()> {
        self.bind(addr)?;
        let n = write(self.file.as_fd(), data)
            .map_err(|e| UpdateError::bus(format!("{}: write: {e}", self.path)))?;
        if n != data.len() {
            return Err(UpdateError::bus(format!(
                "{}: short write ({n} of {})",
                self.path,
                data.len()
            )));
        }
        Ok(())
    }

    fn bus_write_read(&mut self, addr: u8, out: &[u8], buf: &mut [u8]) -> Result<()> {
        self.bus_write(addr, out)?;
        let n = read(self.file.as_fd(), buf)
            .map_err(|e| UpdateError::bus(format!("{}: read: {e}", self.path)))?;
        if n != buf.len() {
            return Err(UpdateError::bus(format!(
                "{}: short read ({n} of {})",
                self.path,
                buf.len()
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for DevI2cBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevI2cBus").field("path", &self.path).finish()
    }
}
