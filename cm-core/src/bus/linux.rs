//! Linux i2c-dev adapter
//!
//! Talks to `/dev/i2c-<N>` with the `I2C_SLAVE` and `I2C_SMBUS` ioctls.
//! Only the byte-data transaction type is used.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use super::{BusFault, SmbusAdapter};
use crate::constants::paths;
use crate::error::{CpldError, Result};

const I2C_SLAVE: libc::c_ulong = 0x0703;
const I2C_SLAVE_FORCE: libc::c_ulong = 0x0706;
const I2C_SMBUS: libc::c_ulong = 0x0720;

const I2C_SMBUS_WRITE: u8 = 0;
const I2C_SMBUS_READ: u8 = 1;
const I2C_SMBUS_BYTE_DATA: u32 = 2;

#[repr(C)]
#[allow(dead_code)]
union SmbusData {
    byte: u8,
    word: u16,
    block: [u8; 34],
}

#[repr(C)]
struct SmbusIoctlData {
    read_write: u8,
    command: u8,
    size: u32,
    data: *mut SmbusData,
}

struct Handle {
    file: File,
    selected: Option<u16>,
}

/// SMBus adapter backed by an i2c-dev character device
pub struct I2cDevAdapter {
    path: PathBuf,
    force: bool,
    handle: Mutex<Handle>,
}

impl I2cDevAdapter {
    /// Open `/dev/i2c-<bus>`
    ///
    /// With `force` the slave address is claimed even when a kernel driver
    /// is bound to it.
    pub fn open(bus: u32, force: bool) -> Result<Self> {
        let path = PathBuf::from(format!("{}{}", paths::I2C_DEV_PREFIX, bus));
        Self::open_path(&path, force)
    }

    pub fn open_path(path: &Path, force: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| CpldError::AdapterOpen {
                path: path.to_path_buf(),
                source,
            })?;
        debug!("Opened SMBus adapter {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            force,
            handle: Mutex::new(Handle {
                file,
                selected: None,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn transfer(
        &self,
        address: u16,
        read_write: u8,
        register: u8,
        data: &mut SmbusData,
    ) -> std::result::Result<(), BusFault> {
        let mut handle = self.handle.lock();
        let fd = handle.file.as_raw_fd();

        if handle.selected != Some(address) {
            let request = if self.force { I2C_SLAVE_FORCE } else { I2C_SLAVE };
            // SAFETY: fd is an open i2c-dev descriptor owned by `handle`, and
            // I2C_SLAVE takes the address by value.
            let rc = unsafe { libc::ioctl(fd, request as _, libc::c_ulong::from(address)) };
            if rc < 0 {
                handle.selected = None;
                return Err(fault_from_errno(io::Error::last_os_error()));
            }
            handle.selected = Some(address);
        }

        let mut args = SmbusIoctlData {
            read_write,
            command: register,
            size: I2C_SMBUS_BYTE_DATA,
            data: data as *mut SmbusData,
        };
        // SAFETY: `args` and the buffer it points to outlive the call, and the
        // layout matches struct i2c_smbus_ioctl_data.
        let rc = unsafe { libc::ioctl(fd, I2C_SMBUS as _, &mut args as *mut SmbusIoctlData) };
        if rc < 0 {
            return Err(fault_from_errno(io::Error::last_os_error()));
        }
        Ok(())
    }
}

impl SmbusAdapter for I2cDevAdapter {
    fn read_byte_data(&self, address: u16, register: u8) -> std::result::Result<u8, BusFault> {
        let mut data = SmbusData { block: [0; 34] };
        self.transfer(address, I2C_SMBUS_READ, register, &mut data)?;
        // SAFETY: every variant starts at offset 0 and the block was zeroed.
        Ok(unsafe { data.byte })
    }

    fn write_byte_data(
        &self,
        address: u16,
        register: u8,
        value: u8,
    ) -> std::result::Result<(), BusFault> {
        let mut data = SmbusData { byte: value };
        self.transfer(address, I2C_SMBUS_WRITE, register, &mut data)
    }
}

fn fault_from_errno(err: io::Error) -> BusFault {
    match err.raw_os_error() {
        Some(libc::ENXIO) | Some(libc::EREMOTEIO) => BusFault::Nack,
        Some(libc::ETIMEDOUT) | Some(libc::EAGAIN) => BusFault::Timeout,
        _ => BusFault::Io(err.to_string()),
    }
}
