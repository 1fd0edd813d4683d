//! Linux `i2c-dev` register bus.
//!
//! Opens `/dev/i2c-N`, binds the file descriptor to the puppet board's 7-bit
//! address with the `I2C_SLAVE` ioctl and performs plain `write`/`read`
//! transfers: a register read is a one-byte write of the register number
//! followed by a one-byte read.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::path::PathBuf;

use riddlefish_types::FishError;
use tracing::debug;

use crate::bus::RegisterBus;

/// `I2C_SLAVE` request number from `<linux/i2c-dev.h>`.
const I2C_SLAVE: u64 = 0x0703;

/// Register bus backed by a Linux `i2c-dev` character device.
#[derive(Debug)]
pub struct LinuxI2cBus {
    path: PathBuf,
    address: u16,
    file: File,
}

impl LinuxI2cBus {
    /// Open bus `bus` and bind it to `address`.
    ///
    /// # Errors
    ///
    /// Returns [`FishError::HardwareFault`] if the device node cannot be
    /// opened or the address cannot be selected.
    pub fn open(bus: u8, address: u16) -> Result<Self, FishError> {
        let path = PathBuf::from(format!("/dev/i2c-{bus}"));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| fault(&path, format!("open failed: {e}")))?;

        // SAFETY: the fd is owned by `file` and stays open for the call;
        // I2C_SLAVE takes the address by value.
        let rc = unsafe { libc::ioctl(file.as_raw_fd(), I2C_SLAVE as _, address as libc::c_ulong) };
        if rc < 0 {
            return Err(fault(
                &path,
                format!(
                    "cannot select address {address:#04x}: {}",
                    std::io::Error::last_os_error()
                ),
            ));
        }

        debug!(path = %path.display(), address, "i2c bus opened");
        Ok(Self {
            path,
            address,
            file,
        })
    }

    pub fn address(&self) -> u16 {
        self.address
    }
}

impl RegisterBus for LinuxI2cBus {
    fn read_register(&mut self, reg: u8) -> Result<u8, FishError> {
        self.file
            .write_all(&[reg])
            .map_err(|e| fault(&self.path, format!("select register {reg:#04x}: {e}")))?;
        let mut buf = [0u8; 1];
        self.file
            .read_exact(&mut buf)
            .map_err(|e| fault(&self.path, format!("read register {reg:#04x}: {e}")))?;
        Ok(buf[0])
    }

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), FishError> {
        self.file
            .write_all(&[reg, value])
            .map_err(|e| fault(&self.path, format!("write register {reg:#04x}: {e}")))
    }
}

fn fault(path: &std::path::Path, details: String) -> FishError {
    FishError::HardwareFault {
        component: path.display().to_string(),
        details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_bus_is_a_hardware_fault() {
        // Bus numbers this high never exist on real boards.
        let err = LinuxI2cBus::open(250, 0x08).unwrap_err();
        match err {
            FishError::HardwareFault { component, .. } => {
                assert_eq!(component, "/dev/i2c-250");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
