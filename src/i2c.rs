//! I2C bus abstraction and the Linux i2c-dev implementation

use crate::error::{AnalyzerError, Result};

/// Minimal register-oriented I2C master
pub trait I2cBus {
    /// Write `bytes` to the device at `address` (START ... STOP)
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<()>;

    /// Write `bytes`, then read `buffer.len()` bytes back
    fn write_read(&mut self, address: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<()>;
}

#[cfg(target_os = "linux")]
pub use linux::LinuxI2c;

#[cfg(target_os = "linux")]
mod linux {
    use super::*;
    use std::fs::{File, OpenOptions};
    use std::io::{Read, Write};
    use std::os::unix::io::AsRawFd;
    use std::path::Path;

    /// ioctl request selecting the slave address for subsequent transfers
    const I2C_SLAVE: u64 = 0x0703;

    /// `/dev/i2c-N` character device
    pub struct LinuxI2c {
        file: File,
        current_address: Option<u8>,
    }

    impl LinuxI2c {
        /// Open bus number `bus` (e.g. 1 for `/dev/i2c-1`)
        pub fn open(bus: u32) -> Result<Self> {
            Self::open_path(format!("/dev/i2c-{}", bus))
        }

        pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(path.as_ref())
                .map_err(|e| {
                    AnalyzerError::Communication(format!(
                        "Failed to open {}: {}",
                        path.as_ref().display(),
                        e
                    ))
                })?;
            Ok(Self {
                file,
                current_address: None,
            })
        }

        fn select(&mut self, address: u8) -> Result<()> {
            if self.current_address == Some(address) {
                return Ok(());
            }
            let status = unsafe {
                libc::ioctl(
                    self.file.as_raw_fd(),
                    I2C_SLAVE as _,
                    address as libc::c_ulong,
                )
            };
            if status < 0 {
                return Err(AnalyzerError::Communication(format!(
                    "Failed to select I2C address 0x{:02X}: {}",
                    address,
                    std::io::Error::last_os_error()
                )));
            }
            self.current_address = Some(address);
            Ok(())
        }
    }

    impl I2cBus for LinuxI2c {
        fn write(&mut self, address: u8, bytes: &[u8]) -> Result<()> {
            self.select(address)?;
            let written = self
                .file
                .write(bytes)
                .map_err(|e| AnalyzerError::Communication(format!("I2C write failed: {}", e)))?;
            if written != bytes.len() {
                return Err(AnalyzerError::TransferError {
                    expected: bytes.len(),
                    actual: written,
                });
            }
            Ok(())
        }

        fn write_read(&mut self, address: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<()> {
            self.write(address, bytes)?;
            let read = self
                .file
                .read(buffer)
                .map_err(|e| AnalyzerError::Communication(format!("I2C read failed: {}", e)))?;
            if read != buffer.len() {
                return Err(AnalyzerError::TransferError {
                    expected: buffer.len(),
                    actual: read,
                });
            }
            Ok(())
        }
    }
}
