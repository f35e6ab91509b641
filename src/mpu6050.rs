//! MPU6050 accelerometer reader over a generic I2C bus
//!
//! Only what the vibration pipeline needs: wake the device, confirm its
//! identity, and read the three accelerometer axes at the default ±2g range.

use crate::error::{AnalyzerError, Result};
use crate::i2c::I2cBus;
use std::time::Duration;

/// Default I2C address (AD0 low)
pub const MPU6050_ADDRESS: u8 = 0x68;

// Register addresses
const REG_WHO_AM_I: u8 = 0x75;
const REG_PWR_MGMT_1: u8 = 0x6B;
const REG_ACCEL_XOUT_H: u8 = 0x3B;

// Expected WHO_AM_I value
const WHO_AM_I_VALUE: u8 = 0x68;

/// LSB per g at the ±2g range
const ACCEL_SCALE: f32 = 16384.0;

/// Raw accelerometer reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccelSample {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl AccelSample {
    /// Parse the six big-endian bytes starting at ACCEL_XOUT_H
    pub fn from_be_bytes(data: &[u8; 6]) -> Self {
        Self {
            x: i16::from_be_bytes([data[0], data[1]]),
            y: i16::from_be_bytes([data[2], data[3]]),
            z: i16::from_be_bytes([data[4], data[5]]),
        }
    }

    /// Convert raw values to g (assuming ±2g range)
    pub fn to_g(&self) -> (f32, f32, f32) {
        (
            self.x as f32 / ACCEL_SCALE,
            self.y as f32 / ACCEL_SCALE,
            self.z as f32 / ACCEL_SCALE,
        )
    }

    /// Vector magnitude in g
    pub fn magnitude_g(&self) -> f32 {
        let (x, y, z) = self.to_g();
        (x * x + y * y + z * z).sqrt()
    }
}

/// MPU6050 on an I2C bus
pub struct Mpu6050<B: I2cBus> {
    bus: B,
    address: u8,
}

impl<B: I2cBus> Mpu6050<B> {
    /// Wake the sensor and verify its identity
    ///
    /// # Arguments
    /// * `bus` - Bus the device is attached to
    /// * `address` - 7-bit device address (usually [`MPU6050_ADDRESS`])
    pub fn new(bus: B, address: u8) -> Result<Self> {
        let mut sensor = Self { bus, address };
        sensor.init(Duration::from_millis(100))?;
        Ok(sensor)
    }

    fn init(&mut self, wake_delay: Duration) -> Result<()> {
        // Clear the sleep bit
        self.write_register(REG_PWR_MGMT_1, 0x00)?;
        if !wake_delay.is_zero() {
            std::thread::sleep(wake_delay);
        }

        let who_am_i = self.read_register(REG_WHO_AM_I)?;
        if who_am_i != WHO_AM_I_VALUE {
            return Err(AnalyzerError::InvalidDeviceId(who_am_i));
        }
        Ok(())
    }

    fn write_register(&mut self, reg: u8, value: u8) -> Result<()> {
        self.bus.write(self.address, &[reg, value])
    }

    fn read_register(&mut self, reg: u8) -> Result<u8> {
        let mut data = [0u8];
        self.bus.write_read(self.address, &[reg], &mut data)?;
        Ok(data[0])
    }

    /// Read the three accelerometer axes in one burst
    pub fn read_accel(&mut self) -> Result<AccelSample> {
        let mut data = [0u8; 6];
        self.bus.write_read(self.address, &[REG_ACCEL_XOUT_H], &mut data)?;
        Ok(AccelSample::from_be_bytes(&data))
    }

    /// Release the underlying bus
    pub fn into_inner(self) -> B {
        self.bus
    }

    #[cfg(test)]
    pub(crate) fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }
}
