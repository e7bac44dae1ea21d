//! Sensirion SHT3x humidity/temperature sensor on I2C.
//!
//! Single-shot measurement, high repeatability, clock stretching disabled.
//! Each 16-bit word in the answer is followed by a CRC-8 (poly 0x31,
//! init 0xFF) that is checked before the value is trusted.

use crc::{Crc, CRC_8_NRSC_5};
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::app::ports::TemperatureProbe;
use crate::error::SensorError;

const CMD_SINGLE_SHOT_HIGH: [u8; 2] = [0x24, 0x00];
/// Worst-case high-repeatability measurement duration.
const MEASUREMENT_MS: u32 = 16;

const SENSIRION_CRC: Crc<u8> = Crc::<u8>::new(&CRC_8_NRSC_5);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub celsius: f32,
    pub humidity_percent: f32,
}

pub struct Sht3x<I, D> {
    i2c: I,
    delay: D,
    address: u8,
}

impl<I: I2c, D: DelayNs> Sht3x<I, D> {
    pub fn new(i2c: I, delay: D, address: u8) -> Self {
        Self { i2c, delay, address }
    }

    pub fn measure(&mut self) -> Result<Measurement, SensorError> {
        self.i2c
            .write(self.address, &CMD_SINGLE_SHOT_HIGH)
            .map_err(|_| SensorError::NotPresent)?;
        self.delay.delay_ms(MEASUREMENT_MS);

        let mut buf = [0u8; 6];
        self.i2c
            .read(self.address, &mut buf)
            .map_err(|_| SensorError::BusError)?;

        let raw_t = checked_word(&buf[0..3])?;
        let raw_rh = checked_word(&buf[3..6])?;

        Ok(Measurement {
            celsius: -45.0 + 175.0 * f32::from(raw_t) / 65535.0,
            humidity_percent: 100.0 * f32::from(raw_rh) / 65535.0,
        })
    }

    pub fn release(self) -> (I, D) {
        (self.i2c, self.delay)
    }
}

impl<I: I2c, D: DelayNs> TemperatureProbe for Sht3x<I, D> {
    fn read_celsius(&mut self) -> Result<f32, SensorError> {
        self.measure().map(|m| m.celsius)
    }
}

fn checked_word(chunk: &[u8]) -> Result<u16, SensorError> {
    if SENSIRION_CRC.checksum(&chunk[..2]) != chunk[2] {
        return Err(SensorError::CrcMismatch);
    }
    Ok(u16::from_be_bytes([chunk[0], chunk[1]]))
}
