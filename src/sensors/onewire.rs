//! DS18B20 one-wire temperature probe (ESP-IDF only).
//!
//! Open-drain GPIO with pull-up, 12-bit resolution. The probe address is
//! discovered by a bus search on first use and searched again after any
//! failed transaction, so a re-plugged probe comes back by itself.

use ds18b20::{Ds18b20, Resolution};
use esp_idf_hal::delay::Ets;
use esp_idf_hal::gpio::{AnyIOPin, InputOutput, PinDriver, Pull};
use log::{info, warn};
use one_wire_bus::{Address, OneWire};

use crate::app::ports::TemperatureProbe;
use crate::error::{Error, SensorError};

pub struct Ds18b20Probe {
    bus: OneWire<PinDriver<'static, AnyIOPin, InputOutput>>,
    address: Option<Address>,
    delay: Ets,
}

impl Ds18b20Probe {
    pub fn new(pin: AnyIOPin) -> crate::error::Result<Self> {
        let mut line =
            PinDriver::input_output_od(pin).map_err(|_| Error::Init("one-wire pin"))?;
        line.set_pull(Pull::Up).map_err(|_| Error::Init("one-wire pull-up"))?;
        line.set_high().map_err(|_| Error::Init("one-wire idle level"))?;
        let bus = OneWire::new(line).map_err(|_| Error::Init("one-wire bus"))?;

        let mut probe = Self { bus, address: None, delay: Ets };
        probe.search();
        Ok(probe)
    }

    fn search(&mut self) {
        self.address = self
            .bus
            .devices(false, &mut self.delay)
            .filter_map(Result::ok)
            .find(|a| a.family_code() == ds18b20::FAMILY_CODE);
        match self.address {
            Some(a) => info!("DS18B20: found probe {:?}", a),
            None => warn!("DS18B20: no probe on the bus"),
        }
    }

    fn read(&mut self, address: Address) -> Result<f32, SensorError> {
        let sensor = Ds18b20::new::<core::convert::Infallible>(address)
            .map_err(|_| SensorError::NotPresent)?;
        ds18b20::start_simultaneous_temp_measurement(&mut self.bus, &mut self.delay)
            .map_err(|_| SensorError::BusError)?;
        Resolution::Bits12.delay_for_measurement_time(&mut self.delay);
        let data = sensor
            .read_data(&mut self.bus, &mut self.delay)
            .map_err(|e| match e {
                one_wire_bus::OneWireError::CrcMismatch => SensorError::CrcMismatch,
                _ => SensorError::BusError,
            })?;
        if !(-55.0..=125.0).contains(&data.temperature) {
            return Err(SensorError::OutOfRange);
        }
        Ok(data.temperature)
    }
}

impl TemperatureProbe for Ds18b20Probe {
    fn read_celsius(&mut self) -> Result<f32, SensorError> {
        if self.address.is_none() {
            self.search();
        }
        let address = self.address.ok_or(SensorError::NotPresent)?;
        let result = self.read(address);
        if result.is_err() {
            self.address = None;
        }
        result
    }
}
