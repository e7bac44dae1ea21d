//! Sensor subsystem: temperature backends and the acquisition task.
//!
//! The fitted probe is chosen once at start-up from [`SensorKind`]; every
//! reading then goes through the outlier-rejecting [`SmoothingFilter`]
//! before it reaches the Controller.

#[cfg(target_os = "espidf")]
pub mod onewire;
pub mod sht3x;
pub mod simulated;
pub mod smooth;

use core::time::Duration;

use log::{debug, info, warn};

use crate::app::events::ControllerMessage;
use crate::app::ports::{Outbox, TemperatureProbe};
use crate::config::{SensorConfig, SensorKind};
use crate::error::SensorError;
use crate::queue::Queue;

use simulated::SimulatedProbe;
use smooth::SmoothingFilter;

/// The closed set of temperature backends.
pub enum SensorBackend {
    Simulated(SimulatedProbe),
    #[cfg(target_os = "espidf")]
    OneWireDigital(onewire::Ds18b20Probe),
    #[cfg(target_os = "espidf")]
    I2CHumidityTemp(
        sht3x::Sht3x<esp_idf_hal::i2c::I2cDriver<'static>, esp_idf_hal::delay::FreeRtos>,
    ),
}

impl SensorBackend {
    pub fn kind(&self) -> SensorKind {
        match self {
            Self::Simulated(_) => SensorKind::Simulated,
            #[cfg(target_os = "espidf")]
            Self::OneWireDigital(_) => SensorKind::OneWireDigital,
            #[cfg(target_os = "espidf")]
            Self::I2CHumidityTemp(_) => SensorKind::I2CHumidityTemp,
        }
    }

    /// Backend used when `requested` cannot be opened on this target.
    pub fn fallback(requested: SensorKind) -> Self {
        if requested != SensorKind::Simulated {
            warn!("Sensor: {:?} unavailable, using simulated probe", requested);
        }
        Self::Simulated(SimulatedProbe)
    }

    /// Open the configured probe, falling back to the simulated one when
    /// the hardware does not come up.
    #[cfg(target_os = "espidf")]
    pub fn open(cfg: &SensorConfig, i2c: esp_idf_hal::i2c::I2C0) -> Self {
        use esp_idf_hal::gpio::AnyIOPin;

        let opened = match cfg.backend {
            SensorKind::Simulated => return Self::Simulated(SimulatedProbe),
            SensorKind::OneWireDigital => {
                // SAFETY: the pin comes from config and nothing else drives it.
                let pin = unsafe { AnyIOPin::new(cfg.onewire_gpio) };
                onewire::Ds18b20Probe::new(pin).map(Self::OneWireDigital)
            }
            SensorKind::I2CHumidityTemp => open_sht3x(cfg, i2c).map(Self::I2CHumidityTemp),
        };
        opened.unwrap_or_else(|e| {
            warn!("Sensor: {:?} failed to open ({})", cfg.backend, e);
            Self::fallback(cfg.backend)
        })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn open(cfg: &SensorConfig) -> Self {
        Self::fallback(cfg.backend)
    }
}

#[cfg(target_os = "espidf")]
fn open_sht3x(
    cfg: &SensorConfig,
    i2c: esp_idf_hal::i2c::I2C0,
) -> crate::error::Result<
    sht3x::Sht3x<esp_idf_hal::i2c::I2cDriver<'static>, esp_idf_hal::delay::FreeRtos>,
> {
    use esp_idf_hal::gpio::AnyIOPin;
    use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
    use esp_idf_hal::units::Hertz;

    // SAFETY: bus pins come from config and are reserved for the sensor.
    let (sda, scl) = unsafe { (AnyIOPin::new(cfg.i2c_sda_gpio), AnyIOPin::new(cfg.i2c_scl_gpio)) };
    let conf = I2cConfig::new().baudrate(Hertz(crate::pins::I2C_FREQ_HZ));
    let bus = I2cDriver::new(i2c, sda, scl, &conf)
        .map_err(|_| crate::error::Error::Init("i2c bus"))?;
    info!("Sensor: SHT3x at 0x{:02x}", cfg.i2c_address);
    Ok(sht3x::Sht3x::new(bus, esp_idf_hal::delay::FreeRtos, cfg.i2c_address))
}

impl TemperatureProbe for SensorBackend {
    fn read_celsius(&mut self) -> Result<f32, SensorError> {
        match self {
            Self::Simulated(p) => p.read_celsius(),
            #[cfg(target_os = "espidf")]
            Self::OneWireDigital(p) => p.read_celsius(),
            #[cfg(target_os = "espidf")]
            Self::I2CHumidityTemp(p) => p.read_celsius(),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Sampling
// ───────────────────────────────────────────────────────────────

/// Turns raw probe reads into `SensorTemperature` messages.
pub struct TemperatureSampler {
    filter: SmoothingFilter,
}

impl TemperatureSampler {
    pub fn new(max_deviation: i32) -> Self {
        Self {
            filter: SmoothingFilter::new(max_deviation),
        }
    }

    /// Read the probe once. A failed read reports the last smoothed value
    /// as invalid and leaves the filter untouched.
    pub fn sample(&mut self, probe: &mut impl TemperatureProbe) -> ControllerMessage {
        match probe.read_celsius() {
            Ok(celsius) => {
                let raw_x10 = (celsius * 10.0).round() as i32;
                let smoothed = self.filter.push(raw_x10);
                debug!("Sensor: raw {} → {:?}", raw_x10, smoothed);
                ControllerMessage::SensorTemperature {
                    value_x10: clamp_x10(self.filter.last_value()),
                    valid: smoothed.is_some(),
                }
            }
            Err(e) => {
                warn!("Sensor: read failed: {}", e);
                ControllerMessage::SensorTemperature {
                    value_x10: clamp_x10(self.filter.last_value()),
                    valid: false,
                }
            }
        }
    }
}

fn clamp_x10(v: i32) -> i16 {
    v.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

/// Sensor task body.
pub fn run<const N: usize>(
    mut backend: SensorBackend,
    mut sampler: TemperatureSampler,
    interval: Duration,
    mut controller: &Queue<ControllerMessage, N>,
) -> ! {
    info!("Sensor: task started, {:?} every {:?}", backend.kind(), interval);
    loop {
        let msg = sampler.sample(&mut backend);
        controller.deliver(msg);
        std::thread::sleep(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smooth::WINDOW;

    struct Scripted(Vec<Result<f32, SensorError>>);

    impl TemperatureProbe for Scripted {
        fn read_celsius(&mut self) -> Result<f32, SensorError> {
            self.0.remove(0)
        }
    }

    fn temperature(msg: &ControllerMessage) -> (i16, bool) {
        match msg {
            ControllerMessage::SensorTemperature { value_x10, valid } => (*value_x10, *valid),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn invalid_until_window_fills() {
        let mut probe = Scripted(vec![Ok(18.4); WINDOW]);
        let mut s = TemperatureSampler::new(100);
        for _ in 0..WINDOW - 1 {
            assert!(!temperature(&s.sample(&mut probe)).1);
        }
        assert_eq!(temperature(&s.sample(&mut probe)), (184, true));
    }

    #[test]
    fn read_error_keeps_last_value_but_invalid() {
        let mut reads = vec![Ok(20.0); WINDOW];
        reads.push(Err(SensorError::BusError));
        let mut probe = Scripted(reads);
        let mut s = TemperatureSampler::new(100);
        for _ in 0..WINDOW {
            s.sample(&mut probe);
        }
        assert_eq!(temperature(&s.sample(&mut probe)), (200, false));
    }

    #[test]
    fn fallback_is_simulated() {
        let b = SensorBackend::fallback(SensorKind::OneWireDigital);
        assert_eq!(b.kind(), SensorKind::Simulated);
    }
}
