//! Simulated temperature probe.
//!
//! Reads from static atomics so tests and the host build can inject a
//! temperature or a bus fault. Also the fallback backend when the fitted
//! hardware is not available on the current target.

use core::sync::atomic::{AtomicBool, AtomicI32, Ordering};

use crate::app::ports::TemperatureProbe;
use crate::error::SensorError;

/// Injected temperature in hundredths of a degree.
static SIM_TEMP_X100: AtomicI32 = AtomicI32::new(2000);
static SIM_FAULT: AtomicBool = AtomicBool::new(false);

pub fn sim_set_temperature(celsius: f32) {
    SIM_TEMP_X100.store((celsius * 100.0).round() as i32, Ordering::Relaxed);
}

/// Make every subsequent read fail until cleared.
pub fn sim_set_fault(fault: bool) {
    SIM_FAULT.store(fault, Ordering::Relaxed);
}

#[derive(Debug, Default)]
pub struct SimulatedProbe;

impl TemperatureProbe for SimulatedProbe {
    fn read_celsius(&mut self) -> Result<f32, SensorError> {
        if SIM_FAULT.load(Ordering::Relaxed) {
            return Err(SensorError::NotPresent);
        }
        Ok(SIM_TEMP_X100.load(Ordering::Relaxed) as f32 / 100.0)
    }
}
