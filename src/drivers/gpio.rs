//! Push-pull GPIO outputs via raw ESP-IDF sys calls.
//!
//! The host build keeps every pin level in one bitmap so tests and the
//! simulation can observe what the firmware drove.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

use crate::error::ActuatorError;

/// Highest GPIO number on the ESP32.
pub const MAX_GPIO: i32 = 39;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioError {
    InvalidPin(i32),
    ConfigFailed(i32),
}

impl core::fmt::Display for GpioError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidPin(pin) => write!(f, "GPIO{} is not a valid output", pin),
            Self::ConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
        }
    }
}

fn check_pin(pin: i32) -> Result<(), GpioError> {
    if (0..=MAX_GPIO).contains(&pin) {
        Ok(())
    } else {
        Err(GpioError::InvalidPin(pin))
    }
}

/// Configure `pin` as a push-pull output and drive it to `initial`.
#[cfg(target_os = "espidf")]
pub fn configure_output(pin: i32, initial: bool) -> Result<(), GpioError> {
    check_pin(pin)?;
    let cfg = gpio_config_t {
        pin_bit_mask: 1u64 << pin,
        mode: gpio_mode_t_GPIO_MODE_OUTPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
    };
    // SAFETY: plain register configuration of a validated pin number.
    let ret = unsafe { gpio_config(&cfg) };
    if ret != ESP_OK {
        return Err(GpioError::ConfigFailed(ret));
    }
    unsafe { gpio_set_level(pin, u32::from(initial)) };
    log::info!("GPIO{}: output, initial {}", pin, if initial { "high" } else { "low" });
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn write(pin: i32, high: bool) -> Result<(), ActuatorError> {
    // SAFETY: the pin was configured by configure_output().
    let ret = unsafe { gpio_set_level(pin, u32::from(high)) };
    if ret == ESP_OK {
        Ok(())
    } else {
        Err(ActuatorError::GpioWriteFailed)
    }
}

// ── Simulation ────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
static SIM_LEVELS: core::sync::atomic::AtomicU64 = core::sync::atomic::AtomicU64::new(0);

#[cfg(not(target_os = "espidf"))]
pub fn configure_output(pin: i32, initial: bool) -> Result<(), GpioError> {
    check_pin(pin)?;
    log::info!("GPIO{}(sim): output, initial {}", pin, if initial { "high" } else { "low" });
    set_sim_level(pin, initial);
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn write(pin: i32, high: bool) -> Result<(), ActuatorError> {
    check_pin(pin).map_err(|_| ActuatorError::GpioWriteFailed)?;
    set_sim_level(pin, high);
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
fn set_sim_level(pin: i32, high: bool) {
    use core::sync::atomic::Ordering;
    let bit = 1u64 << pin;
    if high {
        SIM_LEVELS.fetch_or(bit, Ordering::Relaxed);
    } else {
        SIM_LEVELS.fetch_and(!bit, Ordering::Relaxed);
    }
}

/// Last level driven onto `pin` by the simulation.
#[cfg(not(target_os = "espidf"))]
pub fn sim_level(pin: i32) -> bool {
    (0..=MAX_GPIO).contains(&pin)
        && SIM_LEVELS.load(core::sync::atomic::Ordering::Relaxed) & (1u64 << pin) != 0
}
