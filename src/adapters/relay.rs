//! GPIO relay adapter.
//!
//! Implements [`RelayPort`] over the pins named in the relay config. Pins
//! are configured as outputs at their inactive level before the actuator
//! task takes over.

use log::info;

use crate::app::ports::RelayPort;
use crate::config::{RelayConfig, RELAY_COUNT};
use crate::drivers::gpio::{self, GpioError};
use crate::error::ActuatorError;

pub struct GpioRelays {
    pins: [i32; RELAY_COUNT],
}

impl GpioRelays {
    pub fn new(relays: &[RelayConfig; RELAY_COUNT]) -> Result<Self, GpioError> {
        for r in relays {
            gpio::configure_output(r.gpio, r.active_level.level_for(false))?;
            info!("Relay: {} on GPIO{} ({:?} active)", r.label, r.gpio, r.active_level);
        }
        Ok(Self {
            pins: core::array::from_fn(|i| relays[i].gpio),
        })
    }

    pub fn pin(&self, id: u8) -> Option<i32> {
        self.pins.get(usize::from(id)).copied()
    }
}

impl RelayPort for GpioRelays {
    fn set_level(&mut self, id: u8, high: bool) -> Result<(), ActuatorError> {
        let pin = self.pin(id).ok_or(ActuatorError::UnknownRelay(id))?;
        gpio::write(pin, high)
    }
}
