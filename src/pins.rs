//! GPIO / peripheral pin assignments for the BrewBrick main board.
//!
//! Single source of truth for the defaults in [`crate::config`]; a config
//! file may still move a relay or bus to another pin.

// ---------------------------------------------------------------------------
// Relay outputs (open-drain relay board, active low)
// ---------------------------------------------------------------------------

/// Relay 0, "Cool": compressor of the fermentation fridge.
pub const RELAY0_GPIO: i32 = 17;
/// Relay 1, "Heat": heating mat or belt.
pub const RELAY1_GPIO: i32 = 4;

// ---------------------------------------------------------------------------
// Temperature sensors
// ---------------------------------------------------------------------------

/// DS18B20 data line, 4.7 kΩ pull-up to 3V3.
pub const ONEWIRE_GPIO: i32 = 16;

pub const I2C_SDA_GPIO: i32 = 21;
pub const I2C_SCL_GPIO: i32 = 22;
/// SHT3x with ADDR tied low.
pub const SHT3X_I2C_ADDR: u8 = 0x44;
/// I2C bus clock for the humidity/temperature sensor.
pub const I2C_FREQ_HZ: u32 = 100_000;
