//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that drives one task's state machine
//! against the recording mocks in `mock_hw`. All tests run on the host
//! (x86_64) with no real hardware required.

#![cfg(not(target_os = "espidf"))]

mod actuator_tests;
mod controller_tests;
mod hydrometer_tests;
mod mock_hw;
mod queue_tests;
mod wifi_tests;
