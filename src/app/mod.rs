//! Application core: the state machines and the message router.
//!
//! Everything here is driven by messages and port traits defined in
//! [`ports`]; no module touches hardware or another task's state, which
//! keeps every machine testable on the host with recording mocks.

pub mod actuators;
pub mod commands;
pub mod controller;
pub mod events;
pub mod hydrometer;
pub mod ports;
pub mod wifi;
