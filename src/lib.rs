//! BrewBrick firmware library.
//!
//! Exposes the task state machines, their adapters and the queue plumbing
//! for integration testing and the host simulation. All ESP-IDF-specific
//! code is guarded by `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

// Links the std time driver that the bounded queue waits run on.
#[cfg(not(target_os = "espidf"))]
use embassy_time as _;

pub mod app;
pub mod channels;
pub mod config;
pub mod error;
pub mod pins;
pub mod queue;
pub mod timer;

pub mod adapters;
pub mod drivers;
pub mod sensors;
