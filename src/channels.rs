//! Task inboxes.
//!
//! One static queue per task. Producers hold no handles: they name the
//! inbox directly, and the owning task is the only receiver.
//!
//! ```text
//!  sensor ─────┐
//!  comms ──────┤                  ┌──▶ ACTUATORS
//!  wifi ───────┼──▶ CONTROLLER ───┼──▶ DISPLAY
//!  hydro ──────┤                  ├──▶ COMMS
//!  actuators ──┘                  ├──▶ WIFI
//!                                 └──▶ HYDRO
//! ```

use core::time::Duration;

use crate::app::commands::{ActuatorCommand, CommsRequest, HydroInput, WifiInput};
use crate::app::events::{ControllerMessage, DisplayMessage};
use crate::queue::Queue;

pub const CONTROLLER_CAPACITY: usize = 16;
pub const ACTUATORS_CAPACITY: usize = 5;
pub const DISPLAY_CAPACITY: usize = 16;
pub const COMMS_CAPACITY: usize = 4;
pub const WIFI_CAPACITY: usize = 8;
pub const HYDRO_CAPACITY: usize = 16;

/// Receive waits used by each owning task.
pub const CONTROLLER_WAIT: Duration = Duration::from_millis(10);
pub const DISPLAY_WAIT: Duration = Duration::from_millis(100);
pub const COMMS_WAIT: Duration = Duration::from_millis(100);
pub const WIFI_WAIT: Duration = Duration::from_millis(100);
pub const HYDRO_WAIT: Duration = Duration::from_millis(100);

pub static CONTROLLER: Queue<ControllerMessage, CONTROLLER_CAPACITY> = Queue::new("controller");
pub static ACTUATORS: Queue<ActuatorCommand, ACTUATORS_CAPACITY> = Queue::new("actuators");
pub static DISPLAY: Queue<DisplayMessage, DISPLAY_CAPACITY> = Queue::new("display");
pub static COMMS: Queue<CommsRequest, COMMS_CAPACITY> = Queue::new("comms");
pub static WIFI: Queue<WifiInput, WIFI_CAPACITY> = Queue::new("wifi");
pub static HYDRO: Queue<HydroInput, HYDRO_CAPACITY> = Queue::new("hydro");
