//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter   | Implements    | Connects to                     |
//! |-----------|---------------|---------------------------------|
//! | `ble`     | BleCentral    | Bluedroid GAP/GATT client       |
//! | `cloud`   | HttpClient    | IoT / PRO / time HTTPS APIs     |
//! | `display` | DisplaySink   | Serial log output               |
//! | `relay`   | RelayPort     | ESP32 GPIO                      |
//! | `time`    | BootClock     | ESP32 high-resolution timer     |
//! | `wifi`    | WifiRadio     | ESP-IDF WiFi STA / soft-AP      |

pub mod ble;
pub mod cloud;
pub mod display;
pub mod relay;
pub mod time;
pub mod wifi;
