//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter           | Implements          | Connects to                 |
//! |-------------------|---------------------|-----------------------------|
//! | `device_id`       | —                   | eFuse MAC (serial, endpoint)|
//! | `firmware_update` | FW update handlers  | `esp-ota` partitions        |
//! | `ledc`            | PwmPort             | ESP32 LEDC                  |
//! | `nvs`             | ConfigPort          | NVS / in-memory store       |
//! |                   | StoragePort         |                             |
//! | `time`            | Clock               | ESP32 system timer          |
//! | `wifi`            | ConnectivityPort    | ESP-IDF WiFi STA            |
//! |                   | InterfaceInfoPort   | STA MAC / channel / protocol|

pub mod device_id;
pub mod firmware_update;
pub mod ledc;
pub mod nvs;
pub mod time;
pub mod wifi;
