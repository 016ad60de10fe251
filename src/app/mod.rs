//! Application core — jobs, network reconfiguration and the foreground
//! runtime.
//!
//! All interaction with hardware happens through **port traits** defined
//! in [`ports`], keeping this layer testable without real peripherals.

pub mod jobs;
pub mod ports;
pub mod reconfigure;
pub mod runtime;
pub mod status;
