//! LwM2M client firmware library.
//!
//! Exposes the data-model objects, adapters and the cellular socket layer
//! for integration testing. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod cellular;
pub mod config;
pub mod drivers;
pub mod error;
pub mod lwm2m;
pub mod pins;

#[cfg(target_os = "espidf")]
mod esp_link_shims;
