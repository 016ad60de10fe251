//! Port traits — the hexagonal boundary between data-model logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ LwM2M objects / jobs (domain)
//! ```
//!
//! Driven adapters (PWM, NVS, Wi-Fi interface queries, the LwM2M engine's
//! notify/scheduler primitives) implement these traits.  Objects consume
//! them via generics, so the domain core never touches hardware directly.
//!
//! ## Notes
//!
//! - **StoragePort** implementations open and close the backing store per
//!   call; no handle outlives a single operation.
//! - All port errors are typed; callers handle every variant explicitly.

use core::time::Duration;

use crate::config::ClientConfig;
use crate::error::ErrorKind;
use crate::lwm2m::{Iid, Oid, Rid};

// ───────────────────────────────────────────────────────────────
// Engine port (domain → LwM2M engine)
// ───────────────────────────────────────────────────────────────

/// Deferred work the objects hand to the engine's scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    /// Re-select the WLAN instance and reconnect the managed session.
    ReconfigureNetwork,
    /// Poll diff-on-read objects (push button, device clock) and notify.
    UpdateObjects,
}

/// Services the external LwM2M engine offers to object implementations.
pub trait EnginePort {
    /// Inform the engine that a resource value changed so observers fire.
    fn notify_changed(&mut self, oid: Oid, iid: Iid, rid: Rid);

    /// Run `job` once after `delay` (fire-and-forget).
    fn schedule(&mut self, job: Job, delay: Duration);
}

/// Transport-level controls of the managed session.
pub trait TransportPort {
    fn enter_offline(&mut self);
    fn exit_offline(&mut self);
    fn schedule_reconnect(&mut self);
}

// ───────────────────────────────────────────────────────────────
// PWM port (driven adapter: domain → LEDC)
// ───────────────────────────────────────────────────────────────

/// LED PWM output used by the Light-Control object.
pub trait PwmPort {
    /// Configure the shared PWM timer.
    fn configure_timer(&mut self, freq_hz: u32, resolution_bits: u32) -> Result<(), PwmError>;

    /// Bind `channel` to `gpio` with duty 0.
    fn configure_channel(&mut self, channel: u8, gpio: i32) -> Result<(), PwmError>;

    /// Write and latch a new duty value.
    fn set_duty(&mut self, channel: u8, duty: u32) -> Result<(), PwmError>;

    /// Stop the channel, parking the pin at `idle_high`.
    fn release_channel(&mut self, channel: u8, idle_high: bool);
}

// ───────────────────────────────────────────────────────────────
// Network interface query port (driven adapter: Wi-Fi STA → domain)
// ───────────────────────────────────────────────────────────────

/// 802.11 protocol bits as reported by the Wi-Fi driver.
pub mod protocol {
    pub const B: u8 = 0x01;
    pub const G: u8 = 0x02;
    pub const N: u8 = 0x04;
}

/// Read-only queries against the station interface.
pub trait InterfaceInfoPort {
    fn mac(&self) -> Result<[u8; 6], InterfaceError>;
    fn primary_channel(&self) -> Result<u8, InterfaceError>;
    /// Bitmap of [`protocol`] flags.
    fn protocol_bitmap(&self) -> Result<u8, InterfaceError>;
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists client configuration.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`ClientConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<ClientConfig, ConfigError>;

    /// Persist configuration.
    fn save(&self, config: &ClientConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS)
// ───────────────────────────────────────────────────────────────

/// Namespaced key-value storage for Wi-Fi credentials and flags.
///
/// Keys are limited to 15 bytes (NVS key length).
pub trait StoragePort {
    fn get_str(&self, namespace: &str, key: &str) -> Result<String, StorageError>;

    fn set_str(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), StorageError>;

    fn get_u8(&self, namespace: &str, key: &str) -> Result<u8, StorageError>;

    fn set_u8(&mut self, namespace: &str, key: &str, value: u8) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Register transport (external peripheral bus)
// ───────────────────────────────────────────────────────────────

/// Byte-level register access to a peripheral (PMIC, IMU).
pub trait RegisterTransport {
    fn init(&mut self) -> Result<(), ErrorKind>;
    fn read_register(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), ErrorKind>;
    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), ErrorKind>;
}

/// [`RegisterTransport`] over any `embedded-hal` I²C bus.
pub struct I2cRegisters<I> {
    bus: I,
    address: u8,
}

impl<I: embedded_hal::i2c::I2c> I2cRegisters<I> {
    pub fn new(bus: I, address: u8) -> Self {
        Self { bus, address }
    }

    pub fn release(self) -> I {
        self.bus
    }
}

impl<I: embedded_hal::i2c::I2c> RegisterTransport for I2cRegisters<I> {
    fn init(&mut self) -> Result<(), ErrorKind> {
        // Probe with a zero-length write.
        self.bus
            .write(self.address, &[])
            .map_err(|_| ErrorKind::HardwareInit)
    }

    fn read_register(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), ErrorKind> {
        self.bus
            .write_read(self.address, &[reg], buf)
            .map_err(|_| ErrorKind::Io)
    }

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), ErrorKind> {
        self.bus
            .write(self.address, &[reg, value])
            .map_err(|_| ErrorKind::Io)
    }
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug)]
pub enum ConfigError {
    /// Stored config failed deserialization.
    Corrupted,
    /// Generic I/O error from the storage backend.
    IoError,
    /// A field is out of its accepted range.
    ValidationFailed(&'static str),
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Value does not fit the key's type or length limit.
    InvalidValue,
    /// Generic I/O error.
    IoError,
}

/// Errors from [`PwmPort`] operations. Carries the driver return code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PwmError {
    TimerConfig(i32),
    ChannelConfig(i32),
    DutyWrite(i32),
}

/// Errors from [`InterfaceInfoPort`] queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceError {
    NotStarted,
    Driver(i32),
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::IoError => write!(f, "I/O error"),
            Self::ValidationFailed(why) => write!(f, "invalid config: {}", why),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::InvalidValue => write!(f, "invalid value"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for PwmError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::TimerConfig(rc) => write!(f, "PWM timer config failed (rc={})", rc),
            Self::ChannelConfig(rc) => write!(f, "PWM channel config failed (rc={})", rc),
            Self::DutyWrite(rc) => write!(f, "PWM duty write failed (rc={})", rc),
        }
    }
}

impl core::fmt::Display for InterfaceError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "interface not started"),
            Self::Driver(rc) => write!(f, "interface query failed (rc={})", rc),
        }
    }
}

impl From<StorageError> for ErrorKind {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidValue => Self::BadRequest,
            StorageError::NotFound | StorageError::IoError => Self::Internal,
        }
    }
}

impl From<PwmError> for ErrorKind {
    fn from(e: PwmError) -> Self {
        match e {
            PwmError::TimerConfig(_) | PwmError::ChannelConfig(_) => Self::HardwareInit,
            PwmError::DutyWrite(_) => Self::Internal,
        }
    }
}

impl From<InterfaceError> for ErrorKind {
    fn from(_: InterfaceError) -> Self {
        Self::Internal
    }
}
