//! Firmware update stream handlers, backed by `esp-ota`.
//!
//! Flow: stream_open → N × stream_write → stream_finish → perform_upgrade
//! → (event loop stops) → main reboots.
//!
//! ```text
//!   Idle ──open──▶ Downloading ──finish──▶ Downloaded ──perform_upgrade──▶ UpgradePending
//!    ▲                 │  write                 │
//!    └──── reset ──────┴────────────────────────┘
//! ```
//!
//! On simulation targets the image is collected in memory.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use log::{info, warn};

use crate::cellular::event_loop::EventLoopHandle;
use crate::error::ErrorKind;

/// First byte of every ESP application image.
const IMAGE_MAGIC: u8 = 0xE9;
/// Image header plus the first segment header.
const MIN_IMAGE_LEN: usize = 24 + 8;
const MAX_IMAGE_LEN: usize = 4 * 1024 * 1024;

// ── Error type ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareUpdateError {
    /// `stream_open` while a download is already in progress.
    AlreadyInProgress,
    /// Handler called in the wrong state.
    OutOfOrder,
    /// No inactive OTA partition or the partition could not be opened.
    BeginFailed,
    /// Image does not start like an application image.
    UnsupportedPackage,
    /// Flash write failed.
    WriteFailed,
    /// Image failed validation when the download was closed.
    IntegrityFailure,
    /// Image larger than the OTA partition.
    TooLarge,
    BootSetFailed,
    /// The event loop was not running.
    InterruptFailed,
}

impl fmt::Display for FirmwareUpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInProgress => write!(f, "firmware download already in progress"),
            Self::OutOfOrder => write!(f, "firmware handler called out of order"),
            Self::BeginFailed => write!(f, "OTA begin failed"),
            Self::UnsupportedPackage => write!(f, "unsupported package type"),
            Self::WriteFailed => write!(f, "OTA write failed"),
            Self::IntegrityFailure => write!(f, "firmware integrity check failed"),
            Self::TooLarge => write!(f, "firmware image exceeds 4 MB"),
            Self::BootSetFailed => write!(f, "set boot partition failed"),
            Self::InterruptFailed => write!(f, "event loop interrupt failed"),
        }
    }
}

impl From<FirmwareUpdateError> for ErrorKind {
    fn from(e: FirmwareUpdateError) -> Self {
        match e {
            FirmwareUpdateError::UnsupportedPackage | FirmwareUpdateError::TooLarge => {
                Self::BadRequest
            }
            FirmwareUpdateError::OutOfOrder | FirmwareUpdateError::AlreadyInProgress => {
                Self::MethodNotAllowed
            }
            _ => Self::Internal,
        }
    }
}

// ── State machine ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    Downloading { bytes_written: usize },
    Downloaded { size: usize },
    UpgradePending,
}

pub struct FirmwareUpdate {
    state: UpdateState,
    update_requested: AtomicBool,
    #[cfg(target_os = "espidf")]
    ota_update: Option<esp_ota::OtaUpdate>,
    #[cfg(target_os = "espidf")]
    completed: Option<esp_ota::CompletedOtaUpdate>,
    #[cfg(not(target_os = "espidf"))]
    image: Vec<u8>,
}

impl Default for FirmwareUpdate {
    fn default() -> Self {
        Self::new()
    }
}

impl FirmwareUpdate {
    pub fn new() -> Self {
        Self {
            state: UpdateState::Idle,
            update_requested: AtomicBool::new(false),
            #[cfg(target_os = "espidf")]
            ota_update: None,
            #[cfg(target_os = "espidf")]
            completed: None,
            #[cfg(not(target_os = "espidf"))]
            image: Vec::new(),
        }
    }

    pub fn state(&self) -> UpdateState {
        self.state
    }

    /// Set once `perform_upgrade` succeeded; main reboots when it sees it.
    pub fn update_requested(&self) -> bool {
        self.update_requested.load(Ordering::Acquire)
    }

    /// Open the inactive OTA partition for a new image.
    pub fn stream_open(&mut self) -> Result<(), FirmwareUpdateError> {
        if self.state != UpdateState::Idle {
            return Err(FirmwareUpdateError::AlreadyInProgress);
        }

        #[cfg(target_os = "espidf")]
        {
            let update = esp_ota::OtaUpdate::begin().map_err(|e| {
                warn!("fw: OTA begin failed: {:?}", e);
                FirmwareUpdateError::BeginFailed
            })?;
            self.ota_update = Some(update);
        }

        #[cfg(not(target_os = "espidf"))]
        self.image.clear();

        self.state = UpdateState::Downloading { bytes_written: 0 };
        info!("fw: download started");
        Ok(())
    }

    pub fn stream_write(&mut self, data: &[u8]) -> Result<(), FirmwareUpdateError> {
        let UpdateState::Downloading { bytes_written } = self.state else {
            return Err(FirmwareUpdateError::OutOfOrder);
        };
        if bytes_written == 0 && data.first().is_some_and(|&b| b != IMAGE_MAGIC) {
            warn!("fw: image magic 0x{:02x} rejected", data[0]);
            self.reset();
            return Err(FirmwareUpdateError::UnsupportedPackage);
        }
        let total = bytes_written + data.len();
        if total > MAX_IMAGE_LEN {
            self.reset();
            return Err(FirmwareUpdateError::TooLarge);
        }

        #[cfg(target_os = "espidf")]
        {
            let Some(update) = self.ota_update.as_mut() else {
                return Err(FirmwareUpdateError::OutOfOrder);
            };
            if let Err(e) = update.write(data) {
                warn!("fw: OTA write failed: {:?}", e);
                self.reset();
                return Err(FirmwareUpdateError::WriteFailed);
            }
        }

        #[cfg(not(target_os = "espidf"))]
        self.image.extend_from_slice(data);

        self.state = UpdateState::Downloading { bytes_written: total };
        Ok(())
    }

    /// Close the download and validate the image.
    pub fn stream_finish(&mut self) -> Result<(), FirmwareUpdateError> {
        let UpdateState::Downloading { bytes_written } = self.state else {
            return Err(FirmwareUpdateError::OutOfOrder);
        };
        if bytes_written < MIN_IMAGE_LEN {
            warn!("fw: image truncated ({} bytes)", bytes_written);
            self.reset();
            return Err(FirmwareUpdateError::IntegrityFailure);
        }

        #[cfg(target_os = "espidf")]
        {
            let Some(update) = self.ota_update.take() else {
                self.state = UpdateState::Idle;
                return Err(FirmwareUpdateError::OutOfOrder);
            };
            match update.finalize() {
                Ok(completed) => self.completed = Some(completed),
                Err(e) => {
                    warn!("fw: OTA finalize failed: {:?}", e);
                    self.state = UpdateState::Idle;
                    return Err(FirmwareUpdateError::IntegrityFailure);
                }
            }
        }

        self.state = UpdateState::Downloaded { size: bytes_written };
        info!("fw: download complete ({} bytes)", bytes_written);
        Ok(())
    }

    /// Abort any download in progress and return to idle.
    pub fn reset(&mut self) {
        #[cfg(target_os = "espidf")]
        {
            // esp-ota aborts when the handle is dropped.
            self.ota_update.take();
            self.completed.take();
        }

        #[cfg(not(target_os = "espidf"))]
        self.image.clear();

        if self.state != UpdateState::Idle {
            info!("fw: reset from {:?}", self.state);
        }
        self.state = UpdateState::Idle;
    }

    /// Make the downloaded image bootable and stop the event loop so main
    /// can reboot into it.
    pub fn perform_upgrade(&mut self, event_loop: &EventLoopHandle) -> Result<(), FirmwareUpdateError> {
        let UpdateState::Downloaded { .. } = self.state else {
            return Err(FirmwareUpdateError::OutOfOrder);
        };

        #[cfg(target_os = "espidf")]
        {
            let Some(mut completed) = self.completed.take() else {
                self.state = UpdateState::Idle;
                return Err(FirmwareUpdateError::OutOfOrder);
            };
            if let Err(e) = completed.set_as_boot_partition() {
                warn!("fw: set boot partition failed: {:?}", e);
                self.state = UpdateState::Idle;
                return Err(FirmwareUpdateError::BootSetFailed);
            }
        }

        event_loop.interrupt().map_err(|_| FirmwareUpdateError::InterruptFailed)?;
        self.state = UpdateState::UpgradePending;
        self.update_requested.store(true, Ordering::Release);
        info!("fw: upgrade scheduled, awaiting reboot");
        Ok(())
    }

    /// Simulation: the bytes received so far.
    #[cfg(not(target_os = "espidf"))]
    pub fn image(&self) -> &[u8] {
        &self.image
    }
}

// ── Boot validation ───────────────────────────────────────────

/// Cancel the rollback of a freshly installed image on its first boot.
#[cfg(target_os = "espidf")]
pub fn mark_running_valid() {
    match esp_ota::mark_app_valid() {
        Ok(()) => info!("fw: running image marked valid"),
        Err(e) => warn!("fw: mark_app_valid failed: {:?}", e),
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn mark_running_valid() {
    info!("fw: rollback check (simulation): skipped");
}

/// Restart into the new image.
#[cfg(target_os = "espidf")]
pub fn reboot() -> ! {
    info!("fw: rebooting to perform a firmware upgrade");
    esp_ota::restart()
}

// ── Tests ─────────────────────────────────────────────────────
