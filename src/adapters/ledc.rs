//! LEDC PWM adapter for the Light-Control object.
//!
//! Thin [`PwmPort`] implementation over the `hw_init` LEDC helpers. On the
//! host the helpers are no-ops; the adapter records every duty write so
//! tests can inspect the last value per channel.

use log::debug;

use crate::app::ports::{PwmError, PwmPort};
use crate::drivers::hw_init::{self, HwInitError};

/// Highest LEDC channel index on the ESP32 low-speed group.
const MAX_CHANNEL: u8 = 7;

#[derive(Default)]
pub struct LedcPwm {
    duties: [Option<u32>; MAX_CHANNEL as usize + 1],
}

fn rc(e: HwInitError) -> i32 {
    match e {
        HwInitError::LedcTimer(rc)
        | HwInitError::LedcChannel(rc)
        | HwInitError::LedcDuty(rc)
        | HwInitError::GpioConfigFailed(rc)
        | HwInitError::IsrInstallFailed(rc)
        | HwInitError::IsrHandlerFailed(rc) => rc,
    }
}

impl LedcPwm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last duty written to `channel`, `None` if untouched or released.
    pub fn duty(&self, channel: u8) -> Option<u32> {
        self.duties.get(channel as usize).copied().flatten()
    }
}

impl PwmPort for LedcPwm {
    fn configure_timer(&mut self, freq_hz: u32, resolution_bits: u32) -> Result<(), PwmError> {
        hw_init::ledc_timer_init(freq_hz, resolution_bits).map_err(|e| PwmError::TimerConfig(rc(e)))
    }

    fn configure_channel(&mut self, channel: u8, gpio: i32) -> Result<(), PwmError> {
        if channel > MAX_CHANNEL {
            return Err(PwmError::ChannelConfig(-1));
        }
        hw_init::ledc_channel_init(u32::from(channel), gpio)
            .map_err(|e| PwmError::ChannelConfig(rc(e)))?;
        self.duties[channel as usize] = Some(0);
        Ok(())
    }

    fn set_duty(&mut self, channel: u8, duty: u32) -> Result<(), PwmError> {
        let slot = self
            .duties
            .get_mut(channel as usize)
            .ok_or(PwmError::DutyWrite(-1))?;
        hw_init::ledc_set(u32::from(channel), duty).map_err(|e| PwmError::DutyWrite(rc(e)))?;
        debug!("ledc: ch{} duty={}", channel, duty);
        *slot = Some(duty);
        Ok(())
    }

    fn release_channel(&mut self, channel: u8, idle_high: bool) {
        hw_init::ledc_release(u32::from(channel), idle_high);
        if let Some(slot) = self.duties.get_mut(channel as usize) {
            *slot = None;
        }
    }
}
