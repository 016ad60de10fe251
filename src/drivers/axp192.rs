//! AXP192 power-management IC.
//!
//! ## Hardware
//!
//! Found on the M5StickC Plus at I²C address `0x34` (SDA GPIO21, SCL
//! GPIO22). LDO2 and LDO3 feed the LCD backlight and logic; DCDC1/DCDC3
//! feed the SoC rails. Nothing else on the board is powered until
//! [`Axp192::power_on`] has run.

use log::{debug, info};

use crate::app::ports::RegisterTransport;
use crate::error::Result;

pub const I2C_ADDRESS: u8 = 0x34;
/// Bus clock used for the PMIC.
pub const I2C_FREQ_HZ: u32 = 1_000_000;

/// Highest backlight step accepted by [`Axp192::set_screen_brightness`].
pub const MAX_BRIGHTNESS: u8 = 12;

mod reg {
    pub const VBUS_IPSOUT: u8 = 0x30;
    pub const VOFF: u8 = 0x31;
    pub const SHUTDOWN_BATT_CHG: u8 = 0x32;
    pub const CHARGE_CTRL1: u8 = 0x33;
    pub const BACKUP_CHARGE: u8 = 0x35;
    pub const PEK: u8 = 0x36;
    pub const TEMP_PROTECT: u8 = 0x39;
    pub const POWER_OUTPUT: u8 = 0x12;
    pub const LDO23_VOLTAGE: u8 = 0x28;
    pub const ADC_ENABLE1: u8 = 0x82;
    pub const ADC_RATE: u8 = 0x84;
    pub const GPIO0_CTRL: u8 = 0x90;
    pub const GPIO0_VOLTAGE: u8 = 0x91;
    pub const COULOMB_CTRL: u8 = 0xB8;
}

/// Coulomb counter control values (register `0xB8`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoulombCounter {
    Enable,
    Disable,
    Stop,
    Clear,
}

impl CoulombCounter {
    fn bits(self) -> u8 {
        match self {
            Self::Enable => 0x80,
            Self::Disable => 0x00,
            Self::Stop => 0xC0,
            Self::Clear => 0xA0,
        }
    }
}

pub struct Axp192<T: RegisterTransport> {
    bus: T,
}

impl<T: RegisterTransport> Axp192<T> {
    pub fn new(bus: T) -> Self {
        Self { bus }
    }

    pub fn release(self) -> T {
        self.bus
    }

    fn read(&mut self, reg: u8) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.bus.read_register(reg, &mut buf)?;
        Ok(buf[0])
    }

    fn update(&mut self, reg: u8, keep: u8, set: u8) -> Result<()> {
        let value = (self.read(reg)? & keep) | set;
        self.bus.write_register(reg, value)
    }

    /// Bring up the rails the board needs. Stops at the first bus error.
    pub fn power_on(&mut self) -> Result<()> {
        self.bus.init()?;

        // LDO2 / LDO3 (LCD backlight, LCD logic) at 3.0 V.
        self.bus.write_register(reg::LDO23_VOLTAGE, 0xCC)?;
        // ADC at 200 Hz, every channel on.
        self.bus.write_register(reg::ADC_RATE, 0xF2)?;
        self.bus.write_register(reg::ADC_ENABLE1, 0xFF)?;
        // Charge to 4.2 V at 100 mA.
        self.bus.write_register(reg::CHARGE_CTRL1, 0xC0)?;
        // LDO2, LDO3, DCDC1 and DCDC3 on; EXTEN off.
        self.update(reg::POWER_OUTPUT, 0xEF, 0x4D)?;
        // 128 ms power-on, 4 s power-off press.
        self.bus.write_register(reg::PEK, 0x0C)?;
        // GPIO0 as a 3.3 V LDO (RTC).
        self.bus.write_register(reg::GPIO0_VOLTAGE, 0xF0)?;
        self.bus.write_register(reg::GPIO0_CTRL, 0x02)?;
        // No VBUS hold limit.
        self.bus.write_register(reg::VBUS_IPSOUT, 0x80)?;
        self.bus.write_register(reg::TEMP_PROTECT, 0xFC)?;
        self.bus.write_register(reg::BACKUP_CHARGE, 0xA2)?;
        self.bus.write_register(reg::SHUTDOWN_BATT_CHG, 0x46)?;
        // Power off below 3.0 V.
        self.update(reg::VOFF, 0xF8, 1 << 2)?;

        info!("axp192: power rails up");
        Ok(())
    }

    /// Set the LCD backlight (LDO2) step, clamped to [`MAX_BRIGHTNESS`].
    pub fn set_screen_brightness(&mut self, level: u8) -> Result<()> {
        let level = level.min(MAX_BRIGHTNESS);
        debug!("axp192: backlight step {}", level);
        self.update(reg::LDO23_VOLTAGE, 0x0F, level << 4)
    }

    pub fn set_coulomb_counter(&mut self, mode: CoulombCounter) -> Result<()> {
        self.bus.write_register(reg::COULOMB_CTRL, mode.bits())
    }
}
