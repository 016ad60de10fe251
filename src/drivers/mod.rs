//! Peripheral drivers: LEDC/GPIO initialisation, the push-button ISR and
//! the AXP192 PMIC bring-up.

pub mod axp192;
pub mod button;
pub mod hw_init;
