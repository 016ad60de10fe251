//! Client configuration parameters
//!
//! Compiled-in defaults for the LwM2M client. Values can be overridden by the
//! blob stored in the NVS `config` namespace (see [`ConfigPort`]).
//!
//! [`ConfigPort`]: crate::app::ports::ConfigPort

use serde::{Deserialize, Serialize};

use crate::pins;

/// One LED output driven by the Light-Control object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedChannelConfig {
    pub gpio: i32,
    /// LEDC channel number (0-7).
    pub channel: u8,
}

/// Factory Wi-Fi credentials used by the PRECONFIGURED WLAN instance when
/// nothing is stored in NVS yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiCredentials {
    pub ssid: heapless::String<32>,
    pub passphrase: heapless::String<64>,
}

/// Core client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    // --- LwM2M session ---
    /// Endpoint name prefix; the hex MAC is appended at boot.
    pub endpoint_prefix: heapless::String<32>,
    pub server_uri: heapless::String<96>,
    pub psk_identity: heapless::String<64>,
    pub psk_key: heapless::String<64>,
    /// Registration lifetime (seconds)
    pub lifetime_secs: u32,

    // --- Light control ---
    pub led_channels: heapless::Vec<LedChannelConfig, 3>,
    /// LEDs wired to VCC (duty inverted).
    pub led_active_low: bool,
    pub led_pwm_freq_hz: u32,

    // --- Push button ---
    pub button_gpio: i32,

    // --- Board ---
    /// Board has an AXP192 PMIC that must power the rails at boot.
    pub pmic_axp192: bool,

    // --- Networking ---
    pub preconfigured_wifi: WifiCredentials,
    /// Use the cellular modem instead of Wi-Fi for the LwM2M session.
    pub cellular: bool,

    // --- Timing ---
    /// Period of the object update job (milliseconds)
    pub update_interval_ms: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let mut led_channels = heapless::Vec::new();
        for (channel, gpio) in [pins::LED_R_GPIO, pins::LED_G_GPIO, pins::LED_B_GPIO]
            .into_iter()
            .enumerate()
        {
            // Capacity is exactly three.
            let _ = led_channels.push(LedChannelConfig {
                gpio,
                channel: channel as u8,
            });
        }

        Self {
            endpoint_prefix: bounded("esp32-"),
            server_uri: bounded("coaps://eu.iot.avsystem.cloud:5684"),
            psk_identity: bounded("esp32-client"),
            psk_key: bounded("change-me"),
            lifetime_secs: 60,

            led_channels,
            led_active_low: true,
            led_pwm_freq_hz: pins::LED_PWM_FREQ_HZ,

            button_gpio: pins::BUTTON_GPIO,

            pmic_axp192: false,

            preconfigured_wifi: WifiCredentials {
                ssid: bounded("lwm2m-factory"),
                passphrase: bounded("factory-pass"),
            },
            cellular: false,

            update_interval_ms: 1000,
        }
    }
}

/// Truncating conversion for compiled-in defaults.
fn bounded<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}
