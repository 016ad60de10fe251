//! Reconfigure-network job.
//!
//! Picks which WLAN instance drives the station interface:
//!
//! 1. WRITABLE, when enabled with a non-empty SSID.
//! 2. PRECONFIGURED, otherwise or when WRITABLE fails to connect.
//!
//! The transport is held offline while the interface is torn down and
//! re-joined, then a reconnect is requested. Exactly one instance is left
//! enabled.

use log::{error, info, warn};

use crate::adapters::wifi::ConnectivityPort;
use crate::app::ports::{EnginePort, InterfaceInfoPort, StoragePort, TransportPort};
use crate::lwm2m::wlan::{WlanObject, PRECONFIGURED, WRITABLE};

/// Outcome of one reconfigure pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selected {
    Writable,
    Preconfigured,
    /// Neither instance could connect; PRECONFIGURED stays enabled.
    None,
}

fn try_join<W: ConnectivityPort>(wifi: &mut W, ssid: &str, passphrase: &str) -> bool {
    if let Err(e) = wifi.set_credentials(ssid, passphrase) {
        warn!("reconfigure: credentials for '{}' rejected: {}", ssid, e);
        return false;
    }
    match wifi.connect() {
        Ok(()) => true,
        Err(e) => {
            warn!("reconfigure: joining '{}' failed: {}", ssid, e);
            false
        }
    }
}

pub fn reconfigure_network<S, I, W, E>(
    wlan: &mut WlanObject<S, I>,
    wifi: &mut W,
    engine: &mut E,
) -> Selected
where
    S: StoragePort,
    I: InterfaceInfoPort,
    W: ConnectivityPort,
    E: EnginePort + TransportPort,
{
    engine.enter_offline();
    wifi.disconnect();

    let mut selected = Selected::None;

    let writable = wlan.instance_config(WRITABLE).cloned().unwrap_or_default();
    if writable.enabled && !writable.ssid.is_empty() {
        if try_join(wifi, &writable.ssid, &writable.passphrase) {
            info!("reconfigure: using WRITABLE '{}'", writable.ssid);
            wlan.set_writable_iface_failed(false, engine);
            set_enable(wlan, WRITABLE, true, engine);
            set_enable(wlan, PRECONFIGURED, false, engine);
            selected = Selected::Writable;
        } else {
            wlan.set_writable_iface_failed(true, engine);
            set_enable(wlan, WRITABLE, false, engine);
        }
    }

    if selected == Selected::None {
        set_enable(wlan, WRITABLE, false, engine);
        set_enable(wlan, PRECONFIGURED, true, engine);
        let fallback = wlan.instance_config(PRECONFIGURED).cloned().unwrap_or_default();
        if try_join(wifi, &fallback.ssid, &fallback.passphrase) {
            info!("reconfigure: using PRECONFIGURED '{}'", fallback.ssid);
            selected = Selected::Preconfigured;
        } else {
            error!("reconfigure: no WLAN instance could connect");
        }
    }

    engine.exit_offline();
    engine.schedule_reconnect();
    selected
}

fn set_enable<S, I>(wlan: &mut WlanObject<S, I>, iid: u16, enabled: bool, engine: &mut dyn EnginePort)
where
    S: StoragePort,
    I: InterfaceInfoPort,
{
    if let Err(e) = wlan.set_instance_enable(iid, enabled, engine) {
        warn!("reconfigure: enable {} on iid {} failed: {}", enabled, iid, e);
    }
}
