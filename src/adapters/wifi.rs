//! WiFi station-mode adapter.
//!
//! Implements [`ConnectivityPort`] for the reconfigure job and
//! [`InterfaceInfoPort`] (via [`StaInterface`]) for the WLAN object.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `BlockingWifi<EspWifi>` from `esp_idf_svc::wifi`.
//! - **all other targets**: simulation with a scripted reject list.
//!
//! ## Retry policy
//!
//! The adapter never reconnects on its own; link loss is reported by
//! [`ConnectivityPort::poll`] and the runtime schedules a reconfigure. After
//! each failed join the retry delay doubles (2 s → 4 s → 8 s … capped at
//! 60 s) and resets on success.

use core::fmt;
use core::time::Duration;
use log::{error, info, warn};

use crate::app::ports::{InterfaceError, InterfaceInfoPort};
use crate::error::ErrorKind;

#[cfg(target_os = "espidf")]
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};

// ───────────────────────────────────────────────────────────────
// Port trait
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityError {
    NoCredentials,
    InvalidSsid,
    InvalidPassword,
    ConnectionFailed,
    AlreadyConnected,
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredentials => write!(f, "no WiFi credentials configured"),
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)"),
            Self::ConnectionFailed => write!(f, "WiFi connection failed"),
            Self::AlreadyConnected => write!(f, "already connected to AP"),
        }
    }
}

impl From<ConnectivityError> for ErrorKind {
    fn from(e: ConnectivityError) -> Self {
        match e {
            ConnectivityError::InvalidSsid | ConnectivityError::InvalidPassword => Self::BadRequest,
            ConnectivityError::ConnectionFailed => Self::ConnectionRefused,
            ConnectivityError::NoCredentials | ConnectivityError::AlreadyConnected => Self::Internal,
        }
    }
}

pub trait ConnectivityPort {
    fn connect(&mut self) -> Result<(), ConnectivityError>;
    fn disconnect(&mut self);
    fn is_connected(&self) -> bool;
    /// Refresh link state; called once per foreground iteration.
    fn poll(&mut self);
    fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), ConnectivityError>;
    fn rssi(&self) -> Option<i8>;

    /// Delay before the next join attempt after a failure.
    fn retry_backoff(&self) -> Duration {
        Duration::from_secs(INITIAL_BACKOFF_SECS.into())
    }
}

// ───────────────────────────────────────────────────────────────
// Connection state
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiState {
    Disconnected,
    Connecting,
    Connected,
    /// Last join attempt failed.
    Failed { attempts: u32 },
}

const INITIAL_BACKOFF_SECS: u32 = 2;
const MAX_BACKOFF_SECS: u32 = 60;

// ───────────────────────────────────────────────────────────────
// Validation
// ───────────────────────────────────────────────────────────────

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> Result<(), ConnectivityError> {
    if ssid.is_empty() || ssid.len() > 32 {
        return Err(ConnectivityError::InvalidSsid);
    }
    if !is_printable_ascii(ssid) {
        return Err(ConnectivityError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ConnectivityError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ConnectivityError::InvalidPassword);
    }
    Ok(())
}

// ───────────────────────────────────────────────────────────────
// WiFi adapter
// ───────────────────────────────────────────────────────────────

pub struct WifiAdapter {
    state: WifiState,
    ssid: heapless::String<32>,
    password: heapless::String<64>,
    backoff_secs: u32,
    last_rssi: Option<i8>,
    #[cfg(target_os = "espidf")]
    driver: BlockingWifi<EspWifi<'static>>,
    /// Simulation: SSIDs whose join attempts fail.
    #[cfg(not(target_os = "espidf"))]
    sim_rejected: Vec<heapless::String<32>>,
    #[cfg(not(target_os = "espidf"))]
    sim_link_up: bool,
}

impl WifiAdapter {
    #[cfg(target_os = "espidf")]
    pub fn new(driver: BlockingWifi<EspWifi<'static>>) -> Self {
        Self {
            state: WifiState::Disconnected,
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            backoff_secs: INITIAL_BACKOFF_SECS,
            last_rssi: None,
            driver,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self {
            state: WifiState::Disconnected,
            ssid: heapless::String::new(),
            password: heapless::String::new(),
            backoff_secs: INITIAL_BACKOFF_SECS,
            last_rssi: None,
            sim_rejected: Vec::new(),
            sim_link_up: false,
        }
    }

    pub fn state(&self) -> WifiState {
        self.state
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    /// Simulation: make every join to `ssid` fail.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_reject(&mut self, ssid: &str) {
        let mut s = heapless::String::new();
        if s.push_str(ssid).is_ok() {
            self.sim_rejected.push(s);
        }
    }

    /// Simulation: the access point goes away.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_drop_link(&mut self) {
        self.sim_link_up = false;
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self) -> Result<(), ConnectivityError> {
        let auth_method = if self.password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };
        let config = Configuration::Client(ClientConfiguration {
            ssid: self.ssid.as_str().try_into().map_err(|_| ConnectivityError::InvalidSsid)?,
            password: self
                .password
                .as_str()
                .try_into()
                .map_err(|_| ConnectivityError::InvalidPassword)?,
            auth_method,
            ..Default::default()
        });

        self.join(&config).map_err(|e| {
            warn!("WiFi(espidf): join '{}' failed: {}", self.ssid, e);
            ConnectivityError::ConnectionFailed
        })
    }

    #[cfg(target_os = "espidf")]
    fn join(&mut self, config: &Configuration) -> Result<(), esp_idf_svc::sys::EspError> {
        self.driver.set_configuration(config)?;
        if !self.driver.is_started()? {
            self.driver.start()?;
        }
        self.driver.connect()?;
        self.driver.wait_netif_up()
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self) -> Result<(), ConnectivityError> {
        if self.sim_rejected.iter().any(|s| *s == self.ssid) {
            warn!("WiFi(sim): '{}' rejected", self.ssid);
            return Err(ConnectivityError::ConnectionFailed);
        }
        self.sim_link_up = true;
        info!("WiFi(sim): joined '{}'", self.ssid);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_disconnect(&mut self) {
        if let Err(e) = self.driver.disconnect() {
            warn!("WiFi(espidf): disconnect: {}", e);
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_disconnect(&mut self) {
        self.sim_link_up = false;
    }

    #[cfg(target_os = "espidf")]
    fn platform_is_connected(&self) -> bool {
        self.driver.is_connected().unwrap_or(false)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_is_connected(&self) -> bool {
        self.sim_link_up
    }

    #[cfg(target_os = "espidf")]
    fn platform_rssi(&self) -> Option<i8> {
        let mut ap_info = esp_idf_svc::sys::wifi_ap_record_t::default();
        // SAFETY: ap_info is a valid out-pointer; the driver is started.
        let ret = unsafe { esp_idf_svc::sys::esp_wifi_sta_get_ap_info(&mut ap_info) };
        (ret == esp_idf_svc::sys::ESP_OK as i32).then_some(ap_info.rssi)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_rssi(&self) -> Option<i8> {
        self.sim_link_up.then_some(-60)
    }
}

// ───────────────────────────────────────────────────────────────
// ConnectivityPort
// ───────────────────────────────────────────────────────────────

impl ConnectivityPort for WifiAdapter {
    fn connect(&mut self) -> Result<(), ConnectivityError> {
        if self.ssid.is_empty() {
            return Err(ConnectivityError::NoCredentials);
        }
        if self.state == WifiState::Connected {
            return Err(ConnectivityError::AlreadyConnected);
        }

        let failed_before = match self.state {
            WifiState::Failed { attempts } => attempts,
            _ => 0,
        };
        info!("WiFi: connecting to '{}'", self.ssid);
        self.state = WifiState::Connecting;

        match self.platform_connect() {
            Ok(()) => {
                self.state = WifiState::Connected;
                self.backoff_secs = INITIAL_BACKOFF_SECS;
                self.last_rssi = self.platform_rssi();
                info!("WiFi: connected (RSSI={:?})", self.last_rssi);
                Ok(())
            }
            Err(e) => {
                error!("WiFi: connection failed: {}", e);
                let attempts = failed_before + 1;
                if attempts > 1 {
                    self.backoff_secs = (self.backoff_secs * 2).min(MAX_BACKOFF_SECS);
                }
                self.state = WifiState::Failed { attempts };
                Err(e)
            }
        }
    }

    fn disconnect(&mut self) {
        self.platform_disconnect();
        // Keep the failure count across the disconnect a reconfigure does.
        if !matches!(self.state, WifiState::Failed { .. }) {
            self.state = WifiState::Disconnected;
        }
        self.last_rssi = None;
        info!("WiFi: disconnected");
    }

    fn is_connected(&self) -> bool {
        self.state == WifiState::Connected && self.platform_is_connected()
    }

    fn poll(&mut self) {
        if self.state != WifiState::Connected {
            return;
        }
        if self.platform_is_connected() {
            self.last_rssi = self.platform_rssi();
        } else {
            warn!("WiFi: connection to '{}' lost", self.ssid);
            self.state = WifiState::Disconnected;
            self.last_rssi = None;
        }
    }

    fn set_credentials(&mut self, ssid: &str, password: &str) -> Result<(), ConnectivityError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        if ssid != self.ssid.as_str() && matches!(self.state, WifiState::Failed { .. }) {
            // A different network starts a fresh retry sequence.
            self.state = WifiState::Disconnected;
            self.backoff_secs = INITIAL_BACKOFF_SECS;
        }
        self.ssid.clear();
        self.ssid.push_str(ssid).map_err(|_| ConnectivityError::InvalidSsid)?;
        self.password.clear();
        self.password.push_str(password).map_err(|_| ConnectivityError::InvalidPassword)?;
        info!("WiFi: credentials updated (SSID='{}')", self.ssid);
        Ok(())
    }

    fn rssi(&self) -> Option<i8> {
        self.last_rssi
    }

    fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs.into())
    }
}

// ───────────────────────────────────────────────────────────────
// Station interface queries
// ───────────────────────────────────────────────────────────────

/// [`InterfaceInfoPort`] over the Wi-Fi driver's station interface.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaInterface;

#[cfg(target_os = "espidf")]
fn check(ret: i32) -> Result<(), InterfaceError> {
    use esp_idf_svc::sys::{ESP_ERR_WIFI_NOT_INIT, ESP_ERR_WIFI_NOT_STARTED, ESP_OK};
    if ret == ESP_OK as i32 {
        Ok(())
    } else if ret == ESP_ERR_WIFI_NOT_INIT as i32 || ret == ESP_ERR_WIFI_NOT_STARTED as i32 {
        Err(InterfaceError::NotStarted)
    } else {
        Err(InterfaceError::Driver(ret))
    }
}

#[cfg(target_os = "espidf")]
impl InterfaceInfoPort for StaInterface {
    fn mac(&self) -> Result<[u8; 6], InterfaceError> {
        use esp_idf_svc::sys::{esp_wifi_get_mac, wifi_interface_t_WIFI_IF_STA};
        let mut mac = [0u8; 6];
        // SAFETY: mac has the six bytes the driver writes.
        check(unsafe { esp_wifi_get_mac(wifi_interface_t_WIFI_IF_STA, mac.as_mut_ptr()) })?;
        Ok(mac)
    }

    fn primary_channel(&self) -> Result<u8, InterfaceError> {
        use esp_idf_svc::sys::{esp_wifi_get_channel, wifi_second_chan_t};
        let mut primary = 0u8;
        let mut second: wifi_second_chan_t = 0;
        // SAFETY: both are valid out-pointers.
        check(unsafe { esp_wifi_get_channel(&mut primary, &mut second) })?;
        Ok(primary)
    }

    fn protocol_bitmap(&self) -> Result<u8, InterfaceError> {
        use esp_idf_svc::sys::{esp_wifi_get_protocol, wifi_interface_t_WIFI_IF_STA};
        let mut bitmap = 0u8;
        // SAFETY: bitmap is a valid out-pointer.
        check(unsafe { esp_wifi_get_protocol(wifi_interface_t_WIFI_IF_STA, &mut bitmap) })?;
        Ok(bitmap)
    }
}

#[cfg(not(target_os = "espidf"))]
impl InterfaceInfoPort for StaInterface {
    fn mac(&self) -> Result<[u8; 6], InterfaceError> {
        Ok(crate::adapters::device_id::read_mac())
    }

    fn primary_channel(&self) -> Result<u8, InterfaceError> {
        Ok(6)
    }

    fn protocol_bitmap(&self) -> Result<u8, InterfaceError> {
        use crate::app::ports::protocol;
        Ok(protocol::B | protocol::G | protocol::N)
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
