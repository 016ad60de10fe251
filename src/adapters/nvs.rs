//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`StoragePort`] for the WLAN credentials and [`ConfigPort`]
//! for the client configuration blob.
//!
//! | Namespace       | Key             | Type | Written by                |
//! |-----------------|-----------------|------|---------------------------|
//! | `writable`      | `wifi_ssid`     | str  | WLAN commit               |
//! | `writable`      | `wifi_pswd`     | str  | WLAN commit               |
//! | `writable`      | `wifi_inter_en` | u8   | WLAN commit / reconfigure |
//! | `preconfigured` | `wifi_ssid`     | str  | provisioning              |
//! | `preconfigured` | `wifi_pswd`     | str  | provisioning              |
//! | `preconfigured` | `wifi_inter_en` | u8   | WLAN commit / reconfigure |
//! | `config`        | `client`        | blob | [`ConfigPort::save`]      |
//!
//! Every call opens the namespace, performs one operation (plus commit on
//! writes) and closes the handle again.

use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::config::ClientConfig;
use log::{info, warn};

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use std::ffi::CString;

const CONFIG_NAMESPACE: &str = "config";
const CONFIG_KEY: &str = "client";

/// NVS key and namespace names are limited to 15 bytes.
const MAX_KEY_LEN: usize = 15;
#[cfg(target_os = "espidf")]
const MAX_BLOB_SIZE: usize = 1024;
#[cfg(target_os = "espidf")]
const MAX_STR_SIZE: usize = 128;

#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Clone, PartialEq, Eq)]
enum SimEntry {
    Str(String),
    U8(u8),
    Blob(Vec<u8>),
}

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, SimEntry>>,
}

fn check_name(name: &str) -> Result<(), StorageError> {
    if name.is_empty() || name.len() > MAX_KEY_LEN {
        return Err(StorageError::InvalidValue);
    }
    Ok(())
}

impl NvsAdapter {
    /// Initialise NVS flash. On a full or outdated partition it is erased
    /// and initialised again.
    pub fn new() -> Result<Self, ConfigError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: called from the main task before any other NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES as i32 || ret == ESP_ERR_NVS_NEW_VERSION_FOUND as i32 {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK as i32 {
                    return Err(ConfigError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK as i32 {
                    return Err(ConfigError::IoError);
                }
            } else if ret != ESP_OK as i32 {
                return Err(ConfigError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// Open an NVS namespace, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let ns = CString::new(namespace).map_err(|_| ESP_ERR_INVALID_ARG as i32)?;
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        // SAFETY: ns is NUL-terminated and handle is a valid out-pointer.
        let ret = unsafe { nvs_open(ns.as_ptr(), mode, &mut handle) };
        if ret != ESP_OK as i32 {
            return Err(ret);
        }

        let result = f(handle);
        // SAFETY: handle was opened above and is not used afterwards.
        unsafe {
            nvs_close(handle);
        }
        result
    }

    #[cfg(target_os = "espidf")]
    fn commit(handle: nvs_handle_t) -> Result<(), i32> {
        // SAFETY: handle is open in read-write mode.
        let ret = unsafe { nvs_commit(handle) };
        if ret != ESP_OK as i32 { Err(ret) } else { Ok(()) }
    }

    #[cfg(target_os = "espidf")]
    fn map_read_error(e: i32) -> StorageError {
        // A namespace that was never written cannot be opened read-only.
        if e == ESP_ERR_NVS_NOT_FOUND as i32 {
            StorageError::NotFound
        } else if e == ESP_ERR_NVS_INVALID_LENGTH as i32 || e == ESP_ERR_NVS_TYPE_MISMATCH as i32 {
            StorageError::InvalidValue
        } else {
            StorageError::IoError
        }
    }
}

fn validate_config(cfg: &ClientConfig) -> Result<(), ConfigError> {
    if cfg.lifetime_secs == 0 {
        return Err(ConfigError::ValidationFailed("lifetime_secs must be > 0"));
    }
    if !cfg.server_uri.starts_with("coap://") && !cfg.server_uri.starts_with("coaps://") {
        return Err(ConfigError::ValidationFailed("server_uri must be coap:// or coaps://"));
    }
    if !(100..=40_000).contains(&cfg.led_pwm_freq_hz) {
        return Err(ConfigError::ValidationFailed("led_pwm_freq_hz must be 100-40000"));
    }
    if cfg.led_channels.iter().any(|c| c.channel > 7) {
        return Err(ConfigError::ValidationFailed("LEDC channel must be 0-7"));
    }
    if !(100..=60_000).contains(&cfg.update_interval_ms) {
        return Err(ConfigError::ValidationFailed("update_interval_ms must be 100-60000"));
    }
    Ok(())
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<ClientConfig, ConfigError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let key = Self::composite_key(CONFIG_NAMESPACE, CONFIG_KEY);
            match self.store.borrow().get(&key) {
                Some(SimEntry::Blob(bytes)) => {
                    let cfg: ClientConfig =
                        postcard::from_bytes(bytes).map_err(|_| ConfigError::Corrupted)?;
                    info!("NvsAdapter: loaded config from store");
                    Ok(cfg)
                }
                Some(_) => Err(ConfigError::Corrupted),
                None => {
                    info!("NvsAdapter: no stored config, using defaults");
                    Ok(ClientConfig::default())
                }
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let key = CString::new(CONFIG_KEY).map_err(|_| ConfigError::IoError)?;
            let result = Self::with_nvs_handle(CONFIG_NAMESPACE, false, |handle| {
                let mut size: usize = 0;

                // First call: get size
                // SAFETY: a null buffer asks NVS for the stored length only.
                let ret = unsafe {
                    nvs_get_blob(handle, key.as_ptr(), core::ptr::null_mut(), &mut size)
                };
                if ret != ESP_OK as i32 {
                    return Err(ret);
                }
                if size == 0 || size > MAX_BLOB_SIZE {
                    return Err(ESP_ERR_NVS_INVALID_LENGTH as i32);
                }

                let mut buf = vec![0u8; size];
                // SAFETY: buf holds exactly `size` bytes.
                let ret = unsafe {
                    nvs_get_blob(handle, key.as_ptr(), buf.as_mut_ptr().cast(), &mut size)
                };
                if ret != ESP_OK as i32 {
                    return Err(ret);
                }
                Ok(buf)
            });

            match result {
                Ok(bytes) => {
                    let cfg: ClientConfig =
                        postcard::from_bytes(&bytes).map_err(|_| ConfigError::Corrupted)?;
                    info!("NvsAdapter: loaded config from NVS ({} bytes)", bytes.len());
                    Ok(cfg)
                }
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND as i32 => {
                    info!("NvsAdapter: no stored config, using defaults");
                    Ok(ClientConfig::default())
                }
                Err(e) => {
                    warn!("NvsAdapter: NVS read error {}, using defaults", e);
                    Ok(ClientConfig::default())
                }
            }
        }
    }

    fn save(&self, config: &ClientConfig) -> Result<(), ConfigError> {
        validate_config(config)?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;

        #[cfg(not(target_os = "espidf"))]
        {
            let key = Self::composite_key(CONFIG_NAMESPACE, CONFIG_KEY);
            self.store.borrow_mut().insert(key, SimEntry::Blob(bytes));
            info!("NvsAdapter: config saved (simulation)");
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let key = CString::new(CONFIG_KEY).map_err(|_| ConfigError::IoError)?;
            let result = Self::with_nvs_handle(CONFIG_NAMESPACE, true, |handle| {
                // SAFETY: key is NUL-terminated; bytes outlives the call.
                let ret = unsafe {
                    nvs_set_blob(handle, key.as_ptr(), bytes.as_ptr().cast(), bytes.len())
                };
                if ret != ESP_OK as i32 {
                    return Err(ret);
                }
                Self::commit(handle)
            });
            match result {
                Ok(()) => {
                    info!("NvsAdapter: config saved to NVS ({} bytes)", bytes.len());
                    Ok(())
                }
                Err(e) => {
                    warn!("NvsAdapter: NVS write error {}", e);
                    Err(ConfigError::IoError)
                }
            }
        }
    }
}

impl StoragePort for NvsAdapter {
    fn get_str(&self, namespace: &str, key: &str) -> Result<String, StorageError> {
        check_name(namespace)?;
        check_name(key)?;

        #[cfg(not(target_os = "espidf"))]
        {
            match self.store.borrow().get(&Self::composite_key(namespace, key)) {
                Some(SimEntry::Str(s)) => Ok(s.clone()),
                Some(_) => Err(StorageError::InvalidValue),
                None => Err(StorageError::NotFound),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let ckey = CString::new(key).map_err(|_| StorageError::InvalidValue)?;
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let mut buf = [0u8; MAX_STR_SIZE];
                let mut size = buf.len();
                // SAFETY: size carries the buffer capacity; NVS writes the
                // NUL-terminated string and updates size.
                let ret = unsafe {
                    nvs_get_str(handle, ckey.as_ptr(), buf.as_mut_ptr().cast(), &mut size)
                };
                if ret != ESP_OK as i32 {
                    return Err(ret);
                }
                let len = size.saturating_sub(1);
                Ok(String::from_utf8_lossy(&buf[..len]).into_owned())
            });
            result.map_err(Self::map_read_error)
        }
    }

    fn set_str(&mut self, namespace: &str, key: &str, value: &str) -> Result<(), StorageError> {
        check_name(namespace)?;
        check_name(key)?;

        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .borrow_mut()
                .insert(Self::composite_key(namespace, key), SimEntry::Str(value.into()));
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let ckey = CString::new(key).map_err(|_| StorageError::InvalidValue)?;
            let cval = CString::new(value).map_err(|_| StorageError::InvalidValue)?;
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                // SAFETY: both strings are NUL-terminated and outlive the call.
                let ret = unsafe { nvs_set_str(handle, ckey.as_ptr(), cval.as_ptr()) };
                if ret != ESP_OK as i32 {
                    return Err(ret);
                }
                Self::commit(handle)
            });
            result.map_err(|e| {
                warn!("NvsAdapter: set_str {}/{} failed ({})", namespace, key, e);
                StorageError::IoError
            })
        }
    }

    fn get_u8(&self, namespace: &str, key: &str) -> Result<u8, StorageError> {
        check_name(namespace)?;
        check_name(key)?;

        #[cfg(not(target_os = "espidf"))]
        {
            match self.store.borrow().get(&Self::composite_key(namespace, key)) {
                Some(SimEntry::U8(v)) => Ok(*v),
                Some(_) => Err(StorageError::InvalidValue),
                None => Err(StorageError::NotFound),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let ckey = CString::new(key).map_err(|_| StorageError::InvalidValue)?;
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let mut value = 0u8;
                // SAFETY: value is a valid out-pointer.
                let ret = unsafe { nvs_get_u8(handle, ckey.as_ptr(), &mut value) };
                if ret != ESP_OK as i32 {
                    return Err(ret);
                }
                Ok(value)
            });
            result.map_err(Self::map_read_error)
        }
    }

    fn set_u8(&mut self, namespace: &str, key: &str, value: u8) -> Result<(), StorageError> {
        check_name(namespace)?;
        check_name(key)?;

        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .borrow_mut()
                .insert(Self::composite_key(namespace, key), SimEntry::U8(value));
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let ckey = CString::new(key).map_err(|_| StorageError::InvalidValue)?;
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                // SAFETY: key is NUL-terminated.
                let ret = unsafe { nvs_set_u8(handle, ckey.as_ptr(), value) };
                if ret != ESP_OK as i32 {
                    return Err(ret);
                }
                Self::commit(handle)
            });
            result.map_err(|e| {
                warn!("NvsAdapter: set_u8 {}/{} failed ({})", namespace, key, e);
                StorageError::IoError
            })
        }
    }
}
