//! WLAN Connectivity object (oid 12).
//!
//! Two fixed instances:
//!
//! | Iid | Instance        | Data-model writes | Persisted in      |
//! |-----|-----------------|-------------------|-------------------|
//! | 0   | `WRITABLE`      | enable, SSID, key | `writable`        |
//! | 1   | `PRECONFIGURED` | none              | `preconfigured`   |
//!
//! Only the WRITABLE credentials take part in transactions. Commit persists
//! what changed and schedules at most one
//! [`Job::ReconfigureNetwork`](crate::app::ports::Job) per transaction.
//! PRECONFIGURED is mutated only by the bootstrap setters.

use core::any::Any;
use core::fmt::Write;
use core::time::Duration;

use log::{info, warn};

use crate::app::ports::{
    protocol, EnginePort, InterfaceInfoPort, Job, StorageError, StoragePort,
};
use crate::config::WifiCredentials;
use crate::error::{ErrorKind, Result};
use crate::lwm2m::transaction::{Transactional, TxPhase};
use crate::lwm2m::{Access, Iid, Lwm2mObject, Oid, ResourceDef, Rid, Value};

pub const OID: Oid = 12;

pub const WRITABLE: Iid = 0;
pub const PRECONFIGURED: Iid = 1;

pub const RID_INTERFACE_NAME: Rid = 0;
pub const RID_ENABLE: Rid = 1;
pub const RID_STATUS: Rid = 3;
pub const RID_BSSID: Rid = 4;
pub const RID_SSID: Rid = 5;
pub const RID_MODE: Rid = 8;
pub const RID_CHANNEL: Rid = 9;
pub const RID_STANDARD: Rid = 14;
pub const RID_AUTH_MODE: Rid = 15;
pub const RID_WPA_KEY_PHRASE: Rid = 18;

const STATUS_DISABLED: i64 = 0;
const STATUS_UP: i64 = 1;
const STATUS_ERROR: i64 = 2;

const MODE_CLIENT: i64 = 1;
const AUTH_PSK: i64 = 1;

const STANDARD_80211B: i64 = 1;
const STANDARD_80211G: i64 = 2;
const STANDARD_80211N: i64 = 5;

/// Storage layout for both instances.
pub mod keys {
    pub const NS_WRITABLE: &str = "writable";
    pub const NS_PRECONFIGURED: &str = "preconfigured";
    pub const SSID: &str = "wifi_ssid";
    pub const PASSWORD: &str = "wifi_pswd";
    pub const ENABLE: &str = "wifi_inter_en";
}

const RECONFIGURE_DELAY: Duration = Duration::ZERO;

static WRITABLE_RESOURCES: [ResourceDef; 10] = [
    ResourceDef::new(RID_INTERFACE_NAME, Access::Read),
    ResourceDef::new(RID_ENABLE, Access::ReadWrite),
    ResourceDef::new(RID_STATUS, Access::Read),
    ResourceDef::new(RID_BSSID, Access::Read),
    ResourceDef::new(RID_SSID, Access::ReadWrite),
    ResourceDef::new(RID_MODE, Access::Read),
    ResourceDef::new(RID_CHANNEL, Access::Read),
    ResourceDef::new(RID_STANDARD, Access::Read),
    ResourceDef::new(RID_AUTH_MODE, Access::Read),
    ResourceDef::new(RID_WPA_KEY_PHRASE, Access::Write),
];

static PRECONFIGURED_RESOURCES: [ResourceDef; 9] = [
    ResourceDef::new(RID_INTERFACE_NAME, Access::Read),
    ResourceDef::new(RID_ENABLE, Access::Read),
    ResourceDef::new(RID_STATUS, Access::Read),
    ResourceDef::new(RID_BSSID, Access::Read),
    ResourceDef::new(RID_SSID, Access::Read),
    ResourceDef::new(RID_MODE, Access::Read),
    ResourceDef::new(RID_CHANNEL, Access::Read),
    ResourceDef::new(RID_STANDARD, Access::Read),
    ResourceDef::new(RID_AUTH_MODE, Access::Read),
];

/// Credentials and enable flag of one instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WlanConfig {
    pub enabled: bool,
    pub ssid: heapless::String<32>,
    pub passphrase: heapless::String<64>,
}

pub struct WlanObject<S: StoragePort, I: InterfaceInfoPort> {
    storage: S,
    iface: I,
    writable: Transactional<WlanConfig>,
    preconfigured: WlanConfig,
    writable_iface_failed: bool,
}

fn bounded<const N: usize>(s: &str) -> Result<heapless::String<N>> {
    heapless::String::try_from(s).map_err(|_| ErrorKind::BadRequest)
}

fn load_str<S: StoragePort, const N: usize>(
    storage: &S,
    namespace: &str,
    key: &str,
) -> Option<heapless::String<N>> {
    match storage.get_str(namespace, key) {
        Ok(s) => bounded(&s).ok().or_else(|| {
            warn!("wlan: stored {}/{} too long, ignored", namespace, key);
            None
        }),
        Err(StorageError::NotFound) => None,
        Err(e) => {
            warn!("wlan: reading {}/{}: {}", namespace, key, e);
            None
        }
    }
}

fn load_flag<S: StoragePort>(storage: &S, namespace: &str) -> Option<bool> {
    match storage.get_u8(namespace, keys::ENABLE) {
        Ok(v) => Some(v != 0),
        Err(StorageError::NotFound) => None,
        Err(e) => {
            warn!("wlan: reading {}/{}: {}", namespace, keys::ENABLE, e);
            None
        }
    }
}

/// Persistence failures are logged, not propagated: the in-memory state is
/// authoritative until the next boot.
fn persist<T: core::fmt::Display>(what: &str, res: core::result::Result<(), T>) {
    if let Err(e) = res {
        warn!("wlan: persisting {} failed: {}", what, e);
    }
}

impl<S: StoragePort, I: InterfaceInfoPort> WlanObject<S, I> {
    /// Restore both instances from storage, falling back to the factory
    /// credentials for PRECONFIGURED. Exactly one instance ends up enabled.
    pub fn load(storage: S, iface: I, factory: &WifiCredentials) -> Self {
        let writable = WlanConfig {
            enabled: load_flag(&storage, keys::NS_WRITABLE).unwrap_or(false),
            ssid: load_str(&storage, keys::NS_WRITABLE, keys::SSID).unwrap_or_default(),
            passphrase: load_str(&storage, keys::NS_WRITABLE, keys::PASSWORD)
                .unwrap_or_default(),
        };
        let preconfigured = WlanConfig {
            enabled: !writable.enabled,
            ssid: load_str(&storage, keys::NS_PRECONFIGURED, keys::SSID)
                .unwrap_or_else(|| factory.ssid.clone()),
            passphrase: load_str(&storage, keys::NS_PRECONFIGURED, keys::PASSWORD)
                .unwrap_or_else(|| factory.passphrase.clone()),
        };
        if let Some(stored) = load_flag(&storage, keys::NS_PRECONFIGURED) {
            if stored != preconfigured.enabled {
                warn!("wlan: stored enable flags disagree, preferring WRITABLE");
            }
        }

        info!(
            "wlan: loaded (writable='{}' en={}, preconfigured='{}' en={})",
            writable.ssid, writable.enabled, preconfigured.ssid, preconfigured.enabled
        );

        Self {
            storage,
            iface,
            writable: Transactional::new(writable),
            preconfigured,
            writable_iface_failed: false,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn instance_config(&self, iid: Iid) -> Option<&WlanConfig> {
        match iid {
            WRITABLE => Some(self.writable.live()),
            PRECONFIGURED => Some(&self.preconfigured),
            _ => None,
        }
    }

    pub fn is_instance_enabled(&self, iid: Iid) -> bool {
        self.instance_config(iid).is_some_and(|c| c.enabled)
    }

    pub fn writable_iface_failed(&self) -> bool {
        self.writable_iface_failed
    }

    fn config_mut(&mut self, iid: Iid) -> Result<&mut WlanConfig> {
        match iid {
            WRITABLE => Ok(self.writable.live_mut()),
            PRECONFIGURED => Ok(&mut self.preconfigured),
            _ => Err(ErrorKind::NotFound),
        }
    }

    /// Bootstrap setter for credentials. Notifies only changed resources.
    pub fn set_instance_wifi_config(
        &mut self,
        iid: Iid,
        ssid: &str,
        passphrase: &str,
        engine: &mut dyn EnginePort,
    ) -> Result<()> {
        let ssid = bounded::<32>(ssid)?;
        let passphrase = bounded::<64>(passphrase)?;
        let cfg = self.config_mut(iid)?;

        if cfg.ssid != ssid {
            cfg.ssid = ssid;
            engine.notify_changed(OID, iid, RID_SSID);
        }
        if cfg.passphrase != passphrase {
            cfg.passphrase = passphrase;
            engine.notify_changed(OID, iid, RID_WPA_KEY_PHRASE);
        }
        Ok(())
    }

    /// Bootstrap setter for the enable flag. On change notifies enable and
    /// status and persists the flag.
    pub fn set_instance_enable(
        &mut self,
        iid: Iid,
        enabled: bool,
        engine: &mut dyn EnginePort,
    ) -> Result<()> {
        let cfg = self.config_mut(iid)?;
        if cfg.enabled == enabled {
            return Ok(());
        }
        cfg.enabled = enabled;
        engine.notify_changed(OID, iid, RID_ENABLE);
        engine.notify_changed(OID, iid, RID_STATUS);

        let namespace = if iid == WRITABLE {
            keys::NS_WRITABLE
        } else {
            keys::NS_PRECONFIGURED
        };
        persist(
            "enable",
            self.storage.set_u8(namespace, keys::ENABLE, u8::from(enabled)),
        );
        Ok(())
    }

    pub fn set_writable_iface_failed(&mut self, failed: bool, engine: &mut dyn EnginePort) {
        if self.writable_iface_failed != failed {
            self.writable_iface_failed = failed;
            engine.notify_changed(OID, WRITABLE, RID_STATUS);
        }
    }

    fn status(&self, iid: Iid, cfg: &WlanConfig) -> i64 {
        if iid == WRITABLE && self.writable_iface_failed {
            STATUS_ERROR
        } else if cfg.enabled {
            STATUS_UP
        } else {
            STATUS_DISABLED
        }
    }

    fn bssid(&self) -> Result<String> {
        let mac = self.iface.mac().map_err(|e| {
            warn!("wlan: MAC query failed: {}", e);
            ErrorKind::Internal
        })?;
        let mut out = String::with_capacity(12);
        for b in mac {
            write!(out, "{:02X}", b).map_err(|_| ErrorKind::Internal)?;
        }
        Ok(out)
    }

    fn standard(&self) -> Result<i64> {
        let bitmap = self.iface.protocol_bitmap()?;
        match bitmap {
            b if b == protocol::B => Ok(STANDARD_80211B),
            b if b == protocol::B | protocol::G => Ok(STANDARD_80211G),
            b if b == protocol::B | protocol::G | protocol::N => Ok(STANDARD_80211N),
            other => {
                warn!("wlan: unexpected protocol bitmap {:#04x}", other);
                Err(ErrorKind::Internal)
            }
        }
    }
}

/// Persist every changed field and emit the matching notifications.
/// Returns whether the active connection is affected.
fn commit_changes<S: StoragePort>(
    storage: &mut S,
    engine: &mut dyn EnginePort,
    new: &WlanConfig,
    old: &WlanConfig,
) -> bool {
    let mut reconfigure = false;

    if new.enabled != old.enabled {
        reconfigure = true;
        persist(
            "writable enable",
            storage.set_u8(keys::NS_WRITABLE, keys::ENABLE, u8::from(new.enabled)),
        );
        persist(
            "preconfigured enable",
            storage.set_u8(keys::NS_PRECONFIGURED, keys::ENABLE, u8::from(!new.enabled)),
        );
        engine.notify_changed(OID, WRITABLE, RID_ENABLE);
        engine.notify_changed(OID, WRITABLE, RID_STATUS);
    }

    if new.ssid != old.ssid {
        reconfigure |= new.enabled;
        persist("ssid", storage.set_str(keys::NS_WRITABLE, keys::SSID, &new.ssid));
        engine.notify_changed(OID, WRITABLE, RID_SSID);
    }

    if new.passphrase != old.passphrase {
        reconfigure |= new.enabled;
        persist(
            "passphrase",
            storage.set_str(keys::NS_WRITABLE, keys::PASSWORD, &new.passphrase),
        );
        engine.notify_changed(OID, WRITABLE, RID_WPA_KEY_PHRASE);
    }

    reconfigure
}

impl<S, I> Lwm2mObject for WlanObject<S, I>
where
    S: StoragePort + 'static,
    I: InterfaceInfoPort + 'static,
{
    fn oid(&self) -> Oid {
        OID
    }

    fn list_instances(&self) -> Vec<Iid> {
        vec![WRITABLE, PRECONFIGURED]
    }

    fn list_resources(&self, iid: Iid) -> &'static [ResourceDef] {
        if iid == WRITABLE {
            &WRITABLE_RESOURCES
        } else {
            &PRECONFIGURED_RESOURCES
        }
    }

    fn resource_read(&self, iid: Iid, rid: Rid) -> Result<Value> {
        let cfg = self.instance_config(iid).ok_or(ErrorKind::NotFound)?;
        match rid {
            RID_INTERFACE_NAME => Ok(Value::Str(
                if iid == WRITABLE {
                    "writable wlan config"
                } else {
                    "preconfigured fallback"
                }
                .into(),
            )),
            RID_ENABLE => Ok(Value::Bool(cfg.enabled)),
            RID_STATUS => Ok(Value::Int(self.status(iid, cfg))),
            RID_BSSID => self.bssid().map(Value::Str),
            RID_SSID => Ok(Value::Str(cfg.ssid.as_str().into())),
            RID_MODE => Ok(Value::Int(MODE_CLIENT)),
            RID_CHANNEL => Ok(Value::Int(i64::from(self.iface.primary_channel()?))),
            RID_STANDARD => self.standard().map(Value::Int),
            RID_AUTH_MODE => Ok(Value::Int(AUTH_PSK)),
            _ => Err(ErrorKind::MethodNotAllowed),
        }
    }

    fn resource_write(&mut self, iid: Iid, rid: Rid, value: Value) -> Result<()> {
        if iid != WRITABLE {
            return Err(ErrorKind::MethodNotAllowed);
        }
        let cfg = self.writable.live_mut();
        match rid {
            RID_ENABLE => cfg.enabled = value.as_bool()?,
            RID_SSID => cfg.ssid = bounded(value.as_str()?)?,
            RID_WPA_KEY_PHRASE => cfg.passphrase = bounded(value.as_str()?)?,
            _ => return Err(ErrorKind::MethodNotAllowed),
        }
        Ok(())
    }

    /// Inside a Write-Replace only the live state is cleared; the engine's
    /// commit persists it. A standalone reset runs its own transaction so
    /// the change is persisted, notified and reconfigured the same way.
    fn instance_reset(&mut self, iid: Iid, engine: &mut dyn EnginePort) -> Result<()> {
        if iid != WRITABLE {
            return Err(ErrorKind::MethodNotAllowed);
        }
        self.set_writable_iface_failed(false, engine);
        if self.writable.phase() != TxPhase::Idle {
            *self.writable.live_mut() = WlanConfig::default();
            return Ok(());
        }

        self.transaction_begin()?;
        *self.writable.live_mut() = WlanConfig::default();
        let outcome = self
            .transaction_validate()
            .and_then(|()| self.transaction_commit(engine));
        if outcome.is_err() {
            self.writable.rollback();
        }
        outcome
    }

    fn transaction_begin(&mut self) -> Result<()> {
        self.writable.begin();
        Ok(())
    }

    fn transaction_validate(&mut self) -> Result<()> {
        self.writable.validate(|_| Ok(()))
    }

    fn transaction_commit(&mut self, engine: &mut dyn EnginePort) -> Result<()> {
        let Self {
            storage, writable, ..
        } = self;
        writable.commit(|new, old| {
            if commit_changes(storage, engine, new, old) {
                info!("wlan: writable config changed, scheduling reconfigure");
                engine.schedule(Job::ReconfigureNetwork, RECONFIGURE_DELAY);
            }
            Ok(())
        })
    }

    fn transaction_rollback(&mut self) -> Result<()> {
        self.writable.rollback();
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
