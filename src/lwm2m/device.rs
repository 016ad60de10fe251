//! Device object (oid 3), single instance.
//!
//! Static identity plus the current time. The reboot resource only raises
//! a flag; the main loop owns the actual restart.

use core::any::Any;
use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::info;

use crate::adapters::device_id::{serial_number, MacAddress, SerialString};
use crate::adapters::time::Clock;
use crate::app::ports::EnginePort;
use crate::error::{ErrorKind, Result};
use crate::lwm2m::{Access, Iid, Lwm2mObject, Oid, ResourceDef, Rid, Value};

pub const OID: Oid = 3;
pub const IID: Iid = 0;

pub const RID_MANUFACTURER: Rid = 0;
pub const RID_MODEL_NUMBER: Rid = 1;
pub const RID_SERIAL_NUMBER: Rid = 2;
pub const RID_FIRMWARE_VERSION: Rid = 3;
pub const RID_REBOOT: Rid = 4;
pub const RID_ERROR_CODE: Rid = 11;
pub const RID_CURRENT_TIME: Rid = 13;
pub const RID_SUPPORTED_BINDING: Rid = 16;

const MANUFACTURER: &str = "Espressif";
const MODEL_NUMBER: &str = "ESP32";
const BINDING_UDP: &str = "U";
const NO_ERROR: i64 = 0;

static RESOURCES: [ResourceDef; 8] = [
    ResourceDef::new(RID_MANUFACTURER, Access::Read),
    ResourceDef::new(RID_MODEL_NUMBER, Access::Read),
    ResourceDef::new(RID_SERIAL_NUMBER, Access::Read),
    ResourceDef::new(RID_FIRMWARE_VERSION, Access::Read),
    ResourceDef::new(RID_REBOOT, Access::Execute),
    ResourceDef::new(RID_ERROR_CODE, Access::Read),
    ResourceDef::new(RID_CURRENT_TIME, Access::Read),
    ResourceDef::new(RID_SUPPORTED_BINDING, Access::Read),
];

pub struct DeviceObject<C: Clock> {
    clock: C,
    serial: SerialString,
    reboot_requested: Arc<AtomicBool>,
    last_time: i64,
}

impl<C: Clock> DeviceObject<C> {
    pub fn new(clock: C, mac: &MacAddress) -> Self {
        let last_time = clock.unix_secs();
        Self {
            clock,
            serial: serial_number(mac),
            reboot_requested: Arc::new(AtomicBool::new(false)),
            last_time,
        }
    }

    /// Flag set by an Execute on the reboot resource.
    pub fn reboot_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.reboot_requested)
    }
}

impl<C: Clock + 'static> Lwm2mObject for DeviceObject<C> {
    fn oid(&self) -> Oid {
        OID
    }

    fn list_instances(&self) -> Vec<Iid> {
        vec![IID]
    }

    fn list_resources(&self, _iid: Iid) -> &'static [ResourceDef] {
        &RESOURCES
    }

    fn resource_read(&self, iid: Iid, rid: Rid) -> Result<Value> {
        if iid != IID {
            return Err(ErrorKind::NotFound);
        }
        match rid {
            RID_MANUFACTURER => Ok(Value::Str(MANUFACTURER.into())),
            RID_MODEL_NUMBER => Ok(Value::Str(MODEL_NUMBER.into())),
            RID_SERIAL_NUMBER => Ok(Value::Str(self.serial.as_str().into())),
            RID_FIRMWARE_VERSION => Ok(Value::Str(env!("CARGO_PKG_VERSION").into())),
            RID_ERROR_CODE => Ok(Value::Int(NO_ERROR)),
            RID_CURRENT_TIME => Ok(Value::Int(self.clock.unix_secs())),
            RID_SUPPORTED_BINDING => Ok(Value::Str(BINDING_UDP.into())),
            _ => Err(ErrorKind::MethodNotAllowed),
        }
    }

    fn resource_execute(&mut self, iid: Iid, rid: Rid) -> Result<()> {
        if iid != IID {
            return Err(ErrorKind::NotFound);
        }
        match rid {
            RID_REBOOT => {
                info!("device: reboot requested");
                self.reboot_requested.store(true, Ordering::Release);
                Ok(())
            }
            _ => Err(ErrorKind::MethodNotAllowed),
        }
    }

    fn update(&mut self, engine: &mut dyn EnginePort) {
        let now = self.clock.unix_secs();
        if now != self.last_time {
            self.last_time = now;
            engine.notify_changed(OID, IID, RID_CURRENT_TIME);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
