//! Push Button object (oid 3347), single instance.
//!
//! Reads return what the ISR last stored. `update` diffs against the values
//! seen on the previous poll so each change produces one notification.

use core::any::Any;
use std::sync::Arc;

use crate::app::ports::EnginePort;
use crate::drivers::button::ButtonInput;
use crate::error::{ErrorKind, Result};
use crate::lwm2m::{Access, Iid, Lwm2mObject, Oid, ResourceDef, Rid, Value};

pub const OID: Oid = 3347;
pub const IID: Iid = 0;

pub const RID_DIGITAL_INPUT_STATE: Rid = 5500;
pub const RID_DIGITAL_INPUT_COUNTER: Rid = 5501;

static RESOURCES: [ResourceDef; 2] = [
    ResourceDef::new(RID_DIGITAL_INPUT_STATE, Access::Read),
    ResourceDef::new(RID_DIGITAL_INPUT_COUNTER, Access::Read),
];

pub struct PushButtonObject {
    input: Arc<ButtonInput>,
    last_state: bool,
    last_presses: u32,
}

impl PushButtonObject {
    pub fn new(input: Arc<ButtonInput>) -> Self {
        let last_state = input.is_pressed();
        let last_presses = input.presses();
        Self { input, last_state, last_presses }
    }
}

impl Lwm2mObject for PushButtonObject {
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
            RID_DIGITAL_INPUT_STATE => Ok(Value::Bool(self.input.is_pressed())),
            // Counter wraps like the underlying i32 resource.
            RID_DIGITAL_INPUT_COUNTER => Ok(Value::Int(i64::from(self.input.presses() as i32))),
            _ => Err(ErrorKind::MethodNotAllowed),
        }
    }

    fn update(&mut self, engine: &mut dyn EnginePort) {
        let presses = self.input.presses();
        if presses != self.last_presses {
            self.last_presses = presses;
            engine.notify_changed(OID, IID, RID_DIGITAL_INPUT_COUNTER);
        }

        let state = self.input.is_pressed();
        if state != self.last_state {
            self.last_state = state;
            engine.notify_changed(OID, IID, RID_DIGITAL_INPUT_STATE);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
