//! LwM2M data model: objects exposed to the external engine.
//!
//! Each concrete object implements [`Lwm2mObject`], the capability set the
//! engine calls into (list, read, write, execute, reset and the
//! begin/validate/commit/rollback transaction hooks). The
//! [`DataModel`](registry::DataModel) holds one boxed handle per object id.
//!
//! | Object             | Oid  | Module          |
//! |--------------------|------|-----------------|
//! | Device             | 3    | `device`        |
//! | WLAN connectivity  | 12   | `wlan`          |
//! | Light control      | 3311 | `light_control` |
//! | Push button        | 3347 | `push_button`   |

use core::any::Any;

use crate::app::ports::EnginePort;
use crate::error::{ErrorKind, Result};

pub mod device;
pub mod light_control;
pub mod push_button;
pub mod registry;
pub mod transaction;
pub mod wlan;

pub type Oid = u16;
pub type Iid = u16;
pub type Rid = u16;

/// Typed resource value crossing the engine boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl Value {
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            _ => Err(ErrorKind::BadRequest),
        }
    }

    pub fn as_i32(&self) -> Result<i32> {
        match self {
            Self::Int(v) => i32::try_from(*v).map_err(|_| ErrorKind::BadRequest),
            _ => Err(ErrorKind::BadRequest),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Self::Str(s) => Ok(s),
            _ => Err(ErrorKind::BadRequest),
        }
    }
}

/// Access kind advertised by `list_resources`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
    Execute,
}

impl Access {
    pub fn readable(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    pub fn writable(self) -> bool {
        matches!(self, Self::Write | Self::ReadWrite)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceDef {
    pub rid: Rid,
    pub access: Access,
}

impl ResourceDef {
    pub const fn new(rid: Rid, access: Access) -> Self {
        Self { rid, access }
    }
}

/// Capability set every LwM2M object provides to the engine.
///
/// Transaction hooks default to no-ops so read-only objects only implement
/// the read side. The engine guarantees the ordering
/// `begin → write* → validate → commit | rollback` per object and never
/// interleaves two transactions on the same object.
pub trait Lwm2mObject: Any {
    fn oid(&self) -> Oid;

    fn list_instances(&self) -> Vec<Iid>;

    fn list_resources(&self, iid: Iid) -> &'static [ResourceDef];

    fn resource_read(&self, iid: Iid, rid: Rid) -> Result<Value>;

    fn resource_write(&mut self, _iid: Iid, _rid: Rid, _value: Value) -> Result<()> {
        Err(ErrorKind::MethodNotAllowed)
    }

    fn resource_execute(&mut self, _iid: Iid, _rid: Rid) -> Result<()> {
        Err(ErrorKind::MethodNotAllowed)
    }

    fn instance_reset(&mut self, _iid: Iid, _engine: &mut dyn EnginePort) -> Result<()> {
        Err(ErrorKind::MethodNotAllowed)
    }

    fn transaction_begin(&mut self) -> Result<()> {
        Ok(())
    }

    fn transaction_validate(&mut self) -> Result<()> {
        Ok(())
    }

    fn transaction_commit(&mut self, _engine: &mut dyn EnginePort) -> Result<()> {
        Ok(())
    }

    fn transaction_rollback(&mut self) -> Result<()> {
        Ok(())
    }

    /// Foreground poll, once per event-loop iteration. Objects with
    /// interrupt-fed state diff it here and notify the engine.
    fn update(&mut self, _engine: &mut dyn EnginePort) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
