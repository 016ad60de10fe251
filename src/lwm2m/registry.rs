//! Polymorphic holder for the registered objects.
//!
//! The engine addresses objects by oid; `DataModel` dispatches to the boxed
//! [`Lwm2mObject`] and drives the transaction sequence for batched writes.

use log::{debug, warn};

use crate::app::ports::EnginePort;
use crate::error::{ErrorKind, Result};
use crate::lwm2m::{Iid, Lwm2mObject, Oid, Rid, Value};

#[derive(Default)]
pub struct DataModel {
    objects: Vec<Box<dyn Lwm2mObject>>,
}

impl DataModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object. A second object with the same oid is rejected.
    pub fn register(&mut self, object: Box<dyn Lwm2mObject>) -> Result<()> {
        let oid = object.oid();
        if self.objects.iter().any(|o| o.oid() == oid) {
            warn!("data model: oid {} already registered", oid);
            return Err(ErrorKind::Internal);
        }
        debug!("data model: registered oid {}", oid);
        self.objects.push(object);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn oids(&self) -> impl Iterator<Item = Oid> + '_ {
        self.objects.iter().map(|o| o.oid())
    }

    pub fn object(&self, oid: Oid) -> Option<&dyn Lwm2mObject> {
        self.objects.iter().find(|o| o.oid() == oid).map(AsRef::as_ref)
    }

    pub fn object_mut(&mut self, oid: Oid) -> Option<&mut dyn Lwm2mObject> {
        match self.objects.iter_mut().find(|o| o.oid() == oid) {
            Some(o) => Some(o.as_mut()),
            None => None,
        }
    }

    /// Concrete access for callers that need object-specific setters.
    pub fn downcast_mut<T: Lwm2mObject>(&mut self, oid: Oid) -> Option<&mut T> {
        self.object_mut(oid)?.as_any_mut().downcast_mut::<T>()
    }

    pub fn downcast_ref<T: Lwm2mObject>(&self, oid: Oid) -> Option<&T> {
        self.object(oid)?.as_any().downcast_ref::<T>()
    }

    fn require_mut(&mut self, oid: Oid) -> Result<&mut dyn Lwm2mObject> {
        self.object_mut(oid).ok_or(ErrorKind::NotFound)
    }

    pub fn read(&self, oid: Oid, iid: Iid, rid: Rid) -> Result<Value> {
        let obj = self.object(oid).ok_or(ErrorKind::NotFound)?;
        obj.resource_read(iid, rid)
    }

    pub fn execute(&mut self, oid: Oid, iid: Iid, rid: Rid) -> Result<()> {
        self.require_mut(oid)?.resource_execute(iid, rid)
    }

    pub fn reset(&mut self, oid: Oid, iid: Iid, engine: &mut dyn EnginePort) -> Result<()> {
        self.require_mut(oid)?.instance_reset(iid, engine)
    }

    /// Apply `writes` to one object as a single transaction.
    ///
    /// Runs begin → writes → validate → commit. On the first failure the
    /// object is rolled back and that error is returned.
    pub fn write(
        &mut self,
        oid: Oid,
        writes: &[(Iid, Rid, Value)],
        engine: &mut dyn EnginePort,
    ) -> Result<()> {
        let obj = self.require_mut(oid)?;
        obj.transaction_begin()?;

        let outcome = writes
            .iter()
            .try_for_each(|(iid, rid, value)| obj.resource_write(*iid, *rid, value.clone()))
            .and_then(|()| obj.transaction_validate())
            .and_then(|()| obj.transaction_commit(engine));

        if let Err(e) = outcome {
            debug!("data model: oid {} transaction aborted: {}", oid, e);
            if let Err(rb) = obj.transaction_rollback() {
                warn!("data model: oid {} rollback failed: {}", oid, rb);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Foreground poll of every object.
    pub fn update_all(&mut self, engine: &mut dyn EnginePort) {
        for obj in &mut self.objects {
            obj.update(engine);
        }
    }
}
