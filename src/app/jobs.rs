//! Engine-side glue: deferred job queue, change notifications and the
//! transport offline/reconnect controls.
//!
//! ```text
//!   object commit ──schedule──▶ Channel (depth 8) ──absorb──▶ pending (by due time)
//!                                                                │
//!   event loop ◀──────────────────── drain_due(now) ◀────────────┘
//! ```
//!
//! Posting goes through `&self` so a job can be queued from any borrow of
//! the context; the foreground loop is the only consumer.

use core::time::Duration;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{debug, info, warn};

use crate::app::ports::{EnginePort, Job, TransportPort};
use crate::error::{ErrorKind, Result};
use crate::lwm2m::{Iid, Oid, Rid};

pub const JOB_QUEUE_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledJob {
    pub job: Job,
    pub due_ms: u64,
}

pub struct JobQueue {
    incoming: Channel<CriticalSectionRawMutex, ScheduledJob, JOB_QUEUE_DEPTH>,
    pending: heapless::Vec<ScheduledJob, JOB_QUEUE_DEPTH>,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    pub const fn new() -> Self {
        Self {
            incoming: Channel::new(),
            pending: heapless::Vec::new(),
        }
    }

    /// Queue `job` to run at `due_ms`. `OutOfMemory` when the channel is full.
    pub fn post(&self, job: Job, due_ms: u64) -> Result<()> {
        self.incoming
            .try_send(ScheduledJob { job, due_ms })
            .map_err(|_| ErrorKind::OutOfMemory)
    }

    fn absorb(&mut self) {
        while let Ok(entry) = self.incoming.try_receive() {
            if self.pending.push(entry).is_err() {
                warn!("jobs: pending list full, dropping {:?}", entry.job);
            }
        }
    }

    /// Remove and return every job due at `now_ms`, earliest first.
    pub fn drain_due(&mut self, now_ms: u64) -> heapless::Vec<Job, JOB_QUEUE_DEPTH> {
        self.absorb();
        self.pending.sort_unstable_by_key(|e| e.due_ms);
        let mut due = heapless::Vec::new();
        self.pending.retain(|e| {
            if e.due_ms <= now_ms {
                // Capacities match, so this never overflows.
                let _ = due.push(e.job);
                false
            } else {
                true
            }
        });
        due
    }

    /// Milliseconds until the next job is due, capped at `max_ms`.
    pub fn wait_ms(&mut self, now_ms: u64, max_ms: u64) -> u64 {
        self.absorb();
        self.pending
            .iter()
            .map(|e| e.due_ms.saturating_sub(now_ms))
            .min()
            .map_or(max_ms, |w| w.min(max_ms))
    }

    pub fn len(&mut self) -> usize {
        self.absorb();
        self.pending.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }
}

/// What the external engine would provide to objects: scheduler, observe
/// notifications and transport control. Notifications are buffered until
/// the engine drains them.
#[derive(Default)]
pub struct EngineContext {
    now_ms: u64,
    jobs: JobQueue,
    notifications: Vec<(Oid, Iid, Rid)>,
    offline: bool,
    reconnect_requested: bool,
}

impl EngineContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_now(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn due_jobs(&mut self) -> heapless::Vec<Job, JOB_QUEUE_DEPTH> {
        self.jobs.drain_due(self.now_ms)
    }

    pub fn wait_ms(&mut self, max_ms: u64) -> u64 {
        self.jobs.wait_ms(self.now_ms, max_ms)
    }

    pub fn pending_jobs(&mut self) -> usize {
        self.jobs.len()
    }

    pub fn drain_notifications(&mut self) -> Vec<(Oid, Iid, Rid)> {
        core::mem::take(&mut self.notifications)
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    /// Returns and clears the pending reconnect request.
    pub fn take_reconnect_request(&mut self) -> bool {
        core::mem::take(&mut self.reconnect_requested)
    }
}

impl EnginePort for EngineContext {
    fn notify_changed(&mut self, oid: Oid, iid: Iid, rid: Rid) {
        debug!("engine: changed /{}/{}/{}", oid, iid, rid);
        self.notifications.push((oid, iid, rid));
    }

    fn schedule(&mut self, job: Job, delay: Duration) {
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        let due = self.now_ms.saturating_add(delay_ms);
        if let Err(e) = self.jobs.post(job, due) {
            warn!("engine: could not schedule {:?}: {}", job, e);
        }
    }
}

impl TransportPort for EngineContext {
    fn enter_offline(&mut self) {
        if !self.offline {
            info!("transport: entering offline mode");
            self.offline = true;
        }
    }

    fn exit_offline(&mut self) {
        if self.offline {
            info!("transport: leaving offline mode");
            self.offline = false;
        }
    }

    fn schedule_reconnect(&mut self) {
        self.reconnect_requested = true;
    }
}
