//! Event loop for engines whose sockets ride on the cellular modem.
//!
//! The modem cannot wake a `select()`, so each iteration polls every
//! socket's modem buffer, serves those with data and then runs the engine
//! scheduler. The scheduler wait (capped at 100 ms) is split evenly across
//! the sockets so one iteration never exceeds it.

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::sync::Arc;

use log::{error, info, warn};

use crate::error::{ErrorKind, Result};

pub const MAX_WAIT_MS: u32 = 100;

/// What the loop needs from the LwM2M engine.
pub trait EventLoopEngine {
    /// Time until the next scheduled job, capped at `max_ms`.
    fn sched_wait_ms(&mut self, max_ms: u32) -> u32;

    fn socket_count(&self) -> usize;

    /// Poll socket `index` for buffered data within `timeout_ms`.
    fn poll_socket(&mut self, index: usize, timeout_ms: u32) -> Result<bool>;

    /// Handle one incoming message on socket `index`.
    fn serve(&mut self, index: usize) -> Result<()>;

    /// Run every job that is due.
    fn sched_run(&mut self);
}

#[derive(Default)]
pub struct CellularEventLoop {
    running: Arc<AtomicBool>,
}

/// Clonable handle to stop a running loop from elsewhere.
#[derive(Clone)]
pub struct EventLoopHandle {
    running: Arc<AtomicBool>,
}

impl EventLoopHandle {
    /// Request the loop to stop after the current iteration.
    /// `Internal` if it is not running.
    pub fn interrupt(&self) -> Result<()> {
        self.running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| info!("event loop: interrupt requested"))
            .map_err(|_| ErrorKind::Internal)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl CellularEventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> EventLoopHandle {
        EventLoopHandle { running: Arc::clone(&self.running) }
    }

    /// Run until interrupted. `Internal` if the loop is already running.
    pub fn run<E: EventLoopEngine>(&self, engine: &mut E) -> Result<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            error!("event loop: already running");
            return Err(ErrorKind::Internal);
        }

        while self.running.load(Ordering::Acquire) {
            let wait_ms = engine.sched_wait_ms(MAX_WAIT_MS);
            let sockets = engine.socket_count();

            if sockets == 0 {
                std::thread::sleep(Duration::from_millis(u64::from(wait_ms)));
            } else {
                let per_socket = wait_ms / sockets as u32;
                for index in 0..sockets {
                    let has_data = engine.poll_socket(index, per_socket).unwrap_or(false);
                    if has_data {
                        if let Err(e) = engine.serve(index) {
                            warn!("event loop: serve on socket {} failed: {}", index, e);
                        }
                    }
                }
            }

            engine.sched_run();
        }
        info!("event loop: stopped");
        Ok(())
    }
}
