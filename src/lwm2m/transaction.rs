//! Object transaction runtime.
//!
//! Wraps an object's writable state in a [`Transactional`] cell that owns
//! both the live value and an immutable snapshot taken at `begin`.
//!
//! ```text
//!           begin            validate ok          commit ok
//!   Idle ──────────▶ Open ──────────────▶ Validated ─────────▶ Idle
//!    ▲                │                      │  commit err
//!    │    rollback    │ validate err         ▼
//!    └────────────────┴──────────────── CommitFailed
//! ```
//!
//! Rollback from any non-idle phase restores the snapshot. A failed commit
//! keeps the snapshot so the engine's rollback can still restore it.

use log::warn;

use crate::error::{ErrorKind, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxPhase {
    Idle,
    Open,
    Validated,
    CommitFailed,
}

pub struct Transactional<S> {
    live: S,
    snapshot: Option<S>,
    phase: TxPhase,
}

impl<S: Clone> Transactional<S> {
    pub fn new(state: S) -> Self {
        Self {
            live: state,
            snapshot: None,
            phase: TxPhase::Idle,
        }
    }

    pub fn phase(&self) -> TxPhase {
        self.phase
    }

    pub fn live(&self) -> &S {
        &self.live
    }

    /// Mutable access to the uncommitted state. Used by `resource_write`
    /// between `begin` and `validate`, and by non-transactional setters.
    pub fn live_mut(&mut self) -> &mut S {
        &mut self.live
    }

    /// Pre-transaction state, present while a transaction is in flight.
    pub fn snapshot(&self) -> Option<&S> {
        self.snapshot.as_ref()
    }

    pub fn begin(&mut self) {
        match self.phase {
            TxPhase::Idle | TxPhase::CommitFailed => {
                self.snapshot = Some(self.live.clone());
                self.phase = TxPhase::Open;
            }
            TxPhase::Open | TxPhase::Validated => {
                warn!("transaction: begin while {:?}, keeping existing snapshot", self.phase);
            }
        }
    }

    /// Run `check` over the live state. Must not have side effects.
    pub fn validate<F>(&mut self, check: F) -> Result<()>
    where
        F: FnOnce(&S) -> Result<()>,
    {
        if !matches!(self.phase, TxPhase::Open | TxPhase::Validated) {
            warn!("transaction: validate while {:?}", self.phase);
            return Err(ErrorKind::Internal);
        }
        check(&self.live)?;
        self.phase = TxPhase::Validated;
        Ok(())
    }

    /// Apply the validated live state. `apply` receives `(new, previous)`.
    pub fn commit<F>(&mut self, apply: F) -> Result<()>
    where
        F: FnOnce(&S, &S) -> Result<()>,
    {
        if self.phase != TxPhase::Validated {
            warn!("transaction: commit while {:?}", self.phase);
            return Err(ErrorKind::Internal);
        }
        let Some(previous) = self.snapshot.as_ref() else {
            return Err(ErrorKind::Internal);
        };
        match apply(&self.live, previous) {
            Ok(()) => {
                self.snapshot = None;
                self.phase = TxPhase::Idle;
                Ok(())
            }
            Err(e) => {
                self.phase = TxPhase::CommitFailed;
                Err(e)
            }
        }
    }

    pub fn rollback(&mut self) {
        if let Some(previous) = self.snapshot.take() {
            self.live = previous;
        }
        self.phase = TxPhase::Idle;
    }
}
