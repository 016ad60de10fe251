//! Connection status indicator.
//!
//! Derived each foreground iteration from the network, transport and
//! session-socket state; transitions are logged once.

use log::{info, warn};

use crate::error::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Inputs sampled by the foreground loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusInputs {
    pub network_up: bool,
    pub offline: bool,
    pub socket_connected: bool,
    pub last_error: Option<ErrorKind>,
}

impl ConnectionStatus {
    pub fn derive(inputs: &StatusInputs) -> Self {
        match inputs {
            StatusInputs { network_up: false, .. } => Self::Disconnected,
            StatusInputs { offline: true, .. } => Self::Connecting,
            StatusInputs { last_error: Some(_), socket_connected: false, .. } => Self::Error,
            StatusInputs { socket_connected: true, .. } => Self::Connected,
            _ => Self::Connecting,
        }
    }
}

pub struct StatusIndicator {
    current: ConnectionStatus,
}

impl Default for StatusIndicator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusIndicator {
    pub fn new() -> Self {
        Self { current: ConnectionStatus::Disconnected }
    }

    pub fn current(&self) -> ConnectionStatus {
        self.current
    }

    pub fn update(&mut self, inputs: &StatusInputs) -> ConnectionStatus {
        let next = ConnectionStatus::derive(inputs);
        if next != self.current {
            match (next, inputs.last_error) {
                (ConnectionStatus::Error, Some(e)) => warn!("status: {:?} -> Error ({})", self.current, e),
                _ => info!("status: {:?} -> {:?}", self.current, next),
            }
            self.current = next;
        }
        next
    }
}
