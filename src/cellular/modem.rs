//! Modem port consumed by [`CellularSocket`](super::socket::CellularSocket).
//!
//! The vendor modem stack owns the UART and the AT framing. This module
//! only fixes the operations the socket layer needs and the shape of the
//! asynchronous AT completion.

use core::fmt;
use std::sync::mpsc::SyncSender;

use crate::error::ErrorKind;

/// Modem-level socket handle.
pub type ModemSocketId = u32;

/// Textual dotted IP as returned by the modem's DNS facility.
pub type IpString = heapless::String<40>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    Stream,
    Datagram,
}

/// A raw AT command dispatched with a response prefix filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtRequest {
    /// Correlates the completion with this dispatch.
    pub id: u32,
    /// Only response lines starting with this prefix are collected.
    pub prefix: &'static str,
    pub command: heapless::String<32>,
}

/// Delivered on the completion channel from the modem's response thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtCompletion {
    pub id: u32,
    /// Final result code was `OK`.
    pub success: bool,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemError {
    /// DNS lookup failed.
    Resolve,
    /// Socket open / connect rejected.
    Open,
    /// Read or write rejected by the modem.
    Io,
    /// Per-call receive timeout elapsed.
    Timeout,
    /// AT command could not be queued.
    Dispatch,
}

impl fmt::Display for ModemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolve => write!(f, "DNS resolution failed"),
            Self::Open => write!(f, "socket open failed"),
            Self::Io => write!(f, "modem I/O error"),
            Self::Timeout => write!(f, "modem timed out"),
            Self::Dispatch => write!(f, "AT command dispatch failed"),
        }
    }
}

impl From<ModemError> for ErrorKind {
    fn from(e: ModemError) -> Self {
        match e {
            ModemError::Resolve => Self::AddressNotAvailable,
            ModemError::Open => Self::ConnectionRefused,
            ModemError::Timeout => Self::Timeout,
            ModemError::Io | ModemError::Dispatch => Self::Io,
        }
    }
}

/// Operations of the AT-command modem. Shared by all sockets through
/// `Arc`, so every method takes `&self`.
pub trait ModemPort {
    fn resolve(&self, host: &str) -> Result<IpString, ModemError>;

    fn connect(
        &self,
        ip: &str,
        port: u16,
        kind: SocketKind,
        connect_timeout_ms: u32,
        recv_timeout_ms: u32,
    ) -> Result<ModemSocketId, ModemError>;

    /// Returns the number of bytes the modem accepted.
    fn send(&self, socket: ModemSocketId, data: &[u8]) -> Result<usize, ModemError>;

    fn set_recv_timeout(&self, socket: ModemSocketId, timeout_ms: u32) -> Result<(), ModemError>;

    fn recv(&self, socket: ModemSocketId, buf: &mut [u8]) -> Result<usize, ModemError>;

    fn disconnect(&self, socket: ModemSocketId);

    fn max_send_len(&self) -> usize;

    fn max_recv_len(&self) -> usize;

    /// Queue `request`; the completion is sent on `done` when the modem
    /// answers. Completions may arrive late, after the caller gave up.
    fn send_at_command(
        &self,
        request: AtRequest,
        done: SyncSender<AtCompletion>,
    ) -> Result<(), ModemError>;
}

/// Index of the unread-length field in `+QIRD: <total>,<read>,<unread>`.
const QIRD_UNREAD_FIELD: usize = 2;

/// Parse a `+QIRD` response line. `Some(true)` when the modem buffer holds
/// unread data, `None` when the line has too few fields.
///
/// Empty fields are skipped, matching the modem stack's tokenizer.
pub fn parse_qird_unread(line: &str) -> Option<bool> {
    line.split(',')
        .filter(|t| !t.is_empty())
        .nth(QIRD_UNREAD_FIELD)
        .map(|unread| unread.trim() != "0")
}
