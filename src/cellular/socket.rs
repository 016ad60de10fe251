//! Blocking socket over the AT-command modem.
//!
//! ## Lifecycle
//!
//! `Closed ──connect──▶ Connected ──close──▶ Closed`. Dropping the socket
//! closes it.
//!
//! ## Buffered-data poll
//!
//! The modem only reports unread data when asked. [`CellularSocket::check_modem_buffer`]
//! sends `AT+QIRD=<id>,0` and waits for the matching completion:
//!
//! ```text
//!   ┌─▶ dispatch(id = n) ──▶ recv_timeout(remaining) ──▶ completion.id == n ?
//!   │                                   │ timeout              │ no: discard, keep waiting
//!   │                                   ▼                      ▼ yes
//!   │                              Err(Timeout)        unread != "0" ──▶ Ok(true)
//!   └────────── elapsed <= budget ◀──────────────────────────── │ no
//!                   │ elapsed > budget
//!                   ▼
//!              Err(Timeout)
//! ```
//!
//! `&mut self` on every call serializes query/wait per socket.

use core::fmt::Write;
use core::num::IntErrorKind;
use core::time::Duration;
use std::sync::mpsc::{sync_channel, RecvTimeoutError};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, trace, warn};

use crate::cellular::modem::{
    parse_qird_unread, AtRequest, IpString, ModemPort, ModemSocketId, SocketKind,
};
use crate::error::{ErrorKind, Result};

pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(30);
pub const CONNECT_TIMEOUT_MS: u32 = 30_000;
pub const HAS_BUFFERED_DATA_TIMEOUT_MS: u32 = 50;

const QIRD_PREFIX: &str = "+QIRD";
/// Completions from earlier dispatches may still be in flight.
const COMPLETION_QUEUE_DEPTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Closed,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketOption {
    RecvTimeout,
    State,
    InnerMtu,
    HasBufferedData,
    BytesSent,
    BytesReceived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionValue {
    RecvTimeout(Duration),
    State(SocketState),
    Mtu(usize),
    Flag(bool),
    Bytes(usize),
}

pub struct CellularSocket<M: ModemPort> {
    modem: Arc<M>,
    kind: SocketKind,
    state: SocketState,
    handle: Option<ModemSocketId>,
    recv_timeout: Duration,
    bytes_sent: usize,
    bytes_received: usize,
    remote_hostname: String,
    remote_ip: IpString,
    remote_port: u16,
    next_request_id: u32,
}

/// Parse a decimal port. Values above `u16::MAX` are `Overflow`, anything
/// non-numeric is `BadRequest`.
fn parse_port(port: &str) -> Result<u16> {
    let value: u64 = port.parse().map_err(|e: core::num::ParseIntError| match e.kind() {
        IntErrorKind::PosOverflow => ErrorKind::Overflow,
        _ => ErrorKind::BadRequest,
    })?;
    u16::try_from(value).map_err(|_| ErrorKind::Overflow)
}

fn timeout_ms(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX)
}

impl<M: ModemPort> CellularSocket<M> {
    pub fn new(modem: Arc<M>, kind: SocketKind) -> Self {
        Self {
            modem,
            kind,
            state: SocketState::Closed,
            handle: None,
            recv_timeout: DEFAULT_RECV_TIMEOUT,
            bytes_sent: 0,
            bytes_received: 0,
            remote_hostname: String::new(),
            remote_ip: IpString::new(),
            remote_port: 0,
            next_request_id: 0,
        }
    }

    pub fn kind(&self) -> SocketKind {
        self.kind
    }

    pub fn state(&self) -> SocketState {
        self.state
    }

    pub fn remote_hostname(&self) -> &str {
        &self.remote_hostname
    }

    /// Resolved address of the peer.
    pub fn remote_host(&self) -> &str {
        &self.remote_ip
    }

    pub fn remote_port(&self) -> u16 {
        self.remote_port
    }

    fn connected_handle(&self) -> Result<ModemSocketId> {
        self.handle.ok_or(ErrorKind::Io)
    }

    pub fn connect(&mut self, host: &str, port: &str) -> Result<()> {
        if self.state == SocketState::Connected {
            warn!("cell: connect on an open socket to {}", self.remote_hostname);
            return Err(ErrorKind::Internal);
        }
        let port = parse_port(port)?;
        let recv_ms = timeout_ms(self.recv_timeout);

        let ip = self.modem.resolve(host).map_err(|e| {
            warn!("cell: resolving {} failed: {}", host, e);
            ErrorKind::AddressNotAvailable
        })?;
        trace!("cell: connecting to {} ({}) port {} recv timeout {} ms", host, ip, port, recv_ms);

        let handle = self
            .modem
            .connect(&ip, port, self.kind, CONNECT_TIMEOUT_MS, recv_ms)
            .map_err(|e| {
                warn!("cell: connect to {}:{} failed: {}", ip, port, e);
                ErrorKind::ConnectionRefused
            })?;

        self.handle = Some(handle);
        self.remote_hostname = host.into();
        self.remote_ip = ip;
        self.remote_port = port;
        self.state = SocketState::Connected;
        info!("cell: socket {} connected to {}:{}", handle, host, port);
        Ok(())
    }

    /// Write all of `data` in one modem call.
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        let handle = self.connected_handle()?;
        match self.modem.send(handle, data) {
            Ok(n) if n == data.len() => {
                self.bytes_sent += n;
                Ok(())
            }
            Ok(n) => {
                warn!("cell: short write {}/{} on socket {}", n, data.len(), handle);
                Err(ErrorKind::Io)
            }
            Err(e) => {
                warn!("cell: send on socket {} failed: {}", handle, e);
                Err(ErrorKind::Io)
            }
        }
    }

    /// Read into `buf`, blocking up to the receive timeout.
    ///
    /// For datagram sockets a read that fills a non-empty `buf` may have
    /// been truncated; it returns `(n, Some(MessageTooLarge))` so the
    /// caller still sees the bytes.
    pub fn receive(&mut self, buf: &mut [u8]) -> Result<(usize, Option<ErrorKind>)> {
        let handle = self.connected_handle()?;
        self.modem
            .set_recv_timeout(handle, timeout_ms(self.recv_timeout))
            .map_err(|_| ErrorKind::Io)?;

        let n = self.modem.recv(handle, buf).map_err(|e| {
            debug!("cell: recv on socket {}: {}", handle, e);
            ErrorKind::from(e)
        })?;
        self.bytes_received += n;

        if self.kind == SocketKind::Datagram && !buf.is_empty() && n == buf.len() {
            return Ok((n, Some(ErrorKind::MessageTooLarge)));
        }
        Ok((n, None))
    }

    pub fn close(&mut self) {
        self.state = SocketState::Closed;
        if let Some(handle) = self.handle.take() {
            self.modem.disconnect(handle);
            debug!("cell: socket {} closed", handle);
        }
    }

    pub fn get_opt(&mut self, option: SocketOption) -> Result<OptionValue> {
        Ok(match option {
            SocketOption::RecvTimeout => OptionValue::RecvTimeout(self.recv_timeout),
            SocketOption::State => OptionValue::State(self.state),
            SocketOption::InnerMtu => {
                OptionValue::Mtu(self.modem.max_send_len().min(self.modem.max_recv_len()))
            }
            SocketOption::HasBufferedData => {
                let flag = self
                    .check_modem_buffer(HAS_BUFFERED_DATA_TIMEOUT_MS)
                    .unwrap_or_else(|e| {
                        trace!("cell: buffered-data poll: {}", e);
                        false
                    });
                OptionValue::Flag(flag)
            }
            SocketOption::BytesSent => OptionValue::Bytes(self.bytes_sent),
            SocketOption::BytesReceived => OptionValue::Bytes(self.bytes_received),
        })
    }

    /// Only the receive timeout is writable.
    pub fn set_opt(&mut self, option: SocketOption, value: OptionValue) -> Result<()> {
        match (option, value) {
            (SocketOption::RecvTimeout, OptionValue::RecvTimeout(t)) => {
                self.recv_timeout = t;
                Ok(())
            }
            (SocketOption::RecvTimeout, _) => Err(ErrorKind::BadRequest),
            _ => Err(ErrorKind::NotSupported),
        }
    }

    fn fresh_request_id(&mut self) -> u32 {
        self.next_request_id = self.next_request_id.wrapping_add(1);
        self.next_request_id
    }

    /// Ask the modem whether unread data is buffered for this socket.
    ///
    /// Returns `Ok(true)` as soon as data is confirmed; keeps re-querying
    /// while the modem reports none and `Timeout` once `timeout_ms` is spent.
    pub fn check_modem_buffer(&mut self, timeout_ms: u32) -> Result<bool> {
        let handle = self.connected_handle()?;
        let mut command = heapless::String::<32>::new();
        write!(command, "AT+QIRD={},0", handle).map_err(|_| ErrorKind::Internal)?;

        let (done_tx, done_rx) = sync_channel(COMPLETION_QUEUE_DEPTH);
        let budget = Duration::from_millis(u64::from(timeout_ms));
        let start = Instant::now();

        loop {
            let id = self.fresh_request_id();
            let request = AtRequest { id, prefix: QIRD_PREFIX, command: command.clone() };
            self.modem.send_at_command(request, done_tx.clone()).map_err(|e| {
                warn!("cell: QIRD dispatch on socket {} failed: {}", handle, e);
                ErrorKind::Io
            })?;

            let has_data = loop {
                let remaining = budget.saturating_sub(start.elapsed());
                let completion = match done_rx.recv_timeout(remaining) {
                    Ok(c) => c,
                    Err(RecvTimeoutError::Timeout) => return Err(ErrorKind::Timeout),
                    Err(RecvTimeoutError::Disconnected) => return Err(ErrorKind::Io),
                };
                if completion.id != id {
                    trace!("cell: discarding stale QIRD completion {}", completion.id);
                    continue;
                }
                if !completion.success {
                    continue;
                }
                match completion.lines.first().and_then(|l| parse_qird_unread(l)) {
                    Some(v) => break v,
                    None => debug!("cell: unparseable QIRD response {:?}", completion.lines),
                }
            };

            if has_data {
                return Ok(true);
            }
            if start.elapsed() > budget {
                return Err(ErrorKind::Timeout);
            }
        }
    }
}

/// Engine-side view of a session socket, independent of the modem behind it.
pub trait SessionSocket {
    fn state(&self) -> SocketState;

    fn check_modem_buffer(&mut self, timeout_ms: u32) -> Result<bool>;

    fn receive(&mut self, buf: &mut [u8]) -> Result<(usize, Option<ErrorKind>)>;
}

impl<M: ModemPort> SessionSocket for CellularSocket<M> {
    fn state(&self) -> SocketState {
        CellularSocket::state(self)
    }

    fn check_modem_buffer(&mut self, timeout_ms: u32) -> Result<bool> {
        CellularSocket::check_modem_buffer(self, timeout_ms)
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<(usize, Option<ErrorKind>)> {
        CellularSocket::receive(self, buf)
    }
}

/// Split a `coap://` or `coaps://` server URI into host and port. A missing
/// port falls back to the scheme's default.
pub fn split_server_uri(uri: &str) -> Result<(&str, &str)> {
    let (rest, default_port) = if let Some(rest) = uri.strip_prefix("coaps://") {
        (rest, "5684")
    } else if let Some(rest) = uri.strip_prefix("coap://") {
        (rest, "5683")
    } else {
        return Err(ErrorKind::BadRequest);
    };
    let authority = rest.split('/').next().unwrap_or_default();
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => (host, port),
        None => (authority, default_port),
    };
    if host.is_empty() {
        return Err(ErrorKind::BadRequest);
    }
    Ok((host, port))
}

impl<M: ModemPort> Drop for CellularSocket<M> {
    fn drop(&mut self) {
        self.close();
    }
}
