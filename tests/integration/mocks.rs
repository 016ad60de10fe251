//! Mock adapters for integration tests.
//!
//! Every mock records the calls it receives so tests can assert on the
//! full history without touching real PWM, NVS, Wi-Fi or modem hardware.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::SyncSender;
use std::time::Duration;

use lwm2m_client::adapters::time::Clock;
use lwm2m_client::adapters::wifi::{ConnectivityError, ConnectivityPort};
use lwm2m_client::app::ports::{
    protocol, EnginePort, InterfaceError, InterfaceInfoPort, Job, PwmError, PwmPort, StorageError,
    StoragePort, TransportPort,
};
use lwm2m_client::cellular::modem::{
    AtCompletion, AtRequest, IpString, ModemError, ModemPort, ModemSocketId, SocketKind,
};
use lwm2m_client::config::{LedChannelConfig, WifiCredentials};
use lwm2m_client::lwm2m::{Iid, Oid, Rid};

// ── PWM ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PwmCall {
    Timer { freq_hz: u32, bits: u32 },
    Channel { channel: u8, gpio: i32 },
    Duty { channel: u8, duty: u32 },
    Release { channel: u8, idle_high: bool },
}

#[derive(Default)]
pub struct MockPwm {
    pub calls: Vec<PwmCall>,
    pub fail_duty_on: Option<u8>,
    pub fail_channel_config: Option<u8>,
}

impl MockPwm {
    /// Last duty written to `channel`.
    pub fn duty(&self, channel: u8) -> Option<u32> {
        self.calls.iter().rev().find_map(|c| match c {
            PwmCall::Duty { channel: ch, duty } if *ch == channel => Some(*duty),
            _ => None,
        })
    }

    pub fn duty_writes(&self) -> usize {
        self.calls.iter().filter(|c| matches!(c, PwmCall::Duty { .. })).count()
    }
}

impl PwmPort for MockPwm {
    fn configure_timer(&mut self, freq_hz: u32, resolution_bits: u32) -> Result<(), PwmError> {
        self.calls.push(PwmCall::Timer { freq_hz, bits: resolution_bits });
        Ok(())
    }

    fn configure_channel(&mut self, channel: u8, gpio: i32) -> Result<(), PwmError> {
        if self.fail_channel_config == Some(channel) {
            return Err(PwmError::ChannelConfig(-1));
        }
        self.calls.push(PwmCall::Channel { channel, gpio });
        Ok(())
    }

    fn set_duty(&mut self, channel: u8, duty: u32) -> Result<(), PwmError> {
        if self.fail_duty_on == Some(channel) {
            return Err(PwmError::DutyWrite(-1));
        }
        self.calls.push(PwmCall::Duty { channel, duty });
        Ok(())
    }

    fn release_channel(&mut self, channel: u8, idle_high: bool) {
        self.calls.push(PwmCall::Release { channel, idle_high });
    }
}

pub fn led_channels(n: u8) -> Vec<LedChannelConfig> {
    (0..n).map(|c| LedChannelConfig { gpio: 20 + i32::from(c), channel: c }).collect()
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stored {
    Str(String),
    U8(u8),
}

#[derive(Default)]
pub struct MockStorage {
    pub entries: HashMap<(String, String), Stored>,
    pub writes: Vec<(String, String)>,
    pub fail_writes: bool,
}

impl MockStorage {
    pub fn with_str(mut self, ns: &str, key: &str, value: &str) -> Self {
        self.entries.insert((ns.into(), key.into()), Stored::Str(value.into()));
        self
    }

    pub fn with_u8(mut self, ns: &str, key: &str, value: u8) -> Self {
        self.entries.insert((ns.into(), key.into()), Stored::U8(value));
        self
    }

    pub fn stored(&self, ns: &str, key: &str) -> Option<&Stored> {
        self.entries.get(&(ns.to_string(), key.to_string()))
    }

    pub fn writes_to(&self, ns: &str, key: &str) -> usize {
        self.writes.iter().filter(|(n, k)| n == ns && k == key).count()
    }
}

impl StoragePort for MockStorage {
    fn get_str(&self, ns: &str, key: &str) -> Result<String, StorageError> {
        match self.stored(ns, key) {
            Some(Stored::Str(s)) => Ok(s.clone()),
            Some(Stored::U8(_)) => Err(StorageError::InvalidValue),
            None => Err(StorageError::NotFound),
        }
    }

    fn set_str(&mut self, ns: &str, key: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::IoError);
        }
        self.writes.push((ns.into(), key.into()));
        self.entries.insert((ns.into(), key.into()), Stored::Str(value.into()));
        Ok(())
    }

    fn get_u8(&self, ns: &str, key: &str) -> Result<u8, StorageError> {
        match self.stored(ns, key) {
            Some(Stored::U8(v)) => Ok(*v),
            Some(Stored::Str(_)) => Err(StorageError::InvalidValue),
            None => Err(StorageError::NotFound),
        }
    }

    fn set_u8(&mut self, ns: &str, key: &str, value: u8) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::IoError);
        }
        self.writes.push((ns.into(), key.into()));
        self.entries.insert((ns.into(), key.into()), Stored::U8(value));
        Ok(())
    }
}

// ── Interface info ────────────────────────────────────────────

pub struct MockIface;

impl InterfaceInfoPort for MockIface {
    fn mac(&self) -> Result<[u8; 6], InterfaceError> {
        Ok([0x24, 0x6F, 0x28, 0xAA, 0xBB, 0xCC])
    }

    fn primary_channel(&self) -> Result<u8, InterfaceError> {
        Ok(11)
    }

    fn protocol_bitmap(&self) -> Result<u8, InterfaceError> {
        Ok(protocol::B | protocol::G | protocol::N)
    }
}

pub fn factory_credentials() -> WifiCredentials {
    WifiCredentials {
        ssid: heapless::String::try_from("factory-ap").unwrap(),
        passphrase: heapless::String::try_from("factory-pass").unwrap(),
    }
}

// ── Engine ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Notify(Oid, Iid, Rid),
    Schedule(Job, Duration),
    EnterOffline,
    ExitOffline,
    Reconnect,
}

#[derive(Default)]
pub struct MockEngine {
    pub calls: Vec<EngineCall>,
}

impl MockEngine {
    pub fn scheduled(&self, job: Job) -> usize {
        self.calls
            .iter()
            .filter(|c| matches!(c, EngineCall::Schedule(j, _) if *j == job))
            .count()
    }

    pub fn notified(&self, oid: Oid, iid: Iid, rid: Rid) -> usize {
        self.calls
            .iter()
            .filter(|c| **c == EngineCall::Notify(oid, iid, rid))
            .count()
    }
}

impl EnginePort for MockEngine {
    fn notify_changed(&mut self, oid: Oid, iid: Iid, rid: Rid) {
        self.calls.push(EngineCall::Notify(oid, iid, rid));
    }

    fn schedule(&mut self, job: Job, delay: Duration) {
        self.calls.push(EngineCall::Schedule(job, delay));
    }
}

impl TransportPort for MockEngine {
    fn enter_offline(&mut self) {
        self.calls.push(EngineCall::EnterOffline);
    }

    fn exit_offline(&mut self) {
        self.calls.push(EngineCall::ExitOffline);
    }

    fn schedule_reconnect(&mut self) {
        self.calls.push(EngineCall::Reconnect);
    }
}

// ── Wi-Fi ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WifiCall {
    Credentials(String),
    Connect,
    Disconnect,
}

#[derive(Default)]
pub struct MockWifi {
    pub calls: Vec<WifiCall>,
    pub reject: Vec<String>,
    pub ssid: String,
    pub connected: bool,
}

impl MockWifi {
    pub fn rejecting(ssids: &[&str]) -> Self {
        Self { reject: ssids.iter().map(|s| s.to_string()).collect(), ..Default::default() }
    }

    pub fn connects(&self) -> usize {
        self.calls.iter().filter(|c| **c == WifiCall::Connect).count()
    }
}

impl ConnectivityPort for MockWifi {
    fn connect(&mut self) -> Result<(), ConnectivityError> {
        self.calls.push(WifiCall::Connect);
        if self.reject.contains(&self.ssid) {
            return Err(ConnectivityError::ConnectionFailed);
        }
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.calls.push(WifiCall::Disconnect);
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn poll(&mut self) {}

    fn set_credentials(&mut self, ssid: &str, _password: &str) -> Result<(), ConnectivityError> {
        self.calls.push(WifiCall::Credentials(ssid.into()));
        self.ssid = ssid.into();
        Ok(())
    }

    fn rssi(&self) -> Option<i8> {
        self.connected.then_some(-55)
    }
}

// ── Clock ─────────────────────────────────────────────────────

/// Clock advanced by the test.
#[derive(Default)]
pub struct ManualClock {
    pub now_ms: Cell<u64>,
}

impl ManualClock {
    pub fn advance(&self, ms: u64) {
        self.now_ms.set(self.now_ms.get() + ms);
    }
}

impl Clock for &ManualClock {
    fn uptime_ms(&self) -> u64 {
        self.now_ms.get()
    }

    fn unix_secs(&self) -> i64 {
        (self.now_ms.get() / 1000) as i64
    }
}

// ── Modem ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModemCall {
    Resolve(String),
    Connect { ip: String, port: u16, kind: SocketKind, connect_ms: u32, recv_ms: u32 },
    Send(usize),
    SetRecvTimeout(u32),
    Recv(usize),
    Disconnect(ModemSocketId),
    At(String),
}

/// Scripted answer to one `AT+QIRD` dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QirdReply {
    /// `+QIRD: <total>,<read>,<unread>` with `OK`.
    Unread(u32),
    /// A completion for an earlier request id arrives first.
    StaleThen(u32),
    /// Final result `ERROR`.
    Error,
    /// Never answered.
    Silent,
}

pub struct MockModem {
    pub calls: RefCell<Vec<ModemCall>>,
    pub resolve_fails: bool,
    pub connect_fails: bool,
    pub short_write: bool,
    pub dispatch_fails: bool,
    pub max_send: usize,
    pub max_recv: usize,
    pub inbound: RefCell<VecDeque<Vec<u8>>>,
    pub qird: RefCell<VecDeque<QirdReply>>,
    pub recv_timeout_ms: Cell<u32>,
}

impl Default for MockModem {
    fn default() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            resolve_fails: false,
            connect_fails: false,
            short_write: false,
            dispatch_fails: false,
            max_send: 1460,
            max_recv: 1500,
            inbound: RefCell::new(VecDeque::new()),
            qird: RefCell::new(VecDeque::new()),
            recv_timeout_ms: Cell::new(0),
        }
    }
}

impl MockModem {
    pub fn push_inbound(&self, data: &[u8]) {
        self.inbound.borrow_mut().push_back(data.to_vec());
    }

    pub fn script_qird(&self, replies: &[QirdReply]) {
        self.qird.borrow_mut().extend(replies.iter().cloned());
    }

    pub fn at_commands(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                ModemCall::At(cmd) => Some(cmd.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&ModemCall) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(c)).count()
    }
}

fn qird_line(unread: u32) -> String {
    format!("+QIRD: {},{},{}", 100 + unread, 100, unread)
}

impl ModemPort for MockModem {
    fn resolve(&self, host: &str) -> Result<IpString, ModemError> {
        self.calls.borrow_mut().push(ModemCall::Resolve(host.into()));
        if self.resolve_fails {
            return Err(ModemError::Resolve);
        }
        IpString::try_from("10.0.0.7").map_err(|_| ModemError::Resolve)
    }

    fn connect(
        &self,
        ip: &str,
        port: u16,
        kind: SocketKind,
        connect_timeout_ms: u32,
        recv_timeout_ms: u32,
    ) -> Result<ModemSocketId, ModemError> {
        self.calls.borrow_mut().push(ModemCall::Connect {
            ip: ip.into(),
            port,
            kind,
            connect_ms: connect_timeout_ms,
            recv_ms: recv_timeout_ms,
        });
        if self.connect_fails {
            return Err(ModemError::Open);
        }
        Ok(3)
    }

    fn send(&self, _socket: ModemSocketId, data: &[u8]) -> Result<usize, ModemError> {
        self.calls.borrow_mut().push(ModemCall::Send(data.len()));
        if self.short_write {
            return Ok(data.len() / 2);
        }
        Ok(data.len())
    }

    fn set_recv_timeout(&self, _socket: ModemSocketId, timeout_ms: u32) -> Result<(), ModemError> {
        self.calls.borrow_mut().push(ModemCall::SetRecvTimeout(timeout_ms));
        self.recv_timeout_ms.set(timeout_ms);
        Ok(())
    }

    fn recv(&self, _socket: ModemSocketId, buf: &mut [u8]) -> Result<usize, ModemError> {
        self.calls.borrow_mut().push(ModemCall::Recv(buf.len()));
        match self.inbound.borrow_mut().pop_front() {
            Some(data) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            None => {
                std::thread::sleep(Duration::from_millis(u64::from(self.recv_timeout_ms.get())));
                Err(ModemError::Timeout)
            }
        }
    }

    fn disconnect(&self, socket: ModemSocketId) {
        self.calls.borrow_mut().push(ModemCall::Disconnect(socket));
    }

    fn max_send_len(&self) -> usize {
        self.max_send
    }

    fn max_recv_len(&self) -> usize {
        self.max_recv
    }

    fn send_at_command(
        &self,
        request: AtRequest,
        done: SyncSender<AtCompletion>,
    ) -> Result<(), ModemError> {
        self.calls.borrow_mut().push(ModemCall::At(request.command.as_str().into()));
        if self.dispatch_fails {
            return Err(ModemError::Dispatch);
        }
        let reply = self.qird.borrow_mut().pop_front().unwrap_or(QirdReply::Silent);
        let complete = |id: u32, success: bool, lines: Vec<String>| {
            let _ = done.try_send(AtCompletion { id, success, lines });
        };
        match reply {
            QirdReply::Unread(n) => complete(request.id, true, vec![qird_line(n)]),
            QirdReply::StaleThen(n) => {
                complete(request.id.wrapping_sub(1), true, vec![qird_line(99)]);
                complete(request.id, true, vec![qird_line(n)]);
            }
            QirdReply::Error => complete(request.id, false, Vec::new()),
            QirdReply::Silent => {}
        }
        Ok(())
    }
}
