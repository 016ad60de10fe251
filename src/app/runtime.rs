//! Foreground runtime driven by the event loop.
//!
//! Owns the data model, the engine context, the Wi-Fi adapter, the status
//! indicator and, on the cellular transport, the session sockets the event
//! loop polls. Each scheduler pass:
//!
//! 1. refreshes the clock and polls the station link,
//! 2. schedules a network reconfigure when the link dropped,
//! 3. runs every due job,
//! 4. updates the status indicator and flushes notifications,
//! 5. stops the event loop when a reboot was requested.

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::adapters::firmware_update::{FirmwareUpdate, FirmwareUpdateError};
use crate::adapters::time::Clock;
use crate::adapters::wifi::ConnectivityPort;
use crate::app::jobs::EngineContext;
use crate::app::ports::{EnginePort, InterfaceInfoPort, Job, StoragePort};
use crate::app::reconfigure::{reconfigure_network, Selected};
use crate::app::status::{ConnectionStatus, StatusIndicator, StatusInputs};
use crate::cellular::event_loop::{EventLoopEngine, EventLoopHandle};
use crate::cellular::modem::{ModemPort, SocketKind};
use crate::cellular::socket::{split_server_uri, CellularSocket, SessionSocket, SocketState};
use crate::error::{ErrorKind, Result};
use crate::lwm2m::registry::DataModel;
use crate::lwm2m::wlan::{self, WlanObject};

/// Largest datagram the session accepts from the modem.
pub const SESSION_MTU: usize = 1500;

/// Inbound datagrams kept for the engine before the oldest is dropped.
const INBOUND_QUEUE_DEPTH: usize = 8;

pub struct Runtime<S, I, W, C>
where
    S: StoragePort + 'static,
    I: InterfaceInfoPort + 'static,
    W: ConnectivityPort,
    C: Clock,
{
    model: DataModel,
    engine: EngineContext,
    wifi: W,
    clock: C,
    status: StatusIndicator,
    firmware: FirmwareUpdate,
    update_interval: Duration,
    link_was_up: bool,
    session_error: Option<ErrorKind>,
    event_loop: Option<EventLoopHandle>,
    reboot_flag: Option<Arc<AtomicBool>>,
    sockets: Vec<Box<dyn SessionSocket>>,
    inbound: VecDeque<(usize, Vec<u8>)>,
    _wlan: core::marker::PhantomData<fn() -> (S, I)>,
}

impl<S, I, W, C> Runtime<S, I, W, C>
where
    S: StoragePort + 'static,
    I: InterfaceInfoPort + 'static,
    W: ConnectivityPort,
    C: Clock,
{
    /// The first pass brings the network up and starts the update job.
    pub fn new(model: DataModel, wifi: W, clock: C, update_interval: Duration) -> Self {
        let mut engine = EngineContext::new();
        engine.set_now(clock.uptime_ms());
        engine.schedule(Job::ReconfigureNetwork, Duration::ZERO);
        engine.schedule(Job::UpdateObjects, Duration::ZERO);
        Self {
            model,
            engine,
            wifi,
            clock,
            status: StatusIndicator::new(),
            firmware: FirmwareUpdate::new(),
            update_interval,
            link_was_up: false,
            session_error: None,
            event_loop: None,
            reboot_flag: None,
            sockets: Vec::new(),
            inbound: VecDeque::new(),
            _wlan: core::marker::PhantomData,
        }
    }

    /// Handle used to stop the loop on reboot or firmware upgrade.
    pub fn attach_event_loop(&mut self, handle: EventLoopHandle) {
        self.event_loop = Some(handle);
    }

    /// Stop the loop once `flag` is raised (Device reboot execute).
    pub fn watch_reboot(&mut self, flag: Arc<AtomicBool>) {
        self.reboot_flag = Some(flag);
    }

    pub fn model(&self) -> &DataModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut DataModel {
        &mut self.model
    }

    pub fn engine_mut(&mut self) -> &mut EngineContext {
        &mut self.engine
    }

    pub fn wifi(&self) -> &W {
        &self.wifi
    }

    pub fn wifi_mut(&mut self) -> &mut W {
        &mut self.wifi
    }

    pub fn firmware(&self) -> &FirmwareUpdate {
        &self.firmware
    }

    /// Firmware handlers need the loop handle for `perform_upgrade`.
    pub fn firmware_upgrade(&mut self) -> core::result::Result<(), FirmwareUpdateError> {
        let Some(handle) = self.event_loop.as_ref() else {
            return Err(FirmwareUpdateError::InterruptFailed);
        };
        self.firmware.perform_upgrade(handle)
    }

    pub fn firmware_mut(&mut self) -> &mut FirmwareUpdate {
        &mut self.firmware
    }

    /// Hand a connected socket to the event loop. Returns its index.
    pub fn add_session_socket(&mut self, socket: Box<dyn SessionSocket>) -> usize {
        self.sockets.push(socket);
        self.sockets.len() - 1
    }

    /// Open the LwM2M session over the cellular modem: a datagram socket to
    /// the host and port of `server_uri`, polled by the event loop.
    pub fn open_cellular_session<M: ModemPort + 'static>(
        &mut self,
        modem: Arc<M>,
        server_uri: &str,
    ) -> Result<usize> {
        let (host, port) = split_server_uri(server_uri)?;
        let mut socket = CellularSocket::new(modem, SocketKind::Datagram);
        if let Err(e) = socket.connect(host, port) {
            self.session_error = Some(e);
            return Err(e);
        }
        self.session_error = None;
        info!("runtime: cellular session to {}:{}", host, port);
        Ok(self.add_session_socket(Box::new(socket)))
    }

    pub fn session_sockets(&self) -> usize {
        self.sockets.len()
    }

    /// Datagrams received on the session sockets, oldest first, with the
    /// index of the socket they came in on.
    pub fn take_inbound(&mut self) -> Vec<(usize, Vec<u8>)> {
        self.inbound.drain(..).collect()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.current()
    }

    /// Outcome of the last session-socket operation, as reported by the
    /// engine glue. `Ok` clears a previous error.
    pub fn report_session(&mut self, result: Result<()>) {
        self.session_error = result.err();
    }

    fn run_reconfigure(&mut self) {
        let Some(wlan) = self.model.downcast_mut::<WlanObject<S, I>>(wlan::OID) else {
            warn!("runtime: no WLAN object registered, skipping reconfigure");
            return;
        };
        let selected = reconfigure_network(wlan, &mut self.wifi, &mut self.engine);
        self.link_was_up = self.wifi.is_connected();
        if selected == Selected::None {
            let retry = self.wifi.retry_backoff();
            info!("runtime: retrying network in {} s", retry.as_secs());
            self.engine.schedule(Job::ReconfigureNetwork, retry);
        }
    }

    fn run_job(&mut self, job: Job) {
        debug!("runtime: running {:?}", job);
        match job {
            Job::ReconfigureNetwork => self.run_reconfigure(),
            Job::UpdateObjects => {
                self.model.update_all(&mut self.engine);
                self.engine.schedule(Job::UpdateObjects, self.update_interval);
            }
        }
    }

    fn check_link(&mut self) {
        self.wifi.poll();
        let up = self.wifi.is_connected();
        if self.link_was_up && !up {
            warn!("runtime: network lost, reconfiguring");
            self.engine.schedule(Job::ReconfigureNetwork, Duration::ZERO);
        }
        self.link_was_up = up;
    }

    fn check_reboot(&mut self) {
        let requested = self
            .reboot_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::Acquire));
        if !requested {
            return;
        }
        if let Some(handle) = self.event_loop.as_ref().filter(|h| h.is_running()) {
            info!("runtime: reboot requested, stopping event loop");
            if let Err(e) = handle.interrupt() {
                warn!("runtime: interrupt failed: {}", e);
            }
        }
    }
}

impl<S, I, W, C> EventLoopEngine for Runtime<S, I, W, C>
where
    S: StoragePort + 'static,
    I: InterfaceInfoPort + 'static,
    W: ConnectivityPort,
    C: Clock,
{
    fn sched_wait_ms(&mut self, max_ms: u32) -> u32 {
        self.engine.set_now(self.clock.uptime_ms());
        u32::try_from(self.engine.wait_ms(u64::from(max_ms))).unwrap_or(max_ms)
    }

    fn socket_count(&self) -> usize {
        self.sockets.len()
    }

    fn poll_socket(&mut self, index: usize, timeout_ms: u32) -> Result<bool> {
        let socket = self.sockets.get_mut(index).ok_or(ErrorKind::NotFound)?;
        if socket.state() != SocketState::Connected {
            return Ok(false);
        }
        socket.check_modem_buffer(timeout_ms)
    }

    fn serve(&mut self, index: usize) -> Result<()> {
        let socket = self.sockets.get_mut(index).ok_or(ErrorKind::NotFound)?;
        let mut buf = vec![0u8; SESSION_MTU];
        let (n, warning) = match socket.receive(&mut buf) {
            Ok(received) => received,
            Err(e) => {
                self.session_error = Some(e);
                return Err(e);
            }
        };
        if let Some(w) = warning {
            warn!("runtime: datagram on socket {} may be truncated: {}", index, w);
        }
        buf.truncate(n);
        if self.inbound.len() == INBOUND_QUEUE_DEPTH {
            warn!("runtime: inbound queue full, dropping oldest datagram");
            self.inbound.pop_front();
        }
        self.inbound.push_back((index, buf));
        self.session_error = None;
        Ok(())
    }

    fn sched_run(&mut self) {
        self.engine.set_now(self.clock.uptime_ms());
        self.check_link();

        for job in self.engine.due_jobs() {
            self.run_job(job);
        }

        let cellular_up = self
            .sockets
            .iter()
            .any(|s| s.state() == SocketState::Connected);
        let network_up = self.wifi.is_connected() || cellular_up;
        self.status.update(&StatusInputs {
            network_up,
            offline: self.engine.is_offline(),
            socket_connected: network_up && self.session_error.is_none(),
            last_error: self.session_error,
        });

        if self.engine.take_reconnect_request() {
            info!("runtime: session reconnect requested");
        }
        for (oid, iid, rid) in self.engine.drain_notifications() {
            debug!("runtime: notify /{}/{}/{}", oid, iid, rid);
        }

        self.check_reboot();
    }
}
