//! Foreground runtime: reconfigure job, link supervision, status and
//! reboot handling, driven pass by pass with a manual clock.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use lwm2m_client::adapters::firmware_update::{FirmwareUpdateError, UpdateState};
use lwm2m_client::adapters::time::SystemClock;
use lwm2m_client::adapters::wifi::{ConnectivityPort, WifiAdapter, WifiState};
use lwm2m_client::app::runtime::Runtime;
use lwm2m_client::app::status::ConnectionStatus;
use lwm2m_client::cellular::event_loop::{CellularEventLoop, EventLoopEngine};
use lwm2m_client::error::ErrorKind;
use lwm2m_client::lwm2m::device::{self, DeviceObject};
use lwm2m_client::lwm2m::light_control::LightControlObject;
use lwm2m_client::lwm2m::registry::DataModel;
use lwm2m_client::lwm2m::wlan::{self, keys, WlanObject, PRECONFIGURED, WRITABLE};

use crate::mocks::{
    factory_credentials, led_channels, ManualClock, MockIface, MockModem, MockPwm, MockStorage,
    QirdReply,
};

type Wlan = WlanObject<MockStorage, MockIface>;
type TestRuntime<'a> = Runtime<MockStorage, MockIface, WifiAdapter, &'a ManualClock>;

const UPDATE_INTERVAL: Duration = Duration::from_millis(1000);

fn model(storage: MockStorage) -> (DataModel, Arc<AtomicBool>) {
    let mut model = DataModel::new();
    let device = DeviceObject::new(SystemClock::new(), &[0x24, 0x6F, 0x28, 1, 2, 3]);
    let reboot = device.reboot_flag();
    model.register(Box::new(device)).unwrap();
    model
        .register(Box::new(
            LightControlObject::create(MockPwm::default(), &led_channels(3), false, 2000).unwrap(),
        ))
        .unwrap();
    model
        .register(Box::new(WlanObject::load(storage, MockIface, &factory_credentials())))
        .unwrap();
    (model, reboot)
}

fn runtime(clock: &ManualClock, storage: MockStorage, wifi: WifiAdapter) -> TestRuntime<'_> {
    let (model, _) = model(storage);
    Runtime::new(model, wifi, clock, UPDATE_INTERVAL)
}

fn wlan<'r>(rt: &'r TestRuntime<'_>) -> &'r Wlan {
    rt.model().downcast_ref::<Wlan>(wlan::OID).unwrap()
}

fn writable_office() -> MockStorage {
    MockStorage::default()
        .with_str(keys::NS_WRITABLE, keys::SSID, "office")
        .with_str(keys::NS_WRITABLE, keys::PASSWORD, "office-secret")
        .with_u8(keys::NS_WRITABLE, keys::ENABLE, 1)
}

#[test]
fn first_pass_joins_preconfigured_network() {
    let clock = ManualClock::default();
    let mut rt = runtime(&clock, MockStorage::default(), WifiAdapter::new());

    rt.sched_run();

    assert!(rt.wifi().is_connected());
    assert_eq!(rt.wifi().ssid(), "factory-ap");
    assert_eq!(rt.status(), ConnectionStatus::Connected);
}

#[test]
fn first_pass_prefers_enabled_writable_instance() {
    let clock = ManualClock::default();
    let mut rt = runtime(&clock, writable_office(), WifiAdapter::new());

    rt.sched_run();

    assert_eq!(rt.wifi().ssid(), "office");
    assert!(wlan(&rt).is_instance_enabled(WRITABLE));
}

#[test]
fn rejected_writable_network_falls_back() {
    let clock = ManualClock::default();
    let mut wifi = WifiAdapter::new();
    wifi.sim_reject("office");
    let mut rt = runtime(&clock, writable_office(), wifi);

    rt.sched_run();

    assert_eq!(rt.wifi().ssid(), "factory-ap");
    assert!(rt.wifi().is_connected());
    assert!(wlan(&rt).writable_iface_failed());
    assert!(wlan(&rt).is_instance_enabled(PRECONFIGURED));
    assert!(!wlan(&rt).is_instance_enabled(WRITABLE));
}

#[test]
fn link_loss_schedules_reconfigure() {
    let clock = ManualClock::default();
    let mut rt = runtime(&clock, MockStorage::default(), WifiAdapter::new());
    rt.sched_run();

    rt.wifi_mut().sim_drop_link();
    assert!(!rt.wifi().is_connected());
    clock.advance(10);
    rt.sched_run();

    assert!(rt.wifi().is_connected());
    assert_eq!(rt.wifi().state(), WifiState::Connected);
    assert_eq!(rt.status(), ConnectionStatus::Connected);
}

#[test]
fn unreachable_network_is_retried_after_backoff() {
    let clock = ManualClock::default();
    let mut wifi = WifiAdapter::new();
    wifi.sim_reject("factory-ap");
    let mut rt = runtime(&clock, MockStorage::default(), wifi);

    rt.sched_run();
    assert_eq!(rt.wifi().state(), WifiState::Failed { attempts: 1 });
    assert_eq!(rt.status(), ConnectionStatus::Disconnected);

    clock.advance(1999);
    rt.sched_run();
    assert_eq!(rt.wifi().state(), WifiState::Failed { attempts: 1 });

    clock.advance(1);
    rt.sched_run();
    assert_eq!(rt.wifi().state(), WifiState::Failed { attempts: 2 });
    assert_eq!(rt.wifi().retry_backoff(), Duration::from_secs(4));
}

#[test]
fn update_job_reschedules_itself() {
    let clock = ManualClock::default();
    let mut rt = runtime(&clock, MockStorage::default(), WifiAdapter::new());

    rt.sched_run();
    assert_eq!(rt.engine_mut().pending_jobs(), 1);
    assert_eq!(rt.sched_wait_ms(5000), 1000);

    clock.advance(1000);
    rt.sched_run();
    assert_eq!(rt.engine_mut().pending_jobs(), 1);
}

#[test]
fn session_errors_drive_status() {
    let clock = ManualClock::default();
    let mut rt = runtime(&clock, MockStorage::default(), WifiAdapter::new());
    rt.sched_run();

    rt.report_session(Err(ErrorKind::ConnectionRefused));
    rt.sched_run();
    assert_eq!(rt.status(), ConnectionStatus::Error);

    rt.report_session(Ok(()));
    rt.sched_run();
    assert_eq!(rt.status(), ConnectionStatus::Connected);
}

#[test]
fn reboot_execute_stops_the_event_loop() {
    let clock = ManualClock::default();
    let (model, reboot) = model(MockStorage::default());
    let mut rt: TestRuntime<'_> = Runtime::new(model, WifiAdapter::new(), &clock, UPDATE_INTERVAL);
    let event_loop = CellularEventLoop::new();
    rt.attach_event_loop(event_loop.handle());
    rt.watch_reboot(Arc::clone(&reboot));

    rt.model_mut().execute(device::OID, device::IID, device::RID_REBOOT).unwrap();
    event_loop.run(&mut rt).unwrap();

    assert!(!event_loop.handle().is_running());
    assert!(rt.wifi().is_connected());
}

#[test]
fn firmware_upgrade_needs_a_running_loop() {
    let clock = ManualClock::default();
    let mut rt = runtime(&clock, MockStorage::default(), WifiAdapter::new());
    assert_eq!(rt.firmware_upgrade(), Err(FirmwareUpdateError::InterruptFailed));

    let fw = rt.firmware_mut();
    fw.stream_open().unwrap();
    fw.stream_write(&[0xE9; 64]).unwrap();
    fw.stream_finish().unwrap();

    let event_loop = CellularEventLoop::new();
    rt.attach_event_loop(event_loop.handle());
    assert_eq!(rt.firmware_upgrade(), Err(FirmwareUpdateError::InterruptFailed));
    assert_eq!(rt.firmware().state(), UpdateState::Downloaded { size: 64 });
    assert!(!rt.firmware().update_requested());
}

// ── Cellular session ──────────────────────────────────────────

#[test]
fn event_loop_polls_and_serves_the_cellular_session() {
    let clock = ManualClock::default();
    let (model, reboot) = model(MockStorage::default());
    let mut rt: TestRuntime<'_> = Runtime::new(model, WifiAdapter::new(), &clock, UPDATE_INTERVAL);
    let modem = Arc::new(MockModem::default());
    modem.script_qird(&[QirdReply::Unread(5)]);
    modem.push_inbound(b"coap!");

    assert_eq!(rt.open_cellular_session(Arc::clone(&modem), "coaps://lwm2m.example:5684"), Ok(0));
    assert_eq!(rt.session_sockets(), 1);

    // Startup jobs first, so the loop gets a full wait to split.
    rt.sched_run();
    let event_loop = CellularEventLoop::new();
    rt.attach_event_loop(event_loop.handle());
    rt.watch_reboot(Arc::clone(&reboot));
    rt.model_mut().execute(device::OID, device::IID, device::RID_REBOOT).unwrap();
    event_loop.run(&mut rt).unwrap();

    assert_eq!(modem.at_commands(), vec!["AT+QIRD=3,0".to_string()]);
    assert_eq!(rt.take_inbound(), vec![(0, b"coap!".to_vec())]);
    assert_eq!(rt.status(), ConnectionStatus::Connected);
}

#[test]
fn quiet_session_is_not_served() {
    let clock = ManualClock::default();
    let mut rt = runtime(&clock, MockStorage::default(), WifiAdapter::new());
    let modem = Arc::new(MockModem::default());
    modem.script_qird(&[QirdReply::Unread(0)]);
    rt.open_cellular_session(Arc::clone(&modem), "coap://10.0.0.7").unwrap();

    assert_eq!(rt.poll_socket(0, 20), Err(ErrorKind::Timeout));
    assert!(rt.take_inbound().is_empty());
    assert_eq!(rt.poll_socket(1, 20), Err(ErrorKind::NotFound));
}

#[test]
fn refused_cellular_session_reports_error_status() {
    let clock = ManualClock::default();
    let mut rt = runtime(&clock, MockStorage::default(), WifiAdapter::new());
    let modem = Arc::new(MockModem { connect_fails: true, ..Default::default() });

    assert_eq!(
        rt.open_cellular_session(modem, "coaps://lwm2m.example"),
        Err(ErrorKind::ConnectionRefused)
    );
    assert_eq!(rt.session_sockets(), 0);

    rt.sched_run();
    assert_eq!(rt.status(), ConnectionStatus::Error);
}

#[test]
fn malformed_server_uri_opens_nothing() {
    let clock = ManualClock::default();
    let mut rt = runtime(&clock, MockStorage::default(), WifiAdapter::new());
    let modem = Arc::new(MockModem::default());

    assert_eq!(
        rt.open_cellular_session(Arc::clone(&modem), "lwm2m.example:5684"),
        Err(ErrorKind::BadRequest)
    );
    assert!(modem.calls.borrow().is_empty());
}
