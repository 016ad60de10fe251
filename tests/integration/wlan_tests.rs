//! WLAN object transactions and the reconfigure-network job.

use std::time::Duration;

use lwm2m_client::app::ports::Job;
use lwm2m_client::app::reconfigure::{reconfigure_network, Selected};
use lwm2m_client::error::ErrorKind;
use lwm2m_client::lwm2m::wlan::{
    keys, WlanObject, OID, PRECONFIGURED, RID_BSSID, RID_CHANNEL, RID_ENABLE, RID_SSID,
    RID_STATUS, RID_WPA_KEY_PHRASE, WRITABLE,
};
use lwm2m_client::lwm2m::{Lwm2mObject, Value};

use crate::mocks::{
    factory_credentials, EngineCall, MockEngine, MockIface, MockStorage, MockWifi, Stored,
    WifiCall,
};

type Wlan = WlanObject<MockStorage, MockIface>;

fn fresh() -> Wlan {
    WlanObject::load(MockStorage::default(), MockIface, &factory_credentials())
}

fn with_writable(ssid: &str, enabled: bool) -> Wlan {
    let storage = MockStorage::default()
        .with_str(keys::NS_WRITABLE, keys::SSID, ssid)
        .with_str(keys::NS_WRITABLE, keys::PASSWORD, "office-secret")
        .with_u8(keys::NS_WRITABLE, keys::ENABLE, u8::from(enabled));
    WlanObject::load(storage, MockIface, &factory_credentials())
}

fn commit(wlan: &mut Wlan, writes: &[(u16, Value)], engine: &mut MockEngine) -> Result<(), ErrorKind> {
    wlan.transaction_begin()?;
    for (rid, value) in writes {
        wlan.resource_write(WRITABLE, *rid, value.clone())?;
    }
    wlan.transaction_validate()?;
    wlan.transaction_commit(engine)
}

// ── Load ──────────────────────────────────────────────────────

#[test]
fn empty_storage_enables_factory_instance() {
    let wlan = fresh();
    assert!(!wlan.is_instance_enabled(WRITABLE));
    assert!(wlan.is_instance_enabled(PRECONFIGURED));
    assert_eq!(wlan.resource_read(PRECONFIGURED, RID_SSID), Ok(Value::Str("factory-ap".into())));
    assert_eq!(wlan.resource_read(WRITABLE, RID_SSID), Ok(Value::Str(String::new())));
}

#[test]
fn stored_writable_config_is_restored() {
    let wlan = with_writable("office", true);
    assert!(wlan.is_instance_enabled(WRITABLE));
    assert!(!wlan.is_instance_enabled(PRECONFIGURED));
    assert_eq!(wlan.instance_config(WRITABLE).unwrap().passphrase.as_str(), "office-secret");
}

#[test]
fn interface_queries_come_from_the_station() {
    let wlan = fresh();
    assert_eq!(wlan.resource_read(WRITABLE, RID_BSSID), Ok(Value::Str("246F28AABBCC".into())));
    assert_eq!(wlan.resource_read(PRECONFIGURED, RID_CHANNEL), Ok(Value::Int(11)));
}

// ── Transactions ──────────────────────────────────────────────

#[test]
fn uncommitted_ssid_is_visible_and_preconfigured_untouched() {
    let mut wlan = fresh();
    wlan.transaction_begin().unwrap();
    wlan.resource_write(WRITABLE, RID_SSID, Value::Str("lab".into())).unwrap();

    assert_eq!(wlan.resource_read(WRITABLE, RID_SSID), Ok(Value::Str("lab".into())));
    assert_eq!(wlan.resource_read(PRECONFIGURED, RID_SSID), Ok(Value::Str("factory-ap".into())));
    assert!(wlan.storage().writes.is_empty());
}

#[test]
fn enabling_writable_schedules_reconfigure_once() {
    let mut wlan = with_writable("office", false);
    let mut engine = MockEngine::default();

    commit(&mut wlan, &[(RID_ENABLE, Value::Bool(true))], &mut engine).unwrap();

    assert_eq!(engine.scheduled(Job::ReconfigureNetwork), 1);
    assert_eq!(engine.notified(OID, WRITABLE, RID_ENABLE), 1);
    assert_eq!(engine.notified(OID, WRITABLE, RID_STATUS), 1);
    let storage = wlan.storage();
    assert_eq!(
        storage.stored(keys::NS_WRITABLE, keys::ENABLE),
        Some(&Stored::U8(1))
    );
    assert_eq!(
        storage.stored(keys::NS_PRECONFIGURED, keys::ENABLE),
        Some(&Stored::U8(0))
    );
}

#[test]
fn ssid_change_on_enabled_instance_is_persisted_and_scheduled() {
    let mut wlan = with_writable("old", true);
    let mut engine = MockEngine::default();

    commit(&mut wlan, &[(RID_SSID, Value::Str("new".into()))], &mut engine).unwrap();

    assert_eq!(
        wlan.storage().stored(keys::NS_WRITABLE, keys::SSID),
        Some(&Stored::Str("new".into()))
    );
    assert_eq!(wlan.storage().writes_to(keys::NS_WRITABLE, keys::SSID), 1);
    assert_eq!(engine.scheduled(Job::ReconfigureNetwork), 1);
    assert_eq!(engine.notified(OID, WRITABLE, RID_SSID), 1);
    assert!(engine
        .calls
        .contains(&EngineCall::Schedule(Job::ReconfigureNetwork, Duration::ZERO)));
}

#[test]
fn ssid_change_on_disabled_instance_does_not_reconfigure() {
    let mut wlan = with_writable("old", false);
    let mut engine = MockEngine::default();

    commit(&mut wlan, &[(RID_SSID, Value::Str("new".into()))], &mut engine).unwrap();

    assert_eq!(wlan.storage().writes_to(keys::NS_WRITABLE, keys::SSID), 1);
    assert_eq!(engine.scheduled(Job::ReconfigureNetwork), 0);
}

#[test]
fn unchanged_commit_is_silent() {
    let mut wlan = with_writable("office", true);
    let mut engine = MockEngine::default();

    commit(&mut wlan, &[(RID_SSID, Value::Str("office".into()))], &mut engine).unwrap();

    assert!(engine.calls.is_empty());
    assert!(wlan.storage().writes.is_empty());
}

#[test]
fn rollback_restores_previous_credentials() {
    let mut wlan = with_writable("office", true);
    wlan.transaction_begin().unwrap();
    wlan.resource_write(WRITABLE, RID_SSID, Value::Str("lab".into())).unwrap();
    wlan.resource_write(WRITABLE, RID_WPA_KEY_PHRASE, Value::Str("lab-secret".into())).unwrap();
    wlan.transaction_rollback().unwrap();

    let cfg = wlan.instance_config(WRITABLE).unwrap();
    assert_eq!(cfg.ssid.as_str(), "office");
    assert_eq!(cfg.passphrase.as_str(), "office-secret");
}

#[test]
fn preconfigured_is_read_only() {
    let mut wlan = fresh();
    wlan.transaction_begin().unwrap();
    assert_eq!(
        wlan.resource_write(PRECONFIGURED, RID_SSID, Value::Str("x".into())),
        Err(ErrorKind::MethodNotAllowed)
    );
}

#[test]
fn overlong_ssid_is_bad_request() {
    let mut wlan = fresh();
    wlan.transaction_begin().unwrap();
    let long = "s".repeat(33);
    assert_eq!(
        wlan.resource_write(WRITABLE, RID_SSID, Value::Str(long)),
        Err(ErrorKind::BadRequest)
    );
}

#[test]
fn storage_failure_keeps_in_memory_state() {
    let mut storage = MockStorage::default();
    storage.fail_writes = true;
    let mut wlan = WlanObject::load(storage, MockIface, &factory_credentials());
    let mut engine = MockEngine::default();

    commit(&mut wlan, &[(RID_SSID, Value::Str("lab".into()))], &mut engine).unwrap();

    assert_eq!(wlan.resource_read(WRITABLE, RID_SSID), Ok(Value::Str("lab".into())));
}

#[test]
fn standalone_reset_persists_notifies_and_reconfigures() {
    let mut wlan = with_writable("office", true);
    let mut engine = MockEngine::default();

    wlan.instance_reset(WRITABLE, &mut engine).unwrap();

    assert!(!wlan.is_instance_enabled(WRITABLE));
    for rid in [RID_ENABLE, RID_STATUS, RID_SSID, RID_WPA_KEY_PHRASE] {
        assert_eq!(engine.notified(OID, WRITABLE, rid), 1, "rid {}", rid);
    }
    assert_eq!(wlan.storage().stored(keys::NS_WRITABLE, keys::SSID), Some(&Stored::Str(String::new())));
    assert_eq!(wlan.storage().stored(keys::NS_WRITABLE, keys::ENABLE), Some(&Stored::U8(0)));
    assert_eq!(wlan.storage().stored(keys::NS_PRECONFIGURED, keys::ENABLE), Some(&Stored::U8(1)));
    assert_eq!(engine.scheduled(Job::ReconfigureNetwork), 1);
}

#[test]
fn reset_followed_by_reconfigure_leaves_preconfigured_enabled() {
    let mut wlan = with_writable("office", true);
    let mut engine = MockEngine::default();
    let mut wifi = MockWifi::default();

    wlan.instance_reset(WRITABLE, &mut engine).unwrap();
    let selected = reconfigure_network(&mut wlan, &mut wifi, &mut engine);

    assert_eq!(selected, Selected::Preconfigured);
    assert!(wlan.is_instance_enabled(PRECONFIGURED));
    assert!(exactly_one_enabled(&wlan));
}

#[test]
fn reset_of_empty_writable_is_silent() {
    let mut wlan = fresh();
    let mut engine = MockEngine::default();

    wlan.instance_reset(WRITABLE, &mut engine).unwrap();

    assert!(engine.calls.is_empty());
    assert!(wlan.storage().writes.is_empty());
}

// ── Reconfigure ───────────────────────────────────────────────

fn exactly_one_enabled(wlan: &Wlan) -> bool {
    wlan.is_instance_enabled(WRITABLE) != wlan.is_instance_enabled(PRECONFIGURED)
}

#[test]
fn reconfigure_uses_writable_when_it_connects() {
    let mut wlan = with_writable("office", true);
    let mut wifi = MockWifi::default();
    let mut engine = MockEngine::default();

    let selected = reconfigure_network(&mut wlan, &mut wifi, &mut engine);

    assert_eq!(selected, Selected::Writable);
    assert!(wifi.calls.contains(&WifiCall::Credentials("office".into())));
    assert!(!wifi.calls.contains(&WifiCall::Credentials("factory-ap".into())));
    assert!(wlan.is_instance_enabled(WRITABLE));
    assert!(exactly_one_enabled(&wlan));
    assert!(!wlan.writable_iface_failed());
}

#[test]
fn reconfigure_falls_back_when_writable_fails() {
    let mut wlan = with_writable("office", true);
    let mut wifi = MockWifi::rejecting(&["office"]);
    let mut engine = MockEngine::default();

    let selected = reconfigure_network(&mut wlan, &mut wifi, &mut engine);

    assert_eq!(selected, Selected::Preconfigured);
    assert_eq!(wifi.ssid, "factory-ap");
    assert!(wifi.connected);
    assert!(wlan.is_instance_enabled(PRECONFIGURED));
    assert!(exactly_one_enabled(&wlan));
    assert!(wlan.writable_iface_failed());
    assert_eq!(wlan.resource_read(WRITABLE, RID_STATUS), Ok(Value::Int(2)));
}

#[test]
fn reconfigure_holds_transport_offline_around_the_join() {
    let mut wlan = fresh();
    let mut wifi = MockWifi::default();
    let mut engine = MockEngine::default();

    reconfigure_network(&mut wlan, &mut wifi, &mut engine);

    let pos = |call: &EngineCall| engine.calls.iter().position(|c| c == call).unwrap();
    assert_eq!(pos(&EngineCall::EnterOffline), 0);
    assert!(pos(&EngineCall::ExitOffline) < pos(&EngineCall::Reconnect));
    assert_eq!(wifi.calls.first(), Some(&WifiCall::Disconnect));
}

#[test]
fn reconfigure_with_nothing_reachable_keeps_preconfigured_enabled() {
    let mut wlan = with_writable("office", true);
    let mut wifi = MockWifi::rejecting(&["office", "factory-ap"]);
    let mut engine = MockEngine::default();

    let selected = reconfigure_network(&mut wlan, &mut wifi, &mut engine);

    assert_eq!(selected, Selected::None);
    assert_eq!(wifi.connects(), 2);
    assert!(wlan.is_instance_enabled(PRECONFIGURED));
    assert!(exactly_one_enabled(&wlan));
}

#[test]
fn empty_writable_ssid_is_skipped() {
    let mut wlan = with_writable("", true);
    let mut wifi = MockWifi::default();
    let mut engine = MockEngine::default();

    let selected = reconfigure_network(&mut wlan, &mut wifi, &mut engine);

    assert_eq!(selected, Selected::Preconfigured);
    assert_eq!(wifi.connects(), 1);
}
