//! Light-Control object driven through the data model's transaction path.

use lwm2m_client::error::ErrorKind;
use lwm2m_client::lwm2m::light_control::{
    self, duty, LightControlObject, LightState, MAX_DUTY, RID_DIMMER, RID_ON_OFF,
};
use lwm2m_client::lwm2m::registry::DataModel;
use lwm2m_client::lwm2m::{Lwm2mObject, Value};

use crate::mocks::{led_channels, MockEngine, MockPwm, PwmCall};

fn model_with(channels: u8, active_low: bool) -> DataModel {
    let obj = LightControlObject::create(MockPwm::default(), &led_channels(channels), active_low, 2000)
        .unwrap();
    let mut model = DataModel::new();
    model.register(Box::new(obj)).unwrap();
    model
}

fn pwm(model: &DataModel) -> &MockPwm {
    model
        .downcast_ref::<LightControlObject<MockPwm>>(light_control::OID)
        .unwrap()
        .pwm()
}

#[test]
fn create_configures_timer_then_channels_off() {
    let model = model_with(2, false);
    let calls = &pwm(&model).calls;
    assert_eq!(calls[0], PwmCall::Timer { freq_hz: 2000, bits: 10 });
    assert_eq!(calls[1], PwmCall::Channel { channel: 0, gpio: 20 });
    assert_eq!(calls[2], PwmCall::Duty { channel: 0, duty: 0 });
    assert_eq!(calls[3], PwmCall::Channel { channel: 1, gpio: 21 });
    assert_eq!(calls[4], PwmCall::Duty { channel: 1, duty: 0 });
}

#[test]
fn active_low_channels_start_at_full_duty() {
    let model = model_with(1, true);
    assert_eq!(pwm(&model).duty(0), Some(MAX_DUTY));
}

#[test]
fn out_of_range_power_is_rejected_and_hardware_untouched() {
    let mut model = model_with(2, false);
    let mut engine = MockEngine::default();
    let writes_before = pwm(&model).duty_writes();

    let res = model.write(
        light_control::OID,
        &[(0, RID_ON_OFF, Value::Bool(true)), (0, RID_DIMMER, Value::Int(150))],
        &mut engine,
    );

    assert_eq!(res, Err(ErrorKind::BadRequest));
    assert_eq!(pwm(&model).duty(0), Some(0));
    assert_eq!(pwm(&model).duty(1), Some(0));
    assert_eq!(pwm(&model).duty_writes(), writes_before);
    assert_eq!(model.read(light_control::OID, 0, RID_DIMMER), Ok(Value::Int(0)));
    assert_eq!(model.read(light_control::OID, 0, RID_ON_OFF), Ok(Value::Bool(false)));
}

#[test]
fn committed_write_drives_pwm() {
    let mut model = model_with(2, false);
    let mut engine = MockEngine::default();

    model
        .write(
            light_control::OID,
            &[(1, RID_ON_OFF, Value::Bool(true)), (1, RID_DIMMER, Value::Int(50))],
            &mut engine,
        )
        .unwrap();

    assert_eq!(pwm(&model).duty(1), Some(512));
    assert_eq!(pwm(&model).duty(0), Some(0));
    assert_eq!(model.read(light_control::OID, 1, RID_DIMMER), Ok(Value::Int(50)));
}

#[test]
fn off_light_keeps_power_but_outputs_zero() {
    let mut model = model_with(1, false);
    let mut engine = MockEngine::default();

    model
        .write(light_control::OID, &[(0, RID_DIMMER, Value::Int(80))], &mut engine)
        .unwrap();

    assert_eq!(pwm(&model).duty(0), Some(0));
    assert_eq!(model.read(light_control::OID, 0, RID_DIMMER), Ok(Value::Int(80)));
}

#[test]
fn failed_commit_restores_written_channels() {
    let mut obj = LightControlObject::create(MockPwm::default(), &led_channels(2), false, 2000)
        .unwrap();
    let mut engine = MockEngine::default();

    obj.transaction_begin().unwrap();
    obj.resource_write(0, RID_ON_OFF, Value::Bool(true)).unwrap();
    obj.resource_write(0, RID_DIMMER, Value::Int(100)).unwrap();
    obj.resource_write(1, RID_ON_OFF, Value::Bool(true)).unwrap();
    obj.transaction_validate().unwrap();
    obj.pwm_mut().fail_duty_on = Some(1);

    assert_eq!(obj.transaction_commit(&mut engine), Err(ErrorKind::Internal));
    assert!(obj.pwm().calls.contains(&PwmCall::Duty { channel: 0, duty: MAX_DUTY }));
    assert_eq!(obj.pwm().duty(0), Some(0));
}

#[test]
fn reset_turns_instance_off() {
    let mut model = model_with(1, false);
    let mut engine = MockEngine::default();
    model
        .write(
            light_control::OID,
            &[(0, RID_ON_OFF, Value::Bool(true)), (0, RID_DIMMER, Value::Int(100))],
            &mut engine,
        )
        .unwrap();
    assert_eq!(pwm(&model).duty(0), Some(MAX_DUTY));

    model.reset(light_control::OID, 0, &mut engine).unwrap();
    assert_eq!(pwm(&model).duty(0), Some(0));
    assert_eq!(model.read(light_control::OID, 0, RID_ON_OFF), Ok(Value::Bool(false)));
}

#[test]
fn unknown_instance_is_not_found() {
    let mut model = model_with(1, false);
    let mut engine = MockEngine::default();
    assert_eq!(
        model.write(light_control::OID, &[(3, RID_ON_OFF, Value::Bool(true))], &mut engine),
        Err(ErrorKind::NotFound)
    );
}

#[test]
fn channel_config_failure_is_hardware_init() {
    let pwm = MockPwm { fail_channel_config: Some(1), ..Default::default() };
    let res = LightControlObject::create(pwm, &led_channels(2), false, 2000);
    assert!(matches!(res, Err(ErrorKind::HardwareInit)));
}

#[test]
fn duty_curve_endpoints() {
    assert_eq!(duty(LightState { on: true, power: 0 }), 0);
    assert_eq!(duty(LightState { on: true, power: 100 }), MAX_DUTY);
    assert_eq!(duty(LightState { on: false, power: 100 }), 0);
}
