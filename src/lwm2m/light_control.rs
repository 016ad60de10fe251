//! Light Control object (oid 3311).
//!
//! One instance per configured LED channel. Writes land in the live state
//! only; hardware is touched on commit, on instance reset and on release.
//!
//! Duty mapping (10-bit LEDC):
//!
//! | on    | power | duty                          |
//! |-------|-------|-------------------------------|
//! | false | any   | 0                             |
//! | true  | p     | round(p * 1023 / 100)         |
//!
//! Active-low wiring inverts the value written to the channel.

use core::any::Any;

use log::{error, info, warn};

use crate::app::ports::{EnginePort, PwmPort};
use crate::config::LedChannelConfig;
use crate::error::{ErrorKind, Result};
use crate::lwm2m::transaction::Transactional;
use crate::lwm2m::{Access, Iid, Lwm2mObject, Oid, ResourceDef, Rid, Value};
use crate::pins::PWM_RESOLUTION_BITS;

pub const OID: Oid = 3311;

/// On/Off: RW, Single, Mandatory, boolean.
pub const RID_ON_OFF: Rid = 5850;
/// Dimmer: RW, Single, Optional, integer 0..100 %.
pub const RID_DIMMER: Rid = 5851;

pub const MAX_DUTY: u32 = (1 << PWM_RESOLUTION_BITS) - 1;

static RESOURCES: [ResourceDef; 2] = [
    ResourceDef::new(RID_ON_OFF, Access::ReadWrite),
    ResourceDef::new(RID_DIMMER, Access::ReadWrite),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightState {
    pub on: bool,
    pub power: i32,
}

impl LightState {
    pub const OFF: Self = Self { on: false, power: 0 };
}

/// Logical duty for a light state. Out-of-range power is clamped; commit
/// never sees it because validate rejects it first.
pub fn duty(state: LightState) -> u32 {
    if !state.on {
        return 0;
    }
    let power = state.power.clamp(0, 100) as u32;
    (power * MAX_DUTY + 50) / 100
}

fn output_duty(duty: u32, active_low: bool) -> u32 {
    if active_low { MAX_DUTY - duty } else { duty }
}

pub struct LightControlObject<P: PwmPort> {
    pwm: P,
    channels: Vec<LedChannelConfig>,
    state: Transactional<Vec<LightState>>,
    active_low: bool,
}

impl<P: PwmPort> LightControlObject<P> {
    /// Configure the PWM timer and every channel, leaving all lights off.
    ///
    /// On failure the channels configured so far are released (via `Drop`)
    /// and `HardwareInit` is returned.
    pub fn create(
        pwm: P,
        channels: &[LedChannelConfig],
        active_low: bool,
        freq_hz: u32,
    ) -> Result<Self> {
        let mut obj = Self {
            pwm,
            channels: Vec::with_capacity(channels.len()),
            state: Transactional::new(Vec::with_capacity(channels.len())),
            active_low,
        };

        obj.pwm
            .configure_timer(freq_hz, PWM_RESOLUTION_BITS)
            .map_err(|e| {
                error!("light_control: {}", e);
                ErrorKind::HardwareInit
            })?;

        for ch in channels {
            obj.pwm.configure_channel(ch.channel, ch.gpio).map_err(|e| {
                error!("light_control: channel {} (gpio {}): {}", ch.channel, ch.gpio, e);
                ErrorKind::HardwareInit
            })?;
            obj.channels.push(*ch);
            obj.state.live_mut().push(LightState::OFF);

            obj.pwm
                .set_duty(ch.channel, output_duty(0, active_low))
                .map_err(|e| {
                    error!("light_control: channel {} initial duty: {}", ch.channel, e);
                    ErrorKind::HardwareInit
                })?;
        }

        info!("light_control: {} instance(s) created", obj.channels.len());
        Ok(obj)
    }

    pub fn pwm(&self) -> &P {
        &self.pwm
    }

    pub fn pwm_mut(&mut self) -> &mut P {
        &mut self.pwm
    }

    pub fn instance(&self, iid: Iid) -> Option<LightState> {
        self.state.live().get(iid as usize).copied()
    }

    /// Turn every light off and release the channels.
    pub fn release(self) {
        drop(self);
    }

    fn live_instance_mut(&mut self, iid: Iid) -> Result<&mut LightState> {
        self.state
            .live_mut()
            .get_mut(iid as usize)
            .ok_or(ErrorKind::NotFound)
    }
}

/// Write every staged duty. If one channel fails, channels already written
/// are put back to their pre-transaction duty before reporting the error.
fn apply_states<P: PwmPort>(
    pwm: &mut P,
    channels: &[LedChannelConfig],
    new: &[LightState],
    previous: &[LightState],
    active_low: bool,
) -> Result<()> {
    let staged: Vec<u32> = new
        .iter()
        .map(|s| output_duty(duty(*s), active_low))
        .collect();

    for (i, (ch, &value)) in channels.iter().zip(&staged).enumerate() {
        if let Err(e) = pwm.set_duty(ch.channel, value) {
            error!("light_control: commit failed on channel {}: {}", ch.channel, e);
            for (done, prev) in channels[..i].iter().zip(previous) {
                let restore = output_duty(duty(*prev), active_low);
                if let Err(e) = pwm.set_duty(done.channel, restore) {
                    warn!("light_control: restore of channel {} failed: {}", done.channel, e);
                }
            }
            return Err(ErrorKind::Internal);
        }
    }
    Ok(())
}

impl<P: PwmPort + 'static> Lwm2mObject for LightControlObject<P> {
    fn oid(&self) -> Oid {
        OID
    }

    fn list_instances(&self) -> Vec<Iid> {
        (0..self.channels.len() as Iid).collect()
    }

    fn list_resources(&self, _iid: Iid) -> &'static [ResourceDef] {
        &RESOURCES
    }

    fn resource_read(&self, iid: Iid, rid: Rid) -> Result<Value> {
        let inst = self.instance(iid).ok_or(ErrorKind::NotFound)?;
        match rid {
            RID_ON_OFF => Ok(Value::Bool(inst.on)),
            RID_DIMMER => Ok(Value::Int(inst.power as i64)),
            _ => Err(ErrorKind::MethodNotAllowed),
        }
    }

    fn resource_write(&mut self, iid: Iid, rid: Rid, value: Value) -> Result<()> {
        let inst = self.live_instance_mut(iid)?;
        match rid {
            RID_ON_OFF => inst.on = value.as_bool()?,
            RID_DIMMER => inst.power = value.as_i32()?,
            _ => return Err(ErrorKind::MethodNotAllowed),
        }
        Ok(())
    }

    fn instance_reset(&mut self, iid: Iid, _engine: &mut dyn EnginePort) -> Result<()> {
        let channel = self
            .channels
            .get(iid as usize)
            .map(|c| c.channel)
            .ok_or(ErrorKind::NotFound)?;
        *self.live_instance_mut(iid)? = LightState::OFF;
        self.pwm
            .set_duty(channel, output_duty(0, self.active_low))
            .map_err(ErrorKind::from)
    }

    fn transaction_begin(&mut self) -> Result<()> {
        self.state.begin();
        Ok(())
    }

    fn transaction_validate(&mut self) -> Result<()> {
        self.state.validate(|states| {
            if let Some((iid, bad)) = states
                .iter()
                .enumerate()
                .find(|(_, s)| !(0..=100).contains(&s.power))
            {
                warn!("light_control: instance {} power {} out of range", iid, bad.power);
                return Err(ErrorKind::BadRequest);
            }
            Ok(())
        })
    }

    fn transaction_commit(&mut self, _engine: &mut dyn EnginePort) -> Result<()> {
        let Self {
            pwm,
            channels,
            state,
            active_low,
        } = self;
        state.commit(|new, previous| apply_states(pwm, channels, new, previous, *active_low))
    }

    fn transaction_rollback(&mut self) -> Result<()> {
        self.state.rollback();
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<P: PwmPort> Drop for LightControlObject<P> {
    fn drop(&mut self) {
        let off = output_duty(0, self.active_low);
        for (ch, inst) in self.channels.iter().zip(self.state.live_mut().iter_mut()) {
            *inst = LightState::OFF;
            if let Err(e) = self.pwm.set_duty(ch.channel, off) {
                warn!("light_control: channel {} off on release: {}", ch.channel, e);
            }
            self.pwm.release_channel(ch.channel, self.active_low);
        }
        if !self.channels.is_empty() {
            info!("light_control: released {} channel(s)", self.channels.len());
        }
    }
}
