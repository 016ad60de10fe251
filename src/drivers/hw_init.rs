//! Raw peripheral setup for the LED PWM channels and the button GPIO.
//!
//! Thin wrappers over ESP-IDF sys calls; each returns the driver code in
//! [`HwInitError`] so callers can log it. Host builds get no-op stand-ins
//! that always succeed.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

// ── Error type ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    LedcTimer(i32),
    LedcChannel(i32),
    LedcDuty(i32),
    GpioConfigFailed(i32),
    IsrInstallFailed(i32),
    IsrHandlerFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::LedcTimer(rc)        => write!(f, "LEDC timer config failed (rc={})", rc),
            Self::LedcChannel(rc)      => write!(f, "LEDC channel config failed (rc={})", rc),
            Self::LedcDuty(rc)         => write!(f, "LEDC duty update failed (rc={})", rc),
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={})", rc),
            Self::IsrHandlerFailed(rc) => write!(f, "GPIO ISR handler add failed (rc={})", rc),
        }
    }
}

#[cfg(target_os = "espidf")]
fn check(ret: esp_err_t, err: fn(i32) -> HwInitError) -> Result<(), HwInitError> {
    if ret == ESP_OK as i32 { Ok(()) } else { Err(err(ret)) }
}

// ── LEDC PWM ─────────────────────────────────────────────────

/// Configure LEDC timer 0 (low-speed mode) shared by all LED channels.
#[cfg(target_os = "espidf")]
pub fn ledc_timer_init(freq_hz: u32, resolution_bits: u32) -> Result<(), HwInitError> {
    let cfg = ledc_timer_config_t {
        speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
        timer_num: ledc_timer_t_LEDC_TIMER_0,
        duty_resolution: resolution_bits,
        freq_hz,
        clk_cfg: soc_periph_ledc_clk_src_legacy_t_LEDC_AUTO_CLK,
        ..Default::default()
    };
    // SAFETY: cfg outlives the call; LEDC config runs from the main task only.
    check(unsafe { ledc_timer_config(&cfg) }, HwInitError::LedcTimer)?;
    info!("hw_init: LEDC timer0 {} Hz / {} bit", freq_hz, resolution_bits);
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn ledc_timer_init(_freq_hz: u32, _resolution_bits: u32) -> Result<(), HwInitError> {
    Ok(())
}

/// Bind `channel` to `gpio` on timer 0 with duty 0.
#[cfg(target_os = "espidf")]
pub fn ledc_channel_init(channel: u32, gpio: i32) -> Result<(), HwInitError> {
    let cfg = ledc_channel_config_t {
        speed_mode: ledc_mode_t_LEDC_LOW_SPEED_MODE,
        channel,
        timer_sel: ledc_timer_t_LEDC_TIMER_0,
        gpio_num: gpio,
        duty: 0,
        hpoint: 0,
        ..Default::default()
    };
    // SAFETY: as above.
    check(unsafe { ledc_channel_config(&cfg) }, HwInitError::LedcChannel)
}

#[cfg(not(target_os = "espidf"))]
pub fn ledc_channel_init(_channel: u32, _gpio: i32) -> Result<(), HwInitError> {
    Ok(())
}

/// Write and latch a duty value.
#[cfg(target_os = "espidf")]
pub fn ledc_set(channel: u32, duty: u32) -> Result<(), HwInitError> {
    // SAFETY: channel was configured by ledc_channel_init(); duty register
    // writes only happen from the main task.
    unsafe {
        check(ledc_set_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, channel, duty), HwInitError::LedcDuty)?;
        check(ledc_update_duty(ledc_mode_t_LEDC_LOW_SPEED_MODE, channel), HwInitError::LedcDuty)
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn ledc_set(_channel: u32, _duty: u32) -> Result<(), HwInitError> {
    Ok(())
}

/// Stop the channel output and park the pin at `idle_high`.
#[cfg(target_os = "espidf")]
pub fn ledc_release(channel: u32, idle_high: bool) {
    // SAFETY: stopping an already-stopped channel is harmless.
    let ret = unsafe { ledc_stop(ledc_mode_t_LEDC_LOW_SPEED_MODE, channel, u32::from(idle_high)) };
    if ret != ESP_OK as i32 {
        log::warn!("hw_init: ledc_stop ch{} failed (rc={})", channel, ret);
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn ledc_release(_channel: u32, _idle_high: bool) {}

// ── GPIO Inputs ───────────────────────────────────────────────

/// Configure `pin` as a pulled-up input interrupting on both edges.
#[cfg(target_os = "espidf")]
pub fn gpio_input_anyedge(pin: i32) -> Result<(), HwInitError> {
    let cfg = gpio_config_t {
        pin_bit_mask: 1u64 << pin,
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_ANYEDGE,
    };
    // SAFETY: one-shot pin config from the main task.
    check(unsafe { gpio_config(&cfg) }, HwInitError::GpioConfigFailed)
}

#[cfg(not(target_os = "espidf"))]
pub fn gpio_input_anyedge(_pin: i32) -> Result<(), HwInitError> {
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn gpio_read(pin: i32) -> bool {
    // SAFETY: register read on a configured input; also safe in ISR context.
    (unsafe { gpio_get_level(pin) }) != 0
}

#[cfg(not(target_os = "espidf"))]
pub fn gpio_read(_pin: i32) -> bool {
    true
}

// ── GPIO ISR Service ──────────────────────────────────────────

/// Install the per-pin GPIO ISR service. Already installed is fine.
#[cfg(target_os = "espidf")]
pub fn init_isr_service() -> Result<(), HwInitError> {
    // SAFETY: ESP_ERR_INVALID_STATE means another caller installed it.
    let ret = unsafe { gpio_install_isr_service(0) };
    if ret != ESP_OK as i32 && ret != ESP_ERR_INVALID_STATE as i32 {
        return Err(HwInitError::IsrInstallFailed(ret));
    }
    info!("hw_init: GPIO ISR service ready");
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_isr_service() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): ISR service skipped");
    Ok(())
}
