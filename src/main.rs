//! LwM2M Client Firmware — Main Entry Point
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  NvsAdapter      LedcPwm      WifiAdapter    StaInterface      │
//! │  (Config+NVS)    (PWM)        (Connectivity) (Interface info)  │
//! │  SystemClock     ButtonIsr    FirmwareUpdate   Axp192 (I²C)    │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │  DataModel: Device · WLAN · Light Control · Push Button│    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Runtime (jobs, reconfigure, status) ◀── CellularEventLoop     │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{anyhow, Result};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::units::Hertz;
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};
use log::{error, info, warn};

use lwm2m_client::adapters::firmware_update;
use lwm2m_client::adapters::ledc::LedcPwm;
use lwm2m_client::adapters::nvs::NvsAdapter;
use lwm2m_client::adapters::time::SystemClock;
use lwm2m_client::adapters::wifi::{StaInterface, WifiAdapter};
use lwm2m_client::adapters::device_id;
use lwm2m_client::app::ports::{ConfigPort, I2cRegisters};
use lwm2m_client::app::runtime::Runtime;
use lwm2m_client::cellular::event_loop::CellularEventLoop;
use lwm2m_client::config::ClientConfig;
use lwm2m_client::drivers::axp192::{self, Axp192};
use lwm2m_client::drivers::button::{ButtonInput, ButtonIsr};
use lwm2m_client::drivers::hw_init;
use lwm2m_client::lwm2m::device::DeviceObject;
use lwm2m_client::lwm2m::light_control::LightControlObject;
use lwm2m_client::lwm2m::push_button::PushButtonObject;
use lwm2m_client::lwm2m::registry::DataModel;
use lwm2m_client::lwm2m::wlan::WlanObject;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("LwM2M client v{}", env!("CARGO_PKG_VERSION"));

    // ── 1b. OTA rollback check ─────────────────────────────────
    firmware_update::mark_running_valid();

    if let Err(e) = hw_init::init_isr_service() {
        error!("ISR service init failed: {}; continuing without button ISR", e);
    }

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let nvs = NvsAdapter::new().map_err(|e| anyhow!("NVS init failed: {}", e))?;
    let config = match nvs.load() {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            ClientConfig::default()
        }
    };

    // ── 2b. Board power ───────────────────────────────────────
    let peripherals = Peripherals::take()?;
    if config.pmic_axp192 {
        let i2c = I2cDriver::new(
            peripherals.i2c1,
            peripherals.pins.gpio21,
            peripherals.pins.gpio22,
            &I2cConfig::new().baudrate(Hertz(axp192::I2C_FREQ_HZ)),
        )?;
        let mut pmic = Axp192::new(I2cRegisters::new(i2c, axp192::I2C_ADDRESS));
        if let Err(e) = pmic.power_on() {
            error!("AXP192 power-on failed: {}; LED and LCD rails may be off", e);
        }
    }

    // ── 3. Device identity ────────────────────────────────────
    let mac = device_id::read_mac();
    let endpoint = device_id::endpoint_name(&config.endpoint_prefix, &mac);
    info!("Endpoint: {} (server {})", endpoint, config.server_uri);

    // ── 4. Data model ─────────────────────────────────────────
    let mut model = DataModel::new();

    let device = DeviceObject::new(SystemClock::new(), &mac);
    let reboot_flag = device.reboot_flag();
    model
        .register(Box::new(device))
        .map_err(|e| anyhow!("Device object: {}", e))?;

    // A failed object stays unregistered; the client runs without it.
    match LightControlObject::create(
        LedcPwm::new(),
        &config.led_channels,
        config.led_active_low,
        config.led_pwm_freq_hz,
    ) {
        Ok(light) => {
            if let Err(e) = model.register(Box::new(light)) {
                warn!("Light control not registered: {}", e);
            }
        }
        Err(e) => warn!("Light control unavailable: {}", e),
    }

    let button = Arc::new(ButtonInput::new());
    let _button_isr = match ButtonIsr::install(config.button_gpio, &button) {
        Ok(isr) => {
            if let Err(e) = model.register(Box::new(PushButtonObject::new(Arc::clone(&button)))) {
                warn!("Push button not registered: {}", e);
            }
            Some(isr)
        }
        Err(e) => {
            warn!("Push button unavailable: {}", e);
            None
        }
    };

    let wlan = WlanObject::load(nvs, StaInterface, &config.preconfigured_wifi);
    model
        .register(Box::new(wlan))
        .map_err(|e| anyhow!("WLAN object: {}", e))?;

    // ── 5. Wi-Fi station ──────────────────────────────────────
    let sysloop = EspSystemEventLoop::take()?;
    let esp_wifi = EspWifi::new(peripherals.modem, sysloop.clone(), None)?;
    let wifi = WifiAdapter::new(BlockingWifi::wrap(esp_wifi, sysloop)?);

    if config.cellular {
        // The vendor AT stack implements ModemPort and opens the session
        // through Runtime::open_cellular_session; none is linked here.
        warn!("Cellular transport selected but no modem driver is linked; using Wi-Fi");
    }

    // ── 6. Event loop ─────────────────────────────────────────
    let mut runtime = Runtime::new(
        model,
        wifi,
        SystemClock::new(),
        Duration::from_millis(u64::from(config.update_interval_ms)),
    );
    let event_loop = CellularEventLoop::new();
    runtime.attach_event_loop(event_loop.handle());
    runtime.watch_reboot(Arc::clone(&reboot_flag));

    info!("System ready. Entering event loop.");
    event_loop
        .run(&mut runtime)
        .map_err(|e| anyhow!("event loop: {}", e))?;

    // ── 7. Reboot ─────────────────────────────────────────────
    if runtime.firmware().update_requested() {
        firmware_update::reboot();
    }
    if reboot_flag.load(Ordering::Acquire) {
        info!("Rebooting on request");
        esp_idf_svc::hal::reset::restart();
    }
    warn!("Event loop stopped without a reboot request");
    Ok(())
}
