//! Push-button input sampled from a GPIO interrupt.
//!
//! ## Hardware
//!
//! Active-low momentary switch with internal pull-up. The GPIO fires on
//! both edges; the ISR stores the level into [`ButtonInput`] and bumps the
//! press counter on the falling edge. The foreground task reads the atomics
//! and diffs them against its last observed values.

use core::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;

use crate::drivers::hw_init::HwInitError;

const UNBOUND: i32 = -1;

/// ISR-shared button state. Lock-free; safe to touch from interrupt context.
///
/// Also carries the GPIO it is bound to, so the ISR argument alone is
/// enough to sample the pin.
#[derive(Debug)]
pub struct ButtonInput {
    gpio: AtomicI32,
    pressed: AtomicBool,
    presses: AtomicU32,
}

impl Default for ButtonInput {
    fn default() -> Self {
        Self {
            gpio: AtomicI32::new(UNBOUND),
            pressed: AtomicBool::new(false),
            presses: AtomicU32::new(0),
        }
    }
}

impl ButtonInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the ISR samples, `None` until a [`ButtonIsr`] is installed.
    pub fn gpio(&self) -> Option<i32> {
        let gpio = self.gpio.load(Ordering::Acquire);
        (gpio != UNBOUND).then_some(gpio)
    }

    fn bind(&self, gpio: i32) {
        self.gpio.store(gpio, Ordering::Release);
    }

    /// Record an edge. A press increments the counter.
    pub fn on_edge(&self, pressed: bool) {
        self.pressed.store(pressed, Ordering::Release);
        if pressed {
            self.presses.fetch_add(1, Ordering::AcqRel);
        }
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed.load(Ordering::Acquire)
    }

    pub fn presses(&self) -> u32 {
        self.presses.load(Ordering::Acquire)
    }
}

/// Installed GPIO interrupt. Removing the handler on drop releases the
/// reference the ISR holds on the shared [`ButtonInput`].
pub struct ButtonIsr {
    gpio: i32,
    #[cfg(target_os = "espidf")]
    arg: *const ButtonInput,
    #[cfg(not(target_os = "espidf"))]
    _input: Arc<ButtonInput>,
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn button_gpio_isr(arg: *mut core::ffi::c_void) {
    // SAFETY: arg is the pointer leaked in ButtonIsr::install and stays valid
    // until the handler is removed in Drop.
    let input = unsafe { &*(arg as *const ButtonInput) };
    if let Some(gpio) = input.gpio() {
        // Active-low.
        input.on_edge(!crate::drivers::hw_init::gpio_read(gpio));
    }
}

impl ButtonIsr {
    /// Configure `gpio` and attach the edge ISR feeding `input`.
    #[cfg(target_os = "espidf")]
    pub fn install(gpio: i32, input: &Arc<ButtonInput>) -> Result<Self, HwInitError> {
        use crate::drivers::hw_init::{gpio_input_anyedge, init_isr_service};
        use esp_idf_svc::sys::{gpio_intr_enable, gpio_isr_handler_add, ESP_OK};

        gpio_input_anyedge(gpio)?;
        init_isr_service()?;
        input.bind(gpio);

        let arg = Arc::into_raw(Arc::clone(input));
        // SAFETY: arg is reclaimed in Drop (or below on failure).
        let ret = unsafe { gpio_isr_handler_add(gpio, Some(button_gpio_isr), arg as *mut _) };
        if ret != ESP_OK as i32 {
            // SAFETY: the handler was not registered, so nothing else holds arg.
            drop(unsafe { Arc::from_raw(arg) });
            return Err(HwInitError::IsrHandlerFailed(ret));
        }
        // SAFETY: handler is registered for a configured input pin.
        unsafe { gpio_intr_enable(gpio) };
        log::info!("button: ISR attached to GPIO{}", gpio);
        Ok(Self { gpio, arg })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn install(gpio: i32, input: &Arc<ButtonInput>) -> Result<Self, HwInitError> {
        log::info!("button(sim): GPIO{} ISR simulated", gpio);
        input.bind(gpio);
        Ok(Self { gpio, _input: Arc::clone(input) })
    }

    pub fn gpio(&self) -> i32 {
        self.gpio
    }
}

impl Drop for ButtonIsr {
    fn drop(&mut self) {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: after removal the ISR can no longer observe arg.
            unsafe {
                esp_idf_svc::sys::gpio_isr_handler_remove(self.gpio);
                esp_idf_svc::sys::gpio_reset_pin(self.gpio);
                drop(Arc::from_raw(self.arg));
            }
        }
    }
}
