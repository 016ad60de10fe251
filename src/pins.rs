//! GPIO / peripheral pin assignments for the client board.
//!
//! Single source of truth for the compiled-in defaults in
//! [`ClientConfig`](crate::config::ClientConfig).

// ---------------------------------------------------------------------------
// RGB light (Light-Control object, one LEDC channel per colour)
// ---------------------------------------------------------------------------

pub const LED_R_GPIO: i32 = 4;
pub const LED_G_GPIO: i32 = 16;
pub const LED_B_GPIO: i32 = 17;

// ---------------------------------------------------------------------------
// PWM configuration
// ---------------------------------------------------------------------------

/// LEDC timer resolution (bits).  10-bit gives 0 – 1023 duty levels.
pub const PWM_RESOLUTION_BITS: u32 = 10;
/// LEDC frequency for the light channels.
pub const LED_PWM_FREQ_HZ: u32 = 2_000;

// ---------------------------------------------------------------------------
// User button (active-low with pull-up)
// ---------------------------------------------------------------------------

/// Boot button, exposed as the Push Button object.
pub const BUTTON_GPIO: i32 = 0;

