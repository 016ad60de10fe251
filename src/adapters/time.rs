//! ESP32 time adapter.
//!
//! - **`target_os = "espidf"`** wraps `esp_timer_get_time()` (monotonic,
//!   microsecond precision) and `gettimeofday()` for wall-clock time.
//! - **`not(target_os = "espidf")`** uses `std::time` for host-side tests.

/// Time source consumed by the job queue and the Device object.
pub trait Clock {
    /// Milliseconds since boot (monotonic).
    fn uptime_ms(&self) -> u64;

    /// Wall-clock seconds since the Unix epoch. Before SNTP sync this is
    /// whatever the RTC holds (usually close to zero).
    fn unix_secs(&self) -> i64;
}

pub struct SystemClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    #[cfg(target_os = "espidf")]
    fn uptime_ms(&self) -> u64 {
        // SAFETY: reads the high-resolution timer counter.
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000
    }

    #[cfg(not(target_os = "espidf"))]
    fn uptime_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    #[cfg(target_os = "espidf")]
    fn unix_secs(&self) -> i64 {
        let mut tv = esp_idf_svc::sys::timeval { tv_sec: 0, tv_usec: 0 };
        // SAFETY: tv is a valid out-pointer; timezone is unused.
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, core::ptr::null_mut()) } != 0 {
            return 0;
        }
        tv.tv_sec as i64
    }

    #[cfg(not(target_os = "espidf"))]
    fn unix_secs(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| d.as_secs() as i64)
    }
}
