//! Monotonic clock shared by the task loops.
//!
//! - **`target_os = "espidf"`**: wraps `esp_timer_get_time()` (microsecond
//!   precision, monotonic since boot).
//! - **`not(target_os = "espidf")`**: uses `std::time::Instant` captured
//!   when the clock is created.
//!
//! The state machines never read the clock themselves; each task loop
//! samples it once per iteration and passes `now_ms` down.

/// Milliseconds since boot. `Copy` so every task gets its own handle.
#[derive(Debug, Clone, Copy)]
pub struct BootClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for BootClock {
    fn default() -> Self {
        Self::new()
    }
}

impl BootClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    #[cfg(target_os = "espidf")]
    pub fn now_ms(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn uptime_secs(&self) -> u64 {
        self.now_ms() / 1_000
    }
}

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;

    #[test]
    fn copies_share_the_same_epoch() {
        let clock = BootClock::new();
        let copy = clock;
        std::thread::sleep(std::time::Duration::from_millis(5));
        let a = clock.now_ms();
        let b = copy.now_ms();
        assert!(a >= 5);
        assert!(b >= a);
        assert_eq!(clock.uptime_secs(), 0);
    }
}
