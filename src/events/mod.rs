//! Process-wide level-triggered condition flags.
//!
//! A single bit group carries the system's level conditions: network up,
//! publisher service initialised/connected, and the inference start/stop
//! pair. Bits stay set until explicitly cleared; any task may block on any
//! combination, and every parked waiter whose mask is satisfied is released
//! together. There is no payload and no queueing — this is a broadcast
//! condition primitive, not a channel.
//!
//! `SystemEvents` is an explicit context object: construct one, wrap it in
//! an `Arc`, and hand it to each task at construction time.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::info;

/// Network connectivity established.
pub const NETWORK_UP: u32 = 1 << 0;
/// Publisher service initialised.
pub const SERVICE_INIT: u32 = 1 << 1;
/// Publisher service connected.
pub const SERVICE_CONNECTED: u32 = 1 << 2;
/// Inference start requested.
pub const INFERENCE_START: u32 = 1 << 3;
/// Inference stop requested.
pub const INFERENCE_STOP: u32 = 1 << 4;

/// Shared level-flag group.
pub struct SystemEvents {
    bits: Mutex<u32>,
    cond: Condvar,
}

impl SystemEvents {
    pub fn new() -> Self {
        Self {
            bits: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    /// Set `mask` bits and release every waiter whose condition is now met.
    /// Setting a bit never clears another.
    pub fn set(&self, mask: u32) {
        let mut bits = self.bits.lock();
        *bits |= mask;
        self.cond.notify_all();
    }

    /// Clear `mask` bits.
    pub fn clear(&self, mask: u32) {
        let mut bits = self.bits.lock();
        *bits &= !mask;
    }

    /// Zero-timeout check: which of `mask` are currently set.
    pub fn poll(&self, mask: u32) -> u32 {
        *self.bits.lock() & mask
    }

    /// Non-blocking check that also consumes the observed bits.
    pub fn take(&self, mask: u32) -> u32 {
        let mut bits = self.bits.lock();
        let hit = *bits & mask;
        *bits &= !hit;
        hit
    }

    /// Block until any bit in `mask` is set. The bits stay set (level
    /// semantics); returns the satisfied subset.
    pub fn wait_any(&self, mask: u32) -> u32 {
        let mut bits = self.bits.lock();
        while *bits & mask == 0 {
            self.cond.wait(&mut bits);
        }
        *bits & mask
    }

    /// Block until any bit in `mask` is set, consuming the satisfied bits
    /// on return. Used for the start/stop request pair, which is edge-like
    /// for its single consumer.
    pub fn wait_any_take(&self, mask: u32) -> u32 {
        let mut bits = self.bits.lock();
        loop {
            let hit = *bits & mask;
            if hit != 0 {
                *bits &= !hit;
                return hit;
            }
            self.cond.wait(&mut bits);
        }
    }

    /// Like `wait_any_take` but gives up after `timeout`, returning 0 when
    /// nothing was set in time.
    pub fn wait_any_take_timeout(&self, mask: u32, timeout: Duration) -> u32 {
        let deadline = Instant::now() + timeout;
        let mut bits = self.bits.lock();
        loop {
            let hit = *bits & mask;
            if hit != 0 {
                *bits &= !hit;
                return hit;
            }
            if self.cond.wait_until(&mut bits, deadline).timed_out() {
                let hit = *bits & mask;
                *bits &= !hit;
                return hit;
            }
        }
    }

    /// Request inference start. Clears the stop request first so the pair
    /// stays mutually exclusive; idempotent while already started.
    pub fn request_inference_start(&self) {
        info!("signal inference start");
        let mut bits = self.bits.lock();
        *bits = (*bits & !INFERENCE_STOP) | INFERENCE_START;
        self.cond.notify_all();
    }

    /// Request inference stop. Clears the start request first; idempotent
    /// while already stopped.
    pub fn request_inference_stop(&self) {
        info!("signal inference stop");
        let mut bits = self.bits.lock();
        *bits = (*bits & !INFERENCE_START) | INFERENCE_STOP;
        self.cond.notify_all();
    }

    // Convenience waits for the service bring-up conditions.

    pub fn wait_network_up(&self) {
        self.wait_any(NETWORK_UP);
    }

    pub fn wait_service_init(&self) {
        self.wait_any(SERVICE_INIT);
    }

    pub fn wait_service_connected(&self) {
        self.wait_any(SERVICE_CONNECTED);
    }

    pub fn is_service_connected(&self) -> bool {
        self.poll(SERVICE_CONNECTED) != 0
    }
}

impl Default for SystemEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn bits_are_level_triggered_and_independent() {
        let events = SystemEvents::new();
        events.set(NETWORK_UP);
        events.set(SERVICE_INIT);
        assert_eq!(events.poll(NETWORK_UP), NETWORK_UP);
        assert_eq!(events.poll(SERVICE_INIT), SERVICE_INIT);

        events.clear(NETWORK_UP);
        assert_eq!(events.poll(NETWORK_UP), 0);
        assert_eq!(events.poll(SERVICE_INIT), SERVICE_INIT, "other bits untouched");
    }

    #[test]
    fn start_and_stop_requests_are_mutually_exclusive() {
        let events = SystemEvents::new();
        events.request_inference_start();
        assert_eq!(events.poll(INFERENCE_START | INFERENCE_STOP), INFERENCE_START);

        events.request_inference_stop();
        assert_eq!(events.poll(INFERENCE_START | INFERENCE_STOP), INFERENCE_STOP);

        // Idempotent: repeating the request changes nothing.
        events.request_inference_stop();
        assert_eq!(events.poll(INFERENCE_START | INFERENCE_STOP), INFERENCE_STOP);
    }

    #[test]
    fn take_consumes_only_observed_bits() {
        let events = SystemEvents::new();
        assert_eq!(events.take(INFERENCE_STOP), 0);

        events.set(INFERENCE_STOP | NETWORK_UP);
        assert_eq!(events.take(INFERENCE_STOP), INFERENCE_STOP);
        assert_eq!(events.poll(INFERENCE_STOP), 0);
        assert_eq!(events.poll(NETWORK_UP), NETWORK_UP);
    }

    #[test]
    fn start_waiter_is_released_while_stop_waiter_stays_blocked() {
        let events = Arc::new(SystemEvents::new());

        let start_released = Arc::new(AtomicBool::new(false));
        let stop_released = Arc::new(AtomicBool::new(false));

        let start_waiter = {
            let events = Arc::clone(&events);
            let released = Arc::clone(&start_released);
            thread::spawn(move || {
                events.wait_any(INFERENCE_START);
                released.store(true, Ordering::SeqCst);
            })
        };
        let stop_waiter = {
            let events = Arc::clone(&events);
            let released = Arc::clone(&stop_released);
            thread::spawn(move || {
                events.wait_any(INFERENCE_STOP);
                released.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(20));
        events.request_inference_start();
        start_waiter.join().expect("start waiter panicked");

        assert!(start_released.load(Ordering::SeqCst));
        thread::sleep(Duration::from_millis(50));
        assert!(
            !stop_released.load(Ordering::SeqCst),
            "stop waiter must remain blocked"
        );

        // Release the parked waiter so the test exits cleanly.
        events.set(INFERENCE_STOP);
        stop_waiter.join().expect("stop waiter panicked");
    }

    #[test]
    fn all_waiters_on_the_same_bit_are_released_together() {
        let events = Arc::new(SystemEvents::new());
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let events = Arc::clone(&events);
                thread::spawn(move || events.wait_any(SERVICE_CONNECTED))
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        events.set(SERVICE_CONNECTED);
        for w in waiters {
            assert_eq!(w.join().expect("waiter panicked"), SERVICE_CONNECTED);
        }
        assert!(events.is_service_connected());
    }

    #[test]
    fn wait_any_take_timeout_returns_zero_when_nothing_is_set() {
        let events = SystemEvents::new();
        let hit = events.wait_any_take_timeout(INFERENCE_START, Duration::from_millis(10));
        assert_eq!(hit, 0);
    }
}
