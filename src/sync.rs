//! Small synchronisation primitives shared by the capture and inference paths.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::{Condvar, Mutex};

/// Binary wake signal connecting a non-blocking producer (the interrupt path
/// or the buffer-swap path) to a single blocking waiter.
///
/// `raise` never allocates and only flips a flag under a short-held lock.
/// A raise that arrives while no waiter is parked satisfies the next `wait`
/// immediately; multiple raises before a wait collapse into one.
pub struct WakeSignal {
    raised: Mutex<bool>,
    cond: Condvar,
}

impl WakeSignal {
    pub fn new() -> Self {
        Self {
            raised: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Producer side. Safe to call from the block-delivery callback.
    pub fn raise(&self) {
        let mut raised = self.raised.lock();
        *raised = true;
        self.cond.notify_one();
    }

    /// Consumer side: block until raised, then consume the signal.
    pub fn wait(&self) {
        let mut raised = self.raised.lock();
        while !*raised {
            self.cond.wait(&mut raised);
        }
        *raised = false;
    }

    /// Consume the signal without blocking. Returns whether it was raised.
    pub fn try_consume(&self) -> bool {
        let mut raised = self.raised.lock();
        std::mem::replace(&mut *raised, false)
    }

    /// Like `wait`, but gives up after `timeout`. Returns whether the signal
    /// was raised and consumed.
    pub fn wait_timeout(&self, timeout: std::time::Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut raised = self.raised.lock();
        while !*raised {
            if self.cond.wait_until(&mut raised, deadline).timed_out() {
                return std::mem::replace(&mut *raised, false);
            }
        }
        *raised = false;
        true
    }
}

impl Default for WakeSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared "time of inference start" scalar, written by the capture path at
/// each window delivery and read by the inference path at the top of an
/// iteration.
///
/// The value is the f32 bit pattern in an atomic, so reads and writes are
/// never torn.
pub struct SharedTimestamp {
    bits: AtomicU32,
}

impl SharedTimestamp {
    pub fn new() -> Self {
        Self {
            bits: AtomicU32::new(0f32.to_bits()),
        }
    }

    pub fn set(&self, seconds: f32) {
        self.bits.store(seconds.to_bits(), Ordering::Release);
    }

    pub fn get(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Acquire))
    }
}

impl Default for SharedTimestamp {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn raise_before_wait_satisfies_immediately() {
        let signal = WakeSignal::new();
        signal.raise();
        signal.wait(); // must not block
        assert!(!signal.try_consume(), "signal should be consumed by wait");
    }

    #[test]
    fn multiple_raises_collapse_into_one() {
        let signal = WakeSignal::new();
        signal.raise();
        signal.raise();
        signal.wait();
        assert!(!signal.try_consume());
    }

    #[test]
    fn raise_unblocks_parked_waiter() {
        let signal = Arc::new(WakeSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || signal.wait())
        };
        thread::sleep(Duration::from_millis(20));
        signal.raise();
        waiter.join().expect("waiter thread panicked");
    }

    #[test]
    fn wait_timeout_reports_whether_raised() {
        let signal = WakeSignal::new();
        assert!(!signal.wait_timeout(Duration::from_millis(10)));
        signal.raise();
        assert!(signal.wait_timeout(Duration::from_millis(10)));
        assert!(!signal.try_consume(), "timed wait must consume the signal");
    }

    #[test]
    fn timestamp_round_trips_exact_bits() {
        let ts = SharedTimestamp::new();
        assert_eq!(ts.get(), 0.0);
        ts.set(1.2345);
        assert_eq!(ts.get(), 1.2345);
        ts.set(-0.5);
        assert_eq!(ts.get(), -0.5);
    }
}
