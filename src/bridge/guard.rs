//! Single-flight guard for the CAD host.
//!
//! The host's scripting surface tolerates exactly one in-flight mutating
//! operation. The guard is an in-flight flag with compare-and-swap
//! acquisition: a second mutating request arriving while the flag is set is
//! rejected immediately (the bridge answers HTTP 429) instead of being
//! queued. Release is tied to permit drop, so the flag is cleared on every
//! exit path — success, handled application error, or unwind.

use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide in-flight flag for mutating operations.
#[derive(Debug, Default)]
pub struct SingleFlightGuard {
    in_flight: AtomicBool,
}

impl SingleFlightGuard {
    /// Creates a guard with no operation in flight.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            in_flight: AtomicBool::new(false),
        }
    }

    /// Attempts to claim the guard.
    ///
    /// Returns `None` when another operation is already in flight. The
    /// returned permit releases the guard when dropped.
    #[must_use]
    pub fn try_acquire(&self) -> Option<FlightPermit<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Acquire)
            .ok()
            .map(|_| FlightPermit { guard: self })
    }

    /// Whether an operation is currently in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Proof of exclusive access to the host for one mutating request.
#[derive(Debug)]
pub struct FlightPermit<'a> {
    guard: &'a SingleFlightGuard,
}

impl Drop for FlightPermit<'_> {
    fn drop(&mut self) {
        self.guard.in_flight.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_then_contend() {
        let guard = SingleFlightGuard::new();
        let permit = guard.try_acquire();
        assert!(permit.is_some());
        assert!(guard.is_busy());
        assert!(guard.try_acquire().is_none());
    }

    #[test]
    fn drop_releases() {
        let guard = SingleFlightGuard::new();
        {
            let _permit = guard.try_acquire().unwrap();
            assert!(guard.is_busy());
        }
        assert!(!guard.is_busy());
        assert!(guard.try_acquire().is_some());
    }

    #[test]
    fn only_one_winner_across_threads() {
        let guard = std::sync::Arc::new(SingleFlightGuard::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let guard = std::sync::Arc::clone(&guard);
            handles.push(std::thread::spawn(move || {
                // Leak the permit so the guard stays held for the whole race.
                guard.try_acquire().map(std::mem::forget).is_some()
            }));
        }
        let winners = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
    }
}
