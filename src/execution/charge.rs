use std::sync::atomic::{AtomicU64, Ordering};

/// Request charge accumulated from pages that were not shown to the caller
///
/// Stored as `f64` bits so it can be shared by reference between concurrent fetches.
#[derive(Debug, Default)]
pub struct RequestChargeTracker {
    bits: AtomicU64,
}

impl RequestChargeTracker {
    pub fn new() -> Self {
        Self {
            bits: AtomicU64::new(0f64.to_bits()),
        }
    }

    pub fn add_charge(&self, charge: f64) {
        let mut current = self.bits.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + charge).to_bits();
            match self.bits.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn charge(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Returns the accumulated charge and resets it to zero in one step
    pub fn get_and_reset_charge(&self) -> f64 {
        f64::from_bits(self.bits.swap(0f64.to_bits(), Ordering::AcqRel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_add_and_reset() {
        let tracker = RequestChargeTracker::new();
        tracker.add_charge(2.0);
        tracker.add_charge(1.5);
        assert_eq!(tracker.charge(), 3.5);
        assert_eq!(tracker.get_and_reset_charge(), 3.5);
        assert_eq!(tracker.charge(), 0.0);
    }

    #[test]
    fn test_concurrent_adds() {
        let tracker = Arc::new(RequestChargeTracker::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        tracker.add_charge(0.5);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.get_and_reset_charge(), 200.0);
    }
}
