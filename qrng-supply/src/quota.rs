// SPDX-License-Identifier: MIT
//
// QRNG Supply: Buffered Quantum Randomness for Impatient Consumers

//! Lifetime cap on upstream calls

use std::sync::atomic::{AtomicU32, Ordering};

/// Bounded, monotonically increasing counter of upstream requests.
///
/// `issued() <= limit()` holds at all times, under any number of concurrent
/// callers of [`Quota::try_reserve`].
#[derive(Debug)]
pub struct Quota {
    issued: AtomicU32,
    limit: u32,
}

impl Quota {
    pub fn new(limit: u32) -> Self {
        Self {
            issued: AtomicU32::new(0),
            limit,
        }
    }

    /// Reserve one request slot. Returns false without mutating when the cap is reached.
    pub fn try_reserve(&self) -> bool {
        self.issued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |issued| {
                (issued < self.limit).then_some(issued + 1)
            })
            .is_ok()
    }

    pub fn issued(&self) -> u32 {
        self.issued.load(Ordering::Acquire)
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.issued())
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_reserve_until_cap() {
        let quota = Quota::new(3);
        assert!(quota.try_reserve());
        assert!(quota.try_reserve());
        assert_eq!(quota.remaining(), 1);
        assert!(quota.try_reserve());
        assert!(quota.is_exhausted());

        for _ in 0..10 {
            assert!(!quota.try_reserve());
        }
        assert_eq!(quota.issued(), 3);
    }

    #[test]
    fn test_concurrent_reservations_never_overshoot() {
        let quota = Quota::new(25);
        let granted = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..16 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        if quota.try_reserve() {
                            granted.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                });
            }
        });

        assert_eq!(granted.load(Ordering::Relaxed), 25);
        assert_eq!(quota.issued(), 25);
        assert!(!quota.try_reserve());
    }
}
