//! Byte budget + RAII guards.
//!
//! Sort run generation reserves the estimated size of every buffered row and
//! spills once a reservation is refused. Dropping a guard hands its bytes back.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use reltab_core::budget::{BudgetGuard, MemoryBudget};

struct Counter {
    capacity: usize,
    used: AtomicUsize,
}

impl Counter {
    fn reserve(&self, bytes: usize) -> bool {
        let mut cur = self.used.load(Ordering::Relaxed);
        loop {
            let next = cur.saturating_add(bytes);
            if next > self.capacity {
                return false;
            }
            match self
                .used
                .compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return true,
                Err(observed) => cur = observed,
            }
        }
    }

    fn release(&self, bytes: usize) {
        self.used.fetch_sub(bytes, Ordering::AcqRel);
    }
}

/// Shared byte budget; clones account against the same cap.
#[derive(Clone)]
pub struct ByteBudget {
    counter: Arc<Counter>,
}

impl ByteBudget {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            counter: Arc::new(Counter {
                capacity: capacity_bytes,
                used: AtomicUsize::new(0),
            }),
        }
    }

    /// A budget that never refuses (`usize::MAX` capacity).
    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }
}

impl std::fmt::Debug for ByteBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteBudget")
            .field("capacity", &self.counter.capacity)
            .field("used", &self.counter.used.load(Ordering::Relaxed))
            .finish()
    }
}

impl MemoryBudget for ByteBudget {
    type Guard = Reservation;

    fn try_acquire(&self, bytes: usize, tag: &'static str) -> Option<Reservation> {
        if bytes > 0 && !self.counter.reserve(bytes) {
            return None;
        }
        Some(Reservation {
            counter: Arc::clone(&self.counter),
            bytes,
            tag,
        })
    }

    fn capacity_bytes(&self) -> usize {
        self.counter.capacity
    }

    fn used_bytes(&self) -> usize {
        self.counter.used.load(Ordering::Relaxed)
    }
}

/// Bytes held against a [`ByteBudget`].
pub struct Reservation {
    counter: Arc<Counter>,
    bytes: usize,
    tag: &'static str,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.bytes > 0 {
            self.counter.release(self.bytes);
            self.bytes = 0;
        }
    }
}

impl BudgetGuard for Reservation {
    fn bytes(&self) -> usize {
        self.bytes
    }

    fn try_resize(&mut self, new_bytes: usize) -> bool {
        if new_bytes <= self.bytes {
            self.counter.release(self.bytes - new_bytes);
            self.bytes = new_bytes;
            return true;
        }
        if self.counter.reserve(new_bytes - self.bytes) {
            self.bytes = new_bytes;
            true
        } else {
            false
        }
    }

    fn tag(&self) -> &'static str {
        self.tag
    }
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("bytes", &self.bytes)
            .field("tag", &self.tag)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grow_until_refused_then_release_on_drop() {
        let budget = ByteBudget::new(100);
        let mut r = budget.try_acquire(0, "test").unwrap();
        assert!(r.try_resize(60));
        assert!(r.try_resize(100));
        assert!(!r.try_resize(101));
        assert_eq!(budget.used_bytes(), 100);
        assert!(r.try_resize(10));
        assert_eq!(budget.used_bytes(), 10);
        drop(r);
        assert_eq!(budget.used_bytes(), 0);
    }

    #[test]
    fn clones_share_the_cap() {
        let a = ByteBudget::new(50);
        let b = a.clone();
        let _held = a.try_acquire(40, "a").unwrap();
        assert!(b.try_acquire(20, "b").is_none());
        assert!(b.try_acquire(10, "b").is_some());
    }
}
