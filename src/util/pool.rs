//! Bounded blocking object pool.
//!
//! Every entry is created up front. `borrow` blocks until an entry is
//! available, so the pool capacity bounds the number of concurrent
//! borrowers. Callers are expected to reset an entry before returning it.

use parking_lot::{Condvar, Mutex};

/// Fixed-capacity pool of reusable objects.
#[derive(Debug)]
pub struct ObjectPool<T> {
    entries: Mutex<Vec<T>>,
    available: Condvar,
}

impl<T> ObjectPool<T> {
    /// Creates a pool holding `capacity` objects produced by `factory`.
    pub fn new(capacity: usize, factory: impl Fn() -> T) -> Self {
        let entries = (0..capacity).map(|_| factory()).collect();
        Self {
            entries: Mutex::new(entries),
            available: Condvar::new(),
        }
    }

    /// Takes an object out of the pool, blocking while the pool is empty.
    pub fn borrow(&self) -> T {
        let mut entries = self.entries.lock();
        loop {
            if let Some(entry) = entries.pop() {
                return entry;
            }
            self.available.wait(&mut entries);
        }
    }

    /// Puts an object back and wakes one blocked borrower.
    pub fn give_back(&self, entry: T) {
        self.entries.lock().push(entry);
        self.available.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_borrow_and_return() {
        let pool = ObjectPool::new(2, || vec![0u8; 4]);
        let a = pool.borrow();
        let b = pool.borrow();
        pool.give_back(a);
        pool.give_back(b);
        let _ = pool.borrow();
    }

    #[test]
    fn test_borrow_blocks_until_returned() {
        let pool = Arc::new(ObjectPool::new(1, || 42u32));
        let entry = pool.borrow();

        let waiter = {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || pool.borrow())
        };
        // Give the waiter time to block on the empty pool
        std::thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());

        pool.give_back(entry);
        assert_eq!(waiter.join().unwrap(), 42);
    }

    #[test]
    fn test_capacity_objects_created() {
        let pool = ObjectPool::new(3, String::new);
        let a = pool.borrow();
        let b = pool.borrow();
        let c = pool.borrow();
        assert_eq!((a, b, c), (String::new(), String::new(), String::new()));
    }
}
