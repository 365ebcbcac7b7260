// src/engine/semaphore.rs
//
// Counting semaphore that bounds outstanding dispatches to the number of codec
// workers. Permits are RAII: dropping one wakes a waiter.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

#[derive(Debug)]
pub struct CountingSemaphore {
    permits: usize,
    available: Mutex<usize>,
    cvar: Condvar,
}

/// One unit of a [`CountingSemaphore`], returned on drop.
#[derive(Debug)]
pub struct Permit {
    sem: Arc<CountingSemaphore>,
}

impl CountingSemaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            permits,
            available: Mutex::new(permits),
            cvar: Condvar::new(),
        }
    }

    pub fn permits(&self) -> usize {
        self.permits
    }

    pub fn available(&self) -> usize {
        *self.available.lock()
    }

    /// Block until a permit is free.
    pub fn acquire(self: &Arc<Self>) -> Permit {
        let mut available = self.available.lock();
        while *available == 0 {
            self.cvar.wait(&mut available);
        }
        *available -= 1;
        Permit {
            sem: Arc::clone(self),
        }
    }

    pub fn try_acquire(self: &Arc<Self>) -> Option<Permit> {
        let mut available = self.available.lock();
        if *available == 0 {
            return None;
        }
        *available -= 1;
        Some(Permit {
            sem: Arc::clone(self),
        })
    }

    fn release(&self) {
        let mut available = self.available.lock();
        *available += 1;
        self.cvar.notify_one();
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.sem.release();
    }
}
