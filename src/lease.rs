// src/lease.rs
//
// At most one conversion (a batch or a single item) runs at a time. Holding a
// ConversionLease is that right; dropping it gives it back, on every exit path.

use crate::error::{ConverterError, Result};
use parking_lot::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeaseKind {
    Batch,
    Single,
}

impl LeaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseKind::Batch => "batch",
            LeaseKind::Single => "single-item",
        }
    }
}

#[derive(Debug, Default)]
pub struct LeaseSlot {
    active: Mutex<Option<LeaseKind>>,
}

impl LeaseSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self, kind: LeaseKind) -> Result<ConversionLease<'_>> {
        let mut active = self.active.lock();
        if let Some(current) = *active {
            return Err(ConverterError::conversion_in_progress(current.as_str()));
        }
        *active = Some(kind);
        Ok(ConversionLease { slot: self, kind })
    }

    pub fn active(&self) -> Option<LeaseKind> {
        *self.active.lock()
    }
}

#[must_use = "the lease is released as soon as it is dropped"]
#[derive(Debug)]
pub struct ConversionLease<'a> {
    slot: &'a LeaseSlot,
    kind: LeaseKind,
}

impl ConversionLease<'_> {
    pub fn kind(&self) -> LeaseKind {
        self.kind
    }
}

impl Drop for ConversionLease<'_> {
    fn drop(&mut self) {
        *self.slot.active.lock() = None;
    }
}
