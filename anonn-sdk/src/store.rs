//! Per-session signal state.
//!
//! Only raw values are stored. Buckets are derived on every read, so they can
//! never go stale relative to the raw snapshot.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anonn_common::{bucket_signals, has_all_signals, PartialUserSignals, RawSignals};
use chrono::{DateTime, Utc};

#[derive(Debug, Default)]
pub struct SignalStore {
    raw: RwLock<RawSignals>,
}

impl SignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RawSignals> {
        self.raw.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RawSignals> {
        self.raw.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Overlay the fields present in `update`.
    pub fn merge(&self, update: RawSignals) {
        self.write().merge(update);
    }

    pub fn raw(&self) -> RawSignals {
        self.read().clone()
    }

    pub fn bucketed(&self, now: DateTime<Utc>) -> PartialUserSignals {
        bucket_signals(&self.read(), now)
    }

    pub fn has_all_signals(&self, now: DateTime<Utc>) -> bool {
        has_all_signals(&self.bucketed(now))
    }

    pub fn clear(&self) {
        *self.write() = RawSignals::default();
    }
}
