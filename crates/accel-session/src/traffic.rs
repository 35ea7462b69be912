//! Traffic counters and accounting intervals.
//!
//! Front-ends report raw link counters that may restart from zero (a
//! 32-bit kernel counter wrapping, a link re-bound after a restore). The
//! session keeps a `base` that absorbs everything counted before the
//! current link reading, so totals only ever grow.

use std::time::Duration;

use accel_protocol::{Counters, SessionId};

/// One accounting record: what happened since the previous record, and
/// the session totals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcctRecord {
    pub session_id: SessionId,
    /// Traffic since the previous interval (or since accounting started).
    pub interval: Counters,
    /// Traffic since the session started.
    pub totals: Counters,
    /// Time since the session became active.
    pub session_time: Duration,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Traffic {
    base: Counters,
    link: Counters,
    interval_start: Counters,
}

/// Adds `old` to `base` when `new` is smaller than `old`, i.e. the link
/// counter restarted from zero.
fn fold(base: &mut u64, old: u64, new: u64) {
    if new < old {
        *base = base.saturating_add(old);
    }
}

impl Traffic {
    /// Counters carried over from a previous life of the session.
    pub(crate) fn restored(totals: Counters) -> Self {
        Self {
            base: totals,
            link: Counters::default(),
            interval_start: totals,
        }
    }

    /// Records a fresh link reading.
    pub(crate) fn update(&mut self, reading: Counters) {
        let Self { base, link, .. } = self;
        fold(&mut base.rx_bytes, link.rx_bytes, reading.rx_bytes);
        fold(&mut base.tx_bytes, link.tx_bytes, reading.tx_bytes);
        fold(&mut base.rx_packets, link.rx_packets, reading.rx_packets);
        fold(&mut base.tx_packets, link.tx_packets, reading.tx_packets);
        *link = reading;
    }

    pub(crate) fn totals(&self) -> Counters {
        self.base.saturating_add(self.link)
    }

    /// Starts a new interval at the current totals.
    pub(crate) fn reset_interval(&mut self) {
        self.interval_start = self.totals();
    }

    /// Closes the current interval and opens the next one.
    pub(crate) fn take_interval(&mut self) -> (Counters, Counters) {
        let totals = self.totals();
        let interval = totals.saturating_sub(self.interval_start);
        self.interval_start = totals;
        (interval, totals)
    }
}
