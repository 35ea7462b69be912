//! Per-session periodic timer for accel.
//!
//! Every session that has an idle or session timeout gets one of these.
//! The timer only decides *when* to look; what to check on each tick is
//! the session layer's business.
//!
//! # Disabled mode
//!
//! When `period` is zero the timer is disabled and
//! [`SessionTimer::wait_for_tick`] pends forever. Sessions without any
//! timeout use this so their task can still sit in a `tokio::select!`
//! with other branches.
//!
//! # Integration
//!
//! ```ignore
//! let mut timer = SessionTimer::new(config);
//! loop {
//!     timer.wait_for_tick().await;
//!     let Some(session) = weak.acquire() else { break };
//!     if let Some(cause) = session.check_timeouts() {
//!         session.terminate(cause, false);
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for a session timer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// Interval between checks. Zero disables the timer.
    pub period: Duration,
    /// Random jitter (0..max) added to the *first* tick so that sessions
    /// created in a burst (e.g. after a restore) do not all wake at once.
    pub initial_jitter: Duration,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(1),
            initial_jitter: Duration::from_millis(500),
        }
    }
}

impl TimerConfig {
    /// Shortest accepted non-zero period.
    pub const MIN_PERIOD: Duration = Duration::from_millis(100);

    /// Longest accepted period.
    pub const MAX_PERIOD: Duration = Duration::from_secs(3600);

    /// A config with the given period and default jitter.
    pub fn with_period(period: Duration) -> Self {
        Self {
            period,
            ..Default::default()
        }
    }

    /// A disabled timer.
    pub fn disabled() -> Self {
        Self {
            period: Duration::ZERO,
            initial_jitter: Duration::ZERO,
        }
    }

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`SessionTimer::new`]. Rules:
    /// - non-zero `period` clamped to [`Self::MIN_PERIOD`]..=[`Self::MAX_PERIOD`];
    /// - `initial_jitter` capped at one period.
    pub fn validated(mut self) -> Self {
        if self.period.is_zero() {
            return self;
        }
        if self.period < Self::MIN_PERIOD || self.period > Self::MAX_PERIOD {
            let clamped = self.period.clamp(Self::MIN_PERIOD, Self::MAX_PERIOD);
            warn!(
                period_ms = self.period.as_millis() as u64,
                clamped_ms = clamped.as_millis() as u64,
                "timer period out of range, clamping"
            );
            self.period = clamped;
        }
        if self.initial_jitter > self.period {
            self.initial_jitter = self.period;
        }
        self
    }

    /// Returns `true` if the timer never fires.
    pub fn is_disabled(&self) -> bool {
        self.period.is_zero()
    }
}

// ---------------------------------------------------------------------------
// Tick info
// ---------------------------------------------------------------------------

/// Information about a fired tick, returned by [`SessionTimer::wait_for_tick`].
#[derive(Debug, Clone)]
pub struct TimerTick {
    /// Monotonically increasing tick number (starts at 1).
    pub tick: u64,
    /// How many periods were missed because the task woke up late.
    /// Missed ticks are skipped, never replayed.
    pub ticks_skipped: u64,
}

// ---------------------------------------------------------------------------
// Timer
// ---------------------------------------------------------------------------

/// Periodic timer owned by one session's timer task.
pub struct SessionTimer {
    period: Option<Duration>,
    next_tick: Option<Instant>,
    tick_count: u64,
    total_skipped: u64,
}

impl SessionTimer {
    /// Creates a timer. The first tick is delayed by one period plus a
    /// random share of the configured jitter.
    pub fn new(config: TimerConfig) -> Self {
        let config = config.validated();
        let period = (!config.is_disabled()).then_some(config.period);

        let next_tick = period.map(|d| {
            let jitter = if config.initial_jitter.is_zero() {
                Duration::ZERO
            } else {
                let max_us = config.initial_jitter.as_micros() as u64;
                Duration::from_micros(rand::rng().random_range(0..max_us.max(1)))
            };
            Instant::now() + d + jitter
        });

        match period {
            Some(d) => debug!(period_ms = d.as_millis() as u64, "session timer created"),
            None => debug!("session timer created disabled"),
        }

        Self {
            period,
            next_tick,
            tick_count: 0,
            total_skipped: 0,
        }
    }

    /// A timer with the given period and default jitter.
    pub fn with_period(period: Duration) -> Self {
        Self::new(TimerConfig::with_period(period))
    }

    /// Wait until the next tick is due.
    ///
    /// Pends forever when the timer is disabled.
    pub async fn wait_for_tick(&mut self) -> TimerTick {
        let (next, period) = match (self.next_tick, self.period) {
            (Some(next), Some(period)) => (next, period),
            _ => return std::future::pending().await,
        };

        time::sleep_until(next).await;

        let now = Instant::now();
        self.tick_count += 1;

        let late_by = now.saturating_duration_since(next);
        let ticks_skipped = (late_by.as_nanos() / period.as_nanos()) as u64;
        if ticks_skipped > 0 {
            warn!(
                tick = self.tick_count,
                skipped = ticks_skipped,
                late_ms = late_by.as_millis() as u64,
                "session timer overrun, skipping ahead"
            );
            self.total_skipped += ticks_skipped;
        }

        // Always schedule from now, not from the missed deadline.
        self.next_tick = Some(now + period);

        trace!(tick = self.tick_count, "session timer fired");

        TimerTick {
            tick: self.tick_count,
            ticks_skipped,
        }
    }

    /// Whether the timer never fires.
    pub fn is_disabled(&self) -> bool {
        self.period.is_none()
    }

    /// Number of ticks fired so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Total ticks skipped because of overruns.
    pub fn total_skipped(&self) -> u64 {
        self.total_skipped
    }

    /// The tick period, or `None` if disabled.
    pub fn period(&self) -> Option<Duration> {
        self.period
    }
}
