//! Tick scheduling for the beatlobby lobby loop.
//!
//! The lobby polls at a short fixed interval (5 ms by default) and advances
//! its timers by the wall-clock time that actually elapsed since the
//! previous tick, so a late wake-up never loses time. Broadcasts that need
//! their own rate (the 20 Hz roster) sit on top as a [`Cadence`].
//!
//! # Integration
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = shutdown.cancelled() => break,
//!         info = scheduler.wait_for_tick() => {
//!             lobby.tick(info.dt, &mut sessions, &broadcaster)?;
//!             scheduler.finish_tick();
//!         }
//!     }
//! }
//! ```

use std::time::{Duration, Instant};

use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, trace, warn};

/// How the lobby loop is paced.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Polling interval between ticks.
    pub interval: Duration,
    /// A tick body running longer than this is logged as slow.
    pub slow_tick: Duration,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self::with_interval(Duration::from_millis(5))
    }
}

impl TickConfig {
    /// Smallest interval the scheduler accepts.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

    /// Polls every `interval`; a body taking longer than one interval is slow.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            slow_tick: interval,
        }
    }

    /// Raises an interval below [`MIN_INTERVAL`](Self::MIN_INTERVAL) to the
    /// minimum. Called by [`TickScheduler::new`].
    pub fn validated(mut self) -> Self {
        if self.interval < Self::MIN_INTERVAL {
            warn!(
                interval_us = self.interval.as_micros() as u64,
                "tick interval below minimum, clamping"
            );
            self.interval = Self::MIN_INTERVAL;
        }
        self
    }
}

/// One tick, as handed to the lobby.
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// Time since the previous tick (or since the scheduler was created).
    pub dt: Duration,
    /// The tick woke up more than one interval past its deadline.
    pub late: bool,
}

/// Counters kept across the life of a scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub ticks: u64,
    pub late_ticks: u64,
    pub slow_ticks: u64,
    /// Longest tick body seen so far.
    pub slowest: Duration,
}

/// Fixed-interval polling that reports the measured delta of each tick.
pub struct TickScheduler {
    config: TickConfig,
    next_tick: TokioInstant,
    last_tick: TokioInstant,
    body_started: Option<Instant>,
    stats: TickStats,
}

impl TickScheduler {
    /// The first tick fires one interval from now.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        let now = TokioInstant::now();
        debug!(
            interval_ms = config.interval.as_secs_f64() * 1000.0,
            "tick scheduler created"
        );
        Self {
            next_tick: now + config.interval,
            last_tick: now,
            config,
            body_started: None,
            stats: TickStats::default(),
        }
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self::new(TickConfig::with_interval(interval))
    }

    /// Sleeps until the next tick is due.
    ///
    /// After a late wake-up the following deadline is counted from now, not
    /// from the missed one. The lost time is already in `dt`, so there is
    /// no burst of catch-up ticks.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        time::sleep_until(self.next_tick).await;

        let now = TokioInstant::now();
        let dt = now.saturating_duration_since(self.last_tick);
        let late_by = now.saturating_duration_since(self.next_tick);
        let late = late_by > self.config.interval;

        self.last_tick = now;
        self.next_tick = now + self.config.interval;
        self.body_started = Some(Instant::now());

        self.stats.ticks += 1;
        if late {
            self.stats.late_ticks += 1;
            debug!(
                tick = self.stats.ticks,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "tick woke up late"
            );
        }
        trace!(tick = self.stats.ticks, dt_us = dt.as_micros() as u64, "tick");

        TickInfo {
            tick: self.stats.ticks,
            dt,
            late,
        }
    }

    /// Marks the end of the current tick body and returns how long it ran.
    /// Returns `None` if no tick is in progress.
    pub fn finish_tick(&mut self) -> Option<Duration> {
        let body = self.body_started.take()?.elapsed();
        if body > self.config.slow_tick {
            self.stats.slow_ticks += 1;
            warn!(
                tick = self.stats.ticks,
                body_ms = body.as_secs_f64() * 1000.0,
                "slow lobby tick"
            );
        }
        self.stats.slowest = self.stats.slowest.max(body);
        Some(body)
    }

    pub fn stats(&self) -> TickStats {
        self.stats
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }
}

/// Fires at a fixed rate regardless of how often it is advanced.
///
/// Each call to [`advance`](Self::advance) adds the tick's `dt`; once the
/// accumulated time reaches the period the cadence fires and starts over
/// from zero.
#[derive(Debug, Clone)]
pub struct Cadence {
    period: Duration,
    accumulated: Duration,
}

impl Cadence {
    /// A cadence firing every `period`.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            accumulated: Duration::ZERO,
        }
    }

    /// A cadence firing `hz` times per second. `hz == 0` is treated as 1.
    pub fn per_second(hz: u32) -> Self {
        Self::new(Duration::from_secs_f64(1.0 / hz.max(1) as f64))
    }

    /// Adds `dt`; returns `true` if the cadence fired.
    pub fn advance(&mut self, dt: Duration) -> bool {
        self.accumulated += dt;
        if self.accumulated >= self.period {
            self.accumulated = Duration::ZERO;
            true
        } else {
            false
        }
    }

    /// Discards accumulated time.
    pub fn reset(&mut self) {
        self.accumulated = Duration::ZERO;
    }

    /// The firing period.
    pub fn period(&self) -> Duration {
        self.period
    }
}
