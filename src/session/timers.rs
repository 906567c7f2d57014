//! Periodic session timers
//!
//! Two independent deadlines: a one-second ticker that advances elapsed
//! time, and the auto-screenshot interval. Both are plain `Instant`s so
//! arming and disarming is synchronous and `next()` can sit in a
//! `tokio::select!` without losing a firing when another branch wins.

use std::time::Duration;

use tokio::time::{sleep_until, Instant};

/// Which timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerFired {
    Tick,
    Screenshot,
}

pub struct SessionTimers {
    tick_period: Duration,
    screenshot_period: Duration,
    next_tick: Option<Instant>,
    next_screenshot: Option<Instant>,
}

impl SessionTimers {
    pub fn new(screenshot_period: Duration) -> Self {
        Self::with_tick_period(Duration::from_secs(1), screenshot_period)
    }

    pub fn with_tick_period(tick_period: Duration, screenshot_period: Duration) -> Self {
        Self {
            tick_period,
            screenshot_period,
            next_tick: None,
            next_screenshot: None,
        }
    }

    pub fn arm_ticker(&mut self) {
        self.next_tick = Some(Instant::now() + self.tick_period);
    }

    pub fn disarm_ticker(&mut self) {
        self.next_tick = None;
    }

    pub fn arm_screenshots(&mut self) {
        self.next_screenshot = Some(Instant::now() + self.screenshot_period);
    }

    pub fn disarm_screenshots(&mut self) {
        self.next_screenshot = None;
    }

    pub fn disarm_all(&mut self) {
        self.disarm_ticker();
        self.disarm_screenshots();
    }

    #[cfg(test)]
    pub fn is_ticker_armed(&self) -> bool {
        self.next_tick.is_some()
    }

    #[cfg(test)]
    pub fn is_screenshot_armed(&self) -> bool {
        self.next_screenshot.is_some()
    }

    /// Time until the next auto-screenshot, if armed.
    pub fn screenshot_due_in(&self) -> Option<Duration> {
        self.next_screenshot
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Wait for the next firing. Never resolves while nothing is armed.
    ///
    /// Cancel-safe: deadlines only move after a sleep has completed, with
    /// no await in between.
    pub async fn next(&mut self) -> TimerFired {
        let tick = self.next_tick;
        let shot = self.next_screenshot;

        // Ticks win ties so elapsed time is current when a capture is taken.
        let fired = tokio::select! {
            biased;
            _ = sleep_opt(tick) => TimerFired::Tick,
            _ = sleep_opt(shot) => TimerFired::Screenshot,
        };

        let now = Instant::now();
        match fired {
            TimerFired::Tick => {
                self.next_tick = tick.map(|at| advance(at, self.tick_period, now));
            }
            TimerFired::Screenshot => {
                self.next_screenshot = shot.map(|at| advance(at, self.screenshot_period, now));
            }
        }
        fired
    }
}

async fn sleep_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Next deadline after `at`. Periods that were missed entirely are skipped
/// rather than fired in a burst.
fn advance(at: Instant, period: Duration, now: Instant) -> Instant {
    let mut next = at + period;
    while next <= now {
        next += period;
    }
    next
}
