//! Session state machine
//!
//! Pure: takes a `Command`, mutates session state, and returns the
//! `Effect`s the runtime must carry out (API events, captures, timer
//! changes). No IO and no clocks, so every transition is unit-testable.

use std::fmt;

use thiserror::Error;

use crate::models::TimerEventKind;

/// Lifecycle state of the work session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    Running,
    Paused,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Paused => "paused",
        };
        f.write_str(s)
    }
}

/// Inputs from the user interface and from the session timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Pause,
    Resume,
    End,
    /// One logical second of running time.
    Tick,
    /// Auto-screenshot interval elapsed.
    ScreenshotTick,
    /// User asked for a screenshot now.
    TakeScreenshot,
    ToggleAutoScreenshot(bool),
    /// End any session, disable auto-screenshots, drop credentials.
    Logout,
}

/// Why a screenshot is being taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenshotTrigger {
    Manual,
    Scheduled,
    SessionStart,
}

impl ScreenshotTrigger {
    /// Everything the user did not explicitly ask for counts as automatic.
    pub fn is_auto(&self) -> bool {
        !matches!(self, ScreenshotTrigger::Manual)
    }
}

/// Work the runtime performs after a transition, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Report a lifecycle event with the elapsed seconds at that moment.
    Emit {
        kind: TimerEventKind,
        elapsed: u64,
        epoch: u64,
    },
    Capture {
        trigger: ScreenshotTrigger,
        epoch: u64,
    },
    ArmTicker,
    DisarmTicker,
    ArmScreenshots,
    DisarmScreenshots,
    ClearCredentials,
}

pub type Effects = Vec<Effect>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("cannot {command:?} while session is {state}")]
    InvalidTransition {
        state: SessionState,
        command: Command,
    },
}

/// Which periodic timers should be running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TimerPlan {
    ticker: bool,
    screenshots: bool,
}

/// Owns session state, elapsed-time accounting, and the auto-screenshot flag.
#[derive(Debug, Clone)]
pub struct SessionController {
    state: SessionState,
    elapsed: u64,
    auto_screenshot: bool,
    update_interval: u64,
    /// Incremented on every Start; tags work belonging to one session.
    epoch: u64,
}

impl SessionController {
    /// `update_interval` is clamped to at least one second.
    pub fn new(update_interval: u64, auto_screenshot: bool) -> Self {
        Self {
            state: SessionState::Idle,
            elapsed: 0,
            auto_screenshot,
            update_interval: update_interval.max(1),
            epoch: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn auto_screenshot_enabled(&self) -> bool {
        self.auto_screenshot
    }

    pub fn is_screenshot_timer_active(&self) -> bool {
        self.plan().screenshots
    }

    /// Apply a command. Rejected commands leave the state untouched.
    pub fn handle(&mut self, command: Command) -> Result<Effects, SessionError> {
        let before = self.plan();
        let mut effects = Effects::new();

        match command {
            Command::Start => {
                self.require(command, &[SessionState::Idle])?;
                self.epoch += 1;
                self.elapsed = 0;
                self.state = SessionState::Running;
                effects.push(self.emit(TimerEventKind::Start));
                effects.push(self.capture(ScreenshotTrigger::SessionStart));
            }
            Command::Pause => {
                self.require(command, &[SessionState::Running])?;
                self.state = SessionState::Paused;
                effects.push(self.emit(TimerEventKind::Pause));
            }
            Command::Resume => {
                self.require(command, &[SessionState::Paused])?;
                self.state = SessionState::Running;
                effects.push(self.emit(TimerEventKind::Resume));
            }
            Command::End => {
                self.require(command, &[SessionState::Running, SessionState::Paused])?;
                self.end(&mut effects);
            }
            Command::Tick => {
                if self.state == SessionState::Running {
                    self.elapsed += 1;
                    if self.elapsed % self.update_interval == 0 {
                        effects.push(self.emit(TimerEventKind::Update));
                    }
                }
            }
            Command::ScreenshotTick => {
                if self.is_screenshot_timer_active() {
                    effects.push(self.capture(ScreenshotTrigger::Scheduled));
                }
            }
            Command::TakeScreenshot => {
                effects.push(self.capture(ScreenshotTrigger::Manual));
            }
            Command::ToggleAutoScreenshot(on) => {
                self.auto_screenshot = on;
            }
            Command::Logout => {
                if self.state != SessionState::Idle {
                    self.end(&mut effects);
                }
                self.auto_screenshot = false;
            }
        }

        let after = self.plan();
        if before.ticker != after.ticker {
            effects.push(if after.ticker {
                Effect::ArmTicker
            } else {
                Effect::DisarmTicker
            });
        }
        if before.screenshots != after.screenshots {
            effects.push(if after.screenshots {
                Effect::ArmScreenshots
            } else {
                Effect::DisarmScreenshots
            });
        }
        if command == Command::Logout {
            effects.push(Effect::ClearCredentials);
        }

        Ok(effects)
    }

    fn end(&mut self, effects: &mut Effects) {
        // Final event carries the total before the reset.
        effects.push(self.emit(TimerEventKind::End));
        self.state = SessionState::Idle;
        self.elapsed = 0;
    }

    fn require(&self, command: Command, allowed: &[SessionState]) -> Result<(), SessionError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                state: self.state,
                command,
            })
        }
    }

    fn plan(&self) -> TimerPlan {
        let running = self.state == SessionState::Running;
        TimerPlan {
            ticker: running,
            screenshots: running && self.auto_screenshot,
        }
    }

    fn emit(&self, kind: TimerEventKind) -> Effect {
        Effect::Emit {
            kind,
            elapsed: self.elapsed,
            epoch: self.epoch,
        }
    }

    fn capture(&self, trigger: ScreenshotTrigger) -> Effect {
        Effect::Capture {
            trigger,
            epoch: self.epoch,
        }
    }
}

/// Render seconds as zero-padded `HH:MM:SS`. Hours grow past two digits.
pub fn format_elapsed(secs: u64) -> String {
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
