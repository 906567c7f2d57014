//! Dashboard state and main event loop

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{Event, EventStream, KeyCode, KeyEventKind};
use futures::{FutureExt, StreamExt};
use ratatui::DefaultTerminal;

use super::log_capture::LogBuffer;
use super::ui::{self, DashboardView};
use crate::auth::session::display_name;
use crate::session::{Command, Notice, SessionController, SessionRunner, SessionState};

/// Redraw period. The clock only changes once a second.
const FRAME_DURATION_MS: u64 = 250;

/// What a key press asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    PauseOrResume,
    End,
    Screenshot,
    ToggleAutoScreenshot,
    Logout,
    Quit,
}

impl Action {
    pub fn from_key(code: KeyCode) -> Option<Self> {
        let action = match code {
            KeyCode::Char('s') => Action::Start,
            KeyCode::Char('p') => Action::PauseOrResume,
            KeyCode::Char('e') => Action::End,
            KeyCode::Char('c') => Action::Screenshot,
            KeyCode::Char('a') => Action::ToggleAutoScreenshot,
            KeyCode::Char('l') => Action::Logout,
            KeyCode::Char('q') | KeyCode::Esc => Action::Quit,
            _ => return None,
        };
        Some(action)
    }

    /// Session command for this action in the current state. `Quit` has none.
    pub fn command(self, session: &SessionController) -> Option<Command> {
        let command = match self {
            Action::Start => Command::Start,
            Action::PauseOrResume => match session.state() {
                SessionState::Paused => Command::Resume,
                _ => Command::Pause,
            },
            Action::End => Command::End,
            Action::Screenshot => Command::TakeScreenshot,
            Action::ToggleAutoScreenshot => {
                Command::ToggleAutoScreenshot(!session.auto_screenshot_enabled())
            }
            Action::Logout => Command::Logout,
            Action::Quit => return None,
        };
        Some(command)
    }
}

/// Dashboard state that is not owned by the session runner.
pub struct App {
    pub should_exit: bool,
    pub user_name: String,
    /// Last notice and whether it is an error
    pub notice: Option<(String, bool)>,
    pub logs: LogBuffer,
}

impl App {
    pub fn new(user_name: String, logs: LogBuffer) -> Self {
        Self {
            should_exit: false,
            user_name,
            notice: None,
            logs,
        }
    }

    pub fn handle_action(&mut self, action: Action, runner: &mut SessionRunner) {
        if action == Action::Quit {
            self.should_exit = true;
            return;
        }
        if runner.logout_requested() {
            self.set_notice("Logged out. Press q to quit.", true);
            return;
        }
        let Some(command) = action.command(runner.controller()) else {
            return;
        };
        match runner.dispatch(command) {
            Ok(()) => {
                self.notice = None;
                if command == Command::Logout {
                    self.should_exit = true;
                }
            }
            Err(e) => self.set_notice(e.to_string(), true),
        }
    }

    pub fn show(&mut self, notice: Notice) {
        match notice {
            Notice::Info(msg) => self.set_notice(msg, false),
            Notice::Error(msg) => self.set_notice(msg, true),
            Notice::SessionExpired => self.set_notice(
                "Session expired. Run 'worklog login' to sign in again. Press q to quit.",
                true,
            ),
        }
    }

    fn set_notice(&mut self, msg: impl Into<String>, is_error: bool) {
        self.notice = Some((msg.into(), is_error));
    }

    fn view<'a>(&'a self, runner: &SessionRunner) -> DashboardView<'a> {
        let session = runner.controller();
        DashboardView {
            user_name: &self.user_name,
            elapsed: session.elapsed(),
            state: session.state(),
            auto_screenshot: session.auto_screenshot_enabled(),
            screenshot_due_in: runner.screenshot_due_in(),
            notice: self.notice.as_ref().map(|(m, e)| (m.as_str(), *e)),
            logs: &self.logs,
        }
    }
}

/// Run the dashboard with panic-safe terminal restore.
///
/// Any running session is ended and queued events are flushed before
/// returning.
pub async fn run(mut runner: SessionRunner, logs: LogBuffer) -> Result<()> {
    let user_name = runner
        .client()
        .auth()
        .user()
        .map(|u| display_name(&u))
        .unwrap_or_else(|| "User".to_string());
    let mut app = App::new(user_name, logs);

    let mut terminal = ratatui::init();
    let result = AssertUnwindSafe(run_app(&mut terminal, &mut app, &mut runner))
        .catch_unwind()
        .await;
    ratatui::restore();

    runner.shutdown().await;

    match result {
        Ok(r) => r,
        Err(e) => std::panic::resume_unwind(e),
    }
}

async fn run_app(
    terminal: &mut DefaultTerminal,
    app: &mut App,
    runner: &mut SessionRunner,
) -> Result<()> {
    let mut events = EventStream::new();
    let mut redraw = tokio::time::interval(Duration::from_millis(FRAME_DURATION_MS));

    tracing::info!("Dashboard started");

    while !app.should_exit {
        terminal.draw(|frame| ui::render(frame, &app.view(runner)))?;

        tokio::select! {
            _ = redraw.tick() => {}
            event = events.next() => match event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    if let Some(action) = Action::from_key(key.code) {
                        app.handle_action(action, runner);
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => app.should_exit = true,
            },
            input = runner.next_input() => {
                if let Some(notice) = runner.handle_input(input) {
                    app.show(notice);
                }
            }
        }
    }

    Ok(())
}
