//! Drives a `SessionController` against real timers and the API backend.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::backend::{Backend, BackendCommand, BackendResponse, ScreenshotError};
use super::controller::{Command, Effect, Effects, SessionController, SessionError, SessionState};
use super::timers::{SessionTimers, TimerFired};
use crate::api::{ApiClient, ApiError, ApiResponse};
use crate::capture::ScreenCapture;
use crate::config::SessionConfig;
use crate::models::TimerEvent;

/// Something the user should be told about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Info(String),
    Error(String),
    /// Token refresh failed; the session was ended and credentials dropped.
    SessionExpired,
}

/// One thing that woke the runner up.
#[derive(Debug)]
pub enum RunnerInput {
    Timer(TimerFired),
    Backend(BackendResponse),
}

pub struct SessionRunner {
    controller: SessionController,
    timers: SessionTimers,
    backend: Backend,
    client: Arc<ApiClient>,
    logout_requested: bool,
    /// Logout was forced by a failed refresh.
    expired: bool,
    logged_out: bool,
}

impl SessionRunner {
    /// Must be called inside a tokio runtime (spawns the backend task).
    pub fn new(
        client: Arc<ApiClient>,
        capture: Arc<dyn ScreenCapture>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            controller: SessionController::new(config.update_interval_secs, config.auto_screenshot),
            timers: SessionTimers::new(config.screenshot_interval()),
            backend: Backend::start(Arc::clone(&client), capture),
            client,
            logout_requested: false,
            expired: false,
            logged_out: false,
        }
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn screenshot_due_in(&self) -> Option<Duration> {
        self.timers.screenshot_due_in()
    }

    /// A logout was issued (by the user or after session expiry).
    pub fn logout_requested(&self) -> bool {
        self.logout_requested
    }

    /// Credentials have actually been cleared.
    #[cfg(test)]
    pub fn is_logged_out(&self) -> bool {
        self.logged_out
    }

    /// Apply a user or timer command and start its effects.
    pub fn dispatch(&mut self, command: Command) -> Result<(), SessionError> {
        let effects = self.controller.handle(command)?;
        tracing::debug!(?command, ?effects, "Session transition");
        self.apply(effects);
        Ok(())
    }

    fn apply(&mut self, effects: Effects) {
        for effect in effects {
            match effect {
                Effect::Emit {
                    kind,
                    elapsed,
                    epoch,
                } => {
                    let event = TimerEvent {
                        event: kind,
                        timestamp: Utc::now().timestamp(),
                        elapsed_time: elapsed,
                        user_id: self.client.auth().user().map(|u| u.id()).unwrap_or_default(),
                    };
                    self.backend.send(BackendCommand::PostEvent { event, epoch });
                }
                Effect::Capture { trigger, epoch } => {
                    self.backend
                        .send(BackendCommand::Screenshot { trigger, epoch });
                }
                Effect::ArmTicker => self.timers.arm_ticker(),
                Effect::DisarmTicker => self.timers.disarm_ticker(),
                Effect::ArmScreenshots => self.timers.arm_screenshots(),
                Effect::DisarmScreenshots => self.timers.disarm_screenshots(),
                Effect::ClearCredentials => {
                    self.logout_requested = true;
                    self.backend.send(BackendCommand::ClearCredentials);
                }
            }
        }
    }

    /// Wait for the next timer firing or backend response. Cancel-safe.
    pub async fn next_input(&mut self) -> RunnerInput {
        tokio::select! {
            fired = self.timers.next() => RunnerInput::Timer(fired),
            Some(response) = self.backend.recv() => RunnerInput::Backend(response),
        }
    }

    pub fn handle_input(&mut self, input: RunnerInput) -> Option<Notice> {
        match input {
            RunnerInput::Timer(TimerFired::Tick) => {
                self.timer_command(Command::Tick);
                None
            }
            RunnerInput::Timer(TimerFired::Screenshot) => {
                self.timer_command(Command::ScreenshotTick);
                None
            }
            RunnerInput::Backend(response) => self.handle_response(response),
        }
    }

    fn timer_command(&mut self, command: Command) {
        // Ticks are accepted in every state; an error here is a bug.
        if let Err(e) = self.dispatch(command) {
            tracing::error!("Timer command rejected: {}", e);
        }
    }

    fn handle_response(&mut self, response: BackendResponse) -> Option<Notice> {
        match response {
            BackendResponse::EventPosted {
                kind,
                epoch,
                result,
            } => {
                if matches!(result, Err(ApiError::Unauthorized)) {
                    return self.expire();
                }
                if self.is_stale(epoch) {
                    tracing::debug!(event = kind.as_str(), epoch, "Discarding result from ended session");
                    return None;
                }
                match result {
                    Ok(response) => log_posted(kind.as_str(), &response),
                    // Background reporting is best-effort; never interrupts the session.
                    Err(e) => tracing::warn!(event = kind.as_str(), "Failed to post timer event: {}", e),
                }
                None
            }
            BackendResponse::ScreenshotUploaded {
                trigger,
                epoch,
                result,
            } => {
                if matches!(&result, Err(e) if e.is_unauthorized()) {
                    return self.expire();
                }
                if trigger.is_auto() && self.is_stale(epoch) {
                    tracing::debug!(?trigger, epoch, "Discarding screenshot result from ended session");
                    return None;
                }
                screenshot_notice(trigger.is_auto(), result)
            }
            BackendResponse::LoggedOut => {
                self.logged_out = true;
                tracing::info!("Logged out");
                // The expiry notice stays on screen.
                (!self.expired).then(|| Notice::Info("Logged out".to_string()))
            }
        }
    }

    fn is_stale(&self, epoch: u64) -> bool {
        epoch != self.controller.epoch()
    }

    fn expire(&mut self) -> Option<Notice> {
        if self.logout_requested {
            return None;
        }
        tracing::warn!("Session expired, logging out");
        self.expired = true;
        if let Err(e) = self.dispatch(Command::Logout) {
            tracing::error!("Forced logout rejected: {}", e);
        }
        Some(Notice::SessionExpired)
    }

    /// End any running session and wait for queued events to be posted.
    pub async fn shutdown(&mut self) {
        if self.controller.state() != SessionState::Idle {
            if let Err(e) = self.dispatch(Command::End) {
                tracing::error!("Ending session on shutdown failed: {}", e);
            }
        }
        self.timers.disarm_all();
        self.backend.shutdown().await;
        while let Some(response) = self.backend.try_recv() {
            self.handle_response(response);
        }
    }
}

fn log_posted(event: &str, response: &ApiResponse) {
    if response.is_no_content() {
        tracing::info!(event, "Timer event posted (no content)");
    } else {
        tracing::info!(event, "Timer event posted");
    }
}

fn screenshot_notice(auto: bool, result: Result<ApiResponse, ScreenshotError>) -> Option<Notice> {
    match result {
        Ok(_) => {
            tracing::info!(auto, "Screenshot uploaded");
            (!auto).then(|| Notice::Info("Screenshot uploaded".to_string()))
        }
        Err(e) => {
            tracing::warn!(auto, "Screenshot failed: {}", e);
            (!auto).then(|| Notice::Error(format!("Screenshot failed: {}", e)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::ScriptedTransport;
    use crate::auth::AuthTokenManager;
    use crate::capture::SyntheticCapture;
    use crate::models::UserProfile;
    use crate::session::SessionState;
    use serde_json::json;

    fn runner(transport: Arc<ScriptedTransport>, auto_screenshot: bool) -> SessionRunner {
        let auth = Arc::new(AuthTokenManager::new());
        auth.set_credentials("at", "rt", UserProfile::new(json!({"id": "u-7"})));
        let client = Arc::new(ApiClient::new("http://tracker.test/", auth, transport).unwrap());
        let config = SessionConfig {
            screenshot_interval_secs: 30,
            update_interval_secs: 60,
            auto_screenshot,
        };
        SessionRunner::new(client, Arc::new(SyntheticCapture), &config)
    }

    fn timer_paths(transport: &ScriptedTransport) -> Vec<String> {
        transport
            .paths()
            .into_iter()
            .filter(|p| p.starts_with("timer/"))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_reports_events_in_order() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut runner = runner(transport.clone(), false);

        runner.dispatch(Command::Start).unwrap();
        while runner.controller().elapsed() < 65 {
            let input = runner.next_input().await;
            runner.handle_input(input);
        }
        runner.dispatch(Command::Pause).unwrap();
        runner.dispatch(Command::Resume).unwrap();
        runner.dispatch(Command::End).unwrap();
        runner.shutdown().await;

        assert_eq!(
            timer_paths(&transport),
            vec![
                "timer/start",
                "timer/update",
                "timer/pause",
                "timer/resume",
                "timer/end"
            ]
        );
        let requests = transport.requests();
        let update = requests
            .iter()
            .find(|r| r.path() == "timer/update")
            .unwrap();
        let body = update.json.as_ref().unwrap();
        assert_eq!(body["elapsed_time"], json!(60));
        assert_eq!(body["user_id"], json!("u-7"));

        let end = requests.iter().find(|r| r.path() == "timer/end").unwrap();
        assert_eq!(end.json.as_ref().unwrap()["elapsed_time"], json!(65));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_screenshots_while_running() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut runner = runner(transport.clone(), true);

        runner.dispatch(Command::Start).unwrap();
        assert_eq!(runner.screenshot_due_in(), Some(Duration::from_secs(30)));

        let mut scheduled = 0;
        while runner.controller().elapsed() < 61 {
            let input = runner.next_input().await;
            if matches!(input, RunnerInput::Timer(TimerFired::Screenshot)) {
                scheduled += 1;
            }
            assert_eq!(runner.handle_input(input), None);
        }
        assert_eq!(scheduled, 2);

        runner.dispatch(Command::Pause).unwrap();
        assert_eq!(runner.screenshot_due_in(), None);
        runner.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_screenshot_notice() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut runner = runner(transport.clone(), false);

        runner.dispatch(Command::TakeScreenshot).unwrap();
        let notice = loop {
            let input = runner.next_input().await;
            if let Some(notice) = runner.handle_input(input) {
                break notice;
            }
        };

        assert_eq!(notice, Notice::Info("Screenshot uploaded".to_string()));
        let requests = transport.requests();
        assert!(requests[0]
            .multipart_fields
            .contains(&("auto_generated".to_string(), "false".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_failure_is_silent() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_status(500, r#"{"message":"boom"}"#);
        let mut runner = runner(transport.clone(), false);

        runner.dispatch(Command::Start).unwrap();
        while runner.controller().elapsed() < 2 {
            let input = runner.next_input().await;
            if let Some(notice) = runner.handle_input(input) {
                panic!("unexpected notice: {notice:?}");
            }
        }
        assert_eq!(runner.controller().state(), SessionState::Running);
        runner.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_forces_logout_once() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_status(401, "");
        transport.push_status(401, "");
        let mut runner = runner(transport.clone(), true);

        runner.dispatch(Command::Start).unwrap();
        let mut notices = Vec::new();
        while !runner.is_logged_out() {
            let input = runner.next_input().await;
            notices.extend(runner.handle_input(input));
        }

        let expired = notices
            .iter()
            .filter(|n| **n == Notice::SessionExpired)
            .count();
        assert_eq!(expired, 1);
        assert!(runner.logout_requested());
        assert_eq!(runner.controller().state(), SessionState::Idle);
        assert!(!runner.controller().auto_screenshot_enabled());
        assert!(!runner.client().auth().is_authenticated());
        assert!(timer_paths(&transport).contains(&"timer/end".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_notice_is_last_notice() {
        let transport = Arc::new(ScriptedTransport::new());
        for _ in 0..4 {
            transport.push_status(401, "");
        }
        let mut runner = runner(transport.clone(), false);

        runner.dispatch(Command::Start).unwrap();
        let mut last = None;
        while !runner.is_logged_out() {
            let input = runner.next_input().await;
            if let Some(notice) = runner.handle_input(input) {
                last = Some(notice);
            }
        }

        assert_eq!(last, Some(Notice::SessionExpired));
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_logout_reports_logged_out() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut runner = runner(transport, false);

        runner.dispatch(Command::Logout).unwrap();
        let notice = loop {
            let input = runner.next_input().await;
            if let Some(notice) = runner.handle_input(input) {
                break notice;
            }
        };

        assert_eq!(notice, Notice::Info("Logged out".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_posts_end_before_clearing() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut runner = runner(transport.clone(), false);

        runner.dispatch(Command::Start).unwrap();
        runner.dispatch(Command::Logout).unwrap();
        runner.shutdown().await;

        assert!(runner.is_logged_out());
        let end = transport
            .requests()
            .into_iter()
            .find(|r| r.path() == "timer/end")
            .unwrap();
        assert_eq!(end.authorization.as_deref(), Some("Bearer at"));
        assert!(!runner.client().auth().is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_ends_running_session() {
        let transport = Arc::new(ScriptedTransport::new());
        let mut runner = runner(transport.clone(), false);

        runner.dispatch(Command::Start).unwrap();
        runner.shutdown().await;

        assert_eq!(runner.controller().state(), SessionState::Idle);
        assert_eq!(timer_paths(&transport), vec!["timer/start", "timer/end"]);
    }

    #[test]
    fn test_screenshot_notice_only_for_manual() {
        assert_eq!(screenshot_notice(true, Ok(ApiResponse::NoContent)), None);
        assert_eq!(
            screenshot_notice(true, Err(ScreenshotError::NotLoggedIn)),
            None
        );
        assert_eq!(
            screenshot_notice(false, Err(ScreenshotError::NotLoggedIn)),
            Some(Notice::Error("Screenshot failed: not logged in".to_string()))
        );
    }
}
