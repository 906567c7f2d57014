//! Async backend: carries session effects out against the API.
//!
//! Uses an mpsc channel pair. The runner sends `BackendCommand` values, and a
//! background tokio task executes them and sends `BackendResponse` values back.
//!
//! Timer events go out strictly one at a time in submission order, so the
//! server never sees `end` before `start`. Screenshots are independent and
//! run on their own tasks. Clearing credentials is queued behind every
//! pending event so a final `timer/end` still goes out authenticated.

use std::sync::Arc;

use chrono::{DateTime, Local};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::controller::ScreenshotTrigger;
use crate::api::{ApiClient, ApiError, ApiResponse, FilePart, MultipartForm};
use crate::capture::{CaptureError, ScreenCapture};
use crate::models::{TimerEvent, TimerEventKind};

pub const SCREENSHOT_ENDPOINT: &str = "screenshot/upload";

/// Commands sent from the runner to the async backend.
#[derive(Debug)]
pub enum BackendCommand {
    PostEvent { event: TimerEvent, epoch: u64 },
    Screenshot { trigger: ScreenshotTrigger, epoch: u64 },
    ClearCredentials,
}

/// Responses from the async backend to the runner.
#[derive(Debug)]
pub enum BackendResponse {
    EventPosted {
        kind: TimerEventKind,
        epoch: u64,
        result: Result<ApiResponse, ApiError>,
    },
    ScreenshotUploaded {
        trigger: ScreenshotTrigger,
        epoch: u64,
        result: Result<ApiResponse, ScreenshotError>,
    },
    LoggedOut,
}

#[derive(Debug, Error)]
pub enum ScreenshotError {
    #[error("not logged in")]
    NotLoggedIn,
    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl ScreenshotError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ScreenshotError::Api(ApiError::Unauthorized))
    }
}

/// Handle for interacting with the backend from the runner side.
pub struct Backend {
    cmd_tx: Option<mpsc::UnboundedSender<BackendCommand>>,
    resp_rx: mpsc::UnboundedReceiver<BackendResponse>,
    task: Option<JoinHandle<()>>,
}

impl Backend {
    /// Start the backend. Spawns a tokio task that processes commands.
    pub fn start(client: Arc<ApiClient>, capture: Arc<dyn ScreenCapture>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (resp_tx, resp_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(backend_loop(client, capture, cmd_rx, resp_tx));

        Self {
            cmd_tx: Some(cmd_tx),
            resp_rx,
            task: Some(task),
        }
    }

    /// Send a command to the backend (non-blocking).
    pub fn send(&self, cmd: BackendCommand) {
        let sent = self
            .cmd_tx
            .as_ref()
            .map(|tx| tx.send(cmd).is_ok())
            .unwrap_or(false);
        if !sent {
            tracing::error!("Backend channel closed -- command dropped");
        }
    }

    /// Receive a response from the backend.
    ///
    /// Returns `None` once the backend has shut down and every response
    /// has been drained. Cancel-safe.
    pub async fn recv(&mut self) -> Option<BackendResponse> {
        self.resp_rx.recv().await
    }

    /// Next response if one is already queued.
    pub fn try_recv(&mut self) -> Option<BackendResponse> {
        self.resp_rx.try_recv().ok()
    }

    /// Stop accepting commands and wait for queued events to be posted.
    ///
    /// Screenshot uploads still in flight are not awaited.
    pub async fn shutdown(&mut self) {
        self.cmd_tx = None;
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("Backend task failed: {}", e);
            }
        }
    }
}

async fn backend_loop(
    client: Arc<ApiClient>,
    capture: Arc<dyn ScreenCapture>,
    mut cmd_rx: mpsc::UnboundedReceiver<BackendCommand>,
    resp_tx: mpsc::UnboundedSender<BackendResponse>,
) {
    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            BackendCommand::PostEvent { event, epoch } => {
                let kind = event.event;
                let result = post_event(&client, &event).await;
                let _ = resp_tx.send(BackendResponse::EventPosted {
                    kind,
                    epoch,
                    result,
                });
            }
            BackendCommand::Screenshot { trigger, epoch } => {
                let client = Arc::clone(&client);
                let capture = Arc::clone(&capture);
                let resp_tx = resp_tx.clone();

                // Capture can take seconds; keep it off the event queue.
                tokio::spawn(async move {
                    let result = upload_screenshot(&client, capture, trigger, Local::now()).await;
                    let _ = resp_tx.send(BackendResponse::ScreenshotUploaded {
                        trigger,
                        epoch,
                        result,
                    });
                });
            }
            BackendCommand::ClearCredentials => {
                client.auth().clear_credentials();
                let _ = resp_tx.send(BackendResponse::LoggedOut);
            }
        }
    }
    tracing::debug!("Backend loop exited");
}

async fn post_event(client: &ApiClient, event: &TimerEvent) -> Result<ApiResponse, ApiError> {
    let body = serde_json::to_value(event).map_err(|e| ApiError::InvalidBody(e.to_string()))?;
    client.post(&event.event.endpoint(), Some(body)).await
}

/// Capture the screen and upload it as `multipart/form-data`.
pub async fn upload_screenshot(
    client: &ApiClient,
    capture: Arc<dyn ScreenCapture>,
    trigger: ScreenshotTrigger,
    taken_at: DateTime<Local>,
) -> Result<ApiResponse, ScreenshotError> {
    let user = client.auth().user().ok_or(ScreenshotError::NotLoggedIn)?;

    let bytes = tokio::task::spawn_blocking(move || capture.capture())
        .await
        .map_err(|e| CaptureError::Spawn(e.to_string()))??;

    let form = screenshot_form(bytes, &user.id(), trigger, taken_at);
    tracing::info!(?trigger, "Uploading screenshot");
    client
        .upload(SCREENSHOT_ENDPOINT, form)
        .await
        .map_err(ScreenshotError::from)
}

fn screenshot_form(
    bytes: Vec<u8>,
    user_id: &str,
    trigger: ScreenshotTrigger,
    taken_at: DateTime<Local>,
) -> MultipartForm {
    MultipartForm::new()
        .file(FilePart {
            field: "screenshot".to_string(),
            file_name: format!("screenshot_{}.png", taken_at.format("%Y%m%d-%H%M%S")),
            mime: "image/png".to_string(),
            bytes,
        })
        .text("timestamp", taken_at.timestamp().to_string())
        .text("user_id", user_id)
        .text("auto_generated", trigger.is_auto().to_string())
}
