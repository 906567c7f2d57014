//! Session lifecycle event payloads

use serde::Serialize;

/// Kind of timer event reported to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerEventKind {
    Start,
    Pause,
    Resume,
    Update,
    End,
}

impl TimerEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerEventKind::Start => "start",
            TimerEventKind::Pause => "pause",
            TimerEventKind::Resume => "resume",
            TimerEventKind::Update => "update",
            TimerEventKind::End => "end",
        }
    }

    /// Endpoint path relative to the API base URL.
    pub fn endpoint(&self) -> String {
        format!("timer/{}", self.as_str())
    }
}

/// Body of a `timer/*` POST.
#[derive(Debug, Clone, Serialize)]
pub struct TimerEvent {
    pub event: TimerEventKind,
    /// Epoch seconds at which the event was produced.
    pub timestamp: i64,
    /// Running seconds in the session when the event was produced.
    pub elapsed_time: u64,
    pub user_id: String,
}
