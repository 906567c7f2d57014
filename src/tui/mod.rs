//! Terminal dashboard for a work session
//!
//! Presentation only: key presses become session commands on the runner.

mod app;
mod log_capture;
mod ui;

pub use app::run;
pub use log_capture::LogBuffer;
