//! Work session engine
//!
//! `controller` is the pure state machine, `timers` the tick and
//! auto-screenshot deadlines, `backend` the task that talks to the API, and
//! `runner` ties the three together for the dashboard and tests.

pub mod backend;
pub mod controller;
pub mod runner;
pub mod timers;

pub use backend::upload_screenshot;
pub use controller::{format_elapsed, Command, ScreenshotTrigger, SessionController, SessionState};
pub use runner::{Notice, SessionRunner};
