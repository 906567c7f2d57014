//! Data models for backend entities

mod envelope;
mod event;
mod user;

pub use envelope::*;
pub use event::*;
pub use user::*;
