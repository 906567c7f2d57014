//! API client module for the time-tracking backend
//!
//! Layered as transport (wire calls, timeouts, transient retries) under the
//! authenticated `ApiClient` facade (bearer headers, refresh-on-401).

pub mod client;
mod error;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ApiClient, ApiResponse};
pub use error::ApiError;
#[cfg(test)]
pub use error::{TransportError, TransportErrorKind};
pub use transport::{FilePart, HttpRequest, MultipartForm, Transport, TransportSettings};
