//! Authentication module
//!
//! Password login against the backend, credential ownership, and the
//! refresh-token protocol used by the API client on 401.

pub mod manager;
pub mod session;
pub mod tokens;

pub use manager::{AuthTokenManager, RefreshCallback, RefreshedTokens};
pub use session::{login, logout, refresh_callback, status};
pub use tokens::{Credentials, TokenStore};

/// Login endpoint, relative to the API base URL.
pub const LOGIN_ENDPOINT: &str = "auth/login";
/// Refresh-token exchange endpoint, relative to the API base URL.
pub const REFRESH_ENDPOINT: &str = "auth/refresh-token";
