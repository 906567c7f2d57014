//! Token lifecycle: current credentials, auth headers, refresh protocol
//!
//! The manager never talks to the token endpoint itself. The embedding
//! application registers a `RefreshCallback` that performs the exchange;
//! the manager only decides when to call it and what to do with the result.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use thiserror::Error;
use tokio::sync::Mutex;

use super::tokens::{Credentials, TokenStore};
use crate::models::UserProfile;

/// Result of a successful refresh-token exchange.
#[derive(Debug, Clone)]
pub struct RefreshedTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Updated profile, if the endpoint returned one.
    pub user: Option<UserProfile>,
}

/// Performs the refresh-token exchange. Receives the current refresh token.
pub type RefreshCallback =
    Arc<dyn Fn(String) -> BoxFuture<'static, anyhow::Result<RefreshedTokens>> + Send + Sync>;

/// Why a refresh attempt did not produce new credentials.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("no refresh token stored")]
    NoRefreshToken,
    #[error("no refresh callback registered")]
    NoCallback,
    #[error("refresh callback failed: {0}")]
    CallbackFailed(String),
    #[error("refresh returned an empty token pair")]
    EmptyTokens,
    #[error("credentials were cleared while the refresh was in flight")]
    Superseded,
}

/// Single owner of the credential record.
pub struct AuthTokenManager {
    credentials: RwLock<Option<Credentials>>,
    refresh_callback: RwLock<Option<RefreshCallback>>,
    /// Held for the duration of a refresh. Header building waits on it.
    refresh_gate: Mutex<()>,
    store: Option<Arc<dyn TokenStore>>,
}

impl Default for AuthTokenManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthTokenManager {
    /// Manager with no credentials and no persistence.
    pub fn new() -> Self {
        Self {
            credentials: RwLock::new(None),
            refresh_callback: RwLock::new(None),
            refresh_gate: Mutex::new(()),
            store: None,
        }
    }

    /// Manager seeded from (and mirrored to) `store`.
    pub fn with_store(store: Arc<dyn TokenStore>) -> Self {
        let initial = match store.load() {
            Ok(creds) => creds,
            Err(e) => {
                tracing::warn!("Failed to load stored credentials: {:#}", e);
                None
            }
        };
        Self {
            credentials: RwLock::new(initial),
            refresh_callback: RwLock::new(None),
            refresh_gate: Mutex::new(()),
            store: Some(store),
        }
    }

    pub fn set_refresh_callback(&self, callback: RefreshCallback) {
        *self
            .refresh_callback
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(callback);
    }

    /// Replace the current credentials.
    pub fn set_credentials(
        &self,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        user: UserProfile,
    ) {
        let creds = Credentials::new(access_token, refresh_token, user);
        let mut slot = self.write();
        self.persist(&creds);
        *slot = Some(creds);
    }

    /// Drop the current credentials. Safe to call when already empty.
    pub fn clear_credentials(&self) {
        // Store is mirrored under the write guard so a concurrent refresh
        // cannot persist tokens after this clear.
        let mut slot = self.write();
        let had = slot.take().is_some();
        if let Some(store) = &self.store {
            if let Err(e) = store.clear() {
                tracing::warn!("Failed to clear stored credentials: {:#}", e);
            }
        }
        drop(slot);
        if had {
            tracing::debug!("Credentials cleared");
        }
    }

    #[cfg(test)]
    pub fn credentials(&self) -> Option<Credentials> {
        self.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().is_some()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.read().as_ref().map(|c| c.user.clone())
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().as_ref().map(|c| c.access_token.clone())
    }

    #[cfg(test)]
    pub fn is_refreshing(&self) -> bool {
        self.refresh_gate.try_lock().is_err()
    }

    /// Bearer header plus JSON content type unless `exclude_content_type`
    /// (multipart bodies set their own boundary header).
    ///
    /// Waits for an in-flight refresh so the header carries the new token.
    pub async fn build_auth_headers(&self, exclude_content_type: bool) -> HeaderMap {
        drop(self.refresh_gate.lock().await);

        let mut headers = HeaderMap::new();
        if let Some(token) = self.access_token() {
            match HeaderValue::from_str(&format!("Bearer {}", token)) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => tracing::warn!("Access token contains invalid header characters"),
            }
        }
        if !exclude_content_type {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        headers
    }

    /// Exchange the stored refresh token for a new pair.
    ///
    /// Returns false (and logs why) when there is no refresh token, no
    /// callback, or the callback fails in any way. Never panics.
    pub async fn attempt_refresh(&self) -> bool {
        let _gate = self.refresh_gate.lock().await;
        log_outcome(self.refresh_locked().await)
    }

    /// Refresh in response to a 401 on a request sent with `rejected`.
    ///
    /// Concurrent callers rejected with the same token queue on the gate; the
    /// first one refreshes, the rest see the rotated token and return true
    /// without a second exchange.
    pub async fn refresh_after_rejection(&self, rejected: Option<&str>) -> bool {
        let _gate = self.refresh_gate.lock().await;
        if let Some(current) = self.access_token() {
            if Some(current.as_str()) != rejected {
                tracing::debug!("Access token already rotated by a concurrent refresh");
                return true;
            }
        }
        log_outcome(self.refresh_locked().await)
    }

    async fn refresh_locked(&self) -> Result<(), RefreshError> {
        let refresh_token = self
            .read()
            .as_ref()
            .map(|c| c.refresh_token.clone())
            .ok_or(RefreshError::NoRefreshToken)?;
        let callback = self
            .refresh_callback
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(RefreshError::NoCallback)?;

        tracing::info!("Refreshing access token...");

        let tokens = match AssertUnwindSafe(callback(refresh_token.clone()))
            .catch_unwind()
            .await
        {
            Ok(Ok(tokens)) => tokens,
            Ok(Err(e)) => return Err(RefreshError::CallbackFailed(format!("{:#}", e))),
            Err(_) => return Err(RefreshError::CallbackFailed("callback panicked".to_string())),
        };

        if tokens.access_token.is_empty() || tokens.refresh_token.is_empty() {
            return Err(RefreshError::EmptyTokens);
        }

        // Compare and replace under one guard: a logout landing between the
        // check and the write must not be undone.
        let mut slot = self.write();
        let previous_user = match slot.as_ref() {
            Some(c) if c.refresh_token == refresh_token => c.user.clone(),
            _ => return Err(RefreshError::Superseded),
        };
        let creds = Credentials::new(
            tokens.access_token,
            tokens.refresh_token,
            tokens.user.unwrap_or(previous_user),
        );
        self.persist(&creds);
        *slot = Some(creds);
        Ok(())
    }

    fn persist(&self, creds: &Credentials) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(creds) {
                tracing::warn!("Failed to persist credentials: {:#}", e);
            }
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<Credentials>> {
        self.credentials.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<Credentials>> {
        self.credentials.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn log_outcome(result: Result<(), RefreshError>) -> bool {
    match result {
        Ok(()) => {
            tracing::info!("Token refreshed");
            true
        }
        Err(e) => {
            tracing::warn!("Token refresh failed: {}", e);
            false
        }
    }
}
