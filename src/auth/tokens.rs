//! Credential record and storage backends

use std::fmt;

use anyhow::Result;

use crate::models::UserProfile;

/// Access/refresh token pair plus the user they belong to.
///
/// Both tokens live in one record so one can never be present without the
/// other.
#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserProfile,
}

impl Credentials {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        user: UserProfile,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            user,
        }
    }
}

// Tokens end up in tracing output via `{:?}`; keep them out.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("user_id", &self.user.id())
            .finish()
    }
}

/// Persistence backend for credentials.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<Credentials>>;
    fn save(&self, credentials: &Credentials) -> Result<()>;
    fn clear(&self) -> Result<()>;
}


#[cfg(test)]
#[derive(Default)]
pub(crate) struct MemoryTokenStore {
    slot: std::sync::Mutex<Option<Credentials>>,
}

#[cfg(test)]
impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<Credentials>> {
        Ok(self.slot.lock().unwrap().clone())
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        *self.slot.lock().unwrap() = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.slot.lock().unwrap() = None;
        Ok(())
    }
}
