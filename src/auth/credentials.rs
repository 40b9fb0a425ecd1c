//! Credential model and persistence
//!
//! Tokens go to a [`SecretStore`]; the expiry goes to the plaintext
//! [`Settings`] file.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::settings::Settings;
use super::store::{SecretKey, SecretStore};

/// OAuth credential: both tokens plus the access-token expiry
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Credential {
    /// Create a credential expiring `expires_in_secs` from now.
    ///
    /// Lifetimes past the representable range saturate at the latest (or,
    /// when negative, the earliest) representable instant.
    pub fn new(access_token: String, refresh_token: String, expires_in_secs: i64) -> Self {
        let expires_at = chrono::Duration::try_seconds(expires_in_secs)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .unwrap_or(if expires_in_secs < 0 {
                DateTime::<Utc>::MIN_UTC
            } else {
                DateTime::<Utc>::MAX_UTC
            });

        Self {
            access_token,
            refresh_token,
            expires_at,
        }
    }

    /// Create a credential from a lifetime reported by the server.
    ///
    /// Returns `None` when the lifetime is negative or does not fit in a
    /// timestamp.
    pub fn issued(access_token: String, refresh_token: String, expires_in_secs: i64) -> Option<Self> {
        if expires_in_secs < 0 {
            return None;
        }
        let lifetime = chrono::Duration::try_seconds(expires_in_secs)?;
        let expires_at = Utc::now().checked_add_signed(lifetime)?;

        Some(Self {
            access_token,
            refresh_token,
            expires_at,
        })
    }

    pub fn refresh_state(&self, refresh_window: chrono::Duration) -> RefreshState {
        RefreshState::compute(Some(self.expires_at), Utc::now(), refresh_window)
    }
}

/// Where the stored tokens are in their lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    NoTokens,
    ValidTokens,
    RefreshTokens,
    ExpiredTokens,
}

impl RefreshState {
    /// Classify an expiry relative to `now`.
    ///
    /// Tokens inside the refresh window (`expires_at - refresh_window`) should
    /// be refreshed; tokens past `expires_at` can only be replaced by signing in.
    /// A window reaching back past the earliest representable instant covers
    /// the whole lifetime.
    pub fn compute(
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        refresh_window: chrono::Duration,
    ) -> Self {
        match expires_at {
            None => RefreshState::NoTokens,
            Some(expires) if now >= expires => RefreshState::ExpiredTokens,
            Some(expires) => match expires.checked_sub_signed(refresh_window) {
                Some(refresh_from) if now < refresh_from => RefreshState::ValidTokens,
                _ => RefreshState::RefreshTokens,
            },
        }
    }
}

/// Persistent home of the credential
#[derive(Clone)]
pub struct CredentialStore {
    secrets: Arc<dyn SecretStore>,
    settings: Settings,
}

impl CredentialStore {
    pub fn new(secrets: Arc<dyn SecretStore>, settings: Settings) -> Self {
        Self { secrets, settings }
    }

    pub fn secrets(&self) -> &Arc<dyn SecretStore> {
        &self.secrets
    }

    /// Persist all three parts of the credential.
    ///
    /// Both tokens are written or neither is: if the second write fails the
    /// first one is rolled back.
    pub fn save(&self, credential: &Credential) -> bool {
        if !self.secrets.save(SecretKey::AccessToken, credential.access_token.as_bytes()) {
            tracing::warn!("Failed to persist access token");
            return false;
        }

        if !self.secrets.save(SecretKey::RefreshToken, credential.refresh_token.as_bytes()) {
            tracing::warn!("Failed to persist refresh token, rolling back access token");
            self.secrets.delete(SecretKey::AccessToken);
            return false;
        }

        if let Err(e) = self.settings.set_expires_at(credential.expires_at) {
            tracing::warn!("Failed to persist token expiry: {}", e);
            return false;
        }

        tracing::debug!(expires_at = %credential.expires_at, "Credential persisted");
        true
    }

    /// Read the stored credential; partial state counts as no credential
    pub fn load(&self) -> Option<Credential> {
        let access = self.load_string(SecretKey::AccessToken);
        let refresh = self.load_string(SecretKey::RefreshToken);
        let expires_at = match self.settings.expires_at() {
            Ok(expires_at) => expires_at,
            Err(e) => {
                tracing::warn!("Failed to read token expiry: {}", e);
                None
            }
        };

        match (access, refresh, expires_at) {
            (Some(access_token), Some(refresh_token), Some(expires_at)) => Some(Credential {
                access_token,
                refresh_token,
                expires_at,
            }),
            (None, None, _) => None,
            (access, refresh, expires) => {
                tracing::warn!(
                    has_access = access.is_some(),
                    has_refresh = refresh.is_some(),
                    has_expiry = expires.is_some(),
                    "Ignoring incomplete stored credential"
                );
                None
            }
        }
    }

    /// Remove the tokens and the expiry
    pub fn clear(&self) -> bool {
        let secrets_cleared = self.secrets.clear_all();
        if !secrets_cleared {
            tracing::warn!("Failed to clear stored tokens");
        }

        let expiry_cleared = match self.settings.clear_expires_at() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to clear token expiry: {}", e);
                false
            }
        };

        secrets_cleared && expiry_cleared
    }

    fn load_string(&self, key: SecretKey) -> Option<String> {
        let bytes = self.secrets.load(key)?;
        match String::from_utf8(bytes) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(key = key.as_str(), "Stored secret is not valid UTF-8");
                None
            }
        }
    }
}
