//! SessionManager - owns the OAuth flows and the token lifecycle
//!
//! Three things can produce a credential: an authorization-code exchange, a
//! device-code exchange, and a refresh. Every successful one is written to the
//! [`CredentialStore`] first and then mirrored in memory. Sign-ins (never
//! refreshes) are announced on an [`AccountEvent`] channel after the write.
//!
//! Every sign-in and sign-out starts a new session generation. A request
//! that was sent under an older generation has its credential dropped, so a
//! slow refresh or device poll can never bring back a signed-out account.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tokio::sync::{broadcast, watch, Mutex};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::Config;
use crate::error::{AuthError, RefreshError};
use crate::Result;
use super::credentials::{Credential, CredentialStore, RefreshState};
use super::device::DevicePoll;
use super::oauth::{
    decode_body, AuthorizationCodeRequest, DeviceCode, DeviceCodeRequest, DeviceTokenRequest,
    RefreshRequest, RevokeRequest, TokenResponse, AUTHORIZE_PATH, DEVICE_CODE_PATH,
    DEVICE_TOKEN_PATH, REVOKE_PATH, TOKEN_PATH,
};
use super::settings::Settings;
use super::store::KeyringStore;

const EVENT_CAPACITY: usize = 16;

/// Account status changes observers can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountEvent {
    SignedIn,
    SignedOut,
}

/// What produced a credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    SignIn,
    Refresh,
}

struct Inner {
    config: Config,
    http_client: Client,
    store: CredentialStore,
    cache: RwLock<Option<Credential>>,
    generation: AtomicU64,
    /// Held for the whole refresh round trip so one refresh token is spent once
    refresh_lock: Mutex<()>,
    events: broadcast::Sender<AccountEvent>,
}

/// OAuth session manager
///
/// Cloning is cheap and every clone shares the same token cache.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Create a manager, restoring any credential already in `store`
    pub fn new(config: Config, store: CredentialStore) -> Self {
        let http_client = Client::builder()
            .user_agent(concat!("marquee/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self::with_client(config, store, http_client)
    }

    /// Create with an explicit HTTP client
    pub fn with_client(config: Config, store: CredentialStore, http_client: Client) -> Self {
        let cached = store.load();
        if cached.is_some() {
            tracing::debug!("Restored stored credential");
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                config,
                http_client,
                store,
                cache: RwLock::new(cached),
                generation: AtomicU64::new(0),
                refresh_lock: Mutex::new(()),
                events,
            }),
        }
    }

    /// Create a manager backed by the OS keychain and the configured settings file
    pub fn from_config(config: Config) -> Self {
        let secrets = Arc::new(KeyringStore::new(config.keyring_service.clone()));
        let store = CredentialStore::new(secrets, Settings::new(config.settings_file()));
        Self::new(config, store)
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn store(&self) -> &CredentialStore {
        &self.inner.store
    }

    /// Subscribe to sign-in / sign-out notifications
    pub fn subscribe(&self) -> broadcast::Receiver<AccountEvent> {
        self.inner.events.subscribe()
    }

    pub fn credential(&self) -> Option<Credential> {
        self.inner.cache.read().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.cache.read().as_ref().map(|c| c.access_token.clone())
    }

    pub fn is_signed_in(&self) -> bool {
        self.inner.cache.read().is_some()
    }

    pub fn refresh_state(&self) -> RefreshState {
        let expires_at = self.inner.cache.read().as_ref().map(|c| c.expires_at);
        RefreshState::compute(expires_at, chrono::Utc::now(), self.inner.config.refresh_window())
    }

    /// Build the browser URL that starts the authorization-code flow
    pub fn authorize_url(&self, state: &str) -> Result<Url> {
        let config = &self.inner.config;
        let mut url = Url::parse(&format!("{}/", config.site_url.trim_end_matches('/')))?
            .join(AUTHORIZE_PATH)?;

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &config.client_id)
            .append_pair("redirect_uri", &config.redirect_uri)
            .append_pair("state", state);

        Ok(url)
    }

    /// Exchange an authorization code for tokens
    pub async fn exchange_authorization_code(&self, code: &str) -> std::result::Result<(), AuthError> {
        let generation = self.generation();
        let config = &self.inner.config;
        let request = AuthorizationCodeRequest {
            code,
            client_id: &config.client_id,
            client_secret: &config.client_secret,
            redirect_uri: &config.redirect_uri,
            grant_type: "authorization_code",
        };

        let (status, body) = self.post(TOKEN_PATH, &request).await?;
        if status != StatusCode::OK {
            tracing::warn!(status = status.as_u16(), "Authorization code exchange failed");
            return Err(AuthError::UnsuccessfulResponse(status.as_u16()));
        }

        let token: TokenResponse = decode_body(&body)?;
        if !self.sign_in(token.into_credential()?, generation) {
            return Err(AuthError::Cancelled);
        }
        Ok(())
    }

    /// Start the device flow; `None` when the server does not hand out a code
    pub async fn request_device_code(&self) -> Option<DeviceCode> {
        let request = DeviceCodeRequest {
            client_id: &self.inner.config.client_id,
        };

        let (status, body) = match self.post(DEVICE_CODE_PATH, &request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Device code request failed: {}", e);
                return None;
            }
        };

        if status != StatusCode::OK {
            tracing::warn!(status = status.as_u16(), "Device code request rejected");
            return None;
        }

        match decode_body::<DeviceCode>(&body) {
            Ok(code) => {
                tracing::info!(expires_in = code.expires_in, interval = code.interval, "Received device code");
                Some(code)
            }
            Err(e) => {
                tracing::warn!("Could not decode device code: {:?}", e);
                None
            }
        }
    }

    /// Poll the device-token endpoint in the background until the user
    /// approves the code, the code runs out of attempts, or the poll is
    /// cancelled.
    pub fn poll_for_device_token(&self, device_code: DeviceCode) -> DevicePoll {
        let cancel = CancellationToken::new();
        let (progress_tx, progress_rx) = watch::channel(0u64);

        let generation = self.generation();
        let session = self.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            session.run_device_poll(device_code, generation, progress_tx, token).await
        });

        DevicePoll::new(progress_rx, cancel, handle)
    }

    async fn run_device_poll(
        &self,
        device_code: DeviceCode,
        generation: u64,
        progress: watch::Sender<u64>,
        cancel: CancellationToken,
    ) -> std::result::Result<(), AuthError> {
        let config = &self.inner.config;
        let request = DeviceTokenRequest {
            code: &device_code.device_code,
            client_id: &config.client_id,
            client_secret: &config.client_secret,
        };
        let max_attempts = device_code.expires_in;
        let interval = config.poll_interval();

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(AuthError::Cancelled);
            }

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AuthError::Cancelled),
                response = self.post(DEVICE_TOKEN_PATH, &request) => response,
            };

            if cancel.is_cancelled() {
                tracing::debug!("Discarding device token response after cancellation");
                return Err(AuthError::Cancelled);
            }

            let (status, body) = response?;
            match status {
                StatusCode::OK => {
                    let token: TokenResponse = decode_body(&body)?;
                    tracing::info!(attempt, "Device code approved");
                    if !self.sign_in(token.into_credential()?, generation) {
                        return Err(AuthError::Cancelled);
                    }
                    return Ok(());
                }
                StatusCode::BAD_REQUEST => {
                    tracing::debug!(attempt, max_attempts, "Authorization pending");
                    progress.send_replace(attempt);
                }
                other => {
                    tracing::warn!(status = other.as_u16(), attempt, "Device token poll failed");
                    return Err(AuthError::UnsuccessfulResponse(other.as_u16()));
                }
            }

            if attempt < max_attempts {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(AuthError::Cancelled),
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        }

        tracing::info!(max_attempts, "Device code expired");
        Err(AuthError::Expired)
    }

    /// Mint a new access token with the stored refresh token
    pub async fn get_access_token_from_refresh_token(&self) -> std::result::Result<(), RefreshError> {
        let _guard = self.inner.refresh_lock.lock().await;
        self.refresh().await
    }

    /// Refresh when the tokens are inside the refresh window.
    ///
    /// Expired tokens fail without a network call; the caller has to sign in
    /// again. Concurrent callers share one refresh: whoever waited on the lock
    /// finds fresh tokens and returns without a request.
    pub async fn check_to_refresh(&self) -> std::result::Result<(), RefreshError> {
        if !self.refresh_due()? {
            return Ok(());
        }

        let _guard = self.inner.refresh_lock.lock().await;
        if !self.refresh_due()? {
            tracing::debug!("Tokens were refreshed while waiting");
            return Ok(());
        }
        self.refresh().await
    }

    fn refresh_due(&self) -> std::result::Result<bool, RefreshError> {
        match self.refresh_state() {
            RefreshState::RefreshTokens => Ok(true),
            RefreshState::ExpiredTokens => Err(RefreshError::ExpiredTokens),
            RefreshState::ValidTokens | RefreshState::NoTokens => Ok(false),
        }
    }

    /// Refresh round trip; callers hold `refresh_lock`
    async fn refresh(&self) -> std::result::Result<(), RefreshError> {
        let generation = self.generation();
        let Some(refresh_token) = self.credential().map(|c| c.refresh_token) else {
            return Err(RefreshError::MissingRefreshToken);
        };

        let config = &self.inner.config;
        let request = RefreshRequest {
            refresh_token: &refresh_token,
            client_id: &config.client_id,
            client_secret: &config.client_secret,
            redirect_uri: &config.redirect_uri,
            grant_type: "refresh_token",
        };

        let (status, body) = self.post(TOKEN_PATH, &request).await?;
        match status {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED => {
                tracing::warn!("Refresh token was rejected");
                return Err(RefreshError::InvalidRefreshToken);
            }
            other => {
                tracing::warn!(status = other.as_u16(), "Token refresh failed");
                return Err(RefreshError::UnsuccessfulNetworkResponse(other.as_u16()));
            }
        }

        let token: TokenResponse = decode_body(&body)?;
        let credential = token.into_credential()?;
        let expires_at = credential.expires_at;
        if !self.store_credential(credential, generation, Origin::Refresh) {
            // Signed out (or in again) mid-flight; the old refresh token is gone
            return Err(RefreshError::MissingRefreshToken);
        }
        tracing::info!(%expires_at, "Access token refreshed");
        Ok(())
    }

    /// Forget the credential in memory and in storage
    pub fn sign_out(&self) {
        let had_credential = {
            let mut cache = self.inner.cache.write();
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
            if !self.inner.store.clear() {
                tracing::warn!("Stored credential could not be fully cleared");
            }
            cache.take().is_some()
        };

        if had_credential {
            tracing::info!("Signed out");
            let _ = self.inner.events.send(AccountEvent::SignedOut);
        }
    }

    /// Revoke the access token on the server, then sign out regardless of the outcome
    pub async fn revoke(&self) -> std::result::Result<(), AuthError> {
        let result = match self.access_token() {
            Some(token) => {
                let config = &self.inner.config;
                let request = RevokeRequest {
                    token: &token,
                    client_id: &config.client_id,
                    client_secret: &config.client_secret,
                };

                match self.post(REVOKE_PATH, &request).await {
                    Ok((StatusCode::OK, _)) => Ok(()),
                    Ok((status, _)) => Err(AuthError::UnsuccessfulResponse(status.as_u16())),
                    Err(e) => Err(AuthError::from(e)),
                }
            }
            None => Ok(()),
        };

        if let Err(e) = &result {
            tracing::warn!("Token revocation failed: {}", e);
        }

        self.sign_out();
        result
    }

    fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Persist then cache, unless the session moved on since `generation`
    /// was read. A failed store write still leaves the token usable for this
    /// process.
    fn store_credential(&self, credential: Credential, generation: u64, origin: Origin) -> bool {
        let mut cache = self.inner.cache.write();
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            tracing::info!(?origin, "Session changed during the request, dropping credential");
            return false;
        }
        if origin == Origin::SignIn {
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
        }

        if !self.inner.store.save(&credential) {
            tracing::warn!("Credential could not be persisted, keeping it in memory only");
        }
        *cache = Some(credential);
        true
    }

    fn sign_in(&self, credential: Credential, generation: u64) -> bool {
        if !self.store_credential(credential, generation, Origin::SignIn) {
            return false;
        }
        tracing::info!("Signed in");
        let _ = self.inner.events.send(AccountEvent::SignedIn);
        true
    }

    async fn post<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> std::result::Result<(StatusCode, Vec<u8>), reqwest::Error> {
        let url = self.inner.config.api_endpoint(path);
        tracing::debug!(%url, "POST");

        let response = self.inner.http_client
            .post(&url)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?.to_vec();
        Ok((status, body))
    }
}

/// Generate a random state string for CSRF protection
pub fn generate_state() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| {
            let idx = rng.gen_range(0..36);
            if idx < 10 {
                (b'0' + idx) as char
            } else {
                (b'a' + idx - 10) as char
            }
        })
        .collect()
}
