//! Attaches client and bearer headers to outgoing API requests

use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::RequestBuilder;

use crate::error::Error;
use crate::Result;
use super::session::SessionManager;

/// Header carrying the API version
pub const API_VERSION_HEADER: &str = "trakt-api-version";

/// Header carrying the application client id
pub const API_KEY_HEADER: &str = "trakt-api-key";

/// Decorates requests with the headers every API call needs.
///
/// Never refreshes tokens; call [`SessionManager::check_to_refresh`] before
/// dispatching authorized requests.
#[derive(Clone)]
pub struct RequestAuthenticator {
    session: SessionManager,
}

impl RequestAuthenticator {
    pub fn new(session: SessionManager) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// Add the fixed headers and, when a token is cached, the bearer header.
    ///
    /// Fails with [`Error::NotAuthenticated`] when `requires_auth` is set and
    /// there is no token, so no unauthenticated request goes out.
    pub fn authorize(&self, builder: RequestBuilder, requires_auth: bool) -> Result<RequestBuilder> {
        let config = self.session.config();
        let builder = builder
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(API_VERSION_HEADER, config.api_version.as_str())
            .header(API_KEY_HEADER, config.client_id.as_str());

        match self.session.access_token() {
            Some(token) => Ok(builder.bearer_auth(token)),
            None if requires_auth => {
                tracing::debug!("Refusing to build authorized request without an access token");
                Err(Error::NotAuthenticated)
            }
            None => Ok(builder),
        }
    }
}
