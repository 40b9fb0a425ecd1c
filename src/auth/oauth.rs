//! OAuth wire types
//!
//! Request and response bodies for the token, device-code and revoke
//! endpoints, exactly as the service expects them.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, RefreshError};
use super::credentials::Credential;

pub const TOKEN_PATH: &str = "oauth/token";
pub const DEVICE_CODE_PATH: &str = "oauth/device/code";
pub const DEVICE_TOKEN_PATH: &str = "oauth/device/token";
pub const REVOKE_PATH: &str = "oauth/revoke";
pub const AUTHORIZE_PATH: &str = "oauth/authorize";

/// Authorization code exchange
#[derive(Debug, Serialize)]
pub(crate) struct AuthorizationCodeRequest<'a> {
    pub code: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub redirect_uri: &'a str,
    pub grant_type: &'a str,
}

/// Token refresh request
#[derive(Debug, Serialize)]
pub(crate) struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub redirect_uri: &'a str,
    pub grant_type: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct DeviceCodeRequest<'a> {
    pub client_id: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct DeviceTokenRequest<'a> {
    pub code: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct RevokeRequest<'a> {
    pub token: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
}

/// Token endpoint response
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    #[serde(default)]
    #[allow(dead_code)]
    pub token_type: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Turn the response into a credential, rejecting lifetimes that are
    /// negative or too large to timestamp
    pub fn into_credential(self) -> Result<Credential, BodyError> {
        let expires_in = self.expires_in;
        Credential::issued(self.access_token, self.refresh_token, expires_in)
            .ok_or_else(|| BodyError::Decode(format!("expires_in out of range: {}", expires_in)))
    }
}

/// Device-flow handshake returned by the device-code endpoint.
///
/// Show `user_code` and `verification_url` to the user; `device_code` is only
/// sent back to the server.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceCode {
    pub device_code: String,
    pub user_code: String,
    pub verification_url: String,
    /// Seconds until the code expires, also the poll attempt ceiling
    pub expires_in: u64,
    /// Poll cadence suggested by the server, in seconds
    pub interval: u64,
}

impl std::fmt::Debug for DeviceCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCode")
            .field("device_code", &"<redacted>")
            .field("user_code", &self.user_code)
            .field("verification_url", &self.verification_url)
            .field("expires_in", &self.expires_in)
            .field("interval", &self.interval)
            .finish()
    }
}

/// Why a response body could not be turned into a value
#[derive(Debug)]
pub(crate) enum BodyError {
    Missing,
    Decode(String),
}

pub(crate) fn decode_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, BodyError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(BodyError::Missing);
    }
    serde_json::from_slice(body).map_err(|e| BodyError::Decode(e.to_string()))
}

impl From<BodyError> for AuthError {
    fn from(err: BodyError) -> Self {
        match err {
            BodyError::Missing => AuthError::MissingData,
            BodyError::Decode(msg) => AuthError::Decode(msg),
        }
    }
}

impl From<BodyError> for RefreshError {
    fn from(err: BodyError) -> Self {
        match err {
            BodyError::Missing => RefreshError::MissingData,
            BodyError::Decode(msg) => RefreshError::Decode(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_response_decodes_with_extra_fields() {
        let body = br#"{"access_token":"AT","refresh_token":"RT","expires_in":7776000,"token_type":"bearer","scope":"public","created_at":1487889741}"#;
        let response: TokenResponse = decode_body(body).unwrap();
        assert_eq!(response.access_token, "AT");
        assert_eq!(response.expires_in, 7776000);
    }

    #[test]
    fn test_empty_body_is_missing_data() {
        assert!(matches!(decode_body::<TokenResponse>(b""), Err(BodyError::Missing)));
        assert!(matches!(decode_body::<TokenResponse>(b"  \n"), Err(BodyError::Missing)));
        assert_eq!(
            AuthError::from(decode_body::<TokenResponse>(b"").unwrap_err()),
            AuthError::MissingData
        );
    }

    #[test]
    fn test_wrong_shape_is_decode_error() {
        let err = decode_body::<TokenResponse>(br#"{"access_token":"AT"}"#).unwrap_err();
        assert!(matches!(RefreshError::from(err), RefreshError::Decode(_)));
    }

    fn token_with_lifetime(expires_in: i64) -> TokenResponse {
        TokenResponse {
            access_token: "AT".into(),
            refresh_token: "RT".into(),
            expires_in,
            token_type: None,
            scope: None,
        }
    }

    #[test]
    fn test_out_of_range_lifetime_is_decode_error() {
        for expires_in in [10_000_000_000_000, i64::MAX, -1, i64::MIN] {
            let err = token_with_lifetime(expires_in).into_credential().unwrap_err();
            assert!(
                matches!(AuthError::from(err), AuthError::Decode(_)),
                "expires_in {} should be rejected",
                expires_in
            );
        }
    }

    #[test]
    fn test_in_range_lifetime_builds_credential() {
        let credential = token_with_lifetime(7776000).into_credential().unwrap();
        assert_eq!(credential.access_token, "AT");
        assert!(credential.expires_at > chrono::Utc::now() + chrono::Duration::days(89));

        // Zero is a legal, already-expiring lifetime
        assert!(token_with_lifetime(0).into_credential().is_ok());
    }

    #[test]
    fn test_request_wire_shape() {
        let request = AuthorizationCodeRequest {
            code: "abc123",
            client_id: "cid",
            client_secret: "csecret",
            redirect_uri: "app://callback",
            grant_type: "authorization_code",
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "code": "abc123",
                "client_id": "cid",
                "client_secret": "csecret",
                "redirect_uri": "app://callback",
                "grant_type": "authorization_code"
            })
        );
    }

    #[test]
    fn test_device_code_debug_hides_device_code() {
        let code: DeviceCode = serde_json::from_value(json!({
            "device_code": "hidden-device-code",
            "user_code": "5055CC52",
            "verification_url": "https://trakt.tv/activate",
            "expires_in": 600,
            "interval": 5
        }))
        .unwrap();
        let printed = format!("{:?}", code);
        assert!(!printed.contains("hidden-device-code"));
        assert!(printed.contains("5055CC52"));
    }
}
