//! Authentication and session lifecycle
//!
//! This module provides:
//! - Secret storage in the OS keychain, plus a plaintext expiry setting
//! - The credential model and its refresh-state policy
//! - SessionManager for the authorization-code, device-code and refresh flows
//! - RequestAuthenticator for decorating outgoing API requests

mod authenticator;
mod credentials;
mod device;
mod oauth;
mod session;
mod settings;
mod store;

pub use authenticator::{RequestAuthenticator, API_KEY_HEADER, API_VERSION_HEADER};
pub use credentials::{Credential, CredentialStore, RefreshState};
pub use device::DevicePoll;
pub use oauth::DeviceCode;
pub use session::{generate_state, AccountEvent, SessionManager};
pub use settings::Settings;
pub use store::{KeyringStore, MemoryStore, SecretKey, SecretStore};
