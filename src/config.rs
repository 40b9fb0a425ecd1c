//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use crate::Result;
use crate::error::Error;

/// Environment variable overriding the configured client id
pub const CLIENT_ID_ENV: &str = "MARQUEE_CLIENT_ID";

/// Environment variable overriding the configured client secret
pub const CLIENT_SECRET_ENV: &str = "MARQUEE_CLIENT_SECRET";

/// Redirect URI for applications that display the code instead of receiving a redirect
pub const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// OAuth application client id, also sent as the client-id header
    #[serde(default)]
    pub client_id: String,

    /// OAuth application client secret
    #[serde(default)]
    pub client_secret: String,

    /// Redirect URI registered for the application
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    /// Base URL of the REST API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Base URL of the website hosting the authorization page
    #[serde(default = "default_site_url")]
    pub site_url: String,

    /// Value of the API version header
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// How long before hard expiry a proactive refresh starts
    #[serde(default = "default_refresh_window_secs")]
    pub refresh_window_secs: u64,

    /// Delay between device-token poll attempts
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Service name used for keychain entries
    #[serde(default = "default_keyring_service")]
    pub keyring_service: String,

    /// Where the plaintext settings (token expiry) live
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings_path: Option<PathBuf>,
}

fn default_redirect_uri() -> String {
    OOB_REDIRECT_URI.to_string()
}

fn default_api_url() -> String {
    "https://api.trakt.tv".to_string()
}

fn default_site_url() -> String {
    "https://trakt.tv".to_string()
}

fn default_api_version() -> String {
    "2".to_string()
}

fn default_refresh_window_secs() -> u64 {
    30 * 24 * 60 * 60
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_keyring_service() -> String {
    "marquee".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: default_redirect_uri(),
            api_url: default_api_url(),
            site_url: default_site_url(),
            api_version: default_api_version(),
            refresh_window_secs: default_refresh_window_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            keyring_service: default_keyring_service(),
            settings_path: None,
        }
    }
}

impl Config {
    /// Create a config for the given OAuth application
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            ..Self::default()
        }
    }

    /// Refresh window; values too large for a duration saturate
    pub fn refresh_window(&self) -> chrono::Duration {
        i64::try_from(self.refresh_window_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Path of the plaintext settings file
    pub fn settings_file(&self) -> PathBuf {
        self.settings_path
            .clone()
            .unwrap_or_else(|| config_dir().join("settings.json"))
    }

    /// Join an API path onto the configured base URL
    pub fn api_endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Fail early when the OAuth application is not set up
    pub fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(Error::Config(
                "client_id and client_secret must be set. Run 'marquee configure' first.".to_string(),
            ));
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var(CLIENT_ID_ENV) {
            if !id.is_empty() {
                tracing::debug!("Using client id from {}", CLIENT_ID_ENV);
                self.client_id = id;
            }
        }
        if let Ok(secret) = std::env::var(CLIENT_SECRET_ENV) {
            if !secret.is_empty() {
                tracing::debug!("Using client secret from {}", CLIENT_SECRET_ENV);
                self.client_secret = secret;
            }
        }
    }
}

/// Get the config directory path
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".marquee")
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load configuration from file, then apply environment overrides
pub fn load() -> Result<Config> {
    let path = config_path();

    let mut config = if path.exists() {
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content)?
    } else if std::env::var(CLIENT_ID_ENV).is_ok() {
        Config::default()
    } else {
        return Err(Error::Config(format!(
            "Config not found at {:?}. Run 'marquee configure' first.",
            path
        )));
    };

    config.apply_env_overrides();
    Ok(config)
}

/// Save configuration to file
pub fn save(config: &Config) -> Result<()> {
    let path = config_path();

    // Create parent directory
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, content)?;

    // The file holds the client secret
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)?;
    }

    Ok(())
}

/// Interactively create or update the configuration
pub fn configure() -> Result<Config> {
    use crate::ui;
    use inquire::{Confirm, Password, Text};

    ui::print_header("Setup");
    println!("  Register an API application on the website, then paste its credentials here.\n");

    let mut config = load().unwrap_or_default();

    let client_id = Text::new("Client ID:")
        .with_initial_value(&config.client_id)
        .prompt()
        .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;
    if client_id.trim().is_empty() {
        return Err(Error::Config("Client ID cannot be empty".to_string()));
    }
    config.client_id = client_id.trim().to_string();

    let client_secret = Password::new("Client secret:")
        .without_confirmation()
        .prompt()
        .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;
    if client_secret.trim().is_empty() {
        return Err(Error::Config("Client secret cannot be empty".to_string()));
    }
    config.client_secret = client_secret.trim().to_string();

    let use_oob = Confirm::new("Use the out-of-band redirect URI (code shown in the browser)?")
        .with_default(config.redirect_uri == OOB_REDIRECT_URI)
        .prompt()
        .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;

    config.redirect_uri = if use_oob {
        OOB_REDIRECT_URI.to_string()
    } else {
        Text::new("Redirect URI:")
            .with_initial_value(&config.redirect_uri)
            .prompt()
            .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?
    };

    ui::print_thinking("Saving configuration");
    save(&config)?;
    ui::print_success(&format!("Configuration saved to {:?}", config_path()));

    Ok(config)
}
