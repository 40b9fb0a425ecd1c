//! Plaintext application settings
//!
//! The token expiry is not secret, so it lives in an ordinary JSON file next
//! to the configuration instead of the keychain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::Result;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

/// Settings file holding the access-token expiry
#[derive(Debug, Clone)]
pub struct Settings {
    path: PathBuf,
}

impl Settings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<SettingsFile> {
        if !self.path.exists() {
            return Ok(SettingsFile::default());
        }

        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write(&self, settings: &SettingsFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(settings)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    /// Stored expiry of the access token
    pub fn expires_at(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.read()?.expires_at)
    }

    pub fn set_expires_at(&self, expires_at: DateTime<Utc>) -> Result<()> {
        let mut settings = self.read().unwrap_or_default();
        settings.expires_at = Some(expires_at);
        self.write(&settings)
    }

    pub fn clear_expires_at(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }

        let mut settings = self.read().unwrap_or_default();
        settings.expires_at = None;
        self.write(&settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_missing_file_has_no_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::new(dir.path().join("settings.json"));
        assert_eq!(settings.expires_at().unwrap(), None);
    }

    #[test]
    fn test_expiry_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::new(dir.path().join("nested").join("settings.json"));
        let expires = Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap();

        settings.set_expires_at(expires).unwrap();
        assert_eq!(settings.expires_at().unwrap(), Some(expires));

        settings.clear_expires_at().unwrap();
        assert_eq!(settings.expires_at().unwrap(), None);
    }

    #[test]
    fn test_clear_without_file_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::new(dir.path().join("settings.json"));
        settings.clear_expires_at().unwrap();
        assert!(!settings.path().exists());
    }

    #[test]
    fn test_corrupt_file_is_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();

        let settings = Settings::new(&path);
        assert!(settings.expires_at().is_err());

        let expires = Utc.with_ymd_and_hms(2031, 6, 1, 0, 0, 0).unwrap();
        settings.set_expires_at(expires).unwrap();
        assert_eq!(settings.expires_at().unwrap(), Some(expires));
    }
}
