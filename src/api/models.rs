//! Response models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifiers of an item across services
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ids {
    #[serde(default)]
    pub trakt: Option<u64>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub imdb: Option<String>,
    #[serde(default)]
    pub tmdb: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub title: String,
    #[serde(default)]
    pub year: Option<u16>,
    pub ids: Ids,
}

/// Entry of the trending list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendingMovie {
    pub watchers: u64,
    pub movie: Movie,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistItem {
    #[serde(default)]
    pub rank: Option<u32>,
    #[serde(default)]
    pub listed_at: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub movie: Option<Movie>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub vip: bool,
    #[serde(default)]
    pub ids: Ids,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub date_format: Option<String>,
    #[serde(default)]
    pub time_24hr: bool,
}

/// Settings of the signed-in user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub user: User,
    #[serde(default)]
    pub account: Account,
}
