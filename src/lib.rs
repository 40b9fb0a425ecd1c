//! Marquee - client SDK for a media-tracking REST API
//!
//! This library provides OAuth session management (authorization code,
//! device code, refresh), secure credential storage and a typed API client.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod ui;

pub use error::{AuthError, Error, RefreshError, Result};
