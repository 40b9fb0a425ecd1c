//! Typed API client
//!
//! Thin typed-fetch layer: every endpoint is a GET through the
//! [`RequestAuthenticator`], decoded into a model from [`models`].

mod models;
mod pagination;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use crate::auth::{RequestAuthenticator, SessionManager};
use crate::error::Error;
use crate::Result;

pub use models::*;
pub use pagination::{Page, Pagination};

/// Client for the REST endpoints
#[derive(Clone)]
pub struct ApiClient {
    authenticator: RequestAuthenticator,
    client: Client,
}

impl ApiClient {
    pub fn new(session: SessionManager) -> Self {
        Self {
            authenticator: RequestAuthenticator::new(session),
            client: Client::new(),
        }
    }

    pub fn session(&self) -> &SessionManager {
        self.authenticator.session()
    }

    async fn send(&self, path: &str, query: &[(&str, String)], requires_auth: bool) -> Result<Response> {
        let url = self.session().config().api_endpoint(path);
        tracing::debug!(%url, requires_auth, "GET");

        let builder = self.client.get(&url).query(query);
        let response = self.authenticator.authorize(builder, requires_auth)?.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    /// Fetch and decode a single resource
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        requires_auth: bool,
    ) -> Result<T> {
        let response = self.send(path, query, requires_auth).await?;
        Ok(response.json().await?)
    }

    /// Fetch and decode one page of a listing
    pub async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        requires_auth: bool,
    ) -> Result<Page<T>> {
        let response = self.send(path, query, requires_auth).await?;
        let pagination = Pagination::from_headers(response.headers());
        let items = response.json().await?;
        Ok(Page { items, pagination })
    }

    /// Movies being watched right now
    pub async fn trending_movies(&self, page: u32, limit: u32) -> Result<Page<TrendingMovie>> {
        let query = [("page", page.to_string()), ("limit", limit.to_string())];
        self.get_page("movies/trending", &query, false).await
    }

    /// Summary of a single movie by slug or id
    pub async fn movie(&self, id: &str) -> Result<Movie> {
        self.get(&format!("movies/{}", id), &[], false).await
    }

    /// Settings of the signed-in user
    pub async fn user_settings(&self) -> Result<UserSettings> {
        self.get("users/settings", &[], true).await
    }

    /// Movies on the signed-in user's watchlist
    pub async fn watchlist_movies(&self, page: u32, limit: u32) -> Result<Page<WatchlistItem>> {
        let query = [("page", page.to_string()), ("limit", limit.to_string())];
        self.get_page("sync/watchlist/movies", &query, true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Credential, CredentialStore, MemoryStore, Settings, API_KEY_HEADER};
    use crate::config::Config;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, dir: &tempfile::TempDir, signed_in: bool) -> ApiClient {
        let mut config = Config::new("cid", "csecret");
        config.api_url = server.uri();
        let store = CredentialStore::new(
            Arc::new(MemoryStore::new()),
            Settings::new(dir.path().join("settings.json")),
        );
        if signed_in {
            assert!(store.save(&Credential::new("AT1".into(), "RT1".into(), 3600)));
        }
        ApiClient::new(SessionManager::new(config, store))
    }

    #[tokio::test]
    async fn test_trending_movies_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/movies/trending"))
            .and(query_param("page", "1"))
            .and(query_param("limit", "2"))
            .and(header(API_KEY_HEADER, "cid"))
            .and(header("trakt-api-version", "2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-Pagination-Page", "1")
                    .insert_header("X-Pagination-Limit", "2")
                    .insert_header("X-Pagination-Page-Count", "4")
                    .insert_header("X-Pagination-Item-Count", "8")
                    .set_body_json(json!([
                        {"watchers": 21, "movie": {"title": "TRON: Legacy", "year": 2010, "ids": {"trakt": 1, "slug": "tron-legacy-2010"}}},
                        {"watchers": 17, "movie": {"title": "The Dark Knight", "year": 2008, "ids": {"trakt": 4}}}
                    ])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let api = client(&server, &dir, false);
        let page = api.trending_movies(1, 2).await.unwrap();

        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].movie.title, "TRON: Legacy");
        assert_eq!(page.items[1].watchers, 17);
        assert_eq!(page.next_page(), Some(2));
    }

    #[tokio::test]
    async fn test_user_settings_sends_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/settings"))
            .and(header("authorization", "Bearer AT1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "user": {"username": "sean", "private": false, "name": "Sean Rudford", "vip": true, "ids": {"slug": "sean"}},
                "account": {"timezone": "America/Los_Angeles", "time_24hr": false}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let api = client(&server, &dir, true);
        let settings = api.user_settings().await.unwrap();
        assert_eq!(settings.user.username, "sean");
        assert!(settings.user.vip);
        assert_eq!(settings.account.timezone.as_deref(), Some("America/Los_Angeles"));
    }

    #[tokio::test]
    async fn test_authorized_endpoint_without_token_sends_nothing() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let api = client(&server, &dir, false);

        let err = api.user_settings().await.unwrap_err();
        assert!(matches!(err, Error::NotAuthenticated));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_error_status_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/movies/unknown"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let api = client(&server, &dir, false);
        match api.movie("unknown").await {
            Err(Error::Api { status, body }) => {
                assert_eq!(status, 404);
                assert_eq!(body, "not found");
            }
            other => panic!("expected API error, got {:?}", other),
        }
    }
}
