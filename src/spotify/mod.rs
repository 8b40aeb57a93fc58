//! Spotify Web API integration.
//!
//! The rest of the daemon only sees two seams: [`TokenProvider`] hands out the
//! current access token, [`PlaybackQuery`] reports playback progress. The
//! login flow and token refresh live in [`auth`].

pub mod auth;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::DeckError;

const API_BASE: &str = "https://api.spotify.com/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub progress_ms: u64,
    pub duration_ms: u64,
}

#[async_trait]
pub trait PlaybackQuery: Send + Sync {
    /// `Ok(None)` when nothing is playing.
    async fn current_progress(&self) -> Result<Option<Progress>, DeckError>;
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Option<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Token {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Shape of the token endpoint's JSON reply, for both grant types.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    /// A refresh reply may omit `refresh_token`; the previous one stays valid.
    pub fn into_token(self, previous_refresh: Option<String>) -> Token {
        Token {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at: Utc::now() + ChronoDuration::seconds(self.expires_in as i64),
        }
    }
}

/// In-memory token slot shared by the auth server, the refresh timer and the
/// poll loop. Last writer wins.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    inner: Arc<RwLock<Option<Token>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, token: Token) {
        *self.inner.write().await = Some(token);
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.inner
            .read()
            .await
            .as_ref()
            .and_then(|t| t.refresh_token.clone())
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner
            .read()
            .await
            .as_ref()
            .is_some_and(|t| !t.is_expired())
    }
}

#[async_trait]
impl TokenProvider for TokenStore {
    async fn access_token(&self) -> Option<String> {
        self.inner
            .read()
            .await
            .as_ref()
            .filter(|t| !t.is_expired())
            .map(|t| t.access_token.clone())
    }
}

#[derive(Debug, Deserialize)]
struct PlayerState {
    #[serde(default)]
    progress_ms: Option<u64>,
    #[serde(default)]
    item: Option<PlayerItem>,
}

#[derive(Debug, Deserialize)]
struct PlayerItem {
    duration_ms: u64,
}

impl PlayerState {
    fn progress(&self) -> Option<Progress> {
        let item = self.item.as_ref()?;
        Some(Progress {
            progress_ms: self.progress_ms.unwrap_or(0),
            duration_ms: item.duration_ms,
        })
    }
}

pub struct SpotifyClient {
    http: reqwest::Client,
    tokens: Arc<dyn TokenProvider>,
    api_base: String,
}

impl SpotifyClient {
    pub fn new(tokens: Arc<dyn TokenProvider>) -> Self {
        Self::with_api_base(tokens, API_BASE)
    }

    pub fn with_api_base(tokens: Arc<dyn TokenProvider>, api_base: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            tokens,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PlaybackQuery for SpotifyClient {
    async fn current_progress(&self) -> Result<Option<Progress>, DeckError> {
        let token = self.tokens.access_token().await.ok_or_else(|| {
            DeckError::Auth("no access token, log in through the auth server".to_string())
        })?;

        let response = self
            .http
            .get(format!("{}/me/player", self.api_base))
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT => {
                debug!("Spotify reports nothing playing");
                Ok(None)
            }
            StatusCode::UNAUTHORIZED => {
                Err(DeckError::Auth("access token rejected".to_string()))
            }
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                Err(DeckError::Service(format!("{status}: {body}")))
            }
            _ => {
                let state: PlayerState = response.json().await?;
                Ok(state.progress())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode as HttpStatus};
    use axum::routing::get;

    fn token(expires_in: i64) -> Token {
        Token {
            access_token: "abc".to_string(),
            refresh_token: Some("r1".to_string()),
            expires_at: Utc::now() + ChronoDuration::seconds(expires_in),
        }
    }

    #[tokio::test]
    async fn test_store_hands_out_live_token() {
        let store = TokenStore::new();
        assert_eq!(store.access_token().await, None);
        assert!(!store.is_authenticated().await);

        store.set(token(3600)).await;
        assert_eq!(store.access_token().await.as_deref(), Some("abc"));
        assert!(store.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_store_hides_expired_token() {
        let store = TokenStore::new();
        store.set(token(-10)).await;
        assert_eq!(store.access_token().await, None);
        assert_eq!(store.refresh_token().await.as_deref(), Some("r1"));
    }

    #[test]
    fn test_refresh_keeps_previous_refresh_token() {
        let resp: TokenResponse =
            serde_json::from_str(r#"{"access_token":"new","token_type":"Bearer","expires_in":3600}"#)
                .unwrap();
        let token = resp.into_token(Some("old-refresh".to_string()));
        assert_eq!(token.access_token, "new");
        assert_eq!(token.refresh_token.as_deref(), Some("old-refresh"));
        assert!(!token.is_expired());
    }

    #[test]
    fn test_player_state_progress() {
        let state: PlayerState = serde_json::from_str(
            r#"{"is_playing":true,"progress_ms":42000,"item":{"name":"x","duration_ms":200000}}"#,
        )
        .unwrap();
        assert_eq!(
            state.progress(),
            Some(Progress {
                progress_ms: 42_000,
                duration_ms: 200_000
            })
        );

        let idle: PlayerState = serde_json::from_str(r#"{"is_playing":false,"item":null}"#).unwrap();
        assert_eq!(idle.progress(), None);
    }

    #[tokio::test]
    async fn test_client_without_token_is_auth_error() {
        let client = SpotifyClient::new(Arc::new(TokenStore::new()));
        assert!(matches!(
            client.current_progress().await,
            Err(DeckError::Auth(_))
        ));
    }

    /// Serves `/me/player` with a fixed status and body, checking the bearer.
    async fn spawn_player_endpoint(status: u16, body: &'static str) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route(
            "/me/player",
            get(move |headers: HeaderMap| async move {
                let authorized = headers
                    .get("authorization")
                    .is_some_and(|v| v == "Bearer abc");
                if !authorized {
                    return (HttpStatus::BAD_REQUEST, String::new());
                }
                (HttpStatus::from_u16(status).unwrap(), body.to_string())
            }),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn client_for(status: u16, body: &'static str) -> SpotifyClient {
        let store = TokenStore::new();
        store.set(token(3600)).await;
        let base = spawn_player_endpoint(status, body).await;
        SpotifyClient::with_api_base(Arc::new(store), &base)
    }

    #[tokio::test]
    async fn test_client_parses_playing_state() {
        let client = client_for(
            200,
            r#"{"is_playing":true,"progress_ms":1500,"item":{"duration_ms":3000}}"#,
        )
        .await;
        assert_eq!(
            client.current_progress().await.unwrap(),
            Some(Progress {
                progress_ms: 1_500,
                duration_ms: 3_000
            })
        );
    }

    #[tokio::test]
    async fn test_client_no_content_is_nothing_playing() {
        let client = client_for(204, "").await;
        assert_eq!(client.current_progress().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_client_rejected_token_is_auth_error() {
        let client = client_for(401, r#"{"error":{"status":401}}"#).await;
        assert!(matches!(
            client.current_progress().await,
            Err(DeckError::Auth(_))
        ));
    }

    #[tokio::test]
    async fn test_client_server_error_is_service_error() {
        let client = client_for(503, "try later").await;
        match client.current_progress().await {
            Err(DeckError::Service(msg)) => assert!(msg.contains("try later")),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
