use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, Redirect};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use url::Url;
use uuid::Uuid;

use super::{TokenResponse, TokenStore};
use crate::config::SpotifyConfig;
use crate::error::DeckError;

const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const SCOPES: &str = "user-read-playback-state user-read-currently-playing";

/// Refresh this long before the token actually expires
const REFRESH_MARGIN_SECS: u64 = 60;
const MIN_REFRESH_SECS: u64 = 5;
/// Logins started but not yet called back; the oldest is dropped first
const MAX_PENDING_LOGINS: usize = 8;

type HandlerError = (StatusCode, String);

/// `/login` + `/callback` server. Owns the refresh timer once a login
/// completes.
#[derive(Clone)]
pub struct AuthServer {
    inner: Arc<AuthInner>,
}

struct AuthInner {
    config: SpotifyConfig,
    store: TokenStore,
    http: reqwest::Client,
    token_url: String,
    pending_states: Mutex<VecDeque<String>>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

impl AuthServer {
    pub fn new(config: SpotifyConfig, store: TokenStore) -> Self {
        Self::with_token_url(config, store, TOKEN_URL)
    }

    pub fn with_token_url(config: SpotifyConfig, store: TokenStore, token_url: &str) -> Self {
        Self {
            inner: Arc::new(AuthInner {
                config,
                store,
                http: reqwest::Client::new(),
                token_url: token_url.to_string(),
                pending_states: Mutex::new(VecDeque::new()),
                refresh_task: Mutex::new(None),
            }),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/login", get(login))
            .route("/callback", get(callback))
            .with_state(self.clone())
    }

    pub async fn serve(self) -> anyhow::Result<()> {
        let addr = SocketAddr::from(([127, 0, 0, 1], self.inner.config.port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind auth server on {addr}"))?;

        info!(
            "Auth server listening, log in at {}",
            self.inner.config.login_url()
        );

        axum::serve(listener, self.router())
            .await
            .with_context(|| "Auth server stopped")?;
        Ok(())
    }

    async fn exchange_code(&self, code: &str) -> Result<u64, DeckError> {
        let redirect_uri = self.inner.config.redirect_uri();
        let response: TokenResponse = self
            .inner
            .http
            .post(&self.inner.token_url)
            .basic_auth(
                &self.inner.config.client_id,
                Some(&self.inner.config.client_secret),
            )
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let expires_in = response.expires_in;
        self.inner.store.set(response.into_token(None)).await;
        Ok(expires_in)
    }

    async fn refresh(&self) -> Result<u64, DeckError> {
        let refresh_token = self
            .inner
            .store
            .refresh_token()
            .await
            .ok_or_else(|| DeckError::Auth("no refresh token".to_string()))?;

        let response: TokenResponse = self
            .inner
            .http
            .post(&self.inner.token_url)
            .basic_auth(
                &self.inner.config.client_id,
                Some(&self.inner.config.client_secret),
            )
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let expires_in = response.expires_in;
        self.inner
            .store
            .set(response.into_token(Some(refresh_token)))
            .await;
        Ok(expires_in)
    }

    /// Replaces any running refresh timer.
    fn schedule_refresh(&self, expires_in: u64) {
        let auth = self.clone();
        let handle = tokio::spawn(async move { auth.refresh_loop(expires_in).await });

        if let Some(previous) = self.inner.refresh_task.lock().unwrap().replace(handle) {
            previous.abort();
        }
    }

    async fn refresh_loop(self, mut expires_in: u64) {
        loop {
            tokio::time::sleep(refresh_delay(expires_in)).await;

            match self.refresh().await {
                Ok(next) => {
                    info!("Access token refreshed, valid for {next}s");
                    expires_in = next;
                }
                Err(e) => {
                    // Try again after one more margin period
                    warn!("Token refresh failed: {e}");
                    expires_in = REFRESH_MARGIN_SECS * 2;
                }
            }
        }
    }
}

pub fn refresh_delay(expires_in: u64) -> Duration {
    Duration::from_secs(
        expires_in
            .saturating_sub(REFRESH_MARGIN_SECS)
            .max(MIN_REFRESH_SECS),
    )
}

pub fn authorize_url(config: &SpotifyConfig, state: &str) -> Result<Url, url::ParseError> {
    Url::parse_with_params(
        AUTHORIZE_URL,
        &[
            ("response_type", "code"),
            ("client_id", config.client_id.as_str()),
            ("scope", SCOPES),
            ("redirect_uri", config.redirect_uri().as_str()),
            ("state", state),
        ],
    )
}

async fn login(State(auth): State<AuthServer>) -> Result<Redirect, HandlerError> {
    let state = Uuid::new_v4().to_string();
    let url = authorize_url(&auth.inner.config, &state)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let mut pending = auth.inner.pending_states.lock().unwrap();
    if pending.len() == MAX_PENDING_LOGINS {
        pending.pop_front();
    }
    pending.push_back(state);
    Ok(Redirect::to(url.as_str()))
}

/// Consumes `state` if a login handed it out.
fn take_pending(auth: &AuthServer, state: Option<&str>) -> bool {
    let Some(state) = state else {
        return false;
    };
    let mut pending = auth.inner.pending_states.lock().unwrap();
    match pending.iter().position(|s| s == state) {
        Some(i) => {
            pending.remove(i);
            true
        }
        None => false,
    }
}

async fn callback(
    State(auth): State<AuthServer>,
    Query(params): Query<CallbackParams>,
) -> Result<Html<&'static str>, HandlerError> {
    if let Some(error) = params.error {
        warn!("Authorization denied: {error}");
        return Err((StatusCode::BAD_REQUEST, format!("Authorization failed: {error}")));
    }

    if !take_pending(&auth, params.state.as_deref()) {
        return Err((StatusCode::BAD_REQUEST, "State mismatch".to_string()));
    }

    let code = params
        .code
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "Missing code".to_string()))?;

    match auth.exchange_code(&code).await {
        Ok(expires_in) => {
            info!("Logged in to Spotify, token valid for {expires_in}s");
            auth.schedule_refresh(expires_in);
            Ok(Html(
                "<html><body>Logged in. You can close this window.</body></html>",
            ))
        }
        Err(e) => {
            error!("Token exchange failed: {e}");
            Err((StatusCode::BAD_GATEWAY, e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spotify::TokenProvider;
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::{Form, Json};
    use std::collections::HashMap;

    fn config() -> SpotifyConfig {
        SpotifyConfig {
            enabled: true,
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            port: 8888,
        }
    }

    async fn fake_token_endpoint(Form(form): Form<HashMap<String, String>>) -> Json<serde_json::Value> {
        let access = match form.get("grant_type").map(String::as_str) {
            Some("authorization_code") => "from-code",
            _ => "from-refresh",
        };
        Json(serde_json::json!({
            "access_token": access,
            "token_type": "Bearer",
            "expires_in": 3600,
            "refresh_token": "refresh-1",
        }))
    }

    async fn spawn_token_endpoint() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/api/token", post(fake_token_endpoint));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/api/token")
    }

    #[test]
    fn test_refresh_delay() {
        assert_eq!(refresh_delay(3600), Duration::from_secs(3540));
        assert_eq!(refresh_delay(30), Duration::from_secs(MIN_REFRESH_SECS));
    }

    #[test]
    fn test_authorize_url_params() {
        let url = authorize_url(&config(), "xyz").unwrap();
        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("accounts.spotify.com"));
        assert_eq!(params["client_id"], "client");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["scope"], SCOPES);
        assert_eq!(params["redirect_uri"], "http://127.0.0.1:8888/callback");
        assert_eq!(params["state"], "xyz");
    }

    #[tokio::test]
    async fn test_login_redirects_and_remembers_state() {
        let auth = AuthServer::new(config(), TokenStore::new());
        let response = login(State(auth.clone())).await.unwrap().into_response();

        assert!(response.status().is_redirection());
        let location = response.headers()["location"].to_str().unwrap().to_string();
        let state = auth.inner.pending_states.lock().unwrap().back().cloned().unwrap();
        assert!(location.contains(&format!("state={state}")));
    }

    #[tokio::test]
    async fn test_concurrent_logins_keep_their_state() {
        let auth = AuthServer::new(config(), TokenStore::new());
        login(State(auth.clone())).await.unwrap();
        login(State(auth.clone())).await.unwrap();

        let first = auth.inner.pending_states.lock().unwrap()[0].clone();
        assert!(take_pending(&auth, Some(&first)));
        // Each state is good for one callback
        assert!(!take_pending(&auth, Some(&first)));
        assert_eq!(auth.inner.pending_states.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_oldest_pending_login_is_dropped() {
        let auth = AuthServer::new(config(), TokenStore::new());
        for _ in 0..=MAX_PENDING_LOGINS {
            login(State(auth.clone())).await.unwrap();
        }
        assert_eq!(auth.inner.pending_states.lock().unwrap().len(), MAX_PENDING_LOGINS);
    }

    #[tokio::test]
    async fn test_callback_rejects_unknown_state() {
        let auth = AuthServer::new(config(), TokenStore::new());
        auth.inner.pending_states.lock().unwrap().push_back("expected".to_string());

        let params = CallbackParams {
            code: Some("code".to_string()),
            state: Some("forged".to_string()),
            error: None,
        };
        let (status, _) = callback(State(auth), Query(params)).await.unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_callback_exchanges_code_and_refreshes() {
        let token_url = spawn_token_endpoint().await;
        let store = TokenStore::new();
        let auth = AuthServer::with_token_url(config(), store.clone(), &token_url);
        auth.inner.pending_states.lock().unwrap().push_back("s1".to_string());

        let params = CallbackParams {
            code: Some("code".to_string()),
            state: Some("s1".to_string()),
            error: None,
        };
        callback(State(auth.clone()), Query(params)).await.unwrap();
        assert_eq!(store.access_token().await.as_deref(), Some("from-code"));
        assert!(auth.inner.refresh_task.lock().unwrap().is_some());

        let expires_in = auth.refresh().await.unwrap();
        assert_eq!(expires_in, 3600);
        assert_eq!(store.access_token().await.as_deref(), Some("from-refresh"));
        assert_eq!(store.refresh_token().await.as_deref(), Some("refresh-1"));
    }
}
