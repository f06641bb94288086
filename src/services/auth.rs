// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google OAuth authentication service.
//!
//! Handles:
//! - Authorization-URL construction and the loopback redirect listener
//! - Code-for-tokens exchange and token refresh (form-encoded POSTs)
//! - Revocation detection on refresh failures
//! - Proactive refresh inside `get_valid_access_token`
//!
//! Auth state is published through a `watch` channel so the refresh
//! orchestrators and the UI collaborator observe transitions as typed
//! events.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};

use crate::error::{AppError, Result};
use crate::services::token_store::{Credentials, TokenStore};

const AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const USERINFO_ENDPOINT: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// Scopes needed for GA4 and Search Console.
const SCOPES: [&str; 3] = [
    "https://www.googleapis.com/auth/analytics.readonly",
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/webmasters.readonly",
];

/// Margin before token expiration when we refresh rather than reuse.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

/// Published authentication state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    pub is_authenticated: bool,
    pub user_email: Option<String>,
    pub is_authenticating: bool,
    pub last_error: Option<String>,
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Present on the initial exchange, usually absent on refresh.
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    pub email: String,
}

/// Network boundary of the OAuth flow, substitutable in tests.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenResponse>;
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse>;
    async fn fetch_user_info(&self, access_token: &str) -> Result<UserInfo>;
}

/// Real Google token endpoint over reqwest.
pub struct HttpTokenEndpoint {
    http: reqwest::Client,
    token_url: String,
    userinfo_url: String,
    client_id: String,
    client_secret: Option<String>,
}

impl HttpTokenEndpoint {
    pub fn new(client_id: String, client_secret: Option<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            token_url: TOKEN_ENDPOINT.to_string(),
            userinfo_url: USERINFO_ENDPOINT.to_string(),
            client_id,
            client_secret,
        }
    }

    /// Point at a non-default endpoint (local test server).
    pub fn with_urls(mut self, token_url: String, userinfo_url: String) -> Self {
        self.token_url = token_url;
        self.userinfo_url = userinfo_url;
        self
    }
}

#[async_trait]
impl TokenEndpoint for HttpTokenEndpoint {
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenResponse> {
        let mut form = vec![
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let response = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("Token exchange request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Token exchange failed");
            return Err(AppError::TokenExchangeFailed);
        }

        response
            .json()
            .await
            .map_err(|_| AppError::TokenExchangeFailed)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        let mut form = vec![
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("grant_type", "refresh_token"),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let response = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::Network(format!("Token refresh request failed: {}", e)))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_refresh_failure(&body));
        }

        response
            .json()
            .await
            .map_err(|_| AppError::TokenRefreshFailed)
    }

    async fn fetch_user_info(&self, access_token: &str) -> Result<UserInfo> {
        let response = self
            .http
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Api(format!(
                "userinfo request failed with status {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Api(format!("userinfo parse error: {}", e)))
    }
}

/// Distinguish explicit revocation/expiry from a generic refresh failure.
pub fn classify_refresh_failure(body: &str) -> AppError {
    let description = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json["error_description"]
                .as_str()
                .or_else(|| json["error"].as_str())
                .map(str::to_string)
        })
        .unwrap_or_default();

    if description.contains("revoked")
        || description.contains("expired")
        || description.contains("invalid")
    {
        AppError::TokenRevoked
    } else {
        AppError::TokenRefreshFailed
    }
}

/// Build the interactive authorization URL.
pub fn authorization_url(client_id: &str, redirect_uri: &str) -> String {
    format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent",
        AUTHORIZATION_ENDPOINT,
        urlencoding::encode(client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(&SCOPES.join(" ")),
    )
}

/// Outcome of the loopback redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Code(String),
    /// The user dismissed the consent screen. Not an error.
    Cancelled,
    Error(String),
}

/// Accept exactly one redirect on the loopback listener and extract the
/// authorization code (or the provider error) from its query string.
pub async fn listen_for_callback(port: u16) -> Result<CallbackOutcome> {
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .map_err(|e| AppError::Config(format!("bind loopback port {}: {}", port, e)))?;

    let (stream, _) = listener
        .accept()
        .await
        .map_err(|e| AppError::Network(format!("accept redirect: {}", e)))?;

    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader
        .read_line(&mut request_line)
        .await
        .map_err(|e| AppError::Network(format!("read redirect: {}", e)))?;

    let outcome = parse_callback_request_line(&request_line);

    let body = match &outcome {
        CallbackOutcome::Code(_) => "Signed in. You can close this window.",
        CallbackOutcome::Cancelled => "Sign-in cancelled. You can close this window.",
        CallbackOutcome::Error(_) => "Sign-in failed. You can close this window.",
    };
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let mut stream = reader.into_inner();
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;

    Ok(outcome)
}

/// Parse `GET /callback?code=...&scope=... HTTP/1.1` style request lines.
pub fn parse_callback_request_line(request_line: &str) -> CallbackOutcome {
    let path = request_line.split_whitespace().nth(1).unwrap_or("");
    let query = path.split_once('?').map(|(_, q)| q).unwrap_or("");

    let mut code = None;
    let mut error = None;
    for pair in query.split('&') {
        match pair.split_once('=') {
            Some(("code", value)) => {
                code = urlencoding::decode(value).ok().map(|v| v.into_owned());
            }
            Some(("error", value)) => {
                error = urlencoding::decode(value).ok().map(|v| v.into_owned());
            }
            _ => {}
        }
    }

    match (code, error) {
        (Some(code), _) => CallbackOutcome::Code(code),
        (None, Some(err)) if err == "access_denied" => CallbackOutcome::Cancelled,
        (None, Some(err)) => CallbackOutcome::Error(err),
        (None, None) => CallbackOutcome::Error("missing authorization code".to_string()),
    }
}

/// Authentication service owning the credentials and their lifecycle.
pub struct AuthService {
    endpoint: Arc<dyn TokenEndpoint>,
    store: Arc<dyn TokenStore>,
    credentials: Mutex<Option<Credentials>>,
    state_tx: watch::Sender<AuthState>,
}

impl AuthService {
    pub fn new(endpoint: Arc<dyn TokenEndpoint>, store: Arc<dyn TokenStore>) -> Self {
        let (state_tx, _) = watch::channel(AuthState::default());
        Self {
            endpoint,
            store,
            credentials: Mutex::new(None),
            state_tx,
        }
    }

    /// Subscribe to auth-state transitions.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> AuthState {
        self.state_tx.borrow().clone()
    }

    /// Restore persisted credentials at startup. If both tokens are present
    /// we start authenticated and fetch the profile email best-effort.
    pub async fn load_persisted(&self) -> Result<()> {
        let Some(credentials) = self.store.load().await? else {
            return Ok(());
        };
        if credentials.refresh_token.is_none() {
            return Ok(());
        }

        let access_token = credentials.access_token.clone();
        *self.credentials.lock().await = Some(credentials);
        self.state_tx.send_modify(|state| {
            state.is_authenticated = true;
            state.last_error = None;
        });
        tracing::info!("Restored persisted credentials");

        self.update_email_best_effort(&access_token).await;
        Ok(())
    }

    /// Mark the start of an interactive sign-in.
    pub fn begin_sign_in(&self) {
        self.state_tx.send_modify(|state| {
            state.is_authenticating = true;
            state.last_error = None;
        });
    }

    /// The user cancelled the consent screen: clear any transient error,
    /// leave the auth state otherwise untouched.
    pub fn sign_in_cancelled(&self) {
        self.state_tx.send_modify(|state| {
            state.is_authenticating = false;
            state.last_error = None;
        });
    }

    /// Record a sign-in failure as a visible error.
    pub fn sign_in_failed(&self, message: String) {
        self.state_tx.send_modify(|state| {
            state.is_authenticating = false;
            state.last_error = Some(message);
        });
    }

    /// Exchange the authorization code, persist tokens and flip to
    /// authenticated. The userinfo fetch afterwards is best-effort; its
    /// failure never fails the sign-in.
    pub async fn complete_sign_in(&self, code: &str, redirect_uri: &str) -> Result<()> {
        let response = match self.endpoint.exchange_code(code, redirect_uri).await {
            Ok(response) => response,
            Err(e) => {
                self.sign_in_failed(e.to_string());
                return Err(e);
            }
        };

        let access_token = response.access_token.clone();
        {
            let mut guard = self.credentials.lock().await;
            let previous_refresh = guard.as_ref().and_then(|c| c.refresh_token.clone());
            let credentials = Credentials {
                access_token: response.access_token,
                // Keep the prior refresh token if the exchange omitted one.
                refresh_token: response.refresh_token.or(previous_refresh),
                expires_at: Utc::now() + Duration::seconds(response.expires_in),
            };
            if let Err(e) = self.store.save(&credentials).await {
                tracing::warn!(error = %e, "Failed to persist tokens");
            }
            *guard = Some(credentials);
        }

        self.state_tx.send_modify(|state| {
            state.is_authenticated = true;
            state.is_authenticating = false;
            state.last_error = None;
        });
        tracing::info!("Sign-in complete");

        self.update_email_best_effort(&access_token).await;
        Ok(())
    }

    /// Clear in-memory and persisted credentials and notify subscribers
    /// unconditionally.
    pub async fn sign_out(&self) {
        *self.credentials.lock().await = None;
        if let Err(e) = self.store.clear().await {
            tracing::warn!(error = %e, "Failed to clear token store");
        }
        self.state_tx.send_modify(|state| {
            state.is_authenticated = false;
            state.user_email = None;
            state.is_authenticating = false;
            state.last_error = None;
        });
        tracing::info!("Signed out");
    }

    /// Return a valid access token, refreshing when the cached one expires
    /// within the safety margin.
    ///
    /// Refresh failures are not retried here; they sign the user out and the
    /// orchestrator's next cycle (or an explicit re-authentication) is the
    /// retry path. The credentials lock is held across the refresh so
    /// concurrent callers serialize behind a single refresh.
    pub async fn get_valid_access_token(&self) -> Result<String> {
        let mut guard = self.credentials.lock().await;

        if let Some(credentials) = guard.as_ref() {
            if credentials.expires_at > Utc::now() + Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS) {
                return Ok(credentials.access_token.clone());
            }
        }

        let Some(refresh_token) = guard.as_ref().and_then(|c| c.refresh_token.clone()) else {
            drop(guard);
            self.state_tx.send_modify(|state| {
                state.is_authenticated = false;
            });
            return Err(AppError::NotAuthenticated);
        };

        tracing::info!("Access token expired, refreshing");
        match self.endpoint.refresh(&refresh_token).await {
            Ok(response) => {
                let credentials = Credentials {
                    access_token: response.access_token.clone(),
                    // Refresh responses usually omit the refresh token.
                    refresh_token: response.refresh_token.or(Some(refresh_token)),
                    expires_at: Utc::now() + Duration::seconds(response.expires_in),
                };
                if let Err(e) = self.store.save(&credentials).await {
                    tracing::warn!(error = %e, "Failed to persist refreshed tokens");
                }
                *guard = Some(credentials);
                Ok(response.access_token)
            }
            Err(e) => {
                drop(guard);
                self.sign_out().await;
                Err(match e {
                    AppError::TokenRevoked => AppError::TokenRevoked,
                    _ => AppError::TokenRefreshFailed,
                })
            }
        }
    }

    async fn update_email_best_effort(&self, access_token: &str) {
        match self.endpoint.fetch_user_info(access_token).await {
            Ok(info) => {
                self.state_tx.send_modify(|state| {
                    state.user_email = Some(info.email);
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to fetch profile email");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_url_carries_offline_consent_and_scopes() {
        let url = authorization_url("client-123", "http://127.0.0.1:8585/callback");
        assert!(url.starts_with(AUTHORIZATION_ENDPOINT));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains("analytics.readonly"));
        assert!(url.contains("webmasters.readonly"));
        assert!(url.contains("userinfo.email"));
        assert!(url.contains("response_type=code"));
    }

    #[test]
    fn callback_parsing() {
        assert_eq!(
            parse_callback_request_line("GET /callback?code=abc%2F123&scope=x HTTP/1.1"),
            CallbackOutcome::Code("abc/123".to_string())
        );
        assert_eq!(
            parse_callback_request_line("GET /callback?error=access_denied HTTP/1.1"),
            CallbackOutcome::Cancelled
        );
        assert!(matches!(
            parse_callback_request_line("GET /callback?error=server_error HTTP/1.1"),
            CallbackOutcome::Error(_)
        ));
        assert!(matches!(
            parse_callback_request_line("GET /callback HTTP/1.1"),
            CallbackOutcome::Error(_)
        ));
    }

    #[test]
    fn refresh_failure_classification() {
        let revoked = classify_refresh_failure(
            r#"{"error": "invalid_grant", "error_description": "Token has been expired or revoked."}"#,
        );
        assert!(matches!(revoked, AppError::TokenRevoked));

        let invalid = classify_refresh_failure(r#"{"error": "invalid_grant"}"#);
        assert!(matches!(invalid, AppError::TokenRevoked));

        let generic = classify_refresh_failure(r#"{"error": "internal_failure"}"#);
        assert!(matches!(generic, AppError::TokenRefreshFailed));

        let garbage = classify_refresh_failure("<html>502</html>");
        assert!(matches!(garbage, AppError::TokenRefreshFailed));
    }
}
