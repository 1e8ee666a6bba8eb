// GoTrue auth client
//
// Request/response calls against the provider's auth endpoints, plus the
// push-event channel the session manager subscribes to. Every completed
// auth operation emits an AuthChange on the channel; state is only adopted
// through that path.

use anyhow::{Context, Result};
use reqwest::Client;
use tokio::sync::broadcast;

use super::types::{
    AuthChange, AuthChangeEvent, PasswordGrantRequest, ProviderErrorBody, RefreshGrantRequest,
    Session, SignUpMetadata, SignUpRequest, TokenResponse, User,
};
use crate::error::ApiError;

/// Capacity of the push-event channel; auth events are rare and consumed
/// immediately by the session manager pump
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Client for the provider's auth API
pub struct SupabaseAuthClient {
    client: Client,
    base_url: String,
    anon_key: String,
    events: broadcast::Sender<AuthChange>,
}

impl SupabaseAuthClient {
    pub fn new(base_url: &str, anon_key: &str, request_timeout: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            events,
        })
    }

    /// Subscribe to auth state changes pushed by this client
    pub fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
        self.events.subscribe()
    }

    fn emit(&self, event: AuthChangeEvent, session: Option<Session>) {
        // No receiver just means nobody is listening yet
        let _ = self.events.send(AuthChange { event, session });
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1{}", self.base_url, path)
    }

    /// Exchange email + password for a session
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        tracing::debug!(email = %email, "Signing in via password grant");

        let request = PasswordGrantRequest {
            email: email.to_string(),
            password: password.to_string(),
        };

        let response = self
            .client
            .post(self.auth_url("/token?grant_type=password"))
            .header("apikey", &self.anon_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ApiError::Auth(format!("Sign in request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.auth_error(response, "Sign in failed").await);
        }

        let data: TokenResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Auth(format!("Failed to parse sign in response: {}", e)))?;

        let session = data.into_session();
        tracing::info!(user = %session.user.email, "Signed in");
        self.emit(AuthChangeEvent::SignedIn, Some(session.clone()));

        Ok(session)
    }

    /// Create an account, attaching profile metadata.
    ///
    /// Depending on provider settings the response may carry a live session
    /// (auto-confirm) or only the pending user record. Either way a SIGNED_IN
    /// event is pushed when a session comes back, which is exactly the
    /// behavior the sign-up suppression window exists to mask.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<Option<Session>, ApiError> {
        tracing::debug!(email = %email, "Signing up");

        let request = SignUpRequest {
            email: email.to_string(),
            password: password.to_string(),
            data: SignUpMetadata {
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
            },
        };

        let response = self
            .client
            .post(self.auth_url("/signup"))
            .header("apikey", &self.anon_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ApiError::Auth(format!("Sign up request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.auth_error(response, "Sign up failed").await);
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ApiError::Auth(format!("Failed to parse sign up response: {}", e)))?;

        if body.get("access_token").is_some() {
            let data: TokenResponse = serde_json::from_value(body)
                .map_err(|e| ApiError::Auth(format!("Failed to parse sign up session: {}", e)))?;
            let session = data.into_session();
            tracing::info!(user = %session.user.email, "Sign up returned a live session");
            self.emit(AuthChangeEvent::SignedIn, Some(session.clone()));
            return Ok(Some(session));
        }

        tracing::info!(email = %email, "Sign up accepted, confirmation pending");
        Ok(None)
    }

    /// Invalidate the session on the provider side
    pub async fn sign_out(&self, access_token: &str) -> Result<(), ApiError> {
        tracing::debug!("Signing out");

        let response = self
            .client
            .post(self.auth_url("/logout"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ApiError::Auth(format!("Sign out request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.auth_error(response, "Sign out failed").await);
        }

        self.emit(AuthChangeEvent::SignedOut, None);
        Ok(())
    }

    /// Exchange a refresh token for a fresh session
    pub async fn refresh(&self, refresh_token: &str) -> Result<Session, ApiError> {
        tracing::debug!("Refreshing session");

        let request = RefreshGrantRequest {
            refresh_token: refresh_token.to_string(),
        };

        let response = self
            .client
            .post(self.auth_url("/token?grant_type=refresh_token"))
            .header("apikey", &self.anon_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ApiError::Auth(format!("Refresh request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.auth_error(response, "Session refresh failed").await);
        }

        let data: TokenResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Auth(format!("Failed to parse refresh response: {}", e)))?;

        let session = data.into_session();
        tracing::info!("Session refreshed, expires: {}", session.expires_at.to_rfc3339());
        self.emit(AuthChangeEvent::TokenRefreshed, Some(session.clone()));

        Ok(session)
    }

    /// Fetch the user record behind an access token (used to validate a
    /// restored session during bootstrap)
    pub async fn get_user(&self, access_token: &str) -> Result<User, ApiError> {
        let response = self
            .client
            .get(self.auth_url("/user"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ApiError::Auth(format!("User lookup failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.auth_error(response, "User lookup failed").await);
        }

        response
            .json()
            .await
            .map_err(|e| ApiError::Auth(format!("Failed to parse user response: {}", e)))
    }

    /// Build the opaque error descriptor from a provider error response,
    /// keeping the provider's message verbatim
    async fn auth_error(&self, response: reqwest::Response, fallback: &str) -> ApiError {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        let message = serde_json::from_str::<ProviderErrorBody>(&text)
            .unwrap_or_default()
            .message(if text.is_empty() { fallback } else { &text });

        tracing::warn!(status = %status, message = %message, "Provider auth error");
        ApiError::Auth(message)
    }
}
