// Authentication types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identity record attached to a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: String,
    /// Profile metadata supplied at sign-up (first/last name)
    #[serde(default)]
    pub user_metadata: HashMap<String, serde_json::Value>,
}

/// Credential bundle issued by the provider.
/// Treated as an immutable value: fetched or replaced wholesale,
/// never mutated field-by-field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

impl Session {
    /// Whether the access token has passed its expiry
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Kind of state change pushed by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthChangeEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// State change pushed on the provider's event channel
#[derive(Debug, Clone)]
pub struct AuthChange {
    pub event: AuthChangeEvent,
    pub session: Option<Session>,
}

/// Password / refresh grant response
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: Option<u64>,
    pub refresh_token: String,
    pub user: User,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl TokenResponse {
    /// Convert into a session, stamping the expiry with a 60 second buffer
    pub fn into_session(self) -> Session {
        let expires_in = self.expires_in.unwrap_or(3600);
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type,
            expires_at: Utc::now() + Duration::seconds(expires_in as i64 - 60),
            user: self.user,
        }
    }
}

/// Password grant request
#[derive(Serialize)]
pub struct PasswordGrantRequest {
    pub email: String,
    pub password: String,
}

/// Refresh grant request
#[derive(Serialize)]
pub struct RefreshGrantRequest {
    pub refresh_token: String,
}

/// Sign-up request with profile metadata
#[derive(Serialize)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub data: SignUpMetadata,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpMetadata {
    pub first_name: String,
    pub last_name: String,
}

/// Error body returned by the provider (field names vary by endpoint)
#[derive(Debug, Default, Deserialize)]
pub struct ProviderErrorBody {
    pub error_description: Option<String>,
    pub msg: Option<String>,
    pub error: Option<String>,
}

impl ProviderErrorBody {
    /// Human-readable message, surfaced verbatim to the caller
    pub fn message(self, fallback: &str) -> String {
        self.error_description
            .or(self.msg)
            .or(self.error)
            .unwrap_or_else(|| fallback.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_response_into_session() {
        let raw = serde_json::json!({
            "access_token": "at-123",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "rt-456",
            "user": {
                "id": "11111111-2222-3333-4444-555555555555",
                "email": "taylor@example.com",
                "user_metadata": {"firstName": "Taylor", "lastName": "Swift"}
            }
        });

        let response: TokenResponse = serde_json::from_value(raw).unwrap();
        let session = response.into_session();

        assert_eq!(session.access_token, "at-123");
        assert_eq!(session.user.email, "taylor@example.com");
        assert!(!session.is_expired());
        assert_eq!(
            session.user.user_metadata.get("firstName").unwrap(),
            "Taylor"
        );
    }

    #[test]
    fn test_session_expiry() {
        let session = Session {
            access_token: "at".to_string(),
            refresh_token: "rt".to_string(),
            token_type: "bearer".to_string(),
            expires_at: Utc::now() - Duration::seconds(1),
            user: User {
                id: "u1".to_string(),
                email: String::new(),
                user_metadata: HashMap::new(),
            },
        };
        assert!(session.is_expired());
    }

    #[test]
    fn test_provider_error_message_precedence() {
        let body: ProviderErrorBody = serde_json::from_str(
            r#"{"error": "invalid_grant", "error_description": "Invalid login credentials"}"#,
        )
        .unwrap();
        assert_eq!(body.message("fallback"), "Invalid login credentials");

        let body: ProviderErrorBody =
            serde_json::from_str(r#"{"msg": "User already registered"}"#).unwrap();
        assert_eq!(body.message("fallback"), "User already registered");

        let body: ProviderErrorBody = serde_json::from_str("{}").unwrap();
        assert_eq!(body.message("request failed"), "request failed");
    }
}
