// Authentication and CORS middleware

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use tower_http::cors::{Any, CorsLayer};

use crate::error::ApiError;
use crate::routes::AppState;

/// Session middleware
///
/// Requires a live session and a bearer token matching it. The dashboard
/// client receives the token from the session endpoint after sign-in and
/// presents it on every /api call.
pub async fn session_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let snapshot = state.session.snapshot();

    let Some(session) = snapshot.session else {
        return Err(ApiError::Auth("Not signed in".to_string()));
    };

    if let Some(auth_header) = request.headers().get("authorization") {
        if let Ok(auth_str) = auth_header.to_str() {
            let expected = format!("Bearer {}", session.access_token);
            if auth_str == expected {
                return Ok(next.run(request).await);
            }
        }
    }

    let path = request.uri().path();
    let method = request.method();
    tracing::warn!(
        "Rejected request with invalid or missing session token: {} {}",
        method,
        path
    );
    Err(ApiError::Auth(
        "Invalid or missing session token".to_string(),
    ))
}

/// Create CORS middleware layer
///
/// Configures CORS to allow all origins, methods, and headers.
/// Handles OPTIONS preflight requests automatically.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthChange, AuthChangeEvent, Session, SessionManager, SupabaseAuthClient, User};
    use crate::cache::ListCache;
    use crate::db::Database;
    use crate::http_client::ProviderHttpClient;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::get,
        Router,
    };
    use chrono::{Duration, Utc};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tower::util::ServiceExt;

    fn create_test_state() -> AppState {
        let provider = Arc::new(SupabaseAuthClient::new("http://127.0.0.1:9", "anon", 5).unwrap());
        let session = Arc::new(SessionManager::new(provider, None));
        let http = Arc::new(ProviderHttpClient::new(session.clone(), 20, 10, 30, 0).unwrap());
        let db = Arc::new(Database::new(
            http,
            session.clone(),
            "http://127.0.0.1:9",
            "anon",
        ));
        let ideas = Arc::new(
            crate::ai::IdeaGenerator::new(None, "openai/gpt-4o-mini", 5).unwrap(),
        );

        AppState {
            session,
            db,
            cache: ListCache::new(60),
            ideas,
        }
    }

    fn sign_in(state: &AppState, token: &str) {
        state.session.apply_provider_event(AuthChange {
            event: AuthChangeEvent::SignedIn,
            session: Some(Session {
                access_token: token.to_string(),
                refresh_token: "rt".to_string(),
                token_type: "bearer".to_string(),
                expires_at: Utc::now() + Duration::hours(1),
                user: User {
                    id: "11111111-2222-3333-4444-555555555555".to_string(),
                    email: "taylor@example.com".to_string(),
                    user_metadata: HashMap::new(),
                },
            }),
        });
    }

    async fn test_handler() -> &'static str {
        "OK"
    }

    fn create_test_app(state: AppState) -> Router {
        Router::new()
            .route("/test", get(test_handler))
            .layer(axum::middleware::from_fn_with_state(
                state.clone(),
                session_middleware,
            ))
            .with_state(state)
    }

    #[tokio::test]
    async fn test_middleware_accepts_matching_token() {
        let state = create_test_state();
        sign_in(&state, "at-123");
        let app = create_test_app(state);

        let request = Request::builder()
            .uri("/test")
            .header("authorization", "Bearer at-123")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_middleware_rejects_wrong_token() {
        let state = create_test_state();
        sign_in(&state, "at-123");
        let app = create_test_app(state);

        let request = Request::builder()
            .uri("/test")
            .header("authorization", "Bearer somebody-else")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_middleware_rejects_when_signed_out() {
        let state = create_test_state();
        let app = create_test_app(state);

        let request = Request::builder()
            .uri("/test")
            .header("authorization", "Bearer at-123")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_middleware_rejects_missing_header() {
        let state = create_test_state();
        sign_in(&state, "at-123");
        let app = create_test_app(state);

        let request = Request::builder()
            .uri("/test")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
