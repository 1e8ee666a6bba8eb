// Integration tests for Agency Gateway
//
// These tests verify the full HTTP stack including routing, middleware,
// request parsing, and response formatting, with the provider mocked.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

use agency_gateway::{
    ai::IdeaGenerator,
    auth::{AuthChange, AuthChangeEvent, Session, SessionManager, SupabaseAuthClient, User},
    cache::ListCache,
    db::Database,
    http_client::ProviderHttpClient,
    middleware,
    routes::{self, AppState},
};

// ==================================================================================================
// Test Helpers
// ==================================================================================================

/// Create a test application state pointed at the given provider URL
fn create_test_state(provider_url: &str) -> (AppState, Arc<SessionManager>) {
    let provider =
        Arc::new(SupabaseAuthClient::new(provider_url, "anon-key", 5).expect("provider client"));
    let session = Arc::new(SessionManager::new(provider, None));

    let http = Arc::new(
        ProviderHttpClient::new(session.clone(), 20, 10, 30, 0).expect("http client"),
    );
    let db = Arc::new(Database::new(http, session.clone(), provider_url, "anon-key"));

    let ideas = Arc::new(IdeaGenerator::new(None, "openai/gpt-4o-mini", 5).expect("generator"));

    let state = AppState {
        session: session.clone(),
        db,
        cache: ListCache::new(3600),
        ideas,
    };

    (state, session)
}

/// Build the test application router
fn build_test_app(state: AppState) -> Router {
    Router::new()
        .merge(routes::health_routes())
        .merge(routes::auth_routes(state.clone()))
        .merge(routes::api_routes(state))
        .layer(middleware::cors_layer())
}

/// Put the manager into an authenticated state without a provider round-trip
fn sign_in_directly(session: &SessionManager, token: &str) {
    session.apply_provider_event(AuthChange {
        event: AuthChangeEvent::SignedIn,
        session: Some(Session {
            access_token: token.to_string(),
            refresh_token: "rt-test".to_string(),
            token_type: "bearer".to_string(),
            expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
            user: User {
                id: "11111111-2222-3333-4444-555555555555".to_string(),
                email: "taylor@example.com".to_string(),
                user_metadata: HashMap::new(),
            },
        }),
    });
}

/// Helper to parse JSON response body
async fn parse_json_body(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn token_body(email: &str) -> Value {
    json!({
        "access_token": "at-123",
        "token_type": "bearer",
        "expires_in": 3600,
        "refresh_token": "rt-456",
        "user": {
            "id": "11111111-2222-3333-4444-555555555555",
            "email": email,
            "user_metadata": {}
        }
    })
}

// ==================================================================================================
// Health Check Tests
// ==================================================================================================

#[tokio::test]
async fn test_root_endpoint() {
    let (state, _) = create_test_state("http://127.0.0.1:9");
    let app = build_test_app(state);

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = parse_json_body(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["message"], "Agency Gateway is running");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_health_endpoint() {
    let (state, _) = create_test_state("http://127.0.0.1:9");
    let app = build_test_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

// ==================================================================================================
// Session Endpoint Tests
// ==================================================================================================

#[tokio::test]
async fn test_session_endpoint_initial_state() {
    let (state, _) = create_test_state("http://127.0.0.1:9");
    let app = build_test_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/auth/session")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = parse_json_body(response.into_body()).await;
    assert_eq!(body["loading"], true);
    assert_eq!(body["session"], Value::Null);
    assert_eq!(body["user"], Value::Null);
}

#[tokio::test]
async fn test_session_endpoint_reflects_sign_in() {
    let (state, session) = create_test_state("http://127.0.0.1:9");
    let app = build_test_app(state);

    sign_in_directly(&session, "at-123");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/auth/session")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let body = parse_json_body(response.into_body()).await;
    assert_eq!(body["loading"], false);
    assert_eq!(body["user"]["email"], "taylor@example.com");
    assert_eq!(body["session"]["access_token"], "at-123");
}

// ==================================================================================================
// Sign In / Sign Up Tests
// ==================================================================================================

#[tokio::test]
async fn test_signin_success_becomes_observable() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/auth/v1/token?grant_type=password")
        .with_status(200)
        .with_body(token_body("taylor@example.com").to_string())
        .create_async()
        .await;

    let (state, session) = create_test_state(&server.url());
    let _pump = session.clone().spawn_event_pump();
    let app = build_test_app(state);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/signin",
            json!({"email": "taylor@example.com", "password": "hunter2"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // State arrives via the provider event path, not the handler
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/auth/session")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = parse_json_body(response.into_body()).await;
    assert_eq!(body["user"]["email"], "taylor@example.com");
}

#[tokio::test]
async fn test_signin_invalid_credentials_message_is_verbatim() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/auth/v1/token?grant_type=password")
        .with_status(400)
        .with_body(r#"{"error": "invalid_grant", "error_description": "Invalid login credentials"}"#)
        .create_async()
        .await;

    let (state, _) = create_test_state(&server.url());
    let app = build_test_app(state);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/auth/signin",
            json!({"email": "taylor@example.com", "password": "wrong"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = parse_json_body(response.into_body()).await;
    assert_eq!(body["error"]["message"], "Invalid login credentials");
}

#[tokio::test]
async fn test_signin_requires_fields() {
    let (state, _) = create_test_state("http://127.0.0.1:9");
    let app = build_test_app(state);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/auth/signin",
            json!({"email": "", "password": "hunter2"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_signup_never_shows_authenticated_state() {
    let mut server = mockito::Server::new_async().await;
    // Provider auto-establishes a live session on sign-up
    server
        .mock("POST", "/auth/v1/signup")
        .with_status(200)
        .with_body(token_body("new@example.com").to_string())
        .create_async()
        .await;
    server
        .mock("POST", "/auth/v1/logout")
        .with_status(204)
        .create_async()
        .await;

    let (state, session) = create_test_state(&server.url());
    let _pump = session.clone().spawn_event_pump();
    let app = build_test_app(state);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/signup",
            json!({
                "email": "new@example.com",
                "password": "hunter2",
                "first_name": "Taylor",
                "last_name": "Swift"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Even after the pump has delivered the transient SIGNED_IN, the
    // observable state stays unauthenticated
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/session")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = parse_json_body(response.into_body()).await;
    assert_eq!(body["session"], Value::Null);
    assert_eq!(body["user"], Value::Null);
    assert_eq!(body["loading"], false);

    // The transient token opens nothing
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/clients")
                .header("authorization", "Bearer at-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signup_requires_names() {
    let (state, _) = create_test_state("http://127.0.0.1:9");
    let app = build_test_app(state);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/auth/signup",
            json!({
                "email": "new@example.com",
                "password": "hunter2",
                "first_name": " ",
                "last_name": ""
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = parse_json_body(response.into_body()).await;
    assert_eq!(body["error"]["type"], "validation_error");
}

// ==================================================================================================
// CRUD Tests
// ==================================================================================================

fn client_row() -> Value {
    json!({
        "id": "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee",
        "name": "Acme Corp",
        "contact_person": "Jo Doe",
        "email": "jo@acme.example",
        "phone": "+1 555 0100",
        "address_line1": "1 Main St",
        "address_line2": "",
        "city": "Springfield",
        "postal_code": "12345",
        "country": "USA",
        "staff_contact_id": null,
        "created_at": "2025-05-12T10:30:00Z",
        "updated_at": "2025-05-12T10:30:00Z"
    })
}

#[tokio::test]
async fn test_crud_requires_session() {
    let (state, _) = create_test_state("http://127.0.0.1:9");
    let app = build_test_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/clients")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_list_clients_uses_cache_on_second_read() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/rest/v1/clients")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body(json!([client_row()]).to_string())
        .expect(1)
        .create_async()
        .await;

    let (state, session) = create_test_state(&server.url());
    sign_in_directly(&session, "at-123");
    let app = build_test_app(state);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/clients")
                    .header("authorization", "Bearer at-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = parse_json_body(response.into_body()).await;
        assert_eq!(body[0]["name"], "Acme Corp");
    }

    // The second read was served from the cache
    mock.assert_async().await;
}

#[tokio::test]
async fn test_create_client() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/rest/v1/clients")
        .match_header("prefer", "return=representation")
        .with_status(201)
        .with_body(json!([client_row()]).to_string())
        .create_async()
        .await;

    let (state, session) = create_test_state(&server.url());
    sign_in_directly(&session, "at-123");
    let app = build_test_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/clients")
                .header("authorization", "Bearer at-123")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"name": "Acme Corp"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = parse_json_body(response.into_body()).await;
    assert_eq!(body["name"], "Acme Corp");
}

#[tokio::test]
async fn test_create_client_requires_name() {
    let (state, session) = create_test_state("http://127.0.0.1:9");
    sign_in_directly(&session, "at-123");
    let app = build_test_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/clients")
                .header("authorization", "Bearer at-123")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"name": "  "}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_missing_campaign_is_not_found() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("DELETE", "/rest/v1/campaigns")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let (state, session) = create_test_state(&server.url());
    sign_in_directly(&session, "at-123");
    let app = build_test_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/campaigns/aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee")
                .header("authorization", "Bearer at-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ==================================================================================================
// Advert Idea Tests
// ==================================================================================================

#[tokio::test]
async fn test_advert_idea_without_credential_is_bad_gateway() {
    let (state, session) = create_test_state("http://127.0.0.1:9");
    sign_in_directly(&session, "at-123");
    let app = build_test_app(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/adverts/idea")
                .header("authorization", "Bearer at-123")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"campaign_name": "Summer Launch", "format": "social"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = parse_json_body(response.into_body()).await;
    assert_eq!(body["error"]["type"], "ai_error");
}
