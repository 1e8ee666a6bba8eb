use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware as axum_middleware,
    routing::{get, patch, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::ai::{AdvertIdea, AdvertIdeaRequest, IdeaGenerator};
use crate::auth::SessionManager;
use crate::cache::ListCache;
use crate::db::Database;
use crate::error::ApiError;
use crate::middleware;
use crate::models::payloads::{
    AdvertPatch, CampaignPatch, ClientPatch, ConceptNotePatch, NewAdvert, NewCampaign, NewClient,
    NewConceptNote, NewStaff, NewStaffGrade, StaffGradePatch, StaffPatch,
};
use crate::models::records::{Advert, Campaign, Client, ConceptNote, Staff, StaffGrade};

/// Application version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<SessionManager>,
    pub db: Arc<Database>,
    pub cache: ListCache,
    pub ideas: Arc<IdeaGenerator>,
}

/// Health check routes (no authentication required)
pub fn health_routes() -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
}

/// Auth routes (reachable while signed out)
pub fn auth_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/auth/signin", post(signin_handler))
        .route("/api/auth/signup", post(signup_handler))
        .route("/api/auth/signout", post(signout_handler))
        .route("/api/auth/session", get(session_handler))
        .with_state(state)
}

/// Dashboard CRUD routes (require the live session's bearer token)
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/grades", get(list_grades).post(create_grade))
        .route("/api/grades/:id", patch(update_grade).delete(delete_grade))
        .route("/api/staff", get(list_staff).post(create_staff))
        .route("/api/staff/:id", patch(update_staff).delete(delete_staff))
        .route("/api/clients", get(list_clients).post(create_client))
        .route("/api/clients/:id", patch(update_client).delete(delete_client))
        .route("/api/campaigns", get(list_campaigns).post(create_campaign))
        .route(
            "/api/campaigns/:id",
            patch(update_campaign).delete(delete_campaign),
        )
        .route("/api/adverts", get(list_adverts).post(create_advert))
        .route("/api/adverts/idea", post(advert_idea_handler))
        .route("/api/adverts/:id", patch(update_advert).delete(delete_advert))
        .route("/api/notes", get(list_notes).post(create_note))
        .route("/api/notes/:id", patch(update_note).delete(delete_note))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::session_middleware,
        ))
        .with_state(state)
}

// ==================================================================================================
// Health
// ==================================================================================================

async fn root_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Agency Gateway is running",
        "version": VERSION,
    }))
}

async fn health_handler() -> Json<Value> {
    Json(json!({"status": "healthy"}))
}

// ==================================================================================================
// Auth
// ==================================================================================================

#[derive(Deserialize)]
struct SignInPayload {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct SignUpPayload {
    email: String,
    password: String,
    first_name: String,
    last_name: String,
}

async fn signin_handler(
    State(state): State<AppState>,
    Json(payload): Json<SignInPayload>,
) -> Result<Json<Value>, ApiError> {
    ensure_present(&payload.email, "Email")?;
    ensure_present(&payload.password, "Password")?;

    state.session.sign_in(&payload.email, &payload.password).await?;
    Ok(Json(json!({"status": "ok"})))
}

/// Sign-up choreography: arm the suppression window before the provider
/// call, then force the UI out and invalidate whatever transient session
/// the provider may have handed back, success or not. The dashboard is
/// never reachable before an explicit sign-in.
async fn signup_handler(
    State(state): State<AppState>,
    Json(payload): Json<SignUpPayload>,
) -> Result<Json<Value>, ApiError> {
    ensure_present(&payload.email, "Email")?;
    ensure_present(&payload.password, "Password")?;
    if payload.first_name.trim().is_empty() || payload.last_name.trim().is_empty() {
        return Err(ApiError::Validation(
            "First name and last name are required".to_string(),
        ));
    }

    state.session.mark_just_signed_up();

    let result = state
        .session
        .sign_up(
            &payload.email,
            &payload.password,
            payload.first_name.trim(),
            payload.last_name.trim(),
        )
        .await;

    state.session.force_sign_out_ui();
    if let Err(e) = state.session.sign_out().await {
        tracing::debug!("Post sign-up sign-out failed: {}", e);
    }

    result?;
    Ok(Json(json!({
        "status": "ok",
        "message": "Account created, sign in to continue",
    })))
}

async fn signout_handler(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state.session.sign_out().await?;
    state.session.force_sign_out_ui();
    Ok(Json(json!({"status": "ok"})))
}

async fn session_handler(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.session.snapshot();
    Json(json!({
        "session": snapshot.session,
        "user": snapshot.user(),
        "loading": snapshot.loading,
    }))
}

// ==================================================================================================
// CRUD helpers
// ==================================================================================================

fn ensure_present(value: &str, field: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

async fn list_rows<T>(state: &AppState, table: &str) -> Result<Json<Value>, ApiError>
where
    T: DeserializeOwned + Serialize,
{
    if let Some(rows) = state.cache.get(table) {
        return Ok(Json(rows));
    }

    let rows: Vec<T> = state.db.list(table).await?;
    let value = serde_json::to_value(&rows).map_err(|e| {
        ApiError::Internal(anyhow::anyhow!("Failed to serialize {} rows: {}", table, e))
    })?;
    state.cache.put(table, value.clone());
    Ok(Json(value))
}

async fn create_row<T, P>(
    state: &AppState,
    table: &str,
    payload: &P,
) -> Result<(StatusCode, Json<T>), ApiError>
where
    T: DeserializeOwned,
    P: Serialize,
{
    let row: T = state.db.insert(table, payload).await?;
    state.cache.invalidate(table);
    Ok((StatusCode::CREATED, Json(row)))
}

async fn update_row<T, P>(
    state: &AppState,
    table: &str,
    id: Uuid,
    patch: &P,
) -> Result<Json<T>, ApiError>
where
    T: DeserializeOwned,
    P: Serialize,
{
    let row: T = state.db.update(table, id, patch).await?;
    state.cache.invalidate(table);
    Ok(Json(row))
}

async fn delete_row(state: &AppState, table: &str, id: Uuid) -> Result<StatusCode, ApiError> {
    state.db.delete(table, id).await?;
    state.cache.invalidate(table);
    Ok(StatusCode::NO_CONTENT)
}

// ==================================================================================================
// Staff grades
// ==================================================================================================

async fn list_grades(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    list_rows::<StaffGrade>(&state, "staff_grades").await
}

async fn create_grade(
    State(state): State<AppState>,
    Json(payload): Json<NewStaffGrade>,
) -> Result<(StatusCode, Json<StaffGrade>), ApiError> {
    ensure_present(&payload.name, "Grade name")?;
    create_row(&state, "staff_grades", &payload).await
}

async fn update_grade(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<StaffGradePatch>,
) -> Result<Json<StaffGrade>, ApiError> {
    update_row(&state, "staff_grades", id, &payload).await
}

async fn delete_grade(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    delete_row(&state, "staff_grades", id).await
}

// ==================================================================================================
// Staff
// ==================================================================================================

async fn list_staff(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    list_rows::<Staff>(&state, "staff").await
}

async fn create_staff(
    State(state): State<AppState>,
    Json(payload): Json<NewStaff>,
) -> Result<(StatusCode, Json<Staff>), ApiError> {
    ensure_present(&payload.first_name, "First name")?;
    ensure_present(&payload.last_name, "Last name")?;
    ensure_present(&payload.email, "Email")?;
    create_row(&state, "staff", &payload).await
}

async fn update_staff(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<StaffPatch>,
) -> Result<Json<Staff>, ApiError> {
    update_row(&state, "staff", id, &payload).await
}

async fn delete_staff(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    delete_row(&state, "staff", id).await
}

// ==================================================================================================
// Clients
// ==================================================================================================

async fn list_clients(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    list_rows::<Client>(&state, "clients").await
}

async fn create_client(
    State(state): State<AppState>,
    Json(payload): Json<NewClient>,
) -> Result<(StatusCode, Json<Client>), ApiError> {
    ensure_present(&payload.name, "Client name")?;
    create_row(&state, "clients", &payload).await
}

async fn update_client(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ClientPatch>,
) -> Result<Json<Client>, ApiError> {
    update_row(&state, "clients", id, &payload).await
}

async fn delete_client(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    delete_row(&state, "clients", id).await
}

// ==================================================================================================
// Campaigns
// ==================================================================================================

async fn list_campaigns(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    list_rows::<Campaign>(&state, "campaigns").await
}

async fn create_campaign(
    State(state): State<AppState>,
    Json(payload): Json<NewCampaign>,
) -> Result<(StatusCode, Json<Campaign>), ApiError> {
    ensure_present(&payload.name, "Campaign name")?;
    create_row(&state, "campaigns", &payload).await
}

async fn update_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CampaignPatch>,
) -> Result<Json<Campaign>, ApiError> {
    update_row(&state, "campaigns", id, &payload).await
}

async fn delete_campaign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    delete_row(&state, "campaigns", id).await
}

// ==================================================================================================
// Adverts
// ==================================================================================================

async fn list_adverts(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    list_rows::<Advert>(&state, "adverts").await
}

async fn create_advert(
    State(state): State<AppState>,
    Json(payload): Json<NewAdvert>,
) -> Result<(StatusCode, Json<Advert>), ApiError> {
    ensure_present(&payload.title, "Advert title")?;
    create_row(&state, "adverts", &payload).await
}

async fn update_advert(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdvertPatch>,
) -> Result<Json<Advert>, ApiError> {
    update_row(&state, "adverts", id, &payload).await
}

async fn delete_advert(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    delete_row(&state, "adverts", id).await
}

async fn advert_idea_handler(
    State(state): State<AppState>,
    Json(req): Json<AdvertIdeaRequest>,
) -> Result<Json<AdvertIdea>, ApiError> {
    ensure_present(&req.campaign_name, "Campaign name")?;
    let idea = state.ideas.generate_idea(&req).await?;
    Ok(Json(idea))
}

// ==================================================================================================
// Concept notes
// ==================================================================================================

async fn list_notes(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    list_rows::<ConceptNote>(&state, "concept_notes").await
}

async fn create_note(
    State(state): State<AppState>,
    Json(payload): Json<NewConceptNote>,
) -> Result<(StatusCode, Json<ConceptNote>), ApiError> {
    ensure_present(&payload.title, "Note title")?;
    create_row(&state, "concept_notes", &payload).await
}

async fn update_note(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ConceptNotePatch>,
) -> Result<Json<ConceptNote>, ApiError> {
    update_row(&state, "concept_notes", id, &payload).await
}

async fn delete_note(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    delete_row(&state, "concept_notes", id).await
}
