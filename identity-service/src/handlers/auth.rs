use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::middleware::{require_role, Authenticated};
use crate::models::{LoginRequest, Profile, RefreshRequest, RegistrationRequest, Session};
use crate::utils::ValidatedJson;
use crate::AppState;

pub const USER_ROLE: &str = "user";
pub const ADMIN_ROLE: &str = "admin";

pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegistrationRequest>,
) -> Result<(StatusCode, Json<Session>), AppError> {
    let session = state.identity.register(req).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Json<Session>, AppError> {
    let session = state.identity.login(&req.username, &req.password).await?;
    Ok(Json(session))
}

pub async fn refresh(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<Json<Session>, AppError> {
    let session = state.identity.refresh(&req.refresh_token).await?;
    Ok(Json(session))
}

/// Profile of the authenticated caller.
pub async fn profile(
    State(state): State<AppState>,
    Authenticated(context): Authenticated,
) -> Result<Json<Profile>, AppError> {
    require_role(&context, USER_ROLE)?;

    let profile = state
        .profiles
        .get_profile_by_username(context.principal())
        .await?;
    Ok(Json(profile))
}

pub async fn profile_by_id(
    State(state): State<AppState>,
    Authenticated(context): Authenticated,
    Path(user_id): Path<String>,
) -> Result<Json<Profile>, AppError> {
    require_role(&context, ADMIN_ROLE)?;

    let user_id = Uuid::parse_str(&user_id)
        .map_err(|_| AppError::BadRequest(anyhow::anyhow!("Invalid user id")))?;

    let profile = state.profiles.get_profile(user_id).await?;
    Ok(Json(profile))
}
