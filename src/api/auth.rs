//! Login, logout, password changes and user administration.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use axum_extra::extract::{PrivateCookieJar, WithRejection};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::crypto::{verify_password, verify_password_or_dummy};
use crate::db::{self, NewUser, Role, UserSnapshot};
use crate::AppState;

use super::access::{require_role, ADMIN};
use super::error::{ApiError, ApiJson, ValidationErrorBuilder};
use super::path_id;
use super::session::{CurrentUser, MaybeUser, SessionJar};
use super::validation::{validate_email, validate_required};

/// Every failed login answers with this, whatever went wrong
const LOGIN_FAILED: &str = "Invalid role or password";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// Kept as text so an unknown role fails like a wrong password
    pub role: String,
    #[serde(default)]
    pub remember: bool,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: UserSnapshot,
}

#[derive(Debug, Serialize)]
pub struct AuthStatus {
    pub message: String,
    pub user: UserSnapshot,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    pub role: Role,
}

/// Best-effort client address for audit logs
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Login endpoint
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    SessionJar(jar): SessionJar,
    WithRejection(Json(request), _): ApiJson<LoginRequest>,
) -> Result<(PrivateCookieJar, Json<LoginResponse>), ApiError> {
    let user = db::find_user_by_email(&state.db, request.email.trim()).await?;

    // Verify even when the user is unknown so both paths cost the same
    let password_ok = verify_password_or_dummy(
        &request.password,
        user.as_ref().map(|u| u.password_hash.as_str()),
    );
    let role_ok = user
        .as_ref()
        .is_some_and(|u| u.role.as_str() == request.role);

    let user = match user {
        Some(user) if password_ok && role_ok => user,
        _ => {
            tracing::warn!(
                email = %request.email,
                role = %request.role,
                ip = %client_ip(&headers),
                "Failed login attempt"
            );
            return Err(ApiError::unauthorized(LOGIN_FAILED));
        }
    };

    let last_login = db::touch_last_login(&state.db, user.id).await?;
    let mut snapshot = UserSnapshot::from(user);
    snapshot.last_login = Some(last_login);

    let jar = state.sessions.login(jar, &snapshot, request.remember)?;

    tracing::info!(user_id = snapshot.id, role = %snapshot.role, "User logged in");
    Ok((jar, Json(LoginResponse { user: snapshot })))
}

/// Report the identity of the current session
pub async fn check_auth(MaybeUser(user): MaybeUser) -> Result<Json<AuthStatus>, ApiError> {
    match user {
        Some(user) => Ok(Json(AuthStatus {
            message: "Authenticated".to_string(),
            user,
        })),
        None => Err(ApiError::unauthorized("Not authenticated")),
    }
}

pub async fn change_password(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    WithRejection(Json(request), _): ApiJson<ChangePasswordRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_required(&request.old_password, "Old password") {
        errors.add("old_password", e);
    }
    if let Err(e) = validate_required(&request.new_password, "New password") {
        errors.add("new_password", e);
    }
    errors.finish()?;

    if request.old_password == request.new_password {
        return Err(ApiError::bad_request(
            "New password must be different from the old password",
        ));
    }

    let stored = db::find_user_by_id(&state.db, user.id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Unauthorized"))?;

    if !verify_password(&request.old_password, &stored.password_hash) {
        tracing::warn!(user_id = user.id, "Password change with wrong old password");
        return Err(ApiError::unauthorized("Old password is incorrect"));
    }

    db::update_password(&state.db, user.id, &request.new_password).await?;

    tracing::info!(user_id = user.id, "Password changed");
    Ok(Json(serde_json::json!({ "message": "Password changed successfully" })))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    MaybeUser(user): MaybeUser,
    SessionJar(jar): SessionJar,
) -> (PrivateCookieJar, Json<serde_json::Value>) {
    if let Some(user) = user {
        tracing::info!(user_id = user.id, "User logged out");
    }
    (
        state.sessions.invalidate(jar),
        Json(serde_json::json!({ "message": "Logged out" })),
    )
}

/// Admins create every account
pub async fn register(
    State(state): State<Arc<AppState>>,
    CurrentUser(admin): CurrentUser,
    WithRejection(Json(request), _): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<UserSnapshot>), ApiError> {
    require_role(&admin, ADMIN)?;

    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_email(request.email.trim()) {
        errors.add("email", e);
    }
    if let Err(e) = validate_required(&request.first_name, "First name") {
        errors.add("firstName", e);
    }
    if let Err(e) = validate_required(&request.last_name, "Last name") {
        errors.add("lastName", e);
    }
    if let Err(e) = validate_required(&request.password, "Password") {
        errors.add("password", e);
    }
    errors.finish()?;

    let user = db::create_user(
        &state.db,
        &NewUser {
            email: request.email.trim(),
            first_name: request.first_name.trim(),
            last_name: request.last_name.trim(),
            password: &request.password,
            role: request.role,
        },
    )
    .await?;

    tracing::info!(admin_id = admin.id, user_id = user.id, "User registered");
    Ok((StatusCode::CREATED, Json(user.into())))
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    CurrentUser(admin): CurrentUser,
    Path(raw_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&admin, ADMIN)?;
    let id = path_id(&raw_id)?;

    if id == admin.id {
        return Err(ApiError::bad_request("You cannot delete your own account"));
    }

    if !db::delete_user(&state.db, id).await? {
        return Err(ApiError::not_found("User not found"));
    }

    tracing::info!(admin_id = admin.id, user_id = id, "User deleted");
    Ok(Json(serde_json::json!({ "message": "User deleted" })))
}
