//! Profiles, avatars and user listings.

use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::{self, Role, UserSnapshot};
use crate::AppState;

use super::access::{require_role, ADMIN};
use super::error::ApiError;
use super::multipart::Form;
use super::path_id;
use super::session::CurrentUser;

#[derive(Debug, Default, Deserialize)]
pub struct UsersQuery {
    #[serde(default)]
    pub students: bool,
    pub role: Option<String>,
}

impl UsersQuery {
    /// `students=true` wins, then an explicit role, then teachers
    fn role(&self) -> Result<Role, ApiError> {
        if self.students {
            return Ok(Role::Student);
        }
        match self.role.as_deref() {
            Some(raw) => raw
                .parse::<Role>()
                .map_err(|e| ApiError::validation_field("role", e)),
            None => Ok(Role::Teacher),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AvatarResponse {
    pub success: String,
}

pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    CurrentUser(_user): CurrentUser,
    Path(raw_id): Path<String>,
) -> Result<Json<UserSnapshot>, ApiError> {
    let id = path_id(&raw_id)?;

    let user = db::find_user_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(user.into()))
}

pub async fn update_avatar(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    multipart: Multipart,
) -> Result<Json<AvatarResponse>, ApiError> {
    let form = Form::read(multipart).await?;
    let file = form
        .file("avatar")
        .ok_or_else(|| ApiError::validation_field("avatar", "No avatar uploaded"))?;

    let filename = state
        .blobs
        .store(&file.file_name, file.bytes.clone(), true)
        .await?;

    if !db::update_avatar(&state.db, user.id, &filename).await? {
        return Err(ApiError::not_found("User not found"));
    }

    tracing::info!(user_id = user.id, avatar = %filename, "Avatar updated");
    Ok(Json(AvatarResponse { success: filename }))
}

pub async fn get_users(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<UsersQuery>,
) -> Result<Json<Vec<UserSnapshot>>, ApiError> {
    require_role(&user, ADMIN)?;

    let role = query.role()?;
    let users = db::list_users_by_role(&state.db, role).await?;

    Ok(Json(users.into_iter().map(UserSnapshot::from).collect()))
}
