//! Sales records opened for each lead.

use axum::{
    extract::{Path, State},
    Json,
};
use axum_extra::extract::WithRejection;
use std::sync::Arc;

use crate::db::{self, Sales, SalesUpdate, SalesWithRefs};
use crate::AppState;

use super::access::{require_role, SALES};
use super::error::{ApiError, ApiJson};
use super::path_id;
use super::session::CurrentUser;

pub async fn list_sales(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<SalesWithRefs>>, ApiError> {
    require_role(&user, SALES)?;
    let sales = db::list_sales(&state.db).await?;
    Ok(Json(sales))
}

pub async fn get_sales(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(raw_id): Path<String>,
) -> Result<Json<SalesWithRefs>, ApiError> {
    require_role(&user, SALES)?;
    let id = path_id(&raw_id)?;

    let sales = db::find_sales(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Sales record not found"))?;

    Ok(Json(sales))
}

/// Change any subset of last call date, result, paid flag and note
pub async fn update_sales(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(raw_id): Path<String>,
    WithRejection(Json(update), _): ApiJson<SalesUpdate>,
) -> Result<Json<Sales>, ApiError> {
    require_role(&user, SALES)?;
    let id = path_id(&raw_id)?;

    let sales = db::update_sales(&state.db, id, &update)
        .await?
        .ok_or_else(|| ApiError::not_found("Sales record not found"))?;

    tracing::info!(sales_id = id, user_id = user.id, "Sales record updated");
    Ok(Json(sales))
}
