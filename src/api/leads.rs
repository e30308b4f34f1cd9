//! Lead intake for lead managers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::{self, Lead, LeadSource, LeadStatus, NewLead, Sales};
use crate::AppState;

use super::access::{require_role, LEADS};
use super::error::{ApiError, ApiJson, ValidationErrorBuilder};
use super::path_id;
use super::session::CurrentUser;
use super::validation::{validate_date, validate_email, validate_phone, validate_required};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLeadRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub date: String,
    pub phone: String,
    #[serde(default)]
    pub ig_nick: String,
    pub status: LeadStatus,
    pub source: LeadSource,
    pub author: String,
    pub course: String,
}

#[derive(Debug, Serialize)]
pub struct CreateLeadResponse {
    pub lead: Lead,
    pub sales: Sales,
}

fn validate_create_request(req: &CreateLeadRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Err(e) = validate_required(&req.name, "Name") {
        errors.add("name", e);
    }
    if let Err(e) = validate_date(req.date.trim()) {
        errors.add("date", e);
    }
    if let Err(e) = validate_phone(&req.phone) {
        errors.add("phone", e);
    }
    if let Err(e) = validate_email(req.author.trim()) {
        errors.add("author", e);
    }
    if let Err(e) = validate_required(&req.course, "Course") {
        errors.add("course", e);
    }

    errors.finish()
}

pub async fn list_leads(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<Lead>>, ApiError> {
    require_role(&user, LEADS)?;
    let leads = db::list_leads(&state.db).await?;
    Ok(Json(leads))
}

/// Record a lead and open its sales record. The author field must name the
/// logged-in lead manager.
pub async fn create_lead(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    WithRejection(Json(request), _): ApiJson<CreateLeadRequest>,
) -> Result<(StatusCode, Json<CreateLeadResponse>), ApiError> {
    require_role(&user, LEADS)?;
    validate_create_request(&request)?;

    if request.author.trim() != user.email {
        return Err(ApiError::forbidden(
            "Author must be the currently logged in user",
        ));
    }

    let new_lead = NewLead {
        name: request.name.trim().to_string(),
        description: request.description.trim().to_string(),
        date: request.date.trim().to_string(),
        phone: request.phone.trim().to_string(),
        ig_nick: request.ig_nick.trim().to_string(),
        source: request.source,
        status: request.status,
        author: user.email.clone(),
        course: request.course.trim().to_string(),
    };

    let (lead, sales) = db::create_lead_with_sales(&state.db, &new_lead).await?;

    tracing::info!(lead_id = lead.id, sales_id = sales.id, author = %user.email, "Lead created");
    Ok((StatusCode::CREATED, Json(CreateLeadResponse { lead, sales })))
}

pub async fn delete_lead(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(raw_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&user, LEADS)?;
    let id = path_id(&raw_id)?;

    if !db::delete_lead(&state.db, id).await? {
        return Err(ApiError::not_found("Lead not found"));
    }

    tracing::info!(lead_id = id, user_id = user.id, "Lead deleted");
    Ok(Json(serde_json::json!({ "message": "Lead deleted" })))
}
