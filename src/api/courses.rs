//! Courses, their participants and payment tracking.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::{
    self, CourseWithTeacher, Enrollment, NewCourse, Participant, PaymentReport, PaymentUpdate,
    Role, StudentCourse,
};
use crate::AppState;

use super::access::{require_role, ADMIN};
use super::error::{ApiError, ApiJson, ValidationErrorBuilder};
use super::multipart::Form;
use super::path_id;
use super::session::CurrentUser;
use super::validation::{parse_id, validate_duration_months, validate_id, validate_required};

#[derive(Debug, Serialize)]
pub struct StudentCoursesResponse {
    pub user_id: i64,
    pub courses: Vec<StudentCourse>,
}

/// snake_case on the wire
#[derive(Debug, Deserialize)]
pub struct AddParticipantRequest {
    pub student_id: i64,
    /// Enrollment length in months
    pub course_duration: u32,
}

/// Pull and validate the text fields of a course form
fn course_fields(form: &Form) -> Result<NewCourse, ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    let text = |name: &str| form.text(name).unwrap_or_default().trim().to_string();
    let (name, description, duration, price) =
        (text("name"), text("description"), text("duration"), text("price"));

    for (field, value, label) in [
        ("name", &name, "Name"),
        ("description", &description, "Description"),
        ("duration", &duration, "Duration"),
        ("price", &price, "Price"),
    ] {
        if let Err(e) = validate_required(value, label) {
            errors.add(field, e);
        }
    }

    let teacher_id = match form.text("teacher_id").map(str::trim) {
        None | Some("") => None,
        Some(raw) => match parse_id(raw, "teacher_id") {
            Ok(id) => Some(id),
            Err(e) => {
                errors.add("teacher_id", e);
                None
            }
        },
    };

    if form.file("preview_image").is_none() {
        errors.add("preview_image", "Preview image is required");
    }
    errors.finish()?;

    Ok(NewCourse {
        name,
        description,
        preview_image: String::new(),
        duration,
        price,
        teacher_id,
    })
}

pub async fn list_courses(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<CourseWithTeacher>>, ApiError> {
    let courses = db::list_courses_for(&state.db, &user).await?;
    Ok(Json(courses))
}

pub async fn get_course(
    State(state): State<Arc<AppState>>,
    CurrentUser(_user): CurrentUser,
    Path(raw_id): Path<String>,
) -> Result<Json<CourseWithTeacher>, ApiError> {
    let id = path_id(&raw_id)?;

    let course = db::find_course_with_teacher(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Course not found"))?;

    Ok(Json(course))
}

/// Create a course from a multipart form. The preview image is only stored
/// once every other field has been validated.
pub async fn create_course(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<CourseWithTeacher>), ApiError> {
    require_role(&user, ADMIN)?;

    let form = Form::read(multipart).await?;
    let mut new_course = course_fields(&form)?;

    if let Some(teacher_id) = new_course.teacher_id {
        let teacher = db::find_user_by_id(&state.db, teacher_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Teacher not found"))?;
        if teacher.role != Role::Teacher {
            return Err(ApiError::validation_field(
                "teacher_id",
                "teacher_id does not reference a teacher",
            ));
        }
    }

    let preview = form
        .file("preview_image")
        .ok_or_else(|| ApiError::validation_field("preview_image", "Preview image is required"))?;
    new_course.preview_image = state
        .blobs
        .store(&preview.file_name, preview.bytes.clone(), true)
        .await?;

    let course = db::create_course(&state.db, &new_course).await?;
    let course = db::find_course_with_teacher(&state.db, course.id)
        .await?
        .ok_or_else(|| ApiError::internal("Course vanished after creation"))?;

    Ok((StatusCode::CREATED, Json(course)))
}

pub async fn delete_course(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(raw_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&user, ADMIN)?;
    let id = path_id(&raw_id)?;

    if !db::delete_course(&state.db, id).await? {
        return Err(ApiError::not_found("Course not found"));
    }

    tracing::info!(course_id = id, admin_id = user.id, "Course deleted");
    Ok(Json(serde_json::json!({ "message": "Course deleted" })))
}

pub async fn student_courses(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(raw_id): Path<String>,
) -> Result<Json<StudentCoursesResponse>, ApiError> {
    require_role(&user, ADMIN)?;
    let student_id = path_id(&raw_id)?;

    if db::find_user_by_id(&state.db, student_id).await?.is_none() {
        return Err(ApiError::not_found("User not found"));
    }

    let courses = db::list_student_courses(&state.db, student_id).await?;
    Ok(Json(StudentCoursesResponse {
        user_id: student_id,
        courses,
    }))
}

pub async fn update_user_payments(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    WithRejection(Json(updates), _): ApiJson<Vec<PaymentUpdate>>,
) -> Result<Json<PaymentReport>, ApiError> {
    require_role(&user, ADMIN)?;

    if updates.is_empty() {
        return Err(ApiError::bad_request("No payment updates provided"));
    }

    let mut errors = ValidationErrorBuilder::new();
    for (i, update) in updates.iter().enumerate() {
        if let Err(e) = validate_id(update.user_id, "user_id") {
            errors.add(format!("[{}].user_id", i), e);
        }
        if let Err(e) = validate_id(update.course_id, "course_id") {
            errors.add(format!("[{}].course_id", i), e);
        }
    }
    errors.finish()?;

    let report = db::update_payments(&state.db, &updates).await?;

    tracing::info!(
        admin_id = user.id,
        updated = report.updated,
        unmatched = report.unmatched.len(),
        "Payments updated"
    );
    Ok(Json(report))
}

pub async fn list_participants(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(raw_id): Path<String>,
) -> Result<Json<Vec<Participant>>, ApiError> {
    require_role(&user, ADMIN)?;
    let course_id = path_id(&raw_id)?;

    if db::find_course(&state.db, course_id).await?.is_none() {
        return Err(ApiError::not_found("Course not found"));
    }

    let participants = db::list_participants(&state.db, course_id).await?;
    Ok(Json(participants))
}

pub async fn add_participant(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(raw_id): Path<String>,
    WithRejection(Json(request), _): ApiJson<AddParticipantRequest>,
) -> Result<(StatusCode, Json<Enrollment>), ApiError> {
    require_role(&user, ADMIN)?;
    let course_id = path_id(&raw_id)?;

    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_id(request.student_id, "student_id") {
        errors.add("student_id", e);
    }
    if let Err(e) = validate_duration_months(request.course_duration) {
        errors.add("course_duration", e);
    }
    errors.finish()?;

    let student = db::find_user_by_id(&state.db, request.student_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Student not found"))?;
    if student.role != Role::Student {
        return Err(ApiError::validation_field(
            "student_id",
            "Only students can be enrolled",
        ));
    }

    let enrollment =
        db::enroll(&state.db, student.id, course_id, request.course_duration).await?;

    tracing::info!(course_id, student_id = student.id, "Student enrolled");
    Ok((StatusCode::CREATED, Json(enrollment)))
}

pub async fn remove_participant(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path((raw_course_id, raw_student_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&user, ADMIN)?;
    let course_id = path_id(&raw_course_id)?;
    let student_id = path_id(&raw_student_id)?;

    if !db::remove_enrollment(&state.db, course_id, student_id).await? {
        return Err(ApiError::not_found("Enrollment not found"));
    }

    tracing::info!(course_id, student_id, "Student removed from course");
    Ok(Json(serde_json::json!({ "message": "Participant removed" })))
}
