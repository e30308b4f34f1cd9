//! Lessons, their task files and file downloads.

use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::io::ReaderStream;

use crate::db::{self, Course, Lesson, LessonTasks, UserSnapshot};
use crate::AppState;

use super::access::{check_course_access, check_course_owner, require_role, STAFF};
use super::error::{ApiError, ApiJson, ValidationErrorBuilder};
use super::multipart::{Form, UploadedFile};
use super::path_id;
use super::session::CurrentUser;
use super::validation::{validate_id, validate_required};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLessonRequest {
    pub name: String,
    pub description: String,
    pub course_id: i64,
}

/// Load a lesson together with the course it belongs to
pub(crate) async fn lesson_and_course(
    state: &AppState,
    lesson_id: i64,
) -> Result<(Lesson, Course), ApiError> {
    let lesson = db::find_lesson(&state.db, lesson_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Lesson not found"))?;
    let course = db::find_course(&state.db, lesson.course_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Course not found"))?;
    Ok((lesson, course))
}

/// Store uploads under their own (sanitized) names
pub(crate) async fn store_named(
    state: &AppState,
    files: &[UploadedFile],
) -> Result<Vec<String>, ApiError> {
    let mut names = Vec::with_capacity(files.len());
    for file in files {
        let name = state
            .blobs
            .store(&file.file_name, file.bytes.clone(), false)
            .await?;
        names.push(name);
    }
    Ok(names)
}

/// Lessons of course `:id`
pub async fn list_lessons(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(raw_id): Path<String>,
) -> Result<Json<Vec<Lesson>>, ApiError> {
    let course_id = path_id(&raw_id)?;

    let course = db::find_course(&state.db, course_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Course not found"))?;
    check_course_access(&state.db, &user, &course).await?;

    let lessons = db::list_lessons(&state.db, course.id).await?;
    Ok(Json(lessons))
}

pub async fn create_lesson(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    WithRejection(Json(request), _): ApiJson<CreateLessonRequest>,
) -> Result<(StatusCode, Json<Lesson>), ApiError> {
    require_role(&user, STAFF)?;

    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validate_required(&request.name, "Name") {
        errors.add("name", e);
    }
    if let Err(e) = validate_id(request.course_id, "courseId") {
        errors.add("courseId", e);
    }
    errors.finish()?;

    let course = db::find_course(&state.db, request.course_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Course not found"))?;
    check_course_owner(&user, &course)?;

    let lesson = db::create_lesson(
        &state.db,
        course.id,
        request.name.trim(),
        request.description.trim(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(lesson)))
}

pub async fn delete_lesson(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(raw_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&user, STAFF)?;
    let id = path_id(&raw_id)?;

    let (lesson, course) = lesson_and_course(&state, id).await?;
    check_course_owner(&user, &course)?;

    if !db::delete_lesson(&state.db, lesson.id).await? {
        return Err(ApiError::not_found("Lesson not found"));
    }

    tracing::info!(lesson_id = lesson.id, user_id = user.id, "Lesson deleted");
    Ok(Json(serde_json::json!({ "message": "Lesson deleted" })))
}

/// Resolve the `lessonId` field of a staff upload and check the uploader
/// may manage that lesson.
async fn staff_lesson(
    state: &AppState,
    user: &UserSnapshot,
    form: &Form,
) -> Result<Lesson, ApiError> {
    require_role(user, STAFF)?;
    let lesson_id = form.require_id("lessonId")?;
    let (lesson, course) = lesson_and_course(state, lesson_id).await?;
    check_course_owner(user, &course)?;
    Ok(lesson)
}

/// Attach homework and classwork files to a lesson
pub async fn add_lesson_tasks(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<LessonTasks>), ApiError> {
    let form = Form::read(multipart).await?;
    let lesson = staff_lesson(&state, &user, &form).await?;

    let homework_files = form.files("homework_files");
    let classwork_files = form.files("classwork_files");
    if homework_files.is_empty() && classwork_files.is_empty() {
        return Err(ApiError::bad_request("No files uploaded"));
    }

    let homework = store_named(&state, homework_files).await?;
    let classwork = store_named(&state, classwork_files).await?;
    db::add_tasks(&state.db, lesson.id, &homework, &classwork).await?;

    let tasks = db::aggregate_tasks(&state.db, lesson.id).await?;
    Ok((StatusCode::CREATED, Json(tasks)))
}

/// Add a screen recording to the lesson's classwork. `screenrecord_name`
/// overrides the uploaded file's own name when given.
pub async fn add_screenrecord(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<LessonTasks>), ApiError> {
    let form = Form::read(multipart).await?;
    let lesson = staff_lesson(&state, &user, &form).await?;

    let recording = form
        .file("screenrecord")
        .ok_or_else(|| ApiError::validation_field("screenrecord", "No screen recording uploaded"))?;
    let name = match form.text("screenrecord_name").map(str::trim) {
        Some(name) if !name.is_empty() => name,
        _ => recording.file_name.as_str(),
    };

    let stored = state.blobs.store(name, recording.bytes.clone(), false).await?;
    db::append_classwork(&state.db, lesson.id, &stored).await?;

    tracing::info!(lesson_id = lesson.id, file = %stored, "Screen recording added");
    let tasks = db::aggregate_tasks(&state.db, lesson.id).await?;
    Ok((StatusCode::CREATED, Json(tasks)))
}

/// All task files of a lesson, merged across uploads
pub async fn get_lesson_tasks(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(raw_id): Path<String>,
) -> Result<Json<LessonTasks>, ApiError> {
    let lesson_id = path_id(&raw_id)?;

    let (lesson, course) = lesson_and_course(&state, lesson_id).await?;
    check_course_access(&state.db, &user, &course).await?;

    let tasks = db::aggregate_tasks(&state.db, lesson.id).await?;
    Ok(Json(tasks))
}

pub async fn download_file(
    State(state): State<Arc<AppState>>,
    CurrentUser(_user): CurrentUser,
    Path(file): Path<String>,
) -> Result<Response, ApiError> {
    let blob = state.blobs.retrieve(&file).await?;

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        blob.name.replace('"', "")
    ))
    .map_err(|_| ApiError::bad_request("Invalid file name"))?;

    let body = Body::from_stream(ReaderStream::new(blob.file));
    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, HeaderValue::from(blob.len)),
        ],
        body,
    )
        .into_response())
}
