//! Homework submission, review and grades.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use std::sync::Arc;

use crate::db::{self, Homework, HomeworkWithUser, Role, UserSnapshot};
use crate::AppState;

use super::access::{check_course_access, check_course_owner, require_role, STAFF, STUDENT};
use super::error::{ApiError, ApiJson, ValidationErrorBuilder};
use super::lessons::{lesson_and_course, store_named};
use super::multipart::Form;
use super::path_id;
use super::session::CurrentUser;

#[derive(Debug, Deserialize)]
pub struct GradeRequest {
    pub points: i64,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeQuery {
    pub lesson_id: i64,
    pub user_id: Option<i64>,
}

impl GradeQuery {
    /// Whose grade to look up. Students only ever get their own.
    fn target(&self, user: &UserSnapshot) -> Result<i64, ApiError> {
        match (user.role, self.user_id) {
            (Role::Student, Some(id)) if id != user.id => Err(ApiError::forbidden(
                "Students can only view their own grades",
            )),
            (Role::Student, _) => Ok(user.id),
            (_, Some(id)) => Ok(id),
            (_, None) => Err(ApiError::validation_field("userId", "userId is required")),
        }
    }
}

/// A student hands in homework for a lesson of a course they attend.
/// There is one submission per lesson; files are only stored once the
/// submission is known to be accepted.
pub async fn submit_homework(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Homework>), ApiError> {
    require_role(&user, STUDENT)?;

    let form = Form::read(multipart).await?;
    let lesson_id = form.require_id("lessonId")?;
    let files = form.files("homework_files");
    if files.is_empty() {
        return Err(ApiError::validation_field("homework_files", "No files uploaded"));
    }

    let (lesson, course) = lesson_and_course(&state, lesson_id).await?;
    check_course_access(&state.db, &user, &course).await?;

    if db::find_homework(&state.db, user.id, lesson.id).await?.is_some() {
        return Err(ApiError::conflict(
            "You have already submitted homework for this lesson",
        ));
    }

    let names = store_named(&state, files).await?;
    let homework = db::submit_homework(&state.db, user.id, lesson.id, &names).await?;

    Ok((StatusCode::CREATED, Json(homework)))
}

/// Submissions for lesson `:id`
pub async fn list_homeworks(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(raw_id): Path<String>,
) -> Result<Json<Vec<HomeworkWithUser>>, ApiError> {
    require_role(&user, STAFF)?;
    let lesson_id = path_id(&raw_id)?;

    let (lesson, course) = lesson_and_course(&state, lesson_id).await?;
    check_course_owner(&user, &course)?;

    let submissions = db::list_homework_for_lesson(&state.db, lesson.id).await?;
    Ok(Json(submissions))
}

/// Grade submission `:id`. Only the course's teacher (or an admin) grades,
/// and a submission is graded once.
pub async fn grade_homework(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(raw_id): Path<String>,
    WithRejection(Json(request), _): ApiJson<GradeRequest>,
) -> Result<Json<Homework>, ApiError> {
    require_role(&user, STAFF)?;
    let id = path_id(&raw_id)?;

    let mut errors = ValidationErrorBuilder::new();
    if !(0..=100).contains(&request.points) {
        errors.add("points", "Points must be between 0 and 100");
    }
    errors.finish()?;

    let submission = db::find_homework_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Homework not found"))?;
    let (_, course) = lesson_and_course(&state, submission.lesson_id).await?;
    check_course_owner(&user, &course)?;

    let homework =
        db::grade_homework(&state.db, id, request.points, request.comment.trim()).await?;

    tracing::info!(homework_id = id, grader_id = user.id, "Homework graded");
    Ok(Json(homework))
}

pub async fn get_grades(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<GradeQuery>,
) -> Result<Json<Homework>, ApiError> {
    let user_id = query.target(&user)?;

    let grade = db::find_grade(&state.db, query.lesson_id, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("No submission found for this lesson"))?;

    Ok(Json(grade))
}
