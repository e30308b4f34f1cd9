//! Role gate and per-resource ownership checks.
//!
//! Roles are a flat set: every endpoint names exactly which roles it
//! accepts, an admin is not implicitly a teacher.

use sqlx::SqlitePool;

use super::error::ApiError;
use crate::db::{find_enrollment, Course, Role, UserSnapshot};

pub const ADMIN: &[Role] = &[Role::Admin];
/// People who run lessons
pub const STAFF: &[Role] = &[Role::Teacher, Role::Admin];
pub const LEADS: &[Role] = &[Role::Lead];
pub const SALES: &[Role] = &[Role::Sales];
pub const STUDENT: &[Role] = &[Role::Student];

/// 403 unless the user's role is one of `allowed`
pub fn require_role(user: &UserSnapshot, allowed: &[Role]) -> Result<(), ApiError> {
    if allowed.contains(&user.role) {
        return Ok(());
    }

    tracing::debug!(
        user_id = user.id,
        role = %user.role,
        "Role not allowed for this endpoint"
    );
    Err(ApiError::forbidden("Forbidden: insufficient role"))
}

/// Whether `user` may see the content of `course`: its teacher, an
/// enrolled user, or an admin.
pub async fn check_course_access(
    db: &SqlitePool,
    user: &UserSnapshot,
    course: &Course,
) -> Result<(), ApiError> {
    match user.role {
        Role::Admin => Ok(()),
        Role::Teacher => {
            if course.teacher_id == Some(user.id) {
                Ok(())
            } else {
                Err(ApiError::forbidden("Course not found or you are not the teacher"))
            }
        }
        _ => {
            if find_enrollment(db, user.id, course.id).await?.is_some() {
                Ok(())
            } else {
                Err(ApiError::forbidden("You are not enrolled in this course"))
            }
        }
    }
}

/// Teachers may only manage lessons of their own courses; admins manage all
pub fn check_course_owner(user: &UserSnapshot, course: &Course) -> Result<(), ApiError> {
    match user.role {
        Role::Admin => Ok(()),
        Role::Teacher if course.teacher_id == Some(user.id) => Ok(()),
        _ => Err(ApiError::forbidden("You are not the teacher of this course")),
    }
}
