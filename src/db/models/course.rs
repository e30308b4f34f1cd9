//! Course model and course queries.

use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

use super::{find_user_by_id, Role, StoreError, UserSnapshot};

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub preview_image: String,
    pub duration: String,
    pub price: String,
    pub teacher_id: Option<i64>,
}

/// Course with its teacher eagerly attached
#[derive(Debug, Clone, Serialize)]
pub struct CourseWithTeacher {
    #[serde(flatten)]
    pub course: Course,
    pub teacher: Option<UserSnapshot>,
}

/// Flat row produced by the course/teacher LEFT JOIN
#[derive(Debug, FromRow)]
struct CourseTeacherRow {
    #[sqlx(flatten)]
    course: Course,
    t_email: Option<String>,
    t_first_name: Option<String>,
    t_last_name: Option<String>,
    t_role: Option<Role>,
    t_registered: Option<String>,
    t_last_login: Option<String>,
    t_avatar: Option<String>,
}

impl From<CourseTeacherRow> for CourseWithTeacher {
    fn from(row: CourseTeacherRow) -> Self {
        let teacher = match (row.course.teacher_id, row.t_email, row.t_role) {
            (Some(id), Some(email), Some(role)) => Some(UserSnapshot {
                id,
                email,
                first_name: row.t_first_name.unwrap_or_default(),
                last_name: row.t_last_name.unwrap_or_default(),
                role,
                registered: row.t_registered.unwrap_or_default(),
                last_login: row.t_last_login,
                avatar: row.t_avatar,
            }),
            _ => None,
        };

        Self {
            course: row.course,
            teacher,
        }
    }
}

const COURSE_WITH_TEACHER_SELECT: &str = r#"
    SELECT c.id, c.name, c.description, c.preview_image, c.duration, c.price, c.teacher_id,
           u.email AS t_email, u.first_name AS t_first_name, u.last_name AS t_last_name,
           u.role AS t_role, u.registered AS t_registered, u.last_login AS t_last_login,
           u.avatar AS t_avatar
    FROM courses c
    LEFT JOIN users u ON u.id = c.teacher_id
"#;

#[derive(Debug, Clone)]
pub struct NewCourse {
    pub name: String,
    pub description: String,
    pub preview_image: String,
    pub duration: String,
    pub price: String,
    pub teacher_id: Option<i64>,
}

/// Insert a course. A given teacher id must resolve to a user with the
/// teacher role.
pub async fn create_course(db: &SqlitePool, new: &NewCourse) -> Result<Course, StoreError> {
    if let Some(teacher_id) = new.teacher_id {
        let teacher = find_user_by_id(db, teacher_id)
            .await?
            .ok_or_else(|| StoreError::not_found("Teacher not found"))?;
        if teacher.role != Role::Teacher {
            return Err(StoreError::invalid("teacher_id does not reference a teacher"));
        }
    }

    let course = sqlx::query_as::<_, Course>(
        r#"
        INSERT INTO courses (name, description, preview_image, duration, price, teacher_id)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&new.name)
    .bind(&new.description)
    .bind(&new.preview_image)
    .bind(&new.duration)
    .bind(&new.price)
    .bind(new.teacher_id)
    .fetch_one(db)
    .await?;

    tracing::info!(course_id = course.id, name = %course.name, "Course created");
    Ok(course)
}

pub async fn find_course(db: &SqlitePool, id: i64) -> Result<Option<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await
}

/// Exact-name lookup; the first course by id wins if names repeat
pub async fn find_course_by_name(db: &SqlitePool, name: &str) -> Result<Option<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE name = ? ORDER BY id LIMIT 1")
        .bind(name)
        .fetch_optional(db)
        .await
}

pub async fn find_course_with_teacher(
    db: &SqlitePool,
    id: i64,
) -> Result<Option<CourseWithTeacher>, sqlx::Error> {
    let sql = format!("{} WHERE c.id = ?", COURSE_WITH_TEACHER_SELECT);
    let row = sqlx::query_as::<_, CourseTeacherRow>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await?;

    Ok(row.map(CourseWithTeacher::from))
}

/// Courses visible to `user`: students see the courses they are enrolled
/// in, teachers the ones they teach, everyone else sees all of them.
pub async fn list_courses_for(
    db: &SqlitePool,
    user: &UserSnapshot,
) -> Result<Vec<CourseWithTeacher>, sqlx::Error> {
    let rows = match user.role {
        Role::Student => {
            let sql = format!(
                "{} JOIN enrolled_courses e ON e.course_id = c.id WHERE e.user_id = ? ORDER BY c.id",
                COURSE_WITH_TEACHER_SELECT
            );
            sqlx::query_as::<_, CourseTeacherRow>(&sql)
                .bind(user.id)
                .fetch_all(db)
                .await?
        }
        Role::Teacher => {
            let sql = format!("{} WHERE c.teacher_id = ? ORDER BY c.id", COURSE_WITH_TEACHER_SELECT);
            sqlx::query_as::<_, CourseTeacherRow>(&sql)
                .bind(user.id)
                .fetch_all(db)
                .await?
        }
        Role::Admin | Role::Lead | Role::Sales => {
            let sql = format!("{} ORDER BY c.id", COURSE_WITH_TEACHER_SELECT);
            sqlx::query_as::<_, CourseTeacherRow>(&sql).fetch_all(db).await?
        }
    };

    Ok(rows.into_iter().map(CourseWithTeacher::from).collect())
}

pub async fn delete_course(db: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM courses WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;

    Ok(result.rows_affected() > 0)
}
