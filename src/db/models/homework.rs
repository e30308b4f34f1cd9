//! Homework submissions and grading.

use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

use super::{decode_files, encode_files, now_rfc3339, Role, StoreError, UserSnapshot};

#[derive(Debug, Clone, FromRow)]
pub struct HomeworkRow {
    pub id: i64,
    pub user_id: i64,
    pub lesson_id: i64,
    pub homework: String,
    pub start_date: String,
    pub points: i64,
    pub checked: bool,
    pub comment: String,
}

/// A submission with its file list decoded
#[derive(Debug, Clone, Serialize)]
pub struct Homework {
    pub id: i64,
    #[serde(rename = "userID")]
    pub user_id: i64,
    #[serde(rename = "lessonID")]
    pub lesson_id: i64,
    pub homework: Vec<String>,
    #[serde(rename = "startDate")]
    pub start_date: String,
    pub points: i64,
    pub checked: bool,
    pub comment: String,
}

impl TryFrom<HomeworkRow> for Homework {
    type Error = StoreError;

    fn try_from(row: HomeworkRow) -> Result<Self, Self::Error> {
        Ok(Self {
            homework: decode_files(&row.homework)?,
            id: row.id,
            user_id: row.user_id,
            lesson_id: row.lesson_id,
            start_date: row.start_date,
            points: row.points,
            checked: row.checked,
            comment: row.comment,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HomeworkWithUser {
    #[serde(flatten)]
    pub homework: Homework,
    pub user: UserSnapshot,
}

#[derive(Debug, FromRow)]
struct HomeworkUserRow {
    #[sqlx(flatten)]
    homework: HomeworkRow,
    u_email: String,
    u_first_name: String,
    u_last_name: String,
    u_role: Role,
    u_registered: String,
    u_last_login: Option<String>,
    u_avatar: Option<String>,
}

impl TryFrom<HomeworkUserRow> for HomeworkWithUser {
    type Error = StoreError;

    fn try_from(row: HomeworkUserRow) -> Result<Self, Self::Error> {
        let user = UserSnapshot {
            id: row.homework.user_id,
            email: row.u_email,
            first_name: row.u_first_name,
            last_name: row.u_last_name,
            role: row.u_role,
            registered: row.u_registered,
            last_login: row.u_last_login,
            avatar: row.u_avatar,
        };

        Ok(Self {
            homework: Homework::try_from(row.homework)?,
            user,
        })
    }
}

pub async fn find_homework(
    db: &SqlitePool,
    user_id: i64,
    lesson_id: i64,
) -> Result<Option<Homework>, StoreError> {
    let row = sqlx::query_as::<_, HomeworkRow>(
        "SELECT * FROM users_homework WHERE user_id = ? AND lesson_id = ?",
    )
    .bind(user_id)
    .bind(lesson_id)
    .fetch_optional(db)
    .await?;

    row.map(Homework::try_from).transpose()
}

pub async fn find_homework_by_id(
    db: &SqlitePool,
    id: i64,
) -> Result<Option<Homework>, StoreError> {
    let row = sqlx::query_as::<_, HomeworkRow>("SELECT * FROM users_homework WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await?;

    row.map(Homework::try_from).transpose()
}

/// Grade lookup is the same pair lookup, keyed lesson first
pub async fn find_grade(
    db: &SqlitePool,
    lesson_id: i64,
    user_id: i64,
) -> Result<Option<Homework>, StoreError> {
    find_homework(db, user_id, lesson_id).await
}

/// Record a submission. Only one submission per (user, lesson) is kept;
/// a second one is a conflict.
pub async fn submit_homework(
    db: &SqlitePool,
    user_id: i64,
    lesson_id: i64,
    files: &[String],
) -> Result<Homework, StoreError> {
    if find_homework(db, user_id, lesson_id).await?.is_some() {
        return Err(StoreError::conflict(
            "You have already submitted homework for this lesson",
        ));
    }

    let row = sqlx::query_as::<_, HomeworkRow>(
        r#"
        INSERT INTO users_homework (user_id, lesson_id, homework, start_date)
        VALUES (?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(lesson_id)
    .bind(encode_files(files)?)
    .bind(now_rfc3339())
    .fetch_one(db)
    .await?;

    tracing::info!(user_id, lesson_id, files = files.len(), "Homework submitted");
    Homework::try_from(row)
}

/// Grade a submission once. The update only matches an unchecked row, so
/// of two concurrent graders exactly one wins.
pub async fn grade_homework(
    db: &SqlitePool,
    id: i64,
    points: i64,
    comment: &str,
) -> Result<Homework, StoreError> {
    let graded = sqlx::query_as::<_, HomeworkRow>(
        r#"
        UPDATE users_homework SET points = ?, comment = ?, checked = 1
        WHERE id = ? AND checked = 0
        RETURNING *
        "#,
    )
    .bind(points)
    .bind(comment)
    .bind(id)
    .fetch_optional(db)
    .await?;

    match graded {
        Some(row) => {
            tracing::info!(homework_id = id, points, "Homework graded");
            Homework::try_from(row)
        }
        None => {
            let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM users_homework WHERE id = ?")
                .bind(id)
                .fetch_optional(db)
                .await?;
            match exists {
                Some(_) => Err(StoreError::conflict("Homework already graded")),
                None => Err(StoreError::not_found("Homework not found")),
            }
        }
    }
}

pub async fn list_homework_for_lesson(
    db: &SqlitePool,
    lesson_id: i64,
) -> Result<Vec<HomeworkWithUser>, StoreError> {
    let rows = sqlx::query_as::<_, HomeworkUserRow>(
        r#"
        SELECT h.id, h.user_id, h.lesson_id, h.homework, h.start_date, h.points,
               h.checked, h.comment,
               u.email AS u_email, u.first_name AS u_first_name, u.last_name AS u_last_name,
               u.role AS u_role, u.registered AS u_registered, u.last_login AS u_last_login,
               u.avatar AS u_avatar
        FROM users_homework h
        JOIN users u ON u.id = h.user_id
        WHERE h.lesson_id = ?
        ORDER BY h.id
        "#,
    )
    .bind(lesson_id)
    .fetch_all(db)
    .await?;

    rows.into_iter().map(HomeworkWithUser::try_from).collect()
}
