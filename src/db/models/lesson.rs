//! Lessons and the task material rows attached to them.

use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

use super::{decode_files, encode_files, find_course, now_rfc3339, StoreError};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Lesson {
    pub id: i64,
    #[serde(rename = "courseID")]
    pub course_id: i64,
    pub name: String,
    pub description: String,
    #[serde(rename = "startDate")]
    pub start_date: String,
}

/// A stored task row. File lists are JSON text in the database.
#[derive(Debug, Clone, FromRow)]
pub struct LessonTasksRow {
    pub id: i64,
    pub lesson_id: i64,
    pub homework: String,
    pub classwork: String,
}

/// Tasks of one lesson, merged across all of its rows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LessonTasks {
    /// Mirrors the lesson id; the merged view has no row of its own
    pub id: i64,
    #[serde(rename = "lessonID")]
    pub lesson_id: i64,
    pub homework: Vec<String>,
    pub classwork: Vec<String>,
}

pub async fn create_lesson(
    db: &SqlitePool,
    course_id: i64,
    name: &str,
    description: &str,
) -> Result<Lesson, StoreError> {
    if find_course(db, course_id).await?.is_none() {
        return Err(StoreError::not_found("Course not found"));
    }

    let lesson = sqlx::query_as::<_, Lesson>(
        r#"
        INSERT INTO lessons (course_id, name, description, start_date)
        VALUES (?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(course_id)
    .bind(name)
    .bind(description)
    .bind(now_rfc3339())
    .fetch_one(db)
    .await?;

    tracing::info!(lesson_id = lesson.id, course_id, "Lesson created");
    Ok(lesson)
}

pub async fn find_lesson(db: &SqlitePool, id: i64) -> Result<Option<Lesson>, sqlx::Error> {
    sqlx::query_as::<_, Lesson>("SELECT * FROM lessons WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn list_lessons(db: &SqlitePool, course_id: i64) -> Result<Vec<Lesson>, sqlx::Error> {
    sqlx::query_as::<_, Lesson>("SELECT * FROM lessons WHERE course_id = ? ORDER BY id")
        .bind(course_id)
        .fetch_all(db)
        .await
}

/// Delete a lesson together with its tasks and submitted homework
pub async fn delete_lesson(db: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM lessons WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Store one new task row for a lesson
pub async fn add_tasks(
    db: &SqlitePool,
    lesson_id: i64,
    homework: &[String],
    classwork: &[String],
) -> Result<LessonTasksRow, StoreError> {
    if find_lesson(db, lesson_id).await?.is_none() {
        return Err(StoreError::not_found("Lesson not found"));
    }

    let row = sqlx::query_as::<_, LessonTasksRow>(
        r#"
        INSERT INTO lesson_tasks (lesson_id, homework, classwork)
        VALUES (?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(lesson_id)
    .bind(encode_files(homework)?)
    .bind(encode_files(classwork)?)
    .fetch_one(db)
    .await?;

    tracing::debug!(
        lesson_id,
        homework = homework.len(),
        classwork = classwork.len(),
        "Lesson tasks added"
    );
    Ok(row)
}

/// Append a file to the classwork of the lesson's first task row, creating
/// that row when the lesson has none yet.
pub async fn append_classwork(
    db: &SqlitePool,
    lesson_id: i64,
    filename: &str,
) -> Result<(), StoreError> {
    if find_lesson(db, lesson_id).await?.is_none() {
        return Err(StoreError::not_found("Lesson not found"));
    }

    let mut tx = db.begin().await?;

    let existing = sqlx::query_as::<_, LessonTasksRow>(
        "SELECT * FROM lesson_tasks WHERE lesson_id = ? ORDER BY id LIMIT 1",
    )
    .bind(lesson_id)
    .fetch_optional(&mut *tx)
    .await?;

    match existing {
        Some(row) => {
            let mut classwork = decode_files(&row.classwork)?;
            classwork.push(filename.to_string());
            sqlx::query("UPDATE lesson_tasks SET classwork = ? WHERE id = ?")
                .bind(encode_files(&classwork)?)
                .bind(row.id)
                .execute(&mut *tx)
                .await?;
        }
        None => {
            sqlx::query("INSERT INTO lesson_tasks (lesson_id, homework, classwork) VALUES (?, '[]', ?)")
                .bind(lesson_id)
                .bind(encode_files(&[filename.to_string()])?)
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await?;
    Ok(())
}

/// Concatenate the file lists of `rows` in the order given
pub fn merge_task_rows(lesson_id: i64, rows: &[LessonTasksRow]) -> Result<LessonTasks, StoreError> {
    let mut merged = LessonTasks {
        id: lesson_id,
        lesson_id,
        ..Default::default()
    };

    for row in rows {
        merged.homework.extend(decode_files(&row.homework)?);
        merged.classwork.extend(decode_files(&row.classwork)?);
    }

    Ok(merged)
}

/// All task material of a lesson as one view. A lesson without task rows
/// yields empty lists.
pub async fn aggregate_tasks(db: &SqlitePool, lesson_id: i64) -> Result<LessonTasks, StoreError> {
    let rows = sqlx::query_as::<_, LessonTasksRow>(
        "SELECT * FROM lesson_tasks WHERE lesson_id = ? ORDER BY id",
    )
    .bind(lesson_id)
    .fetch_all(db)
    .await?;

    merge_task_rows(lesson_id, &rows)
}
