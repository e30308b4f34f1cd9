//! Enrollment (user, course) join records and payment tracking.

use chrono::Months;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::{find_course, find_user_by_id, now_rfc3339, StoreError};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Enrollment {
    pub id: i64,
    pub user_id: i64,
    pub course_id: i64,
    pub start_date: String,
    pub end_date: String,
    pub paid: bool,
    pub paid_date: Option<String>,
}

/// Course participant with enrollment status
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Participant {
    pub id: i64,
    #[serde(rename = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastName")]
    pub last_name: String,
    pub email: String,
    pub avatar: Option<String>,
    pub paid: bool,
    pub start_date: String,
    pub end_date: String,
}

/// One course of a student, as shown to admins managing payments
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StudentCourse {
    pub course_id: i64,
    pub name: String,
    pub paid: bool,
    pub paid_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentUpdate {
    pub user_id: i64,
    pub course_id: i64,
    pub paid: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentReport {
    pub updated: usize,
    /// Entries that matched no enrollment
    pub unmatched: Vec<PaymentUpdate>,
}

pub async fn find_enrollment(
    db: &SqlitePool,
    user_id: i64,
    course_id: i64,
) -> Result<Option<Enrollment>, sqlx::Error> {
    sqlx::query_as::<_, Enrollment>(
        "SELECT * FROM enrolled_courses WHERE user_id = ? AND course_id = ?",
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_optional(db)
    .await
}

/// Enroll a user for `months` starting now. A second enrollment for the
/// same pair is a conflict; the unique index backs this up under races.
pub async fn enroll(
    db: &SqlitePool,
    user_id: i64,
    course_id: i64,
    months: u32,
) -> Result<Enrollment, StoreError> {
    if find_enrollment(db, user_id, course_id).await?.is_some() {
        return Err(StoreError::conflict("Student already enrolled"));
    }
    if find_course(db, course_id).await?.is_none() {
        return Err(StoreError::not_found("Course not found"));
    }
    if find_user_by_id(db, user_id).await?.is_none() {
        return Err(StoreError::not_found("Student not found"));
    }

    let start = chrono::Utc::now();
    let end = start
        .checked_add_months(Months::new(months))
        .ok_or_else(|| StoreError::invalid("Invalid course duration"))?;

    let enrollment = sqlx::query_as::<_, Enrollment>(
        r#"
        INSERT INTO enrolled_courses (user_id, course_id, start_date, end_date, paid)
        VALUES (?, ?, ?, ?, 0)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(course_id)
    .bind(start.to_rfc3339())
    .bind(end.to_rfc3339())
    .fetch_one(db)
    .await?;

    tracing::info!(user_id, course_id, months, "Student enrolled");
    Ok(enrollment)
}

pub async fn remove_enrollment(
    db: &SqlitePool,
    course_id: i64,
    user_id: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM enrolled_courses WHERE course_id = ? AND user_id = ?")
        .bind(course_id)
        .bind(user_id)
        .execute(db)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn list_participants(
    db: &SqlitePool,
    course_id: i64,
) -> Result<Vec<Participant>, sqlx::Error> {
    sqlx::query_as::<_, Participant>(
        r#"
        SELECT u.id, u.first_name, u.last_name, u.email, u.avatar,
               e.paid, e.start_date, e.end_date
        FROM users u
        JOIN enrolled_courses e ON e.user_id = u.id
        WHERE e.course_id = ?
        ORDER BY u.last_name, u.first_name, u.id
        "#,
    )
    .bind(course_id)
    .fetch_all(db)
    .await
}

pub async fn list_student_courses(
    db: &SqlitePool,
    user_id: i64,
) -> Result<Vec<StudentCourse>, sqlx::Error> {
    sqlx::query_as::<_, StudentCourse>(
        r#"
        SELECT e.course_id, c.name, e.paid, e.paid_date
        FROM enrolled_courses e
        JOIN courses c ON c.id = e.course_id
        WHERE e.user_id = ?
        ORDER BY e.id
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await
}

/// Apply a batch of payment flags in one transaction. Either every matched
/// row is updated or none is; entries without an enrollment are reported.
pub async fn update_payments(
    db: &SqlitePool,
    updates: &[PaymentUpdate],
) -> Result<PaymentReport, sqlx::Error> {
    let mut tx = db.begin().await?;
    let mut report = PaymentReport {
        updated: 0,
        unmatched: Vec::new(),
    };

    for update in updates {
        let paid_date = update.paid.then(now_rfc3339);
        let result = sqlx::query(
            "UPDATE enrolled_courses SET paid = ?, paid_date = ? WHERE user_id = ? AND course_id = ?",
        )
        .bind(update.paid)
        .bind(paid_date)
        .bind(update.user_id)
        .bind(update.course_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            report.unmatched.push(update.clone());
        } else {
            report.updated += 1;
        }
    }

    tx.commit().await?;

    tracing::info!(
        updated = report.updated,
        unmatched = report.unmatched.len(),
        "Payment statuses updated"
    );
    Ok(report)
}
