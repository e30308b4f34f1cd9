//! Sales leads. A lead is always created together with its sales record.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::{find_course_by_name, now_rfc3339, Sales, StoreError};

/// Channel a lead came in through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum LeadSource {
    Dm,
    Story,
    Wp,
    Ad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum LeadStatus {
    New,
    Answered,
    Awaiting,
    Demo,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Lead {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub date: String,
    pub phone: String,
    #[serde(rename = "igNick")]
    pub ig_nick: String,
    pub source: LeadSource,
    pub status: LeadStatus,
    pub author: String,
    pub course: String,
}

#[derive(Debug, Clone)]
pub struct NewLead {
    pub name: String,
    pub description: String,
    pub date: String,
    pub phone: String,
    pub ig_nick: String,
    pub source: LeadSource,
    pub status: LeadStatus,
    pub author: String,
    pub course: String,
}

/// Create a lead and its sales record. The course is resolved by exact name
/// before anything is written, and both rows commit together.
pub async fn create_lead_with_sales(
    db: &SqlitePool,
    new: &NewLead,
) -> Result<(Lead, Sales), StoreError> {
    let duplicate: Option<i64> = sqlx::query_scalar("SELECT id FROM leads WHERE phone = ?")
        .bind(&new.phone)
        .fetch_optional(db)
        .await?;
    if duplicate.is_some() {
        return Err(StoreError::conflict("Lead with this phone already exists"));
    }

    let course = find_course_by_name(db, &new.course)
        .await?
        .ok_or_else(|| StoreError::not_found("Course not found by provided name"))?;

    let (lead, sales) = insert_lead_with_sales(db, new, course.id).await?;

    tracing::info!(
        lead_id = lead.id,
        sales_id = sales.id,
        course_id = course.id,
        author = %lead.author,
        "Lead and sales record created"
    );
    Ok((lead, sales))
}

/// Both inserts share one transaction; a failed sales insert drops the lead
async fn insert_lead_with_sales(
    db: &SqlitePool,
    new: &NewLead,
    course_id: i64,
) -> Result<(Lead, Sales), StoreError> {
    let mut tx = db.begin().await?;

    let lead = sqlx::query_as::<_, Lead>(
        r#"
        INSERT INTO leads (name, description, date, phone, ig_nick, source, status, author, course)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&new.name)
    .bind(&new.description)
    .bind(&new.date)
    .bind(&new.phone)
    .bind(&new.ig_nick)
    .bind(new.source)
    .bind(new.status)
    .bind(&new.author)
    .bind(&new.course)
    .fetch_one(&mut *tx)
    .await?;

    let sales = sqlx::query_as::<_, Sales>(
        r#"
        INSERT INTO sales (lead_id, group_id, paid, created_at)
        VALUES (?, ?, 0, ?)
        RETURNING *
        "#,
    )
    .bind(lead.id)
    .bind(course_id)
    .bind(now_rfc3339())
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok((lead, sales))
}

pub async fn list_leads(db: &SqlitePool) -> Result<Vec<Lead>, sqlx::Error> {
    sqlx::query_as::<_, Lead>("SELECT * FROM leads ORDER BY id")
        .fetch_all(db)
        .await
}

#[cfg(test)]
pub async fn find_lead(db: &SqlitePool, id: i64) -> Result<Option<Lead>, sqlx::Error> {
    sqlx::query_as::<_, Lead>("SELECT * FROM leads WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await
}

/// Delete a lead; its sales record goes with it
pub async fn delete_lead(db: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM leads WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
pub(crate) fn sample_lead(phone: &str, course: &str) -> NewLead {
    NewLead {
        name: "Jane".to_string(),
        description: "asked about evening groups".to_string(),
        date: "2025-03-01".to_string(),
        phone: phone.to_string(),
        ig_nick: "@jane".to_string(),
        source: LeadSource::Dm,
        status: LeadStatus::New,
        author: "lead@x.com".to_string(),
        course: course.to_string(),
    }
}
