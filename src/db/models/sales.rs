//! Sales records: the follow-up state of a lead for a resolved course.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::{Course, Lead, LeadSource, LeadStatus, StoreError};

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Sales {
    pub id: i64,
    pub lead_id: i64,
    /// Course the lead was resolved to
    pub group_id: i64,
    pub last_call: Option<String>,
    pub result: Option<String>,
    pub paid: bool,
    pub note: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SalesWithRefs {
    #[serde(flatten)]
    pub sales: Sales,
    pub lead: Lead,
    pub course: Course,
}

#[derive(Debug, FromRow)]
struct SalesJoinRow {
    #[sqlx(flatten)]
    sales: Sales,
    l_name: String,
    l_description: String,
    l_date: String,
    l_phone: String,
    l_ig_nick: String,
    l_source: LeadSource,
    l_status: LeadStatus,
    l_author: String,
    l_course: String,
    c_name: String,
    c_description: String,
    c_preview_image: String,
    c_duration: String,
    c_price: String,
    c_teacher_id: Option<i64>,
}

impl From<SalesJoinRow> for SalesWithRefs {
    fn from(row: SalesJoinRow) -> Self {
        let lead = Lead {
            id: row.sales.lead_id,
            name: row.l_name,
            description: row.l_description,
            date: row.l_date,
            phone: row.l_phone,
            ig_nick: row.l_ig_nick,
            source: row.l_source,
            status: row.l_status,
            author: row.l_author,
            course: row.l_course,
        };
        let course = Course {
            id: row.sales.group_id,
            name: row.c_name,
            description: row.c_description,
            preview_image: row.c_preview_image,
            duration: row.c_duration,
            price: row.c_price,
            teacher_id: row.c_teacher_id,
        };

        Self {
            sales: row.sales,
            lead,
            course,
        }
    }
}

const SALES_JOIN_SELECT: &str = r#"
    SELECT s.id, s.lead_id, s.group_id, s.last_call, s.result, s.paid, s.note, s.created_at,
           l.name AS l_name, l.description AS l_description, l.date AS l_date,
           l.phone AS l_phone, l.ig_nick AS l_ig_nick, l.source AS l_source,
           l.status AS l_status, l.author AS l_author, l.course AS l_course,
           c.name AS c_name, c.description AS c_description, c.preview_image AS c_preview_image,
           c.duration AS c_duration, c.price AS c_price, c.teacher_id AS c_teacher_id
    FROM sales s
    JOIN leads l ON l.id = s.lead_id
    JOIN courses c ON c.id = s.group_id
"#;

/// Fields a sales user may change. Absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesUpdate {
    pub last_call: Option<String>,
    pub result: Option<String>,
    #[serde(alias = "payed")]
    pub paid: Option<bool>,
    pub note: Option<String>,
}

impl SalesUpdate {
    pub fn is_empty(&self) -> bool {
        self.last_call.is_none() && self.result.is_none() && self.paid.is_none() && self.note.is_none()
    }
}

pub async fn list_sales(db: &SqlitePool) -> Result<Vec<SalesWithRefs>, sqlx::Error> {
    let sql = format!("{} ORDER BY s.id", SALES_JOIN_SELECT);
    let rows = sqlx::query_as::<_, SalesJoinRow>(&sql).fetch_all(db).await?;

    Ok(rows.into_iter().map(SalesWithRefs::from).collect())
}

pub async fn find_sales(db: &SqlitePool, id: i64) -> Result<Option<SalesWithRefs>, sqlx::Error> {
    let sql = format!("{} WHERE s.id = ?", SALES_JOIN_SELECT);
    let row = sqlx::query_as::<_, SalesJoinRow>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await?;

    Ok(row.map(SalesWithRefs::from))
}

/// Apply every provided field of `update` in one statement. Returns `None`
/// when no sales record has this id.
pub async fn update_sales(
    db: &SqlitePool,
    id: i64,
    update: &SalesUpdate,
) -> Result<Option<Sales>, StoreError> {
    if update.is_empty() {
        return Err(StoreError::invalid("No fields to update"));
    }

    let sales = sqlx::query_as::<_, Sales>(
        r#"
        UPDATE sales SET
            last_call = COALESCE(?, last_call),
            result = COALESCE(?, result),
            paid = COALESCE(?, paid),
            note = COALESCE(?, note)
        WHERE id = ?
        RETURNING *
        "#,
    )
    .bind(&update.last_call)
    .bind(&update.result)
    .bind(update.paid)
    .bind(&update.note)
    .bind(id)
    .fetch_optional(db)
    .await?;

    if let Some(ref sales) = sales {
        tracing::info!(sales_id = sales.id, paid = sales.paid, "Sales record updated");
    }
    Ok(sales)
}
