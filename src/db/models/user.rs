//! User model, the session snapshot projection and user queries.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::{now_rfc3339, StoreError};
use crate::crypto::hash_password;

/// Closed set of user roles. There is no hierarchy between them: every
/// endpoint names the exact roles it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Student,
    Admin,
    Lead,
    Sales,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Student => "student",
            Role::Admin => "admin",
            Role::Lead => "lead",
            Role::Sales => "sales",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "teacher" => Ok(Role::Teacher),
            "student" => Ok(Role::Student),
            "admin" => Ok(Role::Admin),
            "lead" => Ok(Role::Lead),
            "sales" => Ok(Role::Sales),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub role: Role,
    pub registered: String,
    pub last_login: Option<String>,
    pub avatar: Option<String>,
}

/// Read-only projection of a user that is safe to hand out and to keep in
/// the session. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub registered: String,
    pub last_login: Option<String>,
    pub avatar: Option<String>,
}

impl From<User> for UserSnapshot {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
            registered: user.registered,
            last_login: user.last_login,
            avatar: user.avatar,
        }
    }
}

/// Input for creating a user. `password` is plain text and is hashed by
/// [`create_user`] before anything is written.
#[derive(Debug)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub password: &'a str,
    pub role: Role,
}

pub async fn create_user(db: &SqlitePool, new: &NewUser<'_>) -> Result<User, StoreError> {
    if find_user_by_email(db, new.email).await?.is_some() {
        return Err(StoreError::conflict("A user with this email already exists"));
    }

    let password_hash =
        hash_password(new.password).map_err(|e| StoreError::PasswordHash(e.to_string()))?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (email, first_name, last_name, password_hash, role, registered)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(new.email)
    .bind(new.first_name)
    .bind(new.last_name)
    .bind(&password_hash)
    .bind(new.role)
    .bind(now_rfc3339())
    .fetch_one(db)
    .await?;

    tracing::info!(user_id = user.id, email = %user.email, role = %user.role, "User created");
    Ok(user)
}

pub async fn find_user_by_email(db: &SqlitePool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(db)
        .await
}

pub async fn find_user_by_id(db: &SqlitePool, id: i64) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn list_users_by_role(db: &SqlitePool, role: Role) -> Result<Vec<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE role = ? ORDER BY id")
        .bind(role)
        .fetch_all(db)
        .await
}

/// Replace the stored password hash. Returns `false` if the user is gone.
pub async fn update_password(db: &SqlitePool, id: i64, password: &str) -> Result<bool, StoreError> {
    let password_hash =
        hash_password(password).map_err(|e| StoreError::PasswordHash(e.to_string()))?;

    let result = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
        .bind(&password_hash)
        .bind(id)
        .execute(db)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn update_avatar(db: &SqlitePool, id: i64, filename: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE users SET avatar = ? WHERE id = ?")
        .bind(filename)
        .bind(id)
        .execute(db)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Stamp the last-login time and return the stored value
pub async fn touch_last_login(db: &SqlitePool, id: i64) -> Result<String, sqlx::Error> {
    let now = now_rfc3339();
    sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
        .bind(&now)
        .bind(id)
        .execute(db)
        .await?;
    Ok(now)
}

/// Delete a user. Courses they teach keep existing with no teacher;
/// enrollments and homework go with the user.
pub async fn delete_user(db: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(db)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Ensure the configured bootstrap admin exists, so a fresh install has
/// someone who can register the other users.
pub async fn ensure_admin_user(
    db: &SqlitePool,
    email: &str,
    password: &str,
) -> Result<(), StoreError> {
    if find_user_by_email(db, email).await?.is_some() {
        tracing::debug!(email = %email, "Bootstrap admin already exists");
        return Ok(());
    }

    create_user(
        db,
        &NewUser {
            email,
            first_name: "Admin",
            last_name: "Admin",
            password,
            role: Role::Admin,
        },
    )
    .await?;

    tracing::info!(email = %email, "Created bootstrap admin user");
    Ok(())
}
