use serde::Serialize;
use sqlx::{FromRow, SqliteExecutor};
use time::OffsetDateTime;

use crate::app::domain::UserId;

/// Database row for users table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub created_at: i64,
}

/// Data structure for inserting a new user.
pub struct NewUser {
    pub id: UserId,
    pub email: String,
    pub display_name: String,
}

/// Insert a new user.
pub async fn insert<'e, E>(executor: E, user: &NewUser) -> Result<(), sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let now = OffsetDateTime::now_utc().unix_timestamp();
    sqlx::query("INSERT INTO users (id, email, display_name, created_at) VALUES (?, ?, ?, ?)")
        .bind(user.id.as_str())
        .bind(user.email.trim().to_lowercase())
        .bind(&user.display_name)
        .bind(now)
        .execute(executor)
        .await?;
    Ok(())
}

/// Find a user by ID.
pub async fn find_by_id<'e, E>(executor: E, user_id: &UserId) -> Result<Option<User>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, User>("SELECT id, email, display_name, created_at FROM users WHERE id = ?")
        .bind(user_id.as_str())
        .fetch_optional(executor)
        .await
}

/// Find a user by email (case-insensitive; emails are stored lowercased).
pub async fn find_by_email<'e, E>(executor: E, email: &str) -> Result<Option<User>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, User>("SELECT id, email, display_name, created_at FROM users WHERE email = ?")
        .bind(email.trim().to_lowercase())
        .fetch_optional(executor)
        .await
}
