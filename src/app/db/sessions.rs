use rand_core::RngCore;
use sqlx::{FromRow, SqliteExecutor};
use time::OffsetDateTime;

use crate::app::domain::{OrganizationId, TenantId, UserId};

/// Database row for sessions table.
#[derive(Debug, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    /// Default organization claim for requests made with this session.
    pub organization_id: Option<String>,
    pub tenant_id: Option<String>,
    pub expires_at: i64,
    pub created_at: i64,
}

/// Generate a high-entropy session token (64 hex chars = 32 bytes).
fn generate_session_id() -> String {
    let mut bytes = [0u8; 32];
    rand_core::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Create a new session for a user. Returns the session ID.
pub async fn create<'e, E>(
    executor: E,
    user_id: &UserId,
    organization_id: Option<&OrganizationId>,
    tenant_id: Option<&TenantId>,
    expires_at: OffsetDateTime,
) -> Result<String, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let session_id = generate_session_id();
    let now = OffsetDateTime::now_utc().unix_timestamp();

    sqlx::query(
        "INSERT INTO sessions (id, user_id, organization_id, tenant_id, expires_at, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&session_id)
    .bind(user_id.as_str())
    .bind(organization_id.map(|id| id.as_str()))
    .bind(tenant_id.map(|id| id.as_str()))
    .bind(expires_at.unix_timestamp())
    .bind(now)
    .execute(executor)
    .await?;

    Ok(session_id)
}

/// Find a valid (non-expired) session by ID.
pub async fn find_valid<'e, E>(executor: E, session_id: &str) -> Result<Option<Session>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let now = OffsetDateTime::now_utc().unix_timestamp();

    sqlx::query_as::<_, Session>(
        "SELECT id, user_id, organization_id, tenant_id, expires_at, created_at FROM sessions WHERE id = ? AND expires_at > ?",
    )
    .bind(session_id)
    .bind(now)
    .fetch_optional(executor)
    .await
}

/// Delete a session.
pub async fn delete<'e, E>(executor: E, session_id: &str) -> Result<(), sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(session_id)
        .execute(executor)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::db::{pool::test_pool, users};

    #[test]
    fn session_ids_are_64_hex_chars() {
        let id = generate_session_id();
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn expired_sessions_are_not_found() {
        let pool = test_pool().await;
        let user_id = UserId::new();
        users::insert(
            pool.pool(),
            &users::NewUser {
                id: user_id.clone(),
                email: "steward@example.com".to_string(),
                display_name: "Steward".to_string(),
            },
        )
        .await
        .unwrap();

        let past = OffsetDateTime::now_utc() - time::Duration::days(1);
        let expired = create(pool.pool(), &user_id, None, None, past).await.unwrap();
        assert!(find_valid(pool.pool(), &expired).await.unwrap().is_none());

        let future = OffsetDateTime::now_utc() + time::Duration::days(1);
        let live = create(pool.pool(), &user_id, None, None, future).await.unwrap();
        let session = find_valid(pool.pool(), &live).await.unwrap().unwrap();
        assert_eq!(session.user_id, user_id.as_str());
    }
}
