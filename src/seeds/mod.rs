mod demo_hierarchy;
mod dev_admin_user;

use async_trait::async_trait;
use sqlx::SqlitePool;
use time::{Duration, OffsetDateTime};

use crate::app::access::AccessError;
use crate::app::db::{self, organizations};
use crate::app::domain::{OrganizationId, TenantId, UserId};

/// Outcome of running a seed. Skipped seeds are not recorded so they may run again later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    /// Seed executed and made changes; record in _unioneyes_seeds.
    Applied,
    /// Seed chose not to run (e.g. env not set); do not record.
    Skipped,
}

/// A database seed. Seeds run in version order and are tracked for idempotency.
///
/// Seeds run on the maintenance pool: nothing here is subject to session context.
#[async_trait]
pub trait Seed: Send + Sync {
    /// Unique version identifier (timestamp format: YYYYMMDDHHMMSS).
    fn version(&self) -> i64;

    /// Human-readable description of the seed.
    fn description(&self) -> &str;

    /// Execute the seed through the db and hierarchy layers.
    /// Return Skipped when the seed opts out (e.g. missing env); it will not be recorded.
    async fn run(&self, pool: &SqlitePool) -> Result<SeedOutcome, AccessError>;
}

/// All seeds in execution order (sorted by version).
pub fn all_seeds() -> Vec<Box<dyn Seed>> {
    let mut seeds: Vec<Box<dyn Seed>> = vec![
        Box::new(demo_hierarchy::DemoHierarchy),
        Box::new(dev_admin_user::DevAdminUser),
    ];
    seeds.sort_by_key(|s| s.version());
    seeds
}

/// Which already-applied seeds to run again.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub force_all: bool,
    pub force_version: Option<i64>,
}

/// Run all pending seeds. Returns the descriptions of the seeds that applied.
pub async fn run_seeds(pool: &SqlitePool, options: RunOptions) -> Result<Vec<String>, AccessError> {
    ensure_seeds_table(pool).await?;
    let applied = applied_versions(pool).await?;
    let mut ran = Vec::new();

    for seed in all_seeds() {
        let version = seed.version();
        let description = seed.description();
        let already_applied = applied.contains(&version);
        let forced = options.force_all || options.force_version == Some(version);

        if already_applied && !forced {
            tracing::debug!(seed = description, "already applied");
            continue;
        }
        if already_applied {
            forget_seed(pool, version).await?;
        }

        match seed.run(pool).await? {
            SeedOutcome::Applied => {
                record_seed(pool, version, description).await?;
                tracing::info!(seed = description, "seed applied");
                ran.push(description.to_string());
            }
            SeedOutcome::Skipped => {
                tracing::info!(seed = description, "seed skipped");
            }
        }
    }
    Ok(ran)
}

/// Issue a session for the user behind `email`, claiming their first active
/// membership with that organization's root as tenant.
pub async fn issue_session(pool: &SqlitePool, email: &str, ttl_days: i64) -> Result<String, AccessError> {
    let user = db::users::find_by_email(pool, email)
        .await?
        .ok_or(AccessError::NotFound)?;
    let user_id = UserId::from_string(&user.id)
        .map_err(|_| AccessError::CorruptHierarchy(format!("user {} has a malformed id", user.id)))?;

    let membership = db::organization_members::list_active_for_user(pool, &user_id)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AccessError::Validation(format!("{email} has no active membership")))?;
    let organization_id = crate::app::access::error::stored_org_id(&membership.organization_id)?;
    let organization = organizations::find_by_id(pool, &organization_id)
        .await?
        .ok_or(AccessError::NotFound)?;
    let root = organizations::find_by_slug(pool, organization.root_slug())
        .await?
        .ok_or_else(|| AccessError::CorruptHierarchy(format!("root of {} is missing", organization.id)))?;
    let tenant_id = TenantId::from(OrganizationId::from_string(&root.id).map_err(|_| {
        AccessError::CorruptHierarchy(format!("organization {} has a malformed id", root.id))
    })?);

    let expires_at = OffsetDateTime::now_utc() + Duration::days(ttl_days);
    let session_id =
        db::sessions::create(pool, &user_id, Some(&organization_id), Some(&tenant_id), expires_at).await?;
    Ok(session_id)
}

async fn ensure_seeds_table(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _unioneyes_seeds (
            version INTEGER PRIMARY KEY NOT NULL,
            description TEXT NOT NULL,
            installed_on INTEGER NOT NULL DEFAULT (unixepoch()),
            success INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn applied_versions(pool: &SqlitePool) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT version FROM _unioneyes_seeds")
        .fetch_all(pool)
        .await
}

async fn record_seed(pool: &SqlitePool, version: i64, description: &str) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO _unioneyes_seeds (version, description) VALUES (?, ?)")
        .bind(version)
        .bind(description)
        .execute(pool)
        .await?;
    Ok(())
}

async fn forget_seed(pool: &SqlitePool, version: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM _unioneyes_seeds WHERE version = ?")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}
