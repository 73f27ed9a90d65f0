use std::env;

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::app::access::{error::stored_org_id, AccessError};
use crate::app::db::{self, organization_members, organizations, NewUser};
use crate::app::domain::{OrganizationRole, UserId};
use crate::seeds::{Seed, SeedOutcome};

/// Admin of the oldest root organization, for `SEED_ADMIN_EMAIL`.
pub struct DevAdminUser;

#[async_trait]
impl Seed for DevAdminUser {
    fn version(&self) -> i64 {
        20261001130000
    }

    fn description(&self) -> &str {
        "dev_admin_user"
    }

    async fn run(&self, pool: &SqlitePool) -> Result<SeedOutcome, AccessError> {
        let email = match env::var("SEED_ADMIN_EMAIL") {
            Ok(s) if s.contains('@') => s.trim().to_lowercase(),
            _ => return Ok(SeedOutcome::Skipped),
        };
        let Some(root) = organizations::find_roots(pool).await?.into_iter().next() else {
            return Ok(SeedOutcome::Skipped);
        };
        let root_id = stored_org_id(&root.id)?;

        let mut tx = pool.begin().await?;
        let user_id = match db::users::find_by_email(&mut *tx, &email).await? {
            Some(user) => UserId::from_string(&user.id)
                .map_err(|_| AccessError::Validation(format!("user {} has a malformed id", user.id)))?,
            None => {
                let user_id = UserId::new();
                db::users::insert(
                    &mut *tx,
                    &NewUser {
                        id: user_id.clone(),
                        email: email.clone(),
                        display_name: "Development admin".to_string(),
                    },
                )
                .await?;
                user_id
            }
        };
        if organization_members::find_active_role(&mut *tx, &root_id, &user_id)
            .await?
            .is_none()
        {
            organization_members::add_member(&mut *tx, &root_id, &user_id, OrganizationRole::Admin).await?;
        }
        tx.commit().await?;

        tracing::info!(email = %email, organization = %root.slug, "development admin ready");
        Ok(SeedOutcome::Applied)
    }
}
