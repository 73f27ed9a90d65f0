use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::app::access::AccessError;
use crate::app::db::organizations;
use crate::app::domain::{OrganizationId, OrganizationType, Slug};
use crate::app::hierarchy::{self, CreateOrganization};
use crate::seeds::{Seed, SeedOutcome};

/// (slug, name, type, parent slug). Parents come before their children.
const TREE: &[(&str, &str, OrganizationType, Option<&str>)] = &[
    ("clc", "Canadian Labour Congress", OrganizationType::Congress, None),
    ("ofl", "Ontario Federation of Labour", OrganizationType::Federation, Some("clc")),
    ("cupe", "Canadian Union of Public Employees", OrganizationType::Union, Some("clc")),
    ("opseu", "Ontario Public Service Employees Union", OrganizationType::Union, Some("ofl")),
    ("cupe-79", "CUPE Local 79", OrganizationType::Local, Some("cupe")),
    ("cupe-3903", "CUPE Local 3903", OrganizationType::Local, Some("cupe")),
    ("opseu-562", "OPSEU Local 562", OrganizationType::Local, Some("opseu")),
];

fn slug(raw: &str) -> Result<Slug, AccessError> {
    Slug::new(raw).map_err(|_| AccessError::Validation(format!("invalid seed slug {raw}")))
}

/// Example congress tree. Organizations that already exist are left alone.
pub struct DemoHierarchy;

#[async_trait]
impl Seed for DemoHierarchy {
    fn version(&self) -> i64 {
        20261001120000
    }

    fn description(&self) -> &str {
        "demo_hierarchy"
    }

    async fn run(&self, pool: &SqlitePool) -> Result<SeedOutcome, AccessError> {
        let mut tx = pool.begin().await?;

        for (raw_slug, name, organization_type, parent) in TREE {
            if organizations::find_by_slug(&mut *tx, raw_slug).await?.is_some() {
                continue;
            }
            match parent {
                None => {
                    hierarchy::create_root(&mut tx, slug(raw_slug)?, name, *organization_type).await?;
                }
                Some(parent_slug) => {
                    let parent = hierarchy::get_by_slug(&mut tx, parent_slug).await?;
                    let parent_id = OrganizationId::from_string(&parent.id).map_err(|_| {
                        AccessError::CorruptHierarchy(format!("organization {} has a malformed id", parent.id))
                    })?;
                    hierarchy::create_organization(
                        &mut tx,
                        CreateOrganization {
                            slug: slug(raw_slug)?,
                            name: name.to_string(),
                            organization_type: *organization_type,
                            parent_id,
                        },
                    )
                    .await?;
                }
            }
        }

        tx.commit().await?;
        Ok(SeedOutcome::Applied)
    }
}
