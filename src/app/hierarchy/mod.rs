//! Organization tree queries and mutations over the materialized path.
//!
//! Ancestors come from the node's own `hierarchy_path` (one indexed lookup by
//! slug), descendants from a range scan over `path_key`. Nothing here walks
//! `parent_id` recursively except tree assembly, which only uses it to nest
//! rows the range scan already returned.
//!
//! Archived organizations drop out of the queries below unless the caller
//! passes `include_inactive`. That covers the starting node too: asking for
//! the ancestors of an archived organization is `NotFound`, so descendants and
//! ancestors describe the same tree either way. Active organizations never sit
//! below an archived one.
//!
//! These functions see every organization. Request-serving code reaches them
//! through `tenant::ScopedRepository`, which narrows results to the session's
//! visible set.

pub mod reparent;
pub mod tree;

use std::collections::HashMap;

use sqlx::SqliteConnection;
use validator::Validate;

use crate::app::access::{error::stored_org_id, AccessError};
use crate::app::db::{self, organizations, NewOrganization, Organization};
use crate::app::domain::{OrganizationId, OrganizationStatus, OrganizationType, Slug};

pub use reparent::recompute_subtree_paths;
pub use tree::{get_forest, get_tree, OrganizationTree};

/// Fetch an organization, whatever its status.
pub async fn get_organization(
    conn: &mut SqliteConnection,
    organization_id: &OrganizationId,
) -> Result<Organization, AccessError> {
    organizations::find_by_id(&mut *conn, organization_id)
        .await?
        .ok_or(AccessError::NotFound)
}

pub async fn get_by_slug(conn: &mut SqliteConnection, slug: &str) -> Result<Organization, AccessError> {
    organizations::find_by_slug(&mut *conn, slug)
        .await?
        .ok_or(AccessError::NotFound)
}

/// The node a hierarchy query starts from.
async fn query_start(
    conn: &mut SqliteConnection,
    organization_id: &OrganizationId,
    include_inactive: bool,
) -> Result<Organization, AccessError> {
    let node = get_organization(conn, organization_id).await?;
    if !include_inactive && !node.is_active() {
        return Err(AccessError::NotFound);
    }
    Ok(node)
}

/// Ancestors of `organization_id`, root first. Empty for a root.
pub async fn get_ancestors(
    conn: &mut SqliteConnection,
    organization_id: &OrganizationId,
    include_inactive: bool,
) -> Result<Vec<Organization>, AccessError> {
    let node = query_start(conn, organization_id, include_inactive).await?;
    ancestors_of(conn, &node).await
}

/// Resolve the ancestors named in `node.hierarchy_path`, root first.
pub(crate) async fn ancestors_of(
    conn: &mut SqliteConnection,
    node: &Organization,
) -> Result<Vec<Organization>, AccessError> {
    if node.hierarchy_path.is_empty() {
        return Ok(Vec::new());
    }
    let mut by_slug: HashMap<String, Organization> =
        organizations::find_by_slugs(&mut *conn, &node.hierarchy_path)
            .await?
            .into_iter()
            .map(|org| (org.slug.clone(), org))
            .collect();

    node.hierarchy_path
        .iter()
        .map(|slug| {
            by_slug.remove(slug).ok_or_else(|| {
                tracing::warn!(organization_id = %node.id, slug = %slug, "path names a missing ancestor");
                AccessError::CorruptHierarchy(format!(
                    "organization {} names missing ancestor {slug:?}",
                    node.id
                ))
            })
        })
        .collect()
}

/// Organizations below `organization_id`, ordered by level then name.
pub async fn get_descendants(
    conn: &mut SqliteConnection,
    organization_id: &OrganizationId,
    include_inactive: bool,
) -> Result<Vec<Organization>, AccessError> {
    let node = query_start(conn, organization_id, include_inactive).await?;
    let below = if include_inactive {
        organizations::find_all_descendants(&mut *conn, &node.path_key).await?
    } else {
        organizations::find_descendants(&mut *conn, &node.path_key).await?
    };
    Ok(below)
}

/// Direct children, ordered by name.
pub async fn get_children(
    conn: &mut SqliteConnection,
    organization_id: &OrganizationId,
    include_inactive: bool,
) -> Result<Vec<Organization>, AccessError> {
    let node = query_start(conn, organization_id, include_inactive).await?;
    let parent_id = stored_org_id(&node.id)?;
    Ok(organizations::find_children(&mut *conn, &parent_id, include_inactive).await?)
}

/// Ancestors followed by the node itself.
pub async fn get_path(
    conn: &mut SqliteConnection,
    organization_id: &OrganizationId,
    include_inactive: bool,
) -> Result<Vec<Organization>, AccessError> {
    let node = query_start(conn, organization_id, include_inactive).await?;
    let mut path = ancestors_of(conn, &node).await?;
    path.push(node);
    Ok(path)
}

/// Input for creating an organization below an existing parent.
#[derive(Debug, Clone, Validate)]
pub struct CreateOrganization {
    pub slug: Slug,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub organization_type: OrganizationType,
    pub parent_id: OrganizationId,
}

/// Create an organization under an active parent, enforcing the type rules.
pub async fn create_organization(
    conn: &mut SqliteConnection,
    input: CreateOrganization,
) -> Result<Organization, AccessError> {
    input
        .validate()
        .map_err(|_| AccessError::Validation("name must be 1-255 characters".to_string()))?;

    let parent = get_organization(conn, &input.parent_id).await?;
    if !parent.is_active() {
        return Err(AccessError::InvalidOperation(
            "cannot create an organization under an archived parent".to_string(),
        ));
    }
    if !parent.organization_type.can_parent(input.organization_type) {
        return Err(AccessError::InvalidHierarchy(format!(
            "a {} cannot contain a {}",
            parent.organization_type, input.organization_type
        )));
    }
    if organizations::find_by_slug(&mut *conn, input.slug.as_str()).await?.is_some() {
        return Err(AccessError::Validation(format!("slug {} is already in use", input.slug)));
    }

    let mut hierarchy_path = parent.hierarchy_path.clone();
    hierarchy_path.push(parent.slug.clone());

    let id = OrganizationId::new();
    organizations::insert(
        &mut *conn,
        &NewOrganization {
            id: id.clone(),
            slug: input.slug.as_str().to_string(),
            name: input.name.trim().to_string(),
            organization_type: input.organization_type,
            parent_id: Some(input.parent_id),
            hierarchy_path,
        },
    )
    .await?;

    tracing::info!(organization_id = %id, parent_id = %parent.id, "organization created");
    get_organization(conn, &id).await
}

/// Editable fields that do not affect the organization's place in the tree.
#[derive(Debug, Clone, Validate)]
pub struct UpdateOrganization {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
}

/// Rename an organization. Slug, type and parent stay as they are.
pub async fn update_organization(
    conn: &mut SqliteConnection,
    organization_id: &OrganizationId,
    input: UpdateOrganization,
) -> Result<Organization, AccessError> {
    let name = input.name.trim();
    if input.validate().is_err() || name.is_empty() {
        return Err(AccessError::Validation("name must be 1-255 characters".to_string()));
    }
    let node = get_organization(conn, organization_id).await?;
    if node.name != name {
        organizations::set_name(&mut *conn, organization_id, name).await?;
        tracing::info!(organization_id = %node.id, "organization renamed");
    }
    get_organization(conn, organization_id).await
}

/// Create a root organization. Maintenance tooling only.
pub async fn create_root(
    conn: &mut SqliteConnection,
    slug: Slug,
    name: &str,
    organization_type: OrganizationType,
) -> Result<Organization, AccessError> {
    if organizations::find_by_slug(&mut *conn, slug.as_str()).await?.is_some() {
        return Err(AccessError::Validation(format!("slug {slug} is already in use")));
    }
    let id = OrganizationId::new();
    organizations::insert(
        &mut *conn,
        &NewOrganization {
            id: id.clone(),
            slug: slug.as_str().to_string(),
            name: name.trim().to_string(),
            organization_type,
            parent_id: None,
            hierarchy_path: Vec::new(),
        },
    )
    .await?;
    get_organization(conn, &id).await
}

/// Archive an organization. Refused while it still has active children.
pub async fn archive_organization(
    conn: &mut SqliteConnection,
    organization_id: &OrganizationId,
) -> Result<Organization, AccessError> {
    let node = get_organization(conn, organization_id).await?;
    if !node.is_active() {
        return Ok(node);
    }
    if organizations::count_active_children(&mut *conn, organization_id).await? > 0 {
        return Err(AccessError::InvalidOperation(
            "cannot archive an organization with active children".to_string(),
        ));
    }
    organizations::set_status(&mut *conn, organization_id, OrganizationStatus::Archived).await?;
    tracing::info!(organization_id = %node.id, "organization archived");
    get_organization(conn, organization_id).await
}

/// Full scan of the tree. Returns the ids of organizations whose stored path,
/// level or key disagrees with their parent chain, or whose parent chain loops.
pub async fn verify_hierarchy(conn: &mut SqliteConnection) -> Result<Vec<String>, AccessError> {
    let all = db::organizations::list_all(&mut *conn).await?;
    let by_id: HashMap<&str, &Organization> = all.iter().map(|org| (org.id.as_str(), org)).collect();

    let mut offending = Vec::new();
    for org in &all {
        if !is_consistent(org, &by_id) {
            offending.push(org.id.clone());
        }
    }
    if !offending.is_empty() {
        tracing::warn!(count = offending.len(), ids = ?offending, "hierarchy verification failed");
    }
    Ok(offending)
}

fn is_consistent(org: &Organization, by_id: &HashMap<&str, &Organization>) -> bool {
    let expected_path = match &org.parent_id {
        None => Vec::new(),
        Some(parent_id) => match by_id.get(parent_id.as_str()) {
            Some(parent) => {
                let mut path = parent.hierarchy_path.clone();
                path.push(parent.slug.clone());
                path
            }
            None => return false,
        },
    };
    if org.hierarchy_path != expected_path
        || org.hierarchy_level != expected_path.len() as i64
        || org.path_key != organizations::path_key(&org.hierarchy_path, &org.slug)
    {
        return false;
    }

    // Walk up; a chain longer than the table loops.
    let mut current = org;
    for _ in 0..=by_id.len() {
        match current.parent_id.as_deref() {
            None => return true,
            Some(parent_id) => match by_id.get(parent_id) {
                Some(parent) => current = parent,
                None => return false,
            },
        }
    }
    false
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::app::db::pool::test_pool;

    /// CLC > CUPE > CUPE Local 79, plus OPSEU beside CUPE.
    pub(crate) async fn scenario(conn: &mut SqliteConnection) -> [Organization; 4] {
        let clc = create_root(conn, Slug::new("clc").unwrap(), "CLC", OrganizationType::Congress)
            .await
            .unwrap();
        let cupe = create_organization(
            conn,
            CreateOrganization {
                slug: Slug::new("cupe").unwrap(),
                name: "CUPE".to_string(),
                organization_type: OrganizationType::Union,
                parent_id: OrganizationId::from_string(&clc.id).unwrap(),
            },
        )
        .await
        .unwrap();
        let local = create_organization(
            conn,
            CreateOrganization {
                slug: Slug::new("cupe-79").unwrap(),
                name: "CUPE Local 79".to_string(),
                organization_type: OrganizationType::Local,
                parent_id: OrganizationId::from_string(&cupe.id).unwrap(),
            },
        )
        .await
        .unwrap();
        let opseu = create_organization(
            conn,
            CreateOrganization {
                slug: Slug::new("opseu").unwrap(),
                name: "OPSEU".to_string(),
                organization_type: OrganizationType::Union,
                parent_id: OrganizationId::from_string(&clc.id).unwrap(),
            },
        )
        .await
        .unwrap();
        [clc, cupe, local, opseu]
    }

    fn id(org: &Organization) -> OrganizationId {
        OrganizationId::from_string(&org.id).unwrap()
    }

    #[tokio::test]
    async fn paths_follow_the_parent_chain() {
        let pool = test_pool().await;
        let mut conn = pool.pool().acquire().await.unwrap();
        let conn: &mut SqliteConnection = &mut conn;
        let [clc, cupe, local, _] = scenario(conn).await;

        assert!(clc.hierarchy_path.is_empty());
        assert_eq!(clc.hierarchy_level, 0);
        assert_eq!(cupe.hierarchy_path, vec!["clc"]);
        assert_eq!(local.hierarchy_path, vec!["clc", "cupe"]);
        assert_eq!(local.hierarchy_level, 2);
        assert!(verify_hierarchy(conn).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ancestors_and_descendants_are_dual() {
        let pool = test_pool().await;
        let mut conn = pool.pool().acquire().await.unwrap();
        let conn: &mut SqliteConnection = &mut conn;
        let orgs = scenario(conn).await;

        let ancestors: Vec<String> = get_ancestors(conn, &id(&orgs[2]), false)
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.slug)
            .collect();
        assert_eq!(ancestors, vec!["clc", "cupe"]);

        let descendants: Vec<String> = get_descendants(conn, &id(&orgs[0]), false)
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.slug)
            .collect();
        assert_eq!(descendants, vec!["cupe", "opseu", "cupe-79"]);

        for n in &orgs {
            for m in &orgs {
                let m_below_n = get_descendants(conn, &id(n), false).await.unwrap().iter().any(|d| d.id == m.id);
                let n_above_m = get_ancestors(conn, &id(m), false).await.unwrap().iter().any(|a| a.id == n.id);
                assert_eq!(m_below_n, n_above_m, "{} / {}", n.slug, m.slug);
            }
        }
    }

    #[tokio::test]
    async fn children_and_path() {
        let pool = test_pool().await;
        let mut conn = pool.pool().acquire().await.unwrap();
        let conn: &mut SqliteConnection = &mut conn;
        let [clc, _, local, _] = scenario(conn).await;

        let children: Vec<String> = get_children(conn, &id(&clc), false)
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.slug)
            .collect();
        assert_eq!(children, vec!["cupe", "opseu"]);

        let path: Vec<String> = get_path(conn, &id(&local), false)
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.slug)
            .collect();
        assert_eq!(path, vec!["clc", "cupe", "cupe-79"]);
    }

    #[tokio::test]
    async fn missing_organization_is_not_found() {
        let pool = test_pool().await;
        let mut conn = pool.pool().acquire().await.unwrap();
        let missing = OrganizationId::new();
        assert!(matches!(get_ancestors(&mut conn, &missing, false).await, Err(AccessError::NotFound)));
        assert!(matches!(get_descendants(&mut conn, &missing, false).await, Err(AccessError::NotFound)));
        assert!(matches!(get_by_slug(&mut conn, "nobody").await, Err(AccessError::NotFound)));
    }

    #[tokio::test]
    async fn type_rules_are_enforced_on_create() {
        let pool = test_pool().await;
        let mut conn = pool.pool().acquire().await.unwrap();
        let conn: &mut SqliteConnection = &mut conn;
        let [clc, ..] = scenario(conn).await;

        let result = create_organization(
            conn,
            CreateOrganization {
                slug: Slug::new("stray-local").unwrap(),
                name: "Stray".to_string(),
                organization_type: OrganizationType::Local,
                parent_id: id(&clc),
            },
        )
        .await;
        assert!(matches!(result, Err(AccessError::InvalidHierarchy(_))));
    }

    #[tokio::test]
    async fn archive_requires_no_active_children() {
        let pool = test_pool().await;
        let mut conn = pool.pool().acquire().await.unwrap();
        let conn: &mut SqliteConnection = &mut conn;
        let [_, cupe, local, _] = scenario(conn).await;

        assert!(matches!(
            archive_organization(conn, &id(&cupe)).await,
            Err(AccessError::InvalidOperation(_))
        ));
        let archived = archive_organization(conn, &id(&local)).await.unwrap();
        assert_eq!(archived.status, OrganizationStatus::Archived);
        assert!(get_children(conn, &id(&cupe), false).await.unwrap().is_empty());
        archive_organization(conn, &id(&cupe)).await.unwrap();
    }

    #[tokio::test]
    async fn archived_nodes_need_include_inactive() {
        let pool = test_pool().await;
        let mut conn = pool.pool().acquire().await.unwrap();
        let conn: &mut SqliteConnection = &mut conn;
        let [clc, cupe, local, _] = scenario(conn).await;
        archive_organization(conn, &id(&local)).await.unwrap();

        assert!(matches!(get_ancestors(conn, &id(&local), false).await, Err(AccessError::NotFound)));
        assert!(matches!(get_path(conn, &id(&local), false).await, Err(AccessError::NotFound)));
        assert!(!get_descendants(conn, &id(&clc), false).await.unwrap().iter().any(|o| o.id == local.id));

        let ancestors = get_ancestors(conn, &id(&local), true).await.unwrap();
        assert_eq!(ancestors.iter().map(|o| o.slug.as_str()).collect::<Vec<_>>(), vec!["clc", "cupe"]);
        let below_clc = get_descendants(conn, &id(&clc), true).await.unwrap();
        assert!(below_clc.iter().any(|o| o.id == local.id));
        let children = get_children(conn, &id(&cupe), true).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].status, OrganizationStatus::Archived);
    }

    #[tokio::test]
    async fn rename_keeps_the_tree_in_place() {
        let pool = test_pool().await;
        let mut conn = pool.pool().acquire().await.unwrap();
        let conn: &mut SqliteConnection = &mut conn;
        let [_, cupe, local, _] = scenario(conn).await;

        let renamed = update_organization(
            conn,
            &id(&cupe),
            UpdateOrganization {
                name: "  Canadian Union of Public Employees ".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(renamed.name, "Canadian Union of Public Employees");
        assert_eq!(renamed.slug, cupe.slug);
        assert_eq!(renamed.path_key, cupe.path_key);
        assert_eq!(get_organization(conn, &id(&local)).await.unwrap().hierarchy_path, local.hierarchy_path);

        let long = "x".repeat(256);
        for name in ["", "   ", long.as_str()] {
            let result = update_organization(conn, &id(&cupe), UpdateOrganization { name: name.to_string() }).await;
            assert!(matches!(result, Err(AccessError::Validation(_))), "{name:?}");
        }
        let missing = update_organization(
            conn,
            &OrganizationId::new(),
            UpdateOrganization {
                name: "Ghost".to_string(),
            },
        )
        .await;
        assert!(matches!(missing, Err(AccessError::NotFound)));
        assert!(verify_hierarchy(conn).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn verification_flags_a_tampered_path() {
        let pool = test_pool().await;
        let mut conn = pool.pool().acquire().await.unwrap();
        let conn: &mut SqliteConnection = &mut conn;
        let [_, _, local, _] = scenario(conn).await;

        sqlx::query("UPDATE organizations SET hierarchy_path = '[\"clc\"]' WHERE id = ?")
            .bind(&local.id)
            .execute(&mut *conn)
            .await
            .unwrap();
        assert_eq!(verify_hierarchy(conn).await.unwrap(), vec![local.id]);
    }
}
