use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqliteExecutor};
use time::OffsetDateTime;

use crate::app::domain::{OrganizationId, OrganizationStatus, OrganizationType};

const COLUMNS: &str = "id, slug, name, organization_type, parent_id, hierarchy_path, path_key, hierarchy_level, status, created_at, updated_at";

/// Database row for organizations table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Organization {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub organization_type: OrganizationType,
    pub parent_id: Option<String>,
    /// Ancestor slugs, root first. Empty for a root.
    pub hierarchy_path: Vec<String>,
    pub hierarchy_level: i64,
    pub status: OrganizationStatus,
    pub created_at: i64,
    pub updated_at: i64,
    /// Derived prefix key, see `path_key`.
    #[serde(skip)]
    pub path_key: String,
}

impl Organization {
    pub fn is_active(&self) -> bool {
        self.status == OrganizationStatus::Active
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// True when `other` sits strictly below this organization.
    pub fn is_ancestor_of(&self, other: &Organization) -> bool {
        other.path_key.len() > self.path_key.len() && other.path_key.starts_with(&self.path_key)
    }

    /// Slug of the root of this organization's tree.
    pub fn root_slug(&self) -> &str {
        self.hierarchy_path.first().map(String::as_str).unwrap_or(&self.slug)
    }
}

fn decode_error(
    column: &str,
    source: impl std::error::Error + Send + Sync + 'static,
) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(source),
    }
}

impl<'r> FromRow<'r, SqliteRow> for Organization {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let path_json: String = row.try_get("hierarchy_path")?;
        let hierarchy_path: Vec<String> =
            serde_json::from_str(&path_json).map_err(|e| decode_error("hierarchy_path", e))?;
        let organization_type: String = row.try_get("organization_type")?;
        let status: String = row.try_get("status")?;

        Ok(Self {
            id: row.try_get("id")?,
            slug: row.try_get("slug")?,
            name: row.try_get("name")?,
            organization_type: organization_type
                .parse()
                .map_err(|e| decode_error("organization_type", e))?,
            parent_id: row.try_get("parent_id")?,
            hierarchy_path,
            hierarchy_level: row.try_get("hierarchy_level")?,
            status: status.parse().map_err(|e| decode_error("status", e))?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            path_key: row.try_get("path_key")?,
        })
    }
}

/// Prefix key of a node: `/` + ancestor slugs + own slug, joined and closed by `/`.
pub fn path_key(hierarchy_path: &[String], slug: &str) -> String {
    let mut key = String::from("/");
    for segment in hierarchy_path.iter().map(String::as_str).chain(std::iter::once(slug)) {
        key.push_str(segment);
        key.push('/');
    }
    key
}

/// Exclusive upper bound of the subtree range starting at `key`.
/// `'0'` is the byte right after `'/'`, so every key extending `key` sorts below it.
pub fn subtree_upper_bound(key: &str) -> String {
    let stem = key.strip_suffix('/').unwrap_or(key);
    format!("{stem}0")
}

/// Data structure for inserting a new organization. Path fields are computed
/// by the hierarchy layer.
pub struct NewOrganization {
    pub id: OrganizationId,
    pub slug: String,
    pub name: String,
    pub organization_type: OrganizationType,
    pub parent_id: Option<OrganizationId>,
    pub hierarchy_path: Vec<String>,
}

/// Insert a new organization.
pub async fn insert<'e, E>(executor: E, organization: &NewOrganization) -> Result<(), sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let path_json = serde_json::to_string(&organization.hierarchy_path)
        .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
    sqlx::query(
        "INSERT INTO organizations (id, slug, name, organization_type, parent_id, hierarchy_path, path_key, hierarchy_level, status, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'active', ?, ?)",
    )
    .bind(organization.id.as_str())
    .bind(&organization.slug)
    .bind(&organization.name)
    .bind(organization.organization_type.to_string())
    .bind(organization.parent_id.as_ref().map(|id| id.as_str()))
    .bind(path_json)
    .bind(path_key(&organization.hierarchy_path, &organization.slug))
    .bind(organization.hierarchy_path.len() as i64)
    .bind(now)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}

/// Find an organization by ID, whatever its status.
pub async fn find_by_id<'e, E>(
    executor: E,
    organization_id: &OrganizationId,
) -> Result<Option<Organization>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, Organization>(&format!("SELECT {COLUMNS} FROM organizations WHERE id = ?"))
        .bind(organization_id.as_str())
        .fetch_optional(executor)
        .await
}

/// Find an organization by slug, whatever its status.
pub async fn find_by_slug<'e, E>(executor: E, slug: &str) -> Result<Option<Organization>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, Organization>(&format!("SELECT {COLUMNS} FROM organizations WHERE slug = ?"))
        .bind(slug)
        .fetch_optional(executor)
        .await
}

/// Find organizations by slug, ordered root first.
pub async fn find_by_slugs<'e, E>(executor: E, slugs: &[String]) -> Result<Vec<Organization>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    if slugs.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; slugs.len()].join(", ");
    let sql = format!(
        "SELECT {COLUMNS} FROM organizations WHERE slug IN ({placeholders}) ORDER BY hierarchy_level, name"
    );
    let mut query = sqlx::query_as::<_, Organization>(&sql);
    for slug in slugs {
        query = query.bind(slug);
    }
    query.fetch_all(executor).await
}

/// Active organizations strictly below the node with `path_key`, ordered by
/// level then name. Uses the `path_key` index as a range scan.
pub async fn find_descendants<'e, E>(executor: E, path_key: &str) -> Result<Vec<Organization>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, Organization>(&format!(
        "SELECT {COLUMNS} FROM organizations \
         WHERE path_key > ? AND path_key < ? AND status = 'active' \
         ORDER BY hierarchy_level, name"
    ))
    .bind(path_key)
    .bind(subtree_upper_bound(path_key))
    .fetch_all(executor)
    .await
}

/// Every organization (any status) strictly below the node with `path_key`.
/// Used when rewriting paths, where archived rows must move too.
pub async fn find_all_descendants<'e, E>(
    executor: E,
    path_key: &str,
) -> Result<Vec<Organization>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, Organization>(&format!(
        "SELECT {COLUMNS} FROM organizations WHERE path_key > ? AND path_key < ? \
         ORDER BY hierarchy_level, name"
    ))
    .bind(path_key)
    .bind(subtree_upper_bound(path_key))
    .fetch_all(executor)
    .await
}

/// Direct children, ordered by name. Archived children only with `include_inactive`.
pub async fn find_children<'e, E>(
    executor: E,
    parent_id: &OrganizationId,
    include_inactive: bool,
) -> Result<Vec<Organization>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, Organization>(&format!(
        "SELECT {COLUMNS} FROM organizations WHERE parent_id = ? AND (? OR status = 'active') ORDER BY name"
    ))
    .bind(parent_id.as_str())
    .bind(include_inactive)
    .fetch_all(executor)
    .await
}

/// Active organizations without a parent, oldest first.
pub async fn find_roots<'e, E>(executor: E) -> Result<Vec<Organization>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, Organization>(&format!(
        "SELECT {COLUMNS} FROM organizations WHERE parent_id IS NULL AND status = 'active' ORDER BY created_at, name"
    ))
    .fetch_all(executor)
    .await
}

/// Every organization, for whole-tree consistency checks.
pub async fn list_all<'e, E>(executor: E) -> Result<Vec<Organization>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, Organization>(&format!(
        "SELECT {COLUMNS} FROM organizations ORDER BY hierarchy_level, name"
    ))
    .fetch_all(executor)
    .await
}

/// Count active direct children.
pub async fn count_active_children<'e, E>(
    executor: E,
    parent_id: &OrganizationId,
) -> Result<i64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_scalar("SELECT count(*) FROM organizations WHERE parent_id = ? AND status = 'active'")
        .bind(parent_id.as_str())
        .fetch_one(executor)
        .await
}

/// Rewrite the position of one node in the tree.
pub async fn update_position<'e, E>(
    executor: E,
    organization_id: &str,
    parent_id: Option<&str>,
    hierarchy_path: &[String],
    path_key: &str,
) -> Result<u64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let path_json =
        serde_json::to_string(hierarchy_path).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
    let result = sqlx::query(
        "UPDATE organizations SET parent_id = ?, hierarchy_path = ?, path_key = ?, hierarchy_level = ?, updated_at = ? WHERE id = ?",
    )
    .bind(parent_id)
    .bind(path_json)
    .bind(path_key)
    .bind(hierarchy_path.len() as i64)
    .bind(now)
    .bind(organization_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// Take the database write lock without changing any row. Must be the first
/// statement of its transaction: SQLite only waits on the busy timeout for a
/// write lock when no read snapshot is held yet.
pub async fn lock_for_write<'e, E>(executor: E, organization_id: &OrganizationId) -> Result<(), sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query("UPDATE organizations SET updated_at = updated_at WHERE id = ?")
        .bind(organization_id.as_str())
        .execute(executor)
        .await?;
    Ok(())
}

/// Change the display name.
pub async fn set_name<'e, E>(
    executor: E,
    organization_id: &OrganizationId,
    name: &str,
) -> Result<u64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let result = sqlx::query("UPDATE organizations SET name = ?, updated_at = ? WHERE id = ?")
        .bind(name)
        .bind(now)
        .bind(organization_id.as_str())
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

/// Change lifecycle status.
pub async fn set_status<'e, E>(
    executor: E,
    organization_id: &OrganizationId,
    status: OrganizationStatus,
) -> Result<u64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let result = sqlx::query("UPDATE organizations SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.to_string())
        .bind(now)
        .bind(organization_id.as_str())
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn path_key_includes_own_slug() {
        assert_eq!(path_key(&[], "clc"), "/clc/");
        assert_eq!(path_key(&path(&["clc", "cupe"]), "cupe-79"), "/clc/cupe/cupe-79/");
    }

    #[test]
    fn subtree_range_excludes_lookalike_slugs() {
        let key = path_key(&path(&["clc"]), "cupe");
        let upper = subtree_upper_bound(&key);
        let inside = path_key(&path(&["clc", "cupe"]), "cupe-79");
        let hyphen_sibling = path_key(&path(&["clc"]), "cupe-x");
        let digit_sibling = path_key(&path(&["clc"]), "cupe0");
        let letter_sibling = path_key(&path(&["clc"]), "cupea");

        assert!(inside.as_str() > key.as_str() && inside < upper);
        for outside in [hyphen_sibling, digit_sibling, letter_sibling] {
            assert!(!(outside.as_str() > key.as_str() && outside < upper), "{outside}");
        }
    }
}
