use sqlx::{Connection, SqliteConnection};
use tokio::sync::Mutex;

use crate::app::access::AccessError;
use crate::app::db::{organizations, Organization};
use crate::app::domain::OrganizationId;

use super::get_organization;

/// Move `organization_id` under `new_parent_id` and rewrite the path of the
/// node and of every row below it.
///
/// Runs in its own transaction (a savepoint when `conn` is already inside
/// one), so either every path changes or none does. The SQLite write lock is
/// taken before anything is read: on a fresh connection it is the first
/// statement of the transaction, and request transactions already hold it
/// from `BEGIN IMMEDIATE`, so a second mover waits out the busy timeout
/// instead of failing on a stale read. `lock` is taken after it, never
/// before, so the two locks are always acquired in the same order.
pub async fn recompute_subtree_paths(
    conn: &mut SqliteConnection,
    lock: &Mutex<()>,
    organization_id: &OrganizationId,
    new_parent_id: &OrganizationId,
) -> Result<Organization, AccessError> {
    let mut tx = conn.begin().await?;
    if let Err(err) = organizations::lock_for_write(&mut *tx, organization_id).await {
        if let Err(rollback_err) = tx.rollback().await {
            tracing::error!(%rollback_err, "rollback after failed reparent");
        }
        return Err(err.into());
    }
    let _guard = lock.lock().await;

    match move_subtree(&mut tx, organization_id, new_parent_id).await {
        Ok(moved) => {
            tx.commit().await?;
            Ok(moved)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::error!(%rollback_err, "rollback after failed reparent");
            }
            Err(err)
        }
    }
}

async fn move_subtree(
    conn: &mut SqliteConnection,
    organization_id: &OrganizationId,
    new_parent_id: &OrganizationId,
) -> Result<Organization, AccessError> {
    let node = get_organization(conn, organization_id).await?;
    let parent = get_organization(conn, new_parent_id).await?;

    if !parent.is_active() {
        return Err(AccessError::InvalidOperation(
            "cannot move an organization under an archived parent".to_string(),
        ));
    }
    if parent.id == node.id || node.is_ancestor_of(&parent) {
        tracing::warn!(
            organization_id = %node.id,
            new_parent_id = %parent.id,
            "reparent rejected: new parent is inside the moved subtree"
        );
        return Err(AccessError::CycleDetected);
    }
    if node.is_root() {
        return Err(AccessError::InvalidOperation(
            "a root organization cannot be reparented".to_string(),
        ));
    }
    if !parent.organization_type.can_parent(node.organization_type) {
        return Err(AccessError::InvalidHierarchy(format!(
            "a {} cannot contain a {}",
            parent.organization_type, node.organization_type
        )));
    }
    if node.parent_id.as_deref() == Some(parent.id.as_str()) {
        return Ok(node);
    }

    let subtree = organizations::find_all_descendants(&mut *conn, &node.path_key).await?;

    let mut new_prefix = parent.hierarchy_path.clone();
    new_prefix.push(parent.slug.clone());
    let new_key = organizations::path_key(&new_prefix, &node.slug);
    organizations::update_position(&mut *conn, &node.id, Some(parent.id.as_str()), &new_prefix, &new_key)
        .await?;

    let old_len = node.hierarchy_path.len() + 1;
    let mut moved_prefix = new_prefix.clone();
    moved_prefix.push(node.slug.clone());

    for descendant in &subtree {
        let Some(suffix) = descendant.hierarchy_path.get(old_len..) else {
            return Err(corrupt(descendant, &node));
        };
        if !descendant.hierarchy_path.starts_with(&node.hierarchy_path)
            || descendant.hierarchy_path.get(old_len - 1) != Some(&node.slug)
        {
            return Err(corrupt(descendant, &node));
        }

        let mut path = moved_prefix.clone();
        path.extend_from_slice(suffix);
        let key = organizations::path_key(&path, &descendant.slug);
        let updated = organizations::update_position(
            &mut *conn,
            &descendant.id,
            descendant.parent_id.as_deref(),
            &path,
            &key,
        )
        .await?;
        if updated != 1 {
            return Err(corrupt(descendant, &node));
        }
    }

    tracing::info!(
        organization_id = %node.id,
        new_parent_id = %parent.id,
        descendants = subtree.len(),
        "subtree reparented"
    );
    get_organization(conn, organization_id).await
}

fn corrupt(descendant: &Organization, node: &Organization) -> AccessError {
    tracing::error!(
        organization_id = %descendant.id,
        ancestor_id = %node.id,
        "descendant path does not extend its ancestor's"
    );
    AccessError::CorruptHierarchy(format!(
        "organization {} does not extend the path of {}",
        descendant.id, node.id
    ))
}
