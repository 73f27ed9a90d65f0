use std::collections::{HashMap, HashSet};

use serde::Serialize;
use sqlx::SqliteConnection;

use crate::app::access::AccessError;
use crate::app::db::{organizations, Organization};
use crate::app::domain::OrganizationId;

use super::get_organization;

/// An organization with its active subtree nested below it.
#[derive(Debug, Clone, Serialize)]
pub struct OrganizationTree {
    #[serde(flatten)]
    pub organization: Organization,
    pub children: Vec<OrganizationTree>,
}

impl OrganizationTree {
    /// Drop every node (and its subtree) for which `keep` is false.
    /// The root is always kept.
    pub fn retain(&mut self, keep: &impl Fn(&Organization) -> bool) {
        self.children.retain(|child| keep(&child.organization));
        for child in &mut self.children {
            child.retain(keep);
        }
    }

    /// Number of nodes in the tree, root included.
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(OrganizationTree::len).sum::<usize>()
    }
}

/// Nested tree under `root_id`, or under the single root when `None`.
///
/// With more than one root and no `root_id` this is an `InvalidOperation`;
/// use [`get_forest`] instead.
pub async fn get_tree(
    conn: &mut SqliteConnection,
    root_id: Option<&OrganizationId>,
) -> Result<OrganizationTree, AccessError> {
    let root = match root_id {
        Some(id) => get_organization(conn, id).await?,
        None => {
            let mut roots = organizations::find_roots(&mut *conn).await?;
            match roots.len() {
                0 => return Err(AccessError::NotFound),
                1 => roots.remove(0),
                n => {
                    return Err(AccessError::InvalidOperation(format!(
                        "{n} root organizations; request a specific root"
                    )))
                }
            }
        }
    };
    let below = organizations::find_all_descendants(&mut *conn, &root.path_key).await?;
    assemble(root, below)
}

/// One tree per active root.
pub async fn get_forest(conn: &mut SqliteConnection) -> Result<Vec<OrganizationTree>, AccessError> {
    let roots = organizations::find_roots(&mut *conn).await?;
    let mut forest = Vec::with_capacity(roots.len());
    for root in roots {
        let below = organizations::find_all_descendants(&mut *conn, &root.path_key).await?;
        forest.push(assemble(root, below)?);
    }
    Ok(forest)
}

/// Nest `below` (every row in the root's path range, any status) under `root`
/// by `parent_id`. Archived nodes are left out along with their subtrees.
///
/// Fails with `CorruptHierarchy` when a node is reached twice (a cycle), when
/// a child's stored path disagrees with its parent's, or when a row in the
/// range cannot be reached from the root through `parent_id`.
pub fn assemble(root: Organization, below: Vec<Organization>) -> Result<OrganizationTree, AccessError> {
    let total = below.len() + 1;
    let mut by_parent: HashMap<String, Vec<Organization>> = HashMap::new();
    for org in below {
        if let Some(parent_id) = org.parent_id.clone() {
            by_parent.entry(parent_id).or_default().push(org);
        }
    }
    for siblings in by_parent.values_mut() {
        siblings.sort_by(|a, b| a.name.cmp(&b.name));
    }

    let mut visited = HashSet::new();
    let tree = build(root, &mut by_parent, &mut visited)?;

    if visited.len() != total {
        let stray: Vec<String> = by_parent.into_values().flatten().map(|org| org.id).collect();
        tracing::error!(?stray, "organizations unreachable from their subtree root");
        return Err(AccessError::CorruptHierarchy(format!(
            "{} organization(s) unreachable from root {}",
            total - visited.len(),
            tree.organization.id
        )));
    }

    Ok(prune_archived(tree))
}

fn build(
    node: Organization,
    by_parent: &mut HashMap<String, Vec<Organization>>,
    visited: &mut HashSet<String>,
) -> Result<OrganizationTree, AccessError> {
    if !visited.insert(node.id.clone()) {
        tracing::error!(organization_id = %node.id, "cycle in organization parent chain");
        return Err(AccessError::CorruptHierarchy(format!(
            "cycle through organization {}",
            node.id
        )));
    }

    let mut children = Vec::new();
    for child in by_parent.remove(&node.id).unwrap_or_default() {
        let consistent = child.hierarchy_path.len() == node.hierarchy_path.len() + 1
            && child.hierarchy_path.starts_with(&node.hierarchy_path)
            && child.hierarchy_path.last() == Some(&node.slug);
        if !consistent {
            tracing::error!(
                organization_id = %child.id,
                parent_id = %node.id,
                "stored path disagrees with parent"
            );
            return Err(AccessError::CorruptHierarchy(format!(
                "organization {} has a path inconsistent with parent {}",
                child.id, node.id
            )));
        }
        children.push(build(child, by_parent, visited)?);
    }

    Ok(OrganizationTree {
        organization: node,
        children,
    })
}

fn prune_archived(mut tree: OrganizationTree) -> OrganizationTree {
    tree.retain(&|org: &Organization| org.is_active());
    tree
}
