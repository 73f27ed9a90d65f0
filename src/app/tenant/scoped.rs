use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use sqlx::{Sqlite, Transaction};
use tokio::sync::Mutex;
use ulid::Ulid;

use crate::app::access::{self, error::stored_org_id, sharing, AccessError};
use crate::app::db::{access_log, organizations, sharing_grants, sharing_grants::SharingGrant, Organization};
use crate::app::domain::{GranteeScope, OrganizationId, OrganizationRole, ResourceClass, SharingLevel};
use crate::app::hierarchy::{self, CreateOrganization, OrganizationTree, UpdateOrganization};
use crate::app::rls::Relation;

use super::{clear_context, insert_visible, SessionContext};

/// Capability over one request transaction with a bound session context.
///
/// Only [`super::with_session_context`] constructs one. Hierarchy results are
/// narrowed to the session's visible set; tenant-scoped rows go through the
/// `db` functions that carry their row policy.
pub struct ScopedRepository {
    pub(super) tx: Transaction<'static, Sqlite>,
    pub(super) context: SessionContext,
    reparent_lock: Arc<Mutex<()>>,
    accessible: Option<BTreeSet<OrganizationId>>,
}

/// How a shared resource was reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "via", rename_all = "snake_case")]
pub enum SharedAccess {
    /// The session organization owns it.
    Owner,
    /// Read through the hierarchy (owner is an ancestor or descendant).
    Hierarchy,
    /// Through an explicit sharing grant.
    Grant { grant_id: String },
}

/// A sharing grant issued by the session organization.
#[derive(Debug, Clone)]
pub struct NewGrantInput {
    pub grantee_scope: GranteeScope,
    pub grantee_org_id: Option<OrganizationId>,
    pub resource_class: ResourceClass,
    pub level: SharingLevel,
    pub expires_at: Option<i64>,
}

impl ScopedRepository {
    pub(super) fn new(
        tx: Transaction<'static, Sqlite>,
        context: SessionContext,
        reparent_lock: Arc<Mutex<()>>,
    ) -> Self {
        Self {
            tx,
            context,
            reparent_lock,
            accessible: None,
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Clear the session tables and commit.
    pub(super) async fn finish(mut self) -> Result<(), AccessError> {
        clear_context(&mut self.tx).await?;
        self.tx.commit().await?;
        Ok(())
    }

    pub(super) async fn abort(self) {
        if let Err(err) = self.tx.rollback().await {
            tracing::error!(%err, "rollback of request transaction failed");
        }
    }

    pub(super) fn role(&self) -> Result<OrganizationRole, AccessError> {
        self.context.role.ok_or(AccessError::AccessDenied)
    }

    fn require_role(&self, min: OrganizationRole) -> Result<OrganizationRole, AccessError> {
        let role = self.role()?;
        if role < min {
            return Err(AccessError::AccessDenied);
        }
        Ok(role)
    }

    fn ensure_visible(&self, organization_id: &OrganizationId) -> Result<(), AccessError> {
        if self.context.is_visible(organization_id) {
            Ok(())
        } else {
            Err(AccessError::NotFound)
        }
    }

    /// The session organization or one of its descendants.
    fn ensure_writable(&self, organization_id: &OrganizationId) -> Result<(), AccessError> {
        match self.context.relation_to(organization_id) {
            Some(Relation::Own | Relation::Descendant) => Ok(()),
            Some(Relation::Ancestor) => Err(AccessError::AccessDenied),
            None => Err(AccessError::NotFound),
        }
    }

    fn visible_only(&self, orgs: Vec<Organization>) -> Vec<Organization> {
        orgs.into_iter().filter(|org| self.is_visible_row(org)).collect()
    }

    fn is_visible_row(&self, org: &Organization) -> bool {
        OrganizationId::from_string(&org.id)
            .map(|id| self.context.is_visible(&id))
            .unwrap_or(false)
    }

    /// The session organization, when the claim was verified. Archived
    /// organizations below it are reachable by queries that ask for them.
    async fn archived_scope(&mut self, include_inactive: bool) -> Result<Option<Organization>, AccessError> {
        if !include_inactive || !self.context.is_verified() {
            return Ok(None);
        }
        let own = hierarchy::get_organization(&mut self.tx, &self.context.organization_id).await?;
        Ok(Some(own))
    }

    /// Visible, or archived inside the session's own branch.
    fn reachable(&self, org: &Organization, archived_scope: Option<&Organization>) -> bool {
        self.is_visible_row(org)
            || archived_scope.is_some_and(|own| !org.is_active() && own.is_ancestor_of(org))
    }

    async fn ensure_reachable(
        &mut self,
        organization_id: &OrganizationId,
        include_inactive: bool,
    ) -> Result<Option<Organization>, AccessError> {
        let scope = self.archived_scope(include_inactive).await?;
        if self.context.is_visible(organization_id) {
            return Ok(scope);
        }
        if scope.is_some() {
            let target = organizations::find_by_id(&mut *self.tx, organization_id).await?;
            if target.is_some_and(|org| self.reachable(&org, scope.as_ref())) {
                return Ok(scope);
            }
        }
        Err(AccessError::NotFound)
    }

    fn reachable_only(&self, orgs: Vec<Organization>, scope: Option<&Organization>) -> Vec<Organization> {
        orgs.into_iter().filter(|org| self.reachable(org, scope)).collect()
    }

    // Hierarchy views

    pub async fn organization(&mut self, organization_id: &OrganizationId) -> Result<Organization, AccessError> {
        self.ensure_visible(organization_id)?;
        hierarchy::get_organization(&mut self.tx, organization_id).await
    }

    pub async fn organization_by_slug(&mut self, slug: &str) -> Result<Organization, AccessError> {
        let org = hierarchy::get_by_slug(&mut self.tx, slug).await?;
        self.ensure_visible(&stored_org_id(&org.id)?)?;
        Ok(org)
    }

    pub async fn ancestors(
        &mut self,
        organization_id: &OrganizationId,
        include_inactive: bool,
    ) -> Result<Vec<Organization>, AccessError> {
        let scope = self.ensure_reachable(organization_id, include_inactive).await?;
        let ancestors = hierarchy::get_ancestors(&mut self.tx, organization_id, include_inactive).await?;
        Ok(self.reachable_only(ancestors, scope.as_ref()))
    }

    pub async fn descendants(
        &mut self,
        organization_id: &OrganizationId,
        include_inactive: bool,
    ) -> Result<Vec<Organization>, AccessError> {
        let scope = self.ensure_reachable(organization_id, include_inactive).await?;
        let descendants = hierarchy::get_descendants(&mut self.tx, organization_id, include_inactive).await?;
        Ok(self.reachable_only(descendants, scope.as_ref()))
    }

    pub async fn children(
        &mut self,
        organization_id: &OrganizationId,
        include_inactive: bool,
    ) -> Result<Vec<Organization>, AccessError> {
        let scope = self.ensure_reachable(organization_id, include_inactive).await?;
        let children = hierarchy::get_children(&mut self.tx, organization_id, include_inactive).await?;
        Ok(self.reachable_only(children, scope.as_ref()))
    }

    pub async fn path(
        &mut self,
        organization_id: &OrganizationId,
        include_inactive: bool,
    ) -> Result<Vec<Organization>, AccessError> {
        let scope = self.ensure_reachable(organization_id, include_inactive).await?;
        let path = hierarchy::get_path(&mut self.tx, organization_id, include_inactive).await?;
        Ok(self.reachable_only(path, scope.as_ref()))
    }

    /// Tree under `root_id`, or under the tenant root, cut down to the visible set.
    pub async fn tree(&mut self, root_id: Option<&OrganizationId>) -> Result<OrganizationTree, AccessError> {
        let root_id = root_id
            .cloned()
            .unwrap_or_else(|| self.context.tenant_id.organization_id().clone());
        self.ensure_visible(&root_id)?;
        let mut tree = hierarchy::get_tree(&mut self.tx, Some(&root_id)).await?;
        tree.retain(&|org: &Organization| self.is_visible_row(org));
        Ok(tree)
    }

    // Organization management (admins)

    pub async fn create_organization(&mut self, input: CreateOrganization) -> Result<Organization, AccessError> {
        self.require_role(OrganizationRole::Admin)?;
        self.ensure_writable(&input.parent_id)?;
        let org = hierarchy::create_organization(&mut self.tx, input).await?;
        let org_id = stored_org_id(&org.id)?;
        insert_visible(&mut self.tx, &org_id, Relation::Descendant).await?;
        self.context.admit(org_id, Relation::Descendant);
        Ok(org)
    }

    /// Rename an organization in the session's branch.
    pub async fn update_organization(
        &mut self,
        organization_id: &OrganizationId,
        input: UpdateOrganization,
    ) -> Result<Organization, AccessError> {
        self.require_role(OrganizationRole::Admin)?;
        self.ensure_writable(organization_id)?;
        hierarchy::update_organization(&mut self.tx, organization_id, input).await
    }

    pub async fn reparent_organization(
        &mut self,
        organization_id: &OrganizationId,
        new_parent_id: &OrganizationId,
    ) -> Result<Organization, AccessError> {
        self.require_role(OrganizationRole::Admin)?;
        self.ensure_writable(organization_id)?;
        self.ensure_writable(new_parent_id)?;
        hierarchy::recompute_subtree_paths(&mut self.tx, &self.reparent_lock, organization_id, new_parent_id).await
    }

    pub async fn archive_organization(&mut self, organization_id: &OrganizationId) -> Result<Organization, AccessError> {
        self.require_role(OrganizationRole::Admin)?;
        self.ensure_writable(organization_id)?;
        hierarchy::archive_organization(&mut self.tx, organization_id).await
    }

    // Sharing

    /// Issue a grant owned by the session organization. Officers may share at
    /// `read`, admins up to `manage`.
    pub async fn create_grant(&mut self, input: NewGrantInput) -> Result<SharingGrant, AccessError> {
        let role = self.role()?;
        let cap = sharing::max_grantable_level(role).ok_or(AccessError::AccessDenied)?;
        if input.level > cap {
            return Err(AccessError::AccessDenied);
        }

        match (input.grantee_scope, &input.grantee_org_id) {
            (GranteeScope::Organization, Some(grantee)) => {
                let exists = organizations::find_by_id(&mut *self.tx, grantee)
                    .await?
                    .is_some_and(|org| org.is_active());
                if !exists {
                    return Err(AccessError::Validation("unknown grantee organization".to_string()));
                }
            }
            (GranteeScope::Organization, None) => {
                return Err(AccessError::Validation(
                    "an organization grant needs a grantee organization".to_string(),
                ))
            }
            (_, Some(_)) => {
                return Err(AccessError::Validation(
                    "only organization grants name a grantee organization".to_string(),
                ))
            }
            (_, None) => {}
        }
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        if input.expires_at.is_some_and(|at| at <= now) {
            return Err(AccessError::Validation("expiry must be in the future".to_string()));
        }

        let id = Ulid::new().to_string();
        sharing_grants::insert(
            &mut *self.tx,
            &sharing_grants::NewSharingGrant {
                id: id.clone(),
                owner_org_id: self.context.organization_id.clone(),
                grantee_scope: input.grantee_scope,
                grantee_org_id: input.grantee_org_id,
                resource_class: input.resource_class,
                level: input.level,
                granted_by: self.context.user_id.clone(),
                expires_at: input.expires_at,
            },
        )
        .await?;

        tracing::info!(
            grant_id = %id,
            owner_org_id = %self.context.organization_id,
            scope = %input.grantee_scope,
            level = %input.level,
            "sharing grant issued"
        );
        self.accessible = None;
        sharing_grants::find_by_id(&mut *self.tx, &id)
            .await?
            .ok_or(AccessError::NotFound)
    }

    /// Revoke a grant owned by the session organization. Revoking twice is a no-op.
    pub async fn revoke_grant(&mut self, grant_id: &str) -> Result<SharingGrant, AccessError> {
        let role = self.role()?;
        let cap = sharing::max_grantable_level(role).ok_or(AccessError::AccessDenied)?;
        let grant = sharing_grants::find_by_id(&mut *self.tx, grant_id)
            .await?
            .filter(|grant| grant.owner_org_id == self.context.organization_id.as_str())
            .ok_or(AccessError::NotFound)?;
        if grant.level > cap {
            return Err(AccessError::AccessDenied);
        }
        if grant.revoked_at.is_some() {
            return Ok(grant);
        }

        sharing_grants::revoke(&mut *self.tx, grant_id).await?;
        tracing::info!(grant_id = %grant_id, owner_org_id = %grant.owner_org_id, "sharing grant revoked");
        self.accessible = None;
        sharing_grants::find_by_id(&mut *self.tx, grant_id)
            .await?
            .ok_or(AccessError::NotFound)
    }

    /// Whether a grant from `owner_id` lets the session organization use
    /// `resource_class` at `level`.
    pub async fn check_sharing(
        &mut self,
        owner_id: &OrganizationId,
        resource_class: ResourceClass,
        level: SharingLevel,
    ) -> Result<bool, AccessError> {
        if !self.context.is_verified() {
            return Ok(false);
        }
        access::validate_sharing_level(&mut self.tx, &self.context.organization_id, owner_id, resource_class, level)
            .await
    }

    /// Decide how the session may reach a resource owned by `owner_id`:
    /// ownership, hierarchy (read only) or a sharing grant. Grant-based access
    /// is written to the cross-organization access log.
    pub async fn access_shared_resource(
        &mut self,
        owner_id: &OrganizationId,
        resource_class: ResourceClass,
        resource_id: &str,
        level: SharingLevel,
    ) -> Result<SharedAccess, AccessError> {
        self.role()?;
        if owner_id == &self.context.organization_id {
            return Ok(SharedAccess::Owner);
        }
        if level == SharingLevel::Read && self.context.is_visible(owner_id) {
            return Ok(SharedAccess::Hierarchy);
        }

        let grant = sharing::find_covering_grant(
            &mut self.tx,
            &self.context.organization_id,
            owner_id,
            resource_class,
            level,
        )
        .await?
        .ok_or(AccessError::AccessDenied)?;

        access_log::record(
            &mut *self.tx,
            &access_log::NewAccessLogEntry {
                user_id: &self.context.user_id,
                requestor_org_id: &self.context.organization_id,
                owner_org_id: owner_id,
                resource_class,
                resource_id,
                level,
                via_grant_id: Some(&grant.id),
            },
        )
        .await?;
        tracing::info!(
            user_id = %self.context.user_id,
            requestor_org_id = %self.context.organization_id,
            owner_org_id = %owner_id,
            resource_class = %resource_class,
            resource_id,
            grant_id = %grant.id,
            "cross-organization access via sharing grant"
        );
        Ok(SharedAccess::Grant { grant_id: grant.id })
    }

    /// Organizations the session user may query against. Computed once per
    /// request.
    pub async fn accessible_organizations(&mut self) -> Result<&BTreeSet<OrganizationId>, AccessError> {
        if self.accessible.is_none() {
            let set = access::get_accessible_organizations(&mut self.tx, &self.context.user_id).await?;
            self.accessible = Some(set);
        }
        Ok(self.accessible.get_or_insert_with(BTreeSet::new))
    }
}
