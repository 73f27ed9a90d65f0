//! Session context propagation.
//!
//! **Rule**: tenant-scoped data is only reachable through
//! [`with_session_context`]. It binds the caller's claim into the
//! connection-local session tables of one transaction, hands the operation a
//! [`ScopedRepository`] over that transaction, and clears the tables before
//! the connection goes back to the pool. An error or a dropped future rolls
//! the transaction back, which discards the bound rows with it.

mod records;
mod scoped;

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use sqlx::{Executor, SqliteConnection};

use crate::app::access::{error::stored_org_id, AccessError};
use crate::app::db::{organization_members, organizations, Organization, TenantPool};
use crate::app::domain::{OrganizationId, OrganizationRole, TenantId, UserId};
use crate::app::hierarchy;
use crate::app::rls::Relation;

pub use records::{NewClaimInput, NewDeadlineInput, NewDocumentInput, NewDuesInput};
pub use scoped::{NewGrantInput, ScopedRepository, SharedAccess};

/// Identity claims presented by a request. Any of them may be missing.
#[derive(Debug, Clone, Default)]
pub struct SessionClaims {
    pub user_id: Option<UserId>,
    pub tenant_id: Option<TenantId>,
    pub organization_id: Option<OrganizationId>,
}

/// The claim as bound for one request.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub organization_id: OrganizationId,
    /// `None` when the claim could not be verified; nothing is visible then.
    pub role: Option<OrganizationRole>,
    visible: BTreeMap<OrganizationId, Relation>,
}

impl SessionContext {
    fn unverified(user_id: UserId, tenant_id: TenantId, organization_id: OrganizationId) -> Self {
        Self {
            user_id,
            tenant_id,
            organization_id,
            role: None,
            visible: BTreeMap::new(),
        }
    }

    pub fn is_verified(&self) -> bool {
        self.role.is_some()
    }

    /// How `organization_id` relates to the session organization, if visible.
    pub fn relation_to(&self, organization_id: &OrganizationId) -> Option<Relation> {
        self.visible.get(organization_id).copied()
    }

    pub fn is_visible(&self, organization_id: &OrganizationId) -> bool {
        self.visible.contains_key(organization_id)
    }

    /// Visible organization ids, in id order.
    pub fn visible_organizations(&self) -> impl Iterator<Item = &OrganizationId> {
        self.visible.keys()
    }

    pub(crate) fn admit(&mut self, organization_id: OrganizationId, relation: Relation) {
        self.visible.insert(organization_id, relation);
    }
}

/// Boxed future returned by operations run inside a session context.
pub type ScopedFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, AccessError>> + Send + 'a>>;

/// Run `operation` with the request's claims bound to a single transaction.
///
/// Fails closed: no user is `AuthRequired`, no organization or tenant is
/// `MissingTenantContext`. A claim that does not check out (no active
/// membership, inactive organization, organization outside the tenant)
/// binds an empty context, under which every read returns zero rows and every
/// write is refused.
///
/// The transaction opens with `BEGIN IMMEDIATE`. Binding reads the tree before
/// the operation writes anything, and a deferred transaction that later tries
/// to write from that snapshot gets `SQLITE_BUSY` at once when another
/// connection committed in between. Taking the write lock up front makes
/// concurrent requests wait on the busy timeout instead.
///
/// ```ignore
/// let claims = with_session_context(&pool, claims, |repo| Box::pin(repo.list_claims())).await?;
/// ```
pub async fn with_session_context<T, F>(
    pool: &TenantPool,
    claims: SessionClaims,
    operation: F,
) -> Result<T, AccessError>
where
    T: Send,
    F: for<'a> FnOnce(&'a mut ScopedRepository) -> ScopedFuture<'a, T> + Send,
{
    let user_id = claims.user_id.ok_or(AccessError::AuthRequired)?;
    let (Some(organization_id), Some(tenant_id)) = (claims.organization_id, claims.tenant_id) else {
        return Err(AccessError::MissingTenantContext);
    };

    let mut tx = pool.inner().begin_with("BEGIN IMMEDIATE").await?;
    let context = bind_context(&mut tx, user_id, tenant_id, organization_id).await?;
    let mut repository = ScopedRepository::new(tx, context, pool.reparent_lock());

    match operation(&mut repository).await {
        Ok(value) => {
            repository.finish().await?;
            Ok(value)
        }
        Err(err) => {
            repository.abort().await;
            Err(err)
        }
    }
}

/// Verify the claim and write it, with the derived visible set, into the
/// connection-local session tables.
pub(crate) async fn bind_context(
    conn: &mut SqliteConnection,
    user_id: UserId,
    tenant_id: TenantId,
    organization_id: OrganizationId,
) -> Result<SessionContext, AccessError> {
    // Start from an empty context on this connection.
    clear_context(conn).await?;

    let Some((organization, tenant_root, role)) =
        verify_claim(conn, &user_id, &tenant_id, &organization_id).await?
    else {
        tracing::warn!(
            user_id = %user_id,
            organization_id = %organization_id,
            tenant_id = %tenant_id,
            "unverified session claim; binding empty context"
        );
        return Ok(SessionContext::unverified(user_id, tenant_id, organization_id));
    };

    sqlx::query(
        "INSERT INTO temp.session_context (user_id, tenant_id, organization_id, role_rank) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id.as_str())
    .bind(tenant_id.as_str())
    .bind(organization_id.as_str())
    .bind(role.rank())
    .execute(&mut *conn)
    .await?;

    let mut context = SessionContext {
        user_id,
        tenant_id,
        organization_id: organization_id.clone(),
        role: Some(role),
        visible: BTreeMap::new(),
    };
    context.admit(organization_id, Relation::Own);
    for descendant in organizations::find_descendants(&mut *conn, &organization.path_key).await? {
        context.admit(stored_org_id(&descendant.id)?, Relation::Descendant);
    }
    for ancestor in hierarchy::ancestors_of(conn, &organization).await? {
        if ancestor.id == tenant_root.id || tenant_root.is_ancestor_of(&ancestor) {
            context.admit(stored_org_id(&ancestor.id)?, Relation::Ancestor);
        }
    }

    for (visible_id, relation) in &context.visible {
        insert_visible(conn, visible_id, *relation).await?;
    }

    tracing::debug!(
        user_id = %context.user_id,
        organization_id = %context.organization_id,
        role = %role,
        visible = context.visible.len(),
        "session context bound"
    );
    Ok(context)
}

pub(crate) async fn insert_visible(
    conn: &mut SqliteConnection,
    organization_id: &OrganizationId,
    relation: Relation,
) -> Result<(), AccessError> {
    sqlx::query("INSERT OR IGNORE INTO temp.session_visible_orgs (organization_id, relation) VALUES (?, ?)")
        .bind(organization_id.as_str())
        .bind(relation.as_sql())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// The claimed organization, the tenant root and the member's role, when the
/// claim holds.
async fn verify_claim(
    conn: &mut SqliteConnection,
    user_id: &UserId,
    tenant_id: &TenantId,
    organization_id: &OrganizationId,
) -> Result<Option<(Organization, Organization, OrganizationRole)>, AccessError> {
    let Some(tenant_root) = organizations::find_by_id(&mut *conn, tenant_id.organization_id()).await? else {
        return Ok(None);
    };
    let Some(organization) = organizations::find_by_id(&mut *conn, organization_id).await? else {
        return Ok(None);
    };
    if !tenant_root.is_active() || !organization.is_active() {
        return Ok(None);
    }
    if organization.id != tenant_root.id && !tenant_root.is_ancestor_of(&organization) {
        return Ok(None);
    }
    let Some(role) = organization_members::find_active_role(&mut *conn, organization_id, user_id).await? else {
        return Ok(None);
    };
    Ok(Some((organization, tenant_root, role)))
}

/// Empty both session tables on this connection.
pub(crate) async fn clear_context(conn: &mut SqliteConnection) -> Result<(), AccessError> {
    conn.execute(sqlx::raw_sql("DELETE FROM temp.session_context; DELETE FROM temp.session_visible_orgs;"))
        .await?;
    Ok(())
}
