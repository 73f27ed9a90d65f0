//! Tenant-scoped business rows.
//!
//! The row policy is part of every statement in the `db` modules used here,
//! so nothing below filters by organization itself. A write that matches no
//! row is resolved into `NotFound` (row not visible) or `AccessDenied`
//! (visible, but the role is too low).

use ulid::Ulid;

use crate::app::access::AccessError;
use crate::app::db::{claims, deadlines, documents, dues_transactions};
use crate::app::domain::{DuesStatus, OrganizationId, Priority, UserId};
use crate::app::rls::CLAIMS;

use super::ScopedRepository;

#[derive(Debug, Clone)]
pub struct NewClaimInput {
    /// Defaults to the session organization.
    pub organization_id: Option<OrganizationId>,
    pub title: String,
    pub description: String,
    pub priority: Priority,
}

#[derive(Debug, Clone)]
pub struct NewDeadlineInput {
    pub title: String,
    pub due_at: i64,
    pub priority: Priority,
}

#[derive(Debug, Clone)]
pub struct NewDuesInput {
    pub member_user_id: UserId,
    pub amount_cents: i64,
}

#[derive(Debug, Clone)]
pub struct NewDocumentInput {
    pub title: String,
    pub storage_key: String,
}

impl ScopedRepository {
    // Claims

    pub async fn list_claims(&mut self) -> Result<Vec<claims::Claim>, AccessError> {
        Ok(claims::list_visible(&mut *self.tx).await?)
    }

    pub async fn find_claim(&mut self, claim_id: &str) -> Result<claims::Claim, AccessError> {
        claims::find_visible(&mut *self.tx, claim_id)
            .await?
            .ok_or(AccessError::NotFound)
    }

    pub async fn create_claim(&mut self, input: NewClaimInput) -> Result<claims::Claim, AccessError> {
        let id = Ulid::new().to_string();
        let organization_id = input
            .organization_id
            .unwrap_or_else(|| self.context.organization_id.clone());
        let inserted = claims::insert(
            &mut *self.tx,
            &claims::NewClaim {
                id: id.clone(),
                organization_id,
                title: input.title,
                description: input.description,
                priority: input.priority,
                created_by: self.context.user_id.clone(),
            },
        )
        .await?;
        if inserted == 0 {
            return Err(AccessError::AccessDenied);
        }
        self.find_claim(&id).await
    }

    pub async fn update_claim(
        &mut self,
        claim_id: &str,
        changes: &claims::ClaimChanges,
    ) -> Result<claims::Claim, AccessError> {
        if claims::update(&mut *self.tx, claim_id, changes).await? == 0 {
            return Err(self.unmatched_claim(claim_id).await);
        }
        self.find_claim(claim_id).await
    }

    pub async fn delete_claim(&mut self, claim_id: &str) -> Result<(), AccessError> {
        if claims::delete(&mut *self.tx, claim_id).await? == 0 {
            return Err(self.unmatched_claim(claim_id).await);
        }
        tracing::info!(claim_id, user_id = %self.context.user_id, "claim deleted");
        Ok(())
    }

    async fn unmatched_claim(&mut self, claim_id: &str) -> AccessError {
        match claims::find_visible(&mut *self.tx, claim_id).await {
            Ok(Some(_)) => AccessError::AccessDenied,
            Ok(None) => AccessError::NotFound,
            Err(err) => err.into(),
        }
    }

    /// Claim counts per organization and status across the session subtree.
    pub async fn claims_rollup(&mut self) -> Result<Vec<claims::ClaimRollup>, AccessError> {
        if CLAIMS.aggregate_predicate().is_none() {
            return Err(AccessError::AccessDenied);
        }
        Ok(claims::rollup(&mut *self.tx).await?)
    }

    // Deadlines

    pub async fn list_deadlines(&mut self) -> Result<Vec<deadlines::Deadline>, AccessError> {
        Ok(deadlines::list_visible(&mut *self.tx).await?)
    }

    pub async fn create_deadline(&mut self, input: NewDeadlineInput) -> Result<deadlines::Deadline, AccessError> {
        let id = Ulid::new().to_string();
        let inserted = deadlines::insert(
            &mut *self.tx,
            &deadlines::NewDeadline {
                id: id.clone(),
                organization_id: self.context.organization_id.clone(),
                title: input.title,
                due_at: input.due_at,
                priority: input.priority,
                created_by: self.context.user_id.clone(),
            },
        )
        .await?;
        if inserted == 0 {
            return Err(AccessError::AccessDenied);
        }
        self.find_deadline(&id).await
    }

    pub async fn find_deadline(&mut self, deadline_id: &str) -> Result<deadlines::Deadline, AccessError> {
        deadlines::find_visible(&mut *self.tx, deadline_id)
            .await?
            .ok_or(AccessError::NotFound)
    }

    pub async fn update_deadline(
        &mut self,
        deadline_id: &str,
        changes: &deadlines::DeadlineChanges,
    ) -> Result<deadlines::Deadline, AccessError> {
        if changes.due_at.is_some_and(|due_at| due_at < 0) {
            return Err(AccessError::Validation("due date must not be negative".to_string()));
        }
        if deadlines::update(&mut *self.tx, deadline_id, changes).await? == 0 {
            return Err(self.unmatched_deadline(deadline_id).await);
        }
        self.find_deadline(deadline_id).await
    }

    pub async fn delete_deadline(&mut self, deadline_id: &str) -> Result<(), AccessError> {
        if deadlines::delete(&mut *self.tx, deadline_id).await? > 0 {
            return Ok(());
        }
        Err(self.unmatched_deadline(deadline_id).await)
    }

    async fn unmatched_deadline(&mut self, deadline_id: &str) -> AccessError {
        match deadlines::find_visible(&mut *self.tx, deadline_id).await {
            Ok(Some(_)) => AccessError::AccessDenied,
            Ok(None) => AccessError::NotFound,
            Err(err) => err.into(),
        }
    }

    // Dues

    pub async fn list_dues(&mut self) -> Result<Vec<dues_transactions::DuesTransaction>, AccessError> {
        Ok(dues_transactions::list_visible(&mut *self.tx).await?)
    }

    pub async fn record_dues(
        &mut self,
        input: NewDuesInput,
    ) -> Result<dues_transactions::DuesTransaction, AccessError> {
        if input.amount_cents < 0 {
            return Err(AccessError::Validation("amount must not be negative".to_string()));
        }
        let id = Ulid::new().to_string();
        let inserted = dues_transactions::insert(
            &mut *self.tx,
            &dues_transactions::NewDuesTransaction {
                id: id.clone(),
                organization_id: self.context.organization_id.clone(),
                member_user_id: input.member_user_id,
                amount_cents: input.amount_cents,
                created_by: self.context.user_id.clone(),
            },
        )
        .await?;
        if inserted == 0 {
            return Err(AccessError::AccessDenied);
        }
        self.find_dues(&id).await
    }

    pub async fn set_dues_status(
        &mut self,
        transaction_id: &str,
        status: DuesStatus,
    ) -> Result<dues_transactions::DuesTransaction, AccessError> {
        if dues_transactions::set_status(&mut *self.tx, transaction_id, status).await? == 0 {
            return Err(AccessError::NotFound);
        }
        self.find_dues(transaction_id).await
    }

    async fn find_dues(&mut self, transaction_id: &str) -> Result<dues_transactions::DuesTransaction, AccessError> {
        dues_transactions::list_visible(&mut *self.tx)
            .await?
            .into_iter()
            .find(|transaction| transaction.id == transaction_id)
            .ok_or(AccessError::NotFound)
    }

    // Documents

    pub async fn list_documents(&mut self) -> Result<Vec<documents::Document>, AccessError> {
        Ok(documents::list_visible(&mut *self.tx).await?)
    }

    pub async fn create_document(&mut self, input: NewDocumentInput) -> Result<documents::Document, AccessError> {
        let id = Ulid::new().to_string();
        let inserted = documents::insert(
            &mut *self.tx,
            &documents::NewDocument {
                id: id.clone(),
                organization_id: self.context.organization_id.clone(),
                title: input.title,
                storage_key: input.storage_key,
                created_by: self.context.user_id.clone(),
            },
        )
        .await?;
        if inserted == 0 {
            return Err(AccessError::AccessDenied);
        }
        self.find_document(&id).await
    }

    pub async fn find_document(&mut self, document_id: &str) -> Result<documents::Document, AccessError> {
        documents::find_visible(&mut *self.tx, document_id)
            .await?
            .ok_or(AccessError::NotFound)
    }

    pub async fn update_document(
        &mut self,
        document_id: &str,
        changes: &documents::DocumentChanges,
    ) -> Result<documents::Document, AccessError> {
        if documents::update(&mut *self.tx, document_id, changes).await? == 0 {
            return Err(match documents::find_visible(&mut *self.tx, document_id).await? {
                Some(_) => AccessError::AccessDenied,
                None => AccessError::NotFound,
            });
        }
        self.find_document(document_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::db::{organization_members, pool::test_pool, users, MaintenancePool, NewUser, Organization};
    use crate::app::domain::{OrganizationRole, TenantId};
    use crate::app::hierarchy::tests::scenario;
    use crate::app::tenant::{with_session_context, SessionClaims};

    struct Fixture {
        pool: MaintenancePool,
        clc: OrganizationId,
        cupe: OrganizationId,
        local: OrganizationId,
        opseu: OrganizationId,
    }

    async fn fixture() -> Fixture {
        let pool = test_pool().await;
        let mut conn = pool.pool().acquire().await.unwrap();
        let [clc, cupe, local, opseu] = scenario(&mut conn).await;
        let id = |o: &Organization| OrganizationId::from_string(&o.id).unwrap();
        drop(conn);
        Fixture {
            clc: id(&clc),
            cupe: id(&cupe),
            local: id(&local),
            opseu: id(&opseu),
            pool,
        }
    }

    async fn member(pool: &MaintenancePool, org: &OrganizationId, role: OrganizationRole) -> UserId {
        let user_id = UserId::new();
        users::insert(
            pool.pool(),
            &NewUser {
                id: user_id.clone(),
                email: format!("{}@example.com", user_id.as_str().to_lowercase()),
                display_name: role.to_string(),
            },
        )
        .await
        .unwrap();
        organization_members::add_member(pool.pool(), org, &user_id, role)
            .await
            .unwrap();
        user_id
    }

    fn claims_for(user: &UserId, org: &OrganizationId, tenant: &OrganizationId) -> SessionClaims {
        SessionClaims {
            user_id: Some(user.clone()),
            organization_id: Some(org.clone()),
            tenant_id: Some(TenantId::from(tenant.clone())),
        }
    }

    fn claim_input(title: &str, organization_id: Option<OrganizationId>) -> NewClaimInput {
        NewClaimInput {
            organization_id,
            title: title.to_string(),
            description: String::new(),
            priority: Priority::High,
        }
    }

    #[tokio::test]
    async fn officer_sees_descendant_claims_member_does_not() {
        let f = fixture().await;
        let tenant_pool = f.pool.tenant_pool();
        let local_member = member(&f.pool, &f.local, OrganizationRole::Member).await;
        let cupe_member = member(&f.pool, &f.cupe, OrganizationRole::Member).await;
        let cupe_officer = member(&f.pool, &f.cupe, OrganizationRole::Officer).await;

        with_session_context(&tenant_pool, claims_for(&local_member, &f.local, &f.clc), |repo| {
            Box::pin(async move { repo.create_claim(claim_input("Overtime", None)).await })
        })
        .await
        .unwrap();

        let seen_by_member = with_session_context(&tenant_pool, claims_for(&cupe_member, &f.cupe, &f.clc), |repo| {
            Box::pin(repo.list_claims())
        })
        .await
        .unwrap();
        assert!(seen_by_member.is_empty());

        let seen_by_officer = with_session_context(&tenant_pool, claims_for(&cupe_officer, &f.cupe, &f.clc), |repo| {
            Box::pin(repo.list_claims())
        })
        .await
        .unwrap();
        assert_eq!(seen_by_officer.len(), 1);
        assert_eq!(seen_by_officer[0].organization_id, f.local.as_str());
    }

    #[tokio::test]
    async fn sibling_local_sees_zero_rows() {
        let f = fixture().await;
        let tenant_pool = f.pool.tenant_pool();
        let local_member = member(&f.pool, &f.local, OrganizationRole::Admin).await;
        let opseu_admin = member(&f.pool, &f.opseu, OrganizationRole::Admin).await;

        let claim = with_session_context(&tenant_pool, claims_for(&local_member, &f.local, &f.clc), |repo| {
            Box::pin(async move { repo.create_claim(claim_input("Scheduling", None)).await })
        })
        .await
        .unwrap();

        let claim_id = claim.id.clone();
        let lookup = with_session_context(&tenant_pool, claims_for(&opseu_admin, &f.opseu, &f.clc), |repo| {
            Box::pin(async move {
                let all = repo.list_claims().await?;
                let one = repo.find_claim(&claim_id).await;
                Ok((all, one.is_err()))
            })
        })
        .await
        .unwrap();
        assert!(lookup.0.is_empty());
        assert!(lookup.1);
    }

    #[tokio::test]
    async fn inserts_outside_the_writable_set_are_denied() {
        let f = fixture().await;
        let tenant_pool = f.pool.tenant_pool();
        let local_member = member(&f.pool, &f.local, OrganizationRole::Member).await;
        let cupe_officer = member(&f.pool, &f.cupe, OrganizationRole::Officer).await;
        let cupe_member = member(&f.pool, &f.cupe, OrganizationRole::Member).await;

        let upward = with_session_context(&tenant_pool, claims_for(&local_member, &f.local, &f.clc), |repo| {
            let target = Some(f.cupe.clone());
            Box::pin(async move { repo.create_claim(claim_input("Upward", target)).await })
        })
        .await;
        assert!(matches!(upward, Err(AccessError::AccessDenied)));

        let member_downward = with_session_context(&tenant_pool, claims_for(&cupe_member, &f.cupe, &f.clc), |repo| {
            let target = Some(f.local.clone());
            Box::pin(async move { repo.create_claim(claim_input("Down", target)).await })
        })
        .await;
        assert!(matches!(member_downward, Err(AccessError::AccessDenied)));

        let officer_downward = with_session_context(&tenant_pool, claims_for(&cupe_officer, &f.cupe, &f.clc), |repo| {
            let target = Some(f.local.clone());
            Box::pin(async move { repo.create_claim(claim_input("Down", target)).await })
        })
        .await
        .unwrap();
        assert_eq!(officer_downward.organization_id, f.local.as_str());
    }

    #[tokio::test]
    async fn unverified_claim_reads_nothing_and_writes_nothing() {
        let f = fixture().await;
        let tenant_pool = f.pool.tenant_pool();
        let local_admin = member(&f.pool, &f.local, OrganizationRole::Admin).await;

        with_session_context(&tenant_pool, claims_for(&local_admin, &f.local, &f.clc), |repo| {
            Box::pin(async move { repo.create_claim(claim_input("Real", None)).await })
        })
        .await
        .unwrap();

        // Same user claiming an organization they do not belong to.
        let listed = with_session_context(&tenant_pool, claims_for(&local_admin, &f.cupe, &f.clc), |repo| {
            Box::pin(repo.list_claims())
        })
        .await
        .unwrap();
        assert!(listed.is_empty());

        let written = with_session_context(&tenant_pool, claims_for(&local_admin, &f.cupe, &f.clc), |repo| {
            Box::pin(async move { repo.create_claim(claim_input("Forged", None)).await })
        })
        .await;
        assert!(matches!(written, Err(AccessError::AccessDenied)));
    }

    #[tokio::test]
    async fn delete_needs_admin_and_reports_denied_when_visible() {
        let f = fixture().await;
        let tenant_pool = f.pool.tenant_pool();
        let steward = member(&f.pool, &f.local, OrganizationRole::Steward).await;
        let admin = member(&f.pool, &f.local, OrganizationRole::Admin).await;

        let claim = with_session_context(&tenant_pool, claims_for(&steward, &f.local, &f.clc), |repo| {
            Box::pin(async move { repo.create_claim(claim_input("Harassment", None)).await })
        })
        .await
        .unwrap();

        let id = claim.id.clone();
        let denied = with_session_context(&tenant_pool, claims_for(&steward, &f.local, &f.clc), |repo| {
            Box::pin(async move { repo.delete_claim(&id).await })
        })
        .await;
        assert!(matches!(denied, Err(AccessError::AccessDenied)));

        let id = claim.id.clone();
        with_session_context(&tenant_pool, claims_for(&admin, &f.local, &f.clc), |repo| {
            Box::pin(async move { repo.delete_claim(&id).await })
        })
        .await
        .unwrap();

        let id = claim.id.clone();
        let gone = with_session_context(&tenant_pool, claims_for(&admin, &f.local, &f.clc), |repo| {
            Box::pin(async move { repo.delete_claim(&id).await })
        })
        .await;
        assert!(matches!(gone, Err(AccessError::NotFound)));
    }

    #[tokio::test]
    async fn dues_are_officer_only() {
        let f = fixture().await;
        let tenant_pool = f.pool.tenant_pool();
        let steward = member(&f.pool, &f.local, OrganizationRole::Steward).await;
        let officer = member(&f.pool, &f.local, OrganizationRole::Officer).await;

        let input = NewDuesInput {
            member_user_id: steward.clone(),
            amount_cents: 4_500,
        };
        let by_steward = with_session_context(&tenant_pool, claims_for(&steward, &f.local, &f.clc), |repo| {
            let input = input.clone();
            Box::pin(async move { repo.record_dues(input).await })
        })
        .await;
        assert!(matches!(by_steward, Err(AccessError::AccessDenied)));

        let recorded = with_session_context(&tenant_pool, claims_for(&officer, &f.local, &f.clc), |repo| {
            let input = input.clone();
            Box::pin(async move {
                let recorded = repo.record_dues(input).await?;
                repo.set_dues_status(&recorded.id, DuesStatus::Completed).await
            })
        })
        .await
        .unwrap();
        assert_eq!(recorded.status, "completed");

        let steward_view = with_session_context(&tenant_pool, claims_for(&steward, &f.local, &f.clc), |repo| {
            Box::pin(repo.list_dues())
        })
        .await
        .unwrap();
        assert!(steward_view.is_empty());
    }

    #[tokio::test]
    async fn documents_stay_in_their_organization() {
        let f = fixture().await;
        let tenant_pool = f.pool.tenant_pool();
        let local_member = member(&f.pool, &f.local, OrganizationRole::Member).await;
        let cupe_admin = member(&f.pool, &f.cupe, OrganizationRole::Admin).await;

        with_session_context(&tenant_pool, claims_for(&local_member, &f.local, &f.clc), |repo| {
            Box::pin(async move {
                repo.create_document(NewDocumentInput {
                    title: "Collective agreement".to_string(),
                    storage_key: "docs/ca-2024.pdf".to_string(),
                })
                .await
            })
        })
        .await
        .unwrap();

        let seen = with_session_context(&tenant_pool, claims_for(&cupe_admin, &f.cupe, &f.clc), |repo| {
            Box::pin(repo.list_documents())
        })
        .await
        .unwrap();
        assert!(seen.is_empty());
    }

    #[tokio::test]
    async fn deadline_updates_follow_the_row_policy() {
        let f = fixture().await;
        let tenant_pool = f.pool.tenant_pool();
        let local_member = member(&f.pool, &f.local, OrganizationRole::Member).await;
        let cupe_member = member(&f.pool, &f.cupe, OrganizationRole::Member).await;
        let cupe_officer = member(&f.pool, &f.cupe, OrganizationRole::Officer).await;
        let opseu_admin = member(&f.pool, &f.opseu, OrganizationRole::Admin).await;

        let deadline = with_session_context(&tenant_pool, claims_for(&local_member, &f.local, &f.clc), |repo| {
            Box::pin(async move {
                repo.create_deadline(NewDeadlineInput {
                    title: "Grievance step 2".to_string(),
                    due_at: 1_900_000_000,
                    priority: Priority::Medium,
                })
                .await
            })
        })
        .await
        .unwrap();

        let changes = deadlines::DeadlineChanges {
            due_at: Some(1_900_086_400),
            ..Default::default()
        };
        for (user, org) in [(&cupe_member, &f.cupe), (&opseu_admin, &f.opseu)] {
            let id = deadline.id.clone();
            let changes = changes.clone();
            let result = with_session_context(&tenant_pool, claims_for(user, org, &f.clc), |repo| {
                Box::pin(async move { repo.update_deadline(&id, &changes).await })
            })
            .await;
            assert!(matches!(result, Err(AccessError::NotFound)));
        }

        let id = deadline.id.clone();
        let by_member = with_session_context(&tenant_pool, claims_for(&local_member, &f.local, &f.clc), |repo| {
            let changes = changes.clone();
            Box::pin(async move { repo.update_deadline(&id, &changes).await })
        })
        .await
        .unwrap();
        assert_eq!(by_member.due_at, 1_900_086_400);
        assert_eq!(by_member.title, "Grievance step 2");

        let id = deadline.id.clone();
        let by_officer = with_session_context(&tenant_pool, claims_for(&cupe_officer, &f.cupe, &f.clc), |repo| {
            let changes = deadlines::DeadlineChanges {
                priority: Some(Priority::High),
                ..Default::default()
            };
            Box::pin(async move { repo.update_deadline(&id, &changes).await })
        })
        .await
        .unwrap();
        assert_eq!(by_officer.priority, "high");
    }

    #[tokio::test]
    async fn documents_are_edited_only_in_their_organization() {
        let f = fixture().await;
        let tenant_pool = f.pool.tenant_pool();
        let local_member = member(&f.pool, &f.local, OrganizationRole::Member).await;
        let cupe_admin = member(&f.pool, &f.cupe, OrganizationRole::Admin).await;

        let document = with_session_context(&tenant_pool, claims_for(&local_member, &f.local, &f.clc), |repo| {
            Box::pin(async move {
                repo.create_document(NewDocumentInput {
                    title: "Bylaws".to_string(),
                    storage_key: "docs/bylaws.pdf".to_string(),
                })
                .await
            })
        })
        .await
        .unwrap();

        let changes = documents::DocumentChanges {
            title: Some("Bylaws (2025)".to_string()),
            storage_key: None,
        };
        let id = document.id.clone();
        let from_parent = with_session_context(&tenant_pool, claims_for(&cupe_admin, &f.cupe, &f.clc), |repo| {
            let changes = changes.clone();
            Box::pin(async move { repo.update_document(&id, &changes).await })
        })
        .await;
        assert!(matches!(from_parent, Err(AccessError::NotFound)));

        let id = document.id.clone();
        let updated = with_session_context(&tenant_pool, claims_for(&local_member, &f.local, &f.clc), |repo| {
            let changes = changes.clone();
            Box::pin(async move { repo.update_document(&id, &changes).await })
        })
        .await
        .unwrap();
        assert_eq!(updated.title, "Bylaws (2025)");
        assert_eq!(updated.storage_key, "docs/bylaws.pdf");
    }

    #[tokio::test]
    async fn rollup_counts_the_subtree() {
        let f = fixture().await;
        let tenant_pool = f.pool.tenant_pool();
        let local_member = member(&f.pool, &f.local, OrganizationRole::Member).await;
        let opseu_member = member(&f.pool, &f.opseu, OrganizationRole::Member).await;
        let clc_officer = member(&f.pool, &f.clc, OrganizationRole::Officer).await;
        let cupe_officer = member(&f.pool, &f.cupe, OrganizationRole::Officer).await;

        for (user, org) in [(&local_member, &f.local), (&local_member, &f.local), (&opseu_member, &f.opseu)] {
            with_session_context(&tenant_pool, claims_for(user, org, &f.clc), |repo| {
                Box::pin(async move { repo.create_claim(claim_input("Claim", None)).await })
            })
            .await
            .unwrap();
        }

        let clc_rollup = with_session_context(&tenant_pool, claims_for(&clc_officer, &f.clc, &f.clc), |repo| {
            Box::pin(repo.claims_rollup())
        })
        .await
        .unwrap();
        assert_eq!(clc_rollup.iter().map(|r| r.count).sum::<i64>(), 3);

        let cupe_rollup = with_session_context(&tenant_pool, claims_for(&cupe_officer, &f.cupe, &f.clc), |repo| {
            Box::pin(repo.claims_rollup())
        })
        .await
        .unwrap();
        assert_eq!(cupe_rollup.len(), 1);
        assert_eq!(cupe_rollup[0].organization_id, f.local.as_str());
        assert_eq!(cupe_rollup[0].count, 2);
    }
}
