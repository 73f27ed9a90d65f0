use crate::app::domain::OrganizationRole;

/// Role rank bound for the current session; NULL when no context is bound,
/// which makes every comparison below false.
const SESSION_ROLE_RANK: &str = "(SELECT role_rank FROM temp.session_context)";

/// Which rows of a table the session organization can see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadScope {
    /// Only rows owned by the session organization.
    SelfOnly,
    /// Rows of the session organization, plus rows of its descendants when
    /// the session role reaches descendants (officer and above).
    SelfAndDescendants,
}

/// Per-table row policy. Ancestor visibility is configured here, table by
/// table, rather than inferred from one global rule.
#[derive(Debug, Clone, Copy)]
pub struct TablePolicy {
    pub table: &'static str,
    pub read: ReadScope,
    pub read_min_role: OrganizationRole,
    /// Whether rollups over the session subtree are allowed.
    pub aggregate: bool,
    pub insert_min_role: OrganizationRole,
    /// Whether officers/admins may insert rows owned by a descendant.
    pub insert_into_descendants: bool,
    pub update_min_role: OrganizationRole,
    pub delete_min_role: OrganizationRole,
}

pub const CLAIMS: TablePolicy = TablePolicy {
    table: "claims",
    read: ReadScope::SelfAndDescendants,
    read_min_role: OrganizationRole::Member,
    aggregate: true,
    insert_min_role: OrganizationRole::Member,
    insert_into_descendants: true,
    update_min_role: OrganizationRole::Member,
    delete_min_role: OrganizationRole::Admin,
};

pub const DUES_TRANSACTIONS: TablePolicy = TablePolicy {
    table: "dues_transactions",
    read: ReadScope::SelfAndDescendants,
    read_min_role: OrganizationRole::Officer,
    aggregate: true,
    insert_min_role: OrganizationRole::Officer,
    insert_into_descendants: false,
    update_min_role: OrganizationRole::Officer,
    delete_min_role: OrganizationRole::Admin,
};

pub const DEADLINES: TablePolicy = TablePolicy {
    table: "deadlines",
    read: ReadScope::SelfAndDescendants,
    read_min_role: OrganizationRole::Member,
    aggregate: true,
    insert_min_role: OrganizationRole::Member,
    insert_into_descendants: false,
    update_min_role: OrganizationRole::Member,
    delete_min_role: OrganizationRole::Admin,
};

pub const DOCUMENTS: TablePolicy = TablePolicy {
    table: "documents",
    read: ReadScope::SelfOnly,
    read_min_role: OrganizationRole::Member,
    aggregate: false,
    insert_min_role: OrganizationRole::Member,
    insert_into_descendants: false,
    update_min_role: OrganizationRole::Member,
    delete_min_role: OrganizationRole::Admin,
};

/// Every tenant-scoped table and its policy.
pub const ALL: [TablePolicy; 4] = [CLAIMS, DUES_TRANSACTIONS, DEADLINES, DOCUMENTS];

impl TablePolicy {
    /// Predicate a row must satisfy to be returned by a SELECT.
    pub fn read_predicate(&self) -> String {
        self.scoped("organization_id", self.read, self.read_min_role)
    }

    /// Predicate a row must satisfy to be modified by an UPDATE.
    pub fn update_predicate(&self) -> String {
        self.scoped("organization_id", self.read, self.update_min_role)
    }

    /// Predicate a row must satisfy to be removed by a DELETE.
    pub fn delete_predicate(&self) -> String {
        self.scoped("organization_id", self.read, self.delete_min_role)
    }

    /// Predicate over a bound `?` parameter holding the target organization
    /// of an INSERT ... SELECT ... WHERE.
    pub fn insert_predicate(&self) -> String {
        let scope = if self.insert_into_descendants {
            ReadScope::SelfAndDescendants
        } else {
            ReadScope::SelfOnly
        };
        self.scoped("?", scope, self.insert_min_role)
    }

    /// Predicate for subtree rollups, `None` when the table does not allow them.
    pub fn aggregate_predicate(&self) -> Option<String> {
        self.aggregate.then(|| {
            self.scoped("organization_id", ReadScope::SelfAndDescendants, self.read_min_role)
        })
    }

    fn scoped(&self, column: &str, scope: ReadScope, min_role: OrganizationRole) -> String {
        let orgs = match scope {
            ReadScope::SelfOnly => {
                "SELECT organization_id FROM temp.session_visible_orgs WHERE relation = 'self'"
                    .to_string()
            }
            ReadScope::SelfAndDescendants => format!(
                "SELECT organization_id FROM temp.session_visible_orgs \
                 WHERE relation = 'self' OR (relation = 'descendant' AND {SESSION_ROLE_RANK} >= {})",
                OrganizationRole::Officer.rank()
            ),
        };
        format!(
            "({column} IN ({orgs}) AND {SESSION_ROLE_RANK} >= {})",
            min_role.rank()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::{Connection, SqliteConnection};

    async fn connection_with_rows() -> SqliteConnection {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        sqlx::raw_sql(crate::app::rls::CONNECTION_SETUP_SQL)
            .execute(&mut conn)
            .await
            .unwrap();
        sqlx::raw_sql(
            "CREATE TABLE claims (id TEXT, organization_id TEXT);
             INSERT INTO claims VALUES ('c-own', 'own'), ('c-child', 'child'), ('c-other', 'other');",
        )
        .execute(&mut conn)
        .await
        .unwrap();
        conn
    }

    async fn bind(conn: &mut SqliteConnection, role: OrganizationRole) {
        sqlx::query("INSERT INTO temp.session_context VALUES ('u', 't', 'own', ?)")
            .bind(role.rank())
            .execute(&mut *conn)
            .await
            .unwrap();
        sqlx::raw_sql(
            "INSERT INTO temp.session_visible_orgs VALUES ('own', 'self'), ('child', 'descendant');",
        )
        .execute(&mut *conn)
        .await
        .unwrap();
    }

    async fn visible_ids(conn: &mut SqliteConnection, policy: &TablePolicy) -> Vec<String> {
        let sql = format!(
            "SELECT id FROM claims WHERE {} ORDER BY id",
            policy.read_predicate()
        );
        sqlx::query_scalar(&sql).fetch_all(&mut *conn).await.unwrap()
    }

    #[tokio::test]
    async fn unbound_connection_sees_nothing() {
        let mut conn = connection_with_rows().await;
        for policy in ALL {
            assert!(visible_ids(&mut conn, &policy).await.is_empty(), "{}", policy.table);
        }
    }

    #[tokio::test]
    async fn member_sees_only_own_rows() {
        let mut conn = connection_with_rows().await;
        bind(&mut conn, OrganizationRole::Member).await;
        assert_eq!(visible_ids(&mut conn, &CLAIMS).await, vec!["c-own"]);
    }

    #[tokio::test]
    async fn officer_sees_descendant_rows_on_hierarchical_tables() {
        let mut conn = connection_with_rows().await;
        bind(&mut conn, OrganizationRole::Officer).await;
        assert_eq!(visible_ids(&mut conn, &CLAIMS).await, vec!["c-child", "c-own"]);
        assert_eq!(visible_ids(&mut conn, &DOCUMENTS).await, vec!["c-own"]);
    }

    #[tokio::test]
    async fn read_min_role_applies_to_own_rows_too() {
        let mut conn = connection_with_rows().await;
        bind(&mut conn, OrganizationRole::Steward).await;
        assert!(visible_ids(&mut conn, &DUES_TRANSACTIONS).await.is_empty());
    }

    #[test]
    fn documents_do_not_aggregate() {
        assert!(DOCUMENTS.aggregate_predicate().is_none());
        assert!(CLAIMS.aggregate_predicate().is_some());
    }

    #[test]
    fn insert_predicate_binds_target_parameter() {
        assert!(CLAIMS.insert_predicate().starts_with("(? IN"));
        assert!(!DEADLINES.insert_predicate().contains("descendant"));
    }
}
