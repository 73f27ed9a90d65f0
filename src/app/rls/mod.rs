//! Row-level security for tenant-scoped tables.
//!
//! SQLite has no native row security, so enforcement lives in two places that
//! every tenant-scoped statement goes through:
//!
//! - Connection-local state. Each pooled connection owns two TEMP tables,
//!   created empty at connect time. `tenant::with_session_context` fills them
//!   inside the request's transaction and empties them before commit; a
//!   rollback (error or cancellation) discards them with everything else.
//! - Table policies. The statements in `db::{claims, dues_transactions,
//!   deadlines, documents}` embed the predicate of their `TablePolicy`, and
//!   those predicates only ever read the TEMP tables. A statement issued on a
//!   connection with no bound context therefore matches nothing.

pub mod policy;

pub use policy::{ReadScope, TablePolicy, CLAIMS, DEADLINES, DOCUMENTS, DUES_TRANSACTIONS};

/// Executed once per new pooled connection.
pub const CONNECTION_SETUP_SQL: &str = r#"
CREATE TEMP TABLE IF NOT EXISTS session_context (
    user_id TEXT NOT NULL,
    tenant_id TEXT NOT NULL,
    organization_id TEXT NOT NULL,
    role_rank INTEGER NOT NULL
);
CREATE TEMP TABLE IF NOT EXISTS session_visible_orgs (
    organization_id TEXT NOT NULL,
    relation TEXT NOT NULL,
    PRIMARY KEY (organization_id, relation)
);
"#;

/// How a visible organization relates to the session organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// The session organization itself.
    Own,
    /// Strictly below the session organization.
    Descendant,
    /// Strictly above the session organization, within the tenant.
    Ancestor,
}

impl Relation {
    pub fn as_sql(self) -> &'static str {
        match self {
            Relation::Own => "self",
            Relation::Descendant => "descendant",
            Relation::Ancestor => "ancestor",
        }
    }
}
