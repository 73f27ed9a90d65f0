#![allow(dead_code)]

use axum::body::Body;
use http_body_util::BodyExt;
use time::{Duration, OffsetDateTime};
use tower::ServiceExt;
use unioneyes::app::config::Config;
use unioneyes::app::db::{self, MaintenancePool, Organization};
use unioneyes::app::domain::{OrganizationId, OrganizationRole, TenantId, UserId};
use unioneyes::app::tenant::SessionClaims;
use unioneyes::app::AppState;
use unioneyes::create_router;
use unioneyes::seeds::{self, RunOptions};

pub async fn test_pool() -> MaintenancePool {
    let pool = MaintenancePool::connect(&Config::for_tests()).await.unwrap();
    pool.migrate().await.unwrap();
    pool
}

/// File-backed pool with several connections, for tests that need real
/// concurrency. Each call gets a fresh database file.
pub async fn file_pool(max_connections: u32) -> MaintenancePool {
    let path = std::env::temp_dir().join(format!("unioneyes-test-{}.db", ulid::Ulid::new()));
    let config = Config {
        database_url: format!("sqlite://{}", path.display()),
        db_max_connections: max_connections,
        ..Config::for_tests()
    };
    let pool = MaintenancePool::connect(&config).await.unwrap();
    pool.migrate().await.unwrap();
    pool
}

pub fn test_router(pool: &MaintenancePool) -> axum::Router {
    let state = AppState {
        db: pool.tenant_pool(),
        config: Config::for_tests(),
    };
    create_router(state)
}

/// The seeded example tree.
pub struct Hierarchy {
    pub clc: Organization,
    pub ofl: Organization,
    pub cupe: Organization,
    pub opseu: Organization,
    pub cupe_79: Organization,
    pub cupe_3903: Organization,
    pub opseu_562: Organization,
}

pub async fn seed_hierarchy(pool: &MaintenancePool) -> Hierarchy {
    seeds::run_seeds(pool.pool(), RunOptions::default()).await.unwrap();
    Hierarchy {
        clc: by_slug(pool, "clc").await,
        ofl: by_slug(pool, "ofl").await,
        cupe: by_slug(pool, "cupe").await,
        opseu: by_slug(pool, "opseu").await,
        cupe_79: by_slug(pool, "cupe-79").await,
        cupe_3903: by_slug(pool, "cupe-3903").await,
        opseu_562: by_slug(pool, "opseu-562").await,
    }
}

pub async fn by_slug(pool: &MaintenancePool, slug: &str) -> Organization {
    db::organizations::find_by_slug(pool.pool(), slug)
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("organization {slug} should exist"))
}

pub fn id_of(org: &Organization) -> OrganizationId {
    OrganizationId::from_string(&org.id).unwrap()
}

/// Tenant rooted at the organization's root.
pub async fn tenant_of(pool: &MaintenancePool, org: &Organization) -> TenantId {
    TenantId::from(id_of(&by_slug(pool, org.root_slug()).await))
}

/// Create a user with an active membership in `org`.
pub async fn member(pool: &MaintenancePool, org: &Organization, role: OrganizationRole) -> UserId {
    let user_id = UserId::new();
    db::users::insert(
        pool.pool(),
        &db::NewUser {
            id: user_id.clone(),
            email: format!("{}@example.org", user_id.as_str().to_lowercase()),
            display_name: format!("{role} of {}", org.slug),
        },
    )
    .await
    .unwrap();
    db::organization_members::add_member(pool.pool(), &id_of(org), &user_id, role)
        .await
        .unwrap();
    user_id
}

/// Claims as an authenticated request for `user` at `org` would present them.
pub async fn claims_for(pool: &MaintenancePool, user: &UserId, org: &Organization) -> SessionClaims {
    SessionClaims {
        user_id: Some(user.clone()),
        tenant_id: Some(tenant_of(pool, org).await),
        organization_id: Some(id_of(org)),
    }
}

/// Cookie header for a fresh session of `user` claiming `org`.
pub async fn session_cookie(pool: &MaintenancePool, user: &UserId, org: &Organization) -> String {
    let tenant = tenant_of(pool, org).await;
    let session_id = db::sessions::create(
        pool.pool(),
        user,
        Some(&id_of(org)),
        Some(&tenant),
        OffsetDateTime::now_utc() + Duration::days(1),
    )
    .await
    .unwrap();
    format!("session_id={session_id}")
}

/// Insert a claim through the maintenance pool, bypassing row policies.
pub async fn raw_claim(pool: &MaintenancePool, org: &Organization, title: &str) -> String {
    let id = ulid::Ulid::new().to_string();
    sqlx::query(
        "INSERT INTO claims (id, organization_id, title, created_by, created_at, updated_at) \
         VALUES (?, ?, ?, 'seed', unixepoch(), unixepoch())",
    )
    .bind(&id)
    .bind(&org.id)
    .bind(title)
    .execute(pool.pool())
    .await
    .unwrap();
    id
}

pub async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    cookie: Option<&str>,
    body: Option<serde_json::Value>,
) -> (http::StatusCode, serde_json::Value) {
    let mut builder = http::Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}
