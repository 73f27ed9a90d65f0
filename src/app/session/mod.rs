//! Request authentication.
//!
//! Sessions are issued out of band (identity provider, or the seed tool for
//! development) and carried in the `session_id` cookie. The session row holds
//! the user's default organization and tenant; a request may override either
//! with the `x-organization-id` and `x-tenant-id` headers. The result is only a
//! claim: `tenant::with_session_context` decides what it is worth.

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, CookieJar};

use crate::app::{
    db,
    domain::{OrganizationId, TenantId, UserId},
    error::AppError,
    tenant::SessionClaims,
    AppState,
};

pub const SESSION_COOKIE: &str = "session_id";
pub const ORGANIZATION_HEADER: &str = "x-organization-id";
pub const TENANT_HEADER: &str = "x-tenant-id";

pub fn clear_session_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .removal()
        .into()
}

/// Authenticated API request. Rejects with 401 when the cookie is missing or
/// the session is unknown or expired.
#[derive(Debug, Clone)]
pub struct ApiSession {
    pub session_id: String,
    pub claims: SessionClaims,
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<Option<&'a str>, AppError> {
    match parts.headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|v| Some(v.trim()))
            .map_err(|_| AppError::Validation(format!("Invalid {name} header"))),
    }
}

fn parse_org(raw: Option<&str>, source: &str) -> Result<Option<OrganizationId>, AppError> {
    raw.filter(|v| !v.is_empty())
        .map(|v| {
            OrganizationId::from_string(v).map_err(|_| AppError::Validation(format!("Invalid {source}")))
        })
        .transpose()
}

#[async_trait]
impl FromRequestParts<AppState> for ApiSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let session_id = jar
            .get(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|value| !value.is_empty())
            .ok_or(AppError::Unauthorized)?;

        let session = db::sessions::find_valid(state.db.inner(), &session_id)
            .await?
            .ok_or(AppError::Unauthorized)?;
        let user_id = UserId::from_string(&session.user_id).map_err(|_| AppError::Unauthorized)?;

        let organization_id = match header(parts, ORGANIZATION_HEADER)? {
            Some(value) => parse_org(Some(value), ORGANIZATION_HEADER)?,
            None => parse_org(session.organization_id.as_deref(), "session organization")?,
        };
        let tenant_id = match header(parts, TENANT_HEADER)? {
            Some(value) => parse_org(Some(value), TENANT_HEADER)?,
            None => parse_org(session.tenant_id.as_deref(), "session tenant")?,
        }
        .map(TenantId::from);

        Ok(ApiSession {
            session_id,
            claims: SessionClaims {
                user_id: Some(user_id),
                tenant_id,
                organization_id,
            },
        })
    }
}
