use axum::extract::State;
use axum::http::header::{HeaderValue, COOKIE, SET_COOKIE};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::AppState;
use crate::config::CookieSameSite;
use crate::context::ActorType;
use crate::errors::AppError;
use crate::invite;
use crate::login::{self, AccessClaims};
use crate::models::Actor;
use crate::refresh_tokens;

const ACCESS_COOKIE_NAME: &str = "access_token";
const REFRESH_COOKIE_NAME: &str = "refresh_token";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(rename = "actorType")]
    pub actor_type: ActorTypeWire,
    #[serde(rename = "companyId")]
    pub company_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorTypeWire {
    Web,
    Mobile,
}

impl From<ActorTypeWire> for ActorType {
    fn from(value: ActorTypeWire) -> Self {
        match value {
            ActorTypeWire::Web => ActorType::Web,
            ActorTypeWire::Mobile => ActorType::Mobile,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    #[serde(rename = "companyId")]
    pub company_id: Option<Uuid>,
    #[serde(rename = "isSuperAdmin")]
    pub is_super_admin: bool,
}

/// Credential login. Issues the access token as both the
/// `access_token` cookie (the precedence `common_auth::extract_token`
/// actually checks first) and the response body, plus a `refresh_token`
/// cookie.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Response, AppError> {
    let jwt_verifier = state.jwt_verifier.clone();
    let outcome = login::login(
        &state.db,
        &body.username,
        &body.password,
        body.actor_type.into(),
        body.company_id,
        state.config.jwt.expiration_seconds,
        state.config.refresh_token_expiration_days,
        move |claims: &AccessClaims| jwt_verifier.sign(claims).map_err(AppError::from),
    )
    .await?;

    Ok(auth_response(&state, outcome.access_token, outcome.refresh.token, outcome.actor))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(rename = "refreshToken")]
    pub refresh_token: Option<String>,
}

/// Rotates the presented refresh token (cookie or body) and mints a fresh
/// access token for its owner. Reuse of an
/// already-rotated token revokes the whole family and fails
/// `UNAUTHENTICATED`.
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RefreshRequest>,
) -> Result<Response, AppError> {
    let presented = body
        .refresh_token
        .or_else(|| extract_cookie(&headers, REFRESH_COOKIE_NAME))
        .ok_or_else(|| AppError::unauthenticated("missing refresh token"))?;

    let mut tx = state.db.begin().await?;
    let rotated = refresh_tokens::rotate(
        &mut tx,
        &presented,
        state.config.refresh_token_expiration_days,
    )
    .await;

    // `rotate` may have revoked the whole token family on reuse detection
    // before returning Err; that revoke lives in `tx` and must be
    // committed even though the overall request still fails, otherwise
    // `tx`'s drop rolls it back and reuse detection never actually
    // revokes anything.
    tx.commit().await?;

    let (issued, owner) = rotated.inspect_err(|err| {
        if err.is_refresh_reuse_detected() {
            state.metrics.record_refresh_reuse_detected("unknown");
        }
    })?;

    let mut tx = state.db.begin().await?;

    let (actor, actor_type_wire): (Actor, &'static str) = match owner {
        crate::models::refresh_token::RefreshTokenOwner::Web(id) => {
            let user: crate::models::web_user::WebUser =
                sqlx::query_as("SELECT * FROM web_user WHERE id = $1 AND deleted_at IS NULL")
                    .bind(id)
                    .fetch_one(&mut *tx)
                    .await?;
            (Actor::Web(user), "web")
        }
        crate::models::refresh_token::RefreshTokenOwner::Mobile(id) => {
            let user: crate::models::mobile_user::MobileUser =
                sqlx::query_as("SELECT * FROM mobile_user WHERE id = $1 AND deleted_at IS NULL")
                    .bind(id)
                    .fetch_one(&mut *tx)
                    .await?;
            (Actor::Mobile(user), "mobile")
        }
    };

    if actor.is_blocked() {
        tx.rollback().await?;
        return Err(AppError::unauthenticated("mobile user is blocked"));
    }

    let exp = chrono::Utc::now().timestamp() + state.config.jwt.expiration_seconds;
    let claims = match &actor {
        Actor::Web(u) => AccessClaims {
            sub: u.id,
            username: u.username.clone(),
            actor_type: "web",
            company_id: u.company_id,
            branch_id: u.branch_id,
            driver_id: None,
            role: None,
            is_super_admin: u.is_super_admin,
            exp,
        },
        Actor::Mobile(u) => AccessClaims {
            sub: u.id,
            username: u.username.clone(),
            actor_type: "mobile",
            company_id: Some(u.company_id),
            branch_id: u.branch_id,
            driver_id: u.driver_id,
            role: None,
            is_super_admin: u.is_super_admin,
            exp,
        },
    };
    let access_token = state.jwt_verifier.sign(&claims)?;

    tx.commit().await?;
    state.metrics.record_refresh_rotation(actor_type_wire);

    Ok(auth_response(&state, access_token, issued.token, actor))
}

#[derive(Debug, Deserialize)]
pub struct RegisterMobileRequest {
    pub username: String,
    pub password: String,
    #[serde(rename = "inviteCode")]
    pub invite_code: String,
}

/// Invite-code mobile registration followed immediately by a login in a
/// separate transaction.
pub async fn register_mobile(
    State(state): State<AppState>,
    Json(body): Json<RegisterMobileRequest>,
) -> Result<Response, AppError> {
    invite::register(&state.db, &body.username, &body.password, &body.invite_code).await?;

    let jwt_verifier = state.jwt_verifier.clone();
    let outcome = login::login(
        &state.db,
        &body.username,
        &body.password,
        ActorType::Mobile,
        None,
        state.config.jwt.expiration_seconds,
        state.config.refresh_token_expiration_days,
        move |claims: &AccessClaims| jwt_verifier.sign(claims).map_err(AppError::from),
    )
    .await?;

    Ok(auth_response(&state, outcome.access_token, outcome.refresh.token, outcome.actor))
}

fn auth_response(state: &AppState, access_token: String, refresh_token: String, actor: Actor) -> Response {
    let body = AuthResponse {
        user_id: actor.id(),
        company_id: actor.company_id(),
        is_super_admin: actor.is_super_admin(),
    };

    let mut response = Json(body).into_response();
    let headers = response.headers_mut();

    if let Ok(value) = HeaderValue::from_str(&build_cookie(
        &state.config.cookies,
        ACCESS_COOKIE_NAME,
        &access_token,
        state.config.jwt.expiration_seconds,
    )) {
        headers.append(SET_COOKIE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&build_cookie(
        &state.config.cookies,
        REFRESH_COOKIE_NAME,
        &refresh_token,
        state.config.refresh_token_expiration_days * 24 * 3600,
    )) {
        headers.append(SET_COOKIE, value);
    }

    response
}

/// Clears both auth cookies with the same domain/path they were set with.
/// Best-effort revoke of the presented refresh token; logout never fails on
/// an absent or already-invalid token, since the end state (no session) is
/// the same.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = extract_cookie(&headers, REFRESH_COOKIE_NAME) {
        let _ = refresh_tokens::revoke(&state.db, &token).await;
    }

    let mut response = axum::http::StatusCode::NO_CONTENT.into_response();
    append_clear_cookie_headers(response.headers_mut(), &state.config.cookies);
    response
}

/// Appends `Set-Cookie` headers that clear both auth cookies onto an
/// existing response. Used both by explicit logout and by
/// `app::clear_cookies_on_unauthenticated`, which applies the same clearing
/// to any 401 response from the web channel.
pub(crate) fn append_clear_cookie_headers(
    headers: &mut HeaderMap,
    cookies: &crate::config::CookieSettings,
) {
    for name in [ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME] {
        if let Ok(value) = HeaderValue::from_str(&clear_cookie(cookies, name)) {
            headers.append(SET_COOKIE, value);
        }
    }
}

fn clear_cookie(cookies: &crate::config::CookieSettings, name: &str) -> String {
    build_cookie(cookies, name, "", 0)
}

fn build_cookie(
    cookies: &crate::config::CookieSettings,
    name: &str,
    value: &str,
    max_age_seconds: i64,
) -> String {
    let mut parts = vec![format!("{name}={value}"), "Path=/".to_string(), "HttpOnly".to_string()];

    let max_age = max_age_seconds.max(0);
    parts.push(format!("Max-Age={max_age}"));
    if max_age > 0 {
        let expires = (chrono::Utc::now() + Duration::seconds(max_age)).to_rfc2822();
        parts.push(format!("Expires={expires}"));
    } else {
        // Max-Age=0 alone is enough for modern clients, but a past
        // `Expires` makes the clear unambiguous to older ones too.
        parts.push("Expires=Thu, 01 Jan 1970 00:00:00 GMT".to_string());
    }

    if let Some(domain) = &cookies.domain {
        parts.push(format!("Domain={domain}"));
    }

    parts.push(format!("SameSite={}", same_site_str(cookies.same_site)));
    if cookies.secure {
        parts.push("Secure".to_string());
    }

    parts.join("; ")
}

fn same_site_str(same_site: CookieSameSite) -> &'static str {
    same_site.as_str()
}

fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(COOKIE)?.to_str().ok()?;
    let prefix = format!("{name}=");
    raw.split(';')
        .map(|segment| segment.trim())
        .find_map(|segment| segment.strip_prefix(&prefix))
        .filter(|value| !value.is_empty())
        .map(|value| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CookieSettings;

    fn cookies() -> CookieSettings {
        CookieSettings {
            domain: Some("example.com".to_string()),
            same_site: CookieSameSite::Lax,
            secure: true,
        }
    }

    #[test]
    fn build_cookie_carries_value_domain_and_same_site() {
        let cookie = build_cookie(&cookies(), "access_token", "abc123", 900);
        assert!(cookie.starts_with("access_token=abc123"));
        assert!(cookie.contains("Max-Age=900"));
        assert!(cookie.contains("Domain=example.com"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Secure"));
    }

    #[test]
    fn clear_cookie_empties_the_value_and_expires_in_the_past() {
        let cookie = clear_cookie(&cookies(), "refresh_token");
        assert!(cookie.starts_with("refresh_token="));
        assert!(cookie.contains("Max-Age=0"));
        assert!(cookie.contains("Expires=Thu, 01 Jan 1970"));
    }

    #[test]
    fn extract_cookie_ignores_other_cookies_and_empty_values() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("access_token=; refresh_token=rt-value; other=1"),
        );
        assert_eq!(extract_cookie(&headers, "access_token"), None);
        assert_eq!(
            extract_cookie(&headers, "refresh_token"),
            Some("rt-value".to_string())
        );
    }
}
