use argon2::password_hash::{PasswordHash, PasswordVerifier};
use argon2::Argon2;
use serde::Serialize;
use sqlx::Postgres;
use uuid::Uuid;

use crate::context::ActorType;
use crate::errors::AppError;
use crate::models::mobile_user::MobileUser;
use crate::models::refresh_token::RefreshTokenOwner;
use crate::models::web_user::WebUser;
use crate::models::Actor;
use crate::refresh_tokens::{self, IssuedRefreshToken};

/// The canonical claim set minted on every successful login. Field names
/// match `common_auth::claims::ClaimsRepr`'s wire shape exactly so the
/// pipeline's verifier can round-trip them.
#[derive(Debug, Serialize)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub username: String,
    #[serde(rename = "actorType")]
    pub actor_type: &'static str,
    #[serde(rename = "companyId", skip_serializing_if = "Option::is_none")]
    pub company_id: Option<Uuid>,
    #[serde(rename = "branchId", skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<Uuid>,
    #[serde(rename = "driverId", skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<RoleClaim>,
    #[serde(rename = "isSuperAdmin")]
    pub is_super_admin: bool,
    pub exp: i64,
}

#[derive(Debug, Serialize)]
pub struct RoleClaim {
    pub name: String,
    pub authorizations: Vec<String>,
}

pub struct LoginOutcome {
    pub access_token: String,
    pub refresh: IssuedRefreshToken,
    pub actor: Actor,
}

/// Credential login. `company_id` disambiguates a mobile login
/// against a username shared across tenants; required only when more than
/// one match exists.
pub async fn login(
    pool: &sqlx::PgPool,
    username: &str,
    password: &str,
    actor_type: ActorType,
    company_id: Option<Uuid>,
    jwt_expiration_seconds: i64,
    refresh_expiration_days: i64,
    sign: impl FnOnce(&AccessClaims) -> Result<String, AppError>,
) -> Result<LoginOutcome, AppError> {
    let normalized_username = username.trim().to_ascii_lowercase();

    let actor = match actor_type {
        ActorType::Web => Actor::Web(find_web_user(pool, &normalized_username).await?),
        ActorType::Mobile => {
            Actor::Mobile(find_mobile_user(pool, &normalized_username, company_id).await?)
        }
    };

    if actor.is_blocked() {
        return Err(AppError::unauthenticated("mobile user is blocked"));
    }

    let password_hash = match &actor {
        Actor::Web(u) => &u.password_hash,
        Actor::Mobile(u) => &u.password_hash,
    };

    verify_password(password, password_hash)?;

    let exp = chrono::Utc::now().timestamp() + jwt_expiration_seconds;
    let claims = match &actor {
        Actor::Web(u) => AccessClaims {
            sub: u.id,
            username: u.username.clone(),
            actor_type: "web",
            company_id: u.company_id,
            branch_id: u.branch_id,
            driver_id: None,
            role: fetch_role_claim(pool, u.role_id).await?,
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

    let access_token = sign(&claims)?;

    let owner = match &actor {
        Actor::Web(u) => RefreshTokenOwner::Web(u.id),
        Actor::Mobile(u) => RefreshTokenOwner::Mobile(u.id),
    };
    let refresh = refresh_tokens::issue(pool, owner, None, refresh_expiration_days).await?;

    Ok(LoginOutcome {
        access_token,
        refresh,
        actor,
    })
}

/// Looked up with `is_superadmin=true, current_company_id=''` on the
/// caller's connection — the user's home tenant isn't known yet, so RLS
/// must be bypassed for this one lookup. Callers must run this
/// on a connection that has actually set those session variables; the
/// login path opens its own connection and does so explicitly rather than
/// reusing an ambient one, since login runs before any context exists.
async fn find_web_user(pool: &sqlx::PgPool, username: &str) -> Result<WebUser, AppError> {
    let mut tx = pool.begin().await?;
    bypass_rls(&mut tx).await?;

    let user: Option<WebUser> = sqlx::query_as(
        "SELECT * FROM web_user WHERE lower(username) = $1 AND deleted_at IS NULL",
    )
    .bind(username)
    .fetch_optional(&mut *tx)
    .await?;

    tx.commit().await?;
    user.ok_or_else(|| AppError::unauthenticated("invalid credentials"))
}

async fn find_mobile_user(
    pool: &sqlx::PgPool,
    username: &str,
    company_id: Option<Uuid>,
) -> Result<MobileUser, AppError> {
    let mut tx = pool.begin().await?;
    bypass_rls(&mut tx).await?;

    let user = if let Some(company_id) = company_id {
        sqlx::query_as::<_, MobileUser>(
            "SELECT * FROM mobile_user WHERE lower(username) = $1 AND company_id = $2 AND deleted_at IS NULL",
        )
        .bind(username)
        .bind(company_id)
        .fetch_optional(&mut *tx)
        .await?
    } else {
        let matches: Vec<MobileUser> = sqlx::query_as(
            "SELECT * FROM mobile_user WHERE lower(username) = $1 AND deleted_at IS NULL",
        )
        .bind(username)
        .fetch_all(&mut *tx)
        .await?;

        match matches.len() {
            0 => None,
            1 => matches.into_iter().next(),
            _ => return Err(AppError::bad_request("COMPANY_ID_REQUIRED")),
        }
    };

    tx.commit().await?;
    user.ok_or_else(|| AppError::unauthenticated("invalid credentials"))
}

/// Looks up the role snapshot minted into the access token, carried for
/// logging and convenience. The pipeline never trusts this value — it
/// re-reads the role row fresh on every request.
async fn fetch_role_claim(
    pool: &sqlx::PgPool,
    role_id: Option<Uuid>,
) -> Result<Option<RoleClaim>, AppError> {
    let Some(role_id) = role_id else { return Ok(None) };
    let mut tx = pool.begin().await?;
    bypass_rls(&mut tx).await?;

    let row: Option<(String, Vec<String>)> =
        sqlx::query_as("SELECT name, authorizations FROM role WHERE id = $1 AND deleted_at IS NULL")
            .bind(role_id)
            .fetch_optional(&mut *tx)
            .await?;

    tx.commit().await?;
    Ok(row.map(|(name, authorizations)| RoleClaim { name, authorizations }))
}

/// `SET LOCAL` and `set_config(..., true)` are transaction-scoped (spec
/// §6.1) — running this inside a transaction, and always committing or
/// rolling back, is what keeps a bypassed session from leaking onto the
/// connection's next checkout from the pool.
async fn bypass_rls(tx: &mut sqlx::Transaction<'_, Postgres>) -> Result<(), AppError> {
    sqlx::query("SET LOCAL ROLE app_rls").execute(&mut **tx).await?;
    sqlx::query("SELECT set_config('app.is_superadmin', 'true', true)")
        .execute(&mut **tx)
        .await?;
    sqlx::query("SELECT set_config('app.current_company_id', '', true)")
        .execute(&mut **tx)
        .await?;
    Ok(())
}

fn verify_password(password: &str, stored_hash: &str) -> Result<(), AppError> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| AppError::Api(common_http_errors::ApiError::internal(e, None)))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AppError::unauthenticated("invalid credentials"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::password_hash::{PasswordHasher, SaltString};
    use rand_core::OsRng;

    fn hash(password: &str) -> String {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .expect("hash")
            .to_string()
    }

    #[test]
    fn verify_password_accepts_the_matching_password() {
        let stored = hash("correct horse battery staple");
        assert!(verify_password("correct horse battery staple", &stored).is_ok());
    }

    #[test]
    fn verify_password_rejects_a_wrong_password() {
        let stored = hash("correct horse battery staple");
        assert!(verify_password("wrong password", &stored).is_err());
    }
}
