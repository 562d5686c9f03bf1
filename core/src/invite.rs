use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use rand_core::{OsRng, RngCore};
use sqlx::Postgres;
use uuid::Uuid;

use crate::constants::DEFAULT_MOBILE_PERMISSIONS;
use crate::errors::AppError;
use crate::models::driver_invite::DriverInvite;

pub struct RegisteredMobileUser {
    pub id: Uuid,
    pub company_id: Uuid,
    pub branch_id: Option<Uuid>,
}

const INVITE_CODE_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const INVITE_CODE_LENGTH: usize = 8;

/// Admin-issued invite creation, consumed by [`register`]. Runs inside the
/// caller's open request transaction — the company/branch scope it writes
/// comes from the ambient `RequestContext`, not from client input, so it
/// can never mint an invite for a tenant other than the admin's own.
///
/// Enforces "at most one active invite per driver" by retrying
/// on the unique-code collision and surfacing the partial unique index's
/// violation (`driver_invite_active_unique`, migration 0002) as
/// `CONFLICT`.
pub async fn create_invite(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    company_id: Uuid,
    branch_id: Option<Uuid>,
    driver_id: Uuid,
    role_id: Option<Uuid>,
    expires_at: Option<DateTime<Utc>>,
    created_by_id: Option<Uuid>,
) -> Result<DriverInvite, AppError> {
    let id = Uuid::new_v4();

    // Collisions on the globally-unique `code` are astronomically unlikely
    // at this alphabet/length, so one generation attempt plus the unique
    // index as a backstop is enough — no retry loop.
    let code = generate_invite_code();

    let inserted: Result<DriverInvite, sqlx::Error> = sqlx::query_as(
        "INSERT INTO driver_invite \
         (id, code, company_id, branch_id, driver_id, role_id, expires_at, created_by_id, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now()) \
         RETURNING *",
    )
    .bind(id)
    .bind(&code)
    .bind(company_id)
    .bind(branch_id)
    .bind(driver_id)
    .bind(role_id)
    .bind(expires_at)
    .bind(created_by_id)
    .fetch_one(&mut **tx)
    .await;

    match inserted {
        Ok(invite) => Ok(invite),
        Err(err) if is_unique_violation(&err) => {
            Err(AppError::conflict("ACTIVE_INVITE_EXISTS"))
        }
        Err(err) => Err(err.into()),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == "23505")
        .unwrap_or(false)
}

fn generate_invite_code() -> String {
    let mut bytes = [0u8; INVITE_CODE_LENGTH];
    OsRng.fill_bytes(&mut bytes);
    bytes
        .iter()
        .map(|b| INVITE_CODE_ALPHABET[(*b as usize) % INVITE_CODE_ALPHABET.len()] as char)
        .collect()
}

/// Mobile-user self-registration via a single-use invite code.
/// Runs in its own transaction with **no prior authenticated context** —
/// deliberately does not switch to the restricted `app_rls` role, because
/// no tenant is known yet to scope RLS by. The invite lookup's own
/// `code`/`used_at` filter does the scoping work RLS would otherwise do.
pub async fn register(
    pool: &sqlx::PgPool,
    username: &str,
    password: &str,
    invite_code: &str,
) -> Result<RegisteredMobileUser, AppError> {
    let normalized_username = username.trim().to_ascii_lowercase();
    let mut tx = pool.begin().await?;

    let invite: Option<DriverInvite> = sqlx::query_as(
        "SELECT * FROM driver_invite WHERE code = $1 AND used_at IS NULL FOR UPDATE",
    )
    .bind(invite_code)
    .fetch_optional(&mut *tx)
    .await?;

    let invite = invite.ok_or_else(|| AppError::bad_request("INVALID_OR_USED_INVITE"))?;

    if let Some(expires_at) = invite.expires_at {
        if expires_at < Utc::now() {
            return Err(AppError::bad_request("INVITE_EXPIRED"));
        }
    }

    let existing: Option<(Uuid,)> = sqlx::query_as(
        "SELECT id FROM mobile_user WHERE company_id = $1 AND lower(username) = $2 AND deleted_at IS NULL",
    )
    .bind(invite.company_id)
    .bind(&normalized_username)
    .fetch_optional(&mut *tx)
    .await?;

    if existing.is_some() {
        return Err(AppError::bad_request("USERNAME_TAKEN"));
    }

    let password_hash = hash_password(password)?;
    let new_id = Uuid::new_v4();
    let permissions: Vec<String> = DEFAULT_MOBILE_PERMISSIONS.iter().map(|s| s.to_string()).collect();

    sqlx::query(
        "INSERT INTO mobile_user \
         (id, username, password_hash, company_id, branch_id, role_id, driver_id, permissions, is_blocked, is_super_admin, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, false, false, now(), now())",
    )
    .bind(new_id)
    .bind(&normalized_username)
    .bind(&password_hash)
    .bind(invite.company_id)
    .bind(invite.branch_id)
    .bind(invite.role_id)
    .bind(invite.driver_id)
    .bind(&permissions)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE driver_invite SET used_at = now(), used_by_mobile_user_id = $1 WHERE id = $2")
        .bind(new_id)
        .bind(invite.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(RegisteredMobileUser {
        id: new_id,
        company_id: invite.company_id,
        branch_id: invite.branch_id,
    })
}

fn hash_password(password: &str) -> Result<String, AppError> {
    if password.trim().is_empty() {
        return Err(AppError::bad_request("PASSWORD_EMPTY"));
    }
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Api(common_http_errors::ApiError::internal(e, None)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invite_code_is_fixed_length_alphanumeric() {
        let code = generate_invite_code();
        assert_eq!(code.len(), INVITE_CODE_LENGTH);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric() && c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn hash_password_rejects_blank_password() {
        assert!(hash_password("   ").is_err());
    }
}
