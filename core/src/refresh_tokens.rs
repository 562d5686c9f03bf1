use chrono::{Duration, Utc};
use rand_core::{OsRng, RngCore};
use sqlx::Postgres;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::refresh_token::{RefreshToken, RefreshTokenOwner};

const BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;
const SECRET_BYTES: usize = 16; // 128 random bits, hex-encoded below.

pub struct IssuedRefreshToken {
    pub token: String,
    pub family_id: Uuid,
    pub expires_at: chrono::DateTime<Utc>,
}

/// Issues a new refresh token row for `owner`. `family_id` is carried
/// forward across a rotation chain; a fresh login starts a new family.
pub async fn issue<'e, E>(
    executor: E,
    owner: RefreshTokenOwner,
    family_id: Option<Uuid>,
    expiration_days: i64,
) -> Result<IssuedRefreshToken, AppError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let id = Uuid::new_v4();
    let family_id = family_id.unwrap_or_else(Uuid::new_v4);
    let secret = generate_secret();
    let token_hash = bcrypt::hash(&secret, BCRYPT_COST)
        .map_err(|e| AppError::Api(common_http_errors::ApiError::internal(e, None)))?;
    let expires_at = Utc::now() + Duration::days(expiration_days);

    let (user_id, mobile_user_id) = match owner {
        RefreshTokenOwner::Web(id) => (Some(id), None),
        RefreshTokenOwner::Mobile(id) => (None, Some(id)),
    };

    sqlx::query(
        "INSERT INTO refresh_token (id, user_id, mobile_user_id, token_hash, expires_at, is_revoked, family_id, created_at) \
         VALUES ($1, $2, $3, $4, $5, false, $6, now())",
    )
    .bind(id)
    .bind(user_id)
    .bind(mobile_user_id)
    .bind(&token_hash)
    .bind(expires_at)
    .bind(family_id)
    .execute(executor)
    .await?;

    Ok(IssuedRefreshToken {
        token: format!("{id}.{secret}"),
        family_id,
        expires_at,
    })
}

/// Parses, verifies, revokes the presented token and issues its successor.
/// Reuse of an already-rotated token revokes the whole family before
/// failing — this is the reuse-detection rule.
///
/// Must run inside the caller's open transaction: the two mutations below
/// (revoke-presented, issue-successor) and any reuse-triggered family
/// revoke all need to be atomic with each other.
pub async fn rotate(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    token: &str,
    expiration_days: i64,
) -> Result<(IssuedRefreshToken, RefreshTokenOwner), AppError> {
    let (id, secret) = parse_token(token)?;

    let row: Option<RefreshToken> = sqlx::query_as(
        "SELECT id, user_id, mobile_user_id, token_hash, expires_at, is_revoked, family_id, created_at \
         FROM refresh_token WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?;

    let row = row.ok_or_else(|| AppError::unauthenticated("unknown refresh token"))?;

    if row.is_revoked {
        revoke_family(tx, row.family_id).await?;
        return Err(AppError::unauthenticated("refresh token reuse detected"));
    }

    let valid = bcrypt::verify(&secret, &row.token_hash)
        .map_err(|e| AppError::Api(common_http_errors::ApiError::internal(e, None)))?;
    if !valid {
        return Err(AppError::unauthenticated("refresh token secret mismatch"));
    }

    if row.expires_at <= Utc::now() {
        return Err(AppError::unauthenticated("refresh token expired"));
    }

    let owner = row
        .owner()
        .ok_or_else(|| AppError::unauthenticated("refresh token has no owner"))?;

    sqlx::query("UPDATE refresh_token SET is_revoked = true WHERE id = $1")
        .bind(row.id)
        .execute(&mut **tx)
        .await?;

    let issued = issue(&mut **tx, owner, Some(row.family_id), expiration_days).await?;
    Ok((issued, owner))
}

/// Best-effort, idempotent revoke of a single token.
pub async fn revoke<'e, E>(executor: E, token: &str) -> Result<(), AppError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let (id, _secret) = parse_token(token)?;
    sqlx::query("UPDATE refresh_token SET is_revoked = true WHERE id = $1")
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

/// Revokes every token sharing `family_id`.
pub async fn revoke_family<'e, E>(executor: E, family_id: Uuid) -> Result<(), AppError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query("UPDATE refresh_token SET is_revoked = true WHERE family_id = $1")
        .bind(family_id)
        .execute(executor)
        .await?;
    Ok(())
}

fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn parse_token(token: &str) -> Result<(Uuid, String), AppError> {
    let (id_part, secret_part) = token
        .split_once('.')
        .ok_or_else(|| AppError::unauthenticated("malformed refresh token"))?;
    let id = Uuid::parse_str(id_part)
        .map_err(|_| AppError::unauthenticated("malformed refresh token id"))?;
    if secret_part.is_empty() {
        return Err(AppError::unauthenticated("malformed refresh token secret"));
    }
    Ok((id, secret_part.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_token() {
        let id = Uuid::new_v4();
        let token = format!("{id}.deadbeefdeadbeefdeadbeefdeadbeef");
        let (parsed_id, secret) = parse_token(&token).expect("parse");
        assert_eq!(parsed_id, id);
        assert_eq!(secret, "deadbeefdeadbeefdeadbeefdeadbeef");
    }

    #[test]
    fn rejects_token_without_separator() {
        assert!(parse_token("not-a-token").is_err());
    }

    #[test]
    fn rejects_token_with_non_uuid_id() {
        assert!(parse_token("not-a-uuid.deadbeef").is_err());
    }

    #[test]
    fn rejects_token_with_empty_secret() {
        let id = Uuid::new_v4();
        assert!(parse_token(&format!("{id}.")).is_err());
    }

    #[test]
    fn generated_secret_is_128_random_bits_hex_encoded() {
        let secret = generate_secret();
        assert_eq!(secret.len(), SECRET_BYTES * 2);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
