#![cfg(feature = "integration")]

mod support;

use anyhow::Result;
use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::Argon2;
use rand_core::OsRng;
use routing_core::context::ActorType;
use routing_core::login;
use routing_core::refresh_tokens;
use serial_test::serial;
use sqlx::PgPool;
use support::TestDatabase;
use uuid::Uuid;

async fn seed_company(pool: &PgPool, name: &str) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO company (id, name) VALUES ($1, $2)")
        .bind(id)
        .bind(name)
        .execute(pool)
        .await?;
    Ok(id)
}

async fn seed_web_user(pool: &PgPool, company_id: Uuid, username: &str, password: &str) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default().hash_password(password.as_bytes(), &salt)?.to_string();

    sqlx::query(
        "INSERT INTO web_user (id, username, password_hash, company_id, is_super_admin, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, false, now(), now())",
    )
    .bind(id)
    .bind(username)
    .bind(&password_hash)
    .bind(company_id)
    .execute(pool)
    .await?;
    Ok(id)
}

/// RLS isolates `web_user` rows by `company_id` even when connected as the
/// restricted `app_rls` role — one tenant's session can never see another's
/// rows, regardless of query shape.
#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn rls_hides_rows_outside_the_session_tenant() -> Result<()> {
    let Some(db) = TestDatabase::setup().await? else {
        return Ok(());
    };
    let pool = db.pool_clone();

    let company_a = seed_company(&pool, "Tenant A").await?;
    let company_b = seed_company(&pool, "Tenant B").await?;
    seed_web_user(&pool, company_a, "alice", "correct horse battery staple").await?;
    seed_web_user(&pool, company_b, "bob", "correct horse battery staple").await?;

    let mut tx = pool.begin().await?;
    sqlx::query("SET LOCAL ROLE app_rls").execute(&mut *tx).await?;
    sqlx::query("SELECT set_config('app.is_superadmin', 'false', true)")
        .execute(&mut *tx)
        .await?;
    sqlx::query("SELECT set_config('app.current_company_id', $1, true)")
        .bind(company_a.to_string())
        .execute(&mut *tx)
        .await?;

    let visible: Vec<(String,)> = sqlx::query_as("SELECT username FROM web_user ORDER BY username")
        .fetch_all(&mut *tx)
        .await?;
    tx.rollback().await?;

    assert_eq!(visible, vec![("alice".to_string(),)]);

    db.teardown().await?;
    Ok(())
}

/// A full login issues an access token and a refresh token; rotating the
/// refresh token once succeeds, and presenting the same (now-rotated) token
/// again is treated as reuse and revokes the whole family.
#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn refresh_token_reuse_revokes_the_family() -> Result<()> {
    let Some(db) = TestDatabase::setup().await? else {
        return Ok(());
    };
    let pool = db.pool_clone();

    let company = seed_company(&pool, "Tenant C").await?;
    seed_web_user(&pool, company, "carol", "correct horse battery staple").await?;

    let outcome = login::login(
        &pool,
        "carol",
        "correct horse battery staple",
        ActorType::Web,
        None,
        900,
        30,
        |_claims| Ok("signed.jwt.stub".to_string()),
    )
    .await?;

    let presented = outcome.refresh.token.clone();

    let mut tx = pool.begin().await?;
    let (rotated, _owner) = refresh_tokens::rotate(&mut tx, &presented, 30).await?;
    tx.commit().await?;
    assert_ne!(rotated.token, presented);

    let mut tx = pool.begin().await?;
    let reuse = refresh_tokens::rotate(&mut tx, &presented, 30).await;
    tx.commit().await?;
    assert!(reuse.is_err(), "presenting an already-rotated token must fail");

    let mut tx = pool.begin().await?;
    let after_reuse = refresh_tokens::rotate(&mut tx, &rotated.token, 30).await;
    tx.commit().await?;
    assert!(
        after_reuse.is_err(),
        "reuse detection must revoke the whole family, not just the reused token"
    );

    db.teardown().await?;
    Ok(())
}
