#![cfg(feature = "integration")]

mod support;

use anyhow::Result;
use routing_core::context::{ContextSnapshot, RequestContext, SnapshotActorType};
use routing_core::errors::AppError;
use routing_core::queue;
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

fn snapshot_for(company_id: Uuid) -> ContextSnapshot {
    ContextSnapshot {
        company_id: Some(company_id),
        branch_id: None,
        user_id: Uuid::new_v4(),
        actor_type: SnapshotActorType::Web,
        is_super_admin: false,
        role_name: None,
        permissions: vec![],
    }
}

async fn insert_mission(ctx: &mut RequestContext, title: &str) -> Result<(), AppError> {
    let company_id = ctx.require_company_id()?;
    let tx = ctx.db().expect("queue context always carries a txn");
    sqlx::query("INSERT INTO mission (company_id, title) VALUES ($1, $2)")
        .bind(company_id)
        .bind(title)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// A handler that returns `Ok` commits its writes — the consumer side of
/// the queue bridge mirrors the HTTP pipeline's commit-on-success half.
#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn consume_envelope_commits_on_success() -> Result<()> {
    let Some(db) = TestDatabase::setup().await? else {
        return Ok(());
    };
    let pool = db.pool_clone();

    let company = seed_company(&pool, "Queue Co").await?;
    let snapshot = snapshot_for(company);

    queue::consume_envelope(&pool, &snapshot, |ctx| Box::pin(insert_mission(ctx, "committed")))
        .await?;

    let count: (i64,) = sqlx::query_as("SELECT count(*) FROM mission WHERE company_id = $1")
        .bind(company)
        .fetch_one(&pool)
        .await?;
    assert_eq!(count.0, 1);

    db.teardown().await?;
    Ok(())
}

/// A handler that writes, then returns `Err`, must not leave its write
/// behind — the consumer side rolls back on failure exactly like the
/// HTTP pipeline does.
#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn consume_envelope_rolls_back_on_handler_error() -> Result<()> {
    let Some(db) = TestDatabase::setup().await? else {
        return Ok(());
    };
    let pool = db.pool_clone();

    let company = seed_company(&pool, "Queue Co Rollback").await?;
    let snapshot = snapshot_for(company);

    let result: Result<(), AppError> = queue::consume_envelope(&pool, &snapshot, |ctx| {
        Box::pin(async move {
            insert_mission(ctx, "should not persist").await?;
            Err(AppError::bad_request("HANDLER_FAILED"))
        })
    })
    .await;
    assert!(result.is_err());

    let count: (i64,) = sqlx::query_as("SELECT count(*) FROM mission WHERE company_id = $1")
        .bind(company)
        .fetch_one(&pool)
        .await?;
    assert_eq!(count.0, 0);

    db.teardown().await?;
    Ok(())
}
