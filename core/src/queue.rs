use std::future::Future;

use sqlx::{PgPool, Postgres};
use tracing::warn;

use crate::context::{ActorType, ContextSnapshot, RequestContext};
use crate::errors::AppError;

/// Serializes the ambient context (no DB handle) for a queue envelope.
/// RabbitMQ/Redis transports themselves are out of scope — this only
/// specifies the payload a publisher attaches.
pub fn publish_envelope(ctx: &RequestContext) -> ContextSnapshot {
    ctx.snapshot()
}

/// Rehydrates a `RequestContext` from `snapshot`, runs `handler` against
/// it, then commits on `Ok` or rolls back on `Err` — the same txn
/// discipline `pipeline::run_txn` applies around an HTTP handler, minus
/// the axum `Next`/response plumbing a queue consumer has no use for.
pub async fn consume_envelope<F, Fut, T>(
    pool: &PgPool,
    snapshot: &ContextSnapshot,
    handler: F,
) -> Result<T, AppError>
where
    F: for<'a> FnOnce(&'a mut RequestContext) -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut ctx = bind_from_snapshot(pool, snapshot).await?;

    let result = handler(&mut ctx).await;

    if let Some(tx) = ctx.take_db() {
        let commit_result = if result.is_err() {
            tx.rollback().await
        } else {
            tx.commit().await
        };
        if let Err(err) = commit_result {
            warn!(error = %err, "failed to finalize queue consumer transaction");
        }
    }

    result
}

/// Re-establishes a transactional context on the consuming side from a
/// published snapshot, running the same "bind phase" as the request
/// pipeline. The envelope is trusted because the transport is internal and
/// authenticated — there is no token to re-verify here, only the session
/// variables to (re)apply. Callers that need the run-handler/commit
/// lifecycle should use `consume_envelope` instead of calling this
/// directly.
async fn bind_from_snapshot(
    pool: &PgPool,
    snapshot: &ContextSnapshot,
) -> Result<RequestContext, AppError> {
    let mut tx = pool.begin().await?;

    sqlx::query("SET LOCAL ROLE app_rls").execute(&mut *tx).await?;

    if snapshot.is_super_admin {
        sqlx::query("SELECT set_config('app.is_superadmin', 'true', true)")
            .execute(&mut *tx)
            .await?;
        sqlx::query("SELECT set_config('app.current_company_id', '', true)")
            .execute(&mut *tx)
            .await?;
    } else {
        let company_id = snapshot
            .company_id
            .ok_or_else(|| AppError::unauthenticated("queue context missing companyId"))?;
        sqlx::query("SELECT set_config('app.is_superadmin', 'false', true)")
            .execute(&mut *tx)
            .await?;
        sqlx::query("SELECT set_config('app.current_company_id', $1, true)")
            .bind(company_id.to_string())
            .execute(&mut *tx)
            .await?;
    }

    let ctx = RequestContext::new(
        snapshot.user_id,
        ActorType::from(snapshot.actor_type),
        snapshot.is_super_admin,
        snapshot.company_id,
        snapshot.branch_id,
        snapshot.role_name.clone(),
        snapshot.permissions.clone(),
        Some(tx),
    );

    Ok(ctx)
}
