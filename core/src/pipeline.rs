use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use common_auth::{AuthError, Claims, JwtVerifier};
use sqlx::PgPool;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::context::{ActorType, RequestContext};
use crate::errors::AppError;
use crate::metrics::CoreMetrics;
use crate::models::mobile_user::MobileUser;
use crate::models::web_user::WebUser;

/// Everything the pipeline middleware needs pulled off `AppState` via
/// `axum::extract::FromRef`.
#[derive(Clone)]
pub struct PipelineDeps {
    pub db: PgPool,
    pub jwt_verifier: Arc<JwtVerifier>,
    pub metrics: Arc<CoreMetrics>,
}

/// The request-context pipeline — the single entry point every
/// request passes through. Implemented as an axum middleware so it wraps
/// the whole router; handlers recover the installed `RequestContext` via
/// the `RequestContext: FromRequestParts` impl below.
#[instrument(skip_all)]
pub async fn request_context_pipeline(
    State(deps): State<PipelineDeps>,
    req: Request,
    next: Next,
) -> Response {
    let metrics = deps.metrics.clone();
    let claims = match extract_claims(req.headers(), &deps.jwt_verifier) {
        Ok(claims) => claims,
        Err(err) => {
            metrics.record_pipeline_outcome("unauthenticated");
            return AppError::from(err).into_response();
        }
    };

    let response = match claims {
        None => run_no_txn(req, next).await,
        Some(claims) => run_txn(deps, claims, req, next).await,
    };

    metrics.record_pipeline_outcome(if response.status().is_success() {
        "ok"
    } else if response.status() == axum::http::StatusCode::UNAUTHORIZED {
        "unauthenticated"
    } else {
        "error"
    });
    response
}

fn extract_claims(
    headers: &axum::http::HeaderMap,
    verifier: &JwtVerifier,
) -> Result<Option<Claims>, AuthError> {
    match common_auth::extract_token(headers) {
        Ok(token) => verifier.verify(&token).map(Some),
        Err(AuthError::MissingAuthorization) => Ok(None),
        Err(other) => Err(other),
    }
}

/// `[no-txn]`: no decodable token — run the handler with a minimal, DB-less
/// context. Used by anonymous-capable routes (login, invite registration)
/// that open their own connections explicitly.
async fn run_no_txn(req: Request, next: Next) -> Response {
    let ctx = RequestContext::new(
        Uuid::nil(),
        ActorType::Web,
        false,
        None,
        None,
        None,
        Vec::new(),
        None,
    );
    crate::context::run(ctx, move || next.run(req)).await
}

/// `[txn]`: acquire a connection, begin a transaction, switch to the
/// restricted role, refresh the actor from the database, set RLS session
/// variables from the *refreshed* state, install the context, run the
/// handler, then commit or roll back based on the outcome.
async fn run_txn(deps: PipelineDeps, claims: Claims, req: Request, next: Next) -> Response {
    let mut tx = match deps.db.begin().await {
        Ok(tx) => tx,
        Err(err) => {
            warn!(error = %err, "failed to acquire db connection for request");
            return AppError::from(err).into_response();
        }
    };

    if let Err(err) = sqlx::query("SET LOCAL ROLE app_rls").execute(&mut *tx).await {
        return AppError::from(err).into_response();
    }

    // Refresh phase: always readable as superadmin so the actor lookup
    // itself isn't blocked by a stale or narrowing policy.
    if let Err(err) = set_session_vars(&mut tx, true, None).await {
        return AppError::from(err).into_response();
    }

    let refreshed = match refresh_actor(&mut tx, &claims).await {
        Ok(Some(refreshed)) => refreshed,
        Ok(None) => {
            let _ = tx.rollback().await;
            return AppError::unauthenticated("actor not found or deleted").into_response();
        }
        Err(err) => {
            let _ = tx.rollback().await;
            return err.into_response();
        }
    };

    // Bind phase: re-apply session variables from the refreshed, DB-sourced
    // state. This, not the token's claims, is what RLS ultimately trusts.
    if !refreshed.is_super_admin && refreshed.company_id.is_none() {
        let _ = tx.rollback().await;
        return AppError::unauthenticated("non-superadmin actor has no company scope")
            .into_response();
    }

    if let Err(err) = set_session_vars(&mut tx, refreshed.is_super_admin, refreshed.company_id).await {
        let _ = tx.rollback().await;
        return AppError::from(err).into_response();
    }

    debug!(
        user_id = %refreshed.user_id,
        company_id = ?refreshed.company_id,
        actor_type = ?refreshed.actor_type,
        "request context refreshed"
    );

    let ctx = RequestContext::new(
        refreshed.user_id,
        refreshed.actor_type,
        refreshed.is_super_admin,
        refreshed.company_id,
        refreshed.branch_id,
        refreshed.role_name,
        refreshed.permissions,
        Some(tx),
    );

    let response = crate::context::run(ctx, move || async move {
        let mut installed = crate::context::take_installed();
        let response = next.run(req).await;
        (response, installed.take_db())
    })
    .await;

    let (response, tx) = response;
    let outcome_is_error = response.status().is_client_error() || response.status().is_server_error();

    if let Some(tx) = tx {
        let commit_result = if outcome_is_error {
            tx.rollback().await
        } else {
            tx.commit().await
        };
        if let Err(err) = commit_result {
            warn!(error = %err, "failed to finalize request transaction");
        }
    }

    response
}

struct RefreshedActor {
    user_id: Uuid,
    actor_type: ActorType,
    is_super_admin: bool,
    company_id: Option<Uuid>,
    branch_id: Option<Uuid>,
    role_name: Option<String>,
    permissions: Vec<String>,
}

/// Re-reads the authoritative actor row by id — never trusts the token's
/// claims for anything but *which row to look up*. This is the pipeline's
/// refresh phase, preventing stale-claim escalation.
async fn refresh_actor(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    claims: &Claims,
) -> Result<Option<RefreshedActor>, AppError> {
    match claims.actor_type {
        common_auth::ActorType::Web => {
            let row: Option<WebUser> =
                sqlx::query_as("SELECT * FROM web_user WHERE id = $1 AND deleted_at IS NULL")
                    .bind(claims.subject)
                    .fetch_optional(&mut **tx)
                    .await?;
            let Some(u) = row else { return Ok(None) };

            // Permissions are re-derived from the user's *current* role row,
            // never trusted from the token's claims — the refresh phase must
            // catch a role's authorizations changing, not only company/super
            // admin status.
            let role: Option<(String, Vec<String>)> = match u.role_id {
                Some(role_id) => {
                    sqlx::query_as(
                        "SELECT name, authorizations FROM role WHERE id = $1 AND deleted_at IS NULL",
                    )
                    .bind(role_id)
                    .fetch_optional(&mut **tx)
                    .await?
                }
                None => None,
            };
            let (role_name, permissions) = match role {
                Some((name, authorizations)) => (Some(name), authorizations),
                None => (None, Vec::new()),
            };

            Ok(Some(RefreshedActor {
                user_id: u.id,
                actor_type: ActorType::Web,
                is_super_admin: u.is_super_admin,
                company_id: u.company_id,
                branch_id: u.branch_id,
                role_name,
                permissions,
            }))
        }
        common_auth::ActorType::Mobile => {
            let row: Option<MobileUser> =
                sqlx::query_as("SELECT * FROM mobile_user WHERE id = $1 AND deleted_at IS NULL")
                    .bind(claims.subject)
                    .fetch_optional(&mut **tx)
                    .await?;
            match row {
                Some(u) if u.is_blocked => Err(AppError::unauthenticated("mobile user is blocked")),
                Some(u) => {
                    // Mobile permissions live directly on the row, not a role;
                    // `roleId` (if any) is kept for display/branch-narrowing
                    // purposes only and is likewise re-read, never trusted
                    // from the token.
                    let role_name: Option<String> = match u.role_id {
                        Some(role_id) => {
                            sqlx::query_scalar(
                                "SELECT name FROM role WHERE id = $1 AND deleted_at IS NULL",
                            )
                            .bind(role_id)
                            .fetch_optional(&mut **tx)
                            .await?
                        }
                        None => None,
                    };
                    Ok(Some(RefreshedActor {
                        user_id: u.id,
                        actor_type: ActorType::Mobile,
                        is_super_admin: u.is_super_admin,
                        company_id: Some(u.company_id),
                        branch_id: u.branch_id,
                        role_name,
                        permissions: u.permissions.clone(),
                    }))
                }
                None => Ok(None),
            }
        }
    }
}

async fn set_session_vars(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    is_super_admin: bool,
    company_id: Option<Uuid>,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT set_config('app.is_superadmin', $1, true)")
        .bind(if is_super_admin { "true" } else { "false" })
        .execute(&mut **tx)
        .await?;
    sqlx::query("SELECT set_config('app.current_company_id', $1, true)")
        .bind(company_id.map(|id| id.to_string()).unwrap_or_default())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(_parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(crate::context::take_installed())
    }
}
