use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::AppState;
use crate::balance::{self, ConsumeAction};
use crate::context::RequestContext;
use crate::errors::AppError;
use crate::guard::{self, SelfServiceScope};

#[derive(Debug, Deserialize)]
pub struct CreateMissionRequest {
    pub title: String,
    #[serde(rename = "branchId")]
    pub branch_id: Option<Uuid>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct MissionView {
    pub id: Uuid,
    #[serde(rename = "companyId")]
    pub company_id: Uuid,
    #[serde(rename = "branchId")]
    pub branch_id: Option<Uuid>,
    pub title: String,
    pub status: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Illustrative handler exercising the guard (C6) and balance gate (C10)
/// inside the ambient transaction (C3/C5) — not part of a full mission
/// planning API.
pub async fn create_mission(
    mut ctx: RequestContext,
    State(state): State<AppState>,
    Json(body): Json<CreateMissionRequest>,
) -> Result<Json<MissionView>, AppError> {
    guard::authorize(&ctx, &["missions:create"], SelfServiceScope::None)?;

    let company_id = ctx.require_company_id()?;
    let branch_id = ctx.effective_branch_id(body.branch_id);
    let title = body.title.trim().to_string();
    if title.is_empty() {
        return Err(AppError::bad_request("TITLE_EMPTY"));
    }

    let tx = ctx
        .db()
        .ok_or_else(|| AppError::unauthenticated("no transaction bound to request"))?;

    balance::consume(tx, company_id, ConsumeAction::MissionCreate)
        .await
        .inspect_err(|err| {
            if let Some(balance_type) = err.balance_exceeded_type() {
                state.metrics.record_balance_exceeded(balance_type);
            }
        })?;

    let mission: MissionView = sqlx::query_as(
        "INSERT INTO mission (id, company_id, branch_id, title, status, created_by_id, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, 'pending', $5, now(), now()) \
         RETURNING id, company_id, branch_id, title, status, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(company_id)
    .bind(branch_id)
    .bind(&title)
    .bind(ctx.user_id)
    .fetch_one(tx)
    .await?;

    Ok(Json(mission))
}

#[derive(Debug, Deserialize)]
pub struct ListMissionsQuery {
    #[serde(rename = "branchId")]
    pub branch_id: Option<Uuid>,
}

/// Lists missions scoped by RLS to the caller's tenant and narrowed to the
/// effective branch, a defense-in-depth layer on top of RLS's company
/// scoping.
pub async fn list_missions(
    mut ctx: RequestContext,
    Query(params): Query<ListMissionsQuery>,
) -> Result<Json<Vec<MissionView>>, AppError> {
    guard::authorize(&ctx, &["missions:read"], SelfServiceScope::None)?;

    let branch_id = ctx.effective_branch_id(params.branch_id);
    let tx = ctx
        .db()
        .ok_or_else(|| AppError::unauthenticated("no transaction bound to request"))?;

    let missions: Vec<MissionView> = sqlx::query_as(
        "SELECT id, company_id, branch_id, title, status, created_at FROM mission \
         WHERE ($1::uuid IS NULL OR branch_id = $1) \
         ORDER BY created_at DESC",
    )
    .bind(branch_id)
    .fetch_all(tx)
    .await?;

    Ok(Json(missions))
}
