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
pub struct CreateVehicleRequest {
    pub label: String,
    #[serde(rename = "branchId")]
    pub branch_id: Option<Uuid>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct VehicleView {
    pub id: Uuid,
    #[serde(rename = "companyId")]
    pub company_id: Uuid,
    #[serde(rename = "branchId")]
    pub branch_id: Option<Uuid>,
    pub label: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Illustrative handler exercising the `per_vehicles_per_month` balance
/// type alongside the same guard/context machinery as
/// `missions::create_mission`.
pub async fn create_vehicle(
    mut ctx: RequestContext,
    State(state): State<AppState>,
    Json(body): Json<CreateVehicleRequest>,
) -> Result<Json<VehicleView>, AppError> {
    guard::authorize(&ctx, &["vehicles:create"], SelfServiceScope::None)?;

    let company_id = ctx.require_company_id()?;
    let branch_id = ctx.effective_branch_id(body.branch_id);
    let label = body.label.trim().to_string();
    if label.is_empty() {
        return Err(AppError::bad_request("LABEL_EMPTY"));
    }

    let tx = ctx
        .db()
        .ok_or_else(|| AppError::unauthenticated("no transaction bound to request"))?;

    balance::consume(tx, company_id, ConsumeAction::VehicleCreate)
        .await
        .inspect_err(|err| {
            if let Some(balance_type) = err.balance_exceeded_type() {
                state.metrics.record_balance_exceeded(balance_type);
            }
        })?;

    let vehicle: VehicleView = sqlx::query_as(
        "INSERT INTO vehicle (id, company_id, branch_id, label, created_by_id, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, now(), now()) \
         RETURNING id, company_id, branch_id, label, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(company_id)
    .bind(branch_id)
    .bind(&label)
    .bind(ctx.user_id)
    .fetch_one(tx)
    .await?;

    Ok(Json(vehicle))
}

#[derive(Debug, Deserialize)]
pub struct ListVehiclesQuery {
    #[serde(rename = "branchId")]
    pub branch_id: Option<Uuid>,
}

pub async fn list_vehicles(
    mut ctx: RequestContext,
    Query(params): Query<ListVehiclesQuery>,
) -> Result<Json<Vec<VehicleView>>, AppError> {
    guard::authorize(&ctx, &["vehicles:read"], SelfServiceScope::None)?;

    let branch_id = ctx.effective_branch_id(params.branch_id);
    let tx = ctx
        .db()
        .ok_or_else(|| AppError::unauthenticated("no transaction bound to request"))?;

    let vehicles: Vec<VehicleView> = sqlx::query_as(
        "SELECT id, company_id, branch_id, label, created_at FROM vehicle \
         WHERE ($1::uuid IS NULL OR branch_id = $1) \
         ORDER BY created_at DESC",
    )
    .bind(branch_id)
    .fetch_all(tx)
    .await?;

    Ok(Json(vehicles))
}
