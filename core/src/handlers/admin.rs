use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::balance;
use crate::constants;
use crate::context::RequestContext;
use crate::errors::AppError;
use crate::guard::{self, SelfServiceScope};
use crate::invite;
use crate::models::{Branch, BalanceType, DriverInvite};

/// Illustrative admin-surface handlers exercising C9 (invite creation),
/// C10 (balance purchase), and the branch bootstrap rule — not a full
/// business CRUD API (spec Non-goals).

#[derive(Debug, Deserialize)]
pub struct CreateInviteRequest {
    #[serde(rename = "driverId")]
    pub driver_id: Uuid,
    #[serde(rename = "branchId")]
    pub branch_id: Option<Uuid>,
    #[serde(rename = "roleId")]
    pub role_id: Option<Uuid>,
    #[serde(rename = "expiresAt")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct InviteView {
    pub id: Uuid,
    pub code: String,
    #[serde(rename = "driverId")]
    pub driver_id: Uuid,
    #[serde(rename = "branchId")]
    pub branch_id: Option<Uuid>,
    #[serde(rename = "expiresAt")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<DriverInvite> for InviteView {
    fn from(invite: DriverInvite) -> Self {
        Self {
            id: invite.id,
            code: invite.code,
            driver_id: invite.driver_id,
            branch_id: invite.branch_id,
            expires_at: invite.expires_at,
        }
    }
}

/// Creates a single-use invite ticket for a driver. Company/branch scope
/// comes from the ambient context, never from client input — an admin can
/// only invite within their own tenant, narrowed to their own branch unless
/// they are `companyAdmin` or superadmin.
pub async fn create_invite(
    mut ctx: RequestContext,
    Json(body): Json<CreateInviteRequest>,
) -> Result<Json<InviteView>, AppError> {
    guard::authorize(&ctx, &["invites:create"], SelfServiceScope::None)?;

    let company_id = ctx.require_company_id()?;
    let branch_id = ctx.effective_branch_id(body.branch_id);
    let created_by_id = Some(ctx.user_id);

    let tx = ctx
        .db()
        .ok_or_else(|| AppError::unauthenticated("no transaction bound to request"))?;

    let created = invite::create_invite(
        tx,
        company_id,
        branch_id,
        body.driver_id,
        body.role_id,
        body.expires_at,
        created_by_id,
    )
    .await?;

    Ok(Json(created.into()))
}

#[derive(Debug, Deserialize)]
pub struct PurchaseBalanceRequest {
    #[serde(rename = "type")]
    pub balance_type: BalanceType,
    pub quantity: i64,
}

/// Tenant-admin balance top-up, run inside the
/// caller's request transaction so it shares the pipeline's commit/rollback
/// with whatever else the request does.
pub async fn purchase_balance(
    mut ctx: RequestContext,
    Json(body): Json<PurchaseBalanceRequest>,
) -> Result<Response, AppError> {
    guard::authorize(&ctx, &["balance:purchase"], SelfServiceScope::None)?;

    if body.quantity <= 0 {
        return Err(AppError::bad_request("QUANTITY_MUST_BE_POSITIVE"));
    }

    let company_id = ctx.require_company_id()?;
    let created_by_id = Some(ctx.user_id);

    let tx = ctx
        .db()
        .ok_or_else(|| AppError::unauthenticated("no transaction bound to request"))?;

    balance::purchase(tx, company_id, body.balance_type, body.quantity, created_by_id).await?;

    Ok(StatusCode::NO_CONTENT.into_response())
}

#[derive(Debug, Deserialize)]
pub struct CreateBranchRequest {
    pub name: String,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct BranchView {
    pub id: Uuid,
    #[serde(rename = "companyId")]
    pub company_id: Uuid,
    pub name: String,
}

/// Creates a branch within the admin's own tenant. The reserved
/// name `main` is never creatable through this path — every company's
/// `main` branch is minted once at company creation, outside this
/// handler, and only a superadmin may touch it thereafter.
pub async fn create_branch(
    mut ctx: RequestContext,
    Json(body): Json<CreateBranchRequest>,
) -> Result<Json<BranchView>, AppError> {
    guard::authorize(&ctx, &["branches:create"], SelfServiceScope::None)?;

    let name = body.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::bad_request("NAME_EMPTY"));
    }
    if !ctx.is_super_admin && constants::is_reserved_branch_name(&name) {
        return Err(AppError::bad_request("RESERVED_BRANCH_NAME"));
    }

    let company_id = ctx.require_company_id()?;

    let tx = ctx
        .db()
        .ok_or_else(|| AppError::unauthenticated("no transaction bound to request"))?;

    let branch: Branch = sqlx::query_as(
        "INSERT INTO branch (id, name, company_id, created_at, updated_at) \
         VALUES ($1, $2, $3, now(), now()) \
         RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(&name)
    .bind(company_id)
    .fetch_one(tx)
    .await?;

    Ok(Json(BranchView {
        id: branch.id,
        company_id: branch.company_id,
        name: branch.name,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_branch_name_rejected_regardless_of_case_or_whitespace() {
        assert!(constants::is_reserved_branch_name(" Main "));
        assert!(!constants::is_reserved_branch_name("north-depot"));
    }
}
