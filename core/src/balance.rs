use sqlx::Postgres;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::balance::BalanceType;

/// The two actions the gate is consulted for. Each only
/// consumes quota when it matches the company's configured balance type;
/// otherwise `consume` is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeAction {
    MissionCreate,
    VehicleCreate,
}

/// Runs inside the caller's open request transaction, before the
/// mission/vehicle row is persisted. Lazily creates a
/// `per_missions` balance row (all-null, meaning unlimited) the first time
/// any company is seen.
pub async fn consume(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    company_id: Uuid,
    action: ConsumeAction,
) -> Result<(), AppError> {
    ensure_balance_row(tx, company_id).await?;

    let balance_type: Option<BalanceType> =
        sqlx::query_scalar("SELECT balance_type FROM company_balance WHERE company_id = $1")
            .bind(company_id)
            .fetch_optional(&mut **tx)
            .await?;
    let Some(balance_type) = balance_type else {
        return Ok(());
    };

    match (action, balance_type) {
        (ConsumeAction::MissionCreate, BalanceType::PerMissions) => {
            consume_per_missions(tx, company_id).await
        }
        (ConsumeAction::VehicleCreate, BalanceType::PerVehiclesPerMonth) => {
            consume_per_vehicles_per_month(tx, company_id).await
        }
        _ => Ok(()),
    }
}

async fn consume_per_missions(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    company_id: Uuid,
) -> Result<(), AppError> {
    let result = sqlx::query(
        "UPDATE company_balance \
         SET remaining = CASE WHEN remaining IS NULL THEN NULL ELSE remaining - 1 END, \
             updated_at = now() \
         WHERE company_id = $1 AND balance_type = 'per_missions' \
           AND (remaining IS NULL OR remaining > 0)",
    )
    .bind(company_id)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::balance_exceeded("per_missions"));
    }
    Ok(())
}

async fn consume_per_vehicles_per_month(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    company_id: Uuid,
) -> Result<(), AppError> {
    let result = sqlx::query(
        "UPDATE company_balance \
         SET period_start = date_trunc('month', now()), \
             remaining = CASE \
               WHEN period_start IS NULL OR period_start < date_trunc('month', now()) \
                 THEN monthly_limit - 1 \
               ELSE remaining - 1 \
             END, \
             updated_at = now() \
         WHERE company_id = $1 AND balance_type = 'per_vehicles_per_month' \
           AND ( \
             (period_start IS NULL OR period_start < date_trunc('month', now())) \
               AND (monthly_limit IS NULL OR monthly_limit > 0) \
             OR (period_start >= date_trunc('month', now()) AND (remaining IS NULL OR remaining > 0)) \
           )",
    )
    .bind(company_id)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::balance_exceeded("per_vehicles_per_month"));
    }
    Ok(())
}

async fn ensure_balance_row(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    company_id: Uuid,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO company_balance (company_id, balance_type, total, remaining, monthly_limit, period_start, created_at, updated_at) \
         VALUES ($1, 'per_missions', NULL, NULL, NULL, NULL, now(), now()) \
         ON CONFLICT (company_id) DO NOTHING",
    )
    .bind(company_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Admin top-up, run in the same tenant transaction as the request that
/// invoked it. Always appends an audit row with the post-state snapshot.
pub async fn purchase(
    tx: &mut sqlx::Transaction<'_, Postgres>,
    company_id: Uuid,
    balance_type: BalanceType,
    quantity: i64,
    created_by_id: Option<Uuid>,
) -> Result<(), AppError> {
    ensure_balance_row(tx, company_id).await?;

    match balance_type {
        BalanceType::PerMissions => {
            sqlx::query(
                "UPDATE company_balance \
                 SET balance_type = 'per_missions', \
                     total = COALESCE(total, 0) + $2, \
                     remaining = COALESCE(remaining, 0) + $2, \
                     updated_at = now() \
                 WHERE company_id = $1",
            )
            .bind(company_id)
            .bind(quantity)
            .execute(&mut **tx)
            .await?;
        }
        BalanceType::PerVehiclesPerMonth => {
            sqlx::query(
                "UPDATE company_balance \
                 SET balance_type = 'per_vehicles_per_month', \
                     monthly_limit = $2, total = $2, remaining = $2, \
                     period_start = date_trunc('month', now()), \
                     updated_at = now() \
                 WHERE company_id = $1",
            )
            .bind(company_id)
            .bind(quantity)
            .execute(&mut **tx)
            .await?;
        }
    }

    let snapshot: (Option<i64>, Option<i64>, Option<i64>, Option<chrono::DateTime<chrono::Utc>>) = sqlx::query_as(
        "SELECT total, remaining, monthly_limit, period_start FROM company_balance WHERE company_id = $1",
    )
    .bind(company_id)
    .fetch_one(&mut **tx)
    .await?;

    sqlx::query(
        "INSERT INTO company_balance_purchase \
         (id, company_id, balance_type, quantity, created_by_id, total_after, remaining_after, monthly_limit_after, period_start_after, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())",
    )
    .bind(Uuid::new_v4())
    .bind(company_id)
    .bind(balance_type)
    .bind(quantity)
    .bind(created_by_id)
    .bind(snapshot.0)
    .bind(snapshot.1)
    .bind(snapshot.2)
    .bind(snapshot.3)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_action_maps_one_to_one_with_matching_balance_type() {
        assert_eq!(ConsumeAction::MissionCreate, ConsumeAction::MissionCreate);
        assert_ne!(ConsumeAction::MissionCreate, ConsumeAction::VehicleCreate);
    }
}
