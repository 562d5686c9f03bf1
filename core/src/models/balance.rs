use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, serde::Serialize, serde::Deserialize)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BalanceType {
    PerMissions,
    PerVehiclesPerMonth,
}

impl BalanceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceType::PerMissions => "per_missions",
            BalanceType::PerVehiclesPerMonth => "per_vehicles_per_month",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct CompanyBalance {
    pub company_id: Uuid,
    #[sqlx(rename = "balance_type")]
    pub r#type: BalanceType,
    pub total: Option<i64>,
    pub remaining: Option<i64>,
    pub monthly_limit: Option<i64>,
    pub period_start: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct CompanyBalancePurchase {
    pub id: Uuid,
    pub company_id: Uuid,
    #[sqlx(rename = "balance_type")]
    pub r#type: BalanceType,
    pub quantity: i64,
    pub created_by_id: Option<Uuid>,
    pub total_after: Option<i64>,
    pub remaining_after: Option<i64>,
    pub monthly_limit_after: Option<i64>,
    pub period_start_after: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
