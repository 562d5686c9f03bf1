pub mod balance;
pub mod branch;
pub mod company;
pub mod driver_invite;
pub mod mobile_user;
pub mod refresh_token;
pub mod role;
pub mod web_user;

pub use balance::{BalanceType, CompanyBalance, CompanyBalancePurchase};
pub use branch::Branch;
pub use company::Company;
pub use driver_invite::DriverInvite;
pub use mobile_user::MobileUser;
pub use refresh_token::RefreshToken;
pub use role::Role;
pub use web_user::WebUser;

/// Tagged sum of the two actor kinds the core authenticates, per the design
/// note against modelling them as subtypes of one another.
#[derive(Debug, Clone)]
pub enum Actor {
    Web(WebUser),
    Mobile(MobileUser),
}

impl Actor {
    pub fn id(&self) -> uuid::Uuid {
        match self {
            Actor::Web(u) => u.id,
            Actor::Mobile(u) => u.id,
        }
    }

    pub fn company_id(&self) -> Option<uuid::Uuid> {
        match self {
            Actor::Web(u) => u.company_id,
            Actor::Mobile(u) => Some(u.company_id),
        }
    }

    pub fn branch_id(&self) -> Option<uuid::Uuid> {
        match self {
            Actor::Web(u) => u.branch_id,
            Actor::Mobile(u) => u.branch_id,
        }
    }

    pub fn is_super_admin(&self) -> bool {
        match self {
            Actor::Web(u) => u.is_super_admin,
            Actor::Mobile(u) => u.is_super_admin,
        }
    }

    pub fn deleted_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        match self {
            Actor::Web(u) => u.deleted_at,
            Actor::Mobile(u) => u.deleted_at,
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Actor::Mobile(u) if u.is_blocked)
    }
}
