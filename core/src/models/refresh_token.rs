use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub mobile_user_id: Option<Uuid>,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
    pub family_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Identifies which actor kind a refresh token belongs to. Exactly one of
/// `UserId`/`MobileUserId` is ever populated on a row.
#[derive(Debug, Clone, Copy)]
pub enum RefreshTokenOwner {
    Web(Uuid),
    Mobile(Uuid),
}

impl RefreshToken {
    pub fn owner(&self) -> Option<RefreshTokenOwner> {
        match (self.user_id, self.mobile_user_id) {
            (Some(id), None) => Some(RefreshTokenOwner::Web(id)),
            (None, Some(id)) => Some(RefreshTokenOwner::Mobile(id)),
            _ => None,
        }
    }
}
