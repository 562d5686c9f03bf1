use uuid::Uuid;

use crate::context::{ActorType, RequestContext};
use crate::errors::AppError;

/// Whether a guarded operation is a self-service read/update, which mobile
/// actors may always perform on their own account regardless of permission
/// set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelfServiceScope {
    None,
    ReadSelf { mobile_user_id: Uuid },
    UpdateSelf { mobile_user_id: Uuid },
}

/// Decides allow/deny for a handler's declared required-permission set
/// against the current context.
pub fn authorize(
    ctx: &RequestContext,
    required: &[&str],
    scope: SelfServiceScope,
) -> Result<(), AppError> {
    if required.is_empty() {
        return Ok(());
    }

    if ctx.is_super_admin {
        return Ok(());
    }

    if ctx.actor_type == ActorType::Mobile {
        let self_service = match scope {
            SelfServiceScope::ReadSelf { mobile_user_id }
            | SelfServiceScope::UpdateSelf { mobile_user_id } => mobile_user_id == ctx.user_id,
            SelfServiceScope::None => false,
        };
        if self_service {
            return Ok(());
        }
    }

    let has_all = required
        .iter()
        .all(|perm| ctx.permissions.iter().any(|p| p == perm));

    if has_all {
        Ok(())
    } else {
        Err(AppError::forbidden(
            required.iter().map(|s| s.to_string()).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(is_super_admin: bool, actor_type: ActorType, permissions: Vec<&str>, user_id: Uuid) -> RequestContext {
        RequestContext::new(
            user_id,
            actor_type,
            is_super_admin,
            Some(Uuid::new_v4()),
            None,
            None,
            permissions.into_iter().map(String::from).collect(),
            None,
        )
    }

    #[test]
    fn empty_requirement_always_allows() {
        let c = ctx(false, ActorType::Web, vec![], Uuid::new_v4());
        assert!(authorize(&c, &[], SelfServiceScope::None).is_ok());
    }

    #[test]
    fn superadmin_bypasses_everything() {
        let c = ctx(true, ActorType::Web, vec![], Uuid::new_v4());
        assert!(authorize(&c, &["missions:create"], SelfServiceScope::None).is_ok());
    }

    #[test]
    fn missing_permission_is_forbidden() {
        let c = ctx(false, ActorType::Web, vec!["missions:read"], Uuid::new_v4());
        assert!(authorize(&c, &["missions:create"], SelfServiceScope::None).is_err());
    }

    #[test]
    fn mobile_actor_may_read_self_without_permission() {
        let user_id = Uuid::new_v4();
        let c = ctx(false, ActorType::Mobile, vec![], user_id);
        let scope = SelfServiceScope::ReadSelf { mobile_user_id: user_id };
        assert!(authorize(&c, &["mobile-users:read"], scope).is_ok());
    }

    #[test]
    fn mobile_actor_cannot_use_self_service_on_another_user() {
        let c = ctx(false, ActorType::Mobile, vec![], Uuid::new_v4());
        let scope = SelfServiceScope::ReadSelf { mobile_user_id: Uuid::new_v4() };
        assert!(authorize(&c, &["mobile-users:read"], scope).is_err());
    }

    #[test]
    fn web_actor_does_not_get_self_service_exemption() {
        let user_id = Uuid::new_v4();
        let c = ctx(false, ActorType::Web, vec![], user_id);
        let scope = SelfServiceScope::ReadSelf { mobile_user_id: user_id };
        assert!(authorize(&c, &["mobile-users:read"], scope).is_err());
    }
}
