use sqlx::Transaction;
use uuid::Uuid;

use crate::errors::AppError;

/// Per-request ambient state. This is the explicit value passed instead of
/// a hidden global: every handler and repository function that needs
/// tenant scope, actor identity, or the open transaction takes a
/// `&RequestContext` (or `&mut RequestContext` for the DB handle) as its
/// first argument. There is no hidden global backing this type; the only
/// place ambient storage appears at all is `task_local` below, and that
/// exists solely to bridge axum's extractor machinery (which instantiates
/// handler arguments itself, with no call site to pass a parameter through)
/// into the pipeline that builds this value.
pub struct RequestContext {
    pub company_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
    pub user_id: Uuid,
    pub actor_type: ActorType,
    pub is_super_admin: bool,
    pub role_name: Option<String>,
    pub permissions: Vec<String>,
    db: Option<Transaction<'static, sqlx::Postgres>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    Web,
    Mobile,
}

impl From<common_auth::ActorType> for ActorType {
    fn from(value: common_auth::ActorType) -> Self {
        match value {
            common_auth::ActorType::Web => ActorType::Web,
            common_auth::ActorType::Mobile => ActorType::Mobile,
        }
    }
}

/// A `snapshot()` of a `RequestContext` with the DB handle stripped out —
/// the only form that can cross a queue boundary.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ContextSnapshot {
    pub company_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
    pub user_id: Uuid,
    pub actor_type: SnapshotActorType,
    pub is_super_admin: bool,
    pub role_name: Option<String>,
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotActorType {
    Web,
    Mobile,
}

impl From<ActorType> for SnapshotActorType {
    fn from(value: ActorType) -> Self {
        match value {
            ActorType::Web => SnapshotActorType::Web,
            ActorType::Mobile => SnapshotActorType::Mobile,
        }
    }
}

impl From<SnapshotActorType> for ActorType {
    fn from(value: SnapshotActorType) -> Self {
        match value {
            SnapshotActorType::Web => ActorType::Web,
            SnapshotActorType::Mobile => ActorType::Mobile,
        }
    }
}

impl RequestContext {
    pub fn new(
        user_id: Uuid,
        actor_type: ActorType,
        is_super_admin: bool,
        company_id: Option<Uuid>,
        branch_id: Option<Uuid>,
        role_name: Option<String>,
        permissions: Vec<String>,
        db: Option<Transaction<'static, sqlx::Postgres>>,
    ) -> Self {
        Self {
            company_id,
            branch_id,
            user_id,
            actor_type,
            is_super_admin,
            role_name,
            permissions,
            db,
        }
    }

    /// The transaction-bound DB handle for this request, if one was opened;
    /// absent only for the no-txn anonymous path.
    pub fn db(&mut self) -> Option<&mut Transaction<'static, sqlx::Postgres>> {
        self.db.as_mut()
    }

    pub fn take_db(&mut self) -> Option<Transaction<'static, sqlx::Postgres>> {
        self.db.take()
    }

    pub fn require_company_id(&self) -> Result<Uuid, AppError> {
        self.company_id
            .ok_or_else(|| AppError::unauthenticated("no company scope on context"))
    }

    /// Application-level branch narrowing on top of company-level RLS.
    /// A superadmin or `companyAdmin` may request any branch
    /// in scope; everyone else is pinned to their own branch regardless of
    /// what the query asked for.
    pub fn effective_branch_id(&self, query_branch_id: Option<Uuid>) -> Option<Uuid> {
        let is_company_admin = self
            .role_name
            .as_deref()
            .map(crate::constants::is_reserved_role_name)
            .unwrap_or(false);

        if self.is_super_admin || is_company_admin {
            query_branch_id
        } else {
            self.branch_id
        }
    }

    /// Serializable view with the DB handle stripped, for queue hand-off.
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            company_id: self.company_id,
            branch_id: self.branch_id,
            user_id: self.user_id,
            actor_type: self.actor_type.into(),
            is_super_admin: self.is_super_admin,
            role_name: self.role_name.clone(),
            permissions: self.permissions.clone(),
        }
    }
}

tokio::task_local! {
    /// Bridges `RequestContext` from the pipeline's middleware layer into
    /// axum extractors the framework instantiates without a call-site hook.
    /// Every function this crate writes past that single boundary takes
    /// `&RequestContext` explicitly instead of reaching back into this cell.
    static CURRENT: std::cell::RefCell<Option<RequestContext>>;
}

/// Installs `ctx`, runs `f` with access to it, and restores prior state on
/// return. This is the pipeline's sole caller.
pub async fn run<F, Fut, T>(ctx: RequestContext, f: F) -> T
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = T>,
{
    CURRENT
        .scope(std::cell::RefCell::new(Some(ctx)), f())
        .await
}

/// Removes and returns the installed context, for the axum extractor that
/// hands handlers their `RequestContext` by value. Panics if called outside
/// `run`'s scope or a second time within it — both indicate a pipeline bug.
pub fn take_installed() -> RequestContext {
    CURRENT.with(|cell| {
        cell.borrow_mut()
            .take()
            .expect("RequestContext not installed for this task")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(is_super_admin: bool, role_name: Option<&str>, branch_id: Uuid) -> RequestContext {
        RequestContext::new(
            Uuid::new_v4(),
            ActorType::Web,
            is_super_admin,
            Some(Uuid::new_v4()),
            Some(branch_id),
            role_name.map(String::from),
            Vec::new(),
            None,
        )
    }

    #[test]
    fn superadmin_gets_the_queried_branch() {
        let own_branch = Uuid::new_v4();
        let queried = Uuid::new_v4();
        let c = ctx(true, None, own_branch);
        assert_eq!(c.effective_branch_id(Some(queried)), Some(queried));
    }

    #[test]
    fn company_admin_gets_the_queried_branch() {
        let own_branch = Uuid::new_v4();
        let queried = Uuid::new_v4();
        let c = ctx(false, Some("companyAdmin"), own_branch);
        assert_eq!(c.effective_branch_id(Some(queried)), Some(queried));
    }

    #[test]
    fn regular_actor_is_pinned_to_their_own_branch_regardless_of_query() {
        let own_branch = Uuid::new_v4();
        let queried = Uuid::new_v4();
        let c = ctx(false, Some("dispatcher"), own_branch);
        assert_eq!(c.effective_branch_id(Some(queried)), Some(own_branch));
    }

    #[test]
    fn regular_actor_with_no_query_still_gets_their_own_branch() {
        let own_branch = Uuid::new_v4();
        let c = ctx(false, None, own_branch);
        assert_eq!(c.effective_branch_id(None), Some(own_branch));
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let c = ctx(false, Some("dispatcher"), Uuid::new_v4());
        let snapshot = c.snapshot();
        let json = serde_json::to_string(&snapshot).expect("serialize");
        let restored: ContextSnapshot = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored.user_id, snapshot.user_id);
        assert_eq!(restored.company_id, snapshot.company_id);
        assert_eq!(restored.role_name, snapshot.role_name);
    }
}
