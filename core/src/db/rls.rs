use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;

/// The non-privileged role every tenant transaction runs as. Lacks any
/// privilege that would bypass row-level policies.
pub const APP_RLS_ROLE: &str = "app_rls";

/// The two session variables that drive every tenant-isolation policy.
/// Both are set with `SET LOCAL` / `set_config(..., true)` and
/// are therefore transaction-scoped — they never leak across a pooled
/// connection's next checkout.
pub const SESSION_VAR_IS_SUPERADMIN: &str = "app.is_superadmin";
pub const SESSION_VAR_COMPANY_ID: &str = "app.current_company_id";

/// The row-level policy text attached to every tenant-scoped table.
/// Visible/mutable iff the session claims superadmin, or the row's
/// `company_id` matches the session's tenant.
pub const TENANT_ISOLATION_POLICY_USING: &str = "\
    COALESCE(current_setting('app.is_superadmin', true), 'false') = 'true' \
    OR company_id = NULLIF(current_setting('app.current_company_id', true), '')::uuid";

/// Idempotently ensures the restricted database role exists with the right
/// grants. Run once at process startup against a privileged connection;
/// safe to retry.
pub async fn ensure_role(pool: &PgPool) -> Result<()> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM pg_roles WHERE rolname = $1)",
    )
    .bind(APP_RLS_ROLE)
    .fetch_one(pool)
    .await
    .context("Failed to check for app_rls role")?;

    if !exists {
        let stmt = format!("CREATE ROLE {APP_RLS_ROLE} NOINHERIT NOLOGIN");
        sqlx::query(&stmt)
            .execute(pool)
            .await
            .context("Failed to create app_rls role")?;
        info!(role = APP_RLS_ROLE, "created RLS application role");
    }

    sqlx::query(&format!("GRANT USAGE ON SCHEMA public TO {APP_RLS_ROLE}"))
        .execute(pool)
        .await
        .context("Failed to grant schema usage to app_rls")?;

    sqlx::query(&format!(
        "GRANT SELECT, INSERT, UPDATE, DELETE ON ALL TABLES IN SCHEMA public TO {APP_RLS_ROLE}"
    ))
    .execute(pool)
    .await
    .context("Failed to grant table privileges to app_rls")?;

    sqlx::query(&format!(
        "ALTER DEFAULT PRIVILEGES IN SCHEMA public \
         GRANT SELECT, INSERT, UPDATE, DELETE ON TABLES TO {APP_RLS_ROLE}"
    ))
    .execute(pool)
    .await
    .context("Failed to set default privileges for app_rls")?;

    info!("app_rls role bootstrap complete");
    Ok(())
}

/// Returns the `CREATE POLICY` statement for a tenant-scoped table. The SQL
/// migrations under `core/migrations` embed this same text directly (sqlx
/// migrations are static files, not generated at runtime); this function is
/// the single source of truth they're kept in sync with, and what the test
/// below guards against drifting.
pub fn tenant_isolation_policy(table: &str) -> String {
    format!(
        "CREATE POLICY {table}_tenant_isolation ON {table} \
         USING ({using}) WITH CHECK ({using})",
        table = table,
        using = TENANT_ISOLATION_POLICY_USING,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_text_references_both_session_variables() {
        let policy = tenant_isolation_policy("missions");
        assert!(policy.contains(SESSION_VAR_IS_SUPERADMIN));
        assert!(policy.contains(SESSION_VAR_COMPANY_ID));
        assert!(policy.contains("missions_tenant_isolation"));
    }
}
