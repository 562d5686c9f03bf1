use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::Argon2;
use rand_core::OsRng;
use reqwest::Client;
use tokio::net::TcpListener;
use tracing::info;
use uuid::Uuid;

use routing_core::app::{build_router, jwt_verifier_from_config, AppState};
use routing_core::config::{load_app_config, SuperAdminSeed};
use routing_core::db::{build_pool, ensure_role};
use routing_core::metrics::CoreMetrics;
use routing_core::outbound::OptimizerClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = load_app_config().context("Failed to load configuration")?;

    let db = build_pool(&config.db).await?;

    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .context("Failed to run database migrations")?;

    ensure_role(&db)
        .await
        .context("Failed to bootstrap app_rls role")?;

    if let Some(seed) = &config.seed_super_admin {
        seed_super_admin(&db, seed)
            .await
            .context("Failed to seed superadmin user")?;
    }

    let jwt_verifier = jwt_verifier_from_config(&config);
    let metrics = Arc::new(CoreMetrics::new().context("Failed to initialize metrics")?);
    let http_client = Client::builder()
        .build()
        .context("Failed to build outbound HTTP client")?;
    let optimizer = OptimizerClient::new(
        http_client.clone(),
        config.vroom_url.clone(),
        config.osrm_url.clone(),
    );

    let host = config.host.clone();
    let port = config.port;

    let state = AppState {
        db,
        jwt_verifier,
        config: Arc::new(config),
        http_client,
        metrics,
        optimizer,
    };

    let app = build_router(state);

    let ip: std::net::IpAddr = host.parse().context("Invalid HOST")?;
    let addr = SocketAddr::from((ip, port));
    info!(%addr, "starting routing-core");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Idempotently ensures a superadmin web user exists, gated by
/// `SEED_SUPER_ADMIN`. Run after migrations/RLS bootstrap but
/// outside any tenant transaction — a superadmin row has no `companyId` to
/// scope by.
async fn seed_super_admin(db: &sqlx::PgPool, seed: &SuperAdminSeed) -> anyhow::Result<()> {
    let existing: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM web_user WHERE lower(username) = $1")
            .bind(seed.username.trim().to_ascii_lowercase())
            .fetch_optional(db)
            .await?;

    if existing.is_some() {
        return Ok(());
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(seed.password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("failed to hash superadmin password: {e}"))?
        .to_string();

    sqlx::query(
        "INSERT INTO web_user \
         (id, username, password_hash, email, company_id, is_super_admin, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, NULL, true, now(), now())",
    )
    .bind(Uuid::new_v4())
    .bind(seed.username.trim().to_ascii_lowercase())
    .bind(&password_hash)
    .bind(&seed.email)
    .execute(db)
    .await?;

    info!(username = %seed.username, "seeded superadmin user");
    Ok(())
}
