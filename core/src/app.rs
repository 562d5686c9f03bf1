use std::sync::Arc;

use axum::extract::{FromRef, Request, State};
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderName, HeaderValue, Method, StatusCode,
};
use axum::middleware;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use common_auth::{JwtConfig, JwtVerifier};
use reqwest::Client;
use sqlx::PgPool;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::AppConfig;
use crate::handlers;
use crate::metrics::CoreMetrics;
use crate::outbound::OptimizerClient;
use crate::pipeline::{request_context_pipeline, PipelineDeps};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub jwt_verifier: Arc<JwtVerifier>,
    pub config: Arc<AppConfig>,
    pub http_client: Client,
    pub metrics: Arc<CoreMetrics>,
    pub optimizer: OptimizerClient,
}

impl FromRef<AppState> for PipelineDeps {
    fn from_ref(state: &AppState) -> Self {
        PipelineDeps {
            db: state.db.clone(),
            jwt_verifier: state.jwt_verifier.clone(),
            metrics: state.metrics.clone(),
        }
    }
}

impl FromRef<AppState> for Arc<JwtVerifier> {
    fn from_ref(state: &AppState) -> Self {
        state.jwt_verifier.clone()
    }
}

pub fn jwt_verifier_from_config(config: &AppConfig) -> Arc<JwtVerifier> {
    let jwt_config = JwtConfig::new(config.jwt.secret.clone()).with_leeway(5);
    Arc::new(JwtVerifier::new(jwt_config))
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics(axum::extract::State(state): axum::extract::State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(error = %err, "failed to render metrics");
            (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed")
                .into_response()
        }
    }
}

/// Builds the router with the request-context pipeline wrapping every
/// route — illustrative handlers underneath it exercise the substrate's
/// contract, not a full business API.
pub fn build_router(state: AppState) -> Router {
    let pipeline_deps = PipelineDeps::from_ref(&state);
    let cors = cors_layer(&state.config.cors_allowed_origins);

    let guarded = Router::new()
        .route(
            "/missions",
            post(handlers::missions::create_mission).get(handlers::missions::list_missions),
        )
        .route(
            "/vehicles",
            post(handlers::vehicles::create_vehicle).get(handlers::vehicles::list_vehicles),
        )
        .route(
            "/admin/invites",
            post(handlers::admin::create_invite),
        )
        .route(
            "/admin/balance/purchase",
            post(handlers::admin::purchase_balance),
        )
        .route(
            "/admin/branches",
            post(handlers::admin::create_branch),
        )
        .layer(middleware::from_fn_with_state(
            pipeline_deps,
            request_context_pipeline,
        ));

    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/mobile/register", post(handlers::auth::register_mobile))
        .merge(guarded)
        .layer(middleware::from_fn_with_state(state.clone(), clear_cookies_on_unauthenticated))
        .with_state(state)
        .layer(cors)
}

/// Builds the CORS layer from configured origins. Methods/headers mirror
/// what the web and mobile clients actually send; the allow-list is
/// explicit rather than a wildcard since cookies carry credentials.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(
            allowed_origins
                .iter()
                .filter_map(|origin| origin.parse::<HeaderValue>().ok())
                .collect::<Vec<_>>(),
        ))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            ACCEPT,
            CONTENT_TYPE,
            HeaderName::from_static("authorization"),
            HeaderName::from_static("x-tenant-id"),
        ])
}

/// 401 responses on the web channel clear both auth cookies, so a stale
/// cookie never keeps bouncing the client back to the same rejected
/// session. Applied as the outermost layer so it sees the final status of
/// every route, including ones the request-context pipeline itself
/// rejected before a handler ran.
async fn clear_cookies_on_unauthenticated(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let mut response = next.run(req).await;
    if response.status() == StatusCode::UNAUTHORIZED {
        handlers::auth::append_clear_cookie_headers(response.headers_mut(), &state.config.cookies);
    }
    response
}
