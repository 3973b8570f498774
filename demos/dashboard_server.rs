use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::{Next, from_fn_with_state};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use substation_dashboard::api::{DashboardApp, HasPool};
use substation_dashboard::models::{OrgId, RequestIdentity, UserId};

#[derive(Clone)]
struct DevIdentityConfig {
    default_user_id: String,
    default_org_id: String,
    require_dev_headers: bool,
}

#[derive(Clone)]
struct DemoApp {
    pool: Arc<PgPool>,
    identity: DevIdentityConfig,
}

impl HasPool for DemoApp {
    fn pool(&self) -> Arc<PgPool> {
        Arc::clone(&self.pool)
    }
}

impl DashboardApp for DemoApp {}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let database_url = env::var("DATABASE_URL")
        .context("DATABASE_URL is required to run demos/dashboard_server.rs")?;
    let bind = env::var("DASHBOARD_DEMO_BIND").unwrap_or_else(|_| "127.0.0.1:4020".to_string());
    let bind_addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid DASHBOARD_DEMO_BIND '{}'", bind))?;

    let identity = DevIdentityConfig {
        default_user_id: env::var("DASHBOARD_DEMO_DEFAULT_USER_ID")
            .unwrap_or_else(|_| "user_demo".to_string()),
        default_org_id: env::var("DASHBOARD_DEMO_DEFAULT_ORG_ID")
            .unwrap_or_else(|_| "org_demo".to_string()),
        require_dev_headers: env_flag("DASHBOARD_DEMO_REQUIRE_DEV_HEADERS"),
    };

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
        .context("failed to connect to postgres")?;

    substation_dashboard::db::create_dashboard_tables(&pool)
        .await
        .context("failed to run dashboard migrations")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to postgres")?;

    let app_state = DemoApp {
        pool: Arc::new(pool),
        identity,
    };

    let app = Router::new()
        .route("/healthz", get(health_handler))
        .route("/demo/whoami", get(whoami_handler))
        .merge(substation_dashboard::api::routes::<DemoApp>())
        .layer(from_fn_with_state(
            app_state.clone(),
            dev_identity_middleware,
        ))
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind listener on {}", bind_addr))?;

    tracing::info!("dashboard demo server listening on http://{}", bind_addr);
    tracing::info!("identity shim headers: x-dev-user-id, x-dev-org-id");
    tracing::info!("blank header values drop that identity part to exercise the redirects");
    tracing::info!("set DASHBOARD_DEMO_REQUIRE_DEV_HEADERS=true to disable the defaults");

    axum::serve(listener, app)
        .await
        .context("dashboard demo server failed")
}

fn env_flag(name: &str) -> bool {
    match env::var(name) {
        Ok(value) => {
            let normalized = value.trim().to_ascii_lowercase();
            normalized == "1" || normalized == "true" || normalized == "yes"
        }
        Err(_) => false,
    }
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "ok": true
    }))
}

async fn whoami_handler(identity: RequestIdentity) -> Json<serde_json::Value> {
    Json(json!({
        "userId": identity.user_id.as_ref().map(|user| user.as_str()),
        "orgId": identity.org_id.as_ref().map(|org| org.as_str()),
    }))
}

/// Stands in for the production session middleware: identities come from
/// request headers, falling back to configured defaults unless
/// DASHBOARD_DEMO_REQUIRE_DEV_HEADERS is set.
async fn dev_identity_middleware(
    State(app): State<DemoApp>,
    mut req: Request,
    next: Next,
) -> Response {
    let headers = req.headers();
    let user_id = header_identity(
        headers,
        "x-dev-user-id",
        &app.identity.default_user_id,
        app.identity.require_dev_headers,
    );
    let org_id = header_identity(
        headers,
        "x-dev-org-id",
        &app.identity.default_org_id,
        app.identity.require_dev_headers,
    );

    let identity = RequestIdentity::new(user_id.map(UserId), org_id.map(OrgId));
    req.extensions_mut().insert(identity);
    next.run(req).await
}

/// A present-but-blank header means "no identity"; a missing header uses the
/// default unless defaults are disabled.
fn header_identity(
    headers: &HeaderMap,
    key: &str,
    default: &str,
    require_header: bool,
) -> Option<String> {
    match headers.get(key).and_then(|value| value.to_str().ok()) {
        Some(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        None if require_header => None,
        None => Some(default.to_string()),
    }
}
