use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::{FromRequestParts, Path, Query, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;

use crate::error::{ErrorKind, LibError};
use crate::models::{
    CreateProjectPayload, CreateRevisionPayload, ProjectId, RequestIdentity, SaveConfigPayload,
};
use crate::operations::{
    DashboardOperations, NoopViewCache, ViewCache, project_detail_path, project_index_path,
};
use crate::resolver;

/// Where the auth provider sends callers without a session.
pub const SIGN_IN_PATH: &str = "/sign-in";
/// Where signed-in callers without an active organization are sent.
pub const ORGANIZATION_SELECTION_PATH: &str = "/onboarding/organization-selection";

#[derive(Debug)]
pub struct AppError(pub LibError);

impl From<LibError> for AppError {
    fn from(value: LibError) -> Self {
        Self(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(
            kind = ?self.0.kind,
            code = self.0.code,
            error = %self.0.source,
            "dashboard request failed"
        );

        match self.0.kind {
            ErrorKind::Unauthenticated => Redirect::to(SIGN_IN_PATH).into_response(),
            ErrorKind::NoActiveTenant => {
                Redirect::to(ORGANIZATION_SELECTION_PATH).into_response()
            }
            ErrorKind::NotFound => (StatusCode::NOT_FOUND, self.0.public).into_response(),
            ErrorKind::Conflict => (StatusCode::CONFLICT, self.0.public).into_response(),
            ErrorKind::InvalidInput => (StatusCode::BAD_REQUEST, self.0.public).into_response(),
            ErrorKind::Database | ErrorKind::Unknown => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.0.public).into_response()
            }
        }
    }
}

/// Identity is populated by the embedding application's session middleware;
/// requests that never passed through it read as anonymous.
impl<S> FromRequestParts<S> for RequestIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestIdentity>()
            .cloned()
            .unwrap_or_default())
    }
}

pub trait HasPool {
    fn pool(&self) -> Arc<sqlx::PgPool>;
}

pub trait DashboardApp: HasPool {
    fn view_cache(&self) -> Arc<dyn ViewCache> {
        Arc::new(NoopViewCache)
    }

    fn operations(&self) -> DashboardOperations {
        DashboardOperations::new(self.pool(), self.view_cache())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ProjectViewQuery {
    rev: Option<String>,
}

async fn list_projects_handler<S>(
    State(app): State<S>,
    identity: RequestIdentity,
) -> Result<impl IntoResponse, AppError>
where
    S: DashboardApp + Clone + Send + Sync + 'static,
{
    let projects = app.operations().list_projects(&identity).await?;
    Ok(Json(projects))
}

async fn create_project_handler<S>(
    State(app): State<S>,
    identity: RequestIdentity,
    Form(payload): Form<CreateProjectPayload>,
) -> Result<impl IntoResponse, AppError>
where
    S: DashboardApp + Clone + Send + Sync + 'static,
{
    app.operations().create_project(&identity, payload).await?;
    Ok(Redirect::to(project_index_path()))
}

async fn project_view_handler<S>(
    State(app): State<S>,
    identity: RequestIdentity,
    Path(project_id): Path<ProjectId>,
    Query(query): Query<ProjectViewQuery>,
) -> Result<impl IntoResponse, AppError>
where
    S: DashboardApp + Clone + Send + Sync + 'static,
{
    let requested = resolver::parse_requested_revision(query.rev.as_deref());
    let view = app
        .operations()
        .project_view(&identity, project_id, requested)
        .await?;
    Ok(Json(view))
}

async fn create_revision_handler<S>(
    State(app): State<S>,
    identity: RequestIdentity,
    Path(project_id): Path<ProjectId>,
    Form(payload): Form<CreateRevisionPayload>,
) -> Result<impl IntoResponse, AppError>
where
    S: DashboardApp + Clone + Send + Sync + 'static,
{
    app.operations()
        .create_revision(&identity, project_id, payload)
        .await?;
    Ok(Redirect::to(&project_detail_path(project_id)))
}

async fn save_config_handler<S>(
    State(app): State<S>,
    identity: RequestIdentity,
    Path(project_id): Path<ProjectId>,
    Form(payload): Form<SaveConfigPayload>,
) -> Result<impl IntoResponse, AppError>
where
    S: DashboardApp + Clone + Send + Sync + 'static,
{
    app.operations()
        .save_config(&identity, project_id, payload)
        .await?;
    Ok(Redirect::to(&project_detail_path(project_id)))
}

pub fn routes<S>() -> Router<S>
where
    S: DashboardApp + Clone + Send + Sync + 'static,
{
    tracing::info!("Registering route /dashboard/projects [GET,POST]");
    tracing::info!("Registering route /dashboard/projects/{{project_id}} [GET]");
    tracing::info!("Registering route /dashboard/projects/{{project_id}}/revisions [POST]");
    tracing::info!("Registering route /dashboard/projects/{{project_id}}/config [POST]");

    Router::new()
        .route(
            "/dashboard/projects",
            get(list_projects_handler::<S>).post(create_project_handler::<S>),
        )
        .route(
            "/dashboard/projects/{project_id}",
            get(project_view_handler::<S>),
        )
        .route(
            "/dashboard/projects/{project_id}/revisions",
            post(create_revision_handler::<S>),
        )
        .route(
            "/dashboard/projects/{project_id}/config",
            post(save_config_handler::<S>),
        )
}
