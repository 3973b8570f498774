use std::sync::Arc;

use sqlx::PgPool;

use crate::db;
use crate::error::Result;
use crate::models::{
    CreateProjectPayload, CreateRevisionPayload, Project, ProjectConfig, ProjectId, ProjectView,
    RequestIdentity, Revision, RevisionId, SaveConfigPayload,
};
use crate::resolver;

/// Hook for the external rendering layer's view cache. Mutations report the
/// view paths they touched after a successful write; the hook runs outside
/// the write itself and cannot undo it.
pub trait ViewCache: Send + Sync {
    fn invalidate(&self, path: &str);
}

/// Default hook for embedders without a cached rendering layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopViewCache;

impl ViewCache for NoopViewCache {
    fn invalidate(&self, _path: &str) {}
}

pub fn project_index_path() -> &'static str {
    "/dashboard/projects"
}

pub fn project_detail_path(project_id: ProjectId) -> String {
    format!("/dashboard/projects/{}", project_id)
}

/// High-level dashboard actions.
///
/// Callers must provide a trusted `identity` sourced from validated
/// auth/session state, not from request bodies.
#[derive(Clone)]
pub struct DashboardOperations {
    pool: Arc<PgPool>,
    view_cache: Arc<dyn ViewCache>,
}

impl DashboardOperations {
    pub fn new(pool: Arc<PgPool>, view_cache: Arc<dyn ViewCache>) -> Self {
        Self { pool, view_cache }
    }

    pub fn from_pool(pool: &PgPool) -> Self {
        Self {
            pool: Arc::new(pool.clone()),
            view_cache: Arc::new(NoopViewCache),
        }
    }

    pub fn pool(&self) -> Arc<PgPool> {
        Arc::clone(&self.pool)
    }

    pub async fn list_projects(&self, identity: &RequestIdentity) -> Result<Vec<Project>> {
        identity.require_user()?;
        let org_id = identity.require_org()?;
        db::list_projects(&self.pool, org_id).await
    }

    pub async fn project_view(
        &self,
        identity: &RequestIdentity,
        project_id: ProjectId,
        requested: Option<RevisionId>,
    ) -> Result<ProjectView> {
        identity.require_user()?;
        let org_id = identity.require_org()?;
        resolver::resolve_project_view(&self.pool, org_id, project_id, requested).await
    }

    pub async fn create_project(
        &self,
        identity: &RequestIdentity,
        payload: CreateProjectPayload,
    ) -> Result<Project> {
        let user_id = identity.require_user()?.clone();
        let org_id = identity.require_org()?.clone();
        let name = payload.normalize()?;

        db::ensure_organization(&self.pool, &org_id).await?;
        let project = db::insert_project(&self.pool, &org_id, &user_id, &name).await?;

        self.view_cache.invalidate(project_index_path());
        Ok(project)
    }

    pub async fn create_revision(
        &self,
        identity: &RequestIdentity,
        project_id: ProjectId,
        payload: CreateRevisionPayload,
    ) -> Result<Revision> {
        let user_id = identity.require_user()?.clone();
        let org_id = identity.require_org()?.clone();
        let draft = payload.normalize()?;

        // The project must be visible to the caller's organization before any
        // write lands under it.
        db::load_project(&self.pool, &org_id, project_id).await?;
        let revision = db::insert_revision(&self.pool, project_id, &user_id, &draft).await?;

        self.view_cache.invalidate(&project_detail_path(project_id));
        Ok(revision)
    }

    pub async fn save_config(
        &self,
        identity: &RequestIdentity,
        project_id: ProjectId,
        payload: SaveConfigPayload,
    ) -> Result<ProjectConfig> {
        let user_id = identity.require_user()?.clone();
        let org_id = identity.require_org()?.clone();
        let draft = payload.normalize()?;

        db::load_project(&self.pool, &org_id, project_id).await?;
        let config = db::upsert_config(
            &self.pool,
            project_id,
            draft.revision_id,
            &user_id,
            &draft.data,
        )
        .await?;

        self.view_cache.invalidate(&project_detail_path(project_id));
        Ok(config)
    }
}
