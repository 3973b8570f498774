#[cfg(feature = "api")]
pub mod api;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod models;
#[cfg(feature = "sqlx")]
pub mod operations;
pub mod resolver;

pub mod prelude {
    #[cfg(feature = "api")]
    pub use crate::api::{AppError, DashboardApp, HasPool};
    #[cfg(feature = "sqlx")]
    pub use crate::db::{
        create_dashboard_tables, ensure_organization, get_config, insert_project, insert_revision,
        list_projects, list_revisions, load_organization, load_project, upsert_config,
    };
    pub use crate::error::{ErrorKind, LibError, Result};
    pub use crate::models::{
        ConfigData, ConfigId, CreateProjectPayload, CreateRevisionPayload, OrgId, Organization,
        Project, ProjectConfig, ProjectId, ProjectView, RequestIdentity, Revision, RevisionId,
        SaveConfigPayload, UserId,
    };
    #[cfg(feature = "sqlx")]
    pub use crate::operations::{DashboardOperations, NoopViewCache, ViewCache};
    pub use crate::resolver::{parse_requested_revision, select_active_revision};
    #[cfg(feature = "sqlx")]
    pub use crate::resolver::resolve_project_view;
}
