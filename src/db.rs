use anyhow::anyhow;
use once_cell::sync::Lazy;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{LibError, Result};
use crate::models::{
    ConfigData, ConfigId, OrgId, Organization, Project, ProjectConfig, ProjectId, Revision,
    RevisionDraft, RevisionId, UserId,
};

pub static MIGRATOR: Lazy<Migrator> = Lazy::new(|| {
    let mut migrator = sqlx::migrate!("./migrations");
    migrator.set_ignore_missing(true);
    migrator
});

pub async fn create_dashboard_tables(pool: &PgPool) -> std::result::Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[derive(Debug, Clone, FromRow)]
struct OrganizationRow {
    id: String,
    stripe_customer_id: Option<String>,
    stripe_subscription_id: Option<String>,
    stripe_subscription_price_id: Option<String>,
    stripe_subscription_status: Option<String>,
    stripe_subscription_current_period_end: Option<i64>,
    created_at: chrono::NaiveDateTime,
    updated_at: chrono::NaiveDateTime,
}

#[derive(Debug, Clone, FromRow)]
struct ProjectRow {
    id: Uuid,
    organization_id: String,
    created_by: String,
    name: String,
    created_at: chrono::NaiveDateTime,
    updated_at: chrono::NaiveDateTime,
}

#[derive(Debug, Clone, FromRow)]
struct RevisionRow {
    id: Uuid,
    project_id: Uuid,
    created_by: String,
    version_label: String,
    comment: Option<String>,
    created_at: chrono::NaiveDateTime,
    updated_at: chrono::NaiveDateTime,
}

#[derive(Debug, Clone, FromRow)]
struct ProjectConfigRow {
    id: Uuid,
    project_id: Uuid,
    revision_id: Option<Uuid>,
    created_by: String,
    data: serde_json::Value,
    created_at: chrono::NaiveDateTime,
    updated_at: chrono::NaiveDateTime,
}

impl From<OrganizationRow> for Organization {
    fn from(value: OrganizationRow) -> Self {
        Self {
            id: OrgId(value.id),
            stripe_customer_id: value.stripe_customer_id,
            stripe_subscription_id: value.stripe_subscription_id,
            stripe_subscription_price_id: value.stripe_subscription_price_id,
            stripe_subscription_status: value.stripe_subscription_status,
            stripe_subscription_current_period_end: value.stripe_subscription_current_period_end,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

impl From<ProjectRow> for Project {
    fn from(value: ProjectRow) -> Self {
        Self {
            id: ProjectId(value.id),
            organization_id: OrgId(value.organization_id),
            created_by: UserId(value.created_by),
            name: value.name,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

impl From<RevisionRow> for Revision {
    fn from(value: RevisionRow) -> Self {
        Self {
            id: RevisionId(value.id),
            project_id: ProjectId(value.project_id),
            created_by: UserId(value.created_by),
            version_label: value.version_label,
            comment: value.comment,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

impl From<ProjectConfigRow> for ProjectConfig {
    fn from(value: ProjectConfigRow) -> Self {
        Self {
            id: ConfigId(value.id),
            project_id: ProjectId(value.project_id),
            revision_id: value.revision_id.map(RevisionId),
            created_by: UserId(value.created_by),
            data: ConfigData::from_stored(value.data),
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

fn db_err(public: &'static str, err: sqlx::Error) -> LibError {
    LibError::database(public, anyhow!(err))
}

fn write_err(unique_public: &'static str, public: &'static str, err: sqlx::Error) -> LibError {
    let (unique, foreign_key) = match err.as_database_error() {
        Some(db) => (db.is_unique_violation(), db.is_foreign_key_violation()),
        None => (false, false),
    };
    if unique {
        LibError::conflict(unique_public, anyhow!(err))
    } else if foreign_key {
        LibError::conflict("The write references a row that no longer exists", anyhow!(err))
    } else {
        LibError::database(public, anyhow!(err))
    }
}

/// Insert-if-absent upsert so the first project created under a tenant lazily
/// materializes its organization row without a read-then-write race.
pub async fn ensure_organization(pool: &PgPool, org_id: &OrgId) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO dashboard.organizations (id)
        VALUES ($1)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(org_id.as_str())
    .execute(pool)
    .await
    .map_err(|err| db_err("Failed to ensure organization", err))?;

    Ok(())
}

pub async fn load_organization(pool: &PgPool, org_id: &OrgId) -> Result<Option<Organization>> {
    let row = sqlx::query_as::<_, OrganizationRow>(
        r#"
        SELECT
            id,
            stripe_customer_id,
            stripe_subscription_id,
            stripe_subscription_price_id,
            stripe_subscription_status,
            stripe_subscription_current_period_end,
            created_at,
            updated_at
        FROM dashboard.organizations
        WHERE id = $1
        "#,
    )
    .bind(org_id.as_str())
    .fetch_optional(pool)
    .await
    .map_err(|err| db_err("Failed to query organization", err))?;

    Ok(row.map(Organization::from))
}

pub async fn insert_project(
    pool: &PgPool,
    org_id: &OrgId,
    created_by: &UserId,
    name: &str,
) -> Result<Project> {
    let project_id = ProjectId(Uuid::new_v4());

    let row = sqlx::query_as::<_, ProjectRow>(
        r#"
        INSERT INTO dashboard.projects (id, organization_id, created_by, name)
        VALUES ($1, $2, $3, $4)
        RETURNING id, organization_id, created_by, name, created_at, updated_at
        "#,
    )
    .bind(project_id.0)
    .bind(org_id.as_str())
    .bind(created_by.as_str())
    .bind(name)
    .fetch_one(pool)
    .await
    .map_err(|err| {
        write_err(
            "A project with this name already exists in the organization",
            "Failed to create project",
            err,
        )
    })?;

    Ok(row.into())
}

pub async fn list_projects(pool: &PgPool, org_id: &OrgId) -> Result<Vec<Project>> {
    let rows = sqlx::query_as::<_, ProjectRow>(
        r#"
        SELECT id, organization_id, created_by, name, created_at, updated_at
        FROM dashboard.projects
        WHERE organization_id = $1
        ORDER BY updated_at DESC, id DESC
        "#,
    )
    .bind(org_id.as_str())
    .fetch_all(pool)
    .await
    .map_err(|err| db_err("Failed to list projects", err))?;

    Ok(rows.into_iter().map(Project::from).collect())
}

/// Projects are only visible through their owning organization; a guessed id
/// from another tenant reads the same as a missing row.
pub async fn load_project(
    pool: &PgPool,
    org_id: &OrgId,
    project_id: ProjectId,
) -> Result<Project> {
    let row = sqlx::query_as::<_, ProjectRow>(
        r#"
        SELECT id, organization_id, created_by, name, created_at, updated_at
        FROM dashboard.projects
        WHERE id = $1
          AND organization_id = $2
        "#,
    )
    .bind(project_id.0)
    .bind(org_id.as_str())
    .fetch_optional(pool)
    .await
    .map_err(|err| db_err("Failed to query project", err))?;

    row.map(Project::from).ok_or_else(|| {
        LibError::not_found(
            "Project not found",
            anyhow!("project {} not visible to organization {}", project_id, org_id),
        )
    })
}

pub async fn insert_revision(
    pool: &PgPool,
    project_id: ProjectId,
    created_by: &UserId,
    draft: &RevisionDraft,
) -> Result<Revision> {
    let revision_id = RevisionId(Uuid::new_v4());

    let row = sqlx::query_as::<_, RevisionRow>(
        r#"
        INSERT INTO dashboard.revisions (id, project_id, created_by, version_label, comment)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, project_id, created_by, version_label, comment, created_at, updated_at
        "#,
    )
    .bind(revision_id.0)
    .bind(project_id.0)
    .bind(created_by.as_str())
    .bind(&draft.version_label)
    .bind(&draft.comment)
    .fetch_one(pool)
    .await
    .map_err(|err| {
        write_err(
            "This version label is already used for the project",
            "Failed to create revision",
            err,
        )
    })?;

    Ok(row.into())
}

/// Newest first; the insertion sequence breaks created_at ties so the latest
/// revision is stable for concurrent readers.
pub async fn list_revisions(pool: &PgPool, project_id: ProjectId) -> Result<Vec<Revision>> {
    let rows = sqlx::query_as::<_, RevisionRow>(
        r#"
        SELECT id, project_id, created_by, version_label, comment, created_at, updated_at
        FROM dashboard.revisions
        WHERE project_id = $1
        ORDER BY created_at DESC, seq DESC
        "#,
    )
    .bind(project_id.0)
    .fetch_all(pool)
    .await
    .map_err(|err| db_err("Failed to list revisions", err))?;

    Ok(rows.into_iter().map(Revision::from).collect())
}

/// Atomic insert-or-replace keyed on (project_id, revision_id). The unique
/// index is declared NULLS NOT DISTINCT, so the revision-less default
/// configuration shares the same single-row guarantee.
pub async fn upsert_config(
    pool: &PgPool,
    project_id: ProjectId,
    revision_id: Option<RevisionId>,
    created_by: &UserId,
    data: &ConfigData,
) -> Result<ProjectConfig> {
    let config_id = ConfigId(Uuid::new_v4());
    let payload = serde_json::to_value(data)
        .map_err(|err| LibError::unknown("Failed to encode configuration", anyhow!(err)))?;

    let row = sqlx::query_as::<_, ProjectConfigRow>(
        r#"
        INSERT INTO dashboard.project_configs (id, project_id, revision_id, created_by, data)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (project_id, revision_id) DO UPDATE
        SET data = EXCLUDED.data,
            created_by = EXCLUDED.created_by,
            updated_at = CURRENT_TIMESTAMP
        RETURNING id, project_id, revision_id, created_by, data, created_at, updated_at
        "#,
    )
    .bind(config_id.0)
    .bind(project_id.0)
    .bind(revision_id.map(|revision| revision.0))
    .bind(created_by.as_str())
    .bind(&payload)
    .fetch_one(pool)
    .await
    .map_err(|err| {
        write_err(
            "The configuration write conflicts with existing data",
            "Failed to save configuration",
            err,
        )
    })?;

    Ok(row.into())
}

/// A missing configuration is a valid state, not an error.
pub async fn get_config(
    pool: &PgPool,
    project_id: ProjectId,
    revision_id: Option<RevisionId>,
) -> Result<Option<ProjectConfig>> {
    let row = sqlx::query_as::<_, ProjectConfigRow>(
        r#"
        SELECT id, project_id, revision_id, created_by, data, created_at, updated_at
        FROM dashboard.project_configs
        WHERE project_id = $1
          AND revision_id IS NOT DISTINCT FROM $2
        "#,
    )
    .bind(project_id.0)
    .bind(revision_id.map(|revision| revision.0))
    .fetch_optional(pool)
    .await
    .map_err(|err| db_err("Failed to query configuration", err))?;

    Ok(row.map(ProjectConfig::from))
}
