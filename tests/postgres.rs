//! End-to-end behavior against a live Postgres instance.
//!
//! Ignored by default: point DATABASE_URL at a disposable database and run
//! `cargo test -- --ignored` to exercise them. Each test works under its own
//! generated organization id so runs never collide.

use std::sync::{Arc, Mutex};

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use substation_dashboard::db;
use substation_dashboard::error::ErrorKind;
use substation_dashboard::models::{
    CreateProjectPayload, CreateRevisionPayload, OrgId, Project, RequestIdentity, RevisionId,
    SaveConfigPayload, UserId,
};
use substation_dashboard::operations::{DashboardOperations, ViewCache};

async fn test_pool() -> PgPool {
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a postgres instance");
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("connect to postgres");
    db::create_dashboard_tables(&pool)
        .await
        .expect("run migrations");
    pool
}

fn fresh_identity() -> RequestIdentity {
    let org_id = OrgId(format!("org_{}", Uuid::new_v4().simple()));
    RequestIdentity::new(Some(UserId::from("user_tests")), Some(org_id))
}

fn project_payload(name: &str) -> CreateProjectPayload {
    CreateProjectPayload {
        name: name.to_string(),
    }
}

fn revision_payload(label: &str) -> CreateRevisionPayload {
    CreateRevisionPayload {
        version_label: label.to_string(),
        comment: None,
    }
}

fn config_payload(revision_id: Option<RevisionId>, voltage: &str) -> SaveConfigPayload {
    SaveConfigPayload {
        revision_id: revision_id.map(|revision| revision.to_string()),
        substation_name: Some("North Yard".to_string()),
        voltage_kv: Some(voltage.to_string()),
        transformer_count: Some("3".to_string()),
    }
}

async fn create_project(ops: &DashboardOperations, identity: &RequestIdentity, name: &str) -> Project {
    ops.create_project(identity, project_payload(name))
        .await
        .expect("create project")
}

#[derive(Default)]
struct RecordingViewCache {
    paths: Mutex<Vec<String>>,
}

impl ViewCache for RecordingViewCache {
    fn invalidate(&self, path: &str) {
        self.paths.lock().expect("paths lock").push(path.to_string());
    }
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a postgres instance"]
async fn organization_upsert_is_idempotent() {
    let pool = test_pool().await;
    let org_id = OrgId(format!("org_{}", Uuid::new_v4().simple()));

    db::ensure_organization(&pool, &org_id)
        .await
        .expect("first ensure");
    db::ensure_organization(&pool, &org_id)
        .await
        .expect("second ensure");

    let organization = db::load_organization(&pool, &org_id)
        .await
        .expect("load organization")
        .expect("organization row exists");
    assert_eq!(organization.id, org_id);

    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM dashboard.organizations WHERE id = $1")
            .bind(org_id.as_str())
            .fetch_one(&pool)
            .await
            .expect("count organizations");
    assert_eq!(count, 1);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a postgres instance"]
async fn duplicate_project_name_fails_exactly_once() {
    let pool = test_pool().await;
    let ops = DashboardOperations::from_pool(&pool);
    let identity = fresh_identity();

    create_project(&ops, &identity, "X").await;
    let err = ops
        .create_project(&identity, project_payload("X"))
        .await
        .expect_err("second create with the same name should fail");
    assert_eq!(err.kind, ErrorKind::Conflict);

    let projects = ops.list_projects(&identity).await.expect("list projects");
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].name, "X");
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a postgres instance"]
async fn same_name_is_allowed_across_organizations() {
    let pool = test_pool().await;
    let ops = DashboardOperations::from_pool(&pool);
    let first = fresh_identity();
    let second = fresh_identity();

    create_project(&ops, &first, "Shared Name").await;
    create_project(&ops, &second, "Shared Name").await;
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a postgres instance"]
async fn duplicate_version_label_is_rejected_within_a_project() {
    let pool = test_pool().await;
    let ops = DashboardOperations::from_pool(&pool);
    let identity = fresh_identity();

    let project = create_project(&ops, &identity, "Substation A").await;
    ops.create_revision(&identity, project.id, revision_payload("v1.0"))
        .await
        .expect("first revision");
    let err = ops
        .create_revision(&identity, project.id, revision_payload("v1.0"))
        .await
        .expect_err("duplicate label should fail");
    assert_eq!(err.kind, ErrorKind::Conflict);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a postgres instance"]
async fn latest_revision_is_the_most_recent_one() {
    let pool = test_pool().await;
    let ops = DashboardOperations::from_pool(&pool);
    let identity = fresh_identity();

    let project = create_project(&ops, &identity, "Substation A").await;
    for label in ["v1.0", "v1.1", "v2.0"] {
        ops.create_revision(&identity, project.id, revision_payload(label))
            .await
            .expect("create revision");
    }

    let view = ops
        .project_view(&identity, project.id, None)
        .await
        .expect("resolve view");
    assert_eq!(view.revisions.len(), 3);
    assert_eq!(view.revisions[0].version_label, "v2.0");
    assert!(view.revisions[0].created_at >= view.revisions[1].created_at);
    assert!(view.revisions[1].created_at >= view.revisions[2].created_at);
    assert_eq!(view.active_revision_id, Some(view.revisions[0].id));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a postgres instance"]
async fn unknown_requested_revision_resolves_like_no_request() {
    let pool = test_pool().await;
    let ops = DashboardOperations::from_pool(&pool);
    let identity = fresh_identity();

    let project = create_project(&ops, &identity, "Substation A").await;
    ops.create_revision(&identity, project.id, revision_payload("v1.0"))
        .await
        .expect("create revision");

    let baseline = ops
        .project_view(&identity, project.id, None)
        .await
        .expect("resolve without request");
    let foreign = ops
        .project_view(&identity, project.id, Some(RevisionId(Uuid::new_v4())))
        .await
        .expect("resolve with a foreign revision id");
    assert_eq!(foreign.active_revision_id, baseline.active_revision_id);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a postgres instance"]
async fn config_upsert_keeps_a_single_row_with_the_last_payload() {
    let pool = test_pool().await;
    let ops = DashboardOperations::from_pool(&pool);
    let identity = fresh_identity();

    let project = create_project(&ops, &identity, "Substation A").await;
    ops.save_config(&identity, project.id, config_payload(None, "110"))
        .await
        .expect("first save");
    ops.save_config(&identity, project.id, config_payload(None, "230"))
        .await
        .expect("second save");

    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM dashboard.project_configs WHERE project_id = $1 AND revision_id IS NULL",
    )
    .bind(project.id.0)
    .fetch_one(&pool)
    .await
    .expect("count default configs");
    assert_eq!(count, 1);

    let config = db::get_config(&pool, project.id, None)
        .await
        .expect("load default config")
        .expect("default config exists");
    assert_eq!(config.data.voltage_kv, 230.0);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a postgres instance"]
async fn deleted_revision_leaves_its_config_as_the_default() {
    let pool = test_pool().await;
    let ops = DashboardOperations::from_pool(&pool);
    let identity = fresh_identity();

    let project = create_project(&ops, &identity, "Substation A").await;
    let revision = ops
        .create_revision(&identity, project.id, revision_payload("v1.0"))
        .await
        .expect("create revision");
    ops.save_config(&identity, project.id, config_payload(Some(revision.id), "230"))
        .await
        .expect("save revision config");

    sqlx::query("DELETE FROM dashboard.revisions WHERE id = $1")
        .bind(revision.id.0)
        .execute(&pool)
        .await
        .expect("delete revision");

    let view = ops
        .project_view(&identity, project.id, None)
        .await
        .expect("resolve view");
    assert_eq!(view.active_revision_id, None);
    let config = view.config.expect("config survives the revision");
    assert_eq!(config.revision_id, None);
    assert_eq!(config.data.voltage_kv, 230.0);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a postgres instance"]
async fn deleting_a_revision_cannot_silently_merge_into_an_existing_default() {
    let pool = test_pool().await;
    let ops = DashboardOperations::from_pool(&pool);
    let identity = fresh_identity();

    let project = create_project(&ops, &identity, "Substation A").await;
    let revision = ops
        .create_revision(&identity, project.id, revision_payload("v1.0"))
        .await
        .expect("create revision");
    ops.save_config(&identity, project.id, config_payload(None, "110"))
        .await
        .expect("save default config");
    ops.save_config(&identity, project.id, config_payload(Some(revision.id), "230"))
        .await
        .expect("save revision config");

    // SET NULL would collide with the default row on the null-inclusive
    // unique index, so the store rejects the delete instead of merging.
    let result = sqlx::query("DELETE FROM dashboard.revisions WHERE id = $1")
        .bind(revision.id.0)
        .execute(&pool)
        .await;
    assert!(result.is_err());

    let config = db::get_config(&pool, project.id, Some(revision.id))
        .await
        .expect("load revision config")
        .expect("revision config still present");
    assert_eq!(config.data.voltage_kv, 230.0);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a postgres instance"]
async fn voltage_round_trips_as_a_number() {
    let pool = test_pool().await;
    let ops = DashboardOperations::from_pool(&pool);
    let identity = fresh_identity();

    let project = create_project(&ops, &identity, "Substation A").await;
    let revision = ops
        .create_revision(&identity, project.id, revision_payload("v1.0"))
        .await
        .expect("create revision");
    ops.save_config(&identity, project.id, config_payload(Some(revision.id), "230"))
        .await
        .expect("save config");

    let view = ops
        .project_view(&identity, project.id, None)
        .await
        .expect("resolve view");
    assert_eq!(view.active_revision_id, Some(revision.id));

    let config = view.config.expect("config resolved");
    assert_eq!(config.data.voltage_kv, 230.0);
    assert_eq!(config.data.transformer_count, 3);

    let encoded = serde_json::to_value(&config.data).expect("encode config data");
    assert!(encoded["voltageKv"].is_number());
    assert_eq!(encoded["voltageKv"], serde_json::json!(230.0));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a postgres instance"]
async fn project_without_revisions_resolves_the_default_config() {
    let pool = test_pool().await;
    let ops = DashboardOperations::from_pool(&pool);
    let identity = fresh_identity();

    let project = create_project(&ops, &identity, "Substation A").await;

    let view = ops
        .project_view(&identity, project.id, None)
        .await
        .expect("resolve view");
    assert_eq!(view.active_revision_id, None);
    assert!(view.config.is_none());

    ops.save_config(&identity, project.id, config_payload(None, "110"))
        .await
        .expect("save default config");

    let view = ops
        .project_view(&identity, project.id, None)
        .await
        .expect("resolve view again");
    assert_eq!(view.active_revision_id, None);
    let config = view.config.expect("default config resolved");
    assert_eq!(config.revision_id, None);
    assert_eq!(config.data.voltage_kv, 110.0);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a postgres instance"]
async fn foreign_tenant_cannot_reach_a_guessed_project() {
    let pool = test_pool().await;
    let ops = DashboardOperations::from_pool(&pool);
    let owner = fresh_identity();
    let intruder = fresh_identity();

    let project = create_project(&ops, &owner, "Substation A").await;

    let err = ops
        .project_view(&intruder, project.id, None)
        .await
        .expect_err("foreign tenant view should fail");
    assert_eq!(err.kind, ErrorKind::NotFound);

    let err = ops
        .create_revision(&intruder, project.id, revision_payload("v1.0"))
        .await
        .expect_err("foreign tenant revision should fail");
    assert_eq!(err.kind, ErrorKind::NotFound);

    let err = ops
        .save_config(&intruder, project.id, config_payload(None, "230"))
        .await
        .expect_err("foreign tenant config should fail");
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a postgres instance"]
async fn mutations_report_the_affected_view_paths() {
    let pool = test_pool().await;
    let cache = Arc::new(RecordingViewCache::default());
    let ops = DashboardOperations::new(Arc::new(pool.clone()), cache.clone());
    let identity = fresh_identity();

    let project = create_project(&ops, &identity, "Substation A").await;
    ops.create_revision(&identity, project.id, revision_payload("v1.0"))
        .await
        .expect("create revision");
    ops.save_config(&identity, project.id, config_payload(None, "230"))
        .await
        .expect("save config");

    let detail_path = format!("/dashboard/projects/{}", project.id);
    let paths = cache.paths.lock().expect("paths lock");
    assert_eq!(
        *paths,
        vec![
            "/dashboard/projects".to_string(),
            detail_path.clone(),
            detail_path
        ]
    );
}
