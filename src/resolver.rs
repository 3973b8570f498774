use std::str::FromStr;

use crate::models::{Revision, RevisionId};

#[cfg(feature = "sqlx")]
use sqlx::PgPool;

#[cfg(feature = "sqlx")]
use crate::db;
#[cfg(feature = "sqlx")]
use crate::error::Result;
#[cfg(feature = "sqlx")]
use crate::models::{OrgId, ProjectId, ProjectView};

/// Picks the revision the detail view shows. The requested id wins only when
/// it belongs to the project's revision list; anything else falls back to the
/// latest revision without surfacing an error. `revisions` must already be
/// ordered newest-first.
pub fn select_active_revision(
    revisions: &[Revision],
    requested: Option<RevisionId>,
) -> Option<RevisionId> {
    match requested {
        Some(requested) if revisions.iter().any(|revision| revision.id == requested) => {
            Some(requested)
        }
        _ => revisions.first().map(|revision| revision.id),
    }
}

/// The `rev` query value arrives as arbitrary text; anything that is not a
/// UUID behaves as if no revision was requested.
pub fn parse_requested_revision(raw: Option<&str>) -> Option<RevisionId> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| RevisionId::from_str(value).ok())
}

/// Read-only resolution of a project detail view: the project scoped to the
/// caller's organization, its revisions newest-first, the active revision,
/// and the configuration stored against it (the revision-less default when
/// the project has no revisions).
#[cfg(feature = "sqlx")]
pub async fn resolve_project_view(
    pool: &PgPool,
    org_id: &OrgId,
    project_id: ProjectId,
    requested: Option<RevisionId>,
) -> Result<ProjectView> {
    let project = db::load_project(pool, org_id, project_id).await?;
    let revisions = db::list_revisions(pool, project_id).await?;
    let active_revision_id = select_active_revision(&revisions, requested);
    let config = db::get_config(pool, project_id, active_revision_id).await?;

    Ok(ProjectView {
        project,
        revisions,
        active_revision_id,
        config,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime};
    use uuid::Uuid;

    use super::{parse_requested_revision, select_active_revision};
    use crate::models::{ProjectId, Revision, RevisionId, UserId};

    fn timestamp(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, day)
            .expect("valid date")
            .and_hms_opt(hour, 0, 0)
            .expect("valid datetime")
    }

    fn revision(label: &str, created_at: NaiveDateTime) -> Revision {
        Revision {
            id: RevisionId(Uuid::new_v4()),
            project_id: ProjectId(Uuid::new_v4()),
            created_by: UserId::from("user_1"),
            version_label: label.to_string(),
            comment: None,
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn no_revisions_means_no_active_revision() {
        assert_eq!(select_active_revision(&[], None), None);
        assert_eq!(
            select_active_revision(&[], Some(RevisionId(Uuid::new_v4()))),
            None
        );
    }

    #[test]
    fn latest_revision_wins_without_a_request() {
        let revisions = vec![
            revision("v2.0", timestamp(2, 12)),
            revision("v1.0", timestamp(1, 9)),
        ];
        assert_eq!(
            select_active_revision(&revisions, None),
            Some(revisions[0].id)
        );
    }

    #[test]
    fn requested_revision_wins_when_it_belongs_to_the_project() {
        let revisions = vec![
            revision("v2.0", timestamp(2, 12)),
            revision("v1.0", timestamp(1, 9)),
        ];
        assert_eq!(
            select_active_revision(&revisions, Some(revisions[1].id)),
            Some(revisions[1].id)
        );
    }

    #[test]
    fn foreign_requested_revision_falls_back_to_latest() {
        let revisions = vec![
            revision("v2.0", timestamp(2, 12)),
            revision("v1.0", timestamp(1, 9)),
        ];
        let foreign = RevisionId(Uuid::new_v4());
        assert_eq!(
            select_active_revision(&revisions, Some(foreign)),
            Some(revisions[0].id)
        );
        assert_eq!(
            select_active_revision(&revisions, Some(foreign)),
            select_active_revision(&revisions, None)
        );
    }

    #[test]
    fn requested_revision_parses_leniently() {
        assert_eq!(parse_requested_revision(None), None);
        assert_eq!(parse_requested_revision(Some("")), None);
        assert_eq!(parse_requested_revision(Some("  ")), None);
        assert_eq!(parse_requested_revision(Some("not-a-uuid")), None);

        let id = Uuid::new_v4();
        assert_eq!(
            parse_requested_revision(Some(&id.to_string())),
            Some(RevisionId(id))
        );
    }
}
