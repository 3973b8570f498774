use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{LibError, Result};

/// Tenant id issued by the external auth provider (opaque text, e.g. `org_1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct OrgId(pub String);

impl OrgId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OrgId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for OrgId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// User id issued by the external auth provider (opaque text).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct ProjectId(pub Uuid);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ProjectId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::from_str(s).map(Self)
    }
}

impl From<Uuid> for ProjectId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct RevisionId(pub Uuid);

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RevisionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::from_str(s).map(Self)
    }
}

impl From<Uuid> for RevisionId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct ConfigId(pub Uuid);

impl fmt::Display for ConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ConfigId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// Caller identity as supplied by the session/auth layer. Either field may be
/// absent: no user means the request is unauthenticated, no org means the
/// user has not selected an active organization yet.
#[derive(Debug, Clone, Default)]
pub struct RequestIdentity {
    pub user_id: Option<UserId>,
    pub org_id: Option<OrgId>,
}

impl RequestIdentity {
    pub fn new(user_id: Option<UserId>, org_id: Option<OrgId>) -> Self {
        Self { user_id, org_id }
    }

    pub fn require_user(&self) -> Result<&UserId> {
        self.user_id.as_ref().ok_or_else(|| {
            LibError::unauthenticated(
                "Sign in to continue",
                anyhow!("request carried no user identity"),
            )
        })
    }

    pub fn require_org(&self) -> Result<&OrgId> {
        self.org_id.as_ref().ok_or_else(|| {
            LibError::no_active_tenant(
                "Select an organization to continue",
                anyhow!("request carried no active organization"),
            )
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: OrgId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stripe_customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stripe_subscription_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stripe_subscription_price_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stripe_subscription_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stripe_subscription_current_period_end: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub organization_id: OrgId,
    pub created_by: UserId,
    pub name: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Revision {
    pub id: RevisionId,
    pub project_id: ProjectId,
    pub created_by: UserId,
    pub version_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Substation attributes stored as the configuration payload. Stored rows may
/// predate newer fields, so every field falls back to its default on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigData {
    pub substation_name: String,
    pub voltage_kv: f64,
    pub transformer_count: i64,
}

impl ConfigData {
    pub fn from_stored(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    pub id: ConfigId,
    pub project_id: ProjectId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision_id: Option<RevisionId>,
    pub created_by: UserId,
    pub data: ConfigData,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Everything the project detail view renders: the project, its revisions
/// newest-first, the revision currently selected, and that revision's
/// configuration (or the revision-less default when no revision is active).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectView {
    pub project: Project,
    pub revisions: Vec<Revision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_revision_id: Option<RevisionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<ProjectConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectPayload {
    pub name: String,
}

impl CreateProjectPayload {
    pub fn normalize(self) -> Result<String> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(LibError::invalid(
                "Project name is required",
                anyhow!("empty project name"),
            ));
        }
        Ok(name)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRevisionPayload {
    pub version_label: String,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RevisionDraft {
    pub version_label: String,
    pub comment: Option<String>,
}

impl CreateRevisionPayload {
    pub fn normalize(self) -> Result<RevisionDraft> {
        let version_label = self.version_label.trim().to_string();
        if version_label.is_empty() {
            return Err(LibError::invalid(
                "Version label is required",
                anyhow!("empty version label"),
            ));
        }

        let comment = self
            .comment
            .map(|comment| comment.trim().to_string())
            .filter(|comment| !comment.is_empty());

        Ok(RevisionDraft {
            version_label,
            comment,
        })
    }
}

/// Raw form fields from the configuration form. Numeric fields arrive as
/// text and parse leniently: blank or unparseable input stores as zero.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SaveConfigPayload {
    #[serde(default)]
    pub revision_id: Option<String>,
    #[serde(default)]
    pub substation_name: Option<String>,
    #[serde(default)]
    pub voltage_kv: Option<String>,
    #[serde(default)]
    pub transformer_count: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConfigDraft {
    pub revision_id: Option<RevisionId>,
    pub data: ConfigData,
}

impl SaveConfigPayload {
    pub fn normalize(self) -> Result<ConfigDraft> {
        let revision_id = match self.revision_id.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(RevisionId::from_str(raw).map_err(|err| {
                LibError::invalid("Revision id is not a valid UUID", anyhow!(err))
            })?),
        };

        let data = ConfigData {
            substation_name: self
                .substation_name
                .map(|name| name.trim().to_string())
                .unwrap_or_default(),
            voltage_kv: parse_voltage(self.voltage_kv.as_deref()),
            transformer_count: parse_count(self.transformer_count.as_deref()),
        };

        Ok(ConfigDraft { revision_id, data })
    }
}

fn parse_voltage(raw: Option<&str>) -> f64 {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse().ok())
        .unwrap_or(0.0)
}

fn parse_count(raw: Option<&str>) -> i64 {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse::<f64>().ok())
        .map(|value| value as i64)
        .unwrap_or(0)
}
