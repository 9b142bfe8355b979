use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::severity::Severity;
use crate::source::{SourceDescriptor, SourceRef};
use crate::tool::extract_tool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchStatus {
    #[default]
    Pending,
    Applied,
    NotApplicable,
}

impl fmt::Display for PatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PatchStatus::Pending => "pending",
            PatchStatus::Applied => "applied",
            PatchStatus::NotApplicable => "not_applicable",
        };
        f.write_str(s)
    }
}

impl FromStr for PatchStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "pending" => Ok(PatchStatus::Pending),
            "applied" => Ok(PatchStatus::Applied),
            "not_applicable" => Ok(PatchStatus::NotApplicable),
            other => bail!("unknown status: {other} (valid: pending, applied, not_applicable)"),
        }
    }
}

/// The normalized advisory produced by ingestion, whatever the upstream format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub severity: Severity,
    #[serde(default)]
    pub status: PatchStatus,
    pub tool: String,
    pub discovered_at: DateTime<Utc>,
    #[serde(default)]
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub source: SourceRef,
}

impl fmt::Display for PatchRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = if self.name.is_empty() { "(untitled)" } else { &self.name };
        writeln!(f, "{} [{}] ({}): {name}", self.id, self.status, self.severity)?;
        write!(f, "    tool: {}", self.tool)?;
        if !self.link.is_empty() {
            write!(f, "\n    {}", self.link)?;
        }
        if let Some(notes) = &self.notes {
            write!(f, "\n    notes: {notes}")?;
        }
        Ok(())
    }
}

/// Fields as read from an upstream payload, before defaults and heuristics.
///
/// Every parser fills what its schema carries and calls [`RecordFields::into_record`],
/// which is the single place where structured values win over heuristics.
#[derive(Debug, Default, Clone)]
pub struct RecordFields {
    pub id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub severity: Option<String>,
    pub tool: Option<String>,
    pub published: Option<String>,
    pub link: Option<String>,
    pub notes: Option<String>,
}

impl RecordFields {
    pub fn into_record(self, source: &SourceDescriptor) -> PatchRecord {
        let name = non_empty(self.name);
        let link = non_empty(self.link);

        let id = non_empty(self.id)
            .or_else(|| link.clone())
            .unwrap_or_else(generated_id);

        let severity = self
            .severity
            .as_deref()
            .and_then(Severity::from_label)
            .unwrap_or_else(|| Severity::classify(name.as_deref().unwrap_or_default()));

        let tool = non_empty(self.tool).unwrap_or_else(|| extract_tool(&source.url).to_string());

        let discovered_at = self
            .published
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);

        PatchRecord {
            id,
            name: name.unwrap_or_default(),
            description: non_empty(self.description).unwrap_or_default(),
            severity,
            status: PatchStatus::Pending,
            tool,
            discovered_at,
            link: link.unwrap_or_default(),
            notes: non_empty(self.notes),
            source: source.to_ref(),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Time-ordered, but unique per call; unsuitable as a dedup key.
fn generated_id() -> String {
    Uuid::now_v7().to_string()
}

/// Parse the date formats upstreams publish: RFC 3339, RFC 2822 (RSS),
/// zone-less ISO-8601 (treated as UTC), or a bare date.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
