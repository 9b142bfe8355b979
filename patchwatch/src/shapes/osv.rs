use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

use crate::record::{PatchRecord, RecordFields};
use crate::source::SourceDescriptor;

#[derive(Deserialize)]
struct OsvResponse {
    #[serde(default)]
    vulns: Vec<OsvVuln>,
}

#[derive(Deserialize)]
struct OsvVuln {
    id: String,
    #[serde(default)]
    aliases: Vec<String>,
    summary: Option<String>,
    details: Option<String>,
    published: Option<String>,
    modified: Option<String>,
    #[serde(default)]
    references: Vec<OsvReference>,
    #[serde(default)]
    affected: Vec<OsvAffected>,
    #[serde(default)]
    database_specific: Option<OsvDatabaseSpecific>,
}

#[derive(Deserialize)]
struct OsvReference {
    #[serde(rename = "type")]
    ref_type: Option<String>,
    url: Option<String>,
}

#[derive(Deserialize)]
struct OsvAffected {
    package: Option<OsvPackage>,
    #[serde(default)]
    ranges: Vec<OsvRange>,
}

#[derive(Deserialize)]
struct OsvPackage {
    name: Option<String>,
}

#[derive(Deserialize)]
struct OsvRange {
    #[serde(default)]
    events: Vec<OsvEvent>,
}

#[derive(Deserialize)]
struct OsvEvent {
    introduced: Option<String>,
    fixed: Option<String>,
    last_affected: Option<String>,
}

#[derive(Deserialize)]
struct OsvDatabaseSpecific {
    severity: Option<String>,
}

#[instrument(skip(json, source), fields(source = %source.url))]
pub fn adapt(json: Value, source: &SourceDescriptor) -> Result<Vec<PatchRecord>> {
    let response: OsvResponse =
        serde_json::from_value(json).context("failed to deserialize OSV response")?;

    let records = response
        .vulns
        .into_iter()
        .map(|vuln| {
            let severity = vuln.database_specific.and_then(|db| db.severity);

            let link = vuln
                .references
                .iter()
                .find(|r| r.ref_type.as_deref() == Some("ADVISORY"))
                .or_else(|| {
                    vuln.references
                        .iter()
                        .find(|r| r.ref_type.as_deref() == Some("WEB"))
                })
                .and_then(|r| r.url.clone());

            let tool = vuln
                .affected
                .iter()
                .find_map(|a| a.package.as_ref().and_then(|p| p.name.clone()));

            let affected_range = vuln
                .affected
                .first()
                .and_then(|a| a.ranges.first())
                .map(|r| format_range_events(&r.events))
                .filter(|r| !r.is_empty());

            let mut notes = Vec::new();
            if !vuln.aliases.is_empty() {
                notes.push(format!("aliases: {}", vuln.aliases.join(", ")));
            }
            if let Some(range) = affected_range {
                notes.push(format!("affected: {range}"));
            }

            RecordFields {
                id: Some(vuln.id),
                name: vuln.summary,
                description: vuln.details,
                severity,
                tool,
                published: vuln.published.or(vuln.modified),
                link,
                notes: (!notes.is_empty()).then(|| notes.join("; ")),
            }
            .into_record(source)
        })
        .collect();

    Ok(records)
}

fn format_range_events(events: &[OsvEvent]) -> String {
    let mut parts = Vec::new();

    for event in events {
        if let Some(introduced) = &event.introduced {
            if introduced != "0" {
                parts.push(format!(">= {introduced}"));
            }
        }
        if let Some(fixed) = &event.fixed {
            parts.push(format!("< {fixed}"));
        }
        if let Some(last_affected) = &event.last_affected {
            parts.push(format!("<= {last_affected}"));
        }
    }

    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::severity::Severity;
    use crate::source::SourceType;
    use serde_json::json;

    fn source() -> SourceDescriptor {
        SourceDescriptor::new("OSV", "https://api.osv.dev/v1/query", SourceType::Api)
    }

    #[test]
    fn adapt_empty_response() {
        assert!(adapt(json!({}), &source()).unwrap().is_empty());
        assert!(adapt(json!({"vulns": []}), &source()).unwrap().is_empty());
    }

    #[test]
    fn adapt_vuln_with_all_fields() {
        let json = json!({
            "vulns": [{
                "id": "GHSA-mcph-m25j-8j63",
                "aliases": ["CVE-2025-30066"],
                "summary": "tj-actions/changed-files workflow compromise",
                "details": "The action was compromised to leak secrets.",
                "published": "2025-03-15T06:30:00Z",
                "references": [
                    {"type": "WEB", "url": "https://example.com/other"},
                    {"type": "ADVISORY", "url": "https://github.com/advisories/GHSA-mcph-m25j-8j63"}
                ],
                "affected": [{
                    "package": {"name": "tj-actions/changed-files", "ecosystem": "GitHub Actions"},
                    "ranges": [{
                        "type": "ECOSYSTEM",
                        "events": [{"introduced": "0"}, {"fixed": "46.0.1"}]
                    }]
                }],
                "database_specific": {"severity": "HIGH"}
            }]
        });

        let records = adapt(json, &source()).unwrap();
        assert_eq!(records.len(), 1);

        let r = &records[0];
        assert_eq!(r.id, "GHSA-mcph-m25j-8j63");
        assert_eq!(r.name, "tj-actions/changed-files workflow compromise");
        assert_eq!(r.description, "The action was compromised to leak secrets.");
        assert_eq!(r.severity, Severity::High);
        assert_eq!(r.tool, "tj-actions/changed-files");
        assert_eq!(r.link, "https://github.com/advisories/GHSA-mcph-m25j-8j63");
        assert_eq!(
            r.notes.as_deref(),
            Some("aliases: CVE-2025-30066; affected: < 46.0.1")
        );
    }

    #[test]
    fn adapt_falls_back_to_web_url() {
        let json = json!({
            "vulns": [{
                "id": "OSV-1234",
                "summary": "Some issue",
                "references": [{"type": "WEB", "url": "https://example.com/web"}],
                "database_specific": null
            }]
        });

        let records = adapt(json, &source()).unwrap();
        assert_eq!(records[0].link, "https://example.com/web");
        assert_eq!(records[0].severity, Severity::Low);
        assert_eq!(records[0].tool, "OSV");
    }

    #[test]
    fn format_range_introduced_and_fixed() {
        let events = vec![
            OsvEvent {
                introduced: Some("2.0.0".to_string()),
                fixed: None,
                last_affected: None,
            },
            OsvEvent {
                introduced: None,
                fixed: Some("3.1.0".to_string()),
                last_affected: None,
            },
        ];
        assert_eq!(format_range_events(&events), ">= 2.0.0, < 3.1.0");
    }

    #[test]
    fn format_range_last_affected() {
        let events = vec![
            OsvEvent {
                introduced: Some("0".to_string()),
                fixed: None,
                last_affected: None,
            },
            OsvEvent {
                introduced: None,
                fixed: None,
                last_affected: Some("5.0.0".to_string()),
            },
        ];
        assert_eq!(format_range_events(&events), "<= 5.0.0");
    }
}
