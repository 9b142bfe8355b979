use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

use crate::record::{PatchRecord, RecordFields};
use crate::source::SourceDescriptor;

#[derive(Deserialize)]
struct GhsaAdvisoryResponse {
    ghsa_id: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    severity: Option<String>,
    html_url: Option<String>,
    cve_id: Option<String>,
    published_at: Option<String>,
    updated_at: Option<String>,
    package: Option<GhsaPackage>,
    #[serde(default)]
    vulnerabilities: Vec<GhsaVulnerability>,
}

#[derive(Deserialize)]
struct GhsaVulnerability {
    package: Option<GhsaPackage>,
    vulnerable_version_range: Option<String>,
}

#[derive(Deserialize)]
struct GhsaPackage {
    name: Option<String>,
}

#[instrument(skip(json, source), fields(source = %source.url))]
pub fn adapt(json: Value, source: &SourceDescriptor) -> Result<Vec<PatchRecord>> {
    let responses: Vec<GhsaAdvisoryResponse> =
        serde_json::from_value(json).context("expected JSON array from advisory API")?;

    let records = responses
        .into_iter()
        .map(|item| {
            let tool = item
                .package
                .and_then(|p| p.name)
                .or_else(|| {
                    item.vulnerabilities
                        .iter()
                        .find_map(|v| v.package.as_ref().and_then(|p| p.name.clone()))
                });

            let affected_range = item
                .vulnerabilities
                .into_iter()
                .find_map(|v| v.vulnerable_version_range);

            let mut notes = Vec::new();
            if let Some(cve) = item.cve_id.filter(|c| !c.is_empty()) {
                notes.push(format!("CVE: {cve}"));
            }
            if let Some(range) = affected_range {
                notes.push(format!("affected: {range}"));
            }

            RecordFields {
                id: item.ghsa_id,
                name: item.summary,
                description: item.description,
                severity: item.severity,
                tool,
                published: item.published_at.or(item.updated_at),
                link: item.html_url,
                notes: (!notes.is_empty()).then(|| notes.join("; ")),
            }
            .into_record(source)
        })
        .collect();

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::severity::Severity;
    use crate::source::SourceType;
    use serde_json::json;

    fn source() -> SourceDescriptor {
        SourceDescriptor::new("GitHub", "https://api.github.com/advisories", SourceType::Api)
    }

    #[test]
    fn adapt_empty_response() {
        let records = adapt(json!([]), &source()).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn adapt_advisory_with_all_fields() {
        // Based on real GHSA-r79c-pqj3-577x (super-linter command injection)
        let json = json!([{
            "ghsa_id": "GHSA-r79c-pqj3-577x",
            "cve_id": "CVE-2025-54782",
            "summary": "Super-linter is vulnerable to command injection via crafted filenames",
            "description": "A command injection vulnerability exists in Super-linter.",
            "severity": "high",
            "html_url": "https://github.com/advisories/GHSA-r79c-pqj3-577x",
            "published_at": "2025-08-07T18:00:00Z",
            "vulnerabilities": [{
                "package": {
                    "ecosystem": "actions",
                    "name": "super-linter/super-linter"
                },
                "vulnerable_version_range": ">= 6.0.0, < 8.3.1"
            }]
        }]);

        let records = adapt(json, &source()).unwrap();
        assert_eq!(records.len(), 1);

        let r = &records[0];
        assert_eq!(r.id, "GHSA-r79c-pqj3-577x");
        assert_eq!(r.name, "Super-linter is vulnerable to command injection via crafted filenames");
        assert_eq!(r.description, "A command injection vulnerability exists in Super-linter.");
        assert_eq!(r.severity, Severity::High);
        assert_eq!(r.tool, "super-linter/super-linter");
        assert_eq!(r.link, "https://github.com/advisories/GHSA-r79c-pqj3-577x");
        assert_eq!(
            r.notes.as_deref(),
            Some("CVE: CVE-2025-54782; affected: >= 6.0.0, < 8.3.1")
        );
        assert_eq!(r.discovered_at.to_rfc3339(), "2025-08-07T18:00:00+00:00");
    }

    #[test]
    fn adapt_repository_advisory_package_field() {
        let json = json!([{
            "ghsa_id": "GHSA-aaaa-bbbb-cccc",
            "summary": "Prototype pollution",
            "severity": "MODERATE",
            "html_url": "https://github.com/facebook/react/security/advisories/GHSA-aaaa-bbbb-cccc",
            "package": {"name": "react"}
        }]);

        let records = adapt(json, &source()).unwrap();
        assert_eq!(records[0].tool, "react");
        assert_eq!(records[0].severity, Severity::Medium);
        assert!(records[0].notes.is_none());
    }

    #[test]
    fn adapt_missing_severity_uses_heuristic() {
        let json = json!([{
            "ghsa_id": "GHSA-xxxx-yyyy-zzzz",
            "summary": "Critical sandbox escape",
            "html_url": "https://example.com"
        }]);

        let records = adapt(json, &source()).unwrap();
        assert_eq!(records[0].severity, Severity::Critical);
        assert_eq!(records[0].tool, "GitHub");
    }

    #[test]
    fn adapt_multiple_advisories_keeps_order() {
        let json = json!([
            {"ghsa_id": "GHSA-aaaa-bbbb-cccc", "summary": "First", "severity": "low"},
            {"ghsa_id": "GHSA-dddd-eeee-ffff", "summary": "Second", "severity": "medium"}
        ]);

        let records = adapt(json, &source()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "GHSA-aaaa-bbbb-cccc");
        assert_eq!(records[1].id, "GHSA-dddd-eeee-ffff");
    }

    #[test]
    fn adapt_non_array_returns_error() {
        let json = json!({"message": "Bad credentials"});
        assert!(adapt(json, &source()).is_err());
    }
}
