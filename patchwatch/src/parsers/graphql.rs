use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

use crate::record::{PatchRecord, RecordFields};
use crate::source::SourceDescriptor;

use super::FormatParser;

const GITHUB_ADVISORY_URL: &str = "https://github.com/advisories";

/// Query document POSTed to every `graphql` source.
pub const ADVISORY_QUERY: &str = r#"
query {
  securityAdvisories(first: 100) {
    nodes {
      ghsaId
      summary
      description
      severity
      permalink
      publishedAt
      updatedAt
      identifiers {
        type
        value
      }
      vulnerabilities(first: 10) {
        nodes {
          package {
            name
          }
        }
      }
    }
  }
}
"#;

#[derive(Deserialize)]
struct GraphqlResponse {
    data: Option<AdvisoryData>,
    errors: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdvisoryData {
    security_advisories: Connection<AdvisoryNode>,
}

#[derive(Deserialize)]
struct Connection<T> {
    #[serde(default = "Vec::new")]
    nodes: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdvisoryNode {
    ghsa_id: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    severity: Option<String>,
    permalink: Option<String>,
    published_at: Option<String>,
    updated_at: Option<String>,
    #[serde(default)]
    identifiers: Vec<Identifier>,
    vulnerabilities: Option<Connection<VulnerabilityNode>>,
}

#[derive(Deserialize)]
struct Identifier {
    #[serde(rename = "type")]
    id_type: String,
    value: String,
}

#[derive(Deserialize)]
struct VulnerabilityNode {
    package: Option<Package>,
}

#[derive(Deserialize)]
struct Package {
    name: Option<String>,
}

/// GitHub-style `securityAdvisories` GraphQL responses.
pub struct GraphqlParser;

impl FormatParser for GraphqlParser {
    #[instrument(skip(self, payload, source), fields(source = %source.url))]
    fn parse(&self, payload: &str, source: &SourceDescriptor) -> Result<Vec<PatchRecord>> {
        let response: GraphqlResponse =
            serde_json::from_str(payload).context("failed to deserialize GraphQL response")?;

        let Some(data) = response.data else {
            match response.errors {
                Some(errors) => bail!("GraphQL errors: {errors}"),
                None => bail!("missing 'data' field in GraphQL response"),
            }
        };

        let records = data
            .security_advisories
            .nodes
            .into_iter()
            .map(|node| {
                let tool = node.vulnerabilities.and_then(|v| {
                    v.nodes
                        .into_iter()
                        .find_map(|n| n.package.and_then(|p| p.name))
                });

                let cve = node
                    .identifiers
                    .into_iter()
                    .find(|i| i.id_type == "CVE")
                    .map(|i| format!("CVE: {}", i.value));

                let link = node.permalink.or_else(|| {
                    node.ghsa_id
                        .as_ref()
                        .map(|id| format!("{GITHUB_ADVISORY_URL}/{id}"))
                });

                RecordFields {
                    id: node.ghsa_id,
                    name: node.summary,
                    description: node.description,
                    severity: node.severity,
                    tool,
                    published: node.published_at.or(node.updated_at),
                    link,
                    notes: cve,
                }
                .into_record(source)
            })
            .collect();

        Ok(records)
    }

    fn name(&self) -> &'static str {
        "graphql"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::severity::Severity;
    use crate::source::SourceType;
    use serde_json::json;

    fn source() -> SourceDescriptor {
        SourceDescriptor::new("GitHub GraphQL", "https://api.github.com/graphql", SourceType::Graphql)
    }

    #[test]
    fn query_requests_advisory_fields() {
        assert!(ADVISORY_QUERY.contains("securityAdvisories(first: 100)"));
        assert!(ADVISORY_QUERY.contains("ghsaId"));
        assert!(ADVISORY_QUERY.contains("package"));
    }

    #[test]
    fn maps_advisory_nodes() {
        let payload = json!({
            "data": {
                "securityAdvisories": {
                    "nodes": [{
                        "ghsaId": "GHSA-mcph-m25j-8j63",
                        "summary": "tj-actions/changed-files workflow compromise",
                        "description": "Secrets leaked to build logs",
                        "severity": "HIGH",
                        "permalink": "https://github.com/advisories/GHSA-mcph-m25j-8j63",
                        "publishedAt": "2025-03-15T06:30:00Z",
                        "updatedAt": "2025-03-20T00:00:00Z",
                        "identifiers": [
                            {"type": "GHSA", "value": "GHSA-mcph-m25j-8j63"},
                            {"type": "CVE", "value": "CVE-2025-30066"}
                        ],
                        "vulnerabilities": {
                            "nodes": [{"package": {"name": "tj-actions/changed-files"}}]
                        }
                    }]
                }
            }
        })
        .to_string();

        let records = GraphqlParser.parse(&payload, &source()).unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.id, "GHSA-mcph-m25j-8j63");
        assert_eq!(r.severity, Severity::High);
        assert_eq!(r.tool, "tj-actions/changed-files");
        assert_eq!(r.notes.as_deref(), Some("CVE: CVE-2025-30066"));
        assert_eq!(r.discovered_at.to_rfc3339(), "2025-03-15T06:30:00+00:00");
    }

    #[test]
    fn moderate_maps_to_medium_and_link_is_derived() {
        let payload = json!({
            "data": {"securityAdvisories": {"nodes": [{
                "ghsaId": "GHSA-aaaa-bbbb-cccc",
                "summary": "Regex DoS",
                "severity": "MODERATE"
            }]}}
        })
        .to_string();

        let records = GraphqlParser.parse(&payload, &source()).unwrap();
        assert_eq!(records[0].severity, Severity::Medium);
        assert_eq!(records[0].link, "https://github.com/advisories/GHSA-aaaa-bbbb-cccc");
        assert_eq!(records[0].tool, "GitHub");
    }

    #[test]
    fn errors_without_data_is_error() {
        let payload = json!({"errors": [{"message": "Bad credentials"}]}).to_string();
        let err = GraphqlParser.parse(&payload, &source()).unwrap_err();
        assert!(err.to_string().contains("Bad credentials"));
    }

    #[test]
    fn empty_nodes() {
        let payload = json!({"data": {"securityAdvisories": {"nodes": []}}}).to_string();
        assert!(GraphqlParser.parse(&payload, &source()).unwrap().is_empty());
    }
}
