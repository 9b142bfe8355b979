use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

use crate::record::{PatchRecord, RecordFields};
use crate::source::SourceDescriptor;
use crate::tool::product_from_cpe;

const NVD_DETAIL_URL: &str = "https://nvd.nist.gov/vuln/detail";

#[derive(Deserialize)]
struct NvdResponse {
    vulnerabilities: Vec<NvdVulnerability>,
}

#[derive(Deserialize)]
struct NvdVulnerability {
    cve: NvdCve,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NvdCve {
    id: String,
    published: Option<String>,
    last_modified: Option<String>,
    #[serde(default)]
    descriptions: Vec<NvdDescription>,
    #[serde(default)]
    metrics: NvdMetrics,
    #[serde(default)]
    configurations: Vec<NvdConfiguration>,
}

#[derive(Deserialize)]
struct NvdDescription {
    lang: Option<String>,
    value: String,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NvdMetrics {
    #[serde(default)]
    cvss_metric_v31: Vec<CvssV3Metric>,
    #[serde(default)]
    cvss_metric_v30: Vec<CvssV3Metric>,
    #[serde(default)]
    cvss_metric_v2: Vec<CvssV2Metric>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CvssV3Metric {
    cvss_data: CvssV3Data,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CvssV3Data {
    base_score: Option<f64>,
    base_severity: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CvssV2Metric {
    base_severity: Option<String>,
    cvss_data: CvssV2Data,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CvssV2Data {
    base_score: Option<f64>,
}

#[derive(Deserialize)]
struct NvdConfiguration {
    #[serde(default)]
    nodes: Vec<NvdNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NvdNode {
    #[serde(default)]
    cpe_match: Vec<NvdCpeMatch>,
}

#[derive(Deserialize)]
struct NvdCpeMatch {
    criteria: String,
}

impl NvdMetrics {
    /// Newest CVSS version available: (severity label, base score).
    fn best(&self) -> (Option<String>, Option<f64>) {
        if let Some(m) = self.cvss_metric_v31.first().or(self.cvss_metric_v30.first()) {
            return (m.cvss_data.base_severity.clone(), m.cvss_data.base_score);
        }
        if let Some(m) = self.cvss_metric_v2.first() {
            return (m.base_severity.clone(), m.cvss_data.base_score);
        }
        (None, None)
    }
}

impl NvdCve {
    fn english_description(&self) -> Option<String> {
        self.descriptions
            .iter()
            .find(|d| d.lang.as_deref() == Some("en"))
            .or(self.descriptions.first())
            .map(|d| d.value.clone())
    }

    fn first_product(&self) -> Option<String> {
        self.configurations
            .iter()
            .flat_map(|c| &c.nodes)
            .flat_map(|n| &n.cpe_match)
            .find_map(|m| product_from_cpe(&m.criteria))
            .map(str::to_string)
    }
}

#[instrument(skip(json, source), fields(source = %source.url))]
pub fn adapt(json: Value, source: &SourceDescriptor) -> Result<Vec<PatchRecord>> {
    let response: NvdResponse =
        serde_json::from_value(json).context("failed to deserialize NVD response")?;

    let records = response
        .vulnerabilities
        .into_iter()
        .map(|vuln| {
            let cve = vuln.cve;
            let description = cve.english_description();
            let (severity, score) = cve.metrics.best();
            let tool = cve.first_product();

            RecordFields {
                link: Some(format!("{NVD_DETAIL_URL}/{}", cve.id)),
                name: description.clone(),
                description,
                severity,
                tool,
                published: cve.published.or(cve.last_modified),
                notes: score.map(|s| format!("CVSS score: {s}")),
                id: Some(cve.id),
            }
            .into_record(source)
        })
        .collect();

    Ok(records)
}
