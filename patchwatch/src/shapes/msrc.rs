use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

use crate::record::{PatchRecord, RecordFields};
use crate::source::SourceDescriptor;

#[derive(Deserialize)]
struct MsrcResponse {
    value: Vec<MsrcUpdate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MsrcUpdate {
    #[serde(rename = "ID")]
    id: Option<String>,
    #[serde(alias = "Title")]
    document_title: Option<String>,
    description: Option<String>,
    severity: Option<String>,
    product: Option<String>,
    initial_release_date: Option<String>,
    current_release_date: Option<String>,
    #[serde(alias = "URL")]
    cvrf_url: Option<String>,
    #[serde(rename = "KBID")]
    kb_id: Option<String>,
}

#[instrument(skip(json, source), fields(source = %source.url))]
pub fn adapt(json: Value, source: &SourceDescriptor) -> Result<Vec<PatchRecord>> {
    let response: MsrcResponse =
        serde_json::from_value(json).context("failed to deserialize MSRC response")?;

    let records = response
        .value
        .into_iter()
        .map(|update| {
            RecordFields {
                id: update.id.map(|id| format!("msrc-{id}")),
                name: update.document_title,
                description: update.description,
                severity: update.severity,
                tool: update.product,
                published: update.initial_release_date.or(update.current_release_date),
                link: update.cvrf_url,
                notes: update.kb_id.map(|kb| format!("KB: {kb}")),
            }
            .into_record(source)
        })
        .collect();

    Ok(records)
}
