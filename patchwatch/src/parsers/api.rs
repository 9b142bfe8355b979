use anyhow::{bail, Context, Result};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::record::PatchRecord;
use crate::shapes::ApiShape;
use crate::source::{SourceDescriptor, SourceFormat};

use super::{FeedParser, FormatParser};

/// JSON REST endpoints, mapped through the shape adapter named by the
/// descriptor or detected from the payload.
pub struct ApiParser;

impl FormatParser for ApiParser {
    #[instrument(skip(self, payload, source), fields(source = %source.url))]
    fn parse(&self, payload: &str, source: &SourceDescriptor) -> Result<Vec<PatchRecord>> {
        match source.format {
            Some(SourceFormat::Xml) => return FeedParser.parse(payload, source),
            Some(SourceFormat::Markdown) => bail!("markdown payloads are not supported for api sources"),
            Some(SourceFormat::Json) | None => {}
        }

        let json: Value = serde_json::from_str(payload).context("API response is not valid JSON")?;

        let Some(shape) = source.shape.or_else(|| ApiShape::detect(&json)) else {
            bail!("unrecognized API response shape");
        };
        debug!(%shape, "using shape adapter");

        shape
            .adapt(json, source)
            .with_context(|| format!("{shape} adapter rejected the response"))
    }

    fn name(&self) -> &'static str {
        "api"
    }
}
