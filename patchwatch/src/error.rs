use thiserror::Error;

use crate::source::SourceType;

/// A failure scoped to one source. Recovered by the orchestrator: the source
/// contributes no records and the rest of the ingestion carries on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String },
    #[error("parse error for {url}: {message}")]
    Parse { url: String, message: String },
}

impl SourceError {
    pub fn transport(url: &str, err: &anyhow::Error) -> Self {
        SourceError::Transport {
            url: url.to_string(),
            message: format!("{err:#}"),
        }
    }

    pub fn parse(url: &str, err: &anyhow::Error) -> Self {
        SourceError::Parse {
            url: url.to_string(),
            message: format!("{err:#}"),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::Transport { .. } => "transport",
            SourceError::Parse { .. } => "parse",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            SourceError::Transport { message, .. } | SourceError::Parse { message, .. } => message,
        }
    }
}

/// A caller defect in the source configuration. Rejects the whole operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unsupported source type: {0} (valid: rss, html, api, graphql)")]
    UnsupportedSourceType(String),
    #[error("unsupported source format: {0} (valid: json, markdown, xml)")]
    UnsupportedFormat(String),
    #[error("no parser registered for source type {0}")]
    MissingParser(SourceType),
    #[error("source {name:?} has an empty url")]
    EmptyUrl { name: String },
}
