use std::fmt;
use std::str::FromStr;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::shapes::ApiShape;

/// Selects the fetch transport and the parser for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum SourceType {
    Rss,
    Html,
    Api,
    Graphql,
}

impl SourceType {
    pub const ALL: [SourceType; 4] = [
        SourceType::Rss,
        SourceType::Html,
        SourceType::Api,
        SourceType::Graphql,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Rss => "rss",
            SourceType::Html => "html",
            SourceType::Api => "api",
            SourceType::Graphql => "graphql",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rss" => Ok(SourceType::Rss),
            "html" => Ok(SourceType::Html),
            "api" => Ok(SourceType::Api),
            "graphql" => Ok(SourceType::Graphql),
            other => Err(ConfigError::UnsupportedSourceType(other.to_string())),
        }
    }
}

impl TryFrom<String> for SourceType {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Payload encoding hint for parsers that accept more than one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum SourceFormat {
    Json,
    Markdown,
    Xml,
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceFormat::Json => "json",
            SourceFormat::Markdown => "markdown",
            SourceFormat::Xml => "xml",
        };
        f.write_str(s)
    }
}

impl FromStr for SourceFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(SourceFormat::Json),
            "markdown" => Ok(SourceFormat::Markdown),
            "xml" => Ok(SourceFormat::Xml),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl TryFrom<String> for SourceFormat {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One external feed or endpoint to poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDescriptor {
    #[serde(default)]
    pub name: String,
    pub url: String,
    #[serde(alias = "type")]
    pub source_type: SourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<SourceFormat>,
    /// Pins the JSON shape adapter for `api` sources instead of detecting it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<ApiShape>,
}

impl SourceDescriptor {
    pub fn new(name: impl Into<String>, url: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            source_type,
            format: None,
            shape: None,
        }
    }

    pub fn with_format(mut self, format: SourceFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_shape(mut self, shape: ApiShape) -> Self {
        self.shape = Some(shape);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::EmptyUrl {
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Back-reference stamped on every record this source produces.
    pub fn to_ref(&self) -> SourceRef {
        SourceRef {
            url: self.url.clone(),
            source_type: self.source_type,
            format: self.format,
        }
    }

    /// Label used in logs and reports: the name when set, the url otherwise.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.url
        } else {
            &self.name
        }
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.source_type)
    }
}

/// Provenance of a record: which source produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    pub url: String,
    #[serde(alias = "type")]
    pub source_type: SourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<SourceFormat>,
}

/// Parse a source list from YAML or JSON.
///
/// Accepts either a bare list of descriptors or a mapping with a `sources` key.
pub fn load_sources(text: &str) -> anyhow::Result<Vec<SourceDescriptor>> {
    let doc: serde_yaml::Value =
        serde_yaml::from_str(text).context("failed to parse source configuration")?;

    let doc = match doc.get("sources").cloned() {
        Some(list) => list,
        None => doc,
    };

    let sources: Vec<SourceDescriptor> =
        serde_yaml::from_value(doc).context("invalid source descriptor")?;

    for source in &sources {
        source.validate()?;
    }

    Ok(sources)
}
