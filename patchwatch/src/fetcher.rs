use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Url};
use tracing::instrument;

use crate::parsers::ADVISORY_QUERY;
use crate::source::{SourceDescriptor, SourceType};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("patchwatch/", env!("CARGO_PKG_VERSION"));

/// Performs the single network retrieval a source needs and returns the raw body.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, source: &SourceDescriptor) -> Result<String>;
}

#[derive(Debug, Clone, Default)]
pub struct FetcherOptions {
    /// Bearer token attached to `api` requests only.
    pub token: Option<String>,
    pub timeout: Option<Duration>,
    /// Relay base url for rss/html fetches; the target is passed as `?url=`.
    pub relay: Option<String>,
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    token: Option<String>,
    relay: Option<Url>,
}

impl HttpFetcher {
    pub fn new(options: FetcherOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(options.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .context("failed to build HTTP client")?;

        let relay = options
            .relay
            .as_deref()
            .map(Url::parse)
            .transpose()
            .context("invalid relay url")?;

        Ok(Self {
            client,
            token: options.token.filter(|t| !t.is_empty()),
            relay,
        })
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Where a GET for this source actually goes, accounting for the relay.
    fn target_url(&self, source: &SourceDescriptor) -> Result<Url> {
        match (&self.relay, source.source_type) {
            (Some(relay), SourceType::Rss | SourceType::Html) => {
                let mut url = relay.clone();
                url.query_pairs_mut().append_pair("url", &source.url);
                Ok(url)
            }
            _ => Url::parse(&source.url).with_context(|| format!("invalid source url {}", source.url)),
        }
    }

    fn request(&self, source: &SourceDescriptor) -> Result<RequestBuilder> {
        let url = self.target_url(source)?;
        let request = match source.source_type {
            SourceType::Rss => self
                .client
                .get(url)
                .header("Accept", "application/rss+xml, application/atom+xml, application/xml, text/xml"),
            SourceType::Html => self.client.get(url).header("Accept", "text/html"),
            SourceType::Api => {
                let mut request = self.client.get(url).header("Accept", "application/json");
                if let Some(token) = &self.token {
                    request = request.header("Authorization", format!("Bearer {token}"));
                }
                request
            }
            SourceType::Graphql => self
                .client
                .post(url)
                .header("Accept", "application/json")
                .json(&serde_json::json!({ "query": ADVISORY_QUERY })),
        };
        Ok(request)
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    #[instrument(skip(self, source), fields(source = %source.url, source_type = %source.source_type))]
    async fn fetch(&self, source: &SourceDescriptor) -> Result<String> {
        let response = self
            .request(source)?
            .send()
            .await
            .with_context(|| format!("request to {} failed", source.url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("{} returned HTTP {status}", source.url);
        }

        response
            .text()
            .await
            .with_context(|| format!("failed to read body from {}", source.url))
    }
}
