use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::record::PatchRecord;
use crate::source::{SourceDescriptor, SourceType};

pub mod api;
pub mod feed;
pub mod graphql;
pub mod html;

pub use api::ApiParser;
pub use feed::FeedParser;
pub use graphql::{GraphqlParser, ADVISORY_QUERY};
pub use html::HtmlParser;

/// Turns a fetched payload into records. Parsing is synchronous and in-memory;
/// an `Err` means the whole payload was unusable and the source contributes nothing.
pub trait FormatParser: Send + Sync {
    fn parse(&self, payload: &str, source: &SourceDescriptor) -> anyhow::Result<Vec<PatchRecord>>;
    fn name(&self) -> &'static str;
}

/// Maps each source type to the parser that handles it.
#[derive(Clone)]
pub struct ParserRegistry {
    parsers: HashMap<SourceType, Arc<dyn FormatParser>>,
}

impl ParserRegistry {
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    pub fn register(mut self, source_type: SourceType, parser: impl FormatParser + 'static) -> Self {
        self.parsers.insert(source_type, Arc::new(parser));
        self
    }

    pub fn get(&self, source_type: SourceType) -> Result<Arc<dyn FormatParser>, ConfigError> {
        self.parsers
            .get(&source_type)
            .cloned()
            .ok_or(ConfigError::MissingParser(source_type))
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::empty()
            .register(SourceType::Rss, FeedParser)
            .register(SourceType::Html, HtmlParser)
            .register(SourceType::Api, ApiParser)
            .register(SourceType::Graphql, GraphqlParser)
    }
}
