use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use crate::collection::{merge_shared, summarize, MergeSummary, SharedCollection};
use crate::error::{ConfigError, SourceError};
use crate::fetcher::Fetch;
use crate::parsers::{FormatParser, ParserRegistry};
use crate::record::PatchRecord;
use crate::source::SourceDescriptor;

pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutcome {
    Fetched(Vec<PatchRecord>),
    Failed(SourceError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceReport {
    pub source: SourceDescriptor,
    pub outcome: SourceOutcome,
}

impl SourceReport {
    pub fn records(&self) -> &[PatchRecord] {
        match &self.outcome {
            SourceOutcome::Fetched(records) => records,
            SourceOutcome::Failed(_) => &[],
        }
    }

    pub fn error(&self) -> Option<&SourceError> {
        match &self.outcome {
            SourceOutcome::Failed(e) => Some(e),
            SourceOutcome::Fetched(_) => None,
        }
    }
}

/// Per-source results of one ingestion, in descriptor order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub sources: Vec<SourceReport>,
}

impl IngestReport {
    /// Concatenation of every source's records. Cross-source duplicates are kept.
    pub fn records(&self) -> Vec<PatchRecord> {
        self.sources
            .iter()
            .flat_map(|s| s.records().iter().cloned())
            .collect()
    }

    pub fn into_records(self) -> Vec<PatchRecord> {
        self.sources
            .into_iter()
            .flat_map(|s| match s.outcome {
                SourceOutcome::Fetched(records) => records,
                SourceOutcome::Failed(_) => vec![],
            })
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&SourceDescriptor, &SourceError)> {
        self.sources
            .iter()
            .filter_map(|s| s.error().map(|e| (&s.source, e)))
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }
}

/// Summary line per source after merging into a collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceMerge {
    pub source: String,
    pub fetched: usize,
    #[serde(flatten)]
    pub merge: MergeSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Fetches and parses configured sources concurrently, isolating failures per source.
#[derive(Clone)]
pub struct Ingestor {
    fetcher: Arc<dyn Fetch>,
    registry: ParserRegistry,
    max_concurrency: usize,
}

impl Ingestor {
    pub fn builder(fetcher: impl Fetch + 'static) -> IngestorBuilder {
        IngestorBuilder {
            fetcher: Arc::new(fetcher),
            registry: ParserRegistry::default(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Resolve every descriptor's parser up front so a configuration defect
    /// rejects the call before any network traffic.
    fn plan<'a>(
        &self,
        sources: &'a [SourceDescriptor],
    ) -> Result<Vec<(&'a SourceDescriptor, Arc<dyn FormatParser>)>, ConfigError> {
        sources
            .iter()
            .map(|source| {
                source.validate()?;
                Ok((source, self.registry.get(source.source_type)?))
            })
            .collect()
    }

    #[instrument(skip(self, sources), fields(source_count = sources.len()))]
    pub async fn ingest(&self, sources: &[SourceDescriptor]) -> Result<IngestReport, ConfigError> {
        let plan = self.plan(sources)?;
        let sem = Arc::new(Semaphore::new(self.max_concurrency.max(1)));

        let futures = plan.into_iter().map(|(source, parser)| {
            let sem = sem.clone();
            async move {
                // The semaphore is never closed.
                let _permit = sem.acquire().await.ok();
                let outcome = self.run_one(source, parser.as_ref()).await;
                SourceReport {
                    source: source.clone(),
                    outcome,
                }
            }
        });

        let sources = join_all(futures).await;
        Ok(IngestReport { sources })
    }

    /// Ingest and merge each source's records into `collection` as soon as
    /// that source completes.
    #[instrument(skip(self, sources, collection), fields(source_count = sources.len()))]
    pub async fn ingest_into(
        &self,
        sources: &[SourceDescriptor],
        collection: &SharedCollection,
    ) -> Result<Vec<SourceMerge>, ConfigError> {
        let plan = self.plan(sources)?;
        let sem = Arc::new(Semaphore::new(self.max_concurrency.max(1)));

        let futures = plan.into_iter().map(|(source, parser)| {
            let sem = sem.clone();
            async move {
                let outcome = {
                    let _permit = sem.acquire().await.ok();
                    self.run_one(source, parser.as_ref()).await
                };
                match outcome {
                    SourceOutcome::Fetched(records) => {
                        let fetched = records.len();
                        let merge = merge_shared(collection, records).await;
                        SourceMerge {
                            source: source.label().to_string(),
                            fetched,
                            merge,
                            error: None,
                        }
                    }
                    SourceOutcome::Failed(e) => SourceMerge {
                        source: source.label().to_string(),
                        fetched: 0,
                        merge: MergeSummary::default(),
                        error: Some(e.to_string()),
                    },
                }
            }
        });

        let merges = join_all(futures).await;
        let total = summarize(merges.iter().map(|m| &m.merge));
        debug!(added = total.added, skipped = total.skipped, "merge complete");
        Ok(merges)
    }

    async fn run_one(&self, source: &SourceDescriptor, parser: &dyn FormatParser) -> SourceOutcome {
        let payload = match self.fetcher.fetch(source).await {
            Ok(payload) => payload,
            Err(e) => {
                let err = SourceError::transport(&source.url, &e);
                warn!(source = %source, source_type = %source.source_type, error = %err, "fetch failed");
                return SourceOutcome::Failed(err);
            }
        };

        match parser.parse(&payload, source) {
            Ok(records) => {
                debug!(source = %source, parser = parser.name(), count = records.len(), "source ingested");
                SourceOutcome::Fetched(records)
            }
            Err(e) => {
                let err = SourceError::parse(&source.url, &e);
                warn!(source = %source, source_type = %source.source_type, error = %err, "parse failed");
                SourceOutcome::Failed(err)
            }
        }
    }
}

pub struct IngestorBuilder {
    fetcher: Arc<dyn Fetch>,
    registry: ParserRegistry,
    max_concurrency: usize,
}

impl IngestorBuilder {
    pub fn registry(mut self, registry: ParserRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n;
        self
    }

    pub fn build(self) -> Ingestor {
        Ingestor {
            fetcher: self.fetcher,
            registry: self.registry,
            max_concurrency: self.max_concurrency,
        }
    }
}
