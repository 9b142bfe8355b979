pub mod collection;
pub mod error;
pub mod fetcher;
pub mod ingest;
pub mod parsers;
pub mod record;
pub mod severity;
pub mod shapes;
pub mod source;
pub mod tool;

pub use collection::{summarize, MergeSummary, PatchCollection, PatchFilter, SharedCollection};
pub use error::{ConfigError, SourceError};
pub use fetcher::{Fetch, FetcherOptions, HttpFetcher};
pub use ingest::{IngestReport, Ingestor, IngestorBuilder, SourceMerge, SourceOutcome, SourceReport};
pub use parsers::{FormatParser, ParserRegistry};
pub use record::{PatchRecord, PatchStatus};
pub use severity::Severity;
pub use shapes::ApiShape;
pub use source::{load_sources, SourceDescriptor, SourceFormat, SourceRef, SourceType};
pub use tool::extract_tool;
