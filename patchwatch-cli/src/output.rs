use std::io::Write;

use patchwatch::{MergeSummary, PatchRecord, SourceMerge};
use serde::Serialize;

#[derive(Serialize)]
pub struct FetchSummary<'a> {
    pub sources: &'a [SourceMerge],
    pub total: MergeSummary,
    pub tracked: usize,
}

pub trait OutputFormatter {
    fn write_records(&self, records: &[&PatchRecord], writer: &mut dyn Write) -> std::io::Result<()>;

    fn write_fetch(&self, summary: &FetchSummary<'_>, writer: &mut dyn Write) -> std::io::Result<()>;
}

pub struct TextOutput;

impl OutputFormatter for TextOutput {
    fn write_records(&self, records: &[&PatchRecord], writer: &mut dyn Write) -> std::io::Result<()> {
        if records.is_empty() {
            writeln!(writer, "no patches")?;
        }
        for record in records {
            writeln!(writer, "{record}")?;
        }
        Ok(())
    }

    fn write_fetch(&self, summary: &FetchSummary<'_>, writer: &mut dyn Write) -> std::io::Result<()> {
        for source in summary.sources {
            match &source.error {
                Some(error) => writeln!(writer, "{}: failed ({error})", source.source)?,
                None => writeln!(
                    writer,
                    "{}: {} fetched, {} new",
                    source.source, source.fetched, source.merge.added
                )?,
            }
        }
        writeln!(
            writer,
            "{} new, {} already tracked, {} total",
            summary.total.added, summary.total.skipped, summary.tracked
        )
    }
}

pub struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn write_records(&self, records: &[&PatchRecord], writer: &mut dyn Write) -> std::io::Result<()> {
        serde_json::to_writer_pretty(&mut *writer, records)?;
        writeln!(writer)?;
        Ok(())
    }

    fn write_fetch(&self, summary: &FetchSummary<'_>, writer: &mut dyn Write) -> std::io::Result<()> {
        serde_json::to_writer_pretty(&mut *writer, summary)?;
        writeln!(writer)?;
        Ok(())
    }
}

pub fn formatter(json: bool) -> Box<dyn OutputFormatter> {
    if json {
        Box::new(JsonOutput)
    } else {
        Box::new(TextOutput)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchwatch::record::RecordFields;
    use patchwatch::{SourceDescriptor, SourceType};

    fn sample_record() -> PatchRecord {
        let source = SourceDescriptor::new("node", "https://nodejs.org/en/feed/vulnerability.xml", SourceType::Rss);
        RecordFields {
            id: Some("node-2025-06".into()),
            name: Some("Critical security release".into()),
            link: Some("https://nodejs.org/en/blog/vulnerability/june-2025".into()),
            published: Some("2025-06-10T12:00:00Z".into()),
            ..Default::default()
        }
        .into_record(&source)
    }

    fn sample_merges() -> Vec<SourceMerge> {
        vec![
            SourceMerge {
                source: "Node.js".into(),
                fetched: 3,
                merge: MergeSummary { added: 2, skipped: 1 },
                error: None,
            },
            SourceMerge {
                source: "PostgreSQL".into(),
                fetched: 0,
                merge: MergeSummary::default(),
                error: Some("transport error for https://www.postgresql.org: timed out".into()),
            },
        ]
    }

    fn render(f: &dyn OutputFormatter, records: &[&PatchRecord]) -> String {
        let mut buf = Vec::new();
        f.write_records(records, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn text_records() {
        let record = sample_record();
        let out = render(&TextOutput, &[&record]);
        assert!(out.starts_with("node-2025-06 [pending] (critical): Critical security release"));
        assert!(out.contains("Node.js"));
    }

    #[test]
    fn text_no_records() {
        assert_eq!(render(&TextOutput, &[]), "no patches\n");
    }

    #[test]
    fn json_records_is_array() {
        let record = sample_record();
        let out = render(&JsonOutput, &[&record]);
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        let arr = parsed.as_array().unwrap();
        assert_eq!(arr[0]["id"], "node-2025-06");
        assert_eq!(arr[0]["discoveredAt"], "2025-06-10T12:00:00Z");
    }

    #[test]
    fn text_fetch_summary() {
        let merges = sample_merges();
        let summary = FetchSummary {
            sources: &merges,
            total: MergeSummary { added: 2, skipped: 1 },
            tracked: 5,
        };
        let mut buf = Vec::new();
        TextOutput.write_fetch(&summary, &mut buf).unwrap();
        let out = String::from_utf8(buf).unwrap();
        assert!(out.contains("Node.js: 3 fetched, 2 new"));
        assert!(out.contains("PostgreSQL: failed (transport error"));
        assert!(out.ends_with("2 new, 1 already tracked, 5 total\n"));
    }

    #[test]
    fn json_fetch_summary_flattens_counts() {
        let merges = sample_merges();
        let summary = FetchSummary {
            sources: &merges,
            total: MergeSummary { added: 2, skipped: 1 },
            tracked: 5,
        };
        let mut buf = Vec::new();
        JsonOutput.write_fetch(&summary, &mut buf).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed["sources"][0]["added"], 2);
        assert!(parsed["sources"][0].get("error").is_none());
        assert_eq!(parsed["sources"][1]["fetched"], 0);
        assert_eq!(parsed["tracked"], 5);
    }
}
