use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::record::{PatchRecord, PatchStatus};
use crate::severity::Severity;

/// Caller-owned collection shared between concurrent merges. The mutex makes
/// the merge step the single writer.
pub type SharedCollection = Arc<Mutex<PatchCollection>>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    pub added: usize,
    pub skipped: usize,
}

impl MergeSummary {
    fn absorb(&mut self, other: MergeSummary) {
        self.added += other.added;
        self.skipped += other.skipped;
    }
}

/// Ordered records, unique by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<PatchRecord>", into = "Vec<PatchRecord>")]
pub struct PatchCollection {
    records: Vec<PatchRecord>,
    ids: HashSet<String>,
}

impl PatchCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_shared(self) -> SharedCollection {
        Arc::new(Mutex::new(self))
    }

    /// Insert-if-absent: a record whose id is already present, either in the
    /// collection or earlier in `incoming`, is dropped. Existing entries are
    /// never overwritten.
    pub fn merge(&mut self, incoming: impl IntoIterator<Item = PatchRecord>) -> MergeSummary {
        let mut summary = MergeSummary::default();
        for record in incoming {
            if self.ids.contains(&record.id) {
                summary.skipped += 1;
                continue;
            }
            self.ids.insert(record.id.clone());
            self.records.push(record);
            summary.added += 1;
        }
        summary
    }

    /// Merge a JSON array of records, as produced by [`PatchCollection::export_json`].
    pub fn import_json(&mut self, json: &str) -> Result<MergeSummary> {
        let incoming: Vec<PatchRecord> =
            serde_json::from_str(json).context("expected a JSON array of patch records")?;
        Ok(self.merge(incoming))
    }

    pub fn export_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.records).context("failed to serialize patch records")
    }

    pub fn get(&self, id: &str) -> Option<&PatchRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut PatchRecord> {
        self.records.iter_mut().find(|r| r.id == id)
    }

    /// Returns `false` when no record has this id.
    pub fn set_status(&mut self, id: &str, status: PatchStatus) -> bool {
        match self.get_mut(id) {
            Some(record) => {
                record.status = status;
                true
            }
            None => false,
        }
    }

    pub fn amend_notes(&mut self, id: &str, notes: impl Into<String>) -> bool {
        let notes = notes.into();
        match self.get_mut(id) {
            Some(record) => {
                record.notes = (!notes.trim().is_empty()).then_some(notes);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<PatchRecord> {
        let idx = self.records.iter().position(|r| r.id == id)?;
        self.ids.remove(id);
        Some(self.records.remove(idx))
    }

    pub fn filter<'a>(&'a self, filter: &'a PatchFilter) -> impl Iterator<Item = &'a PatchRecord> + 'a {
        self.records.iter().filter(move |r| filter.matches(r))
    }

    pub fn records(&self) -> &[PatchRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl From<Vec<PatchRecord>> for PatchCollection {
    fn from(records: Vec<PatchRecord>) -> Self {
        let mut collection = Self::new();
        collection.merge(records);
        collection
    }
}

impl From<PatchCollection> for Vec<PatchRecord> {
    fn from(collection: PatchCollection) -> Self {
        collection.records
    }
}

/// Merge `incoming` into a shared collection under its lock.
pub async fn merge_shared(
    collection: &SharedCollection,
    incoming: impl IntoIterator<Item = PatchRecord>,
) -> MergeSummary {
    collection.lock().await.merge(incoming)
}

/// Display filter over severity, status and tool name.
#[derive(Debug, Clone, Default)]
pub struct PatchFilter {
    pub severity: Option<Severity>,
    pub status: Option<PatchStatus>,
    /// Case-insensitive substring of the tool name.
    pub tool: Option<String>,
}

impl PatchFilter {
    pub fn matches(&self, record: &PatchRecord) -> bool {
        if self.severity.is_some_and(|s| s != record.severity) {
            return false;
        }
        if self.status.is_some_and(|s| s != record.status) {
            return false;
        }
        match self.tool.as_deref().map(str::trim) {
            Some(tool) if !tool.is_empty() => {
                record.tool.to_lowercase().contains(&tool.to_lowercase())
            }
            _ => true,
        }
    }
}

pub fn summarize<'a>(summaries: impl IntoIterator<Item = &'a MergeSummary>) -> MergeSummary {
    let mut total = MergeSummary::default();
    for s in summaries {
        total.absorb(*s);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordFields;
    use crate::source::{SourceDescriptor, SourceType};

    fn make_record(id: &str, severity: &str, tool: &str) -> PatchRecord {
        let source = SourceDescriptor::new("test", "https://example.com/feed", SourceType::Rss);
        RecordFields {
            id: Some(id.to_string()),
            name: Some(format!("Advisory {id}")),
            severity: Some(severity.to_string()),
            tool: Some(tool.to_string()),
            published: Some("2025-01-01T00:00:00Z".to_string()),
            link: Some(format!("https://example.com/{id}")),
            ..Default::default()
        }
        .into_record(&source)
    }

    #[test]
    fn merge_adds_new_records_in_order() {
        let mut collection = PatchCollection::new();
        let summary = collection.merge(vec![
            make_record("A", "low", "Node.js"),
            make_record("B", "high", "Python"),
        ]);
        assert_eq!(summary, MergeSummary { added: 2, skipped: 0 });
        let ids: Vec<&str> = collection.records().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
    }

    #[test]
    fn merge_is_idempotent() {
        let batch = vec![make_record("A", "low", "x"), make_record("B", "low", "x")];
        let mut once = PatchCollection::new();
        once.merge(batch.clone());

        let mut twice = PatchCollection::new();
        twice.merge(batch.clone());
        let second = twice.merge(batch);

        assert_eq!(second, MergeSummary { added: 0, skipped: 2 });
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_keeps_existing_record_on_collision() {
        let mut collection = PatchCollection::new();
        collection.merge(vec![make_record("X", "low", "x")]);
        assert!(collection.set_status("X", PatchStatus::Applied));

        let mut fetched = make_record("X", "critical", "other");
        fetched.name = "Refetched title".to_string();
        collection.merge(vec![fetched]);

        let record = collection.get("X").unwrap();
        assert_eq!(record.status, PatchStatus::Applied);
        assert_eq!(record.severity, Severity::Low);
        assert_eq!(record.name, "Advisory X");
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn merge_dedups_within_incoming_batch() {
        let mut collection = PatchCollection::new();
        let mut dup = make_record("A", "high", "x");
        dup.name = "second copy".to_string();
        let summary = collection.merge(vec![make_record("A", "low", "x"), dup]);
        assert_eq!(summary, MergeSummary { added: 1, skipped: 1 });
        assert_eq!(collection.get("A").unwrap().name, "Advisory A");
    }

    #[test]
    fn export_then_import_round_trips() {
        let mut original = PatchCollection::new();
        original.merge(vec![
            make_record("A", "low", "Node.js"),
            make_record("B", "critical", "Python"),
        ]);
        original.set_status("B", PatchStatus::NotApplicable);
        original.amend_notes("A", "checked on staging");

        let json = original.export_json().unwrap();
        let mut restored = PatchCollection::new();
        let summary = restored.import_json(&json).unwrap();

        assert_eq!(summary.added, 2);
        assert_eq!(restored, original);
    }

    #[test]
    fn import_uses_insert_if_absent() {
        let mut collection = PatchCollection::new();
        collection.merge(vec![make_record("A", "low", "x")]);
        collection.set_status("A", PatchStatus::Applied);

        let mut other = PatchCollection::new();
        other.merge(vec![make_record("A", "high", "x"), make_record("C", "low", "x")]);

        let summary = collection.import_json(&other.export_json().unwrap()).unwrap();
        assert_eq!(summary, MergeSummary { added: 1, skipped: 1 });
        assert_eq!(collection.get("A").unwrap().status, PatchStatus::Applied);
    }

    #[test]
    fn import_rejects_non_array() {
        let mut collection = PatchCollection::new();
        assert!(collection.import_json(r#"{"id": "A"}"#).is_err());
    }

    #[test]
    fn import_accepts_legacy_source_type_key() {
        let json = r#"[{
            "id": "manual-1",
            "name": "Manual entry",
            "description": "",
            "severity": "medium",
            "status": "pending",
            "tool": "nginx",
            "discoveredAt": "2025-01-01T00:00:00.000Z",
            "link": "https://example.com",
            "notes": "",
            "source": {"url": "manual", "type": "api"}
        }]"#;
        let mut collection = PatchCollection::new();
        collection.import_json(json).unwrap();
        assert_eq!(collection.get("manual-1").unwrap().source.source_type, SourceType::Api);
    }

    #[test]
    fn remove_frees_the_id() {
        let mut collection = PatchCollection::new();
        collection.merge(vec![make_record("A", "low", "x")]);
        assert!(collection.remove("A").is_some());
        assert!(collection.remove("A").is_none());
        let summary = collection.merge(vec![make_record("A", "low", "x")]);
        assert_eq!(summary.added, 1);
    }

    #[test]
    fn status_update_on_missing_id() {
        let mut collection = PatchCollection::new();
        assert!(!collection.set_status("nope", PatchStatus::Applied));
        assert!(!collection.amend_notes("nope", "x"));
    }

    #[test]
    fn filter_by_severity_status_and_tool() {
        let mut collection = PatchCollection::new();
        collection.merge(vec![
            make_record("A", "high", "Node.js"),
            make_record("B", "high", "Python"),
            make_record("C", "low", "node-fetch"),
        ]);
        collection.set_status("B", PatchStatus::Applied);

        let by_severity = PatchFilter { severity: Some(Severity::High), ..Default::default() };
        assert_eq!(collection.filter(&by_severity).count(), 2);

        let by_tool = PatchFilter { tool: Some("NODE".into()), ..Default::default() };
        let ids: Vec<&str> = collection.filter(&by_tool).map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "C"]);

        let combined = PatchFilter {
            severity: Some(Severity::High),
            status: Some(PatchStatus::Pending),
            tool: None,
        };
        let ids: Vec<&str> = collection.filter(&combined).map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["A"]);

        assert_eq!(collection.filter(&PatchFilter::default()).count(), 3);
    }

    #[tokio::test]
    async fn shared_merge_serializes_writers() {
        let shared = PatchCollection::new().into_shared();
        let a = merge_shared(&shared, vec![make_record("A", "low", "x")]);
        let b = merge_shared(&shared, vec![make_record("A", "low", "x"), make_record("B", "low", "x")]);
        let (a, b) = tokio::join!(a, b);
        let total = summarize([&a, &b]);
        assert_eq!(total, MergeSummary { added: 2, skipped: 1 });
        assert_eq!(shared.lock().await.len(), 2);
    }
}
