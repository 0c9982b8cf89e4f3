//! Tiered summary pipeline
//!
//! raw records → batch summaries → project summaries. Batches run one at a
//! time with a fixed pause between them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::record::{
    ImportanceRange, ProjectSummaryRecord, ProvenanceLink, RawRecord, SummaryRecord, TimeRange,
};
use super::store::{RawRecordStore, SummaryStore};
use super::summarizer::Summarizer;
use crate::error::{MemoryError, Result};
use crate::record::preview_of;

/// Which raw records are worth summarizing
///
/// A record qualifies if any one rule matches.
#[derive(Debug, Clone)]
pub struct SelectionPolicy {
    pub min_importance: u32,
    pub message_types: Vec<String>,
    pub recency: chrono::Duration,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            min_importance: 2,
            message_types: vec![
                "bug_fix".to_string(),
                "feature_development".to_string(),
                "analysis".to_string(),
            ],
            recency: chrono::Duration::days(7),
        }
    }
}

impl SelectionPolicy {
    pub fn admits(&self, record: &RawRecord, now: DateTime<Utc>) -> bool {
        record.importance >= self.min_importance
            || self.message_types.iter().any(|t| *t == record.message_type)
            || now
                .checked_sub_signed(self.recency)
                .map_or(true, |cutoff| record.timestamp > cutoff)
    }
}

/// Filter by `policy`, then order by importance desc, newest first
pub fn select_high_value(
    records: Vec<RawRecord>,
    policy: &SelectionPolicy,
    now: DateTime<Utc>,
) -> Vec<RawRecord> {
    let mut selected: Vec<RawRecord> = records
        .into_iter()
        .filter(|r| policy.admits(r, now))
        .collect();
    selected.sort_by(|a, b| {
        b.importance
            .cmp(&a.importance)
            .then_with(|| b.timestamp.cmp(&a.timestamp))
    });
    selected
}

/// Fixed-size chunks, order preserved
pub fn batch(records: &[RawRecord], batch_size: usize) -> Vec<Vec<RawRecord>> {
    records
        .chunks(batch_size.max(1))
        .map(<[RawRecord]>::to_vec)
        .collect()
}

/// What happens to older project summaries on regeneration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectSummaryPolicy {
    /// Keep every generation
    #[default]
    Append,
    /// Delete the project's earlier summaries first
    Replace,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub batch_size: usize,
    pub batch_delay: Duration,
    /// Characters of each record included in a batch prompt
    pub preview_chars: usize,
    pub selection: SelectionPolicy,
    pub project_policy: ProjectSummaryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 8,
            batch_delay: Duration::from_secs(1),
            preview_chars: 300,
            selection: SelectionPolicy::default(),
            project_policy: ProjectSummaryPolicy::Append,
        }
    }
}

/// Outcome of one [`TieredSummaryPipeline::run`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineReport {
    pub selected: usize,
    pub batches: usize,
    pub summarized: usize,
    pub skipped: usize,
    pub project_summaries: usize,
}

/// Tier statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryReport {
    pub raw_records: usize,
    pub average_importance: f64,
    pub projects: BTreeSet<String>,
    pub batch_summaries: usize,
    pub summarized_entries: usize,
    pub project_summaries: usize,
}

pub struct TieredSummaryPipeline {
    raw: Arc<dyn RawRecordStore>,
    store: Arc<dyn SummaryStore>,
    summarizer: Arc<dyn Summarizer>,
    config: PipelineConfig,
}

impl TieredSummaryPipeline {
    pub fn new(
        raw: Arc<dyn RawRecordStore>,
        store: Arc<dyn SummaryStore>,
        summarizer: Arc<dyn Summarizer>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            raw,
            store,
            summarizer,
            config,
        }
    }

    pub fn select_high_value_records(&self) -> Result<Vec<RawRecord>> {
        let records = self.raw.all()?;
        Ok(select_high_value(records, &self.config.selection, Utc::now()))
    }

    /// Summarize one batch; `None` if the batch is empty or the summarizer
    /// produced nothing
    pub async fn summarize_batch(
        &self,
        batch: &[RawRecord],
        batch_index: usize,
    ) -> Option<SummaryRecord> {
        let first = batch.first()?;
        let prompt = batch_prompt(batch, self.config.preview_chars);

        let text = match self.summarizer.summarize(&prompt).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                log::warn!("Empty summary for batch {}", batch_index + 1);
                return None;
            }
            Err(e) => {
                log::warn!("Failed to summarize batch {}: {}", batch_index + 1, e);
                return None;
            }
        };

        let mut importance = ImportanceRange {
            min: first.importance,
            max: first.importance,
        };
        let mut time_range = TimeRange {
            earliest: first.timestamp,
            latest: first.timestamp,
        };
        for record in batch {
            importance.min = importance.min.min(record.importance);
            importance.max = importance.max.max(record.importance);
            time_range.earliest = time_range.earliest.min(record.timestamp);
            time_range.latest = time_range.latest.max(record.timestamp);
        }

        Some(SummaryRecord {
            id: format!("summary-batch-{}-{}", batch_index + 1, Uuid::new_v4().simple()),
            batch_index,
            entry_count: batch.len(),
            summary_text: text,
            source_projects: batch.iter().map(|r| r.project.clone()).collect(),
            message_types: batch.iter().map(|r| r.message_type.clone()).collect(),
            importance_range: importance,
            time_range,
            source_entry_ids: batch.iter().map(|r| r.id.clone()).collect(),
            created_at: Utc::now(),
        })
    }

    /// Store a summary with one provenance link per source record
    ///
    /// Every source id must name an existing raw record.
    pub fn persist_summary(&self, summary: SummaryRecord) -> Result<()> {
        for id in &summary.source_entry_ids {
            if !self.raw.contains(id)? {
                return Err(MemoryError::UnknownSourceRecord(id.clone()));
            }
        }

        let links: Vec<ProvenanceLink> = summary
            .source_entry_ids
            .iter()
            .map(|id| ProvenanceLink {
                summary_id: summary.id.clone(),
                source_record_id: id.clone(),
            })
            .collect();

        log::info!(
            "Stored summary {} with {} source links",
            summary.id,
            links.len()
        );
        self.store.insert_summary(summary, links)
    }

    /// Regenerate one summary per project tag from all batch summaries
    ///
    /// Returns the number of project summaries created.
    pub async fn build_project_summaries(&self) -> Result<usize> {
        let summaries = self.store.summaries()?;

        let mut by_project: BTreeMap<&str, Vec<&SummaryRecord>> = BTreeMap::new();
        for summary in &summaries {
            for project in &summary.source_projects {
                if !project.is_empty() {
                    by_project.entry(project.as_str()).or_default().push(summary);
                }
            }
        }

        let mut created = 0;
        for (project, group) in by_project {
            let prompt = project_prompt(project, &group);
            let text = match self.summarizer.summarize(&prompt).await {
                Ok(text) if !text.trim().is_empty() => text,
                Ok(_) | Err(_) => {
                    log::warn!("Failed to summarize project {}", project);
                    continue;
                }
            };

            if self.config.project_policy == ProjectSummaryPolicy::Replace {
                let removed = self.store.remove_project_summaries(project)?;
                if removed > 0 {
                    log::debug!("Replaced {} earlier summaries for {}", removed, project);
                }
            }

            let total_entries: usize = group.iter().map(|s| s.entry_count).sum();
            self.store.insert_project_summary(ProjectSummaryRecord {
                id: format!(
                    "project-summary-{}-{}",
                    project.to_lowercase(),
                    Uuid::new_v4().simple()
                ),
                project: project.to_string(),
                summary_text: text,
                batch_summary_count: group.len(),
                total_entries,
                created_at: Utc::now(),
            })?;
            log::info!("Created project summary for {} ({} entries)", project, total_entries);
            created += 1;
        }
        Ok(created)
    }

    /// Select, batch, summarize, persist, then rebuild project summaries
    pub async fn run(&self, cancel: &CancellationToken) -> Result<PipelineReport> {
        let selected = self.select_high_value_records()?;
        let batches = batch(&selected, self.config.batch_size);
        let mut report = PipelineReport {
            selected: selected.len(),
            batches: batches.len(),
            ..Default::default()
        };

        if batches.is_empty() {
            log::info!("No raw records qualify for summarization");
            return Ok(report);
        }
        log::info!(
            "Summarizing {} records in {} batches",
            selected.len(),
            batches.len()
        );

        for (index, records) in batches.iter().enumerate() {
            if cancel.is_cancelled() {
                log::info!("Summarization cancelled after {} batches", index);
                return Ok(report);
            }

            match self.summarize_batch(records, index).await {
                Some(summary) => {
                    self.persist_summary(summary)?;
                    report.summarized += 1;
                }
                None => report.skipped += 1,
            }

            if index + 1 < batches.len() && !self.config.batch_delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.config.batch_delay) => {}
                }
            }
        }

        if !cancel.is_cancelled() {
            report.project_summaries = self.build_project_summaries().await?;
        }
        Ok(report)
    }

    pub fn memory_report(&self) -> Result<MemoryReport> {
        let raw = self.raw.all()?;
        let summaries = self.store.summaries()?;

        let average_importance = if raw.is_empty() {
            0.0
        } else {
            raw.iter().map(|r| r.importance as f64).sum::<f64>() / raw.len() as f64
        };

        Ok(MemoryReport {
            raw_records: raw.len(),
            average_importance,
            projects: raw
                .iter()
                .filter(|r| !r.project.is_empty())
                .map(|r| r.project.clone())
                .collect(),
            batch_summaries: summaries.len(),
            summarized_entries: summaries.iter().map(|s| s.entry_count).sum(),
            project_summaries: self.store.project_summaries()?.len(),
        })
    }
}

fn batch_prompt(batch: &[RawRecord], preview_chars: usize) -> String {
    let excerpts: Vec<String> = batch
        .iter()
        .map(|r| {
            format!(
                "[{}|{}] {}",
                r.message_type,
                r.importance,
                preview_of(&r.text, preview_chars)
            )
        })
        .collect();
    format!(
        "Summarize these development session excerpts as short technical bullet points.\n\n{}\n\nSUMMARY:",
        excerpts.join("\n\n")
    )
}

fn project_prompt(project: &str, group: &[&SummaryRecord]) -> String {
    let texts: Vec<&str> = group.iter().map(|s| s.summary_text.as_str()).collect();
    format!(
        "Write a project overview for {} from these batch summaries.\n\n{}\n\nPROJECT SUMMARY:",
        project,
        texts.join("\n\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::store::{MemoryRawRecordStore, MemorySummaryStore};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedSummarizer {
        calls: AtomicUsize,
        fail_on_call: Option<usize>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedSummarizer {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_on_call: None,
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing_on(call: usize) -> Self {
            Self {
                fail_on_call: Some(call),
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl Summarizer for ScriptedSummarizer {
        async fn summarize(&self, prompt: &str) -> Result<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().push(prompt.to_string());
            if self.fail_on_call == Some(call) {
                return Err(MemoryError::summarizer("timeout"));
            }
            Ok(format!("summary #{}", call))
        }
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, day, hour, 0, 0).unwrap()
    }

    fn raw(id: &str, project: &str, kind: &str, importance: u32, ts: DateTime<Utc>) -> RawRecord {
        RawRecord {
            id: id.to_string(),
            text: format!("text of {}", id),
            project: project.to_string(),
            message_type: kind.to_string(),
            importance,
            timestamp: ts,
            keywords: Vec::new(),
        }
    }

    fn pipeline(
        records: Vec<RawRecord>,
        summarizer: Arc<ScriptedSummarizer>,
        config: PipelineConfig,
    ) -> (TieredSummaryPipeline, Arc<MemorySummaryStore>) {
        let store = Arc::new(MemorySummaryStore::new());
        let pipeline = TieredSummaryPipeline::new(
            Arc::new(MemoryRawRecordStore::new(records)),
            store.clone(),
            summarizer,
            config,
        );
        (pipeline, store)
    }

    fn quick_config(batch_size: usize) -> PipelineConfig {
        PipelineConfig {
            batch_size,
            batch_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    #[test]
    fn test_selection_rules_and_order() {
        let now = at(30, 12);
        let records = vec![
            raw("low-old-chat", "p", "chat", 1, at(1, 0)),
            raw("high", "p", "chat", 4, at(2, 0)),
            raw("bugfix", "p", "bug_fix", 1, at(3, 0)),
            raw("recent", "p", "chat", 0, at(29, 0)),
            raw("high-newer", "p", "chat", 4, at(5, 0)),
        ];

        let selected = select_high_value(records, &SelectionPolicy::default(), now);
        let ids: Vec<&str> = selected.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["high-newer", "high", "bugfix", "recent"]);
    }

    #[test]
    fn test_recency_window_past_calendar_start_admits_everything() {
        let policy = SelectionPolicy {
            min_importance: 5,
            message_types: Vec::new(),
            recency: chrono::Duration::days(100_000_000),
        };
        let old_chat = raw("old-chat", "p", "chat", 0, at(1, 0));
        assert!(policy.admits(&old_chat, at(30, 12)));
    }

    #[test]
    fn test_batch_preserves_order() {
        let records: Vec<RawRecord> = (0..5)
            .map(|i| raw(&format!("r{}", i), "p", "chat", 3, at(1, i)))
            .collect();
        let batches = batch(&records, 2);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0][0].id, "r0");
        assert_eq!(batches[1][1].id, "r3");
        assert_eq!(batches[2].len(), 1);
        assert!(batch(&[], 8).is_empty());
    }

    #[tokio::test]
    async fn test_summarize_batch_ranges_and_provenance() {
        let summarizer = Arc::new(ScriptedSummarizer::new());
        let (pipeline, _) = pipeline(Vec::new(), summarizer.clone(), quick_config(8));
        let records = vec![
            raw("a", "HexTrackr", "bug_fix", 2, at(3, 0)),
            raw("b", "rEngine", "analysis", 5, at(1, 0)),
            raw("c", "HexTrackr", "bug_fix", 3, at(9, 0)),
        ];

        let summary = pipeline.summarize_batch(&records, 0).await.unwrap();

        assert!(summary.id.starts_with("summary-batch-1-"));
        assert_eq!(summary.entry_count, 3);
        assert_eq!(summary.importance_range, ImportanceRange { min: 2, max: 5 });
        assert_eq!(summary.time_range.earliest, at(1, 0));
        assert_eq!(summary.time_range.latest, at(9, 0));
        assert_eq!(summary.source_entry_ids, vec!["a", "b", "c"]);
        assert_eq!(summary.source_projects.len(), 2);
        assert_eq!(summary.message_types.len(), 2);

        let prompt = summarizer.prompts.lock()[0].clone();
        assert!(prompt.contains("[bug_fix|2] text of a"));
    }

    #[tokio::test]
    async fn test_prompt_truncates_record_text() {
        let summarizer = Arc::new(ScriptedSummarizer::new());
        let (pipeline, _) = pipeline(Vec::new(), summarizer.clone(), quick_config(8));
        let mut long = raw("a", "p", "chat", 3, at(1, 0));
        long.text = "y".repeat(1000);

        pipeline.summarize_batch(&[long], 0).await.unwrap();
        let prompt = summarizer.prompts.lock()[0].clone();
        assert!(prompt.contains(&"y".repeat(300)));
        assert!(!prompt.contains(&"y".repeat(301)));
    }

    #[tokio::test]
    async fn test_failed_batch_is_skipped() {
        let records = vec![
            raw("a", "HexTrackr", "bug_fix", 3, at(1, 0)),
            raw("b", "HexTrackr", "bug_fix", 3, at(2, 0)),
        ];
        let summarizer = Arc::new(ScriptedSummarizer::failing_on(0));
        let (pipeline, store) = pipeline(records, summarizer, quick_config(1));

        let report = pipeline.run(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.batches, 2);
        assert_eq!(report.summarized, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(store.summaries().unwrap().len(), 1);
        assert_eq!(store.links().unwrap().len(), 1);
    }

    #[test]
    fn test_persist_rejects_unknown_source_record() {
        let summarizer = Arc::new(ScriptedSummarizer::new());
        let (pipeline, store) = pipeline(
            vec![raw("a", "p", "chat", 3, at(1, 0))],
            summarizer,
            quick_config(8),
        );
        let summary = SummaryRecord {
            id: "summary-batch-1-x".to_string(),
            batch_index: 0,
            entry_count: 2,
            summary_text: "s".to_string(),
            source_projects: BTreeSet::new(),
            message_types: BTreeSet::new(),
            importance_range: ImportanceRange { min: 3, max: 3 },
            time_range: TimeRange {
                earliest: at(1, 0),
                latest: at(1, 0),
            },
            source_entry_ids: vec!["a".to_string(), "ghost".to_string()],
            created_at: Utc::now(),
        };

        let err = pipeline.persist_summary(summary).unwrap_err();
        assert!(matches!(err, MemoryError::UnknownSourceRecord(id) if id == "ghost"));
        assert!(store.summaries().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_project_summaries_accumulate_on_append() {
        let records = vec![
            raw("a", "HexTrackr", "bug_fix", 3, at(1, 0)),
            raw("b", "rEngine", "bug_fix", 3, at(2, 0)),
            raw("c", "HexTrackr", "bug_fix", 3, at(3, 0)),
        ];
        let summarizer = Arc::new(ScriptedSummarizer::new());
        let (pipeline, store) = pipeline(records, summarizer, quick_config(2));

        let report = pipeline.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.summarized, 2);
        assert_eq!(report.project_summaries, 2);

        let batch_count = store.summaries().unwrap().len();
        pipeline.build_project_summaries().await.unwrap();
        pipeline.build_project_summaries().await.unwrap();

        assert_eq!(store.summaries().unwrap().len(), batch_count);
        let projects = store.project_summaries().unwrap();
        assert_eq!(projects.len(), 6);

        let hex = projects.iter().find(|p| p.project == "HexTrackr").unwrap();
        assert_eq!(hex.batch_summary_count, 2);
        assert_eq!(hex.total_entries, 3);
        assert!(hex.id.starts_with("project-summary-hextrackr-"));
    }

    #[tokio::test]
    async fn test_project_summaries_replace_policy() {
        let records = vec![raw("a", "HexTrackr", "bug_fix", 3, at(1, 0))];
        let summarizer = Arc::new(ScriptedSummarizer::new());
        let config = PipelineConfig {
            project_policy: ProjectSummaryPolicy::Replace,
            ..quick_config(8)
        };
        let (pipeline, store) = pipeline(records, summarizer, config);

        pipeline.run(&CancellationToken::new()).await.unwrap();
        pipeline.build_project_summaries().await.unwrap();

        assert_eq!(store.project_summaries().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_report() {
        let records = vec![
            raw("a", "HexTrackr", "bug_fix", 2, at(1, 0)),
            raw("b", "rEngine", "bug_fix", 4, at(2, 0)),
        ];
        let summarizer = Arc::new(ScriptedSummarizer::new());
        let (pipeline, _) = pipeline(records, summarizer, quick_config(8));
        pipeline.run(&CancellationToken::new()).await.unwrap();

        let report = pipeline.memory_report().unwrap();
        assert_eq!(report.raw_records, 2);
        assert!((report.average_importance - 3.0).abs() < 1e-9);
        assert_eq!(report.projects.len(), 2);
        assert_eq!(report.batch_summaries, 1);
        assert_eq!(report.summarized_entries, 2);
        assert_eq!(report.project_summaries, 2);
    }

    #[test]
    fn test_project_policy_parses_lowercase() {
        let policy: ProjectSummaryPolicy = serde_json::from_str("\"replace\"").unwrap();
        assert_eq!(policy, ProjectSummaryPolicy::Replace);
        assert_eq!(ProjectSummaryPolicy::default(), ProjectSummaryPolicy::Append);
    }
}
