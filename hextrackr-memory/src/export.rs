//! Consolidated multi-view export
//!
//! A denormalized view over the store and matrix written next to the raw
//! exports: per-source summary, a topic tree built from colon-delimited
//! keys, a flat search index and the topic clusters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub use crate::record::UNCATEGORIZED_TOPIC;
use crate::record::{RecordSource, VectorRecord};
use crate::similarity::{SimilarityMatrix, TopicCluster};

const PROJECT_NAME: &str = "HexTrackr";
const EXPORT_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedMetadata {
    pub project: String,
    pub total_items: usize,
    pub embedding_model: String,
    pub created_at: DateTime<Utc>,
    pub version: String,
}

/// Per-source rollup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub count: usize,
    pub topics: BTreeSet<String>,
    pub avg_dimensions: f64,
}

/// One node of the topic tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicNode {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, TopicNode>,
    /// Ids whose topic key ends at this node
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<String>,
}

impl TopicNode {
    fn insert(&mut self, segments: &[&str], id: &str) {
        match segments.split_first() {
            None => self.items.push(id.to_string()),
            Some((head, rest)) => self
                .children
                .entry((*head).to_string())
                .or_default()
                .insert(rest, id),
        }
    }

    /// Walk down a path of segments
    pub fn find(&self, path: &[&str]) -> Option<&TopicNode> {
        match path.split_first() {
            None => Some(self),
            Some((head, rest)) => self.children.get(*head)?.find(rest),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchEntry {
    pub topic_key: String,
    pub source: RecordSource,
    pub preview: String,
}

/// The consolidated view persisted as `consolidated-matrix.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedView {
    pub metadata: ConsolidatedMetadata,
    pub embeddings_summary: BTreeMap<RecordSource, SourceSummary>,
    pub topic_hierarchy: TopicNode,
    pub search_index: BTreeMap<String, SearchEntry>,
    pub similarity_clusters: BTreeMap<String, TopicCluster>,
}

/// Split a topic key into non-empty segments
pub fn topic_segments(topic_key: &str) -> Vec<&str> {
    let segments: Vec<&str> = topic_key.split(':').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        vec![UNCATEGORIZED_TOPIC]
    } else {
        segments
    }
}

impl ConsolidatedView {
    pub fn build<'a>(
        records: impl IntoIterator<Item = &'a VectorRecord>,
        matrix: &SimilarityMatrix,
        embedding_model: &str,
    ) -> Self {
        let mut embeddings_summary: BTreeMap<RecordSource, SourceSummary> = BTreeMap::new();
        let mut dimension_totals: BTreeMap<RecordSource, usize> = BTreeMap::new();
        let mut topic_hierarchy = TopicNode::default();
        let mut search_index = BTreeMap::new();

        for record in records {
            let summary = embeddings_summary.entry(record.source).or_default();
            summary.count += 1;
            summary.topics.insert(record.topic_key.clone());
            *dimension_totals.entry(record.source).or_default() += record.dimensions();

            topic_hierarchy.insert(&topic_segments(&record.topic_key), &record.id);

            search_index.insert(
                record.id.clone(),
                SearchEntry {
                    topic_key: record.topic_key.clone(),
                    source: record.source,
                    preview: record.text_preview.clone(),
                },
            );
        }

        for (source, summary) in embeddings_summary.iter_mut() {
            let total = dimension_totals.get(source).copied().unwrap_or(0);
            summary.avg_dimensions = total as f64 / summary.count as f64;
        }

        Self {
            metadata: ConsolidatedMetadata {
                project: PROJECT_NAME.to_string(),
                total_items: search_index.len(),
                embedding_model: embedding_model.to_string(),
                created_at: Utc::now(),
                version: EXPORT_VERSION.to_string(),
            },
            embeddings_summary,
            topic_hierarchy,
            search_index,
            similarity_clusters: matrix.clusters().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::SourceItem;
    use crate::similarity::SimilarityMatrixBuilder;

    fn record(id: &str, topic: &str, source: RecordSource, dims: usize) -> VectorRecord {
        let item = SourceItem::new(id, topic, format!("text for {}", id), source);
        VectorRecord::from_item(&item, vec![1.0; dims], 200)
    }

    #[test]
    fn test_topic_segments() {
        assert_eq!(topic_segments("a:b:c"), vec!["a", "b", "c"]);
        assert_eq!(topic_segments("a::b:"), vec!["a", "b"]);
        assert_eq!(topic_segments(""), vec![UNCATEGORIZED_TOPIC]);
        assert_eq!(topic_segments(":::"), vec![UNCATEGORIZED_TOPIC]);
    }

    #[test]
    fn test_consolidated_view() {
        let records = vec![
            record("e1", "a:b", RecordSource::Evidence, 4),
            record("e2", "a:c", RecordSource::Evidence, 2),
            record("canonical:a:b", "a:b", RecordSource::CanonicalNote, 4),
            record("e3", "", RecordSource::Evidence, 3),
        ];
        let matrix = SimilarityMatrixBuilder::default().build(&records);
        let view = ConsolidatedView::build(&records, &matrix, "test-model");

        assert_eq!(view.metadata.total_items, 4);
        assert_eq!(view.metadata.embedding_model, "test-model");

        let evidence = &view.embeddings_summary[&RecordSource::Evidence];
        assert_eq!(evidence.count, 3);
        assert!((evidence.avg_dimensions - 3.0).abs() < 1e-9);
        assert!(evidence.topics.contains("a:c"));
        assert_eq!(view.embeddings_summary[&RecordSource::CanonicalNote].count, 1);

        let ab = view.topic_hierarchy.find(&["a", "b"]).unwrap();
        assert_eq!(ab.items, vec!["e1".to_string(), "canonical:a:b".to_string()]);
        assert!(view.topic_hierarchy.find(&["a", "c"]).is_some());
        let uncategorized = view.topic_hierarchy.find(&[UNCATEGORIZED_TOPIC]).unwrap();
        assert_eq!(uncategorized.items, vec!["e3".to_string()]);

        assert_eq!(view.search_index["e2"].topic_key, "a:c");
        assert_eq!(view.search_index["e2"].preview, "text for e2");
        assert_eq!(view.similarity_clusters["a:b"].members.len(), 2);
    }

    #[test]
    fn test_empty_view_serializes() {
        let matrix = SimilarityMatrixBuilder::default().build(&[]);
        let view = ConsolidatedView::build(std::iter::empty(), &matrix, "m");
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["metadata"]["total_items"], 0);
        assert!(json["search_index"].as_object().unwrap().is_empty());
    }
}
