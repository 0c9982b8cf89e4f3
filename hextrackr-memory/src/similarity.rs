//! All-pairs similarity matrix
//!
//! Computes cosine similarity for every unordered pair of stored vectors,
//! keeps the pairs strictly above a threshold as a symmetric sparse
//! adjacency map, and groups records into topic clusters.
//!
//! The build is O(n²) in the number of records.
//!
//! Clustering is naive: every record joins the cluster named
//! after its own topic key, first writer wins, and a record is never
//! reconsidered. It does not look at the similarity graph at all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::record::{RecordSource, VectorRecord, UNCATEGORIZED_TOPIC};

/// Pairs at or below this score are not materialized
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.3;

/// Cosine similarity between two vectors
///
/// Mismatched lengths and zero-norm vectors yield 0.0 rather than NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }
    cosine_with_norms(a, b, norm(a), norm(b))
}

fn norm(v: &[f32]) -> f64 {
    v.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt()
}

fn cosine_with_norms(a: &[f32], b: &[f32], norm_a: f64, norm_b: f64) -> f64 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();
    (dot / (norm_a * norm_b)).min(1.0)
}

/// One direction of a materialized similarity pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityEdge {
    pub source: String,
    pub target: String,
    pub score: f64,
}

/// Records grouped under one topic key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicCluster {
    pub members: Vec<String>,
    pub sources: BTreeSet<RecordSource>,
}

/// Build bookkeeping stored alongside the matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixMetadata {
    pub total_records: usize,
    pub total_comparisons: usize,
    pub threshold: f64,
    pub last_updated: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
}

/// Sparse symmetric similarity matrix plus topic clusters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatrix {
    pub metadata: MatrixMetadata,
    #[serde(rename = "similarity_matrix")]
    adjacency: BTreeMap<String, BTreeMap<String, f64>>,
    #[serde(rename = "topics")]
    clusters: BTreeMap<String, TopicCluster>,
}

impl SimilarityMatrix {
    /// A matrix with no edges and no clusters
    pub fn empty(total_records: usize, threshold: f64, embedding_model: Option<String>) -> Self {
        Self {
            metadata: MatrixMetadata {
                total_records,
                total_comparisons: 0,
                threshold,
                last_updated: Utc::now(),
                embedding_model,
            },
            adjacency: BTreeMap::new(),
            clusters: BTreeMap::new(),
        }
    }

    /// Score for a pair, if it was above threshold
    pub fn score(&self, a: &str, b: &str) -> Option<f64> {
        self.adjacency.get(a).and_then(|row| row.get(b)).copied()
    }

    /// Every materialized edge, in both directions
    pub fn edges(&self) -> Vec<SimilarityEdge> {
        self.adjacency
            .iter()
            .flat_map(|(source, row)| {
                row.iter().map(move |(target, score)| SimilarityEdge {
                    source: source.clone(),
                    target: target.clone(),
                    score: *score,
                })
            })
            .collect()
    }

    /// Number of unordered pairs above threshold
    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(BTreeMap::len).sum::<usize>() / 2
    }

    /// Related ids for `id`, best first (ties broken by id)
    pub fn neighbors(&self, id: &str, limit: usize) -> Vec<(String, f64)> {
        let Some(row) = self.adjacency.get(id) else {
            return Vec::new();
        };
        let mut related: Vec<(String, f64)> =
            row.iter().map(|(other, score)| (other.clone(), *score)).collect();
        related.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        related.truncate(limit);
        related
    }

    pub fn clusters(&self) -> &BTreeMap<String, TopicCluster> {
        &self.clusters
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty() && self.clusters.is_empty()
    }

    fn insert_pair(&mut self, a: &str, b: &str, score: f64) {
        self.adjacency
            .entry(a.to_string())
            .or_default()
            .insert(b.to_string(), score);
        self.adjacency
            .entry(b.to_string())
            .or_default()
            .insert(a.to_string(), score);
    }
}

/// Builds a [`SimilarityMatrix`] from a snapshot of records
#[derive(Debug, Clone)]
pub struct SimilarityMatrixBuilder {
    threshold: f64,
    embedding_model: Option<String>,
}

impl Default for SimilarityMatrixBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl SimilarityMatrixBuilder {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            embedding_model: None,
        }
    }

    /// Record the embedding model name in the matrix metadata
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = Some(model.into());
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Compute edges and clusters
    ///
    /// Fewer than two records yields an empty matrix; that is not an error.
    pub fn build(&self, records: &[VectorRecord]) -> SimilarityMatrix {
        let n = records.len();
        let mut matrix = SimilarityMatrix::empty(n, self.threshold, self.embedding_model.clone());

        if n < 2 {
            log::debug!("Need at least 2 embeddings to build matrix, have {}", n);
            return matrix;
        }

        let norms: Vec<f64> = records.iter().map(|r| norm(&r.vector)).collect();
        let mut comparisons = 0usize;

        for i in 0..n {
            for j in (i + 1)..n {
                let a = &records[i];
                let b = &records[j];
                comparisons += 1;

                if a.id == b.id || a.vector.len() != b.vector.len() {
                    continue;
                }

                let score = cosine_with_norms(&a.vector, &b.vector, norms[i], norms[j]);
                if score > self.threshold {
                    matrix.insert_pair(&a.id, &b.id, score);
                }
            }
        }

        matrix.metadata.total_comparisons = comparisons;
        matrix.clusters = build_topic_clusters(records);

        log::info!(
            "Built search matrix: {} embeddings, {} comparisons, {} edges",
            n,
            comparisons,
            matrix.edge_count()
        );
        matrix
    }
}

fn build_topic_clusters(records: &[VectorRecord]) -> BTreeMap<String, TopicCluster> {
    let mut clusters: BTreeMap<String, TopicCluster> = BTreeMap::new();
    let mut processed: HashSet<&str> = HashSet::new();

    for record in records {
        if !processed.insert(record.id.as_str()) {
            continue;
        }
        let key = if record.topic_key.split(':').all(str::is_empty) {
            UNCATEGORIZED_TOPIC.to_string()
        } else {
            record.topic_key.clone()
        };
        let cluster = clusters.entry(key).or_default();
        cluster.members.push(record.id.clone());
        cluster.sources.insert(record.source);
    }

    clusters
}
