//! Full indexing cycles against files in a temp directory

use async_trait::async_trait;
use hextrackr_memory::indexer::{CONSOLIDATED_FILE, EMBEDDINGS_FILE};
use hextrackr_memory::{
    CanonicalNotesLog, EmbeddingProvider, EvidenceLog, IncrementalIndexer, IndexState,
    IndexerConfig, MemoryError, RecordSource, Result,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct TableProvider {
    vectors: HashMap<&'static str, Vec<f32>>,
    calls: AtomicUsize,
}

impl TableProvider {
    fn new(vectors: Vec<(&'static str, Vec<f32>)>) -> Arc<Self> {
        Arc::new(Self {
            vectors: vectors.into_iter().collect(),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for TableProvider {
    fn model_name(&self) -> &str {
        "table"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.vectors
            .get(text)
            .cloned()
            .ok_or_else(|| MemoryError::embedding(format!("no vector for {:?}", text)))
    }
}

fn indexer(provider: Arc<TableProvider>, json_dir: &Path, max_attempts: u32) -> IncrementalIndexer {
    let config = IndexerConfig {
        request_delay: Duration::ZERO,
        max_embed_attempts: max_attempts,
        ..Default::default()
    };
    IncrementalIndexer::new(provider, config)
        .with_source(EvidenceLog::new(json_dir.join("chat-evidence.json")))
        .with_source(CanonicalNotesLog::new(json_dir.join("canonical-notes.json")))
}

#[tokio::test]
async fn single_evidence_item_gives_one_record_and_no_edges() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("chat-evidence.json"),
        r#"[{"id": "e1", "topic_key": "a:b", "text": "hello world", "source": "evidence"}]"#,
    )
    .unwrap();

    let provider = TableProvider::new(vec![("hello world", vec![1.0, 0.0, 0.0])]);
    let indexer = indexer(provider.clone(), dir.path(), 3);
    let export_dir = dir.path().join("search-matrix");
    let mut state = IndexState::open(&export_dir, 0.3).unwrap();

    let report = indexer
        .run_cycle(&mut state, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.embedded, 1);
    assert_eq!(state.store().len(), 1);
    assert!(state.store().has("e1"));
    assert_eq!(state.matrix().edge_count(), 0);
    assert!(state.matrix().edges().is_empty());
    assert!(export_dir.join(EMBEDDINGS_FILE).exists());
    assert!(export_dir.join(CONSOLIDATED_FILE).exists());
}

#[tokio::test]
async fn reprocessing_the_same_log_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let evidence = r#"[
        {"id": "e1", "topic_key": "net:cisco", "text": "alpha"},
        {"id": "e2", "topic_key": "net:cisco", "text": "beta"}
    ]"#;
    std::fs::write(dir.path().join("chat-evidence.json"), evidence).unwrap();
    std::fs::write(
        dir.path().join("canonical-notes.json"),
        r#"{"net:cisco": {"title": "Cisco", "summary": "gamma", "technical_details": "notes"}}"#,
    )
    .unwrap();

    let provider = TableProvider::new(vec![
        ("alpha", vec![1.0, 0.0]),
        ("beta", vec![0.9, 0.1]),
        ("Cisco gamma notes", vec![0.0, 1.0]),
    ]);
    let export_dir = dir.path().join("search-matrix");
    let cancel = CancellationToken::new();

    let once = {
        let indexer = indexer(provider.clone(), dir.path(), 3);
        let mut state = IndexState::open(&export_dir, 0.3).unwrap();
        indexer.run_cycle(&mut state, &cancel).await.unwrap();
        (state.store().len(), state.matrix().edges())
    };

    // a fresh process resumes from the persisted cursors
    let indexer = indexer(provider.clone(), dir.path(), 3);
    let mut state = IndexState::open(&export_dir, 0.3).unwrap();
    let report = indexer.run_cycle(&mut state, &cancel).await.unwrap();

    assert_eq!(report.embedded, 0);
    assert_eq!(state.cursor(RecordSource::Evidence), 2);
    assert_eq!(state.cursor(RecordSource::CanonicalNote), 1);
    assert_eq!(once.0, 3);
    assert_eq!(state.store().len(), once.0);
    let edges = state.matrix().edges();
    assert_eq!(edges.len(), once.1.len());
    for (after, before) in edges.iter().zip(once.1.iter()) {
        assert_eq!((&after.source, &after.target), (&before.source, &before.target));
        assert!((after.score - before.score).abs() < 1e-9);
    }
    assert!(state.store().has("canonical:net:cisco"));
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn appended_items_are_picked_up_next_cycle() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("chat-evidence.json");
    std::fs::write(&path, r#"[{"id": "e1", "topic_key": "a", "text": "alpha"}]"#).unwrap();

    let provider = TableProvider::new(vec![("alpha", vec![1.0, 0.0]), ("beta", vec![1.0, 0.0])]);
    let indexer = indexer(provider.clone(), dir.path(), 3);
    let mut state = IndexState::open(dir.path().join("out"), 0.3).unwrap();
    let cancel = CancellationToken::new();

    indexer.run_cycle(&mut state, &cancel).await.unwrap();
    std::fs::write(
        &path,
        r#"[{"id": "e1", "topic_key": "a", "text": "alpha"},
            {"id": "e2", "topic_key": "a", "text": "beta"}]"#,
    )
    .unwrap();
    let report = indexer.run_cycle(&mut state, &cancel).await.unwrap();

    assert_eq!(report.embedded, 1);
    assert_eq!(state.matrix().edge_count(), 1);
    let score = state.matrix().score("e1", "e2").unwrap();
    assert!((score - 1.0).abs() < 1e-9);
    assert_eq!(state.matrix().score("e2", "e1"), Some(score));
}

#[tokio::test]
async fn permanently_failing_item_is_dropped_after_bound() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("chat-evidence.json"),
        r#"[{"id": "bad", "topic_key": "a", "text": "unembeddable"},
            {"id": "ok", "topic_key": "a", "text": "fine"}]"#,
    )
    .unwrap();

    let provider = TableProvider::new(vec![("fine", vec![1.0, 0.0])]);
    let indexer = indexer(provider.clone(), dir.path(), 2);
    let mut state = IndexState::open(dir.path().join("out"), 0.3).unwrap();
    let cancel = CancellationToken::new();

    indexer.run_cycle(&mut state, &cancel).await.unwrap();
    assert_eq!(state.cursor(RecordSource::Evidence), 2);
    assert!(state.failed().contains_key("bad"));

    indexer.run_cycle(&mut state, &cancel).await.unwrap();
    indexer.run_cycle(&mut state, &cancel).await.unwrap();

    assert!(state.failed().is_empty());
    assert!(!state.store().has("bad"));
    assert!(state.store().has("ok"));
    // one first attempt plus one retry for "bad", one call for "ok"
    assert_eq!(provider.calls(), 3);
}
